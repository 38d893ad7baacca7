//! # PostgreSQL 存储实现模块
//!
//! 生产环境使用（表结构见 `migrations/0001_acquisition.sql`）。
//!
//! - **ReadingStore** (`reading.rs`)：`metrics` 表，主键 `(tag_id, ts)`，
//!   写入使用 `ON CONFLICT DO NOTHING`，乱序与重放写入不会失败
//! - **TagStore** (`tag.rs`)：`tags` 表，核心只读
//!
//! 所有 SQL 使用参数绑定；批量写入在单个事务内完成。

pub mod reading;
pub mod tag;

pub use reading::*;
pub use tag::*;
