//! 内存存储实现模块
//!
//! 未配置数据库/Redis 时使用，也用于测试。
//!
//! - ReadingStore: InMemoryReadingStore
//! - TagStore: InMemoryTagStore
//! - RealtimeStore: InMemoryRealtimeStore

pub mod reading;
pub mod realtime;
pub mod tag;

pub use reading::*;
pub use realtime::*;
pub use tag::*;
