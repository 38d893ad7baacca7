//! # 数据流水线能力模块
//!
//! ```text
//! Scheduler / ExternalListener
//!       │ RawReading
//!       ▼
//! Pipeline::process ── Normalizer ──┬── Publisher（{namespace}/tags/{tag}）
//!                                   ├── RealtimeStore（最新值）
//!                                   └── StorageSink ── ReadingStore（批量）
//! ```
//!
//! 发布与存储互不依赖，也不构成事务：一条读数可能已发布但未落库，反之亦然。

mod pipeline;
mod sink;

pub use pipeline::{Pipeline, PipelineConfig};
pub use sink::{SinkConfig, SinkError, StorageSink};
