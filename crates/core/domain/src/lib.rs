//! 采集核心领域模型：点位、原始读数与规范化读数。

pub mod reading;
pub mod tag;

pub use reading::{Quality, RawReading, RawValue, Reading, ReadingValue, now_epoch_ms};
pub use tag::{
    DEFAULT_SCAN_INTERVAL_MS, MIN_SCAN_INTERVAL_MS, SourceKind, Tag, TagDataType, TagId,
    UnknownSourceKind, sanitize_topic_segment,
};
