//! # 外部设备监听能力模块
//!
//! - [`ReadingHandler`]：原始读数的统一出口（流水线实现）
//! - [`TopicRouter`]：按订阅过滤器把 topic 解析到点位
//! - [`decode_payload`]：纯文本 / JSON 字段提取
//! - [`ExternalListener`]：消费总线入站消息并转成读数
//!
//! 未匹配的 topic 只计数；无法解码的 payload 产出 quality=error 读数。

mod decode;
mod handler;
mod listener;
mod router;

pub use decode::{DecodeError, DecodeRule, Decoded, decode_payload};
pub use handler::ReadingHandler;
pub use listener::ExternalListener;
pub use router::{Route, TopicRouter, topic_matches};
