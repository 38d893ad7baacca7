//! # 采集调度能力模块
//!
//! 每个启用的可轮询点位一个独立任务：
//!
//! ```text
//! Scheduler::apply(tags)
//!   ├─ 新增 / 变更 → BridgeFactory::build → spawn worker
//!   ├─ 删除 / 禁用 → 发送停止信号（在途周期完成后退出并 close）
//!   └─ 未变化     → 不触碰
//!
//! worker: interval(scan) → bridge.read(min(scan, cap)) → ReadingHandler::handle
//! ```
//!
//! 周期互不重叠；错过的节拍跳过并计数，不做补读。

mod scheduler;
mod status;
mod worker;

pub use scheduler::{ApplyReport, Scheduler, SchedulerConfig};
pub use status::{CycleState, TagStatus, TagStatusBoard};
