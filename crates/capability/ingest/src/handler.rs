//! 读数处理器抽象（调度器与监听器的共同出口）

use async_trait::async_trait;
use domain::RawReading;

/// 接收原始读数；处理结果不回传给调用方。
#[async_trait]
pub trait ReadingHandler: Send + Sync {
    async fn handle(&self, reading: RawReading);
}
