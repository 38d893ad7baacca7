//! 存储写入器
//!
//! 单个后台任务独占批缓冲：有界队列提供背压，批量写入失败按封顶退避重试，
//! 重试耗尽后整批丢弃并计数一次。

use domain::Reading;
use scada_storage::ReadingStore;
use scada_telemetry::TelemetryMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// 写入器参数
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub batch_size: usize,
    /// 队列上限（背压点）
    pub buffer: usize,
    pub flush_interval: Duration,
    pub max_retries: usize,
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            buffer: 10_000,
            flush_interval: Duration::from_secs(1),
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl SinkConfig {
    fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if self.buffer == 0 {
            self.buffer = 1;
        }
        if self.flush_interval.is_zero() {
            self.flush_interval = Duration::from_millis(1);
        }
        self
    }

    /// 第 `attempt` 次重试前的等待时间。
    fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// 写入器错误。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("storage sink is closed")]
    Closed,
}

enum SinkCommand {
    Append(Reading),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// 写入器句柄（可克隆，并发安全）。
#[derive(Clone)]
pub struct StorageSink {
    tx: mpsc::Sender<SinkCommand>,
    metrics: Arc<TelemetryMetrics>,
}

impl StorageSink {
    /// 启动后台写入任务。
    pub fn spawn(
        store: Arc<dyn ReadingStore>,
        config: SinkConfig,
        metrics: Arc<TelemetryMetrics>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let config = config.sanitized();
        let (tx, rx) = mpsc::channel(config.buffer);
        let worker = SinkWorker {
            store,
            config,
            metrics: metrics.clone(),
            buffer: Vec::new(),
        };
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx, metrics }, handle)
    }

    /// 追加一条读数；队列已满时等待（背压）。
    pub async fn append(&self, reading: Reading) -> Result<(), SinkError> {
        match self.tx.try_send(SinkCommand::Append(reading)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(command)) => {
                self.metrics.record_backpressure();
                debug!(target: "scada.sink", "sink_backpressure");
                self.tx.send(command).await.map_err(|_| SinkError::Closed)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    /// 写出此前追加的全部读数后返回。
    pub async fn flush(&self) -> Result<(), SinkError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Flush(ack_tx))
            .await
            .map_err(|_| SinkError::Closed)?;
        ack_rx.await.map_err(|_| SinkError::Closed)
    }

    /// 写出剩余数据并停止后台任务。
    pub async fn shutdown(&self) -> Result<(), SinkError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Shutdown(ack_tx))
            .await
            .map_err(|_| SinkError::Closed)?;
        ack_rx.await.map_err(|_| SinkError::Closed)
    }
}

struct SinkWorker {
    store: Arc<dyn ReadingStore>,
    config: SinkConfig,
    metrics: Arc<TelemetryMetrics>,
    buffer: Vec<Reading>,
}

impl SinkWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<SinkCommand>) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(SinkCommand::Append(reading)) => {
                        self.buffer.push(reading);
                        if self.buffer.len() >= self.config.batch_size {
                            self.write_buffer().await;
                        }
                    }
                    Some(SinkCommand::Flush(ack)) => {
                        self.write_buffer().await;
                        let _ = ack.send(());
                    }
                    Some(SinkCommand::Shutdown(ack)) => {
                        rx.close();
                        let mut waiters = vec![ack];
                        while let Some(command) = rx.recv().await {
                            match command {
                                SinkCommand::Append(reading) => self.buffer.push(reading),
                                SinkCommand::Flush(waiter) | SinkCommand::Shutdown(waiter) => {
                                    waiters.push(waiter);
                                }
                            }
                        }
                        self.write_buffer().await;
                        for waiter in waiters {
                            let _ = waiter.send(());
                        }
                        break;
                    }
                    None => {
                        self.write_buffer().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.write_buffer().await;
                }
            }
        }
        info!(target: "scada.sink", "sink_stopped");
    }

    /// 按批大小切分写出缓冲区。
    async fn write_buffer(&mut self) {
        while !self.buffer.is_empty() {
            let take = self.buffer.len().min(self.config.batch_size);
            let batch: Vec<Reading> = self.buffer.drain(..take).collect();
            self.write_batch(batch).await;
        }
    }

    async fn write_batch(&self, batch: Vec<Reading>) {
        let mut attempt = 0;
        loop {
            match self.store.append_readings(&batch).await {
                Ok(_) => {
                    self.metrics.record_batch_written(batch.len());
                    debug!(target: "scada.sink", readings = batch.len(), "batch_written");
                    return;
                }
                Err(err) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        self.metrics.record_batch_dropped(batch.len());
                        error!(
                            target: "scada.sink",
                            readings = batch.len(),
                            attempts = attempt,
                            error = %err,
                            "batch_dropped"
                        );
                        return;
                    }
                    let wait = self.config.backoff(attempt);
                    self.metrics.record_store_retry();
                    warn!(
                        target: "scada.sink",
                        readings = batch.len(),
                        attempt,
                        retry_in_ms = wait.as_millis() as u64,
                        error = %err,
                        "batch_write_failed"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
