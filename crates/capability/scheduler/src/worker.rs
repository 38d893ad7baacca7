//! 单点位轮询任务
//!
//! 任务独占自己的 [`Bridge`]，周期串行执行：上一周期未完成时到期的节拍被跳过。

use crate::status::{CycleState, TagStatusBoard};
use domain::{Tag, TagId};
use scada_ingest::ReadingHandler;
use scada_protocol::{Bridge, BridgeFactory};
use scada_telemetry::TelemetryMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 控制信号：`Stop` 等在途周期结束，`Abort` 放弃在途周期。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Run,
    Stop,
    Abort,
}

/// 所有 worker 共享的依赖
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub factory: BridgeFactory,
    pub handler: Arc<dyn ReadingHandler>,
    pub board: TagStatusBoard,
    pub metrics: Arc<TelemetryMetrics>,
    pub read_timeout_cap: Duration,
}

pub(crate) struct Worker {
    pub tag: Tag,
    signal: watch::Sender<Signal>,
    handle: JoinHandle<()>,
}

impl Worker {
    pub(crate) fn spawn(ctx: WorkerContext, tag: Tag, bridge: Bridge, generation: u64) -> Self {
        let (signal, rx) = watch::channel(Signal::Run);
        let interval = tag.scan_interval();
        let cycle = Cycle {
            tag_id: tag.id,
            interval,
            read_timeout: interval.min(ctx.read_timeout_cap),
            generation,
            ctx,
        };
        let handle = tokio::spawn(cycle.run(bridge, rx));
        Self {
            tag,
            signal,
            handle,
        }
    }

    pub(crate) fn stop(&self) {
        self.signal.send_replace(Signal::Stop);
    }

    pub(crate) fn abort(&self) {
        self.signal.send_replace(Signal::Abort);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn handle_mut(&mut self) -> &mut JoinHandle<()> {
        &mut self.handle
    }
}

struct Cycle {
    tag_id: TagId,
    interval: Duration,
    read_timeout: Duration,
    generation: u64,
    ctx: WorkerContext,
}

impl Cycle {
    async fn run(self, mut bridge: Bridge, mut signal: watch::Receiver<Signal>) {
        let tag_id = self.tag_id;
        tokio::select! {
            biased;
            _ = signalled(&mut signal, |value| value != Signal::Run) => {}
            _ = self.ctx.factory.connect_eager(&mut bridge) => {}
        }
        let health = bridge.health();
        self.ctx
            .board
            .update(tag_id, self.generation, |status| status.health = health)
            .await;

        // 首个节拍在一个完整周期之后
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            target: "scada.scheduler",
            tag_id,
            interval_ms = self.interval.as_millis() as u64,
            read_timeout_ms = self.read_timeout.as_millis() as u64,
            "worker_started"
        );

        loop {
            if *signal.borrow() != Signal::Run {
                break;
            }
            let deadline = tokio::select! {
                biased;
                changed = signal.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                deadline = ticker.tick() => deadline,
            };

            let completed = tokio::select! {
                biased;
                _ = signalled(&mut signal, |value| value == Signal::Abort) => false,
                _ = self.cycle(&mut bridge) => true,
            };
            if !completed {
                warn!(target: "scada.scheduler", tag_id, "cycle_abandoned");
                break;
            }

            let overrun = Instant::now().saturating_duration_since(deadline);
            let skipped = (overrun.as_nanos() / self.interval.as_nanos().max(1)) as u64;
            if skipped > 0 {
                self.ctx.metrics.record_cycles_skipped(skipped);
                debug!(
                    target: "scada.scheduler",
                    tag_id,
                    skipped,
                    overrun_ms = overrun.as_millis() as u64,
                    "cycles_skipped"
                );
                self.ctx
                    .board
                    .update(tag_id, self.generation, |status| {
                        status.cycles_skipped += skipped;
                    })
                    .await;
            }
        }

        bridge.close().await;
        info!(target: "scada.scheduler", tag_id, "worker_stopped");
    }

    /// 一次读取，恰好交付一条读数。
    async fn cycle(&self, bridge: &mut Bridge) {
        self.ctx
            .board
            .update(self.tag_id, self.generation, |status| {
                status.state = CycleState::Reading;
            })
            .await;

        let raw = bridge.read(self.read_timeout).await;
        let health = bridge.health();
        let quality = raw.quality;
        let ts_ms = raw.ts_ms;
        let error = raw.error.clone();
        self.ctx.handler.handle(raw).await;

        self.ctx
            .board
            .update(self.tag_id, self.generation, |status| {
                status.state = CycleState::Idle;
                status.cycles += 1;
                status.health = health;
                status.last_quality = Some(quality);
                status.last_ts_ms = Some(ts_ms);
                status.last_error = error;
            })
            .await;
    }
}

/// 信号满足条件时完成；发送端已释放则永不完成。
async fn signalled(signal: &mut watch::Receiver<Signal>, accept: fn(Signal) -> bool) {
    let received = signal.wait_for(|value| accept(*value)).await.is_ok();
    if !received {
        std::future::pending::<()>().await;
    }
}
