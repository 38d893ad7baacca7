//! 采集调度器
//!
//! 按点位内容对账：只有新增、变更、删除或禁用的点位会被启动或停止，
//! 其余点位的 worker 与在途周期不受影响。

use crate::status::{CycleState, TagStatus, TagStatusBoard};
use crate::worker::{Worker, WorkerContext};
use domain::{Tag, TagId};
use scada_ingest::ReadingHandler;
use scada_protocol::{BridgeFactory, BridgeHealth, ConfigError};
use scada_telemetry::TelemetryMetrics;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// 调度参数
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 单次 I/O 上限；实际超时 = min(扫描周期, 上限)
    pub read_timeout_cap: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            read_timeout_cap: Duration::from_secs(5),
        }
    }
}

/// 一次对账的结果
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub started: Vec<TagId>,
    pub restarted: Vec<TagId>,
    pub stopped: Vec<TagId>,
    pub rejected: Vec<(TagId, ConfigError)>,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty()
            && self.restarted.is_empty()
            && self.stopped.is_empty()
            && self.rejected.is_empty()
    }
}

pub struct Scheduler {
    ctx: WorkerContext,
    workers: BTreeMap<TagId, Worker>,
    /// 已收到停止信号、尚未退出的 worker
    retiring: Vec<Worker>,
    /// 配置无效的点位（内容不变时不重复告警）
    rejected: BTreeMap<TagId, Tag>,
    generation: u64,
}

impl Scheduler {
    pub fn new(
        factory: BridgeFactory,
        handler: Arc<dyn ReadingHandler>,
        config: SchedulerConfig,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        Self {
            ctx: WorkerContext {
                factory,
                handler,
                board: TagStatusBoard::new(),
                metrics,
                read_timeout_cap: config.read_timeout_cap,
            },
            workers: BTreeMap::new(),
            retiring: Vec::new(),
            rejected: BTreeMap::new(),
            generation: 0,
        }
    }

    pub fn board(&self) -> TagStatusBoard {
        self.ctx.board.clone()
    }

    /// 当前正在调度的点位。
    pub fn active(&self) -> Vec<TagId> {
        self.workers.keys().copied().collect()
    }

    /// 按给定点位集合对账。只调度启用的可轮询点位。
    pub async fn apply(&mut self, tags: &[Tag]) -> ApplyReport {
        self.retiring.retain(|worker| !worker.is_finished());
        let desired: BTreeMap<TagId, &Tag> = tags
            .iter()
            .filter(|tag| tag.enabled && tag.is_pollable())
            .map(|tag| (tag.id, tag))
            .collect();
        let mut report = ApplyReport::default();

        let removed: Vec<TagId> = self
            .workers
            .keys()
            .filter(|tag_id| !desired.contains_key(tag_id))
            .copied()
            .collect();
        for tag_id in removed {
            self.retire(tag_id).await;
            report.stopped.push(tag_id);
        }
        let dropped: BTreeSet<TagId> = self
            .rejected
            .keys()
            .filter(|tag_id| !desired.contains_key(tag_id))
            .copied()
            .collect();
        for tag_id in dropped {
            self.rejected.remove(&tag_id);
            self.ctx.board.remove(tag_id).await;
        }

        for (tag_id, tag) in desired {
            let restart = match self.workers.get(&tag_id) {
                Some(worker) if worker.tag == *tag => continue,
                Some(_) => true,
                None => false,
            };
            if self.rejected.get(&tag_id) == Some(tag) {
                continue;
            }
            if restart {
                self.retire(tag_id).await;
            }
            match self.start(tag).await {
                Ok(()) if restart => report.restarted.push(tag_id),
                Ok(()) => report.started.push(tag_id),
                Err(err) => {
                    if restart {
                        report.stopped.push(tag_id);
                    }
                    report.rejected.push((tag_id, err));
                }
            }
        }

        if !report.is_noop() {
            info!(
                target: "scada.scheduler",
                started = report.started.len(),
                restarted = report.restarted.len(),
                stopped = report.stopped.len(),
                rejected = report.rejected.len(),
                active = self.workers.len(),
                "scheduler_applied"
            );
        }
        report
    }

    async fn start(&mut self, tag: &Tag) -> Result<(), ConfigError> {
        self.generation += 1;
        let generation = self.generation;
        let mut status = TagStatus {
            tag_id: tag.id,
            tag_name: tag.name.clone(),
            source_kind: tag.source_kind,
            scan_interval_ms: tag.scan_interval_ms,
            state: CycleState::Idle,
            health: BridgeHealth::passive(),
            cycles: 0,
            cycles_skipped: 0,
            last_quality: None,
            last_ts_ms: None,
            last_error: None,
            generation,
        };

        let bridge = match self.ctx.factory.build(tag) {
            Ok(bridge) => bridge,
            Err(err) => {
                warn!(
                    target: "scada.scheduler",
                    tag_id = tag.id,
                    kind = %tag.source_kind,
                    error = %err,
                    "bridge_config_invalid"
                );
                status.state = CycleState::Invalid;
                status.last_error = Some(err.to_string());
                self.ctx.board.insert(status).await;
                self.rejected.insert(tag.id, tag.clone());
                return Err(err);
            }
        };
        self.rejected.remove(&tag.id);
        status.health = bridge.health();
        self.ctx.board.insert(status).await;
        let worker = Worker::spawn(self.ctx.clone(), tag.clone(), bridge, generation);
        self.workers.insert(tag.id, worker);
        Ok(())
    }

    /// 发送停止信号；worker 完成在途周期后自行关闭桥接。
    async fn retire(&mut self, tag_id: TagId) {
        if let Some(worker) = self.workers.remove(&tag_id) {
            worker.stop();
            self.retiring.push(worker);
        }
        self.ctx.board.remove(tag_id).await;
    }

    /// 停止全部 worker：宽限期内等待在途周期完成，超时后放弃在途读取。
    pub async fn shutdown(&mut self, grace: Duration) {
        let tag_ids: Vec<TagId> = self.workers.keys().copied().collect();
        for tag_id in tag_ids {
            self.retire(tag_id).await;
        }
        self.rejected.clear();

        let deadline = Instant::now() + grace;
        let mut abandoned = 0usize;
        for worker in &mut self.retiring {
            if tokio::time::timeout_at(deadline, worker.handle_mut())
                .await
                .is_err()
            {
                worker.abort();
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            warn!(target: "scada.scheduler", abandoned, "in_flight_cycles_abandoned");
            let close_deadline = Instant::now() + grace.min(Duration::from_secs(1));
            for worker in &mut self.retiring {
                if worker.is_finished() {
                    continue;
                }
                if tokio::time::timeout_at(close_deadline, worker.handle_mut())
                    .await
                    .is_err()
                {
                    worker.handle_mut().abort();
                    warn!(target: "scada.scheduler", tag_id = worker.tag.id, "worker_killed");
                }
            }
        }
        self.retiring.clear();
        info!(target: "scada.scheduler", "scheduler_stopped");
    }
}
