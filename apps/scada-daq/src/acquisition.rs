//! 采集引擎装配模块
//!
//! 把总线、存储写入器、标准化流水线、调度器与外部监听器组装在一起，
//! 并负责点位集合刷新与有序停机：
//!
//! 1. 停止点位刷新与外部监听
//! 2. 调度器在宽限期内结束在途周期并关闭全部桥接
//! 3. 存储写入器写出剩余批次
//! 4. 断开总线

use domain::Tag;
use scada_bus::{MqttBus, MqttBusConfig};
use scada_config::{AppConfig, load_tags_file};
use scada_ingest::{ExternalListener, ReadingHandler};
use scada_normalize::{Normalizer, TagRegistry};
use scada_pipeline::{Pipeline, PipelineConfig, SinkConfig, StorageSink};
use scada_protocol::{BridgeFactory, BridgeSettings, ReconnectPolicy};
use scada_scheduler::{Scheduler, SchedulerConfig, TagStatusBoard};
use scada_storage::{
    InMemoryReadingStore, InMemoryRealtimeStore, InMemoryTagStore, PgReadingStore, PgTagStore,
    ReadingStore, RealtimeStore, RedisRealtimeStore, TagStore, connect_pool,
};
use scada_telemetry::TelemetryMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 引擎依赖的存储
pub struct Stores {
    pub tags: Arc<dyn TagStore>,
    pub readings: Arc<dyn ReadingStore>,
    pub realtime: Arc<dyn RealtimeStore>,
}

/// 按配置选择 Postgres / Redis，未配置时退化为内存实现。
pub async fn open_stores(
    config: &AppConfig,
    metrics: Arc<TelemetryMetrics>,
) -> Result<Stores, Box<dyn std::error::Error>> {
    let (tags, readings): (Arc<dyn TagStore>, Arc<dyn ReadingStore>) =
        match &config.database_url {
            Some(url) => {
                let pool = connect_pool(url).await?;
                info!(target: "scada.daq", "storage: postgres");
                (
                    Arc::new(PgTagStore::new(pool.clone(), metrics)),
                    Arc::new(PgReadingStore::new(pool)),
                )
            }
            None => {
                let seed = match &config.tags_file {
                    Some(path) => load_tags_file(path)?,
                    None => Vec::new(),
                };
                info!(target: "scada.daq", tags = seed.len(), "storage: in-memory");
                (
                    Arc::new(InMemoryTagStore::with_tags(seed)),
                    Arc::new(InMemoryReadingStore::new()),
                )
            }
        };
    let realtime: Arc<dyn RealtimeStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisRealtimeStore::connect(url)?),
        None => Arc::new(InMemoryRealtimeStore::new()),
    };
    Ok(Stores {
        tags,
        readings,
        realtime,
    })
}

/// 运行中的采集引擎
pub struct Engine {
    scheduler: Arc<Mutex<Scheduler>>,
    board: TagStatusBoard,
    sink: StorageSink,
    bus: MqttBus,
    stop: watch::Sender<bool>,
    sink_task: JoinHandle<()>,
    bus_task: JoinHandle<()>,
    listener_task: JoinHandle<()>,
    refresh_task: JoinHandle<()>,
}

impl Engine {
    pub async fn start(
        config: &AppConfig,
        stores: Stores,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        let (bus, inbound, bus_task) = MqttBus::connect(
            MqttBusConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                client_id: config.mqtt_client_id.clone(),
                qos: config.mqtt_qos,
                inbound_buffer: config.listener_buffer,
            },
            metrics.clone(),
        );

        let (sink, sink_task) = StorageSink::spawn(
            stores.readings,
            SinkConfig {
                batch_size: config.sink_batch_size,
                buffer: config.sink_buffer,
                flush_interval: Duration::from_millis(config.sink_flush_ms),
                max_retries: config.sink_max_retries,
                retry_backoff: Duration::from_millis(config.sink_retry_backoff_ms),
                ..SinkConfig::default()
            },
            metrics.clone(),
        );

        let registry = TagRegistry::new();
        let pipeline = Pipeline::new(
            Normalizer::new(registry.clone(), metrics.clone()),
            Arc::new(bus.clone()),
            sink.clone(),
            PipelineConfig {
                namespace: config.bus_namespace.clone(),
                store_bad_quality: config.store_bad_quality,
                cache_timeout: Duration::from_millis(config.cache_timeout_ms),
            },
            metrics.clone(),
        )
        .with_realtime(stores.realtime);
        let handler: Arc<dyn ReadingHandler> = Arc::new(pipeline);

        let factory = BridgeFactory::new(
            BridgeSettings {
                connect_timeout: Duration::from_millis(config.connect_timeout_ms),
                reconnect: ReconnectPolicy::new(
                    Duration::from_millis(config.reconnect_base_ms),
                    Duration::from_millis(config.reconnect_max_ms),
                    config.degraded_after,
                ),
            },
            metrics.clone(),
        );
        let scheduler = Scheduler::new(
            factory,
            handler.clone(),
            SchedulerConfig {
                read_timeout_cap: Duration::from_millis(config.read_timeout_cap_ms),
            },
            metrics.clone(),
        );
        let board = scheduler.board();
        let scheduler = Arc::new(Mutex::new(scheduler));

        let listener = ExternalListener::new(handler, metrics);
        let (stop, stop_rx) = watch::channel(false);
        let listener_task = tokio::spawn(listener.clone().run(inbound, stop_rx.clone()));

        let mut refresher = TagRefresher {
            tags: stores.tags,
            registry,
            scheduler: scheduler.clone(),
            listener,
            bus: bus.clone(),
            current: None,
            filters: Vec::new(),
        };
        refresher.refresh().await;
        let refresh_task = tokio::spawn(refresher.run(
            Duration::from_secs(config.tag_refresh_seconds),
            stop_rx,
        ));

        info!(target: "scada.daq", "engine_started");
        Self {
            scheduler,
            board,
            sink,
            bus,
            stop,
            sink_task,
            bus_task,
            listener_task,
            refresh_task,
        }
    }

    pub fn board(&self) -> TagStatusBoard {
        self.board.clone()
    }

    pub async fn shutdown(self, grace: Duration) {
        info!(target: "scada.daq", grace_ms = grace.as_millis() as u64, "engine_stopping");
        self.stop.send_replace(true);
        if let Err(err) = self.refresh_task.await {
            warn!(target: "scada.daq", error = %err, "tag_refresh_task_failed");
        }
        if tokio::time::timeout(grace, self.listener_task).await.is_err() {
            warn!(target: "scada.daq", "listener_stop_timeout");
        }

        self.scheduler.lock().await.shutdown(grace).await;

        if let Err(err) = self.sink.shutdown().await {
            warn!(target: "scada.daq", error = %err, "sink_shutdown_failed");
        }
        if let Err(err) = self.sink_task.await {
            warn!(target: "scada.daq", error = %err, "sink_task_failed");
        }

        self.bus.disconnect().await;
        if tokio::time::timeout(Duration::from_secs(2), self.bus_task)
            .await
            .is_err()
        {
            warn!(target: "scada.daq", "bus_disconnect_timeout");
        }
        info!(target: "scada.daq", "engine_stopped");
    }
}

/// 周期性比对点位集合，变化时同步到各组件。
struct TagRefresher {
    tags: Arc<dyn TagStore>,
    registry: TagRegistry,
    scheduler: Arc<Mutex<Scheduler>>,
    listener: ExternalListener,
    bus: MqttBus,
    current: Option<Vec<Tag>>,
    filters: Vec<String>,
}

impl TagRefresher {
    async fn run(mut self, every: Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.refresh().await,
            }
        }
    }

    async fn refresh(&mut self) {
        let tags = match self.tags.list_tags().await {
            Ok(tags) => tags,
            Err(err) => {
                warn!(target: "scada.daq", error = %err, "tag_refresh_failed");
                return;
            }
        };
        if self.current.as_ref() != Some(&tags) {
            self.registry.replace(&tags).await;
            let report = self.scheduler.lock().await.apply(&tags).await;
            for (tag_id, err) in &report.rejected {
                warn!(target: "scada.daq", tag_id, error = %err, "tag_not_scheduled");
            }
            let scheduled = self.scheduler.lock().await.active().len();
            self.filters = self.listener.update_routes(&tags).await;
            info!(
                target: "scada.daq",
                tags = tags.len(),
                scheduled,
                subscriptions = self.filters.len(),
                "tag_set_applied"
            );
            self.current = Some(tags);
        }
        // 每轮按差异补齐订阅：入队失败或重连后重订阅失败的过滤器在此重试
        if let Err(err) = self.bus.set_subscriptions(self.filters.clone()).await {
            warn!(target: "scada.daq", error = %err, "subscriptions_update_failed");
        }
    }
}
