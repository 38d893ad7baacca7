use async_trait::async_trait;
use domain::{Quality, RawReading, SourceKind, Tag};
use scada_ingest::ReadingHandler;
use scada_protocol::{
    BridgeFactory, BridgeSettings, ModbusConnector, ModbusTcpConfig, ProtocolError,
    RegisterClient, RegisterKind, RegisterValues,
};
use scada_scheduler::{CycleState, Scheduler, SchedulerConfig};
use scada_telemetry::TelemetryMetrics;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// 记录交付的读数；可模拟慢处理或永不返回的处理。
#[derive(Default)]
struct Collector {
    readings: Mutex<Vec<RawReading>>,
    delay: Option<Duration>,
    hang: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl Collector {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    async fn count(&self) -> usize {
        self.readings.lock().await.len()
    }
}

#[async_trait]
impl ReadingHandler for Collector {
    async fn handle(&self, reading: RawReading) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.readings.lock().await.push(reading);
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// 计数关闭次数；`flaky` 时奇数次读取断链。
struct FakeModbus {
    closes: Arc<AtomicUsize>,
    flaky: bool,
}

struct FakeClient {
    closes: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    flaky: bool,
}

#[async_trait]
impl ModbusConnector for FakeModbus {
    async fn connect(
        &self,
        _config: &ModbusTcpConfig,
    ) -> Result<Box<dyn RegisterClient>, ProtocolError> {
        Ok(Box::new(FakeClient {
            closes: self.closes.clone(),
            reads: Arc::new(AtomicUsize::new(0)),
            flaky: self.flaky,
        }))
    }
}

#[async_trait]
impl RegisterClient for FakeClient {
    async fn read(
        &mut self,
        _kind: RegisterKind,
        _address: u16,
        _count: u16,
    ) -> Result<RegisterValues, ProtocolError> {
        let read = self.reads.fetch_add(1, Ordering::SeqCst);
        if self.flaky && read % 2 == 1 {
            return Err(ProtocolError::Connection("connection reset".to_string()));
        }
        Ok(RegisterValues::Words(vec![42]))
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn simulated(id: i64, scan_ms: u64) -> Tag {
    Tag::new(id, format!("Sim {id}"), SourceKind::Simulated).with_scan_interval_ms(scan_ms)
}

fn modbus(id: i64) -> Tag {
    Tag::new(id, "Boiler Temperature", SourceKind::ModbusTcp)
        .with_config(json!({"host": "plc", "register": 0}))
}

struct Harness {
    scheduler: Scheduler,
    collector: Arc<Collector>,
    metrics: Arc<TelemetryMetrics>,
    closes: Arc<AtomicUsize>,
}

fn harness(collector: Collector, flaky: bool) -> Harness {
    let metrics = Arc::new(TelemetryMetrics::new());
    let closes = Arc::new(AtomicUsize::new(0));
    let factory = BridgeFactory::new(BridgeSettings::default(), metrics.clone())
        .with_modbus_connector(Arc::new(FakeModbus {
            closes: closes.clone(),
            flaky,
        }));
    let collector = Arc::new(collector);
    let scheduler = Scheduler::new(
        factory,
        collector.clone(),
        SchedulerConfig::default(),
        metrics.clone(),
    );
    Harness {
        scheduler,
        collector,
        metrics,
        closes,
    }
}

#[tokio::test(start_paused = true)]
async fn readings_follow_scan_interval() {
    let mut h = harness(Collector::default(), false);
    let report = h.scheduler.apply(&[simulated(1, 1000)]).await;
    assert_eq!(report.started, vec![1]);

    sleep(Duration::from_millis(10_500)).await;
    let count = h.collector.count().await;
    assert!((9..=11).contains(&count), "got {count} readings");

    let status = h.scheduler.board().get(1).await.expect("status");
    assert_eq!(status.cycles as usize, count);
    assert_eq!(status.last_quality, Some(Quality::Good));
}

#[tokio::test(start_paused = true)]
async fn alternating_failures_never_stop_scheduling() {
    let mut h = harness(Collector::default(), true);
    h.scheduler.apply(&[modbus(2)]).await;

    sleep(Duration::from_millis(10_500)).await;
    let readings = h.collector.readings.lock().await;
    assert!(readings.len() >= 9, "got {} readings", readings.len());
    let errors = readings
        .iter()
        .filter(|reading| reading.quality == Quality::Error)
        .count();
    let good = readings.len() - errors;
    assert!(errors >= 4);
    assert!(good >= 4);
}

#[tokio::test(start_paused = true)]
async fn slow_cycles_skip_instead_of_overlapping() {
    let mut h = harness(Collector::slow(Duration::from_millis(2500)), false);
    h.scheduler.apply(&[simulated(1, 1000)]).await;

    sleep(Duration::from_millis(10_500)).await;
    assert_eq!(h.collector.max_in_flight.load(Ordering::SeqCst), 1);
    let count = h.collector.count().await;
    assert!(count <= 5, "got {count} readings");
    assert!(h.metrics.snapshot().cycles_skipped >= 4);
}

#[tokio::test(start_paused = true)]
async fn disable_finishes_in_flight_cycle_and_reenable_waits_a_full_interval() {
    let mut h = harness(Collector::slow(Duration::from_millis(500)), false);
    let mut tag = simulated(1, 1000);
    h.scheduler.apply(std::slice::from_ref(&tag)).await;

    sleep(Duration::from_millis(1200)).await;
    assert_eq!(h.collector.count().await, 1);
    tag.enabled = false;
    let report = h.scheduler.apply(std::slice::from_ref(&tag)).await;
    assert_eq!(report.stopped, vec![1]);
    assert!(h.scheduler.active().is_empty());

    sleep(Duration::from_millis(3800)).await;
    assert_eq!(h.collector.count().await, 1);
    assert_eq!(h.collector.completed.load(Ordering::SeqCst), 1);

    tag.enabled = true;
    let report = h.scheduler.apply(std::slice::from_ref(&tag)).await;
    assert_eq!(report.started, vec![1]);
    sleep(Duration::from_millis(800)).await;
    assert_eq!(h.collector.count().await, 1);
    sleep(Duration::from_millis(400)).await;
    assert_eq!(h.collector.count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn changing_one_tag_leaves_others_running() {
    let mut h = harness(Collector::default(), false);
    h.scheduler
        .apply(&[simulated(1, 1000), simulated(2, 1000)])
        .await;
    sleep(Duration::from_millis(2500)).await;

    let report = h
        .scheduler
        .apply(&[simulated(1, 1000), simulated(2, 500)])
        .await;
    assert_eq!(report.restarted, vec![2]);
    assert!(report.started.is_empty());
    assert!(report.stopped.is_empty());

    let board = h.scheduler.board();
    assert_eq!(board.get(1).await.expect("tag 1").cycles, 2);
    assert_eq!(board.get(2).await.expect("tag 2").cycles, 0);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(board.get(1).await.expect("tag 1").cycles, 3);
    assert_eq!(board.get(2).await.expect("tag 2").scan_interval_ms, 500);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected_without_blocking_others() {
    let mut h = harness(Collector::default(), false);
    let broken = Tag::new(2, "No Host", SourceKind::ModbusTcp).with_config(json!({"register": 0}));
    let external = Tag::new(3, "Ext", SourceKind::MqttExternal)
        .with_config(json!({"topic": "devices/+/temp"}));
    let tags = vec![simulated(1, 1000), broken, external];

    let report = h.scheduler.apply(&tags).await;
    assert_eq!(report.started, vec![1]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, 2);
    assert_eq!(h.scheduler.active(), vec![1]);

    let status = h.scheduler.board().get(2).await.expect("rejected status");
    assert_eq!(status.state, CycleState::Invalid);
    assert!(status.last_error.unwrap_or_default().contains("host"));
    assert!(h.scheduler.board().get(3).await.is_none());

    assert!(h.scheduler.apply(&tags).await.is_noop());
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_every_bridge() {
    let mut h = harness(Collector::default(), false);
    h.scheduler.apply(&[modbus(2), simulated(1, 1000)]).await;
    sleep(Duration::from_millis(1500)).await;

    h.scheduler.shutdown(Duration::from_secs(1)).await;
    assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    assert!(h.scheduler.active().is_empty());
    assert!(h.scheduler.board().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_hung_cycle_after_grace() {
    let mut h = harness(
        Collector {
            hang: true,
            ..Collector::default()
        },
        false,
    );
    h.scheduler.apply(&[modbus(2)]).await;
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.collector.count().await, 1);

    h.scheduler.shutdown(Duration::from_secs(2)).await;
    assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.collector.completed.load(Ordering::SeqCst), 0);
}
