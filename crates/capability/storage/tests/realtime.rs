use domain::{Quality, Reading, ReadingValue};
use scada_storage::{InMemoryRealtimeStore, RealtimeStore};

#[tokio::test]
async fn realtime_keeps_latest_reading_per_tag() {
    let store = InMemoryRealtimeStore::new();
    store
        .upsert_last_value(&Reading::good(1, 1000, ReadingValue::Number(1.0)))
        .await
        .expect("upsert");
    store
        .upsert_last_value(&Reading::good(1, 2000, ReadingValue::Number(2.0)))
        .await
        .expect("upsert");
    store
        .upsert_last_value(&Reading::good(1, 1500, ReadingValue::Number(9.0)))
        .await
        .expect("upsert stale");

    let record = store.get_last_value(1).await.expect("get").expect("record");
    assert_eq!(record.ts_ms, 2000);
    assert_eq!(record.value, Some(ReadingValue::Number(2.0)));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn realtime_records_error_quality() {
    let store = InMemoryRealtimeStore::new();
    store
        .upsert_last_value(&Reading::error(3, 1000, "timeout"))
        .await
        .expect("upsert");
    let record = store.get_last_value(3).await.expect("get").expect("record");
    assert_eq!(record.quality, Quality::Error);
    assert_eq!(record.value, None);
    assert!(store.get_last_value(4).await.expect("get").is_none());
}
