use domain::{Reading, ReadingValue};
use scada_storage::{InMemoryReadingStore, ReadingStore};

fn sample(tag_id: i64, ts_ms: i64, value: f64) -> Reading {
    Reading::good(tag_id, ts_ms, ReadingValue::Number(value))
}

#[tokio::test]
async fn readings_query_filters_by_range() {
    let store = InMemoryReadingStore::new();
    let values = vec![sample(1, 1000, 1.0), sample(1, 2000, 2.0), sample(1, 3000, 3.0)];
    store.append_readings(&values).await.expect("append");

    let list = store
        .query_readings(1, Some(1500), Some(2500), 10)
        .await
        .expect("query");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].ts_ms, 2000);
    assert_eq!(list[0].value, Some(ReadingValue::Number(2.0)));
}

#[tokio::test]
async fn readings_accept_out_of_order_and_duplicate_appends() {
    let store = InMemoryReadingStore::new();
    store
        .append_readings(&[sample(1, 3000, 3.0), sample(1, 1000, 1.0)])
        .await
        .expect("append");
    store
        .append_readings(&[sample(1, 2000, 2.0), sample(1, 1000, 9.0)])
        .await
        .expect("append again");

    let list = store.query_readings(1, None, None, 10).await.expect("query");
    let ts: Vec<i64> = list.iter().map(|r| r.ts_ms).collect();
    assert_eq!(ts, vec![1000, 2000, 3000]);
    // 重复键保留先写入的值
    assert_eq!(list[0].value, Some(ReadingValue::Number(1.0)));
}

#[tokio::test]
async fn readings_query_respects_limit_and_tag() {
    let store = InMemoryReadingStore::new();
    let values: Vec<Reading> = (0..5)
        .map(|i| sample(1, i * 1000, i as f64))
        .chain(std::iter::once(sample(2, 500, 7.0)))
        .collect();
    store.append_readings(&values).await.expect("append");

    let list = store.query_readings(1, None, None, 2).await.expect("query");
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|r| r.tag_id == 1));

    let empty = store.query_readings(1, None, None, 0).await.expect("query");
    assert!(empty.is_empty());
}
