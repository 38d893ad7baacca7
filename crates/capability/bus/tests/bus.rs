use scada_bus::{MqttBus, MqttBusConfig, NoopPublisher, Publisher};
use scada_telemetry::TelemetryMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn offline_config() -> MqttBusConfig {
    config_for(1)
}

fn config_for(port: u16) -> MqttBusConfig {
    MqttBusConfig {
        host: "127.0.0.1".to_string(),
        port,
        username: None,
        password: None,
        client_id: "scada-daq-test".to_string(),
        qos: 0,
        inbound_buffer: 8,
    }
}

#[tokio::test]
async fn subscriptions_follow_desired_set_while_offline() {
    let (bus, _inbound, handle) = MqttBus::connect(offline_config(), Arc::new(TelemetryMetrics::new()));

    bus.set_subscriptions(vec!["devices/+/humidity".to_string(), "plant/#".to_string()])
        .await
        .expect("subscribe");
    bus.set_subscriptions(vec!["plant/#".to_string(), "line/1/pressure".to_string()])
        .await
        .expect("resubscribe");

    assert_eq!(
        bus.subscriptions().await,
        vec!["line/1/pressure".to_string(), "plant/#".to_string()]
    );
    handle.abort();
}

#[tokio::test]
async fn publish_does_not_wait_for_broker() {
    let (bus, _inbound, handle) = MqttBus::connect(offline_config(), Arc::new(TelemetryMetrics::new()));
    let result = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        bus.publish("scada/tags/Demo_Sinewave", b"{}".to_vec()),
    )
    .await;
    assert!(result.is_ok(), "publish blocked");
    handle.abort();
}

#[tokio::test]
async fn noop_publisher_accepts_everything() {
    let publisher = NoopPublisher;
    publisher
        .publish("scada/tags/x", Vec::new())
        .await
        .expect("noop");
}

/// 读取一个 MQTT 报文：返回首字节与剩余部分。
async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let header = stream.read_u8().await.expect("header");
    let mut remaining = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await.expect("length");
        remaining |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0u8; remaining];
    stream.read_exact(&mut body).await.expect("body");
    (header, body)
}

/// 接受一次连接并应答 CONNACK。
async fn accept_session(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.expect("accept");
    let (header, _) = read_packet(&mut stream).await;
    assert_eq!(header >> 4, 1, "expected CONNECT");
    stream
        .write_all(&[0x20, 0x02, 0x00, 0x00])
        .await
        .expect("connack");
    stream
}

/// 读到 SUBSCRIBE 为止（途中的其它报文忽略），应答 SUBACK 并返回过滤器。
async fn next_subscribe(stream: &mut TcpStream) -> Vec<String> {
    loop {
        let (header, body) = read_packet(stream).await;
        if header >> 4 != 8 {
            continue;
        }
        let mut filters = Vec::new();
        let mut pos = 2;
        while pos + 2 <= body.len() {
            let len = u16::from_be_bytes([body[pos], body[pos + 1]]) as usize;
            let filter = &body[pos + 2..pos + 2 + len];
            filters.push(String::from_utf8(filter.to_vec()).expect("utf8 filter"));
            pos += 2 + len + 1;
        }
        let mut suback = vec![0x90, (2 + filters.len()) as u8, body[0], body[1]];
        suback.extend(std::iter::repeat_n(0u8, filters.len()));
        stream.write_all(&suback).await.expect("suback");
        return filters;
    }
}

#[tokio::test]
async fn resubscribes_after_broker_reconnect_even_with_full_publish_queue() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let (bus, _inbound, handle) = MqttBus::connect(config_for(port), Arc::new(TelemetryMetrics::new()));

    let mut first = accept_session(&listener).await;
    bus.set_subscriptions(vec!["devices/+/temp".to_string()])
        .await
        .expect("subscribe");
    let filters = tokio::time::timeout(Duration::from_secs(5), next_subscribe(&mut first))
        .await
        .expect("first subscribe");
    assert_eq!(filters, vec!["devices/+/temp".to_string()]);
    drop(first);

    // 断线期间发布把请求队列塞满
    for seq in 0..100 {
        let _ = bus
            .publish("scada/tags/Demo_Sinewave", format!("{seq}").into_bytes())
            .await;
    }

    let mut second = accept_session(&listener).await;
    let filters = tokio::time::timeout(Duration::from_secs(10), next_subscribe(&mut second))
        .await
        .expect("resubscribe after reconnect");
    assert_eq!(filters, vec!["devices/+/temp".to_string()]);
    assert_eq!(bus.subscriptions().await, vec!["devices/+/temp".to_string()]);
    handle.abort();
}

#[tokio::test]
async fn subscription_that_cannot_be_queued_stays_pending() {
    let (bus, _inbound, handle) = MqttBus::connect(offline_config(), Arc::new(TelemetryMetrics::new()));
    for seq in 0..100 {
        let _ = bus
            .publish("scada/tags/Demo_Sinewave", format!("{seq}").into_bytes())
            .await;
    }

    let result = bus
        .set_subscriptions(vec!["devices/+/temp".to_string()])
        .await;
    assert!(result.is_err());
    assert!(bus.subscriptions().await.is_empty());
    handle.abort();
}
