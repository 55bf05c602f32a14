mod common;

use common::MockConnector;
use flagbook::{ChannelConfig, ChannelManager, ChannelState, Frame, ReconnectPolicy};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const ENDPOINT: &str = "ws://flagbook.test/ws/test-token";

fn quiet_config() -> ChannelConfig {
    ChannelConfig {
        ping_interval: None,
        reconnect: ReconnectPolicy::fixed(Duration::from_secs(1)),
    }
}

fn channel_with(
    connector: Arc<MockConnector>,
    config: ChannelConfig,
) -> (ChannelManager, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let channel = ChannelManager::new(
        ENDPOINT,
        connector,
        config,
        Arc::new(move |message| {
            let _ = tx.send(message);
        }),
    );
    (channel, rx)
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_exactly_the_retry_interval() {
    let (connector, mut peers) = MockConnector::new();
    let (channel, _inbound) = channel_with(Arc::clone(&connector), quiet_config());
    channel.connect().unwrap();

    for _ in 0..4 {
        let peer = peers.recv().await.unwrap();
        channel.wait_until_open().await.unwrap();
        peer.close();
    }

    let gaps = connector.attempt_gaps();
    assert_eq!(gaps.len(), 3);
    assert!(gaps.iter().all(|gap| *gap == Duration::from_secs(1)));
    assert_eq!(channel.connection_attempts(), 4);

    channel.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempts_retry_on_the_interval() {
    let (connector, mut peers) = MockConnector::refusing(3);
    let (channel, _inbound) = channel_with(Arc::clone(&connector), quiet_config());
    channel.connect().unwrap();

    let _peer = peers.recv().await.unwrap();
    assert_eq!(connector.attempt_gaps(), vec![Duration::from_secs(1); 3]);

    channel.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_exponential_policy_spaces_attempts() {
    let (connector, mut peers) = MockConnector::refusing(3);
    let config = ChannelConfig {
        ping_interval: None,
        reconnect: ReconnectPolicy::exponential(
            Duration::from_millis(100),
            Duration::from_millis(300),
        ),
    };
    let (channel, _inbound) = channel_with(Arc::clone(&connector), config);
    channel.connect().unwrap();

    let _peer = peers.recv().await.unwrap();
    assert_eq!(
        connector.attempt_gaps(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(300),
        ]
    );

    channel.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_send_waits_until_open() {
    let (connector, mut peers) = MockConnector::refusing(1);
    let (channel, _inbound) = channel_with(connector, quiet_config());
    channel.connect().unwrap();

    let sender = channel.clone();
    let send = tokio::spawn(async move { sender.send(&json!(["hello"])).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!send.is_finished());
    assert_ne!(channel.state(), ChannelState::Open);

    let mut peer = peers.recv().await.unwrap();
    assert_eq!(peer.recv_json().await, Some(json!(["hello"])));
    send.await.unwrap().unwrap();

    channel.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_inbound_messages_reach_the_callback_in_order() {
    let (connector, mut peers) = MockConnector::new();
    let (channel, mut inbound) = channel_with(connector, quiet_config());
    channel.connect().unwrap();
    let peer = peers.recv().await.unwrap();

    peer.send_json(json!([1]));
    peer.send_text("{broken");
    peer.send_json(json!([2]));

    assert_eq!(inbound.recv().await, Some(json!([1])));
    assert_eq!(inbound.recv().await, Some(json!([2])));
    assert!(channel.is_open());

    channel.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_ping_on_open_and_on_interval() {
    let (connector, mut peers) = MockConnector::new();
    let config = ChannelConfig {
        ping_interval: Some(Duration::from_secs(5)),
        ..quiet_config()
    };
    let (channel, _inbound) = channel_with(connector, config);
    channel.connect().unwrap();
    let mut peer = peers.recv().await.unwrap();

    let opened = tokio::time::Instant::now();
    assert_eq!(peer.recv_frame().await, Some(Frame::Ping));
    assert_eq!(peer.recv_frame().await, Some(Frame::Ping));
    assert_eq!(opened.elapsed(), Duration::from_secs(5));

    channel.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_ping_interval_keeps_channel_usable() {
    let (connector, mut peers) = MockConnector::new();
    let config = ChannelConfig {
        ping_interval: Some(Duration::MAX),
        ..quiet_config()
    };
    let (channel, _inbound) = channel_with(connector, config);
    channel.connect().unwrap();
    let mut peer = peers.recv().await.unwrap();

    assert_eq!(peer.recv_frame().await, Some(Frame::Ping));
    channel.send(&json!(["hello"])).await.unwrap();
    assert_eq!(peer.recv_json().await.unwrap(), json!(["hello"]));
    assert!(channel.is_open());

    channel.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_and_stops_reconnecting() {
    let (connector, mut peers) = MockConnector::new();
    let (channel, _inbound) = channel_with(Arc::clone(&connector), quiet_config());
    channel.connect().unwrap();
    let mut peer = peers.recv().await.unwrap();
    channel.wait_until_open().await.unwrap();

    channel.shutdown();
    assert_eq!(channel.state(), ChannelState::Disposed);
    assert_eq!(peer.recv_frame().await, Some(Frame::Close));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.attempts().len(), 1);
    assert!(channel.send(&json!(["late"])).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent() {
    let (connector, mut peers) = MockConnector::new();
    let (channel, _inbound) = channel_with(Arc::clone(&connector), quiet_config());
    channel.connect().unwrap();
    channel.connect().unwrap();

    let _peer = peers.recv().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(connector.attempts().len(), 1);

    channel.shutdown();
}
