//! Unit tests for the duplex channel state machine, no live endpoint.

use std::time::{Duration, Instant};

use scanlink::channel::{ChannelState, DuplexChannel};
use scanlink::{Config, LinkError};

fn offline_config(endpoint: &str) -> Config {
    Config {
        endpoint: endpoint.into(),
        connect_timeout_ms: 200,
        connect_retry_delay_ms: 20,
        worker_threads: 1,
    }
}

#[test]
fn new_channel_starts_disconnected() {
    assert_eq!(DuplexChannel::new().state(), ChannelState::Disconnected);
}

#[test]
fn send_while_disconnected_is_not_connected() {
    let channel = DuplexChannel::new();
    let err = channel.send(b"payload").expect_err("send fails");
    assert!(matches!(err, LinkError::NotConnected), "got {err:?}");
}

#[test]
fn receive_while_disconnected_is_not_connected() {
    let channel = DuplexChannel::new();
    let err = channel.receive().expect_err("receive fails");
    assert!(matches!(err, LinkError::NotConnected), "got {err:?}");
}

#[test]
fn peer_process_while_disconnected_is_not_connected() {
    let channel = DuplexChannel::new();
    let err = channel.peer_process().expect_err("peer lookup fails");
    assert!(matches!(err, LinkError::NotConnected), "got {err:?}");
}

#[test]
fn connect_to_an_absent_endpoint_times_out_within_budget() {
    let channel = DuplexChannel::new();
    let config = offline_config(&format!("scanlink-test-{}", uuid::Uuid::new_v4().simple()));

    let started = Instant::now();
    let err = channel.connect(&config).expect_err("connect fails");

    assert!(matches!(err, LinkError::ConnectTimeout(_)), "got {err:?}");
    // The retry loop must give up near the 200ms budget, not run away.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[test]
fn failed_connect_leaves_the_channel_reusable() {
    let channel = DuplexChannel::new();
    let config = offline_config(&format!("scanlink-test-{}", uuid::Uuid::new_v4().simple()));

    channel.connect(&config).expect_err("first connect fails");
    let err = channel.connect(&config).expect_err("second connect fails");

    // Still a clean timeout, not a state complaint.
    assert!(matches!(err, LinkError::ConnectTimeout(_)), "got {err:?}");
}

#[test]
fn close_is_idempotent() {
    let channel = DuplexChannel::new();
    channel.close();
    channel.close();
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn operations_after_close_are_not_connected() {
    let channel = DuplexChannel::new();
    channel.close();
    assert!(matches!(
        channel.send(b"x").expect_err("send fails"),
        LinkError::NotConnected
    ));
    assert!(matches!(
        channel.receive().expect_err("receive fails"),
        LinkError::NotConnected
    ));
}

#[test]
fn connect_after_close_is_rejected() {
    let channel = DuplexChannel::new();
    channel.close();
    let err = channel
        .connect(&offline_config("scanlink-test-closed"))
        .expect_err("connect fails");
    // Closed is terminal, so the state guard fires before any attempt.
    assert!(matches!(err, LinkError::Io(_)), "got {err:?}");
    assert_eq!(channel.state(), ChannelState::Closed);
}
