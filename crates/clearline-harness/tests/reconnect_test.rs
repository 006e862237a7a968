//! Link loss, reconnect and authentication failure.
//!
//! The mock node severs or refuses links on demand; the client must reject
//! in-flight requests, come back with a fresh session key and restarted
//! request ids, and give up once its reconnect budget is spent.

mod common;

use std::time::Duration;

use clearline_client::{ClientError, ClientEvent, ReconnectConfig};
use clearline_core::Phase;
use clearline_proto::Method;
use common::{config, fixture, fixture_with, wait_for};

#[tokio::test(start_paused = true)]
async fn severed_link_reconnects_with_fresh_session() {
    let mut f = fixture(11);
    f.client.connect().await.expect("connect");
    wait_for(&mut f.events, |event| *event == ClientEvent::Authenticated).await;

    f.node.leave_unanswered(Method::GetChannels);
    let client = f.client.clone();
    let in_flight = tokio::spawn(async move { client.get_channels().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    f.node.sever_links();
    let err = in_flight.await.expect("task").unwrap_err();
    assert_eq!(err, ClientError::ConnectionClosed);

    wait_for(&mut f.events, |event| *event == ClientEvent::Closed).await;
    wait_for(&mut f.events, |event| *event == ClientEvent::Authenticated).await;
    assert!(f.client.is_connected());
    assert_eq!(f.node.connections(), 2);

    let journal = f.node.journal();
    let auth_requests: Vec<_> =
        journal.iter().filter(|entry| entry.method == Method::AuthRequest).collect();
    assert_eq!(auth_requests.len(), 2);
    assert_ne!(
        auth_requests[0].params.get("session_key"),
        auth_requests[1].params.get("session_key"),
        "reconnect must authenticate a new session key"
    );
    assert_eq!(auth_requests[0].params.get("address"), auth_requests[1].params.get("address"));

    let first_on_new_link =
        journal.iter().find(|entry| entry.connection == 1).expect("traffic on second link");
    assert_eq!(first_on_new_link.request_id, 1);

    f.node.answer(&Method::GetChannels);
    f.client.get_channels().await.expect("get channels after reconnect");
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_budget() {
    let mut config = config();
    config.reconnect =
        ReconnectConfig { base_delay_ms: 100, multiplier: 2, max_delay_ms: 1_000, max_attempts: 2 };
    let mut f = fixture_with(12, config);
    f.client.connect().await.expect("connect");

    f.node.refuse_connections(true);
    f.node.sever_links();

    let event = wait_for(&mut f.events, |event| {
        matches!(event, ClientEvent::Error(ClientError::ReconnectExhausted { .. }))
    })
    .await;
    assert_eq!(event, ClientEvent::Error(ClientError::ReconnectExhausted { attempts: 2 }));
    assert_eq!(f.node.connections(), 1);

    // No further attempts once exhausted.
    f.node.refuse_connections(false);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(f.node.connections(), 1);
    assert!(!f.client.is_connected());

    let err = f.client.get_channels().await.unwrap_err();
    assert_eq!(err, ClientError::NotConnected);
}

#[tokio::test(start_paused = true)]
async fn rejected_auth_fails_connect() {
    let f = fixture(13);
    f.node.reject_auth(true);

    let err = f.client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::AuthFailure(_)), "got {err:?}");
    assert!(!f.client.is_connected());

    // Reconnect is only armed by a successful handshake.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(f.node.connections(), 1);
    assert_ne!(f.client.phase(), Phase::Authenticated);

    f.node.reject_auth(false);
    f.client.connect().await.expect("connect after auth is accepted again");
    assert!(f.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn refused_connect_reports_transport_error() {
    let f = fixture(14);
    f.node.refuse_connections(true);

    let err = f.client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "got {err:?}");
    assert!(!f.client.is_connected());
}
