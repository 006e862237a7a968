//! Shared fixtures for scenario tests.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use clearline_client::{Client, ClientConfig, ClientEvent, EventForwarder, ReconnectConfig};
use clearline_harness::{LocalWallet, MockClearingNode, SimEnv};
use clearline_proto::Address;
use tokio::sync::mpsc::UnboundedReceiver;

/// Upper bound on how long a scenario waits for one event.
const EVENT_WAIT: Duration = Duration::from_secs(120);

/// Client talking to an in-process mock node.
pub struct Fixture {
    pub node: MockClearingNode,
    pub client: Client,
    pub events: UnboundedReceiver<ClientEvent>,
}

/// Client config with short budgets so failures surface quickly.
pub fn config() -> ClientConfig {
    ClientConfig {
        request_timeout_ms: 2_000,
        reconnect: ReconnectConfig {
            base_delay_ms: 200,
            multiplier: 2,
            max_delay_ms: 1_000,
            max_attempts: 3,
        },
        ..ClientConfig::default()
    }
}

pub fn fixture(seed: u64) -> Fixture {
    fixture_with(seed, config())
}

pub fn fixture_with(seed: u64, config: ClientConfig) -> Fixture {
    fixture_on(MockClearingNode::with_seed(seed), seed, config)
}

/// Client talking to an already configured `node`.
pub fn fixture_on(node: MockClearingNode, seed: u64, config: ClientConfig) -> Fixture {
    let env = SimEnv::with_seed(seed.wrapping_add(1));
    let wallet = Arc::new(LocalWallet::generate(&env));
    let (forwarder, events) = EventForwarder::channel();
    let client = Client::with_env(config, node.clone(), wallet, Arc::new(forwarder), env);
    Fixture { node, client, events }
}

pub fn peer() -> Address {
    Address::new("0x00000000000000000000000000000000000000ee")
}

/// Wait for the first event matching `predicate`, discarding the rest.
pub async fn wait_for(
    events: &mut UnboundedReceiver<ClientEvent>,
    predicate: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(EVENT_WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive in time")
}

/// Every event already delivered.
pub fn drain(events: &mut UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
