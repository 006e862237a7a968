//! Mock clearing node.
//!
//! [`MockClearingNode`] answers the protocol the way a real clearing node
//! would, with configurable latencies, and keeps an in-memory channel
//! ledger per session. It doubles as a [`Transport`]: connecting spawns a
//! node session on the far end of an in-memory link. The same session loop
//! serves any line-framed stream through [`MockClearingNode::serve`].
//!
//! Fault injection covers the cases the client must survive: requests left
//! unanswered, rejected authentication, refused connections, and links
//! severed from the node side.

use std::{
    collections::{BTreeMap, HashSet},
    io,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use clearline_core::{
    Environment, SessionKey, Transport, TransportSink, TransportStream,
    codec::{self, Inbound},
};
use clearline_proto::{
    Address, Amount, ChannelId, Method, PUSH_REQUEST_ID, RequestId,
    payloads::{
        Ack, AuthChallenge, AuthRequestParams, AuthVerifyParams, AuthVerifyResult, BalanceUpdate,
        ChannelAck, ChannelList, ChannelStatus, ChannelSummary, ChannelUpdate, CloseChannelParams,
        CreateChannelParams, ErrorParams, TransferNotification, TransferParams,
    },
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    memory::{MemorySink, MemoryStream, memory_link},
    sim_env::SimEnv,
};

/// Error code for malformed or unacceptable parameters.
pub const CODE_BAD_REQUEST: i64 = 400;
/// Error code for failed or missing authentication.
pub const CODE_UNAUTHORIZED: i64 = 401;
/// Error code for an unknown channel.
pub const CODE_NOT_FOUND: i64 = 404;
/// Error code for a method the node does not serve.
pub const CODE_UNKNOWN_METHOD: i64 = -1;

/// Uniformly sampled latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    /// Shortest delay
    pub min: Duration,
    /// Longest delay
    pub max: Duration,
}

impl Latency {
    /// Always the same delay.
    pub const fn fixed(delay: Duration) -> Self {
        Self { min: delay, max: delay }
    }

    /// Delay drawn from `min..=max` milliseconds.
    pub const fn between_ms(min: u64, max: u64) -> Self {
        Self { min: Duration::from_millis(min), max: Duration::from_millis(max) }
    }

    fn sample(&self, rng: &mut ChaCha8Rng) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let low = self.min.as_millis() as u64;
        let high = self.max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(low..=high))
    }
}

/// Latencies and ledger defaults of a mock node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Delay before a connection attempt completes
    pub open_delay: Duration,
    /// Delay before the auth challenge
    pub challenge_latency: Latency,
    /// Delay before the auth verdict
    pub verify_latency: Latency,
    /// Delay before a channel is acknowledged as open
    pub create_latency: Latency,
    /// Delay before a channel is acknowledged as closed
    pub close_latency: Latency,
    /// Delay before a transfer is acknowledged
    pub transfer_latency: Latency,
    /// Gap between a transfer ack and its notification pushes
    pub transfer_push_delay: Duration,
    /// Delay before a channel listing
    pub query_latency: Latency,
    /// Period of unsolicited balance snapshots while channels are open
    pub balance_interval: Duration,
    /// Balance of a channel opened with a zero allocation
    pub default_balance: Amount,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            open_delay: Duration::from_millis(50),
            challenge_latency: Latency::fixed(Duration::from_millis(100)),
            verify_latency: Latency::fixed(Duration::from_millis(150)),
            create_latency: Latency::between_ms(200, 400),
            close_latency: Latency::fixed(Duration::from_millis(200)),
            transfer_latency: Latency::between_ms(100, 300),
            transfer_push_delay: Duration::from_millis(500),
            query_latency: Latency::fixed(Duration::from_millis(100)),
            balance_interval: Duration::from_secs(10),
            default_balance: Amount::new(1_000_000_000),
        }
    }
}

/// One request as received by the node.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Zero-based index of the node session that received it
    pub connection: usize,
    /// Request id chosen by the client
    pub request_id: RequestId,
    /// Requested method
    pub method: Method,
    /// Request parameters
    pub params: Map<String, Value>,
}

#[derive(Debug, Default)]
struct Faults {
    unanswered: HashSet<Method>,
    reject_auth: bool,
    refuse_connections: bool,
}

struct Shared {
    config: NodeConfig,
    env: SimEnv,
    key: SessionKey,
    faults: Mutex<Faults>,
    journal: Mutex<Vec<JournalEntry>>,
    connections: AtomicUsize,
    sever: watch::Sender<u64>,
}

impl Shared {
    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn journal(&self) -> MutexGuard<'_, Vec<JournalEntry>> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process clearing node. Clones share state.
#[derive(Clone)]
pub struct MockClearingNode {
    shared: Arc<Shared>,
}

impl MockClearingNode {
    /// Node with default latencies and seed `0`.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Node with default latencies.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_config(NodeConfig::default(), seed)
    }

    /// Node with explicit latencies. The seed drives challenges, channel
    /// latencies and the node's signing key.
    pub fn with_config(config: NodeConfig, seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let key = SessionKey::generate(&env);
        let (sever, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                config,
                env,
                key,
                faults: Mutex::new(Faults::default()),
                journal: Mutex::new(Vec::new()),
                connections: AtomicUsize::new(0),
                sever,
            }),
        }
    }

    /// Latencies in effect.
    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    /// Address the node signs its frames with.
    pub fn address(&self) -> &Address {
        self.shared.key.address()
    }

    /// Stop answering `method`. Requests are still journaled.
    pub fn leave_unanswered(&self, method: Method) {
        self.shared.faults().unanswered.insert(method);
    }

    /// Resume answering `method`.
    pub fn answer(&self, method: &Method) {
        self.shared.faults().unanswered.remove(method);
    }

    /// Fail every `auth_verify` while set.
    pub fn reject_auth(&self, reject: bool) {
        self.shared.faults().reject_auth = reject;
    }

    /// Refuse new connections while set.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.faults().refuse_connections = refuse;
    }

    /// Drop every live session from the node side.
    pub fn sever_links(&self) {
        self.shared.sever.send_modify(|generation| *generation += 1);
    }

    /// Every request received so far, in arrival order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.shared.journal().clone()
    }

    /// Number of received requests for `method`.
    pub fn received(&self, method: &Method) -> usize {
        self.shared.journal().iter().filter(|entry| &entry.method == method).count()
    }

    /// Number of sessions started.
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Run one node session over a line-framed link until the peer goes
    /// away or the link is severed.
    pub async fn serve<K: TransportSink, S: TransportStream>(&self, mut sink: K, mut stream: S) {
        let index = self.shared.connections.fetch_add(1, Ordering::SeqCst);
        let mut severed = self.shared.sever.subscribe();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let mut session = Session::new(Arc::clone(&self.shared), index, out_tx);

        let period = self.shared.config.balance_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(connection = index, "node session started");
        loop {
            tokio::select! {
                frame = stream.recv() => match frame {
                    Ok(Some(text)) => {
                        if session.handle(&text) {
                            ticker.reset();
                        }
                    },
                    Ok(None) => break,
                    Err(err) => {
                        debug!(connection = index, error = %err, "node read failed");
                        break;
                    },
                },
                Some(text) = out_rx.recv() => {
                    if let Err(err) = sink.send(text).await {
                        debug!(connection = index, error = %err, "node write failed");
                        break;
                    }
                },
                _ = ticker.tick(), if session.has_channels() => session.push_balances(),
                _ = severed.changed() => {
                    info!(connection = index, "node severed link");
                    break;
                },
            }
        }

        let _ = sink.close().await;
        info!(connection = index, "node session ended");
    }
}

impl Default for MockClearingNode {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockClearingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClearingNode")
            .field("address", self.address())
            .field("connections", &self.connections())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockClearingNode {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    async fn connect(&self, endpoint: &str) -> io::Result<(Self::Sink, Self::Stream)> {
        if self.shared.faults().refuse_connections {
            debug!(endpoint, "node refusing connection");
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        }
        tokio::time::sleep(self.shared.config.open_delay).await;

        let (client_side, (node_sink, node_stream)) = memory_link();
        let node = self.clone();
        tokio::spawn(async move { node.serve(node_sink, node_stream).await });
        Ok(client_side)
    }
}

struct ChannelState {
    status: ChannelStatus,
    balance: Amount,
    asset: String,
}

/// Per-connection state of the node.
struct Session {
    shared: Arc<Shared>,
    index: usize,
    rng: ChaCha8Rng,
    out: mpsc::UnboundedSender<String>,
    wallet: Option<Address>,
    challenge: Option<String>,
    authenticated: bool,
    channels: BTreeMap<ChannelId, ChannelState>,
    next_channel: u64,
}

impl Session {
    fn new(shared: Arc<Shared>, index: usize, out: mpsc::UnboundedSender<String>) -> Self {
        let rng = shared.env.fork_rng();
        Self {
            shared,
            index,
            rng,
            out,
            wallet: None,
            challenge: None,
            authenticated: false,
            channels: BTreeMap::new(),
            next_channel: 1,
        }
    }

    fn has_channels(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Handle one inbound frame. Returns `true` when the session went from
    /// no channels to at least one.
    fn handle(&mut self, text: &str) -> bool {
        let inbound = match codec::parse_inbound(text) {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!(connection = self.index, error = %err, "node dropping malformed frame");
                return false;
            },
        };

        self.shared.journal().push(JournalEntry {
            connection: self.index,
            request_id: inbound.request_id,
            method: inbound.method.clone(),
            params: inbound.params.clone(),
        });

        if self.shared.faults().unanswered.contains(&inbound.method) {
            debug!(connection = self.index, method = %inbound.method, "leaving request unanswered");
            return false;
        }

        let had_channels = self.has_channels();
        match &inbound.method {
            Method::AuthRequest => self.auth_request(&inbound),
            Method::AuthVerify => self.auth_verify(&inbound),
            Method::Ping => {
                self.deliver(Duration::ZERO, self.frame(inbound.request_id, Method::Pong, &json!({})));
            },
            Method::CreateChannel | Method::CloseChannel | Method::Transfer | Method::GetChannels
                if !self.authenticated =>
            {
                self.reject(&inbound, CODE_UNAUTHORIZED, "not authenticated", Duration::ZERO);
            },
            Method::CreateChannel => self.create_channel(&inbound),
            Method::CloseChannel => self.close_channel(&inbound),
            Method::Transfer => self.transfer(&inbound),
            Method::GetChannels => self.get_channels(&inbound),
            other => {
                let message = format!("unknown method: {other}");
                self.reject(&inbound, CODE_UNKNOWN_METHOD, &message, Duration::ZERO);
            },
        }
        !had_channels && self.has_channels()
    }

    fn auth_request(&mut self, inbound: &Inbound) {
        let Some(params) = self.decode::<AuthRequestParams>(inbound) else { return };
        let mut nonce = [0u8; 16];
        self.rng.fill(&mut nonce);
        let challenge = hex::encode(nonce);

        debug!(connection = self.index, wallet = %params.address, "issuing auth challenge");
        self.wallet = Some(params.address);
        self.challenge = Some(challenge.clone());
        self.authenticated = false;

        let delay = self.shared.config.challenge_latency.sample(&mut self.rng);
        let reply = AuthChallenge { challenge_message: challenge };
        self.deliver(delay, self.frame(inbound.request_id, Method::AuthChallenge, &reply));
    }

    fn auth_verify(&mut self, inbound: &Inbound) {
        let delay = self.shared.config.verify_latency.sample(&mut self.rng);
        if self.shared.faults().reject_auth {
            self.reject(inbound, CODE_UNAUTHORIZED, "authentication rejected", delay);
            return;
        }
        let Some(params) = self.decode::<AuthVerifyParams>(inbound) else { return };
        if self.challenge.as_deref() != Some(params.challenge.as_str()) {
            self.reject(inbound, CODE_UNAUTHORIZED, "challenge mismatch", delay);
            return;
        }

        info!(connection = self.index, "session authenticated");
        self.authenticated = true;
        self.challenge = None;
        let reply = AuthVerifyResult { success: true };
        self.deliver(delay, self.frame(inbound.request_id, Method::AuthVerify, &reply));
    }

    fn create_channel(&mut self, inbound: &Inbound) {
        let Some(params) = self.decode::<CreateChannelParams>(inbound) else { return };
        let channel_id = ChannelId::from_counter(self.next_channel);
        self.next_channel += 1;
        let balance = if params.allocation == Amount::ZERO {
            self.shared.config.default_balance
        } else {
            params.allocation
        };

        debug!(connection = self.index, %channel_id, %balance, "opening channel");
        self.channels.insert(
            channel_id.clone(),
            ChannelState { status: ChannelStatus::Open, balance, asset: params.asset },
        );

        let delay = self.shared.config.create_latency.sample(&mut self.rng);
        let ack = ChannelAck { channel_id: channel_id.clone(), status: ChannelStatus::Open };
        let update = ChannelUpdate { channel_id, status: ChannelStatus::Open };
        let frames = [
            self.frame(inbound.request_id, Method::CreateChannel, &ack),
            self.frame(PUSH_REQUEST_ID, Method::ChannelUpdate, &update),
        ];
        self.deliver_all(delay, frames.into_iter().flatten().collect());
    }

    fn close_channel(&mut self, inbound: &Inbound) {
        let Some(params) = self.decode::<CloseChannelParams>(inbound) else { return };
        let delay = self.shared.config.close_latency.sample(&mut self.rng);
        if self.channels.remove(&params.channel_id).is_none() {
            self.reject(inbound, CODE_NOT_FOUND, "unknown channel", delay);
            return;
        }

        debug!(connection = self.index, channel_id = %params.channel_id, "closing channel");
        let ack = ChannelAck { channel_id: params.channel_id.clone(), status: ChannelStatus::Closed };
        let update = ChannelUpdate { channel_id: params.channel_id, status: ChannelStatus::Closed };
        let frames = [
            self.frame(inbound.request_id, Method::CloseChannel, &ack),
            self.frame(PUSH_REQUEST_ID, Method::ChannelUpdate, &update),
        ];
        self.deliver_all(delay, frames.into_iter().flatten().collect());
    }

    fn transfer(&mut self, inbound: &Inbound) {
        let Some(params) = self.decode::<TransferParams>(inbound) else { return };
        let delay = self.shared.config.transfer_latency.sample(&mut self.rng);
        if params.allocations.is_empty() {
            self.reject(inbound, CODE_BAD_REQUEST, "no allocations", delay);
            return;
        }
        let amount = params
            .allocations
            .iter()
            .fold(Amount::ZERO, |total, allocation| total.saturating_add(allocation.amount));

        let Some(channel) = self.channels.get_mut(&params.channel_id) else {
            self.reject(inbound, CODE_NOT_FOUND, "unknown channel", delay);
            return;
        };
        let Some(balance) = channel.balance.checked_sub(amount) else {
            self.reject(inbound, CODE_BAD_REQUEST, "insufficient balance", delay);
            return;
        };
        channel.balance = balance;
        let asset = channel.asset.clone();

        debug!(connection = self.index, channel_id = %params.channel_id, %amount, %balance, "transfer settled");
        let from = self.wallet.clone().unwrap_or_else(|| self.shared.key.address().clone());
        let notification = TransferNotification {
            channel_id: params.channel_id.clone(),
            amount,
            asset: asset.clone(),
            from,
            to: params.destination,
        };
        let update = BalanceUpdate { channel_id: params.channel_id, balance, asset };

        self.deliver(delay, self.frame(inbound.request_id, Method::Transfer, &Ack { success: true }));
        let pushes = [
            self.frame(PUSH_REQUEST_ID, Method::TransferNotification, &notification),
            self.frame(PUSH_REQUEST_ID, Method::BalanceUpdate, &update),
        ];
        let push_delay = delay + self.shared.config.transfer_push_delay;
        self.deliver_all(push_delay, pushes.into_iter().flatten().collect());
    }

    fn get_channels(&mut self, inbound: &Inbound) {
        let delay = self.shared.config.query_latency.sample(&mut self.rng);
        let channels = self
            .channels
            .iter()
            .map(|(channel_id, state)| ChannelSummary {
                channel_id: channel_id.clone(),
                status: state.status.clone(),
                balance: state.balance,
                asset: state.asset.clone(),
            })
            .collect();
        let list = ChannelList { channels };
        self.deliver(delay, self.frame(inbound.request_id, Method::GetChannels, &list));
    }

    fn push_balances(&mut self) {
        let frames = self
            .channels
            .iter()
            .filter_map(|(channel_id, state)| {
                let update = BalanceUpdate {
                    channel_id: channel_id.clone(),
                    balance: state.balance,
                    asset: state.asset.clone(),
                };
                self.frame(PUSH_REQUEST_ID, Method::BalanceUpdate, &update)
            })
            .collect();
        self.deliver_all(Duration::ZERO, frames);
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, inbound: &Inbound) -> Option<T> {
        match inbound.decode::<T>() {
            Ok(params) => Some(params),
            Err(err) => {
                let message = format!("invalid params: {err}");
                self.reject(inbound, CODE_BAD_REQUEST, &message, Duration::ZERO);
                None
            },
        }
    }

    fn reject(&self, inbound: &Inbound, code: i64, message: &str, delay: Duration) {
        debug!(connection = self.index, method = %inbound.method, code, message, "rejecting request");
        let params = ErrorParams { code, message: message.to_owned() };
        self.deliver(delay, self.frame(inbound.request_id, Method::Error, &params));
    }

    fn frame<P: Serialize>(&self, request_id: RequestId, method: Method, params: &P) -> Option<String> {
        let timestamp = self.shared.env.unix_time();
        match codec::build_response(request_id, method, params, timestamp, &self.shared.key) {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(connection = self.index, error = %err, "node failed to encode frame");
                None
            },
        }
    }

    fn deliver(&self, delay: Duration, frame: Option<String>) {
        self.deliver_all(delay, frame.into_iter().collect());
    }

    /// Send `frames` in order after `delay`. Frames outliving the session
    /// are dropped.
    fn deliver_all(&self, delay: Duration, frames: Vec<String>) {
        if frames.is_empty() {
            return;
        }
        if delay.is_zero() {
            for frame in frames {
                let _ = self.out.send(frame);
            }
            return;
        }
        let out = self.out.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for frame in frames {
                let _ = out.send(frame);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use clearline_core::{MessageSigner, codec::build_request};
    use clearline_proto::payloads::Allowance;
    use proptest::{prop_assert, proptest};
    use rand::SeedableRng;

    use super::*;

    async fn exchange(
        sink: &mut MemorySink,
        stream: &mut MemoryStream,
        id: RequestId,
        method: Method,
        params: Value,
        key: &dyn MessageSigner,
    ) -> Inbound {
        let text = build_request(id, method, &params, 0, key).unwrap();
        sink.send(text).await.unwrap();
        loop {
            let frame = stream.recv().await.unwrap().unwrap();
            let inbound = codec::parse_inbound(&frame).unwrap();
            if inbound.request_id == id {
                return inbound;
            }
        }
    }

    async fn authenticated_link(node: &MockClearingNode, key: &SessionKey) -> (MemorySink, MemoryStream) {
        let (mut sink, mut stream) = node.connect("mock").await.unwrap();
        let params = serde_json::to_value(AuthRequestParams {
            address: key.address().clone(),
            session_key: key.address().clone(),
            application: "test".into(),
            allowances: vec![Allowance { asset: "usdc".into(), amount: Amount::new(10) }],
            expires_at: 0,
            scope: "console".into(),
        })
        .unwrap();
        let challenge = exchange(&mut sink, &mut stream, 1, Method::AuthRequest, params, key).await;
        let challenge: AuthChallenge = challenge.decode().unwrap();
        let verify = json!({ "challenge": challenge.challenge_message });
        let verdict = exchange(&mut sink, &mut stream, 2, Method::AuthVerify, verify, key).await;
        assert_eq!(verdict.method, Method::AuthVerify);
        (sink, stream)
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_must_match() {
        let node = MockClearingNode::with_seed(3);
        let key = SessionKey::from_seed([1; 32]);
        let (mut sink, mut stream) = node.connect("mock").await.unwrap();

        let params = json!({
            "address": key.address(),
            "session_key": key.address(),
            "application": "test",
            "allowances": [],
            "expires_at": 0,
            "scope": "console",
        });
        exchange(&mut sink, &mut stream, 1, Method::AuthRequest, params, &key).await;
        let verdict =
            exchange(&mut sink, &mut stream, 2, Method::AuthVerify, json!({ "challenge": "nope" }), &key)
                .await;

        assert_eq!(verdict.method, Method::Error);
        assert_eq!(verdict.decode::<ErrorParams>().unwrap().code, CODE_UNAUTHORIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_operations_require_auth() {
        let node = MockClearingNode::new();
        let key = SessionKey::from_seed([1; 32]);
        let (mut sink, mut stream) = node.connect("mock").await.unwrap();

        let reply =
            exchange(&mut sink, &mut stream, 1, Method::GetChannels, json!({}), &key).await;
        assert_eq!(reply.method, Method::Error);
        assert_eq!(reply.decode::<ErrorParams>().unwrap().code, CODE_UNAUTHORIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn overdraft_is_rejected_and_balance_kept() {
        let node = MockClearingNode::new();
        let key = SessionKey::from_seed([2; 32]);
        let (mut sink, mut stream) = authenticated_link(&node, &key).await;

        let create = json!({
            "chain_id": 1,
            "counterpart": "0xpeer",
            "allocation": "100",
            "asset": "usdc",
        });
        let ack = exchange(&mut sink, &mut stream, 3, Method::CreateChannel, create, &key).await;
        let ack: ChannelAck = ack.decode().unwrap();

        let transfer = json!({
            "channel_id": ack.channel_id,
            "destination": "0xpeer",
            "allocations": [{ "asset": "usdc", "amount": "101" }],
        });
        let reply = exchange(&mut sink, &mut stream, 4, Method::Transfer, transfer, &key).await;
        assert_eq!(reply.decode::<ErrorParams>().unwrap().code, CODE_BAD_REQUEST);

        let list = exchange(&mut sink, &mut stream, 5, Method::GetChannels, json!({}), &key).await;
        let list: ChannelList = list.decode().unwrap();
        assert_eq!(list.channels.len(), 1);
        assert_eq!(list.channels[0].balance, Amount::new(100));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_method_gets_error() {
        let node = MockClearingNode::new();
        let key = SessionKey::from_seed([4; 32]);
        let (mut sink, mut stream) = node.connect("mock").await.unwrap();

        let reply = exchange(
            &mut sink,
            &mut stream,
            9,
            Method::Unrecognized("resize_channel".into()),
            json!({}),
            &key,
        )
        .await;
        assert_eq!(reply.method, Method::Error);
        assert_eq!(reply.decode::<ErrorParams>().unwrap().code, CODE_UNKNOWN_METHOD);
        assert_eq!(node.received(&Method::Unrecognized("resize_channel".into())), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sever_ends_stream() {
        let node = MockClearingNode::new();
        let (_sink, mut stream) = node.connect("mock").await.unwrap();
        tokio::task::yield_now().await;

        node.sever_links();
        assert_eq!(stream.recv().await.unwrap(), None);
        assert_eq!(node.connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connections_fail() {
        let node = MockClearingNode::new();
        node.refuse_connections(true);
        let err = node.connect("mock").await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(node.connections(), 0);
    }

    proptest! {
        #[test]
        fn latency_stays_in_range(min in 0u64..5_000, span in 0u64..5_000, seed: u64) {
            let latency = Latency::between_ms(min, min + span);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let delay = latency.sample(&mut rng);
            prop_assert!(delay >= latency.min && delay <= latency.max);
        }
    }
}
