//! Driver task.
//!
//! A single task owns the [`Connection`] state machine, the [`Correlator`],
//! the session key and the transport link. Every mutation (caller commands,
//! inbound frames, link events, timers) is serialized through its select
//! loop, so none of that state needs a lock.
//!
//! Timers are not separate tasks. Before each turn the driver asks the
//! connection and the correlator for their next deadline and sleeps until
//! the earliest one.

use std::{collections::VecDeque, io, sync::Arc, time::Duration};

use clearline_core::{
    AuthClaim, AuthSigner, Connection, ConnectionAction, Correlator, Environment, MessageSigner,
    Phase, SessionKey, Transport, TransportSink, TransportStream, codec,
};
use clearline_proto::{
    Method,
    payloads::{BalanceUpdate, ChannelUpdate, ErrorParams, TransferNotification},
};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::{
    config::ClientConfig,
    error::ClientError,
    handler::ClientHandler,
    handshake::{self, AuthEvent, Reply, RequestSigner},
};

/// Caller requests, sent by the [`crate::Client`] facade.
pub(crate) enum Command {
    Connect { reply: oneshot::Sender<Result<(), ClientError>> },
    Disconnect { reply: oneshot::Sender<()> },
    Request { method: Method, params: Value, reply: Reply },
}

/// Result of a spawned transport open.
pub(crate) struct Opened<T: Transport> {
    epoch: u64,
    result: Result<(T::Sink, T::Stream), ClientError>,
}

struct Link<T: Transport> {
    epoch: u64,
    sink: T::Sink,
    stream: T::Stream,
}

struct Pending {
    method: Method,
    budget: Duration,
    reply: Reply,
}

/// Everything a driver needs from the facade.
pub(crate) struct DriverParts<T, E> {
    pub config: Arc<ClientConfig>,
    pub transport: Arc<T>,
    pub env: E,
    pub wallet: Arc<dyn MessageSigner>,
    pub handler: Arc<dyn ClientHandler>,
    pub commands: mpsc::Receiver<Command>,
    pub phase: watch::Sender<Phase>,
}

pub(crate) struct Driver<T: Transport, E: Environment> {
    config: Arc<ClientConfig>,
    transport: Arc<T>,
    env: E,
    wallet: Arc<dyn MessageSigner>,
    handler: Arc<dyn ClientHandler>,
    connection: Connection,
    correlator: Correlator<Pending>,
    session: Option<SessionKey>,
    link: Option<Link<T>>,
    connect_waiters: Vec<oneshot::Sender<Result<(), ClientError>>>,
    commands: mpsc::Receiver<Command>,
    opened_tx: mpsc::UnboundedSender<Opened<T>>,
    opened_rx: mpsc::UnboundedReceiver<Opened<T>>,
    auth_tx: mpsc::UnboundedSender<AuthEvent>,
    auth_rx: mpsc::UnboundedReceiver<AuthEvent>,
    phase: watch::Sender<Phase>,
}

impl<T: Transport, E: Environment> Driver<T, E> {
    pub(crate) fn new(parts: DriverParts<T, E>) -> Self {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        Self {
            connection: Connection::new(parts.config.connection_config()),
            config: parts.config,
            transport: parts.transport,
            env: parts.env,
            wallet: parts.wallet,
            handler: parts.handler,
            correlator: Correlator::new(),
            session: None,
            link: None,
            connect_waiters: Vec::new(),
            commands: parts.commands,
            opened_tx,
            opened_rx,
            auth_tx,
            auth_rx,
            phase: parts.phase,
        }
    }

    /// Run until the facade is dropped.
    pub(crate) async fn run(mut self) {
        loop {
            let deadline = match (self.connection.next_deadline(), self.correlator.next_deadline())
            {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at.into()).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        return;
                    },
                },
                Some(opened) = self.opened_rx.recv() => self.handle_opened(opened).await,
                Some(event) = self.auth_rx.recv() => self.handle_auth(event).await,
                (epoch, frame) = recv_frame(&mut self.link) => self.handle_frame(epoch, frame).await,
                () = timer => self.handle_timers().await,
            }

            self.publish_phase();
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                if self.connection.is_connected() {
                    let _ = reply.send(Ok(()));
                    return;
                }
                match self.connection.connect(self.env.now()) {
                    Ok(actions) => {
                        self.connect_waiters.push(reply);
                        self.execute(actions).await;
                    },
                    Err(err) => {
                        let _ = reply.send(Err(ClientError::Transport(err.to_string())));
                    },
                }
            },
            Command::Disconnect { reply } => {
                let actions = self.connection.disconnect(self.env.now());
                self.execute(actions).await;
                self.fail_waiters(&ClientError::ConnectionClosed);
                let _ = reply.send(());
            },
            Command::Request { method, params, reply } => {
                if !self.connection.is_connected() {
                    let _ = reply.send(Err(ClientError::NotConnected));
                    return;
                }
                self.send_request(method, params, RequestSigner::Session, reply).await;
            },
        }
    }

    async fn handle_opened(&mut self, opened: Opened<T>) {
        let Opened { epoch, result } = opened;
        let now = self.env.now();
        match result {
            Ok((mut sink, stream)) => {
                let actions = self.connection.transport_opened(epoch, now);
                if actions.is_empty() {
                    debug!(epoch, "discarding link from a superseded attempt");
                    let _ = sink.close().await;
                    return;
                }
                self.link = Some(Link { epoch, sink, stream });
                self.execute(actions).await;
            },
            Err(err) => {
                let actions = self.connection.failed(epoch, now);
                if actions.is_empty() {
                    return;
                }
                warn!(epoch, error = %err, "transport failed to open");
                self.handler.on_error(&err);
                self.fail_waiters(&err);
                self.execute(actions).await;
            },
        }
    }

    async fn handle_auth(&mut self, event: AuthEvent) {
        let current =
            |epoch: u64, conn: &Connection| epoch == conn.epoch() && conn.phase() == Phase::Authenticating;

        match event {
            AuthEvent::Request { epoch, method, params, signer, reply } => {
                if !current(epoch, &self.connection) {
                    let _ = reply.send(Err(ClientError::ConnectionClosed));
                    return;
                }
                self.send_request(method, params, signer, reply).await;
            },
            AuthEvent::Settled { epoch, result } => {
                if !current(epoch, &self.connection) {
                    debug!(epoch, "ignoring stale handshake outcome");
                    return;
                }
                let now = self.env.now();
                match result {
                    Ok(()) => {
                        let actions = self.connection.authenticated(epoch, now);
                        self.execute(actions).await;
                    },
                    Err(err) => {
                        warn!(epoch, error = %err, "authentication failed");
                        let actions = self.connection.failed(epoch, now);
                        self.handler.on_error(&err);
                        self.fail_waiters(&err);
                        self.execute(actions).await;
                    },
                }
            },
        }
    }

    async fn handle_frame(&mut self, epoch: u64, frame: io::Result<Option<String>>) {
        let now = self.env.now();
        let actions = match frame {
            Ok(Some(text)) => {
                self.dispatch(&text);
                return;
            },
            Ok(None) => {
                info!(epoch, "link closed by peer");
                let actions = self.connection.closed(epoch, now);
                self.fail_waiters(&ClientError::ConnectionClosed);
                actions
            },
            Err(err) => {
                warn!(epoch, error = %err, "link failed");
                let err = ClientError::Transport(err.to_string());
                let actions = self.connection.failed(epoch, now);
                self.handler.on_error(&err);
                self.fail_waiters(&err);
                actions
            },
        };
        self.execute(actions).await;

        // The stream is finished either way; never poll it again.
        if let Some(mut link) = self.link.take_if(|link| link.epoch == epoch) {
            let _ = link.sink.close().await;
        }
    }

    async fn handle_timers(&mut self) {
        let now = self.env.now();
        for (request_id, pending) in self.correlator.expire(now) {
            warn!(request_id, method = %pending.method, budget = ?pending.budget, "request timed out");
            let _ = pending
                .reply
                .send(Err(ClientError::RequestTimeout { method: pending.method, budget: pending.budget }));
        }
        let actions = self.connection.tick(now);
        self.execute(actions).await;
    }

    /// Route an inbound frame: correlator first, then push handlers.
    fn dispatch(&mut self, text: &str) {
        let inbound = match codec::parse_inbound(text) {
            Ok(inbound) => inbound,
            Err(err) => {
                debug!(error = %err, "dropping malformed frame");
                return;
            },
        };

        let pending =
            if inbound.is_push() { None } else { self.correlator.resolve(inbound.request_id) };
        if let Some(pending) = pending {
            debug!(request_id = inbound.request_id, method = %pending.method, "response matched");
            let outcome = if inbound.method == Method::Error {
                Err(protocol_error(&inbound))
            } else {
                Ok(inbound.params_value())
            };
            let _ = pending.reply.send(outcome);
            return;
        }

        match &inbound.method {
            Method::BalanceUpdate => match inbound.decode::<BalanceUpdate>() {
                Ok(update) => {
                    debug!(channel_id = %update.channel_id, balance = %update.balance, "balance update");
                    self.handler.on_balance_update(&update);
                },
                Err(err) => debug!(error = %err, "dropping malformed balance update"),
            },
            Method::ChannelUpdate => match inbound.decode::<ChannelUpdate>() {
                Ok(update) => {
                    debug!(channel_id = %update.channel_id, status = ?update.status, "channel update");
                    self.handler.on_channel_update(&update);
                },
                Err(err) => debug!(error = %err, "dropping malformed channel update"),
            },
            Method::TransferNotification => match inbound.decode::<TransferNotification>() {
                Ok(notification) => {
                    debug!(channel_id = %notification.channel_id, amount = %notification.amount, "transfer notification");
                    self.handler.on_transfer_notification(&notification);
                },
                Err(err) => debug!(error = %err, "dropping malformed transfer notification"),
            },
            Method::Pong => trace!(request_id = inbound.request_id, "pong"),
            Method::Error => {
                let err = protocol_error(&inbound);
                warn!(error = %err, "clearing node reported an error");
                self.handler.on_error(&err);
            },
            other => debug!(method = %other, request_id = inbound.request_id, "dropping unsolicited message"),
        }
    }

    async fn send_request(
        &mut self,
        method: Method,
        params: Value,
        signer: RequestSigner,
        reply: Reply,
    ) {
        let request_id = self.correlator.next_id();
        let timestamp = self.env.unix_time();
        let built = match (&signer, &self.session) {
            (_, None) => Err(ClientError::NotConnected),
            (RequestSigner::Session, Some(session)) => {
                codec::build_request(request_id, method.clone(), &params, timestamp, session)
                    .map_err(ClientError::from)
            },
            (RequestSigner::Wallet(auth), Some(_)) => {
                codec::build_request(request_id, method.clone(), &params, timestamp, &**auth)
                    .map_err(ClientError::from)
            },
        };
        let text = match built {
            Ok(text) => text,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            },
        };

        let budget = self.config.request_timeout();
        let deadline = self.env.now() + budget;
        let pending = Pending { method: method.clone(), budget, reply };
        if let Err(err) = self.correlator.register(request_id, pending, deadline) {
            warn!(request_id, error = %err, "request id collision");
            return;
        }

        debug!(request_id, %method, "sending request");
        if let Err(actions) = self.transmit(text).await {
            self.execute(actions).await;
        }
    }

    /// Write a frame to the current link. On failure returns the teardown
    /// actions the caller must execute.
    async fn transmit(&mut self, text: String) -> Result<(), Vec<ConnectionAction>> {
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        match link.sink.send(text).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let epoch = link.epoch;
                warn!(epoch, error = %err, "send failed");
                let err = ClientError::Transport(err.to_string());
                let actions = self.connection.failed(epoch, self.env.now());
                self.handler.on_error(&err);
                self.fail_waiters(&err);
                Err(actions)
            },
        }
    }

    async fn execute(&mut self, actions: Vec<ConnectionAction>) {
        let mut queue: VecDeque<ConnectionAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                ConnectionAction::OpenTransport { epoch } => self.open_transport(epoch),
                ConnectionAction::BeginAuth { epoch } => self.begin_auth(epoch),
                ConnectionAction::NotifyOpen => {
                    info!(epoch = self.connection.epoch(), "transport open");
                    self.handler.on_open();
                },
                ConnectionAction::NotifyAuthenticated => {
                    if let Some(session) = &self.session {
                        info!(epoch = self.connection.epoch(), session_key = %session.address(), "authenticated");
                    }
                    self.publish_phase();
                    self.handler.on_authenticated();
                    for waiter in self.connect_waiters.drain(..) {
                        let _ = waiter.send(Ok(()));
                    }
                },
                ConnectionAction::NotifyClosed => {
                    info!(epoch = self.connection.epoch(), "connection closed");
                    self.publish_phase();
                    self.handler.on_close();
                },
                ConnectionAction::SendPing => {
                    let text = match &self.session {
                        Some(session) => {
                            let request_id = self.correlator.next_id();
                            codec::build_request(
                                request_id,
                                Method::Ping,
                                &json!({}),
                                self.env.unix_time(),
                                session,
                            )
                        },
                        None => continue,
                    };
                    match text {
                        Ok(text) => {
                            trace!("keepalive ping");
                            if let Err(actions) = self.transmit(text).await {
                                queue.extend(actions);
                            }
                        },
                        Err(err) => warn!(error = %err, "failed to build keepalive ping"),
                    }
                },
                ConnectionAction::StopKeepalive => debug!("keepalive stopped"),
                ConnectionAction::RejectPending => {
                    for (request_id, pending) in self.correlator.drain() {
                        debug!(request_id, method = %pending.method, "rejecting pending request");
                        let _ = pending.reply.send(Err(ClientError::ConnectionClosed));
                    }
                    self.session = None;
                },
                ConnectionAction::CloseTransport => {
                    if let Some(mut link) = self.link.take() {
                        if let Err(err) = link.sink.close().await {
                            debug!(epoch = link.epoch, error = %err, "error closing link");
                        }
                        if self.connection.phase() == Phase::Closing {
                            queue.extend(self.connection.closed(link.epoch, self.env.now()));
                        }
                    }
                },
                ConnectionAction::CancelReconnect => info!("scheduled reconnect cancelled"),
                ConnectionAction::ScheduleReconnect { attempt, delay } => {
                    info!(attempt, ?delay, "reconnect scheduled");
                },
                ConnectionAction::ReconnectExhausted { attempts } => {
                    let err = ClientError::ReconnectExhausted { attempts };
                    warn!(attempts, "reconnect gave up");
                    self.handler.on_error(&err);
                    self.fail_waiters(&err);
                },
            }
        }
        self.publish_phase();
    }

    /// Push the current phase to `Client` readers. Runs before waking anyone
    /// who may read it.
    fn publish_phase(&self) {
        self.phase.send_replace(self.connection.phase());
    }

    fn open_transport(&mut self, epoch: u64) {
        self.correlator = Correlator::new();
        self.session = Some(SessionKey::generate(&self.env));

        let transport = Arc::clone(&self.transport);
        let endpoint = self.config.endpoint.clone();
        let budget = self.config.connection_timeout();
        let opened = self.opened_tx.clone();
        info!(epoch, %endpoint, "opening transport");

        tokio::spawn(async move {
            let result = match tokio::time::timeout(budget, transport.connect(&endpoint)).await {
                Ok(Ok(halves)) => Ok(halves),
                Ok(Err(err)) => Err(ClientError::Transport(err.to_string())),
                Err(_) => Err(ClientError::ConnectionTimeout),
            };
            let _ = opened.send(Opened { epoch, result });
        });
    }

    fn begin_auth(&mut self, epoch: u64) {
        let Some(session) = &self.session else {
            let failure = Err(ClientError::AuthFailure("no session key".into()));
            let _ = self.auth_tx.send(AuthEvent::Settled { epoch, result: failure });
            return;
        };

        let claim = AuthClaim {
            wallet: self.wallet.address(),
            session_key: session.address().clone(),
            application: self.config.application.clone(),
            allowances: self.config.allowances.clone(),
            expires_at: self.env.unix_time() + self.config.session_duration().as_secs(),
            scope: self.config.scope.clone(),
        };
        debug!(epoch, session_key = %claim.session_key, "starting handshake");
        let signer = AuthSigner::new(Arc::clone(&self.wallet), claim, self.config.auth_domain.clone());
        tokio::spawn(handshake::run(epoch, signer, self.env.clone(), self.auth_tx.clone()));
    }

    fn fail_waiters(&mut self, err: &ClientError) {
        self.publish_phase();
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
    }

    async fn shutdown(&mut self) {
        debug!("client dropped, shutting down driver");
        let actions = self.connection.disconnect(self.env.now());
        self.execute(actions).await;
        self.fail_waiters(&ClientError::ConnectionClosed);
    }
}

/// Next frame from the link, or never when there is none.
async fn recv_frame<T: Transport>(link: &mut Option<Link<T>>) -> (u64, io::Result<Option<String>>) {
    match link {
        Some(link) => (link.epoch, link.stream.recv().await),
        None => std::future::pending().await,
    }
}

fn protocol_error(inbound: &codec::Inbound) -> ClientError {
    match inbound.decode::<ErrorParams>() {
        Ok(params) => ClientError::Protocol { code: params.code, message: params.message },
        Err(err) => ClientError::Codec(err.to_string()),
    }
}
