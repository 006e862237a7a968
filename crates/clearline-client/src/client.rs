//! Protocol client facade.

use std::sync::Arc;

use clearline_core::{Environment, MessageSigner, Phase, Transport};
use clearline_proto::{
    Address, Amount, ChannelId, Method,
    payloads::{
        Ack, Allowance, ChannelAck, ChannelList, ChannelSummary, CloseChannelParams,
        CreateChannelParams, TransferParams,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::{
    config::ClientConfig,
    driver::{Command, Driver, DriverParts},
    env::SystemEnv,
    error::ClientError,
    handler::ClientHandler,
};

/// Depth of the command queue between facade and driver.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Handle to a state-channel session with one clearing node.
///
/// Cheap to clone; every clone talks to the same driver task. The driver
/// shuts down and closes the link once the last handle is dropped.
///
/// Must be constructed inside a Tokio runtime.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    wallet: Address,
    commands: mpsc::Sender<Command>,
    phase: watch::Receiver<Phase>,
}

impl Client {
    /// Client over `transport` using the system clock and OS randomness.
    pub fn new<T: Transport>(
        config: ClientConfig,
        transport: T,
        wallet: Arc<dyn MessageSigner>,
        handler: Arc<dyn ClientHandler>,
    ) -> Self {
        Self::with_env(config, transport, wallet, handler, SystemEnv)
    }

    /// Client with an explicit environment.
    pub fn with_env<T: Transport, E: Environment>(
        config: ClientConfig,
        transport: T,
        wallet: Arc<dyn MessageSigner>,
        handler: Arc<dyn ClientHandler>,
        env: E,
    ) -> Self {
        let config = Arc::new(config);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);
        let wallet_address = wallet.address();

        let driver = Driver::new(DriverParts {
            config: Arc::clone(&config),
            transport: Arc::new(transport),
            env,
            wallet,
            handler,
            commands: commands_rx,
            phase: phase_tx,
        });
        tokio::spawn(driver.run());

        Self { config, wallet: wallet_address, commands: commands_tx, phase: phase_rx }
    }

    /// Open the transport and authenticate.
    ///
    /// Resolves once the handshake succeeds. Calling it while already
    /// connected returns immediately.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect { reply })
            .await
            .map_err(|_| ClientError::ConnectionClosed)?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Close the link and stop reconnecting. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Disconnect { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// True when the transport is open and the session key is authenticated.
    pub fn is_connected(&self) -> bool {
        *self.phase.borrow() == Phase::Authenticated
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Wait until the phase satisfies `predicate`.
    pub async fn wait_for_phase(&self, predicate: impl Fn(Phase) -> bool) -> Phase {
        let mut phase = self.phase.clone();
        if let Ok(current) = phase.wait_for(|p| predicate(*p)).await {
            return *current;
        }
        // Driver gone; report where it stopped.
        *phase.borrow()
    }

    /// Address of the wallet behind this client.
    pub fn wallet_address(&self) -> &Address {
        &self.wallet
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a channel with `counterpart` funded with `allocation`.
    pub async fn open_session(
        &self,
        counterpart: Address,
        allocation: Amount,
    ) -> Result<ChannelId, ClientError> {
        let params = CreateChannelParams {
            chain_id: self.config.chain_id,
            counterpart,
            allocation,
            asset: self.config.asset.clone(),
        };
        let ack: ChannelAck = self.request(Method::CreateChannel, &params).await?;
        if ack.channel_id.is_empty() {
            return Err(ClientError::Codec("create_channel returned no channel id".into()));
        }
        debug!(channel_id = %ack.channel_id, "channel opened");
        Ok(ack.channel_id)
    }

    /// Close a channel, settling funds back to the wallet.
    pub async fn close_session(&self, channel_id: ChannelId) -> Result<bool, ClientError> {
        let params = CloseChannelParams { channel_id, funds_destination: self.wallet.clone() };
        let ack: ChannelAck = self.request(Method::CloseChannel, &params).await?;
        debug!(channel_id = %ack.channel_id, status = ?ack.status, "channel closed");
        Ok(true)
    }

    /// Transfer `amount` of the configured asset from `channel_id` to
    /// `target`.
    ///
    /// The local view of the balance is not touched; the clearing node
    /// follows up with a `balance_update` push.
    pub async fn transfer(
        &self,
        channel_id: ChannelId,
        amount: Amount,
        target: Address,
    ) -> Result<bool, ClientError> {
        let params = TransferParams {
            channel_id,
            destination: target,
            allocations: vec![Allowance { asset: self.config.asset.clone(), amount }],
        };
        let ack: Ack = self.request(Method::Transfer, &params).await?;
        Ok(ack.success)
    }

    /// Channels the clearing node knows for this session.
    pub async fn get_channels(&self) -> Result<Vec<ChannelSummary>, ClientError> {
        let list: ChannelList = self.request(Method::GetChannels, &json!({})).await?;
        Ok(list.channels)
    }

    async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        params: &P,
    ) -> Result<R, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let params = serde_json::to_value(params)?;
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Request { method, params, reply })
            .await
            .map_err(|_| ClientError::ConnectionClosed)?;
        let value = rx.await.map_err(|_| ClientError::ConnectionClosed)??;
        Ok(serde_json::from_value(value)?)
    }
}
