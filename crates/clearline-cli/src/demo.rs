//! Scripted demo session.

use std::{
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use clearline_client::{
    ChannelBook, Client, ClientConfig, ClientEvent, EventForwarder, SystemEnv, TcpTransport,
};
use clearline_harness::{LocalWallet, MockClearingNode};
use clearline_proto::{Address, Amount, ChannelId};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use crate::CliError;

/// How long to wait for the balance push that follows a transfer.
const PUSH_WAIT: Duration = Duration::from_secs(15);

pub struct DemoOptions {
    pub mock: bool,
    pub wallet_key: Option<String>,
    pub allocation: Amount,
    pub amount: Amount,
}

fn wallet(key: Option<&str>) -> Result<LocalWallet, CliError> {
    let Some(key) = key else {
        return Ok(LocalWallet::generate(&SystemEnv));
    };
    let bytes = hex::decode(key.trim_start_matches("0x"))
        .map_err(|err| CliError::WalletKey(err.to_string()))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| CliError::WalletKey(format!("expected 32 bytes, got {}", bytes.len())))?;
    Ok(LocalWallet::from_seed(seed))
}

/// Feed pushes into `book` until `channel` reaches `expected`.
async fn balance_push(
    events: &mut UnboundedReceiver<ClientEvent>,
    book: &mut ChannelBook,
    channel: &ChannelId,
    expected: Amount,
) -> Result<(), CliError> {
    let wait = async {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::BalanceUpdate(update) => {
                    info!(channel_id = %update.channel_id, balance = %update.balance, "balance update");
                    book.apply_balance(&update);
                },
                ClientEvent::ChannelUpdate(update) => {
                    book.apply_status(&update);
                },
                _ => {},
            }
            if book.get(channel).is_some_and(|known| known.balance == expected) {
                return true;
            }
        }
        false
    };
    match tokio::time::timeout(PUSH_WAIT, wait).await {
        Ok(true) => Ok(()),
        _ => Err(CliError::Timeout("balance update")),
    }
}

pub async fn run(config: ClientConfig, options: DemoOptions) -> Result<(), CliError> {
    let expected = options.allocation.checked_sub(options.amount).ok_or_else(|| {
        CliError::Amount(format!("{} exceeds allocation {}", options.amount, options.allocation))
    })?;
    let wallet = Arc::new(wallet(options.wallet_key.as_deref())?);
    let (forwarder, mut events) = EventForwarder::channel();
    let handler = Arc::new(forwarder);

    let client = if options.mock {
        info!("using in-process mock clearing node");
        Client::new(config, MockClearingNode::new(), wallet, handler)
    } else {
        info!(endpoint = %config.endpoint, "using network clearing node");
        Client::new(config, TcpTransport, wallet, handler)
    };
    info!(wallet = %client.wallet_address(), "connecting");
    client.connect().await?;

    let counterpart = Address::new("0x00000000000000000000000000000000000000ee");
    let mut book = ChannelBook::new();
    let channel = client.open_session(counterpart.clone(), options.allocation).await?;
    book.opened(channel.clone(), counterpart.clone(), options.allocation);
    info!(channel_id = %channel, "channel open");

    client.transfer(channel.clone(), options.amount, counterpart).await?;
    balance_push(&mut events, &mut book, &channel, expected).await?;

    client.close_session(channel.clone()).await?;
    let settled = book.closed(&channel).map_or(expected, |known| known.balance);
    let remaining = client.get_channels().await?;
    client.disconnect().await;

    let mut out = io::stdout().lock();
    writeln!(out, "wallet    {}", client.wallet_address())?;
    writeln!(out, "channel   {channel}")?;
    writeln!(out, "sent      {}", options.amount)?;
    writeln!(out, "balance   {settled}")?;
    writeln!(out, "open      {}", remaining.len())?;
    Ok(())
}
