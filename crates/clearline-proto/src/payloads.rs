//! Typed params for each method.
//!
//! Every struct here is the single object inside the body's params slot.
//! Push payloads tolerate missing fields with the same defaults the clearing
//! node documents (`asset` falls back to `usdc`, `status` to `open`).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{Address, Amount, ChannelId};

fn default_asset() -> String {
    "usdc".to_string()
}

/// An (asset, ceiling) pair pre-authorized for the session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    /// Asset symbol
    pub asset: String,
    /// Ceiling in smallest units
    pub amount: Amount,
}

/// Channel lifecycle status as reported by the clearing node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ChannelStatus {
    /// Channel accepts transfers
    #[default]
    Open,
    /// Channel settled and removed
    Closed,
    /// Status string this client does not know
    Other(String),
}

impl ChannelStatus {
    /// Wire string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChannelStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChannelStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let status = String::deserialize(deserializer)?;
        Ok(match status.as_str() {
            "open" => Self::Open,
            "closed" => Self::Closed,
            _ => Self::Other(status),
        })
    }
}

/// `auth_request` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequestParams {
    /// Wallet that owns the session
    pub address: Address,
    /// Ephemeral session key address
    pub session_key: Address,
    /// Application identifier
    pub application: String,
    /// Spending ceilings granted to the session key
    pub allowances: Vec<Allowance>,
    /// Unix expiry of the grant
    pub expires_at: u64,
    /// Permission scope
    pub scope: String,
}

/// `auth_challenge` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    /// Opaque challenge to be signed
    #[serde(rename = "challengeMessage", alias = "challenge_message")]
    pub challenge_message: String,
}

/// `auth_verify` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthVerifyParams {
    /// Challenge echoed back, covered by the wallet signature
    pub challenge: String,
}

/// `auth_verify` response params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthVerifyResult {
    /// Whether the server accepted the proof
    #[serde(default)]
    pub success: bool,
}

/// `create_channel` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChannelParams {
    /// Chain the channel settles on
    pub chain_id: u64,
    /// Counterpart participant
    pub counterpart: Address,
    /// Allocation ceiling
    pub allocation: Amount,
    /// Asset held in the channel
    pub asset: String,
}

/// `create_channel` and `close_channel` response params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAck {
    /// Channel the response refers to
    pub channel_id: ChannelId,
    /// Status after the operation
    #[serde(default)]
    pub status: ChannelStatus,
}

/// `close_channel` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseChannelParams {
    /// Channel to close
    pub channel_id: ChannelId,
    /// Where remaining funds settle
    pub funds_destination: Address,
}

/// `transfer` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    /// Channel the transfer draws on
    pub channel_id: ChannelId,
    /// Receiving participant
    pub destination: Address,
    /// Per-asset amounts
    pub allocations: Vec<Allowance>,
}

/// Generic `{success}` acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the server applied the operation
    #[serde(default)]
    pub success: bool,
}

/// One entry of a `get_channels` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Channel id
    pub channel_id: ChannelId,
    /// Current status
    #[serde(default)]
    pub status: ChannelStatus,
    /// Authoritative balance
    pub balance: Amount,
    /// Asset symbol
    #[serde(default = "default_asset")]
    pub asset: String,
}

/// `get_channels` response params.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelList {
    /// Channels the server holds for this session
    #[serde(default)]
    pub channels: Vec<ChannelSummary>,
}

/// `balance_update` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    /// Channel the snapshot belongs to
    pub channel_id: ChannelId,
    /// Authoritative balance snapshot
    pub balance: Amount,
    /// Asset symbol
    #[serde(default = "default_asset")]
    pub asset: String,
}

/// `channel_update` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    /// Channel that changed
    pub channel_id: ChannelId,
    /// New status
    #[serde(default)]
    pub status: ChannelStatus,
}

/// `transfer_notification` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferNotification {
    /// Channel the transfer used
    pub channel_id: ChannelId,
    /// Amount moved
    pub amount: Amount,
    /// Asset symbol
    #[serde(default = "default_asset")]
    pub asset: String,
    /// Sender
    pub from: Address,
    /// Receiver
    pub to: Address,
}

/// `error` params, as a response or a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorParams {
    /// Server error code
    #[serde(default)]
    pub code: i64,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}
