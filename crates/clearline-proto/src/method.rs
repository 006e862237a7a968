//! Protocol method names.
//!
//! Methods are a closed set of known names plus an explicit
//! [`Method::Unrecognized`] variant. Decoding never fails on an unknown name:
//! newer servers may push methods this client does not understand yet, and
//! those must be routed to an ignore path rather than tear the connection
//! down.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A protocol method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// Client asks to authenticate a session key
    AuthRequest,
    /// Server challenge answering an auth request
    AuthChallenge,
    /// Client proves wallet ownership over the challenge
    AuthVerify,
    /// Open a payment channel
    CreateChannel,
    /// Close a payment channel
    CloseChannel,
    /// Transfer inside a channel
    Transfer,
    /// List the channels the server knows for this session
    GetChannels,
    /// Keepalive probe
    Ping,
    /// Keepalive answer
    Pong,
    /// Push: authoritative channel balance snapshot
    BalanceUpdate,
    /// Push: channel status change
    ChannelUpdate,
    /// Push: a transfer touched one of our channels
    TransferNotification,
    /// Server-side error, either as a response or a push
    Error,
    /// Any method this client does not know
    Unrecognized(String),
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthRequest => "auth_request",
            Self::AuthChallenge => "auth_challenge",
            Self::AuthVerify => "auth_verify",
            Self::CreateChannel => "create_channel",
            Self::CloseChannel => "close_channel",
            Self::Transfer => "transfer",
            Self::GetChannels => "get_channels",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::BalanceUpdate => "balance_update",
            Self::ChannelUpdate => "channel_update",
            Self::TransferNotification => "transfer_notification",
            Self::Error => "error",
            Self::Unrecognized(name) => name,
        }
    }

    /// Parse a wire name. Unknown names map to [`Method::Unrecognized`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "auth_request" => Self::AuthRequest,
            "auth_challenge" => Self::AuthChallenge,
            "auth_verify" => Self::AuthVerify,
            "create_channel" => Self::CreateChannel,
            "close_channel" => Self::CloseChannel,
            "transfer" => Self::Transfer,
            "get_channels" => Self::GetChannels,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "balance_update" => Self::BalanceUpdate,
            "channel_update" => Self::ChannelUpdate,
            "transfer_notification" => Self::TransferNotification,
            "error" => Self::Error,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// True for methods the server sends unsolicited.
    pub fn is_push(&self) -> bool {
        matches!(
            self,
            Self::BalanceUpdate | Self::ChannelUpdate | Self::TransferNotification | Self::Error
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_are_stable() {
        for method in [
            Method::AuthRequest,
            Method::AuthChallenge,
            Method::AuthVerify,
            Method::CreateChannel,
            Method::CloseChannel,
            Method::Transfer,
            Method::GetChannels,
            Method::Ping,
            Method::Pong,
            Method::BalanceUpdate,
            Method::ChannelUpdate,
            Method::TransferNotification,
            Method::Error,
        ] {
            assert_eq!(Method::from_name(method.as_str()), method);
        }
    }

    #[test]
    fn unknown_name_is_preserved() {
        let method = Method::from_name("assets_update");
        assert_eq!(method, Method::Unrecognized("assets_update".into()));
        assert_eq!(method.as_str(), "assets_update");
        assert!(!method.is_push());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Method::BalanceUpdate).unwrap();
        assert_eq!(json, "\"balance_update\"");

        let back: Method = serde_json::from_str("\"close_channel\"").unwrap();
        assert_eq!(back, Method::CloseChannel);
    }

    proptest::proptest! {
        #[test]
        fn any_name_decodes(name in "[a-z_]{1,24}") {
            let method: Method = serde_json::from_value(serde_json::Value::String(name.clone())).unwrap();
            proptest::prop_assert_eq!(method.as_str(), name.as_str());
            proptest::prop_assert_eq!(serde_json::to_value(&method).unwrap(), serde_json::Value::String(name));
        }
    }
}
