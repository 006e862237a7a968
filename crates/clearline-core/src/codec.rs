//! Message codec.
//!
//! Builds signed envelopes and parses inbound ones. Stateless: request ids
//! come from the [`crate::correlator::Correlator`], timestamps from the
//! [`crate::env::Environment`], signatures from whichever
//! [`MessageSigner`] is active.
//!
//! Inbound signatures are not verified. From the client's side, signature
//! validity is the clearing node's concern; the client trusts the transport
//! it authenticated over.

use clearline_proto::{Body, Envelope, Method, RequestId, WireError, frame::PUSH_REQUEST_ID};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::signer::{MessageSigner, SignerError};

/// Errors raised while building or reading envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed wire message
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Params did not match the expected shape
    #[error("params do not match {expected}: {source}")]
    Params {
        /// Name of the expected payload type
        expected: &'static str,
        /// Underlying decode error
        source: serde_json::Error,
    },

    /// The signer refused
    #[error(transparent)]
    Signer(#[from] SignerError),
}

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Request id, `0` for pushes
    pub request_id: RequestId,
    /// Method, possibly unrecognized
    pub method: Method,
    /// Params object
    pub params: Map<String, Value>,
    /// Sender timestamp
    pub timestamp: u64,
}

impl Inbound {
    /// True for unsolicited server pushes.
    pub fn is_push(&self) -> bool {
        self.request_id == PUSH_REQUEST_ID
    }

    /// Decode the params into a typed payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|source| CodecError::Params { expected: std::any::type_name::<T>(), source })
    }

    /// Params as a JSON value.
    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

fn params_to_value<P: Serialize>(params: &P) -> Result<Value, CodecError> {
    serde_json::to_value(params).map_err(|e| CodecError::Wire(WireError::Json(e)))
}

/// Build a signed request envelope.
///
/// The signature covers the canonical bytes of the body array.
pub fn build_request<P: Serialize>(
    request_id: RequestId,
    method: Method,
    params: &P,
    timestamp: u64,
    signer: &dyn MessageSigner,
) -> Result<String, CodecError> {
    let body = Body::new(request_id, method, params_to_value(params)?, timestamp);
    let signature = signer.sign(&body.signing_bytes()?)?;
    Ok(Envelope::request(body, signature.to_hex()).to_text()?)
}

/// Build a signed response or push envelope. Used by clearing node
/// implementations; pushes carry request id `0`.
pub fn build_response<P: Serialize>(
    request_id: RequestId,
    method: Method,
    params: &P,
    timestamp: u64,
    signer: &dyn MessageSigner,
) -> Result<String, CodecError> {
    let body = Body::new(request_id, method, params_to_value(params)?, timestamp);
    let signature = signer.sign(&body.signing_bytes()?)?;
    Ok(Envelope::response(body, signature.to_hex()).to_text()?)
}

/// Parse any inbound text frame into its parts.
pub fn parse_inbound(text: &str) -> Result<Inbound, CodecError> {
    let body = Envelope::from_text(text)?.into_body()?;
    let params = body.params()?;
    let Body(request_id, method, _, timestamp) = body;
    Ok(Inbound { request_id, method, params, timestamp })
}

#[cfg(test)]
mod tests {
    use clearline_proto::payloads::BalanceUpdate;
    use serde_json::json;

    use super::*;
    use crate::session_key::SessionKey;

    #[test]
    fn request_round_trips_through_parser() {
        let key = SessionKey::from_seed([3; 32]);
        let text =
            build_request(12, Method::Transfer, &json!({ "channel_id": "0x01" }), 99, &key)
                .unwrap();

        let inbound = parse_inbound(&text).unwrap();
        assert_eq!(inbound.request_id, 12);
        assert_eq!(inbound.method, Method::Transfer);
        assert_eq!(inbound.timestamp, 99);
        assert_eq!(inbound.params["channel_id"], json!("0x01"));
        assert!(!inbound.is_push());
    }

    #[test]
    fn signature_covers_body_bytes() {
        let key = SessionKey::from_seed([4; 32]);
        let text = build_request(1, Method::Ping, &json!({}), 5, &key).unwrap();

        let envelope = Envelope::from_text(&text).unwrap();
        let body = envelope.body().unwrap();
        let expected = key.sign(&body.signing_bytes().unwrap()).unwrap();
        assert_eq!(envelope.sig, vec![expected.to_hex()]);
    }

    #[test]
    fn push_decodes_into_typed_payload() {
        let node = SessionKey::from_seed([5; 32]);
        let text = build_response(
            0,
            Method::BalanceUpdate,
            &json!({ "channel_id": "0xaa", "balance": "750000", "asset": "usdc" }),
            1,
            &node,
        )
        .unwrap();

        let inbound = parse_inbound(&text).unwrap();
        assert!(inbound.is_push());
        let update: BalanceUpdate = inbound.decode().unwrap();
        assert_eq!(update.balance.get(), 750_000);
    }

    #[test]
    fn unknown_method_is_not_an_error() {
        let inbound =
            parse_inbound(r#"{"res":[0,"assets_update",[{"x":1}],1],"sig":[]}"#).unwrap();
        assert_eq!(inbound.method, Method::Unrecognized("assets_update".into()));
    }

    #[test]
    fn wrong_params_shape_reports_expected_type() {
        let inbound = parse_inbound(r#"{"res":[0,"balance_update",[{}],1],"sig":[]}"#).unwrap();
        let err = inbound.decode::<BalanceUpdate>().unwrap_err();
        assert!(matches!(err, CodecError::Params { .. }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"sig":[]}"#).is_err());
    }
}
