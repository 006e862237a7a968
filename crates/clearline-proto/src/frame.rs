//! Envelope and body layout.
//!
//! The body is a positional JSON array `[request_id, method, [params],
//! timestamp]`. Its serialized bytes are the signing payload, so the field
//! order here is part of the protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    errors::{Result, WireError},
    method::Method,
    types::RequestId,
};

/// Request id used by server pushes.
pub const PUSH_REQUEST_ID: RequestId = 0;

/// Positional message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body(pub RequestId, pub Method, pub Vec<Value>, pub u64);

impl Body {
    /// Build a body with a single params object.
    pub fn new(request_id: RequestId, method: Method, params: Value, timestamp: u64) -> Self {
        Self(request_id, method, vec![params], timestamp)
    }

    /// Request id of the body.
    pub fn request_id(&self) -> RequestId {
        self.0
    }

    /// Method of the body.
    pub fn method(&self) -> &Method {
        &self.1
    }

    /// Unix timestamp in seconds.
    pub fn timestamp(&self) -> u64 {
        self.3
    }

    /// The params object. Missing params decode as an empty object.
    pub fn params(&self) -> Result<Map<String, Value>> {
        match self.2.first() {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(WireError::InvalidParams { method: self.1.to_string() }),
        }
    }

    /// Canonical bytes covered by the envelope signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A full wire message: exactly one body plus detached signatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Request body (client to server)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req: Option<Body>,
    /// Response or push body (server to client)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub res: Option<Body>,
    /// Detached signatures over the body bytes
    #[serde(default)]
    pub sig: Vec<String>,
}

impl Envelope {
    /// Request envelope.
    pub fn request(body: Body, signature: String) -> Self {
        Self { req: Some(body), res: None, sig: vec![signature] }
    }

    /// Response or push envelope.
    pub fn response(body: Body, signature: String) -> Self {
        Self { req: None, res: Some(body), sig: vec![signature] }
    }

    /// Whichever body is present, preferring `res`.
    pub fn body(&self) -> Result<&Body> {
        self.res.as_ref().or(self.req.as_ref()).ok_or(WireError::MissingBody)
    }

    /// Consume the envelope and return its body.
    pub fn into_body(self) -> Result<Body> {
        self.res.or(self.req).ok_or(WireError::MissingBody)
    }

    /// Serialize to a text frame.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a text frame.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
