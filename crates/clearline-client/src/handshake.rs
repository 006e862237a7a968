//! Auth handshake task.
//!
//! Runs beside the driver for one epoch. Each step is an ordinary round trip
//! submitted back to the driver, so handshake messages get ids, deadlines and
//! teardown semantics like any other request. Only the signer differs:
//! `auth_request` is signed by the session key, `auth_verify` by the wallet
//! through the single-use [`AuthSigner`].

use clearline_core::{AuthSigner, Environment};
use clearline_proto::{
    Method,
    payloads::{AuthChallenge, AuthVerifyParams, AuthVerifyResult},
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::ClientError;

/// Completion for a round trip.
pub(crate) type Reply = oneshot::Sender<Result<Value, ClientError>>;

/// Which key signs an outgoing request.
pub(crate) enum RequestSigner {
    /// The connection's session key
    Session,
    /// The wallet, through a claim-bound auth signer
    Wallet(Box<AuthSigner>),
}

/// Messages from a handshake task to the driver.
pub(crate) enum AuthEvent {
    /// Send a request on the `epoch` link
    Request {
        epoch: u64,
        method: Method,
        params: Value,
        signer: RequestSigner,
        reply: Reply,
    },
    /// The handshake for `epoch` finished
    Settled { epoch: u64, result: Result<(), ClientError> },
}

/// Run the handshake for `epoch` and report the outcome.
pub(crate) async fn run<E: Environment>(
    epoch: u64,
    signer: AuthSigner,
    env: E,
    events: mpsc::UnboundedSender<AuthEvent>,
) {
    let result = authenticate(epoch, signer, &env, &events).await;
    if let Err(err) = &result {
        debug!(epoch, error = %err, "handshake failed");
    }
    // Driver gone means the client was dropped mid-handshake.
    let _ = events.send(AuthEvent::Settled { epoch, result });
}

async fn authenticate<E: Environment>(
    epoch: u64,
    signer: AuthSigner,
    env: &E,
    events: &mpsc::UnboundedSender<AuthEvent>,
) -> Result<(), ClientError> {
    let params = serde_json::to_value(signer.claim().request_params())?;
    let challenge =
        round_trip(events, epoch, Method::AuthRequest, params, RequestSigner::Session).await?;
    let challenge: AuthChallenge = serde_json::from_value(challenge)
        .map_err(|e| ClientError::AuthFailure(format!("malformed challenge: {e}")))?;

    // The wallet must not sign a grant that is already dead.
    if signer.claim().is_expired(env.unix_time()) {
        return Err(ClientError::AuthFailure("session grant expired before verification".into()));
    }

    let params =
        serde_json::to_value(AuthVerifyParams { challenge: challenge.challenge_message })?;
    let verdict = round_trip(
        events,
        epoch,
        Method::AuthVerify,
        params,
        RequestSigner::Wallet(Box::new(signer)),
    )
    .await?;
    let verdict: AuthVerifyResult = serde_json::from_value(verdict)
        .map_err(|e| ClientError::AuthFailure(format!("malformed verdict: {e}")))?;

    if !verdict.success {
        return Err(ClientError::AuthFailure("clearing node rejected the session key".into()));
    }
    Ok(())
}

async fn round_trip(
    events: &mpsc::UnboundedSender<AuthEvent>,
    epoch: u64,
    method: Method,
    params: Value,
    signer: RequestSigner,
) -> Result<Value, ClientError> {
    let (reply, rx) = oneshot::channel();
    events
        .send(AuthEvent::Request { epoch, method, params, signer, reply })
        .map_err(|_| ClientError::ConnectionClosed)?;
    rx.await.map_err(|_| ClientError::ConnectionClosed)?.map_err(as_auth_failure)
}

fn as_auth_failure(err: ClientError) -> ClientError {
    match err {
        ClientError::Protocol { message, .. } => ClientError::AuthFailure(message),
        ClientError::RequestTimeout { method, .. } => {
            ClientError::AuthFailure(format!("no answer to {method}"))
        },
        ClientError::Signer(e) => ClientError::AuthFailure(e.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use clearline_core::{AuthClaim, MessageSigner, SessionKey};
    use clearline_proto::Address;
    use serde_json::json;

    use super::*;
    use crate::env::SystemEnv;

    fn claim() -> AuthClaim {
        AuthClaim {
            wallet: Address::new("0xwallet"),
            session_key: Address::new("0xsession"),
            application: "clearline".into(),
            allowances: vec![],
            expires_at: u64::MAX,
            scope: "console".into(),
        }
    }

    fn signer() -> AuthSigner {
        signer_for(claim())
    }

    fn signer_for(claim: AuthClaim) -> AuthSigner {
        let wallet: Arc<dyn MessageSigner> = Arc::new(SessionKey::from_seed([5; 32]));
        AuthSigner::new(wallet, claim, "Clearline")
    }

    async fn next_request(
        rx: &mut mpsc::UnboundedReceiver<AuthEvent>,
    ) -> (Method, Value, RequestSigner, Reply) {
        match rx.recv().await {
            Some(AuthEvent::Request { epoch, method, params, signer, reply }) => {
                assert_eq!(epoch, 3);
                (method, params, signer, reply)
            },
            _ => panic!("expected a request"),
        }
    }

    async fn settled(rx: &mut mpsc::UnboundedReceiver<AuthEvent>) -> Result<(), ClientError> {
        match rx.recv().await {
            Some(AuthEvent::Settled { epoch, result }) => {
                assert_eq!(epoch, 3);
                result
            },
            _ => panic!("expected settlement"),
        }
    }

    #[tokio::test]
    async fn challenge_is_echoed_and_signed_by_wallet() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(run(3, signer(), SystemEnv, tx));

        let (method, params, signer, reply) = next_request(&mut rx).await;
        assert_eq!(method, Method::AuthRequest);
        assert_eq!(params["session_key"], json!("0xsession"));
        assert!(matches!(signer, RequestSigner::Session));
        reply.send(Ok(json!({ "challengeMessage": "nonce-42" }))).unwrap();

        let (method, params, signer, reply) = next_request(&mut rx).await;
        assert_eq!(method, Method::AuthVerify);
        assert_eq!(params, json!({ "challenge": "nonce-42" }));
        assert!(matches!(signer, RequestSigner::Wallet(_)));
        reply.send(Ok(json!({ "success": true }))).unwrap();

        assert_eq!(settled(&mut rx).await, Ok(()));
    }

    #[tokio::test]
    async fn negative_verdict_is_auth_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(run(3, signer(), SystemEnv, tx));

        let (.., reply) = next_request(&mut rx).await;
        reply.send(Ok(json!({ "challengeMessage": "c" }))).unwrap();
        let (.., reply) = next_request(&mut rx).await;
        reply.send(Ok(json!({ "success": false }))).unwrap();

        assert!(matches!(settled(&mut rx).await, Err(ClientError::AuthFailure(_))));
    }

    #[tokio::test]
    async fn protocol_error_becomes_auth_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(run(3, signer(), SystemEnv, tx));

        let (.., reply) = next_request(&mut rx).await;
        reply
            .send(Err(ClientError::Protocol { code: 401, message: "unknown wallet".into() }))
            .unwrap();

        assert_eq!(
            settled(&mut rx).await,
            Err(ClientError::AuthFailure("unknown wallet".into()))
        );
    }

    #[tokio::test]
    async fn link_loss_is_reported_as_closed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(run(3, signer(), SystemEnv, tx));

        let (.., reply) = next_request(&mut rx).await;
        drop(reply);

        assert_eq!(settled(&mut rx).await, Err(ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn expired_grant_is_never_signed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let expired = AuthClaim { expires_at: 10, ..claim() };
        tokio::spawn(run(3, signer_for(expired), SystemEnv, tx));

        let (method, .., reply) = next_request(&mut rx).await;
        assert_eq!(method, Method::AuthRequest);
        reply.send(Ok(json!({ "challengeMessage": "c" }))).unwrap();

        // No auth_verify goes out; the handshake settles straight away.
        assert!(matches!(settled(&mut rx).await, Err(ClientError::AuthFailure(_))));
    }
}
