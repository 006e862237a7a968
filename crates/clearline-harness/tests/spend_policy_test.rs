//! Policy-checked transfers against the mock node.

mod common;

use clearline_client::{GuardedTransfer, LimitValidator, SpendValidator, guarded_transfer};
use clearline_harness::SimEnv;
use clearline_proto::{Amount, Method};
use common::{fixture, peer};

#[tokio::test(start_paused = true)]
async fn denied_spends_never_reach_the_node() {
    let f = fixture(21);
    f.client.connect().await.expect("connect");
    let channel = f.client.open_session(peer(), Amount::new(10_000)).await.expect("open session");

    let validator = LimitValidator::with_env(Amount::new(500), Amount::new(800), SimEnv::with_seed(0));
    let agent = f.client.wallet_address().clone();
    let attempt = |amount: u128| {
        guarded_transfer(&f.client, &validator, &agent, channel.clone(), Amount::new(amount), peer())
    };

    let outcome = attempt(400).await.expect("first transfer");
    assert!(matches!(outcome, GuardedTransfer::Submitted { success: true, .. }), "got {outcome:?}");

    let outcome = attempt(600).await.expect("over per-transaction limit");
    let GuardedTransfer::Denied(decision) = outcome else { panic!("expected denial") };
    assert!(decision.reason.contains("per-transaction"), "{}", decision.reason);

    let outcome = attempt(300).await.expect("second transfer");
    let GuardedTransfer::Submitted { decision, .. } = outcome else { panic!("expected submit") };
    assert_eq!(decision.remaining_limit, Some(Amount::new(100)));

    let outcome = attempt(200).await.expect("over daily limit");
    assert!(matches!(outcome, GuardedTransfer::Denied(_)), "got {outcome:?}");

    assert_eq!(f.node.received(&Method::Transfer), 2);
    assert_eq!(validator.remaining_limit(&agent).await, Some(Amount::new(100)));
}

#[tokio::test(start_paused = true)]
async fn approved_spend_still_hits_node_rules() {
    let f = fixture(22);
    f.client.connect().await.expect("connect");
    let channel = f.client.open_session(peer(), Amount::new(50)).await.expect("open session");

    let validator = LimitValidator::with_env(Amount::new(500), Amount::new(500), SimEnv::with_seed(0));
    let agent = f.client.wallet_address().clone();

    // The policy approves; the node rejects the overdraft.
    let err = guarded_transfer(&f.client, &validator, &agent, channel, Amount::new(80), peer())
        .await
        .unwrap_err();
    assert!(matches!(err, clearline_client::ClientError::Protocol { code: 400, .. }));
}
