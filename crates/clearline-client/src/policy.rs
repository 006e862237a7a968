//! Spend policy seam.
//!
//! The client enforces no spending limits of its own. An autonomous caller
//! asks a [`SpendValidator`] before each transfer, typically backed by an
//! on-chain policy contract; [`LimitValidator`] is an in-process stand-in
//! with a per-transaction and a daily ceiling.

use std::sync::Mutex;

use async_trait::async_trait;
use clearline_core::Environment;
use clearline_proto::{Address, Amount, ChannelId};
use tracing::{debug, info};

use crate::{client::Client, env::SystemEnv, error::ClientError};

const SECONDS_PER_DAY: u64 = 86_400;

/// Verdict on a proposed spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendDecision {
    /// Whether the spend may proceed
    pub allowed: bool,
    /// Human-readable explanation
    pub reason: String,
    /// Remaining daily allowance, when the validator knows it
    pub remaining_limit: Option<Amount>,
}

/// Decides whether an agent may spend an amount.
#[async_trait]
pub trait SpendValidator: Send + Sync {
    /// Check (and, if allowed, record) a spend of `amount` by `agent`.
    async fn validate_spend(&self, agent: &Address, amount: Amount) -> SpendDecision;

    /// Whether `agent` is authorized to spend at all.
    async fn is_agent_authorized(&self, agent: &Address) -> bool;

    /// Remaining daily allowance for `agent`.
    async fn remaining_limit(&self, agent: &Address) -> Option<Amount>;
}

struct Ledger {
    day: u64,
    spent: Amount,
}

/// Fixed per-transaction and daily limits tracked in memory.
///
/// Approved spends accumulate until the UTC day rolls over.
pub struct LimitValidator<E: Environment = SystemEnv> {
    per_tx_limit: Amount,
    daily_limit: Amount,
    env: E,
    ledger: Mutex<Ledger>,
}

impl LimitValidator {
    /// Validator on the system clock.
    pub fn new(per_tx_limit: Amount, daily_limit: Amount) -> Self {
        Self::with_env(per_tx_limit, daily_limit, SystemEnv)
    }
}

impl<E: Environment> LimitValidator<E> {
    /// Validator on an explicit clock.
    pub fn with_env(per_tx_limit: Amount, daily_limit: Amount, env: E) -> Self {
        let day = env.unix_time() / SECONDS_PER_DAY;
        Self { per_tx_limit, daily_limit, env, ledger: Mutex::new(Ledger { day, spent: Amount::ZERO }) }
    }

    /// Forget everything spent so far.
    pub fn reset_spending(&self) {
        self.with_ledger(|ledger| ledger.spent = Amount::ZERO);
    }

    fn with_ledger<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        let today = self.env.unix_time() / SECONDS_PER_DAY;
        let mut ledger = self.ledger.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if ledger.day != today {
            ledger.day = today;
            ledger.spent = Amount::ZERO;
        }
        f(&mut ledger)
    }

    fn remaining(&self, ledger: &Ledger) -> Amount {
        self.daily_limit.checked_sub(ledger.spent).unwrap_or(Amount::ZERO)
    }
}

#[async_trait]
impl<E: Environment> SpendValidator for LimitValidator<E> {
    async fn validate_spend(&self, agent: &Address, amount: Amount) -> SpendDecision {
        let decision = self.with_ledger(|ledger| {
            let remaining = self.remaining(ledger);
            if amount > self.per_tx_limit {
                return SpendDecision {
                    allowed: false,
                    reason: format!("exceeds per-transaction limit of {}", self.per_tx_limit),
                    remaining_limit: Some(remaining),
                };
            }
            if amount > remaining {
                return SpendDecision {
                    allowed: false,
                    reason: format!(
                        "exceeds daily limit: remaining {remaining}, requested {amount}"
                    ),
                    remaining_limit: Some(remaining),
                };
            }
            ledger.spent = ledger.spent.saturating_add(amount);
            SpendDecision {
                allowed: true,
                reason: "spend approved".into(),
                remaining_limit: Some(self.remaining(ledger)),
            }
        });
        debug!(%agent, %amount, allowed = decision.allowed, "spend validated");
        decision
    }

    async fn is_agent_authorized(&self, _agent: &Address) -> bool {
        true
    }

    async fn remaining_limit(&self, _agent: &Address) -> Option<Amount> {
        Some(self.with_ledger(|ledger| self.remaining(ledger)))
    }
}

/// Outcome of a policy-checked transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedTransfer {
    /// The validator refused; nothing was sent
    Denied(SpendDecision),
    /// The transfer was submitted
    Submitted {
        /// Acknowledgment from the clearing node
        success: bool,
        /// The approving decision
        decision: SpendDecision,
    },
}

/// Ask `validator` before transferring on behalf of `agent`.
pub async fn guarded_transfer(
    client: &Client,
    validator: &dyn SpendValidator,
    agent: &Address,
    channel_id: ChannelId,
    amount: Amount,
    target: Address,
) -> Result<GuardedTransfer, ClientError> {
    if !validator.is_agent_authorized(agent).await {
        return Ok(GuardedTransfer::Denied(SpendDecision {
            allowed: false,
            reason: format!("agent {agent} is not authorized"),
            remaining_limit: None,
        }));
    }

    let decision = validator.validate_spend(agent, amount).await;
    if !decision.allowed {
        info!(%agent, %amount, reason = %decision.reason, "transfer denied by policy");
        return Ok(GuardedTransfer::Denied(decision));
    }

    let success = client.transfer(channel_id, amount, target).await?;
    Ok(GuardedTransfer::Submitted { success, decision })
}
