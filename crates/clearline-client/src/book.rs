//! Caller-side channel catalog.
//!
//! The client itself keeps no channel registry. Callers that want one feed a
//! [`ChannelBook`] from their own open/close results and from the pushes
//! their [`crate::ClientHandler`] receives. Balances are only ever replaced
//! by server snapshots, never computed locally.

use std::collections::BTreeMap;

use clearline_proto::{
    Address, Amount, ChannelId,
    payloads::{BalanceUpdate, ChannelStatus, ChannelUpdate},
};

/// A channel as the caller knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Server-assigned id
    pub id: ChannelId,
    /// Counterpart address
    pub counterpart: Address,
    /// Amount the channel was funded with
    pub allocation: Amount,
    /// Latest authoritative balance
    pub balance: Amount,
    /// Latest known status
    pub status: ChannelStatus,
}

/// Channels keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ChannelBook {
    channels: BTreeMap<ChannelId, Channel>,
    // Snapshots that beat their channel's open acknowledgment.
    early: BTreeMap<ChannelId, Amount>,
}

impl ChannelBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully opened channel. Its balance starts at the
    /// allocation, or at a snapshot that arrived ahead of the open result.
    pub fn opened(&mut self, id: ChannelId, counterpart: Address, allocation: Amount) {
        let balance = self.early.remove(&id).unwrap_or(allocation);
        let channel = Channel {
            id: id.clone(),
            counterpart,
            allocation,
            balance,
            status: ChannelStatus::Open,
        };
        self.channels.insert(id, channel);
    }

    /// Forget a successfully closed channel.
    pub fn closed(&mut self, id: &ChannelId) -> Option<Channel> {
        self.early.remove(id);
        self.channels.remove(id)
    }

    /// Apply a balance snapshot. Returns false for channels not yet
    /// recorded; their latest snapshot is held until [`Self::opened`].
    pub fn apply_balance(&mut self, update: &BalanceUpdate) -> bool {
        match self.channels.get_mut(&update.channel_id) {
            Some(channel) => {
                channel.balance = update.balance;
                true
            },
            None => {
                self.early.insert(update.channel_id.clone(), update.balance);
                false
            },
        }
    }

    /// Apply a status change. Returns false for unknown channels.
    pub fn apply_status(&mut self, update: &ChannelUpdate) -> bool {
        match self.channels.get_mut(&update.channel_id) {
            Some(channel) => {
                channel.status = update.status.clone();
                true
            },
            None => false,
        }
    }

    /// Look up a channel.
    pub fn get(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels.get(id)
    }

    /// All channels in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no channels are tracked.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_with(id: &str, allocation: u64) -> ChannelBook {
        let mut book = ChannelBook::new();
        book.opened(ChannelId::new(id), Address::new("0xpeer"), Amount::from(allocation));
        book
    }

    #[test]
    fn snapshot_replaces_balance() {
        let mut book = book_with("0x01", 1_000);
        let update = BalanceUpdate {
            channel_id: ChannelId::new("0x01"),
            balance: Amount::new(400),
            asset: "usdc".into(),
        };

        assert!(book.apply_balance(&update));
        assert!(book.apply_balance(&update));
        let channel = book.get(&ChannelId::new("0x01")).unwrap();
        assert_eq!(channel.balance, Amount::new(400));
        assert_eq!(channel.allocation, Amount::new(1_000));
    }

    #[test]
    fn updates_for_unknown_channels_are_ignored() {
        let mut book = book_with("0x01", 10);
        let update = ChannelUpdate { channel_id: ChannelId::new("0x02"), status: ChannelStatus::Closed };
        assert!(!book.apply_status(&update));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn close_removes_channel() {
        let mut book = book_with("0x01", 10);
        let update = ChannelUpdate { channel_id: ChannelId::new("0x01"), status: ChannelStatus::Closed };
        assert!(book.apply_status(&update));
        assert_eq!(book.get(&ChannelId::new("0x01")).unwrap().status, ChannelStatus::Closed);

        assert!(book.closed(&ChannelId::new("0x01")).is_some());
        assert!(book.is_empty());
    }

    #[test]
    fn snapshot_ahead_of_open_is_kept() {
        let mut book = ChannelBook::new();
        let update = BalanceUpdate {
            channel_id: ChannelId::new("0x07"),
            balance: Amount::new(900),
            asset: "usdc".into(),
        };
        assert!(!book.apply_balance(&update));
        assert!(book.is_empty());

        book.opened(ChannelId::new("0x07"), Address::new("0xpeer"), Amount::new(1_000));
        let channel = book.get(&ChannelId::new("0x07")).unwrap();
        assert_eq!(channel.balance, Amount::new(900));
        assert_eq!(channel.allocation, Amount::new(1_000));

        // Consumed once; a reopened id starts from its allocation.
        book.closed(&ChannelId::new("0x07"));
        book.opened(ChannelId::new("0x07"), Address::new("0xpeer"), Amount::new(50));
        assert_eq!(book.get(&ChannelId::new("0x07")).unwrap().balance, Amount::new(50));
    }
}
