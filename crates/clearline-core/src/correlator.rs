//! Request correlation.
//!
//! Maps outstanding request ids to whatever completion handle the driver
//! uses (a oneshot sender in production, a plain value in tests). Every
//! registration carries its own deadline; the driver arms one timer at
//! [`Correlator::next_deadline`] and calls [`Correlator::expire`] when it
//! fires.
//!
//! A correlator lives for exactly one connection epoch. Reconnecting builds a
//! fresh one, so ids restart at 1 and stale responses from a previous link
//! can never resolve a new request.

use std::{
    collections::{BTreeSet, HashMap},
    time::Instant,
};

use clearline_proto::RequestId;

use crate::error::ConnectionError;

struct Entry<C> {
    completion: C,
    deadline: Instant,
}

/// Outstanding requests for a single connection epoch.
pub struct Correlator<C> {
    next_id: RequestId,
    pending: HashMap<RequestId, Entry<C>>,
    /// Deadline index, ordered so the earliest is first
    deadlines: BTreeSet<(Instant, RequestId)>,
}

impl<C> Default for Correlator<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Correlator<C> {
    /// Empty correlator whose first id is 1.
    pub fn new() -> Self {
        Self { next_id: 1, pending: HashMap::new(), deadlines: BTreeSet::new() }
    }

    /// Allocate the next request id. Never returns the push id `0`.
    pub fn next_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    /// Track `completion` under `id` until `deadline`.
    ///
    /// # Errors
    ///
    /// `DuplicateRequest` if `id` is already outstanding.
    pub fn register(
        &mut self,
        id: RequestId,
        completion: C,
        deadline: Instant,
    ) -> Result<(), ConnectionError> {
        if self.pending.contains_key(&id) {
            return Err(ConnectionError::DuplicateRequest { request_id: id });
        }
        self.deadlines.insert((deadline, id));
        self.pending.insert(id, Entry { completion, deadline });
        Ok(())
    }

    /// Remove and return the completion for `id`, if still outstanding.
    pub fn resolve(&mut self, id: RequestId) -> Option<C> {
        let entry = self.pending.remove(&id)?;
        self.deadlines.remove(&(entry.deadline, id));
        Some(entry.completion)
    }

    /// Remove every registration whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<(RequestId, C)> {
        let mut expired = Vec::new();
        while let Some(&(deadline, id)) = self.deadlines.first() {
            if deadline > now {
                break;
            }
            self.deadlines.pop_first();
            if let Some(entry) = self.pending.remove(&id) {
                expired.push((id, entry.completion));
            }
        }
        expired
    }

    /// Earliest outstanding deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }

    /// Remove and return everything, in id order.
    pub fn drain(&mut self) -> Vec<(RequestId, C)> {
        self.deadlines.clear();
        let mut drained: Vec<_> =
            self.pending.drain().map(|(id, entry)| (id, entry.completion)).collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut correlator = Correlator::<()>::new();
        assert_eq!(correlator.next_id(), 1);
        assert_eq!(correlator.next_id(), 2);
        assert_eq!(correlator.next_id(), 3);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let t0 = Instant::now();
        let mut correlator = Correlator::new();
        correlator.register(1, "a", t0).unwrap();

        let result = correlator.register(1, "b", t0);
        assert!(matches!(result, Err(ConnectionError::DuplicateRequest { request_id: 1 })));
        assert_eq!(correlator.resolve(1), Some("a"));
    }

    #[test]
    fn resolve_is_one_shot() {
        let t0 = Instant::now();
        let mut correlator = Correlator::new();
        correlator.register(4, "done", t0 + Duration::from_secs(1)).unwrap();

        assert_eq!(correlator.resolve(4), Some("done"));
        assert_eq!(correlator.resolve(4), None);
        assert_eq!(correlator.next_deadline(), None);
    }

    #[test]
    fn expire_takes_only_due_entries() {
        let t0 = Instant::now();
        let mut correlator = Correlator::new();
        correlator.register(1, 'a', t0 + Duration::from_secs(1)).unwrap();
        correlator.register(2, 'b', t0 + Duration::from_secs(3)).unwrap();
        correlator.register(3, 'c', t0 + Duration::from_secs(2)).unwrap();

        assert!(correlator.expire(t0).is_empty());
        assert_eq!(correlator.expire(t0 + Duration::from_secs(2)), vec![(1, 'a'), (3, 'c')]);
        assert_eq!(correlator.next_deadline(), Some(t0 + Duration::from_secs(3)));
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn drain_empties_everything() {
        let t0 = Instant::now();
        let mut correlator = Correlator::new();
        correlator.register(2, 'b', t0).unwrap();
        correlator.register(1, 'a', t0).unwrap();

        assert_eq!(correlator.drain(), vec![(1, 'a'), (2, 'b')]);
        assert!(correlator.is_empty());
        assert_eq!(correlator.next_deadline(), None);
    }

    proptest! {
        #[test]
        fn every_registration_settles_exactly_once(
            offsets in prop::collection::vec(0u64..10_000, 1..64),
            resolve_mask in prop::collection::vec(any::<bool>(), 64),
            cutoff in 0u64..10_000,
        ) {
            let t0 = Instant::now();
            let mut correlator = Correlator::new();
            let mut ids = Vec::new();
            for offset in &offsets {
                let id = correlator.next_id();
                correlator.register(id, id, t0 + Duration::from_millis(*offset)).unwrap();
                ids.push(id);
            }

            let mut settled = Vec::new();
            for (id, resolve) in ids.iter().zip(&resolve_mask) {
                if *resolve {
                    settled.extend(correlator.resolve(*id));
                }
            }

            let expired = correlator.expire(t0 + Duration::from_millis(cutoff));
            for (id, completion) in &expired {
                prop_assert_eq!(id, completion);
                let offset = offsets[(*id - 1) as usize];
                prop_assert!(offset <= cutoff);
            }
            settled.extend(expired.into_iter().map(|(_, c)| c));
            if let Some(next) = correlator.next_deadline() {
                prop_assert!(next > t0 + Duration::from_millis(cutoff));
            }
            settled.extend(correlator.drain().into_iter().map(|(_, c)| c));

            settled.sort_unstable();
            prop_assert_eq!(settled, ids);
        }
    }
}
