//! The set of peer addresses a node knows about.
//!
//! Nodes are identified by plain indices rather than full address
//! structures, so the book is a set plus a cached gossip sample size.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::NodeId;

/// A node's address book.
#[derive(Clone, Debug)]
pub struct AddressBook {
    addresses: BTreeSet<NodeId>,
    fraction: f64,
    /// Cached default sample size: `ceil(len * fraction)`.
    num_random: usize,
}

impl AddressBook {
    /// An empty book that answers gossip polls with `fraction` of its
    /// contents. `fraction` must be in `(0, 1]`.
    pub fn new(fraction: f64) -> AddressBook {
        debug_assert!(fraction > 0.0 && fraction <= 1.0);
        AddressBook {
            addresses: BTreeSet::new(),
            fraction,
            num_random: 0,
        }
    }

    /// Insert one address. Idempotent.
    pub fn add(&mut self, address: NodeId) {
        self.addresses.insert(address);
        self.update_size();
    }

    /// Insert a batch of addresses; the sample size is recomputed once at
    /// the end.
    pub fn add_many(&mut self, addresses: impl IntoIterator<Item = NodeId>) {
        self.addresses.extend(addresses);
        self.update_size();
    }

    pub fn contains(&self, address: NodeId) -> bool {
        self.addresses.contains(&address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Every known address, in ascending order.
    pub fn all(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.addresses.iter().copied()
    }

    /// A uniformly random subset of the default gossip size.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec<NodeId> {
        self.sample_n(self.num_random, rng)
    }

    /// A uniformly random subset of `min(n, len)` addresses, without
    /// duplicates. Successive calls are shuffled independently.
    pub fn sample_n<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = self.addresses.iter().copied().collect();
        result.shuffle(rng);
        result.truncate(n);
        result
    }

    fn update_size(&mut self) {
        self.num_random = (self.addresses.len() as f64 * self.fraction).ceil() as usize;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn add_is_idempotent() {
        powsim_test::init();

        let mut book = AddressBook::new(0.5);
        book.add(3);
        book.add(3);
        assert_eq!(book.len(), 1);

        book.add_many(vec![3, 4, 5]);
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn oversized_sample_returns_the_full_set() {
        powsim_test::init();

        let mut book = AddressBook::new(1.0);
        book.add_many(vec![1, 2, 3]);
        let mut rng = StdRng::seed_from_u64(7);

        let mut sampled = book.sample_n(10, &mut rng);
        sampled.sort_unstable();
        assert_eq!(sampled, vec![1, 2, 3]);
    }

    #[test]
    fn default_sample_size_is_a_fraction_of_the_book() {
        powsim_test::init();

        let mut book = AddressBook::new(0.5);
        book.add_many(0..5);
        let mut rng = StdRng::seed_from_u64(7);

        // ceil(5 * 0.5) = 3
        assert_eq!(book.sample(&mut rng).len(), 3);
    }

    #[test]
    fn samples_contain_no_duplicates() {
        powsim_test::init();

        let mut book = AddressBook::new(1.0);
        book.add_many(0..20);
        let mut rng = StdRng::seed_from_u64(7);

        let mut sampled = book.sample(&mut rng);
        sampled.sort_unstable();
        sampled.dedup();
        assert_eq!(sampled.len(), 20);
    }
}
