//! Named synchronizers: independently seeded choice streams that let blocks
//! repeat, order, or deal their item choices deterministically.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};

/// Derive a stable sub-stream seed from the run seed and a name.
pub fn derive_seed(run_seed: u64, name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    run_seed.hash(&mut hasher);
    name.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// Always the same choice.
    Locked,
    /// Items in order, wrapping.
    Ordered,
    /// Items in reverse order, wrapping.
    Reverse,
    /// Shuffled without repeats, reshuffled when dealt out.
    Deck,
    /// Shuffled once, then the same order forever.
    CyclicDeck,
}

impl SyncKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "locked" => Some(Self::Locked),
            "ordered" => Some(Self::Ordered),
            "reverse" => Some(Self::Reverse),
            "deck" => Some(Self::Deck),
            "cdeck" => Some(Self::CyclicDeck),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Synchronizer {
    kind: SyncKind,
    seed: u64,
    rng: StdRng,
    counter: usize,
    deck: Vec<usize>,
    /// Item count the deck was last built for.
    deck_len: usize,
    locked: Option<u64>,
    last: Option<usize>,
    last_len: Option<usize>,
    pending_steps: usize,
    pinned: bool,
}

impl Synchronizer {
    pub fn new(kind: SyncKind, seed: u64) -> Self {
        Self {
            kind,
            seed,
            rng: StdRng::seed_from_u64(seed),
            counter: 0,
            deck: Vec::new(),
            deck_len: 0,
            locked: None,
            last: None,
            last_len: None,
            pending_steps: 0,
            pinned: false,
        }
    }

    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Choose an item index in `0..len`.
    pub fn next(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        if self.pinned {
            if let Some(last) = self.last.filter(|&l| l < len) {
                return last;
            }
        }
        for _ in 0..std::mem::take(&mut self.pending_steps) {
            self.advance(len);
        }
        let choice = self.advance(len);
        self.last = Some(choice);
        self.last_len = Some(len);
        choice
    }

    /// Skip one choice. Before the first block uses it, the skip is applied
    /// lazily.
    pub fn step(&mut self) {
        match self.last_len {
            Some(len) => self.last = Some(self.advance(len)),
            None => self.pending_steps += 1,
        }
    }

    pub fn pin(&mut self) {
        self.pinned = true;
    }

    pub fn unpin(&mut self) {
        self.pinned = false;
    }

    /// Rewind to the state it had when created.
    pub fn reset(&mut self) {
        *self = Synchronizer::new(self.kind, self.seed);
    }

    pub fn reseed(&mut self, seed: u64) {
        *self = Synchronizer::new(self.kind, seed);
    }

    fn advance(&mut self, len: usize) -> usize {
        match self.kind {
            SyncKind::Locked => {
                let rng = &mut self.rng;
                let base = *self.locked.get_or_insert_with(|| rng.gen());
                (base % len as u64) as usize
            }
            SyncKind::Ordered => {
                let choice = self.counter % len;
                self.counter += 1;
                choice
            }
            SyncKind::Reverse => {
                let choice = len - 1 - self.counter % len;
                self.counter += 1;
                choice
            }
            SyncKind::Deck => {
                if self.deck_len != len || self.counter >= self.deck.len() {
                    self.shuffle(len);
                }
                let choice = self.deck[self.counter];
                self.counter += 1;
                choice
            }
            SyncKind::CyclicDeck => {
                if self.deck_len != len {
                    self.shuffle(len);
                }
                let choice = self.deck[self.counter % len];
                self.counter += 1;
                choice
            }
        }
    }

    fn shuffle(&mut self, len: usize) {
        self.deck = (0..len).collect();
        self.deck.shuffle(&mut self.rng);
        self.deck_len = len;
        self.counter = 0;
    }
}

/// Every synchronizer of one run, plus the one blocks currently draw from.
#[derive(Debug, Clone)]
pub struct Synchronizers {
    run_seed: u64,
    table: FxHashMap<String, Synchronizer>,
    active: Option<String>,
}

impl Synchronizers {
    pub fn new(run_seed: u64) -> Self {
        Self {
            run_seed,
            table: FxHashMap::default(),
            active: None,
        }
    }

    /// Create `name` if needed and make it active. Returns `true` if it was
    /// created. An existing synchronizer keeps its kind.
    pub fn sync(&mut self, name: &str, kind: SyncKind) -> bool {
        let created = !self.table.contains_key(name);
        if created {
            let seed = derive_seed(self.run_seed, name);
            self.table
                .insert(name.to_string(), Synchronizer::new(kind, seed));
        }
        self.active = Some(name.to_string());
        created
    }

    pub fn desync(&mut self) {
        self.active = None;
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Synchronizer> {
        self.table.get_mut(name)
    }

    pub fn active_mut(&mut self) -> Option<&mut Synchronizer> {
        let name = self.active.as_deref()?;
        self.table.get_mut(name)
    }

    /// Reseed `name` from an arbitrary string.
    pub fn reseed(&mut self, name: &str, seed: &str) -> bool {
        let derived = derive_seed(self.run_seed, seed);
        match self.table.get_mut(name) {
            Some(sync) => {
                sync.reseed(derived);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draws(sync: &mut Synchronizer, len: usize, n: usize) -> Vec<usize> {
        (0..n).map(|_| sync.next(len)).collect()
    }

    #[test]
    fn ordered_and_reverse() {
        let mut s = Synchronizer::new(SyncKind::Ordered, 1);
        assert_eq!(draws(&mut s, 3, 5), vec![0, 1, 2, 0, 1]);
        let mut s = Synchronizer::new(SyncKind::Reverse, 1);
        assert_eq!(draws(&mut s, 3, 4), vec![2, 1, 0, 2]);
    }

    #[test]
    fn locked_repeats() {
        let mut s = Synchronizer::new(SyncKind::Locked, 99);
        let picks = draws(&mut s, 10, 6);
        assert!(picks.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn deck_deals_each_once_per_round() {
        let mut s = Synchronizer::new(SyncKind::Deck, 7);
        let mut round = draws(&mut s, 5, 5);
        round.sort_unstable();
        assert_eq!(round, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cyclic_deck_repeats_its_order() {
        let mut s = Synchronizer::new(SyncKind::CyclicDeck, 3);
        let first = draws(&mut s, 4, 4);
        let second = draws(&mut s, 4, 4);
        assert_eq!(first, second);
    }

    #[test]
    fn pin_step_reset() {
        let mut s = Synchronizer::new(SyncKind::Ordered, 0);
        assert_eq!(s.next(4), 0);
        s.pin();
        assert_eq!(s.next(4), 0);
        s.step();
        assert_eq!(s.next(4), 1);
        s.unpin();
        assert_eq!(s.next(4), 2);
        s.reset();
        assert_eq!(s.next(4), 0);
    }

    #[test]
    fn step_before_first_use() {
        let mut s = Synchronizer::new(SyncKind::Ordered, 0);
        s.step();
        s.step();
        assert_eq!(s.next(5), 2);
    }

    #[test]
    fn seeds_are_per_name_and_stable() {
        assert_eq!(derive_seed(5, "a"), derive_seed(5, "a"));
        assert_ne!(derive_seed(5, "a"), derive_seed(5, "b"));
        assert_ne!(derive_seed(5, "a"), derive_seed(6, "a"));
    }

    #[test]
    fn table_activation() {
        let mut syncs = Synchronizers::new(1);
        assert!(syncs.active_mut().is_none());
        assert!(syncs.sync("s", SyncKind::Ordered));
        assert!(!syncs.sync("s", SyncKind::Deck));
        assert_eq!(syncs.active_mut().map(|s| s.kind()), Some(SyncKind::Ordered));
        syncs.desync();
        assert!(syncs.active_mut().is_none());
        assert!(syncs.reseed("s", "other"));
        assert!(!syncs.reseed("missing", "x"));
    }
}
