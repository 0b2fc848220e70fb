//! Block iteration: repetition counts, decorations, and position predicates.

use std::sync::Arc;

use crate::core::pattern::{BlockItems, Code, Pattern};

/// A repetition count for the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reps {
    /// One iteration per block item.
    Each,
    Times(usize),
}

impl Default for Reps {
    fn default() -> Self {
        Reps::Times(1)
    }
}

/// Attributes set by tags before a block and consumed when it is entered.
#[derive(Debug, Clone, Default)]
pub struct BlockAttribs {
    pub reps: Reps,
    pub separator: Option<Code>,
    pub before: Option<Code>,
    pub after: Option<Code>,
    /// Percent chance (0-100) that the block runs at all.
    pub chance: Option<u32>,
}

impl BlockAttribs {
    /// Hand the pending attributes to a block and reset them.
    pub fn take(&mut self) -> BlockAttribs {
        std::mem::take(self)
    }
}

/// Iteration controller for one entered block.
#[derive(Debug)]
pub struct Repeater {
    pattern: Arc<Pattern>,
    block: Arc<BlockItems>,
    each: bool,
    count: usize,
    index: usize,
    started: bool,
    finished: bool,
    separator: Option<Code>,
    before: Option<Code>,
    after: Option<Code>,
}

impl Repeater {
    pub fn new(pattern: &Arc<Pattern>, block: Arc<BlockItems>, attribs: BlockAttribs) -> Self {
        let (each, count) = match attribs.reps {
            Reps::Each => (true, block.items.len()),
            Reps::Times(n) => (false, n),
        };
        Self {
            pattern: Arc::clone(pattern),
            block,
            each,
            count,
            index: 0,
            started: false,
            finished: false,
            separator: attribs.separator,
            before: attribs.before,
            after: attribs.after,
        }
    }

    /// Move to the next iteration. Returns `false` once the repeater is done.
    pub fn advance(&mut self) -> bool {
        if self.finished {
            return false;
        }
        let next = if self.started { self.index + 1 } else { 0 };
        if next >= self.count {
            self.finished = true;
            return false;
        }
        self.index = next;
        self.started = true;
        true
    }

    /// Skip every remaining iteration.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether items are visited in order, one per iteration.
    pub fn is_each(&self) -> bool {
        self.each
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn item_count(&self) -> usize {
        self.block.items.len()
    }

    pub fn item(&self, i: usize) -> Option<Code> {
        self.block
            .items
            .get(i)
            .map(|span| Code::new(&self.pattern, *span))
    }

    pub fn separator(&self) -> Option<&Code> {
        self.separator.as_ref()
    }

    pub fn before(&self) -> Option<&Code> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Code> {
        self.after.as_ref()
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.count
    }

    pub fn is_odd(&self) -> bool {
        self.index % 2 == 1
    }

    pub fn is_even(&self) -> bool {
        self.index % 2 == 0
    }

    /// `index % interval == offset`. An interval of zero never matches.
    pub fn nth(&self, offset: usize, interval: usize) -> bool {
        interval > 0 && self.index % interval == offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeater(src: &str, reps: Reps) -> Repeater {
        let pattern = Pattern::compile("t", src).unwrap();
        let block = pattern.block(0).unwrap();
        Repeater::new(
            &pattern,
            block,
            BlockAttribs {
                reps,
                ..BlockAttribs::default()
            },
        )
    }

    #[test]
    fn each_counts_items() {
        let mut rep = repeater("{a|b|c}", Reps::Each);
        assert_eq!(rep.count(), 3);
        assert!(rep.is_each());

        let mut seen = Vec::new();
        while rep.advance() {
            seen.push((rep.index(), rep.is_first(), rep.is_last()));
        }
        assert_eq!(seen, vec![(0, true, false), (1, false, false), (2, false, true)]);
        assert!(rep.is_finished());
    }

    #[test]
    fn finish_stops_iteration() {
        let mut rep = repeater("{a}", Reps::Times(5));
        assert!(rep.advance());
        rep.finish();
        assert!(!rep.advance());
        assert_eq!(rep.index(), 0);
    }

    #[test]
    fn zero_reps_never_iterate() {
        let mut rep = repeater("{a}", Reps::Times(0));
        assert!(!rep.advance());
    }

    #[test]
    fn nth_and_parity() {
        let mut rep = repeater("{a}", Reps::Times(7));
        let mut hits = Vec::new();
        while rep.advance() {
            if rep.nth(1, 3) {
                hits.push(rep.index());
            }
            assert_ne!(rep.is_odd(), rep.is_even());
        }
        assert_eq!(hits, vec![1, 4]);
        assert!(!rep.nth(0, 0));
    }

    #[test]
    fn attribs_take_resets() {
        let mut attribs = BlockAttribs {
            reps: Reps::Times(4),
            chance: Some(50),
            ..BlockAttribs::default()
        };
        let taken = attribs.take();
        assert_eq!(taken.reps, Reps::Times(4));
        assert_eq!(attribs.reps, Reps::Times(1));
        assert!(attribs.chance.is_none());
    }
}
