//! Carrier resolution: choosing one candidate from a query's pool while
//! honoring the cross-query constraints of its carrier.

use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::schema::query::{CarrierComponent, CarrierKind, Query};
use crate::vocab::dictionary::{Candidate, EntryKey, VocabError, Vocabulary};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Lookup(#[from] VocabError),
    #[error("no entries in '{table}' match the query")]
    NoMatch { table: String },
    #[error("no entries in '{table}' satisfy carrier '{component}'")]
    Exhausted { table: String, component: String },
}

/// Relations between entries that the grouping carriers rely on.
pub trait CarrierRules: Send + Sync {
    fn rhymes(&self, a: &Candidate, b: &Candidate) -> bool;

    /// The key associative and dissociative carriers compare.
    fn group_key(&self, c: &Candidate) -> String;

    fn related(&self, a: &Candidate, b: &Candidate) -> bool;
}

/// Rhymes by the last vowel-onward segment, groups by class set, relates
/// entries with the same number of terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRules;

impl DefaultRules {
    /// The tail of `word` starting at its last vowel group.
    pub fn rhyme_tail(word: &str) -> String {
        let lower: Vec<char> = word.to_lowercase().chars().filter(|c| c.is_alphabetic()).collect();
        let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');

        let mut end = lower.len();
        // A trailing silent `e` does not start the rhyme.
        if end > 1 && lower[end - 1] == 'e' && !is_vowel(lower[end - 2]) {
            end -= 1;
        }
        let mut start = match lower[..end].iter().rposition(|&c| is_vowel(c)) {
            Some(i) => i,
            None => return lower.iter().collect(),
        };
        while start > 0 && is_vowel(lower[start - 1]) {
            start -= 1;
        }
        lower[start..end].iter().collect()
    }
}

impl CarrierRules for DefaultRules {
    fn rhymes(&self, a: &Candidate, b: &Candidate) -> bool {
        let sound = |c: &Candidate| Self::rhyme_tail(c.pron.as_deref().unwrap_or(&c.text));
        sound(a) == sound(b)
    }

    fn group_key(&self, c: &Candidate) -> String {
        let mut classes: Vec<&str> = c.classes.iter().map(String::as_str).collect();
        classes.sort_unstable();
        classes.dedup();
        classes.join(",")
    }

    fn related(&self, a: &Candidate, b: &Candidate) -> bool {
        a.term_count == b.term_count
    }
}

/// Selections remembered per carrier ID for the length of one run.
#[derive(Debug, Clone, Default)]
pub struct CarrierSyncState {
    /// Pinned entries of the match kinds, keyed by kind and ID.
    pins: FxHashMap<(CarrierKind, String), Candidate>,
    uniques: FxHashMap<String, FxHashSet<EntryKey>>,
    match_uniques: FxHashMap<String, FxHashSet<EntryKey>>,
    rhymes: FxHashMap<String, Candidate>,
    /// Shared by the associative and dissociative kinds.
    group_keys: FxHashMap<String, String>,
    relations: FxHashMap<String, Candidate>,
    /// Keyed by ID, table, and subtype.
    divergences: FxHashMap<(String, String, Option<String>), FxHashSet<EntryKey>>,
}

impl CarrierSyncState {
    pub fn new() -> Self {
        Self::default()
    }

    fn allows(&self, rules: &dyn CarrierRules, query: &Query, comp: &CarrierComponent, c: &Candidate) -> bool {
        let id = comp.id.as_str();
        match comp.kind {
            CarrierKind::Match => true,
            CarrierKind::Unique => self.uniques.get(id).map_or(true, |seen| !seen.contains(&c.key)),
            CarrierKind::MatchUnique => {
                let anchor = self.pins.get(&(CarrierKind::Match, id.to_string()));
                anchor.map_or(true, |a| a.key != c.key)
                    && self
                        .match_uniques
                        .get(id)
                        .map_or(true, |seen| !seen.contains(&c.key))
            }
            CarrierKind::Rhyme => self.rhymes.get(id).map_or(true, |a| rules.rhymes(a, c)),
            CarrierKind::Associative | CarrierKind::MatchAssociative => self
                .group_keys
                .get(id)
                .map_or(true, |key| *key == rules.group_key(c)),
            CarrierKind::Dissociative | CarrierKind::MatchDissociative => self
                .group_keys
                .get(id)
                .map_or(true, |key| *key != rules.group_key(c)),
            CarrierKind::Divergent | CarrierKind::MatchDivergent => self
                .divergences
                .get(&divergence_key(query, id))
                .map_or(true, |seen| !seen.contains(&c.key)),
            CarrierKind::Relational | CarrierKind::MatchRelational => {
                self.relations.get(id).map_or(true, |a| rules.related(a, c))
            }
        }
    }

    fn record(&mut self, rules: &dyn CarrierRules, query: &Query, comp: &CarrierComponent, c: &Candidate) {
        let id = comp.id.clone();
        if comp.kind.pins_entry() {
            self.pins.insert((comp.kind, id.clone()), c.clone());
        }
        match comp.kind {
            CarrierKind::Match => {}
            CarrierKind::Unique => {
                self.uniques.entry(id).or_default().insert(c.key.clone());
            }
            CarrierKind::MatchUnique => {
                self.match_uniques.entry(id).or_default().insert(c.key.clone());
            }
            CarrierKind::Rhyme => {
                self.rhymes.entry(id).or_insert_with(|| c.clone());
            }
            CarrierKind::Associative
            | CarrierKind::MatchAssociative
            | CarrierKind::Dissociative
            | CarrierKind::MatchDissociative => {
                self.group_keys.entry(id).or_insert_with(|| rules.group_key(c));
            }
            CarrierKind::Divergent | CarrierKind::MatchDivergent => {
                self.divergences
                    .entry(divergence_key(query, &comp.id))
                    .or_default()
                    .insert(c.key.clone());
            }
            CarrierKind::Relational | CarrierKind::MatchRelational => {
                self.relations.entry(id).or_insert_with(|| c.clone());
            }
        }
    }

    /// Choose one candidate from `pool` under the query's carrier and record
    /// the choice.
    ///
    /// Pinned entries are reused when they survive every constraint;
    /// otherwise a new one is drawn from the constrained pool and replaces
    /// the pin.
    pub fn select<R: Rng>(
        &mut self,
        rules: &dyn CarrierRules,
        query: &Query,
        pool: Vec<Candidate>,
        rng: &mut R,
    ) -> Result<Candidate, QueryError> {
        if pool.is_empty() {
            return Err(QueryError::NoMatch {
                table: query.table.clone(),
            });
        }

        let mut pool = pool;
        for comp in &query.carrier.components {
            pool.retain(|c| self.allows(rules, query, comp, c));
            if pool.is_empty() {
                return Err(QueryError::Exhausted {
                    table: query.table.clone(),
                    component: comp.to_string(),
                });
            }
        }

        let pinned = query
            .carrier
            .components
            .iter()
            .filter(|comp| comp.kind.pins_entry())
            .filter_map(|comp| self.pins.get(&(comp.kind, comp.id.clone())))
            .find_map(|pin| pool.iter().position(|c| c.key == pin.key));

        let index = match pinned {
            Some(i) => i,
            None => rng.gen_range(0..pool.len()),
        };
        let chosen = pool.swap_remove(index);

        for comp in &query.carrier.components {
            self.record(rules, query, comp, &chosen);
        }
        Ok(chosen)
    }
}

fn divergence_key(query: &Query, id: &str) -> (String, String, Option<String>) {
    (id.to_string(), query.table.clone(), query.subtype.clone())
}

/// Look up `query` and resolve it to a single word.
pub fn resolve<R: Rng>(
    vocabulary: &dyn Vocabulary,
    rules: &dyn CarrierRules,
    state: &mut CarrierSyncState,
    query: &Query,
    rng: &mut R,
) -> Result<String, QueryError> {
    let pool = vocabulary.lookup(query)?;
    state.select(rules, query, pool, rng).map(|c| c.text)
}
