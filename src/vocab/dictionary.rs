//! Word tables and the lookup interface queries resolve against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::core::error::LoadError;
use crate::schema::query::Query;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VocabError {
    #[error("no table named '{0}'")]
    UnknownTable(String),
    #[error("table '{table}' has no subtype '{subtype}'")]
    UnknownSubtype { table: String, subtype: String },
}

/// Anything that can answer vocabulary queries.
///
/// Implementations are shared read-only between concurrent runs.
pub trait Vocabulary: Send + Sync {
    /// Every entry matching the query's table, subtype, and filters, in a
    /// stable order. An empty pool is not an error here.
    fn lookup(&self, query: &Query) -> Result<Vec<Candidate>, VocabError>;
}

/// Identity of a dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub table: String,
    pub index: usize,
}

/// One entry as seen through a query: the selected term plus the entry
/// attributes carrier rules look at.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub key: EntryKey,
    pub text: String,
    pub pron: Option<String>,
    pub classes: Vec<String>,
    /// Number of terms (subtype forms) the entry has.
    pub term_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub value: String,
    #[serde(default)]
    pub pron: Option<String>,
    #[serde(default)]
    pub syllables: Option<u32>,
}

impl Term {
    /// Explicit syllable count, else an estimate from the spelling.
    pub fn syllable_count(&self) -> u32 {
        self.syllables
            .unwrap_or_else(|| estimate_syllables(&self.value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub terms: Vec<Term>,
    #[serde(default)]
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub subtypes: Vec<String>,
    pub entries: Vec<Entry>,
}

impl Table {
    fn subtype_index(&self, subtype: Option<&str>) -> Result<usize, VocabError> {
        let Some(subtype) = subtype else {
            return Ok(0);
        };
        if let Some(i) = self.subtypes.iter().position(|s| s == subtype) {
            return Ok(i);
        }
        match subtype.parse::<usize>() {
            Ok(i) if i < self.subtypes.len().max(1) => Ok(i),
            _ => Err(VocabError::UnknownSubtype {
                table: self.name.clone(),
                subtype: subtype.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dictionary {
    pub tables: BTreeMap<String, Table>,
}

// On-disk shape: terms, pronunciations, and syllable counts are parallel
// lists so simple tables stay one line per entry.

#[derive(Debug, Deserialize)]
struct RonEntry {
    terms: Vec<String>,
    #[serde(default)]
    pron: Vec<String>,
    #[serde(default)]
    syllables: Vec<u32>,
    #[serde(default)]
    classes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Table")]
struct RonTable {
    #[serde(default)]
    subtypes: Vec<String>,
    entries: Vec<RonEntry>,
}

impl Dictionary {
    /// Load a dictionary from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Dictionary, LoadError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a dictionary from a RON string.
    pub fn parse_ron(input: &str) -> Result<Dictionary, LoadError> {
        let raw: BTreeMap<String, RonTable> = ron::from_str(input)?;
        let mut tables = BTreeMap::new();

        for (name, ron_table) in raw {
            let mut entries = Vec::with_capacity(ron_table.entries.len());
            for (i, entry) in ron_table.entries.into_iter().enumerate() {
                let n = entry.terms.len();
                if entry.terms.is_empty() {
                    return Err(LoadError::Dictionary(format!("{}[{}]: entry has no terms", name, i)));
                }
                if n < ron_table.subtypes.len() {
                    return Err(LoadError::Dictionary(format!(
                        "{}[{}]: {} terms but the table has {} subtypes",
                        name,
                        i,
                        n,
                        ron_table.subtypes.len()
                    )));
                }
                if !entry.pron.is_empty() && entry.pron.len() != n {
                    return Err(LoadError::Dictionary(format!(
                        "{}[{}]: {} terms but {} pronunciations",
                        name,
                        i,
                        n,
                        entry.pron.len()
                    )));
                }
                if !entry.syllables.is_empty() && entry.syllables.len() != n {
                    return Err(LoadError::Dictionary(format!(
                        "{}[{}]: {} terms but {} syllable counts",
                        name,
                        i,
                        n,
                        entry.syllables.len()
                    )));
                }

                let terms = entry
                    .terms
                    .into_iter()
                    .enumerate()
                    .map(|(t, value)| Term {
                        value,
                        pron: entry.pron.get(t).cloned(),
                        syllables: entry.syllables.get(t).copied(),
                    })
                    .collect();
                entries.push(Entry {
                    terms,
                    classes: entry.classes,
                });
            }

            tables.insert(
                name.clone(),
                Table {
                    name,
                    subtypes: ron_table.subtypes,
                    entries,
                },
            );
        }

        Ok(Dictionary { tables })
    }

    /// Merge another dictionary into this one. Entries of tables present in
    /// both are appended; `self` keeps its subtype list, so appended entries
    /// without a term for one of its subtypes are left out of lookups for it.
    pub fn merge(&mut self, other: Dictionary) {
        for (name, table) in other.tables {
            match self.tables.get_mut(&name) {
                Some(existing) => {
                    let wanted = existing.subtypes.len();
                    let short = table.entries.iter().filter(|e| e.terms.len() < wanted).count();
                    if short > 0 {
                        warn!(
                            table = %name,
                            entries = short,
                            subtypes = wanted,
                            "merged entries are missing subtype forms"
                        );
                    }
                    existing.entries.extend(table.entries);
                }
                None => {
                    self.tables.insert(name, table);
                }
            }
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}

impl Vocabulary for Dictionary {
    fn lookup(&self, query: &Query) -> Result<Vec<Candidate>, VocabError> {
        let table = self
            .tables
            .get(&query.table)
            .ok_or_else(|| VocabError::UnknownTable(query.table.clone()))?;
        let sub = table.subtype_index(query.subtype.as_deref())?;

        let pool = table
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let term = entry.terms.get(sub)?;
                let classes = entry.classes.iter().map(String::as_str);
                if !query.class_filter.matches(classes, query.exclusive) {
                    return None;
                }
                if !query.regex_filters.iter().all(|f| f.accepts(&term.value)) {
                    return None;
                }
                if let Some(range) = &query.syllables {
                    if !range.contains(term.syllable_count()) {
                        return None;
                    }
                }
                Some(Candidate {
                    key: EntryKey {
                        table: table.name.clone(),
                        index,
                    },
                    text: term.value.clone(),
                    pron: term.pron.clone(),
                    classes: entry.classes.clone(),
                    term_count: entry.terms.len(),
                })
            })
            .collect();
        Ok(pool)
    }
}

/// Count vowel groups, discounting a silent trailing `e`.
pub fn estimate_syllables(word: &str) -> u32 {
    let lower = word.to_lowercase();
    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');

    let mut count = 0u32;
    let mut prev_vowel = false;
    for c in lower.chars() {
        let vowel = is_vowel(c);
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }

    if count > 1 && lower.ends_with('e') && !lower.ends_with("le") && !lower.ends_with("ee") {
        count -= 1;
    }
    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::query::{ClassRule, RegexFilter, SyllableRange};
    use regex::Regex;

    const SAMPLE: &str = r#"{
        "noun": (
            subtypes: ["singular", "plural"],
            entries: [
                (terms: ["cat", "cats"], classes: ["animal", "pet"]),
                (terms: ["dog", "dogs"], classes: ["animal", "pet"]),
                (terms: ["oak", "oaks"], classes: ["plant"]),
                (terms: ["elephant", "elephants"], classes: ["animal"], syllables: [3, 3]),
            ],
        ),
    }"#;

    fn texts(pool: &[Candidate]) -> Vec<&str> {
        pool.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn parse_and_lookup_by_subtype() {
        let dict = Dictionary::parse_ron(SAMPLE).unwrap();
        let pool = dict.lookup(&Query::new("noun").subtype("plural")).unwrap();
        assert_eq!(texts(&pool), vec!["cats", "dogs", "oaks", "elephants"]);
        assert_eq!(pool[0].term_count, 2);
    }

    #[test]
    fn unknown_table_and_subtype() {
        let dict = Dictionary::parse_ron(SAMPLE).unwrap();
        assert_eq!(
            dict.lookup(&Query::new("verb")),
            Err(VocabError::UnknownTable("verb".into()))
        );
        assert!(matches!(
            dict.lookup(&Query::new("noun").subtype("dual")),
            Err(VocabError::UnknownSubtype { .. })
        ));
    }

    #[test]
    fn filters_combine() {
        let dict = Dictionary::parse_ron(SAMPLE).unwrap();
        let mut query = Query::new("noun").class_group(vec![ClassRule::new("animal", true)]);
        query.regex_filters.push(RegexFilter {
            regex: Regex::new("^d").unwrap(),
            include: false,
        });
        query.syllables = Some(SyllableRange::exactly(1));
        assert_eq!(texts(&dict.lookup(&query).unwrap()), vec!["cat"]);

        let exclusive = Query {
            exclusive: true,
            ..Query::new("noun").class_group(vec![ClassRule::new("animal", true)])
        };
        assert_eq!(texts(&dict.lookup(&exclusive).unwrap()), vec!["elephant"]);
    }

    #[test]
    fn mismatched_pron_is_rejected() {
        let bad = r#"{ "x": (entries: [(terms: ["a", "b"], pron: ["a"])]) }"#;
        assert!(matches!(Dictionary::parse_ron(bad), Err(LoadError::Dictionary(_))));
    }

    #[test]
    fn entries_missing_subtype_forms_are_rejected() {
        let bad = r#"{ "x": (subtypes: ["one", "many"], entries: [(terms: ["a", "as"]), (terms: ["b"])]) }"#;
        match Dictionary::parse_ron(bad) {
            Err(LoadError::Dictionary(message)) => assert!(message.contains("x[1]")),
            other => panic!("expected a dictionary error, got {:?}", other),
        }
    }

    #[test]
    fn merge_appends_entries() {
        let mut a = Dictionary::parse_ron(SAMPLE).unwrap();
        let b = Dictionary::parse_ron(r#"{ "noun": (entries: [(terms: ["fox"])]), "verb": (entries: [(terms: ["run"])]) }"#).unwrap();
        a.merge(b);
        assert_eq!(a.table("noun").map(|t| t.entries.len()), Some(5));
        assert!(a.table("verb").is_some());

        let singular = a.lookup(&Query::new("noun")).unwrap();
        assert!(texts(&singular).contains(&"fox"));
        let plural = a.lookup(&Query::new("noun").subtype("plural")).unwrap();
        assert_eq!(texts(&plural), vec!["cats", "dogs", "oaks", "elephants"]);
    }

    #[test]
    fn syllable_estimates() {
        assert_eq!(estimate_syllables("cat"), 1);
        assert_eq!(estimate_syllables("table"), 2);
        assert_eq!(estimate_syllables("cake"), 1);
        assert_eq!(estimate_syllables("banana"), 3);
        assert_eq!(estimate_syllables("rhythm"), 1);
    }
}
