//! Vocabulary queries and carrier directives.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One signed class name inside a filter group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRule {
    pub class: String,
    /// `false` for `!class`.
    pub include: bool,
}

impl ClassRule {
    pub fn new(class: impl Into<String>, include: bool) -> Self {
        Self {
            class: class.into(),
            include,
        }
    }
}

/// Class filter groups. Rules inside a group are OR'd; groups are AND'd.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFilter {
    pub groups: Vec<Vec<ClassRule>>,
}

impl ClassFilter {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn add_group(&mut self, group: Vec<ClassRule>) {
        if !group.is_empty() {
            self.groups.push(group);
        }
    }

    /// Test an entry's classes against every group.
    ///
    /// In exclusive mode the entry may not carry any class that the filter
    /// does not name positively.
    pub fn matches<'a, I>(&self, classes: I, exclusive: bool) -> bool
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let has = |name: &str| classes.clone().into_iter().any(|c| c == name);

        let groups_pass = self.groups.iter().all(|group| {
            group
                .iter()
                .any(|rule| has(rule.class.as_str()) == rule.include)
        });
        if !groups_pass {
            return false;
        }

        if exclusive {
            return classes.into_iter().all(|c| {
                self.groups
                    .iter()
                    .flatten()
                    .any(|rule| rule.include && rule.class == c)
            });
        }
        true
    }
}

/// A signed regular-expression filter applied to the selected term.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    pub regex: Regex,
    /// `false` for `!//re//`.
    pub include: bool,
}

impl RegexFilter {
    pub fn accepts(&self, text: &str) -> bool {
        self.regex.is_match(text) == self.include
    }
}

/// Inclusive syllable bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllableRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl SyllableRange {
    pub fn exactly(n: u32) -> Self {
        Self {
            min: Some(n),
            max: Some(n),
        }
    }

    pub fn contains(&self, n: u32) -> bool {
        self.min.map_or(true, |min| n >= min) && self.max.map_or(true, |max| n <= max)
    }
}

/// Carrier synchronization kinds. A query without components is unsynchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarrierKind {
    /// `=id`
    Match,
    /// `!id`
    Unique,
    /// `!=id`
    MatchUnique,
    /// `&id`
    Rhyme,
    /// `@id`
    Associative,
    /// `@=id`
    MatchAssociative,
    /// `@!id`
    Dissociative,
    /// `@!=id`
    MatchDissociative,
    /// `@+id`
    Divergent,
    /// `@+=id`
    MatchDivergent,
    /// `@?id`
    Relational,
    /// `@?=id`
    MatchRelational,
}

impl CarrierKind {
    /// Whether this kind also pins the exact entry for its ID.
    pub fn pins_entry(self) -> bool {
        matches!(
            self,
            CarrierKind::Match
                | CarrierKind::MatchAssociative
                | CarrierKind::MatchDissociative
                | CarrierKind::MatchDivergent
                | CarrierKind::MatchRelational
        )
    }

    /// The match-variant of a grouping kind, if it has one.
    pub fn with_match(self) -> Option<CarrierKind> {
        match self {
            CarrierKind::Associative => Some(CarrierKind::MatchAssociative),
            CarrierKind::Dissociative => Some(CarrierKind::MatchDissociative),
            CarrierKind::Divergent => Some(CarrierKind::MatchDivergent),
            CarrierKind::Relational => Some(CarrierKind::MatchRelational),
            _ => None,
        }
    }

    fn sigil(self) -> &'static str {
        match self {
            CarrierKind::Match => "=",
            CarrierKind::Unique => "!",
            CarrierKind::MatchUnique => "!=",
            CarrierKind::Rhyme => "&",
            CarrierKind::Associative => "@",
            CarrierKind::MatchAssociative => "@=",
            CarrierKind::Dissociative => "@!",
            CarrierKind::MatchDissociative => "@!=",
            CarrierKind::Divergent => "@+",
            CarrierKind::MatchDivergent => "@+=",
            CarrierKind::Relational => "@?",
            CarrierKind::MatchRelational => "@?=",
        }
    }
}

/// One `kind id` pair inside a carrier section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarrierComponent {
    pub kind: CarrierKind,
    pub id: String,
}

impl CarrierComponent {
    pub fn new(kind: CarrierKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for CarrierComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.sigil(), self.id)
    }
}

/// The `::` section of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub components: Vec<CarrierComponent>,
}

impl Carrier {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn single(kind: CarrierKind, id: impl Into<String>) -> Self {
        Self {
            components: vec![CarrierComponent::new(kind, id)],
        }
    }

    pub fn is_none(&self) -> bool {
        self.components.is_empty()
    }

    pub fn add(&mut self, kind: CarrierKind, id: impl Into<String>) {
        self.components.push(CarrierComponent::new(kind, id));
    }
}

/// A fully parsed vocabulary query.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub table: String,
    pub subtype: Option<String>,
    /// `$`: entries may only carry classes named by the filter.
    pub exclusive: bool,
    pub class_filter: ClassFilter,
    pub regex_filters: Vec<RegexFilter>,
    pub syllables: Option<SyllableRange>,
    pub carrier: Carrier,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn carrier(mut self, carrier: Carrier) -> Self {
        self.carrier = carrier;
        self
    }

    pub fn class_group(mut self, group: Vec<ClassRule>) -> Self {
        self.class_filter.add_group(group);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_groups_or_within_and_across() {
        let mut filter = ClassFilter::default();
        filter.add_group(vec![ClassRule::new("animal", true), ClassRule::new("plant", true)]);
        filter.add_group(vec![ClassRule::new("large", false)]);

        assert!(filter.matches(["animal"], false));
        assert!(filter.matches(["plant", "green"], false));
        assert!(!filter.matches(["animal", "large"], false));
        assert!(!filter.matches(["mineral"], false));
    }

    #[test]
    fn exclusive_rejects_unnamed_classes() {
        let mut filter = ClassFilter::default();
        filter.add_group(vec![ClassRule::new("animal", true)]);

        assert!(filter.matches(["animal"], true));
        assert!(!filter.matches(["animal", "pet"], true));
    }

    #[test]
    fn syllable_range_bounds() {
        let open_max = SyllableRange {
            min: Some(2),
            max: None,
        };
        assert!(open_max.contains(2));
        assert!(open_max.contains(9));
        assert!(!open_max.contains(1));
        assert!(SyllableRange::exactly(3).contains(3));
        assert!(!SyllableRange::exactly(3).contains(4));
    }

    #[test]
    fn match_variants() {
        assert_eq!(
            CarrierKind::Divergent.with_match(),
            Some(CarrierKind::MatchDivergent)
        );
        assert_eq!(CarrierKind::Rhyme.with_match(), None);
        assert!(CarrierKind::MatchRelational.pins_entry());
        assert!(!CarrierKind::Unique.pins_entry());
        assert_eq!(
            CarrierComponent::new(CarrierKind::MatchDissociative, "x").to_string(),
            "@!=x"
        );
    }
}
