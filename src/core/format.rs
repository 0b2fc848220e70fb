//! Text transforms applied by the output sink: capitalization modes and
//! number formats.

use serde::{Deserialize, Serialize};

/// Lowercase a mode name and drop `-`/`_`, so `group-commas`, `GroupCommas`
/// and `group_commas` all parse the same.
fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Capitalization mode of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capitalization {
    #[default]
    None,
    Lower,
    Upper,
    /// Capitalize the next letter written, then revert to `None`.
    First,
    /// Capitalize the first letter of every word.
    Word,
    /// Capitalize the first letter of every sentence.
    Sentence,
}

impl Capitalization {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match normalize(name).as_str() {
            "none" => Self::None,
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "first" => Self::First,
            "word" => Self::Word,
            "sentence" => Self::Sentence,
            _ => return None,
        })
    }

    /// Guess a mode from an example string.
    ///
    /// All-caps words give `Upper`; several words that all start uppercase
    /// give `Word`; an uppercase first letter gives `First`.
    pub fn infer(example: &str) -> Option<Self> {
        let words: Vec<&str> = example
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return None;
        }

        let all_upper = words
            .iter()
            .all(|w| w.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase));
        let initials = words
            .iter()
            .filter(|w| w.chars().next().map_or(false, char::is_uppercase))
            .count();
        let first_upper = words[0].chars().next().map_or(false, char::is_uppercase);

        if all_upper && words.iter().any(|w| w.chars().any(char::is_alphabetic)) {
            Some(Self::Upper)
        } else if words.len() > 1 && initials == words.len() {
            Some(Self::Word)
        } else if first_upper {
            Some(Self::First)
        } else {
            None
        }
    }
}

/// Per-channel capitalization state carried across writes.
#[derive(Debug, Clone)]
pub struct Capitalizer {
    pub mode: Capitalization,
    word_start: bool,
    sentence_start: bool,
}

impl Default for Capitalizer {
    fn default() -> Self {
        Self {
            mode: Capitalization::None,
            word_start: true,
            sentence_start: true,
        }
    }
}

impl Capitalizer {
    pub fn apply(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            let upper = match self.mode {
                Capitalization::None | Capitalization::Lower => false,
                Capitalization::Upper => true,
                Capitalization::First => c.is_alphabetic(),
                Capitalization::Word => self.word_start && c.is_alphabetic(),
                Capitalization::Sentence => self.sentence_start && c.is_alphabetic(),
            };

            if upper {
                out.extend(c.to_uppercase());
                if self.mode == Capitalization::First {
                    self.mode = Capitalization::None;
                }
            } else if self.mode == Capitalization::Lower {
                out.extend(c.to_lowercase());
            } else {
                out.push(c);
            }

            self.word_start = !c.is_alphanumeric() && c != '\'';
            if matches!(c, '.' | '!' | '?') {
                self.sentence_start = true;
            } else if !c.is_whitespace() && !matches!(c, '"' | '\'' | ')') {
                self.sentence_start = false;
            }
        }
        out
    }
}

/// How numbers printed by the interpreter are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    #[default]
    Normal,
    /// Thousands separated by commas.
    Group,
    GroupCommas,
    /// Thousands separated by dots, decimal comma.
    GroupDots,
    Roman,
    RomanUpper,
    RomanLower,
    /// English words.
    Verbal,
}

impl NumberFormat {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match normalize(name).as_str() {
            "normal" => Self::Normal,
            "group" => Self::Group,
            "groupcommas" => Self::GroupCommas,
            "groupdots" => Self::GroupDots,
            "roman" => Self::Roman,
            "romanupper" => Self::RomanUpper,
            "romanlower" => Self::RomanLower,
            "verbal" => Self::Verbal,
            _ => return None,
        })
    }

    pub fn format(self, n: f64) -> String {
        if let Some(i) = as_whole(n) {
            return self.format_int(i);
        }
        match self {
            Self::Group | Self::GroupCommas => grouped_fraction(n, ',', '.'),
            Self::GroupDots => grouped_fraction(n, '.', ','),
            _ => n.to_string(),
        }
    }

    /// Integers are formatted exactly, across the whole `i64` range.
    pub fn format_int(self, n: i64) -> String {
        match self {
            Self::Normal => n.to_string(),
            Self::Group | Self::GroupCommas => grouped(n, ','),
            Self::GroupDots => grouped(n, '.'),
            Self::Roman | Self::RomanUpper => roman(n).unwrap_or_else(|| n.to_string()),
            Self::RomanLower => roman(n)
                .map(|r| r.to_lowercase())
                .unwrap_or_else(|| n.to_string()),
            Self::Verbal => verbal(n),
        }
    }
}

/// Whole floats small enough to be exact.
fn as_whole(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Some(n as i64)
    } else {
        None
    }
}

fn group_digits(digits: &str, sep: char, out: &mut String) {
    let len = digits.len();
    for (i, d) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(d);
    }
}

fn grouped(n: i64, sep: char) -> String {
    let mut out = String::new();
    if n < 0 {
        out.push('-');
    }
    group_digits(&n.unsigned_abs().to_string(), sep, &mut out);
    out
}

fn grouped_fraction(n: f64, sep: char, point: char) -> String {
    let text = n.abs().to_string();
    let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    group_digits(int, sep, &mut out);
    if !frac.is_empty() {
        out.push(point);
        out.push_str(frac);
    }
    out
}

fn roman(n: i64) -> Option<String> {
    const NUMERALS: &[(i64, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    if !(1..4000).contains(&n) {
        return None;
    }
    let mut value = n;
    let mut out = String::new();
    for &(amount, numeral) in NUMERALS {
        while value >= amount {
            out.push_str(numeral);
            value -= amount;
        }
    }
    Some(out)
}

fn verbal(n: i64) -> String {
    const ONES: &[&str] = &[
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
        "nineteen",
    ];
    const TENS: &[&str] = &[
        "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];
    const SCALES: &[(u64, &str)] = &[
        (1_000_000_000_000_000_000, "quintillion"),
        (1_000_000_000_000_000, "quadrillion"),
        (1_000_000_000_000, "trillion"),
        (1_000_000_000, "billion"),
        (1_000_000, "million"),
        (1_000, "thousand"),
    ];

    fn below_thousand(n: u64, words: &mut Vec<String>) {
        let hundreds = n / 100;
        let rest = n % 100;
        if hundreds > 0 {
            words.push(format!("{} hundred", ONES[hundreds as usize]));
        }
        if rest >= 20 {
            let tens = TENS[(rest / 10) as usize];
            match rest % 10 {
                0 => words.push(tens.to_string()),
                ones => words.push(format!("{}-{}", tens, ONES[ones as usize])),
            }
        } else if rest > 0 {
            words.push(ONES[rest as usize].to_string());
        }
    }

    if n == 0 {
        return ONES[0].to_string();
    }

    let mut words = Vec::new();
    if n < 0 {
        words.push("negative".to_string());
    }
    let mut rest = n.unsigned_abs();
    for &(scale, name) in SCALES {
        if rest >= scale {
            below_thousand(rest / scale, &mut words);
            words.push(name.to_string());
            rest %= scale;
        }
    }
    below_thousand(rest, &mut words);
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names_loosely() {
        assert_eq!(NumberFormat::parse("group-commas"), Some(NumberFormat::GroupCommas));
        assert_eq!(NumberFormat::parse("RomanLower"), Some(NumberFormat::RomanLower));
        assert_eq!(Capitalization::parse("Sentence"), Some(Capitalization::Sentence));
        assert_eq!(Capitalization::parse("shouty"), None);
    }

    #[test]
    fn number_formats() {
        assert_eq!(NumberFormat::Normal.format(42.0), "42");
        assert_eq!(NumberFormat::Normal.format(2.5), "2.5");
        assert_eq!(NumberFormat::Group.format(1234567.0), "1,234,567");
        assert_eq!(NumberFormat::GroupDots.format(-1234.5), "-1.234,5");
        assert_eq!(NumberFormat::Roman.format(1994.0), "MCMXCIV");
        assert_eq!(NumberFormat::RomanLower.format(14.0), "xiv");
        assert_eq!(NumberFormat::Roman.format(0.0), "0");
        assert_eq!(NumberFormat::Verbal.format(0.0), "zero");
        assert_eq!(
            NumberFormat::Verbal.format(2_045_017.0),
            "two million forty-five thousand seventeen"
        );
        assert_eq!(NumberFormat::Verbal.format(-310.0), "negative three hundred ten");
    }

    #[test]
    fn large_integers_stay_exact() {
        assert_eq!(NumberFormat::Normal.format_int(i64::MAX), "9223372036854775807");
        assert_eq!(NumberFormat::Group.format_int(i64::MIN), "-9,223,372,036,854,775,808");
        assert_eq!(NumberFormat::Roman.format_int(1 << 60), (1i64 << 60).to_string());
        assert_eq!(
            NumberFormat::Verbal.format_int(2_000_000_000_000_000_001),
            "two quintillion one"
        );
    }

    #[test]
    fn first_reverts_after_one_letter() {
        let mut caps = Capitalizer {
            mode: Capitalization::First,
            ..Capitalizer::default()
        };
        assert_eq!(caps.apply("  hello"), "  Hello");
        assert_eq!(caps.apply(" world"), " world");
        assert_eq!(caps.mode, Capitalization::None);
    }

    #[test]
    fn word_and_sentence_span_writes() {
        let mut caps = Capitalizer {
            mode: Capitalization::Word,
            ..Capitalizer::default()
        };
        assert_eq!(caps.apply("the old "), "The Old ");
        assert_eq!(caps.apply("man's boat"), "Man's Boat");

        let mut caps = Capitalizer {
            mode: Capitalization::Sentence,
            ..Capitalizer::default()
        };
        assert_eq!(caps.apply("it rained. "), "It rained. ");
        assert_eq!(caps.apply("then it stopped! ok"), "Then it stopped! Ok");
    }

    #[test]
    fn infer_modes() {
        assert_eq!(Capitalization::infer("HELLO THERE"), Some(Capitalization::Upper));
        assert_eq!(Capitalization::infer("Hello There"), Some(Capitalization::Word));
        assert_eq!(Capitalization::infer("Hello there"), Some(Capitalization::First));
        assert_eq!(Capitalization::infer("hello"), None);
    }
}
