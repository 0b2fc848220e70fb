//! Engine integration tests: end-to-end pattern runs and the run-level
//! properties every pattern must satisfy.

use proptest::prelude::*;
use std::sync::Arc;
use textloom::{DefaultRules, Dictionary, Engine, EngineConfig, ErrorKind, LoadError, NumberFormat, Visibility};

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn engine() -> Engine {
    Engine::builder()
        .dictionary_path(fixture("dictionary.ron"))
        .build()
        .unwrap()
}

fn run(src: &str, seed: u64) -> String {
    engine().run_str(src, seed).unwrap().main().to_string()
}

const PATTERNS: &[&str] = &[
    "{a|b|c}{d|e}",
    "[r:4][s:\", \"]{<noun>|<adj> <noun.plural>}",
    "[r:each]{[odd:<adj>][even:\\3,d]}",
    "[sync:s;deck][r:6]{1|2|3}[desync] {x|y}",
    "[num:1;1000] [char:a-z;5] \\X\\X",
    "<noun::!u> <noun::!u> <noun::=m> <noun::=m>",
    "[$[pick:a;b]:{[arg:a]|[arg:b]}][r:5]{[$pick:<verb>;<verb.past>]}",
    "(@x = 0)[r:8]{(@x += [num:1;6])}(x)",
];

proptest! {
    #[test]
    fn same_seed_same_output(seed in any::<u64>(), index in 0..PATTERNS.len()) {
        let engine = engine();
        let pattern = engine.compile("prop", PATTERNS[index]).unwrap();
        let first = engine.run(&pattern, seed).unwrap();
        let second = engine.run(&pattern, seed).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn repeater_predicates_partition(n in 1usize..24, interval in 1usize..6, offset_seed in 0usize..6) {
        let offset = offset_seed % interval;
        let item = format!("[first:F][last:L][odd:o][even:e][nth:{};{};N]", interval, offset);
        let items = vec![item; n].join("|");
        let out = run(&format!("[r:each]{{{}}}", items), 0);

        let count = |c: char| out.chars().filter(|&x| x == c).count();
        prop_assert_eq!(count('F'), 1);
        prop_assert_eq!(count('L'), 1);
        prop_assert_eq!(count('o'), n / 2);
        prop_assert_eq!(count('e'), n - n / 2);
        prop_assert_eq!(count('N'), (0..n).filter(|i| i % interval == offset).count());
    }
}

#[test]
fn seeds_change_output() {
    let engine = engine();
    let pattern = engine.compile("seeds", "[r:12]{a|b|c|d}").unwrap();
    let outputs: std::collections::HashSet<String> = (0..8)
        .map(|seed| engine.run(&pattern, seed).unwrap().main().to_string())
        .collect();
    assert!(outputs.len() > 1);
}

#[test]
fn unique_carrier_exhausts_after_every_entry() {
    let engine = engine();
    // three animals: cat, dog, owl
    let out = engine
        .run_str("<noun -animal::!u> <noun -animal::!u> <noun -animal::!u>", 9)
        .unwrap();
    let mut words: Vec<&str> = out.main().split(' ').collect();
    words.sort_unstable();
    assert_eq!(words, vec!["cat", "dog", "owl"]);

    let failure = engine
        .run_str("<noun -animal::!u> <noun -animal::!u> <noun -animal::!u> <noun -animal::!u>", 9)
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Exhausted);
    assert_eq!(failure.partial.main().split(' ').filter(|w| !w.is_empty()).count(), 3);
}

#[test]
fn match_carrier_repeats_the_same_word() {
    for seed in 0..20 {
        let out = run("<noun::=x>/<noun::=x>", seed);
        let (a, b) = out.split_once('/').unwrap();
        assert_eq!(a, b, "seed {}", seed);
    }
}

#[test]
fn break_stops_after_the_first_iteration() {
    assert_eq!(run("[r:5]{x[break]y}", 0), "x");
    assert_eq!(run("[r:each][s:,]{a[break]|b|c|d|e}.", 0), "a.");
}

#[test]
fn break_inside_a_subroutine_ends_the_enclosing_block() {
    let out = run("[$[stop]:[break]][r:each]{1|2[$stop]|3}", 0);
    assert_eq!(out, "12");
}

#[test]
fn any_rolls_back_whitespace_trials() {
    assert_eq!(run("[any:\\s\\t;B]", 0), "B");
    assert_eq!(run("[any:[out:side;private]x[close:side] ;B]", 0), "B");
    assert_eq!(run("[alt:[out:side;private]x[close:side];B]", 0), "B");
}

#[test]
fn alt_keeps_trial_output_and_channels() {
    let out = engine()
        .run_str("[alt:kept[out:side;private]aside[close:side];B]", 0)
        .unwrap();
    assert_eq!(out.main(), "kept");
    assert_eq!(out.get("side"), Some("aside"));
}

#[test]
fn flag_round_trip() {
    assert_eq!(run("[define:f][ifdef:f;X][undef:f][ifdef:f;X][else;Y]", 0), "XY");
    assert_eq!(run("[define:f][ifdef:f;X][undef:f][ifdef:f;X][else:Y]", 0), "XY");
}

#[test]
fn private_channels_stay_out_of_main() {
    let out = engine()
        .run_str("[caps:upper]a[out:secret;private][caps:lower]HIDDEN[close:secret]c", 0)
        .unwrap();
    assert_eq!(out.main(), "AC");
    assert_eq!(out.get("secret"), Some("hidden"));
    let secret = out.iter().find(|c| c.name == "secret").unwrap();
    assert_eq!(secret.visibility, Visibility::Private);
}

#[test]
fn internal_channels_are_dropped_and_public_ones_copy_to_main() {
    let out = engine()
        .run_str("[out:scratch;internal]tmp[close:scratch][out:log;public]both[close:log]", 0)
        .unwrap();
    assert_eq!(out.main(), "both");
    assert_eq!(out.get("log"), Some("both"));
    assert_eq!(out.get("scratch"), None);
}

#[test]
fn closing_an_unknown_channel_is_harmless() {
    assert_eq!(run("a[close:nowhere]b", 0), "ab");
}

#[test]
fn query_filters_and_subtypes() {
    assert_eq!(run("<noun.plural -bird>", 1), "owls");
    assert_eq!(run("<noun ?//^b//>", 1), "boot");
    assert_eq!(run("<noun $ -animal|bird>", 1), "owl");
    assert_eq!(run("<adj (3-)>", 1), "enormous");
    assert_eq!(run("<adj -mood (2)>", 1), "quiet");
}

#[test]
fn query_macros() {
    let out = run("<@pet: noun -pet::!p><@pet> <@pet>", 4);
    let mut words: Vec<&str> = out.split(' ').collect();
    words.sort_unstable();
    assert_eq!(words, vec!["cat", "dog"]);

    assert_eq!(run("<@g = noun -bird>[$[f]:<@g>][$f]", 0), "owl");
    let err = engine().run_str("<@missing>", 0).unwrap_err().error;
    assert_eq!(err.kind(), ErrorKind::Semantic);
}

#[test]
fn query_errors_map_to_the_taxonomy() {
    let engine = engine();
    let kind = |src: &str| engine.run_str(src, 0).unwrap_err().error.kind();
    assert_eq!(kind("<pronoun>"), ErrorKind::External);
    assert_eq!(kind("<noun.dual>"), ErrorKind::External);
    assert_eq!(kind("<noun -mineral>"), ErrorKind::Exhausted);
    assert_eq!(kind("<noun ::=a -animal>"), ErrorKind::Syntax);
}

#[test]
fn rhyme_carrier_follows_its_anchor() {
    for seed in 0..10 {
        let out = run("<verb::&r> <verb::&r>", seed);
        let (a, b) = out.split_once(' ').unwrap();
        let tail = DefaultRules::rhyme_tail;
        assert_eq!(tail(a), tail(b), "seed {}", seed);
    }
}

#[test]
fn config_file_sets_flags_format_and_dictionary() {
    let engine = Engine::builder()
        .config_path(fixture("config.ron"))
        .build()
        .unwrap();
    assert!(engine.has_vocabulary());
    assert_eq!(engine.config().number_format, NumberFormat::Verbal);
    let out = engine.run_str("[ifdef:fixture;[len:abc]] <noun -bird>", 0).unwrap();
    assert_eq!(out.main(), "three owl");
    let err = engine.run_str("[r:51]{x}", 0).unwrap_err().error;
    assert_eq!(err.kind(), ErrorKind::Semantic);
}

#[test]
fn missing_dictionary_file_fails_the_build() {
    let err = Engine::builder()
        .dictionary_path(fixture("nope.ron"))
        .build()
        .unwrap_err();
    assert!(matches!(err, LoadError::Io(_)));
}

#[test]
fn concurrent_runs_share_one_engine() {
    let engine = Arc::new(engine());
    let pattern = engine.compile("shared", "[r:5][s:\\s]{<noun>|<adj>|{x|y|z}}").unwrap();
    let expected = engine.run(&pattern, 77).unwrap();
    std::thread::scope(|s| {
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            let pattern = Arc::clone(&pattern);
            let expected = expected.clone();
            s.spawn(move || {
                for _ in 0..10 {
                    assert_eq!(engine.run(&pattern, 77).unwrap(), expected);
                }
            });
        }
    });
}

#[test]
fn synchronizers_replay_choices() {
    assert_eq!(run("[sync:s;ordered][r:5]{a|b|c}", 3), "abcab");
    assert_eq!(run("[sync:s;reverse][r:4]{a|b|c}", 3), "cbac");
    let locked = run("[sync:k;locked][r:3]{a|b|c|d}[sync:k;locked][r:2]{a|b|c|d}", 8);
    assert!(locked.chars().all(|c| c == locked.chars().next().unwrap()));
    assert_eq!(run("[sync:s;ordered]{a|b|c}[pin:s]{a|b|c}{a|b|c}[unpin:s]{a|b|c}", 0), "aaab");
    assert_eq!(run("[sync:s;ordered]{a|b|c}[reset:s]{a|b|c}", 0), "aa");
    let err = engine().run_str("[pin:ghost]", 0).unwrap_err().error;
    assert_eq!(err.kind(), ErrorKind::Semantic);
}

#[test]
fn each_blocks_ignore_the_active_synchronizer() {
    assert_eq!(run("[sync:s;locked][r:each]{a|b|c}", 5), "abc");
    assert_eq!(run("[sync:s;deck][r:each]{a|b|c}", 5), "abc");
    assert_eq!(run("[sync:s;reverse][r:each][s:,]{a|b|c}", 5), "a,b,c");
    // The synchronizer is not advanced by the each block.
    assert_eq!(run("[sync:s;ordered][r:each]{a|b|c}[r:2]{x|y|z}", 5), "abcxy");
}

#[test]
fn dictionary_can_be_supplied_in_memory() {
    let dictionary = Dictionary::parse_ron(r#"{ "noun": (entries: [(terms: ["kettle"])]) }"#).unwrap();
    let engine = Engine::builder()
        .with_vocabulary(dictionary)
        .config(EngineConfig {
            number_format: NumberFormat::RomanLower,
            ..Default::default()
        })
        .build()
        .unwrap();
    assert_eq!(engine.run_str("<noun> (2 + 2)", 0).unwrap().main(), "kettle iv");
}
