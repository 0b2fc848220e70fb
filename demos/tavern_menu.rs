//! Tavern menu: a chalkboard written fresh every evening.
//!
//! Shows repeaters with separators and predicates, a deck synchronizer that
//! deals the day's specials without repeats, running totals in arithmetic
//! variables, targets filled in after they are placed, and number formats.
//!
//! Run with: cargo run --example tavern_menu

use textloom::{Engine, EngineConfig, NumberFormat};

const MENU: &str = concat!(
    "[caps:upper]the <name>[caps:none]\\n",
    "Tonight's specials: [get:count]\\n",
    "(@total = 0)(@items = 0)",
    "[r:4][s:\\n][before:\"  * \"]{",
    "[caps:first]<adj::@+a> <dish::!d>",
    "[first:\" (house favourite)\"][last:\" (while it lasts)\"]",
    " ... (@price = [num:3;9])(price) pennies",
    "(@total += price)(@items++)",
    "}\\n",
    "[sync:drinks;deck]To drink: [r:3][s:\", \"]{ale|mead|cider|wine}.\\n",
    "[desync]Barkeep's pick: <drink -dear::=pick>, and again, <drink -dear::=pick>!\\n",
    "A full table costs (total) pennies.",
    "[numfmt:verbal][osend:count;(items)]",
);

fn main() {
    let config = EngineConfig {
        number_format: NumberFormat::Normal,
        ..Default::default()
    };
    let engine = Engine::builder()
        .config(config)
        .dictionary_path(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/data/tavern.ron"))
        .build()
        .expect("Failed to build engine");

    let menu = engine.compile("menu", MENU).expect("Failed to compile menu");

    for (day, seed) in ["Moonday", "Windsday", "Feastday"].into_iter().zip([3u64, 17, 404]) {
        println!("=== {} ===", day);
        match engine.run(&menu, seed) {
            Ok(out) => println!("{}\n", out),
            Err(failure) => println!("{}\n(chalk snapped: {})\n", failure.partial, failure.error),
        }
    }
}
