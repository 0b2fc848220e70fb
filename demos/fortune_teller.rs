//! Fortune teller: one reading per visitor, each with its own seed.
//!
//! Shows predefined subroutines, carriers tying words together across a
//! reading, a private channel for the teller's notes, and a host hook.
//!
//! Run with: cargo run --example fortune_teller

use textloom::Engine;

const PRELUDE: &str = concat!(
    "[$[dark]:<omen -dark::!seen>]",
    "[$[bright]:<omen -bright::!seen>]",
    "[$[sign:mood]:{the|a single} [arg:mood]]",
);

const READING: &str = concat!(
    "[caps:first]{i see|the cards show|the smoke draws} [$sign:[$dark]] ",
    "beneath a [extern:moon;[num:1;28]] moon.\\n",
    "[caps:first]<omen.plural::=kin> circle you, and <omen.plural::=kin> ",
    "will follow you home.\\n",
    "You will <verb::&r> and you will <verb::&r>, ",
    "and at the end of it, <fate::@f> or <fate::@f>.\\n",
    "[out:notes;private]a second sign, ",
    "[any:[ifdef:grim;[$dark]];[$bright]][close:notes]",
    "Lucky number: [numfmt:roman][num:1;12].",
);

fn moon_phase(day: u32) -> &'static str {
    match day {
        1..=3 | 27..=28 => "new",
        4..=10 => "waxing",
        11..=17 => "full",
        _ => "waning",
    }
}

fn main() {
    let engine = Engine::builder()
        .dictionary_path(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/data/oracle.ron"))
        .hook("moon", |args| {
            let day: u32 = args.first().map(|d| d.trim().parse()).transpose()?.unwrap_or(1);
            Ok(moon_phase(day).to_string())
        })
        .subroutine_source("oracle", PRELUDE)
        .build()
        .expect("Failed to build engine");

    let reading = engine
        .compile("reading", READING)
        .expect("Failed to compile reading");

    println!("========================================");
    println!("   MADAME LOOM, SEER OF SEEDS");
    println!("========================================");

    for (seed, visitor) in [(7u64, "Ada"), (12, "Bram"), (1999, "Cass")] {
        println!("\n--- {} (seed {}) ---\n", visitor, seed);
        match engine.run(&reading, seed) {
            Ok(out) => {
                println!("{}", out.main());
                if let Some(notes) = out.get("notes") {
                    println!("\n  (the teller scribbles: {})", notes);
                }
            }
            Err(failure) => {
                println!("{}", failure.partial.main());
                println!("\n  The vision clouds over: {}", failure.error);
            }
        }
    }
}
