//! Dictionary linter: checks word tables for problems queries would trip on.
//!
//! Usage: dict_linter <path>... [--patterns <dir>]
//!
//! Errors: empty tables, invalid table names, entries whose term count does
//! not match the table's subtypes, patterns that fail to compile.
//! Warnings: duplicate terms, classes carried by a single entry.

use clap::Parser;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::process;
use textloom::schema::token::is_valid_name;
use textloom::{Dictionary, Engine};

#[derive(Parser, Debug)]
#[command(name = "dict_linter")]
#[command(about = "Validate textloom dictionaries")]
struct Args {
    /// Dictionary files or directories of `.ron` files
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Directory of `.loom` pattern files that must compile
    #[arg(long)]
    patterns: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let mut dictionary = Dictionary::default();
    let mut load_errors = Vec::new();
    for path in &args.paths {
        load_recursive(path, &mut dictionary, &mut load_errors);
    }
    println!("Loaded {} tables", dictionary.tables.len());

    let (mut errors, warnings) = lint_dictionary(&dictionary);
    errors.extend(load_errors);
    if let Some(dir) = &args.patterns {
        errors.extend(lint_patterns(dir));
    }

    println!("\n=== Dictionary Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }
    for warning in &warnings {
        println!("WARNING: {}", warning);
    }
    for error in &errors {
        println!("ERROR: {}", error);
    }
    println!("\nSummary: {} errors, {} warnings", errors.len(), warnings.len());

    process::exit(if errors.is_empty() { 0 } else { 1 });
}

fn load_recursive(path: &Path, dictionary: &mut Dictionary, errors: &mut Vec<String>) {
    if path.is_dir() {
        let Ok(entries) = std::fs::read_dir(path) else {
            errors.push(format!("cannot read directory '{}'", path.display()));
            return;
        };
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();
        for path in paths {
            if path.is_dir() || path.extension().and_then(|s| s.to_str()) == Some("ron") {
                load_recursive(&path, dictionary, errors);
            }
        }
        return;
    }
    match Dictionary::load_from_ron(path) {
        Ok(loaded) => {
            println!("  Loaded: {}", path.display());
            dictionary.merge(loaded);
        }
        Err(e) => errors.push(format!("{}: {}", path.display(), e)),
    }
}

fn lint_dictionary(dictionary: &Dictionary) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (name, table) in &dictionary.tables {
        if !is_valid_name(name) {
            errors.push(format!("Table '{}' has a name queries cannot reach", name));
        }
        if table.entries.is_empty() {
            errors.push(format!("Table '{}' has no entries", name));
            continue;
        }

        let expected = table.subtypes.len().max(1);
        for (i, entry) in table.entries.iter().enumerate() {
            if entry.terms.len() != expected {
                errors.push(format!(
                    "{}[{}] '{}' has {} terms but the table has {} subtypes",
                    name,
                    i,
                    entry.terms.first().map(|t| t.value.as_str()).unwrap_or(""),
                    entry.terms.len(),
                    expected
                ));
            }
        }

        let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
        for (i, entry) in table.entries.iter().enumerate() {
            let Some(first) = entry.terms.first() else {
                continue;
            };
            if let Some(prev) = seen.insert(first.value.as_str(), i) {
                warnings.push(format!(
                    "{}[{}] duplicates '{}' from {}[{}]",
                    name, i, first.value, name, prev
                ));
            }
        }

        let mut class_uses: FxHashMap<&str, usize> = FxHashMap::default();
        for entry in &table.entries {
            for class in &entry.classes {
                *class_uses.entry(class.as_str()).or_default() += 1;
            }
        }
        let mut lonely: Vec<&str> = class_uses
            .into_iter()
            .filter(|&(_, uses)| uses == 1)
            .map(|(class, _)| class)
            .collect();
        lonely.sort_unstable();
        for class in lonely {
            warnings.push(format!(
                "Class '{}' in table '{}' is used by a single entry",
                class, name
            ));
        }
    }

    (errors, warnings)
}

fn lint_patterns(dir: &Path) -> Vec<String> {
    let mut errors = Vec::new();
    let engine = match Engine::builder().build() {
        Ok(engine) => engine,
        Err(e) => return vec![e.to_string()],
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return vec![format!("cannot read directory '{}'", dir.display())];
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.extension().and_then(|s| s.to_str()) != Some("loom") {
            continue;
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                if let Err(e) = engine.compile(&name, &source) {
                    errors.push(e.to_string());
                }
            }
            Err(e) => errors.push(format!("{}: {}", path.display(), e)),
        }
    }
    errors
}
