//! Standalone validator for diagnosis word tables.
//!
//! Loads a JSON word table, checks every severity level and reports
//! how many distinct diagnoses the table can produce.

use std::process::ExitCode;

use clap::Parser;

use diagnosis_bot::config::{LevelWords, SeverityTable};
use diagnosis_bot::diagnosis::Severity;

/// Diagnosis word table validator.
#[derive(Parser, Debug)]
#[command(name = "validate_diagnoses")]
#[command(about = "Validates diagnosis word tables for the Telegram bot")]
#[command(version)]
struct Args {
    /// Path to the JSON word table to validate.
    #[arg(short, long, default_value = "diagnoses.json")]
    file: String,

    /// Write the built-in word table to the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Show every list for each level.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path);
    }

    validate_table(&args.file, args.verbose)
}

fn generate_example(output_path: &str) -> ExitCode {
    let table = SeverityTable::builtin();

    match table.save_to_file(output_path) {
        Ok(()) => {
            println!("✓ Built-in word table written to: {output_path}");
            println!("\nIt can produce {} distinct diagnoses.", table.combinations());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate_table(path: &str, verbose: bool) -> ExitCode {
    println!("Validating: {path}\n");

    let table = match SeverityTable::load_from_file(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("✗ Failed to load word table: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut errors = 0;

    for (severity, result) in Severity::ALL.iter().zip(table.validate_all()) {
        let words = table.level(*severity);
        println!(
            "[{}] {}: {} problems, {} body parts, {} qualifiers, {} modifiers",
            severity.get(),
            severity.label(),
            words.problems.len(),
            words.body_parts.len(),
            words.qualifiers.len(),
            words.modifiers.len()
        );

        if verbose {
            print_lists(words);
        }

        match result {
            Ok(()) => {
                if *severity != Severity::MAX && !words.modifiers.is_empty() {
                    println!("  ⚠ Warning: modifiers are only used at level {}", Severity::MAX.get());
                } else {
                    println!("  ✓ OK");
                }
            }
            Err(e) => {
                errors += 1;
                println!("  ✗ Error: {e}");
            }
        }
    }

    println!();

    if errors == 0 {
        println!("✓ All {} levels are valid!", Severity::ALL.len());
        println!("  {} distinct diagnoses", table.combinations());
        ExitCode::SUCCESS
    } else {
        println!("✗ Validation failed: {errors} level(s) with errors");
        ExitCode::FAILURE
    }
}

fn print_lists(words: &LevelWords) {
    let lists = [
        ("problems", &words.problems),
        ("body_parts", &words.body_parts),
        ("qualifiers", &words.qualifiers),
        ("modifiers", &words.modifiers),
    ];

    for (name, entries) in lists {
        println!("  {name}: {}", entries.join(", "));
    }
}
