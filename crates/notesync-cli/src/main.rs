//! # notesync CLI
//!
//! Command-line utilities for inspecting, diffing, and merging notebook
//! files.

use anyhow::{Context, Result};
use notesync_core::{compute_diffs, merge, NotebookState};
use std::env;
use std::fs;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "diff" => {
            if args.len() < 4 {
                eprintln!("Usage: notesync diff <old.json> <new.json>");
                std::process::exit(1);
            }
            let old = read_notebook(&args[2])?;
            let new = read_notebook(&args[3])?;

            let diffs = compute_diffs(&old, &new);
            if diffs.is_empty() {
                println!("No differences");
            } else {
                println!("{}", serde_json::to_string_pretty(&diffs)?);
            }
        }
        "merge" => {
            if args.len() < 5 {
                eprintln!("Usage: notesync merge <base.json> <server.json> <local.json>");
                std::process::exit(1);
            }
            let base = read_notebook(&args[2])?;
            let server = read_notebook(&args[3])?;
            let local = read_notebook(&args[4])?;

            let outcome = merge(&base, &server, &local);
            println!("{}", serde_json::to_string_pretty(&outcome.state)?);
            if outcome.new_content {
                eprintln!("note: the merge brought in content the local version did not have");
            }
        }
        "show" => {
            if args.len() < 3 {
                eprintln!("Usage: notesync show <file.json>");
                std::process::exit(1);
            }
            let notebook = read_notebook(&args[2])?;
            print_summary(&notebook);
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn read_notebook(path: &str) -> Result<NotebookState> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {path}"))
}

fn print_summary(notebook: &NotebookState) {
    println!("{} block(s)", notebook.len());
    for (index, block) in notebook.blocks.iter().enumerate() {
        println!(
            "{index:>4}  {:<5}  {}  by {}",
            block.data.kind(),
            block.id,
            block.author
        );
    }
    if let Some(key_points) = &notebook.key_points {
        println!(
            "key points: {} bullet(s), generated at {} block(s)",
            key_points.bullets.len(),
            key_points.num_blocks
        );
    }
    if let Some(outline) = &notebook.outline {
        println!("outline: {} section(s)", outline.sections.len());
    }
}

fn print_help() {
    println!(
        r#"notesync CLI

USAGE:
    notesync <COMMAND> [OPTIONS]

COMMANDS:
    diff <old.json> <new.json>                  Print the atomic changes between two notebook files
    merge <base.json> <server.json> <local.json>  Three-way merge (server wins on conflict)
    show <file.json>                            Summarize a notebook file
    help                                        Show this help message

EXAMPLES:
    notesync diff yesterday.json today.json
    notesync merge common.json server.json local.json > merged.json
"#
    );
}
