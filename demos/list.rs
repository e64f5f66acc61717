//! List a tar archive, optionally appending inputs to it first.
//!
//! Usage:
//!   cargo run --example list -- archive.tar [input ...]
//!   cargo run --example list -- backup.tar notes.txt @other.tar

use tar_stream::{append, list, AppendOptions, EntryKind, ListOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: list <archive.tar> [input ...]");
        eprintln!("  list ./backup.tar notes.txt @other.tar");
        std::process::exit(1);
    }

    let archive = &args[1];
    let inputs = args[2..].to_vec();

    if !inputs.is_empty() {
        let offset = append(AppendOptions {
            inputs,
            ..AppendOptions::new(archive)
        })
        .await?;
        println!("Appended at offset {}", offset);
    }

    let entries = list(ListOptions::new(archive)).await?;
    println!("{} entr{} in archive:", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    for e in &entries {
        let marker = match e.kind {
            EntryKind::Directory => 'd',
            EntryKind::SymbolicLink => 'l',
            EntryKind::Link => 'h',
            _ => '-',
        };
        match &e.linkpath {
            Some(target) => println!("  {} {} -> {}", marker, e.path, target),
            None => println!("  {} {} ({} bytes)", marker, e.path, e.size),
        }
    }

    Ok(())
}
