//! `cache list` and `cache clean`.
//!
//! The cache directory holds one checkout per revision next to a
//! `<key>.sha256` file; an entry counts only once both exist. A
//! checkout without its hash file, or a hash file without its checkout, is
//! what an interrupted fetch leaves behind and is what `--stale` removes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use walkdir::WalkDir;

use deps_vendor::cache::ContentCache;
use deps_vendor::defaults;
use deps_vendor::output::{emoji, OutputConfig};
use deps_vendor::suggestions;

/// Manage the revision cache
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Revision cache directory [default: <user cache dir>/deps-vendor]
    #[arg(long, value_name = "DIR", env = "DEPS_VENDOR_CACHE")]
    pub cache_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheSubcommand {
    /// List all cached revisions
    List(ListArgs),
    /// Remove cached revisions
    Clean(CleanArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Show what would be deleted without actually deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Delete every cached revision
    #[arg(long)]
    pub all: bool,

    /// Delete partial copies and orphaned hash files
    #[arg(long)]
    pub stale: bool,
}

#[derive(Debug, Serialize)]
struct ListedEntry {
    revision: String,
    sha256: String,
    size: u64,
    file_count: usize,
}

pub fn execute(args: CacheArgs, out: &OutputConfig) -> Result<()> {
    let cache_root = args
        .cache_root
        .unwrap_or_else(defaults::default_cache_root);
    match args.command {
        CacheSubcommand::List(list_args) => execute_list(&cache_root, list_args),
        CacheSubcommand::Clean(clean_args) => execute_clean(&cache_root, clean_args, out),
    }
}

fn execute_list(cache_root: &Path, args: ListArgs) -> Result<()> {
    if !cache_root.exists() {
        if args.json {
            println!("[]");
        } else {
            println!("Cache directory does not exist: {}", cache_root.display());
            println!("No cached revisions found.");
        }
        return Ok(());
    }

    let cache = open(cache_root)?;
    let entries: Vec<ListedEntry> = cache
        .entries()?
        .into_iter()
        .map(|(revision, entry)| {
            let (size, file_count) = directory_info(&entry.local_copy);
            ListedEntry {
                revision,
                sha256: entry.content_hash,
                size,
                file_count,
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No cached revisions found in: {}", cache_root.display());
        return Ok(());
    }

    println!("{:<42} {:<54} {:>12}", "REVISION", "SHA256", "SIZE");
    for entry in &entries {
        println!(
            "{:<42} {:<54} {:>12}",
            entry.revision,
            entry.sha256,
            format_size(entry.size)
        );
    }
    let total: u64 = entries.iter().map(|e| e.size).sum();
    println!(
        "\nTotal: {} revisions ({})",
        entries.len(),
        format_size(total)
    );
    Ok(())
}

fn execute_clean(cache_root: &Path, args: CleanArgs, out: &OutputConfig) -> Result<()> {
    if !args.all && !args.stale {
        return Err(suggestions::cache_clean_no_filter());
    }
    if !cache_root.exists() {
        println!("Cache directory does not exist: {}", cache_root.display());
        println!("No cached revisions to clean.");
        return Ok(());
    }

    let cache = open(cache_root)?;
    let revisions: Vec<String> = if args.all {
        cache.entries()?.into_iter().map(|(key, _)| key).collect()
    } else {
        Vec::new()
    };
    let stale = cache.stale_paths()?;

    if revisions.is_empty() && stale.is_empty() {
        println!("No cache entries match the specified criteria.");
        return Ok(());
    }

    println!("Cache entries to be deleted:\n");
    for revision in &revisions {
        println!("  {}", revision);
    }
    for path in &stale {
        println!("  {} {}", path.display(), out.dim("(stale)"));
    }
    println!("\nTotal: {} entries", revisions.len() + stale.len());

    if args.dry_run {
        println!(
            "\n{} Dry run mode - no changes were made.",
            emoji(out, "🔎", "[DRY RUN]")
        );
        return Ok(());
    }

    let mut failed = 0;
    for revision in &revisions {
        if let Err(e) = cache.remove(revision) {
            failed += 1;
            eprintln!("  Failed to delete {}: {}", revision, e);
        }
    }
    for path in &stale {
        if let Err(e) = remove_path(path) {
            failed += 1;
            eprintln!("  Failed to delete {}: {}", path.display(), e);
        }
    }

    let deleted = revisions.len() + stale.len() - failed;
    if deleted > 0 {
        println!(
            "\n{} {}",
            emoji(out, "✅", "[OK]"),
            out.success(&format!("Deleted {} cache entries.", deleted))
        );
    }
    if failed > 0 {
        anyhow::bail!("Failed to delete {} cache entries", failed);
    }
    Ok(())
}

fn open(cache_root: &Path) -> Result<ContentCache> {
    ContentCache::open(cache_root)
        .with_context(|| format!("Failed to open cache at {}", cache_root.display()))
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Total size and number of files below `dir`
fn directory_info(dir: &Path) -> (u64, usize) {
    let mut size = 0u64;
    let mut file_count = 0usize;
    for entry in WalkDir::new(dir).into_iter().flatten() {
        if let Ok(meta) = entry.metadata() {
            if meta.is_file() {
                size += meta.len();
                file_count += 1;
            }
        }
    }
    (size, file_count)
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit + 1 < UNITS.len() {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}
