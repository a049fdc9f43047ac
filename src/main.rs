//! CLI for docsentry: triage .msg, .eml and .pdf files or whole directories.

#![cfg(feature = "cli")]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use docsentry::threat::{detect_mime_type, human_size};
use docsentry::{CommonDomains, FileType, Inspector, ProcessResult};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Parser)]
#[command(name = "docsentry")]
#[command(about = "Triage suspicious emails (.msg, .eml) and PDFs without opening them", long_about = None)]
struct Args {
    /// File to triage, or a directory of .msg/.eml/.pdf files
    path: Option<PathBuf>,

    /// Directory to triage (add -r to include subdirectories)
    #[arg(short = 'd', long = "directory", value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Replace the bundled common-domain list (one hostname per line, # comments)
    #[arg(long, value_name = "FILE")]
    domains: Option<PathBuf>,

    /// Emit one JSON object per file
    #[arg(long)]
    json: bool,

    /// Indent JSON output (with --json)
    #[arg(long)]
    pretty: bool,

    /// Quiet: only print dangerous or failed paths
    #[arg(short, long)]
    quiet: bool,

    /// Log verbosity on stderr (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Default)]
struct Summary {
    total: u64,
    dangerous: u64,
    failed: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let inspector = match &args.domains {
        Some(file) => Inspector::with_domains(
            CommonDomains::from_file(file)
                .with_context(|| format!("reading domain list {}", file.display()))?,
        ),
        None => Inspector::new(),
    };

    let Some(path) = args.directory.as_ref().or(args.path.as_ref()) else {
        bail!("Missing path: give a file/directory as argument or use -d/--directory <DIR>");
    };

    if !path.exists() {
        eprintln!("Not found: {}", path.display());
        std::process::exit(1);
    }

    let mut summary = Summary::default();
    if path.is_file() {
        if args.directory.is_some() {
            eprintln!("--directory expects a directory, not a file: {}", path.display());
            std::process::exit(1);
        }
        scan_file(path, &inspector, &args, &mut summary)?;
        return Ok(());
    }

    if !args.quiet {
        eprintln!(
            "Scanning directory: {} {}",
            path.display(),
            if args.recursive { "(recursive)" } else { "" }
        );
    }
    let walker = if args.recursive {
        WalkDir::new(path)
    } else {
        WalkDir::new(path).max_depth(1)
    };
    for entry in walker {
        let entry = entry?;
        let file = entry.path();
        if !file.is_file() || FileType::from_path(file).is_none() {
            continue;
        }
        scan_file(file, &inspector, &args, &mut summary)?;
    }

    if !args.quiet {
        eprintln!(
            "Scanned {} files, {} dangerous, {} failed",
            summary.total, summary.dangerous, summary.failed
        );
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn scan_file(
    path: &Path,
    inspector: &Inspector,
    args: &Args,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            summary.failed += 1;
            return Ok(());
        }
    };
    let result = inspector.analyze_bytes(path, &bytes);

    summary.total += 1;
    if result.dangerous {
        summary.dangerous += 1;
    } else if result.error.is_some() {
        summary.failed += 1;
    }
    print_result(&result, args, &bytes)
}

fn print_result(result: &ProcessResult, args: &Args, bytes: &[u8]) -> anyhow::Result<()> {
    let status = result.status();
    if args.quiet && matches!(status, "OK" | "INCOMPLETE") {
        return Ok(());
    }
    let sha256 = sha256_hex(bytes);

    if args.json {
        let mut out = IndexMap::<String, serde_json::Value>::new();
        out.insert("sha256".to_string(), serde_json::Value::String(sha256));
        out.insert("path".to_string(), serde_json::Value::String(result.file_path.clone()));
        out.insert("status".to_string(), serde_json::Value::String(status.to_string()));
        out.insert("size_bytes".to_string(), serde_json::to_value(bytes.len())?);
        out.insert("result".to_string(), serde_json::to_value(result)?);
        let json_str = if args.pretty {
            serde_json::to_string_pretty(&out)?
        } else {
            serde_json::to_string(&out)?
        };
        println!("{}", json_str);
        return Ok(());
    }

    println!("{} {}", status, result.file_path);
    println!("  sha256: {}", sha256);
    println!("  size: {} ({} bytes)", human_size(bytes.len() as u64), bytes.len());
    let mime = result
        .mime_type
        .as_deref()
        .unwrap_or_else(|| detect_mime_type(bytes));
    println!("  mime: {}", mime);
    if let Some(ref e) = result.error {
        println!("  error: {}", e);
    }
    if args.quiet {
        return Ok(());
    }
    if !result.metadata.is_empty() {
        println!("  metadata:");
        for line in result.metadata.lines() {
            println!("    {}", line);
        }
    }
    if !result.analysis.is_empty() {
        println!("  analysis:");
        for line in result.analysis.lines() {
            println!("    {}", line);
        }
    }
    Ok(())
}
