// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging (stderr, filtered by RUST_LOG or --verbose)
// 3. Dispatch to the appropriate subcommand handler
// 4. Print a report (table or JSON) on stdout
// 5. Exit with proper code (0 = done, 1 = mirror has missing files, 2 = error)
//
// Rust concepts used:
// - async/await: the crawl is network-bound
// - Result<T, E>: fatal problems bubble up with ? and become exit code 2
// - match: Pattern matching to handle different subcommands
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli; // src/cli.rs - command-line parsing
mod config; // src/config.rs - crawl settings and defaults
mod crawl; // src/crawl/ - fetching and the breadth-first scheduler
mod error; // src/error.rs - error types
mod links; // src/links/ - link discovery and canonicalization
mod logging; // src/logging.rs - tracing setup
mod mirror; // src/mirror/ - local paths, storage, rewriting, checking

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, MirrorArgs};
use crawl::{CrawlReport, Scheduler};
use links::Scope;
use mirror::{PathMapper, RewriteRule, RewriteSummary, VerifyReport};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = finished (individual fetch failures are in the report)
//   Ok(1) = `check` found references with no file behind them
//   Err   = fatal error (bad arguments, unwritable output, ...)
async fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match cli.command {
        Commands::Mirror(args) => handle_mirror(&args).await,
        Commands::Rewrite { dir, origin, json } => handle_rewrite(&dir, &origin, json),
        Commands::Check { dir, json } => handle_check(&dir, json),
    }
}

// Everything `mirror --json` prints
#[derive(Serialize)]
struct MirrorOutput<'a> {
    config: &'a config::CrawlConfig,
    crawl: &'a CrawlReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    rewrite: Option<&'a RewriteSummary>,
}

// Handles the 'mirror' subcommand: crawl, then rewrite the pages just saved
async fn handle_mirror(args: &MirrorArgs) -> Result<i32> {
    let config = args.to_config();
    let scope = config.validate()?;

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "cannot create output directory {}",
            config.output_dir.display()
        )
    })?;

    info!(
        "mirroring {} into {} (delay {}ms)",
        config.start_url,
        config.output_dir.display(),
        config.delay_ms
    );

    let scheduler = Scheduler::new(&config)?;

    // Ctrl-C stops the crawl after the current batch; what is already on
    // disk stays there and still gets rewritten.
    let cancel = scheduler.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing the current batch");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = scheduler.run().await?;

    let rewrite = if args.no_rewrite {
        None
    } else {
        let rule = RewriteRule::new(scope);
        info!("rewriting links to {} in saved pages", rule.origin());
        Some(mirror::rewrite_files(report.persisted_html(), &rule))
    };

    if args.json {
        let output = MirrorOutput {
            config: &config,
            crawl: &report,
            rewrite: rewrite.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_crawl_table(&report);
        if let Some(summary) = &rewrite {
            print_rewrite_summary(summary);
        }
    }

    Ok(0)
}

// Handles the 'rewrite' subcommand
fn handle_rewrite(dir: &Path, origin: &str, json: bool) -> Result<i32> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }
    let scope = Scope::parse(origin).with_context(|| format!("invalid origin '{}'", origin))?;
    let rule = RewriteRule::new(scope);

    info!("rewriting links to {} under {}", rule.origin(), dir.display());
    let summary = mirror::rewrite_tree(dir, &rule);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_rewrite_summary(&summary);
    }
    Ok(0)
}

// Handles the 'check' subcommand
fn handle_check(dir: &Path, json: bool) -> Result<i32> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }
    let report = mirror::verify_tree(&PathMapper::new(dir));

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_verify_table(&report);
    }

    if report.is_complete() {
        Ok(0)
    } else {
        Ok(1)
    }
}

// Prints one line per fetched URL and a summary
fn print_crawl_table(report: &CrawlReport) {
    println!("{:<60} {:<8} {:<40}", "URL", "STATUS", "RESULT");
    println!("{}", "=".repeat(110));

    for record in &report.records {
        let status = record
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let result = if record.success {
            record
                .local_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        } else {
            record.message.clone().unwrap_or_default()
        };

        println!("{:<60} {:<8} {:<40}", truncate(&record.url, 57), status, result);
    }

    println!();

    let saved = report.persisted().count();
    let failed = report.failed().count();

    println!("📊 Summary:");
    println!("   ✅ Saved: {}", saved);
    println!("   ❌ Failed: {}", failed);
    println!("   📋 Total: {}", report.records.len());
    if report.truncated {
        println!("   ⚠️  Stopped at the page limit; some URLs were not fetched");
    }
    if report.cancelled {
        println!("   ⚠️  Interrupted before the crawl finished");
    }
}

fn print_rewrite_summary(summary: &RewriteSummary) {
    println!();
    println!("🔗 Link rewrite:");
    println!("   📄 Pages scanned: {}", summary.files_scanned);
    println!("   ✏️  Pages changed: {}", summary.files_changed);
    println!("   🔁 Links rewritten: {}", summary.references_rewritten);
    for failure in &summary.failures {
        println!("   ❌ {}: {}", failure.path.display(), failure.error);
    }
}

fn print_verify_table(report: &VerifyReport) {
    if !report.missing.is_empty() {
        println!("{:<50} {:<50}", "PAGE", "MISSING REFERENCE");
        println!("{}", "=".repeat(100));
        for missing in &report.missing {
            println!(
                "{:<50} {:<50}",
                truncate(&missing.page.display().to_string(), 47),
                missing.reference
            );
        }
        println!();
    }

    println!("📊 Summary:");
    println!("   📄 Pages checked: {}", report.pages_checked);
    println!("   🔗 References checked: {}", report.references_checked);
    println!("   ❌ Missing: {}", report.missing.len());
}

// Shortens long values for display without splitting a character
fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        let head: String = value.chars().take(max).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}
