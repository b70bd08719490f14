//! Sweep - mailbox inspection and cleanup CLI
//!
//! Thin driver over the mail crate: counts messages per sender, trashes
//! bulk mail, and finds unsubscribe links. All the pacing, retry, and
//! batching behavior lives in the library.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::time::Duration;

use mail::{
    CleanupOptions, GmailAuth, GmailClient, GmailCredentials, ScanOptions, ScanProgress,
    SearchQuery, ThrottleConfig, clean_messages, count_senders, find_unsubscribe,
};

#[derive(Parser)]
#[command(name = "sweep")]
#[command(about = "Bulk mailbox inspection and cleanup")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Pacing flags shared by every subcommand
#[derive(Args)]
struct PacingArgs {
    /// Fast preset: shorter delays, larger chunks, riskier
    #[arg(long, conflicts_with = "conservative")]
    turbo: bool,
    /// Conservative preset: longer delays, smaller chunks
    #[arg(long, conflicts_with = "turbo")]
    conservative: bool,
    /// Override the starting pacing delay, in seconds
    #[arg(long)]
    initial_delay: Option<f64>,
    /// Override the pacing delay ceiling, in seconds
    #[arg(long)]
    max_delay: Option<f64>,
}

impl PacingArgs {
    fn throttle(&self) -> ThrottleConfig {
        let mut cfg = if self.turbo {
            ThrottleConfig::turbo()
        } else if self.conservative {
            ThrottleConfig::conservative()
        } else {
            ThrottleConfig::default()
        };
        if let Some(secs) = self.initial_delay {
            cfg.initial_delay = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = self.max_delay {
            cfg.max_delay = Duration::from_secs_f64(secs);
        }
        cfg
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Count messages per sender and domain
    Scan {
        /// Only messages from the last N days
        #[arg(long)]
        days: Option<u32>,
        /// Extra search terms (provider query syntax)
        #[arg(long)]
        query: Option<String>,
        /// Stop after listing this many messages
        #[arg(long)]
        max: Option<usize>,
        /// Rows to print per table
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[command(flatten)]
        pacing: PacingArgs,
    },
    /// Find messages from a sender and move them to trash
    Clean {
        /// Sender: full address, bare domain, or @domain
        sender: String,
        /// Only messages older than N days
        #[arg(long)]
        days: Option<u32>,
        /// Only messages larger than N megabytes
        #[arg(long)]
        larger_mb: Option<f64>,
        /// Extra search terms (provider query syntax)
        #[arg(long)]
        query: Option<String>,
        /// Leave the newest N matches untouched
        #[arg(long, default_value_t = 0)]
        keep: usize,
        /// Stop after listing this many messages
        #[arg(long)]
        max: Option<usize>,
        /// Skip the pre-delete JSON backup
        #[arg(long)]
        no_backup: bool,
        /// Report matches without trashing anything
        #[arg(long)]
        dry_run: bool,
        /// Actually delete; without this flag the run is a dry run
        #[arg(long)]
        yes: bool,
        #[command(flatten)]
        pacing: PacingArgs,
    },
    /// Find an unsubscribe link in the newest message from a sender
    Unsubscribe {
        /// Sender address or domain
        sender: String,
        /// Open the discovered link in the browser
        #[arg(long)]
        open: bool,
        #[command(flatten)]
        pacing: PacingArgs,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    config::init()?;

    let cli = Cli::parse();
    let client = build_client()?;

    match cli.command {
        Commands::Scan {
            days,
            query,
            max,
            top,
            pacing,
        } => run_scan(&client, days, query, max, top, &pacing),
        Commands::Clean {
            sender,
            days,
            larger_mb,
            query,
            keep,
            max,
            no_backup,
            dry_run,
            yes,
            pacing,
        } => run_clean(
            &client, sender, days, larger_mb, query, keep, max, no_backup, dry_run, yes, &pacing,
        ),
        Commands::Unsubscribe {
            sender,
            open: open_link,
            pacing,
        } => run_unsubscribe(&client, &sender, open_link, &pacing),
    }
}

fn build_client() -> Result<GmailClient> {
    let creds = GmailCredentials::load().context(
        "No Gmail credentials found. Place google-credentials.json in the config \
         directory or set GMAIL_CLIENT_ID / GMAIL_CLIENT_SECRET.",
    )?;
    let auth = GmailAuth::new(creds.client_id, creds.client_secret)?;
    Ok(GmailClient::new(auth))
}

/// Progress printer: one line every `step` messages
fn progress_logger(step: usize) -> impl FnMut(ScanProgress) {
    move |p: ScanProgress| {
        if p.processed > 0 && p.processed % step == 0 {
            info!(
                "{}/{} messages (delay {:.3}s)",
                p.processed,
                p.total,
                p.current_delay.as_secs_f64()
            );
        }
    }
}

fn run_scan(
    client: &GmailClient,
    days: Option<u32>,
    query: Option<String>,
    max: Option<usize>,
    top: usize,
    pacing: &PacingArgs,
) -> Result<()> {
    let mut search = String::new();
    if let Some(days) = days {
        search.push_str(&format!("newer_than:{}d", days));
    }
    if let Some(q) = query {
        if !search.is_empty() {
            search.push(' ');
        }
        search.push_str(&q);
    }

    let base = if pacing.turbo {
        ScanOptions::turbo()
    } else if pacing.conservative {
        ScanOptions::conservative()
    } else {
        ScanOptions::default()
    };
    let opts = ScanOptions {
        throttle: pacing.throttle(),
        max_messages: max,
        ..base
    };

    let report = count_senders(client, &search, &opts, progress_logger(100))?;

    println!("\n=== Scan results ===");
    println!("Listed:          {}", report.total_listed);
    println!("Processed:       {}", report.stats.processed);
    println!("Errors:          {}", report.stats.errors);
    println!("Unique senders:  {}", report.unique_senders);
    println!("Unique domains:  {}", report.unique_domains);
    println!(
        "Final delay:     {:.3}s",
        report.stats.final_delay.as_secs_f64()
    );
    if !report.listing_complete {
        println!("(listing was incomplete; counts cover what was fetched)");
    }

    print_table("Top senders", &report.top_senders, top);
    print_table("Top domains", &report.top_domains, top);
    Ok(())
}

fn print_table(title: &str, rows: &[(String, u64)], limit: usize) {
    if rows.is_empty() {
        return;
    }
    println!("\n--- {} ---", title);
    let width = rows
        .iter()
        .take(limit)
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);
    for (i, (name, count)) in rows.iter().take(limit).enumerate() {
        println!("{:2}. {:<width$} | {}", i + 1, name, count, width = width);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_clean(
    client: &GmailClient,
    sender: String,
    days: Option<u32>,
    larger_mb: Option<f64>,
    query: Option<String>,
    keep: usize,
    max: Option<usize>,
    no_backup: bool,
    dry_run: bool,
    yes: bool,
    pacing: &PacingArgs,
) -> Result<()> {
    let mut search = SearchQuery::new().sender(sender);
    if let Some(days) = days {
        search = search.older_than_days(days);
    }
    if let Some(mb) = larger_mb {
        search = search.larger_than_mb(mb);
    }
    if let Some(q) = query {
        search = search.extra(q);
    }

    // Destructive only with an explicit --yes
    let effective_dry_run = dry_run || !yes;
    if effective_dry_run && !dry_run {
        info!("no --yes given; running as a dry run");
    }

    let opts = CleanupOptions {
        throttle: pacing.throttle(),
        dry_run: effective_dry_run,
        auto_backup: !no_backup,
        keep_recent: keep,
        max_messages: max,
        ..CleanupOptions::default()
    };

    let run = clean_messages(client, &search, &opts, progress_logger(50))?;

    println!("\n=== Cleanup results ===");
    println!("Found:     {}", run.stats.found);
    println!("Trashed:   {}", run.stats.trashed);
    println!("Skipped:   {}", run.stats.skipped);
    println!("Backed up: {}", run.stats.backed_up);
    println!("Errors:    {}", run.stats.errors);
    if let Some(file) = &run.backup_file {
        println!("Backup:    {}", file.display());
    }
    if effective_dry_run {
        let preview: Vec<_> = run.matched.iter().take(20).collect();
        if !preview.is_empty() {
            println!("\nWould trash (oldest first, showing {}):", preview.len());
            for meta in preview {
                let date = meta
                    .received_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "????-??-??".to_string());
                println!("  {} | {}", date, truncate(&meta.subject, 60));
            }
            println!("\nRe-run with --yes to delete.");
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}

fn run_unsubscribe(
    client: &GmailClient,
    sender: &str,
    open_link: bool,
    pacing: &PacingArgs,
) -> Result<()> {
    let opts = ScanOptions {
        throttle: pacing.throttle(),
        page_size: 100,
        ..ScanOptions::default()
    };

    match find_unsubscribe(client, sender, &opts)? {
        Some(link) => {
            println!("Newest message: {}", link.message.subject);
            println!("Unsubscribe link:\n  {}", link.url);
            if open_link {
                open::that(&link.url).context("Failed to open browser")?;
                println!("Opened in browser; finish unsubscribing there.");
            }
        }
        None => {
            println!("No unsubscribe link found for {}.", sender);
            println!("Try unsubscribing manually from a recent message.");
        }
    }
    Ok(())
}
