mod artifacts;
mod config;
mod db;
mod error;
mod fetch;
mod logging;
mod parser;
mod pipeline;
mod scheduler;
mod seed;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use artifacts::Artifacts;
use config::{Config, ConfigArgs};
use fetch::SiteFetcher;
use pipeline::{Orchestrator, RunOutcome, RunReport};
use scheduler::{RunTrigger, Scheduler, SHUTDOWN_GRACE};

#[derive(Parser)]
#[command(name = "actuary_scraper", about = "Scheduled job-listing harvester")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run on the schedule until Ctrl-C
    Serve {
        /// Also start one run immediately, in the background
        #[arg(long)]
        run_at_start: bool,
    },
    /// Run the scrape pipeline once in the foreground
    Run,
    /// Delete every stored listing
    Clear,
    /// Insert a fixed set of sample listings for local development
    Seed,
    /// List stored listings
    Jobs {
        /// Case-insensitive substring match on location
        #[arg(short, long)]
        location: Option<String>,
        /// Case-insensitive substring match on company
        #[arg(short, long)]
        company: Option<String>,
        #[arg(short, long, value_enum, default_value_t = db::SortKey::Date)]
        sort: db::SortKey,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Print URL and description under each row
        #[arg(long)]
        full: bool,
    },
    /// Job count, recent run log lines and saved diagnostics
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let t0 = Instant::now();
    let cli = Cli::parse();
    let config = Config::from_args(cli.config)?;
    logging::init(&config.log_file);

    let result = match cli.command {
        Commands::Serve { run_at_start } => {
            let trigger = RunTrigger::new(Arc::new(build_orchestrator(&config)?));
            let scheduler = Scheduler::start(trigger, config.interval, &config.daily_at).await?;
            if run_at_start {
                let _ = scheduler.run_now();
            }
            println!("Scheduler running. Press Ctrl-C to stop.");
            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            scheduler.shutdown(SHUTDOWN_GRACE).await
        }
        Commands::Run => {
            let orchestrator = build_orchestrator(&config)?;
            let report = orchestrator.run("cli").await;
            print_report(&report);
            if report.is_failed() {
                Err(anyhow::anyhow!(
                    "Run {} failed, see {}",
                    report.run_id,
                    config.log_file.display()
                ))
            } else {
                Ok(())
            }
        }
        Commands::Clear => {
            let orchestrator = build_orchestrator(&config)?;
            let outcome = orchestrator.clear_all_jobs();
            println!("success: {}, removed: {}", outcome.success, outcome.removed);
            if outcome.success {
                Ok(())
            } else {
                Err(anyhow::anyhow!("Clear failed (see {})", config.log_file.display()))
            }
        }
        Commands::Seed => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let stats = db::persist_jobs(&conn, &seed::sample_jobs(&config.site_url), chrono::Utc::now())?;
            println!(
                "Added {} sample jobs ({} already present), {} total",
                stats.inserted,
                stats.skipped,
                db::count_jobs(&conn)?
            );
            Ok(())
        }
        Commands::Jobs {
            location,
            company,
            sort,
            limit,
            full,
        } => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_jobs(
                &conn,
                &db::JobQuery {
                    location: location.as_deref(),
                    company: company.as_deref(),
                    sort,
                    limit: Some(limit),
                },
            )?;
            if rows.is_empty() {
                println!("No jobs found. Run 'run' first.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<32} | {:<24} | {:<20} | {:<10}",
                "ID", "Title", "Company", "Location", "Posted"
            );
            println!("{}", "-".repeat(103));
            for j in &rows {
                println!(
                    "{:>5} | {:<32} | {:<24} | {:<20} | {:<10}",
                    j.id,
                    truncate(&j.title, 32),
                    truncate(&j.company, 24),
                    truncate(&j.location, 20),
                    j.date_posted.format("%Y-%m-%d")
                );
                if full {
                    println!("      {}", j.url);
                    println!("      {}\n", j.description);
                }
            }
            println!("\n{} jobs", rows.len());
            Ok(())
        }
        Commands::Status => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            println!("Jobs:      {}", db::count_jobs(&conn)?);

            let artifacts = Artifacts::new(&config.artifacts_dir);
            let files = artifacts.list();
            if let Some(dir) = artifacts.dir() {
                println!("Artifacts: {} in {}", files.len(), dir.display());
            }
            for f in &files {
                println!("  {}", f);
            }

            let recent = logging::tail(&config.log_file, 20);
            if recent.is_empty() {
                println!("\nNo run log yet at {}", config.log_file.display());
            } else {
                println!("\n--- Last {} log lines ---", recent.len());
                for line in recent {
                    println!("{}", line);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let conn = db::connect(&config.db_path)?;
    db::init_schema(&conn)?;
    let artifacts = Artifacts::new(&config.artifacts_dir);
    let fetcher = SiteFetcher::new(config, artifacts.clone()).context("Failed to build HTTP client")?;
    Ok(Orchestrator::new(Arc::new(fetcher), conn, artifacts, config.site_url.clone()))
}

fn print_report(r: &RunReport) {
    let outcome = match &r.outcome {
        RunOutcome::Success => "success".to_string(),
        RunOutcome::Partial => "partial".to_string(),
        RunOutcome::Failed(e) => format!("failed ({})", e),
    };
    let strategy = r
        .strategy
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".into());

    println!("Run {} [{}]", r.run_id, r.trigger);
    println!("Started:   {}", r.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Finished:  {}", r.finished_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Outcome:   {}", outcome);
    println!("Strategy:  {}", strategy);
    println!("Cleared:   {}", r.cleared);
    println!("Extracted: {}", r.extracted);
    println!("Added:     {}", r.added);
    println!("Skipped:   {} duplicates, {} rejected", r.skipped, r.rejected);
    println!("Took:      {}", format_duration(r.duration));
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max - 3).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
