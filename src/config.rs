use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use clap::Args;

pub const DEFAULT_SITE_URL: &str = "https://www.actuarylist.com/";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const VIEWPORT: (u32, u32) = (1920, 1080);

/// Settings shared by every subcommand. Each flag can also come from the
/// environment (or a `.env` file).
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Site root to harvest listings from
    #[arg(long, global = true, env = "SCRAPER_SITE_URL", default_value = DEFAULT_SITE_URL)]
    pub site_url: String,

    /// SQLite database file
    #[arg(long, global = true, env = "SCRAPER_DB_PATH", default_value = "data/jobs.sqlite")]
    pub db_path: PathBuf,

    /// Directory for screenshots, markup snapshots and payload dumps
    #[arg(long, global = true, env = "SCRAPER_ARTIFACTS_DIR", default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Append-only run log
    #[arg(long, global = true, env = "SCRAPER_LOG_FILE", default_value = "artifacts/scraper.log")]
    pub log_file: PathBuf,

    /// Fixed wait after navigation before capturing rendered markup
    #[arg(long, global = true, env = "SCRAPER_SETTLE_SECS", default_value_t = 5)]
    pub settle_secs: u64,

    /// Transport timeout for the plain HTTP fetch
    #[arg(long, global = true, env = "SCRAPER_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Minutes between recurring runs
    #[arg(long, global = true, env = "SCRAPER_INTERVAL_MINS", default_value_t = 3)]
    pub interval_mins: u64,

    /// Comma-separated UTC times of day (HH:MM) for additional runs
    #[arg(long, global = true, env = "SCRAPER_DAILY_AT", default_value = "00:00,03:00,06:00")]
    pub daily_at: String,

    /// Browser identification string used by both fetch strategies
    #[arg(long, global = true, env = "SCRAPER_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub site_url: String,
    pub db_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub log_file: PathBuf,
    pub settle: Duration,
    pub http_timeout: Duration,
    pub interval: Duration,
    pub daily_at: Vec<NaiveTime>,
    pub user_agent: String,
}

impl Config {
    pub fn from_args(args: ConfigArgs) -> Result<Self> {
        if args.interval_mins == 0 {
            bail!("--interval-mins must be at least 1");
        }
        let daily_at = parse_daily_times(&args.daily_at)?;

        Ok(Config {
            site_url: args.site_url,
            db_path: args.db_path,
            artifacts_dir: args.artifacts_dir,
            log_file: args.log_file,
            settle: Duration::from_secs(args.settle_secs),
            http_timeout: Duration::from_secs(args.http_timeout_secs),
            interval: Duration::from_secs(args.interval_mins * 60),
            daily_at,
            user_agent: args.user_agent,
        })
    }
}

/// Parse "00:00,03:00" into times of day. Blank input means no daily runs.
pub fn parse_daily_times(raw: &str) -> Result<Vec<NaiveTime>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .with_context(|| format!("invalid daily time '{}', expected HH:MM", s))
        })
        .collect()
}
