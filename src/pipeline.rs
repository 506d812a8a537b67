use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::artifacts::Artifacts;
use crate::db::{self, NewJob};
use crate::error::{FetchError, RunError};
use crate::fetch::{PageFetcher, Strategy};
use crate::parser::normalize::{self, RawRecord};
use crate::parser::payload::{self, Payload};

#[derive(Debug)]
pub enum RunOutcome {
    Success,
    /// Stored what it could; some records were unusable.
    Partial,
    Failed(RunError),
}

/// What happened during one run. Observability only, never persisted.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub trigger: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub strategy: Option<Strategy>,
    pub outcome: RunOutcome,
    pub cleared: usize,
    pub extracted: usize,
    pub added: usize,
    pub skipped: usize,
    pub rejected: usize,
}

impl RunReport {
    fn start(trigger: &str) -> Self {
        let now = Utc::now();
        RunReport {
            run_id: Uuid::new_v4(),
            trigger: trigger.to_string(),
            started_at: now,
            finished_at: now,
            duration: Duration::ZERO,
            strategy: None,
            outcome: RunOutcome::Success,
            cleared: 0,
            extracted: 0,
            added: 0,
            skipped: 0,
            rejected: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOutcome {
    pub success: bool,
    pub removed: usize,
}

/// A run lock older than this is assumed abandoned by a crashed process.
fn run_lock_stale() -> chrono::Duration {
    chrono::Duration::minutes(30)
}

/// Holds the database run lock; releases it on drop, including on unwind.
struct RunLease<'a> {
    conn: &'a Mutex<Connection>,
    holder: String,
}

impl Drop for RunLease<'_> {
    fn drop(&mut self) {
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = db::release_run_lock(&conn, &self.holder) {
            warn!("Could not release run lock {}: {}", self.holder, e);
        }
    }
}

/// Result of trying one fetch strategy.
enum Attempt {
    Records(Vec<Value>),
    NotFound,
    Failed(FetchError),
}

/// Clear, fetch (rendered then plain), extract, normalize, persist.
///
/// Stages run strictly in sequence. Storage is locked only inside a single
/// synchronous call, never across network I/O.
pub struct Orchestrator {
    fetcher: Arc<dyn PageFetcher>,
    conn: Mutex<Connection>,
    artifacts: Artifacts,
    site_root: String,
}

impl Orchestrator {
    /// `conn` must already have the schema.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        conn: Connection,
        artifacts: Artifacts,
        site_root: impl Into<String>,
    ) -> Self {
        Orchestrator {
            fetcher,
            conn: Mutex::new(conn),
            artifacts,
            site_root: site_root.into(),
        }
    }

    /// Execute one run. Every failure is folded into the report.
    pub async fn run(&self, trigger: &str) -> RunReport {
        let mut report = RunReport::start(trigger);
        let span = info_span!("scrape_run", run_id = %report.run_id, trigger);

        async {
            info!("Starting job scraping run");
            let t0 = Instant::now();

            if let Err(e) = self.execute(&mut report).await {
                error!("Run failed: {}", e);
                report.outcome = RunOutcome::Failed(e);
            }

            report.duration = t0.elapsed();
            report.finished_at = Utc::now();
            info!(
                "Run finished in {:.1}s: {:?}, {} added, {} duplicates, {} rejected",
                report.duration.as_secs_f64(),
                report.outcome,
                report.added,
                report.skipped,
                report.rejected
            );
        }
        .instrument(span)
        .await;

        report
    }

    /// Take the cross-process run lock. `Busy` if another process has it.
    fn lease(&self, holder: String) -> Result<RunLease<'_>, RunError> {
        let taken = self.with_conn(|c| db::try_acquire_run_lock(c, &holder, Utc::now(), run_lock_stale()))?;
        if !taken {
            return Err(RunError::Busy);
        }
        Ok(RunLease {
            conn: &self.conn,
            holder,
        })
    }

    async fn execute(&self, report: &mut RunReport) -> Result<(), RunError> {
        let _lease = self.lease(report.run_id.to_string())?;

        // Replace-all: a run that fails after this point leaves storage empty.
        report.cleared = self.with_conn(db::clear_all)?;
        info!("Cleared {} jobs", report.cleared);

        let (strategy, records) = self.harvest().await?;
        report.strategy = Some(strategy);
        report.extracted = records.len();

        let (jobs, rejected) = self.normalize_all(records);
        report.rejected = rejected;

        let stats = self.with_conn(|c| db::persist_jobs(c, &jobs, Utc::now()))?;
        report.added = stats.inserted;
        report.skipped = stats.skipped;
        info!("Added {} new jobs via {} fetch", stats.inserted, strategy);

        if rejected > 0 {
            report.outcome = RunOutcome::Partial;
        }
        Ok(())
    }

    /// Try each strategy in order until one yields records.
    async fn harvest(&self) -> Result<(Strategy, Vec<Value>), RunError> {
        let mut last = RunError::NotFound;
        for strategy in Strategy::ORDER {
            match self.attempt(strategy).await {
                Attempt::Records(records) => return Ok((strategy, records)),
                Attempt::NotFound => {
                    info!("No job payload via {} fetch", strategy);
                    last = RunError::NotFound;
                }
                Attempt::Failed(e) => {
                    warn!("{} fetch failed: {}", strategy, e);
                    last = RunError::Fetch(e);
                }
            }
        }
        Err(last)
    }

    async fn attempt(&self, strategy: Strategy) -> Attempt {
        let page = match self.fetcher.fetch(strategy).await {
            Ok(page) => page,
            Err(e) => return Attempt::Failed(e),
        };
        info!(
            "{} fetch took {:.1}s ({} bytes, status {:?}, screenshot {})",
            page.strategy,
            page.elapsed.as_secs_f64(),
            page.markup.len(),
            page.status,
            page.screenshot_saved
        );

        match payload::extract(&page.markup, &self.artifacts) {
            Payload::Found { records, .. } if !records.is_empty() => Attempt::Records(records),
            Payload::Found { origin, .. } => {
                info!("Job collection in {:?} is empty", origin);
                Attempt::NotFound
            }
            Payload::NotFound => Attempt::NotFound,
        }
    }

    fn normalize_all(&self, records: Vec<Value>) -> (Vec<NewJob>, usize) {
        let mut jobs = Vec::with_capacity(records.len());
        let mut rejected = 0;

        for (i, value) in records.into_iter().enumerate() {
            let Some(raw) = RawRecord::from_value(value) else {
                warn!("Record {} is not an object, rejected", i);
                rejected += 1;
                continue;
            };
            let job = normalize::normalize(&raw, &self.site_root);
            if job.title.is_empty() {
                warn!("Record {} has no title, rejected", i);
                rejected += 1;
                continue;
            }
            debug!("Extracted job: {} at {} in {}", job.title, job.company, job.location);
            jobs.push(job);
        }
        (jobs, rejected)
    }

    /// Delete every stored listing. Never panics or propagates.
    pub fn clear_all_jobs(&self) -> ClearOutcome {
        let cleared = self
            .lease(format!("clear-{}", Uuid::new_v4()))
            .and_then(|_lease| self.with_conn(db::clear_all));
        match cleared {
            Ok(removed) => {
                info!("Cleared {} jobs on request", removed);
                ClearOutcome { success: true, removed }
            }
            Err(e) => {
                error!("Clearing jobs failed: {}", e);
                ClearOutcome { success: false, removed: 0 }
            }
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, RunError> {
        let conn = self.conn.lock().map_err(|_| RunError::StoreUnavailable)?;
        Ok(f(&conn)?)
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::error::FetchError;
    use crate::fetch::{FetchedPage, PageFetcher, Strategy};

    #[derive(Clone)]
    pub enum Reply {
        Markup(String),
        Fail,
    }

    /// Scripted fetcher: fixed reply per strategy, records every call.
    pub struct FakeFetcher {
        rendered: Reply,
        plain: Reply,
        pub calls: Mutex<Vec<Strategy>>,
        /// When set, each fetch waits here until notified.
        pub hold: Option<std::sync::Arc<Notify>>,
    }

    impl FakeFetcher {
        pub fn new(rendered: Reply, plain: Reply) -> Self {
            FakeFetcher {
                rendered,
                plain,
                calls: Mutex::new(Vec::new()),
                hold: None,
            }
        }

        pub fn calls(&self) -> Vec<Strategy> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, strategy: Strategy) -> Result<FetchedPage, FetchError> {
            self.calls.lock().unwrap().push(strategy);
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            let reply = match strategy {
                Strategy::Rendered => &self.rendered,
                Strategy::Plain => &self.plain,
            };
            match reply {
                Reply::Markup(markup) => Ok(FetchedPage {
                    strategy,
                    markup: markup.clone(),
                    status: Some(200),
                    screenshot_saved: false,
                    elapsed: Duration::from_millis(1),
                }),
                Reply::Fail => Err(FetchError::BrowserLaunch("no chrome in tests".into())),
            }
        }
    }

    pub fn jobs_page(jobs: serde_json::Value) -> String {
        let payload = serde_json::json!({ "props": { "pageProps": { "filteredJobs": jobs } } });
        format!(
            r#"<html><body><script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#,
            payload
        )
    }
}
