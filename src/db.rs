use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            company     TEXT NOT NULL,
            location    TEXT NOT NULL,
            description TEXT NOT NULL,
            url         TEXT NOT NULL,
            date_posted TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_natural_key ON jobs(title, company, location);
        CREATE INDEX IF NOT EXISTS idx_jobs_date ON jobs(date_posted);

        CREATE TABLE IF NOT EXISTS run_lock (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            holder      TEXT NOT NULL,
            acquired_at TEXT NOT NULL
        );
        ",
    )
}

// ── Rows ──

/// A normalized listing not yet stored. `id` and `date_posted` are assigned
/// on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JobListing {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub date_posted: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistStats {
    pub inserted: usize,
    pub skipped: usize,
}

// ── Writes ──

/// Insert listings whose (title, company, location) isn't stored yet.
///
/// One transaction for the whole batch: either every new row lands or none
/// does. Duplicates within the batch are caught by the same lookup.
pub fn persist_jobs(conn: &Connection, jobs: &[NewJob], now: DateTime<Utc>) -> rusqlite::Result<PersistStats> {
    let tx = conn.unchecked_transaction()?;
    let mut stats = PersistStats::default();
    {
        let mut lookup = tx.prepare(
            "SELECT id FROM jobs WHERE title = ?1 AND company = ?2 AND location = ?3 LIMIT 1",
        )?;
        let mut insert = tx.prepare(
            "INSERT INTO jobs (title, company, location, description, url, date_posted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for j in jobs {
            let existing: Option<i64> = lookup
                .query_row(params![j.title, j.company, j.location], |r| r.get(0))
                .optional()?;
            if existing.is_some() {
                stats.skipped += 1;
                continue;
            }
            insert.execute(params![j.title, j.company, j.location, j.description, j.url, now])?;
            stats.inserted += 1;
        }
    }
    tx.commit()?;
    Ok(stats)
}

/// Delete every listing, returning how many there were.
pub fn clear_all(conn: &Connection) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute("DELETE FROM jobs", [])?;
    tx.commit()?;
    Ok(removed)
}

// ── Run lock ──

/// Take the single-row run lock shared by every process using this database.
/// A lock older than `stale_after` is treated as abandoned and replaced.
/// Returns `false` when someone else holds it.
pub fn try_acquire_run_lock(
    conn: &Connection,
    holder: &str,
    now: DateTime<Utc>,
    stale_after: chrono::Duration,
) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM run_lock WHERE acquired_at < ?1", params![now - stale_after])?;
    let taken = tx.execute(
        "INSERT OR IGNORE INTO run_lock (id, holder, acquired_at) VALUES (1, ?1, ?2)",
        params![holder, now],
    )?;
    tx.commit()?;
    Ok(taken == 1)
}

/// Release the lock if `holder` still owns it.
pub fn release_run_lock(conn: &Connection, holder: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM run_lock WHERE holder = ?1", params![holder])?;
    Ok(())
}

// ── Reads ──

pub fn count_jobs(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    /// Newest first
    #[default]
    Date,
    Company,
    Title,
    Location,
}

impl SortKey {
    fn order_by(self) -> &'static str {
        match self {
            SortKey::Date => "date_posted DESC, id DESC",
            SortKey::Company => "company, id",
            SortKey::Title => "title, id",
            SortKey::Location => "location, id",
        }
    }
}

#[derive(Debug, Default)]
pub struct JobQuery<'a> {
    pub location: Option<&'a str>,
    pub company: Option<&'a str>,
    pub sort: SortKey,
    pub limit: Option<usize>,
}

/// Case-insensitive substring filters on location and company.
pub fn fetch_jobs(conn: &Connection, q: &JobQuery) -> rusqlite::Result<Vec<JobListing>> {
    let mut conditions = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(loc) = q.location {
        params.push(like_pattern(loc));
        conditions.push(format!("location LIKE ?{} ESCAPE '\\'", params.len()));
    }
    if let Some(company) = q.company {
        params.push(like_pattern(company));
        conditions.push(format!("company LIKE ?{} ESCAPE '\\'", params.len()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let limit_clause = match q.limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    };

    let sql = format!(
        "SELECT id, title, company, location, description, url, date_posted
         FROM jobs{} ORDER BY {}{}",
        where_clause,
        q.sort.order_by(),
        limit_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(JobListing {
                id: row.get(0)?,
                title: row.get(1)?,
                company: row.get(2)?,
                location: row.get(3)?,
                description: row.get(4)?,
                url: row.get(5)?,
                date_posted: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// SQLite LIKE is already case-insensitive for ASCII.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn job(title: &str, company: &str, location: &str) -> NewJob {
        NewJob {
            title: title.into(),
            company: company.into(),
            location: location.into(),
            description: "desc".into(),
            url: "https://www.actuarylist.com/".into(),
        }
    }

    #[test]
    fn same_natural_key_twice_stores_one_row() {
        let conn = mem();
        let batch = vec![job("Actuary", "Acme", "Remote"), job("Actuary", "Acme", "Remote")];
        let stats = persist_jobs(&conn, &batch, Utc::now()).unwrap();
        assert_eq!(stats, PersistStats { inserted: 1, skipped: 1 });
        assert_eq!(count_jobs(&conn).unwrap(), 1);
    }

    #[test]
    fn existing_rows_are_skipped_not_updated() {
        let conn = mem();
        persist_jobs(&conn, &[job("Actuary", "Acme", "Remote")], Utc::now()).unwrap();
        let mut changed = job("Actuary", "Acme", "Remote");
        changed.description = "new text".into();
        let stats = persist_jobs(&conn, &[changed, job("Actuary", "Acme", "Boston")], Utc::now()).unwrap();
        assert_eq!(stats, PersistStats { inserted: 1, skipped: 1 });

        let rows = fetch_jobs(&conn, &JobQuery { location: Some("remote"), ..Default::default() }).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "desc");
    }

    #[test]
    fn failed_batch_leaves_nothing_behind() {
        let conn = mem();
        conn.execute_batch(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON jobs WHEN NEW.title = 'bad'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();
        let batch = vec![job("good", "A", "X"), job("bad", "B", "Y")];
        assert!(persist_jobs(&conn, &batch, Utc::now()).is_err());
        assert_eq!(count_jobs(&conn).unwrap(), 0);
    }

    #[test]
    fn clear_reports_removed_count() {
        let conn = mem();
        let batch = vec![job("A", "C", "L"), job("B", "C", "L"), job("C", "C", "L")];
        persist_jobs(&conn, &batch, Utc::now()).unwrap();
        assert_eq!(clear_all(&conn).unwrap(), 3);
        assert_eq!(count_jobs(&conn).unwrap(), 0);
        assert!(fetch_jobs(&conn, &JobQuery::default()).unwrap().is_empty());
        assert_eq!(clear_all(&conn).unwrap(), 0);
    }

    #[test]
    fn ids_are_not_reused_after_clear() {
        let conn = mem();
        persist_jobs(&conn, &[job("A", "C", "L"), job("B", "C", "L")], Utc::now()).unwrap();
        let before = fetch_jobs(&conn, &JobQuery::default()).unwrap();
        let max_before = before.iter().map(|j| j.id).max().unwrap();

        clear_all(&conn).unwrap();
        persist_jobs(&conn, &[job("A", "C", "L")], Utc::now()).unwrap();
        let after = fetch_jobs(&conn, &JobQuery::default()).unwrap();
        assert_eq!(after.len(), 1);
        assert!(after[0].id > max_before);
    }

    #[test]
    fn run_lock_is_exclusive_until_released() {
        let conn = mem();
        let now = Utc::now();
        let stale = Duration::minutes(30);
        assert!(try_acquire_run_lock(&conn, "serve", now, stale).unwrap());
        assert!(!try_acquire_run_lock(&conn, "cli", now, stale).unwrap());

        // Only the holder can release.
        release_run_lock(&conn, "cli").unwrap();
        assert!(!try_acquire_run_lock(&conn, "cli", now, stale).unwrap());

        release_run_lock(&conn, "serve").unwrap();
        assert!(try_acquire_run_lock(&conn, "cli", now, stale).unwrap());
    }

    #[test]
    fn stale_run_lock_is_taken_over() {
        let conn = mem();
        let now = Utc::now();
        let stale = Duration::minutes(30);
        assert!(try_acquire_run_lock(&conn, "crashed", now - Duration::hours(1), stale).unwrap());
        assert!(!try_acquire_run_lock(&conn, "cli", now - Duration::minutes(45), stale).unwrap());
        assert!(try_acquire_run_lock(&conn, "cli", now, stale).unwrap());
    }

    #[test]
    fn filters_and_sorting() {
        let conn = mem();
        let t0 = Utc::now();
        persist_jobs(&conn, &[job("Pricing", "Zeta Re", "Chicago, IL")], t0 - Duration::hours(2)).unwrap();
        persist_jobs(&conn, &[job("Reserving", "Acme Life", "Remote")], t0 - Duration::hours(1)).unwrap();
        persist_jobs(&conn, &[job("Capital", "acme p&c", "Chicago, IL")], t0).unwrap();

        let newest = fetch_jobs(&conn, &JobQuery::default()).unwrap();
        assert_eq!(newest[0].title, "Capital");
        assert_eq!(newest[2].title, "Pricing");

        let acme = fetch_jobs(&conn, &JobQuery { company: Some("ACME"), sort: SortKey::Title, ..Default::default() }).unwrap();
        let titles: Vec<_> = acme.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["Capital", "Reserving"]);

        let chicago_acme = fetch_jobs(
            &conn,
            &JobQuery { location: Some("chicago"), company: Some("acme"), ..Default::default() },
        )
        .unwrap();
        assert_eq!(chicago_acme.len(), 1);

        let limited = fetch_jobs(&conn, &JobQuery { sort: SortKey::Company, limit: Some(1), ..Default::default() }).unwrap();
        assert_eq!(limited[0].company, "Acme Life");
    }

    #[test]
    fn like_wildcards_are_literal() {
        let conn = mem();
        persist_jobs(&conn, &[job("A", "100% Mutual", "L"), job("B", "Other", "L")], Utc::now()).unwrap();
        let rows = fetch_jobs(&conn, &JobQuery { company: Some("%"), ..Default::default() }).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
