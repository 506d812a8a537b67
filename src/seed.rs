use crate::db::NewJob;

/// (title, company, location, description)
const SAMPLES: [(&str, &str, &str, &str); 5] = [
    (
        "Actuarial Analyst",
        "Insurance Co",
        "New York, NY",
        "Entry level actuarial position requiring strong analytical skills and knowledge of statistical methods.",
    ),
    (
        "Senior Actuary",
        "Financial Services Inc",
        "Chicago, IL",
        "Senior actuarial role with 5+ years experience. Responsibilities include risk assessment and financial modeling.",
    ),
    (
        "Actuarial Consultant",
        "Consulting Firm",
        "Remote",
        "Consulting position for qualified actuaries. Work with clients to solve complex insurance and risk management problems.",
    ),
    (
        "Risk Analyst",
        "Global Insurance",
        "Boston, MA",
        "Risk analysis role focusing on property and casualty insurance products.",
    ),
    (
        "Actuarial Director",
        "Healthcare Solutions",
        "San Francisco, CA",
        "Leadership position overseeing actuarial team in healthcare insurance sector.",
    ),
];

/// Fixed listings for local development, linked under `site_root`.
pub fn sample_jobs(site_root: &str) -> Vec<NewJob> {
    let root = site_root.trim_end_matches('/');
    SAMPLES
        .iter()
        .enumerate()
        .map(|(i, (title, company, location, description))| NewJob {
            title: title.to_string(),
            company: company.to_string(),
            location: location.to_string(),
            description: description.to_string(),
            url: format!("{}/sample-job{}", root, i + 1),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Utc;
    use rusqlite::Connection;

    #[test]
    fn seeding_twice_adds_nothing_new() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let jobs = sample_jobs("https://www.actuarylist.com/");

        let first = db::persist_jobs(&conn, &jobs, Utc::now()).unwrap();
        assert_eq!(first.inserted, 5);
        let second = db::persist_jobs(&conn, &jobs, Utc::now()).unwrap();
        assert_eq!(second, db::PersistStats { inserted: 0, skipped: 5 });
        assert_eq!(db::count_jobs(&conn).unwrap(), 5);
    }

    #[test]
    fn sample_urls_hang_off_the_site_root() {
        let jobs = sample_jobs("https://www.actuarylist.com/");
        assert_eq!(jobs[0].url, "https://www.actuarylist.com/sample-job1");
        assert_eq!(jobs[4].url, "https://www.actuarylist.com/sample-job5");
        assert!(jobs.iter().all(|j| j.description.chars().count() <= 500));
    }
}
