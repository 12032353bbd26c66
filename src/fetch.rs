use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;

const CONCURRENCY: usize = 4;

/// Subject codes behind the "ALL" department selector. The listing endpoint
/// needs them spelled out; there is no wildcard.
const ALL_SUBJECT_CODES: &[&str] = &[
    "ACCT", "ADM", "ADS", "ANTH", "ARCH", "ART", "ASL", "ASTR", "AT", "AUTO",
    "BIOL", "BIOT", "BUS", "CDEV", "CHEM", "CIT", "CJLE", "COMM", "COUN", "CS",
    "DANC", "DH", "DMBA", "DRAM", "DS", "ECE", "ECON", "EDUC", "EET", "EMGT",
    "EMS", "ENGL", "ENGR", "ENV", "ESL", "ETHN", "FAID", "FIN", "FIRE", "FN",
    "FREN", "GEOG", "GEOL", "GERO", "GRIT", "HCD", "HIST", "HIT", "HORT", "HST",
    "HUM", "IDF", "ITAL", "JAPN", "JOUR", "KIN", "LAW", "LIB", "LING", "LIT",
    "MGMT", "MKTG", "MATH", "MET", "MFT", "MICRO", "MUS", "NURS", "NUTR", "OTA",
    "PHIL", "PHOT", "PHYS", "POLS", "PORT", "PSY", "PSYC", "PTA", "READ", "RT",
    "SOC", "SPAN", "SPCH", "STAT", "SW", "THTR", "VET", "WELD", "WEXP", "WFT", "WS",
];

/// One per-subject fetch unit; failures stay isolated to the unit.
pub struct FetchedPage {
    pub subject: String,
    pub html: Option<String>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
    /// Mean round-trip time of the successful requests.
    pub avg_latency_ms: u64,
}

/// Listing-page fetcher: retry with exponential backoff on transient
/// failures, fixed delay between requests. The parser never sees any of
/// this; it only receives already-fetched page text.
pub struct Fetcher {
    client: Client,
    cfg: CollectorConfig,
}

impl Fetcher {
    pub fn new(cfg: &CollectorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.http.timeout_seconds))
            .user_agent(cfg.http.user_agent.clone())
            .danger_accept_invalid_certs(!cfg.http.verify_ssl)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Fetcher { client, cfg: cfg.clone() })
    }

    /// One listing request covering the given subjects (one page can span
    /// several subjects for one term).
    pub async fn fetch_listing(&self, term_code: &str, subjects: &[String]) -> Result<String> {
        let form = listing_form(&self.cfg, term_code, subjects);
        let label = if subjects.len() == 1 { subjects[0].clone() } else { format!("{} subjects", subjects.len()) };
        self.fetch_with_retry(&form, &label).await
    }

    /// Fetch one page per subject concurrently. Each unit is independent:
    /// one subject failing yields an error entry, never a failed batch.
    pub async fn fetch_subjects(
        self: Arc<Self>,
        term_code: &str,
        subjects: Vec<String>,
    ) -> Result<(Vec<FetchedPage>, FetchStats)> {
        let total = subjects.len();
        let semaphore = Arc::new(Semaphore::new(CONCURRENCY));

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchedPage>(CONCURRENCY * 2);

        for subject in subjects {
            let fetcher = Arc::clone(&self);
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();
            let term_code = term_code.to_string();

            tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                let start = Instant::now();
                let page = match fetcher.fetch_listing(&term_code, &[subject.clone()]).await {
                    Ok(html) => FetchedPage {
                        subject,
                        html: Some(html),
                        error: None,
                        latency_ms: start.elapsed().as_millis() as u64,
                    },
                    Err(e) => {
                        warn!("fetch failed for {subject}: {e}");
                        FetchedPage {
                            subject,
                            html: None,
                            error: Some(e.to_string()),
                            latency_ms: start.elapsed().as_millis() as u64,
                        }
                    }
                };
                let _ = tx.send(page).await;
            });
        }

        // Drop our copy of tx so rx closes when all spawned tasks finish.
        drop(tx);

        let mut pages = Vec::with_capacity(total);
        let mut ok = 0usize;
        let mut errors = 0usize;
        while let Some(page) = rx.recv().await {
            if page.error.is_some() { errors += 1 } else { ok += 1 }
            pages.push(page);
            pb.inc(1);
        }
        pb.finish_and_clear();

        // Channel arrival order is nondeterministic; sort by subject so the
        // output is stable.
        pages.sort_by(|a, b| a.subject.cmp(&b.subject));
        let avg_latency_ms = average_latency_ms(&pages);
        info!("fetched {total} pages ({ok} ok, {errors} errors, avg {avg_latency_ms}ms)");
        Ok((pages, FetchStats { total, ok, errors, avg_latency_ms }))
    }

    async fn fetch_with_retry(&self, form: &[(String, String)], label: &str) -> Result<String> {
        let max = self.cfg.rate_limit.retry_attempts;
        let mut attempt = 0u32;
        loop {
            match self.fetch_once(form).await {
                Ok(body) => {
                    self.rate_limit_delay().await;
                    return Ok(body);
                }
                Err(e) if attempt < max && is_transient(&e) => {
                    let backoff =
                        Duration::from_millis(self.cfg.rate_limit.base_backoff_ms * 2u64.pow(attempt));
                    warn!(
                        "transient failure for {label} (attempt {}/{max}), backing off {:.1}s: {e}",
                        attempt + 1,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(anyhow!(e).context(format!("listing request failed for {label}")))
                }
            }
        }
    }

    async fn fetch_once(&self, form: &[(String, String)]) -> Result<String, reqwest::Error> {
        let url = self.cfg.schedule_url();
        debug!("POST {url}");
        let response = self.client.post(&url).form(form).send().await?;
        response.error_for_status()?.text().await
    }

    async fn rate_limit_delay(&self) {
        let rps = self.cfg.rate_limit.requests_per_second;
        if rps > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(1.0 / rps)).await;
        }
    }
}

/// Expand the configured department list, resolving the "ALL" sentinel.
pub fn expand_departments(departments: &[String]) -> Vec<String> {
    if departments.iter().any(|d| d == "ALL") {
        ALL_SUBJECT_CODES.iter().map(|s| s.to_string()).collect()
    } else {
        departments.to_vec()
    }
}

/// Form body for the listing endpoint: term, the `dummy` sentinel the
/// backend requires before any real subject, the subjects, then the fixed
/// search fields.
fn listing_form(cfg: &CollectorConfig, term_code: &str, subjects: &[String]) -> Vec<(String, String)> {
    let mut form = vec![
        ("term".to_string(), term_code.to_string()),
        ("sel_subj".to_string(), "dummy".to_string()),
    ];
    for subject in subjects {
        form.push(("sel_subj".to_string(), subject.clone()));
    }
    for (k, v) in &cfg.search_params {
        form.push((k.clone(), v.clone()));
    }
    form
}

fn average_latency_ms(pages: &[FetchedPage]) -> u64 {
    let latencies: Vec<u64> = pages
        .iter()
        .filter(|p| p.error.is_none())
        .map(|p| p.latency_ms)
        .collect();
    if latencies.is_empty() {
        0
    } else {
        latencies.iter().sum::<u64>() / latencies.len() as u64
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() {
        return true;
    }
    matches!(
        e.status().map(|s| s.as_u16()),
        Some(429) | Some(500) | Some(502) | Some(503)
    )
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_has_dummy_sentinel_before_subjects() {
        let cfg = CollectorConfig::default();
        let form = listing_form(&cfg, "202570", &["ACCT".into(), "MATH".into()]);
        let subj: Vec<&str> = form
            .iter()
            .filter(|(k, _)| k == "sel_subj")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(subj, vec!["dummy", "ACCT", "MATH"]);
        assert_eq!(form[0], ("term".to_string(), "202570".to_string()));
        assert!(form.iter().any(|(k, _)| k == "sel_camp"));
    }

    #[test]
    fn all_sentinel_expands() {
        let subjects = expand_departments(&["ALL".to_string()]);
        assert!(subjects.len() > 50);
        assert!(subjects.contains(&"MATH".to_string()));
    }

    #[test]
    fn explicit_departments_pass_through() {
        let subjects = expand_departments(&["ACCT".to_string(), "CS".to_string()]);
        assert_eq!(subjects, vec!["ACCT", "CS"]);
    }

    fn page(subject: &str, latency_ms: u64, error: Option<&str>) -> FetchedPage {
        FetchedPage {
            subject: subject.into(),
            html: error.is_none().then(String::new),
            error: error.map(str::to_string),
            latency_ms,
        }
    }

    #[test]
    fn average_latency_skips_failures() {
        let pages = vec![
            page("ACCT", 100, None),
            page("BIOL", 300, None),
            page("CS", 9000, Some("timeout")),
        ];
        assert_eq!(average_latency_ms(&pages), 200);
        assert_eq!(average_latency_ms(&[]), 0);
    }
}
