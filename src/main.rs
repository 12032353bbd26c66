mod audit;
mod config;
mod diff;
mod export;
mod fetch;
mod models;
mod parser;
mod storage;
mod trend;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};

use config::CollectorConfig;
use models::{CollectionMetadata, ScheduleData};
use storage::Storage;

#[derive(Parser)]
#[command(name = "schedule_scrape", about = "Course schedule collector for Banner class listings")]
struct Cli {
    /// Config file (defaults apply when missing)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the live listing, parse it and store a snapshot
    Collect {
        /// Term code (default: current term from config)
        #[arg(short, long)]
        term: Option<String>,
        /// Comma-separated subject codes (default: config departments)
        #[arg(short, long, value_delimiter = ',')]
        subjects: Vec<String>,
        /// Parse and report only, skip writing the snapshot
        #[arg(long)]
        no_save: bool,
    },
    /// Parse a saved listing page
    Parse {
        /// HTML file to parse
        input: PathBuf,
        /// Term code for the snapshot (default: current term from config)
        #[arg(short, long)]
        term: Option<String>,
        /// Write the parsed snapshot to the data directory
        #[arg(long)]
        save: bool,
    },
    /// Course table from a stored snapshot (latest when no file given)
    Info {
        file: Option<PathBuf>,
        /// Filter by subject code (e.g. MATH)
        #[arg(short, long)]
        subject: Option<String>,
        /// Filter by instructor substring
        #[arg(short, long)]
        instructor: Option<String>,
        /// Look up one CRN
        #[arg(long)]
        crn: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Compare two snapshots of the same term
    Compare { old: PathBuf, new: PathBuf },
    /// Trend summary over recently stored snapshots
    Report {
        /// Filter by term code
        #[arg(short, long)]
        term: Option<String>,
        /// Window size in days
        #[arg(short, long, default_value = "30")]
        days: i64,
        /// Max rows per section
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Data-quality checks on a snapshot (latest when no file given)
    Validate { file: Option<PathBuf> },
    /// Export a snapshot to CSV or JSON
    Export {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = CollectorConfig::load(&cli.config)?;

    let result = match cli.command {
        Commands::Collect { term, subjects, no_save } => {
            collect(&cfg, term, subjects, no_save).await
        }
        Commands::Parse { input, term, save } => parse_file(&cfg, &input, term, save),
        Commands::Info { file, subject, instructor, crn, limit } => {
            let schedule = load_snapshot(&cfg, file.as_deref())?;
            info(&schedule, subject.as_deref(), instructor.as_deref(), crn.as_deref(), limit)
        }
        Commands::Compare { old, new } => {
            let before = Storage::load_schedule(&old)?;
            let after = Storage::load_schedule(&new)?;
            compare(&before, &after)
        }
        Commands::Report { term, days, limit } => {
            let storage = Storage::new(&cfg.storage.data_dir, cfg.storage.compression)?;
            report(&storage, term.as_deref(), days, limit)
        }
        Commands::Validate { file } => {
            let schedule = load_snapshot(&cfg, file.as_deref())?;
            validate(&schedule)
        }
        Commands::Export { file, output, format } => {
            let schedule = Storage::load_schedule(&file)?;
            match format {
                ExportFormat::Csv => export::export_csv(&schedule, &output),
                ExportFormat::Json => export::export_json(&schedule, &output),
            }
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn collect(
    cfg: &CollectorConfig,
    term: Option<String>,
    subjects: Vec<String>,
    no_save: bool,
) -> anyhow::Result<()> {
    let start_time = Utc::now();
    let t0 = Instant::now();

    let term_code = term.unwrap_or_else(|| cfg.current_term.clone());
    let term_name = cfg.term_name(&term_code);
    let subjects = if subjects.is_empty() {
        fetch::expand_departments(&cfg.departments)
    } else {
        fetch::expand_departments(&subjects)
    };

    println!("Collecting {term_name} ({term_code}): {} subjects...", subjects.len());
    let fetcher = Arc::new(fetch::Fetcher::new(cfg)?);
    let (pages, stats) = fetcher.fetch_subjects(&term_code, subjects).await?;
    println!(
        "Fetched {} pages ({} ok, {} errors, avg {}ms).",
        stats.total, stats.ok, stats.errors, stats.avg_latency_ms
    );

    let collected_at = Utc::now();
    let source_url = cfg.schedule_url();
    let (schedule, report) = parse_pages(&pages, &term_name, &term_code, &source_url, collected_at);

    println!(
        "Parsed {} courses across {} departments ({}).",
        schedule.total_courses,
        schedule.departments.len(),
        report.summary()
    );

    if no_save {
        return Ok(());
    }

    let storage = Storage::new(&cfg.storage.data_dir, cfg.storage.compression)?;
    let path = storage.save_schedule(&schedule)?;
    println!("Snapshot: {}", path.display());
    if cfg.storage.keep_snapshots > 0 {
        storage.cleanup_old(cfg.storage.keep_snapshots)?;
    }

    let errors: Vec<String> = pages
        .iter()
        .filter_map(|p| p.error.as_ref().map(|e| format!("{}: {e}", p.subject)))
        .collect();
    let warnings: Vec<String> = report
        .skipped
        .iter()
        .map(|s| format!("row {}: {}", s.row_index, s.reason))
        .collect();
    storage.save_metadata(&CollectionMetadata {
        start_time,
        end_time: Utc::now(),
        duration_seconds: t0.elapsed().as_secs_f64(),
        courses_collected: schedule.total_courses,
        success: stats.errors == 0,
        errors,
        warnings,
    })?;

    Ok(())
}

/// Parse fetched pages in parallel and fold them into one snapshot.
fn parse_pages(
    pages: &[fetch::FetchedPage],
    term_name: &str,
    term_code: &str,
    source_url: &str,
    collected_at: chrono::DateTime<Utc>,
) -> (ScheduleData, parser::report::ParseReport) {
    use rayon::prelude::*;

    let outcomes: Vec<parser::ParseOutcome> = pages
        .par_iter()
        .filter_map(|p| p.html.as_deref())
        .map(|html| parser::parse_schedule(html, term_name, term_code, source_url, collected_at))
        .collect();

    let mut courses = Vec::new();
    let mut report = parser::report::ParseReport::default();
    for out in outcomes {
        courses.extend(out.schedule.courses);
        report.merge(out.report);
    }
    (ScheduleData::new(term_name, term_code, collected_at, source_url, courses), report)
}

fn parse_file(
    cfg: &CollectorConfig,
    input: &Path,
    term: Option<String>,
    save: bool,
) -> anyhow::Result<()> {
    let term_code = term.unwrap_or_else(|| cfg.current_term.clone());
    let term_name = cfg.term_name(&term_code);
    let html = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let source = format!("file://{}", input.display());
    let out = parser::parse_schedule(&html, &term_name, &term_code, &source, Utc::now());
    println!(
        "Parsed {} courses across {} departments ({}).",
        out.schedule.total_courses,
        out.schedule.departments.len(),
        out.report.summary()
    );
    for skipped in &out.report.skipped {
        println!("  skipped row {}: {}", skipped.row_index, skipped.reason);
    }
    for anomaly in &out.report.anomalies {
        println!(
            "  anomaly at row {} ({}): {} {:?} - {}",
            anomaly.row_index,
            anomaly.crn.as_deref().unwrap_or("?"),
            anomaly.field,
            anomaly.raw,
            anomaly.note
        );
    }

    if save {
        let storage = Storage::new(&cfg.storage.data_dir, cfg.storage.compression)?;
        let path = storage.save_schedule(&out.schedule)?;
        println!("Snapshot: {}", path.display());
    }
    Ok(())
}

fn load_snapshot(cfg: &CollectorConfig, file: Option<&Path>) -> anyhow::Result<ScheduleData> {
    match file {
        Some(path) => Storage::load_schedule(path),
        None => {
            let storage = Storage::new(&cfg.storage.data_dir, cfg.storage.compression)?;
            let latest = storage
                .latest_schedule(None)?
                .context("no snapshots in the data directory, run 'collect' first")?;
            println!("Using {}", latest.display());
            Storage::load_schedule(&latest)
        }
    }
}

fn info(
    schedule: &ScheduleData,
    subject: Option<&str>,
    instructor: Option<&str>,
    crn: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    println!(
        "{} ({}) collected {}",
        schedule.term,
        schedule.term_code,
        schedule.collection_timestamp.format("%Y-%m-%d %H:%M UTC")
    );

    let rows: Vec<_> = schedule
        .courses
        .iter()
        .filter(|c| subject.is_none_or(|s| c.subject.eq_ignore_ascii_case(s)))
        .filter(|c| {
            instructor.is_none_or(|i| c.instructor.to_lowercase().contains(&i.to_lowercase()))
        })
        .filter(|c| crn.is_none_or(|n| c.crn == n))
        .collect();

    if rows.is_empty() {
        println!("No matching courses.");
        return Ok(());
    }

    println!(
        "{:>3} | {:<5} | {:<9} | {:<28} | {:>5} | {:<20} | {:<24} | {:>7}",
        "#", "CRN", "Course", "Title", "Units", "Instructor", "Meeting Times", "Seats"
    );
    println!("{}", "-".repeat(120));

    for (i, c) in rows.iter().take(limit).enumerate() {
        let course = format!("{} {}", c.subject, c.course_number);
        let times = c
            .meeting_times
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let seats = format!("{}/{}", c.enrollment.actual, c.enrollment.capacity);
        println!(
            "{:>3} | {:<5} | {:<9} | {:<28} | {:>5.2} | {:<20} | {:<24} | {:>7}",
            i + 1,
            c.crn,
            truncate(&course, 9),
            truncate(&c.title, 28),
            c.units,
            truncate(&c.instructor, 20),
            truncate(&times, 24),
            seats
        );
    }

    if rows.len() > limit {
        println!("... and {} more (raise -n to see them)", rows.len() - limit);
    }
    println!("\n{} of {} courses shown", rows.len().min(limit), schedule.total_courses);
    Ok(())
}

fn compare(before: &ScheduleData, after: &ScheduleData) -> anyhow::Result<()> {
    let d = diff::diff(before, after);
    if d.is_empty() {
        println!("No changes between snapshots.");
        return Ok(());
    }

    if !d.added.is_empty() {
        println!("Added ({}):", d.added.len());
        for s in &d.added {
            println!("  + {} {} {} - {}", s.crn, s.subject, s.course_number, s.title);
        }
    }
    if !d.removed.is_empty() {
        println!("Removed ({}):", d.removed.len());
        for s in &d.removed {
            println!("  - {} {} {} - {}", s.crn, s.subject, s.course_number, s.title);
        }
    }
    if !d.enrollment_changes.is_empty() {
        println!("Enrollment changes ({}):", d.enrollment_changes.len());
        for c in &d.enrollment_changes {
            println!(
                "  {} {}: {}/{} -> {}/{}",
                c.crn,
                truncate(&c.title, 28),
                c.before.actual,
                c.before.capacity,
                c.after.actual,
                c.after.capacity
            );
        }
    }
    for (label, changes) in [
        ("Instructor changes", &d.instructor_changes),
        ("Location changes", &d.location_changes),
        ("Meeting time changes", &d.time_changes),
    ] {
        if !changes.is_empty() {
            println!("{label} ({}):", changes.len());
            for c in changes.iter() {
                println!("  {} {}: {} -> {}", c.crn, truncate(&c.title, 28), c.before, c.after);
            }
        }
    }

    println!("\n{} changes total", d.total_changes());
    Ok(())
}

fn report(storage: &Storage, term: Option<&str>, days: i64, limit: usize) -> anyhow::Result<()> {
    let files = storage.list_schedules(term)?;
    let cutoff = Utc::now() - chrono::Duration::days(days);

    let mut snapshots = Vec::new();
    for path in &files {
        let schedule = match Storage::load_schedule(path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("skipping unreadable snapshot {}: {e}", path.display());
                continue;
            }
        };
        if schedule.collection_timestamp >= cutoff {
            snapshots.push(schedule);
        }
    }

    let Some(summary) = trend::summarize(&snapshots) else {
        println!("No snapshots in the last {days} days.");
        return Ok(());
    };

    println!("Collection report: last {days} days, {} snapshots", summary.snapshots);
    println!(
        "Courses per collection: avg {:.1}, min {}, max {}",
        summary.avg_courses, summary.min_courses, summary.max_courses
    );

    if !summary.department_appearances.is_empty() {
        println!("\nTop departments:");
        println!("{:<8} | {:>11}", "Dept", "Appearances");
        println!("{}", "-".repeat(22));
        for (dept, count) in summary.department_appearances.iter().take(limit) {
            println!("{:<8} | {:>11}", dept, count);
        }
    }

    if !summary.instructor_counts.is_empty() {
        println!("\nMost active instructors (latest snapshot):");
        for (instructor, count) in summary.instructor_counts.iter().take(limit) {
            println!("  {:<24} {} courses", truncate(instructor, 24), count);
        }
    }

    if !summary.enrollment_trends.is_empty() {
        println!("\nLargest enrollment changes:");
        for t in summary.enrollment_trends.iter().take(limit) {
            let sign = if t.change > 0 { "+" } else { "" };
            println!(
                "  {} {} {}: {} -> {} ({sign}{})",
                t.crn, t.subject, t.course_number, t.first, t.last, t.change
            );
        }
    }

    Ok(())
}

fn validate(schedule: &ScheduleData) -> anyhow::Result<()> {
    let report = audit::audit(schedule);
    if report.is_clean() {
        println!("{} courses, no problems found.", schedule.total_courses);
        return Ok(());
    }

    if !report.issues.is_empty() {
        println!("Issues ({}):", report.issues.len());
        for f in &report.issues {
            println!("  {} - {}", f.crn, f.message);
        }
    }
    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for f in &report.warnings {
            println!("  {} - {}", f.crn, f.message);
        }
    }
    println!(
        "\n{} courses, {} issues, {} warnings",
        schedule.total_courses,
        report.issues.len(),
        report.warnings.len()
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
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
