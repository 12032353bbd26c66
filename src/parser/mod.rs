pub mod assemble;
pub mod context;
pub mod fields;
pub mod meetings;
pub mod report;
pub mod rows;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html};
use tracing::{debug, warn};

use crate::models::{Course, ScheduleData};

use context::HeaderContext;
use report::ParseReport;
use rows::RowKind;

/// Snapshot plus per-pass diagnostics.
pub struct ParseOutcome {
    pub schedule: ScheduleData,
    pub report: ParseReport,
}

/// One linear pass over every table row of a schedule page: header rows
/// update the context, data rows become courses, anything broken is skipped
/// at row granularity. Never fails; zero recognized rows is a valid outcome.
pub fn parse_schedule(
    html: &str,
    term: &str,
    term_code: &str,
    source_url: &str,
    collected_at: DateTime<Utc>,
) -> ParseOutcome {
    let doc = Html::parse_document(html);
    let mut ctx = HeaderContext::new();
    let mut report = ParseReport::default();
    let mut courses: Vec<Course> = Vec::new();

    for (idx, row) in doc.select(rows::row_selector()).enumerate() {
        report.rows_seen += 1;
        match rows::classify(row) {
            RowKind::SubjectHeader { code } => {
                debug!("row {idx}: subject header {code}");
                ctx.set_subject(code);
            }
            RowKind::CourseHeader { text } => {
                debug!("row {idx}: course header {text:?}");
                ctx.set_course_title(text);
            }
            RowKind::Data => {
                report.data_rows += 1;
                if let Some(course) = parse_data_row(row, idx, &ctx, &mut report) {
                    courses.push(course);
                }
            }
            RowKind::Ignorable => {
                if rows::has_popup_link(row) {
                    warn!("row {idx}: section link but too few cells, skipping");
                    report.skip(idx, "section link present but row has too few cells");
                }
            }
        }
    }

    if courses.is_empty() {
        warn!("no course rows recognized for term {term_code}");
    }

    ParseOutcome {
        schedule: ScheduleData::new(term, term_code, collected_at, source_url, courses),
        report,
    }
}

/// Row-granular isolation: a row that cannot yield a course is recorded in
/// the report and the pass continues.
fn parse_data_row(
    row: ElementRef,
    idx: usize,
    ctx: &HeaderContext,
    report: &mut ParseReport,
) -> Option<Course> {
    let tds = rows::cells(row);
    let crn = match rows::popup_crn(&tds) {
        Some(crn) if !crn.is_empty() => crn,
        _ => {
            warn!("row {idx}: data row without recoverable CRN, skipping");
            report.skip(idx, "no recoverable CRN");
            return None;
        }
    };
    let fields = fields::extract(&tds, &crn, idx, report);
    Some(assemble::assemble(crn, ctx, fields, idx, report))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeetingTime;

    fn parse_fixture() -> ParseOutcome {
        let html = std::fs::read_to_string("tests/fixtures/schedule_sample.html").unwrap();
        parse_schedule(&html, "Fall 2025", "202570", "https://ssb.example.edu/schedule", Utc::now())
    }

    #[test]
    fn fixture_course_count() {
        let out = parse_fixture();
        assert_eq!(out.schedule.courses.len(), 4);
        assert_eq!(out.schedule.total_courses, 4);
    }

    #[test]
    fn fixture_departments_sorted_unique() {
        let out = parse_fixture();
        assert_eq!(out.schedule.departments, vec!["ACCT", "BIOL"]);

        let mut expected: Vec<String> =
            out.schedule.courses.iter().map(|c| c.subject.clone()).collect();
        expected.sort();
        expected.dedup();
        assert_eq!(out.schedule.departments, expected);
    }

    #[test]
    fn fixture_in_person_section() {
        let out = parse_fixture();
        let c = out.schedule.courses.iter().find(|c| c.crn == "70001").unwrap();
        assert_eq!(c.subject, "ACCT");
        assert_eq!(c.course_number, "100");
        assert_eq!(c.title, "Introduction to Accounting");
        assert_eq!(c.units, 3.0);
        assert_eq!(c.instructor, "Smith, John");
        assert_eq!(c.instructor_email.as_deref(), Some("jsmith@example.edu"));
        assert_eq!(
            c.meeting_times,
            vec![MeetingTime::scheduled("MW", "9:00 AM", "10:50 AM")]
        );
        assert_eq!(c.location, "A207");
        assert_eq!(
            (c.enrollment.capacity, c.enrollment.actual, c.enrollment.remaining),
            (30, 25, 5)
        );
        assert_eq!(c.delivery_method, "In-Person");
        assert_eq!(c.weeks, 16);
        assert_eq!(c.start_date.as_deref(), Some("01/13"));
    }

    #[test]
    fn fixture_arranged_section() {
        let out = parse_fixture();
        let c = out.schedule.courses.iter().find(|c| c.crn == "70002").unwrap();
        assert_eq!(c.meeting_times, vec![MeetingTime::arranged("ARR")]);
        assert_eq!(c.delivery_method, "Arranged");
    }

    #[test]
    fn fixture_online_async_section() {
        let out = parse_fixture();
        let c = out.schedule.courses.iter().find(|c| c.crn == "70003").unwrap();
        assert_eq!(c.subject, "BIOL");
        assert_eq!(c.meeting_times, vec![MeetingTime::arranged("ASYNC")]);
        assert_eq!(c.delivery_method, "Online ASYNC");
        // Units cell reads "invalid": degraded to zero with an anomaly.
        assert_eq!(c.units, 0.0);
        assert!(out.report.anomalies.iter().any(|a| a.field == "units"));
        assert!(c.zero_textbook_cost);
    }

    #[test]
    fn fixture_merged_meeting_section() {
        let out = parse_fixture();
        let c = out.schedule.courses.iter().find(|c| c.crn == "70004").unwrap();
        assert!(c.additional_hours.as_deref().unwrap().contains("arr in addition"));
        assert_eq!(c.delivery_method, "Online SYNC");
        assert!(c.meeting_times[0].is_arranged);
    }

    #[test]
    fn fixture_short_row_skipped() {
        let out = parse_fixture();
        assert_eq!(out.report.skipped.len(), 1);
        assert!(out.report.skipped[0].reason.contains("too few cells"));
        // Neighbors of the malformed row still parsed.
        assert!(out.schedule.courses.iter().any(|c| c.crn == "70001"));
        assert!(out.schedule.courses.iter().any(|c| c.crn == "70002"));
    }

    #[test]
    fn all_meeting_times_non_empty() {
        let out = parse_fixture();
        assert!(out.schedule.courses.iter().all(|c| !c.meeting_times.is_empty()));
    }

    #[test]
    fn idempotent_modulo_timestamp() {
        let html = std::fs::read_to_string("tests/fixtures/schedule_sample.html").unwrap();
        let a = parse_schedule(&html, "Fall 2025", "202570", "u", Utc::now());
        let b = parse_schedule(&html, "Fall 2025", "202570", "u", Utc::now());
        assert_eq!(a.schedule.courses, b.schedule.courses);
        assert_eq!(a.schedule.departments, b.schedule.departments);
    }

    #[test]
    fn empty_page_is_success() {
        let out = parse_schedule("<html><body></body></html>", "Fall 2025", "202570", "u", Utc::now());
        assert!(out.schedule.courses.is_empty());
        assert_eq!(out.schedule.total_courses, 0);
        assert!(out.schedule.departments.is_empty());
    }

    #[test]
    fn page_without_tables_is_success() {
        let out = parse_schedule("not html at all % garbage <<<", "Fall 2025", "202570", "u", Utc::now());
        assert!(out.schedule.courses.is_empty());
    }

    #[test]
    fn data_row_without_headers_falls_back() {
        let mut tds = String::new();
        for i in 0..22 {
            let class = 1 + i % 2;
            if i == 2 {
                tds.push_str(&format!(
                    r#"<td class="default{class}"><a href="p_course_popup?crn=9">90000</a></td>"#
                ));
            } else {
                tds.push_str(&format!(r#"<td class="default{class}"></td>"#));
            }
        }
        let html = format!("<table><tr>{}</tr></table>", tds);
        let out = parse_schedule(&html, "Fall 2025", "202570", "u", Utc::now());
        assert_eq!(out.schedule.courses.len(), 1);
        assert_eq!(out.schedule.courses[0].subject, "UNKNOWN");
        assert_eq!(out.schedule.courses[0].title, "Unknown Course");
    }
}
