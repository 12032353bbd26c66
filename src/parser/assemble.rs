use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::models::{Course, Enrollment, MeetingTime};

use super::context::HeaderContext;
use super::fields::{MeetingBlock, RowFields};
use super::meetings;
use super::report::ParseReport;

static COURSE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+)\s+(\w+)\s*-").unwrap());

/// Fallback subject when neither the course header nor the subject header
/// yielded a code.
const UNKNOWN_SUBJECT: &str = "UNKNOWN";

const TITLE_SEPARATOR: &str = " - ";

/// Combine header context, extracted fields, and interpreted meeting times
/// into one immutable course record.
pub fn assemble(
    crn: String,
    ctx: &HeaderContext,
    fields: RowFields,
    row_index: usize,
    report: &mut ParseReport,
) -> Course {
    let (mut subject, course_number) = parse_course_code(ctx.course_title());
    if subject.is_empty() {
        subject = ctx.subject().unwrap_or(UNKNOWN_SUBJECT).to_string();
    }

    let title = extract_title(ctx.course_title(), &crn, row_index, report);
    let meeting_times = meetings::interpret(&fields.meeting, &fields.location);
    let delivery_method = delivery_method(&fields.location, &meeting_times);
    let additional_hours = match &fields.meeting {
        MeetingBlock::Merged(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    };

    Course {
        crn,
        subject,
        course_number,
        title,
        units: fields.units,
        instructor: fields.instructor,
        instructor_email: fields.instructor_email,
        meeting_times,
        location: fields.location,
        enrollment: Enrollment {
            capacity: fields.capacity,
            actual: fields.actual,
            remaining: fields.remaining,
        },
        status: fields.status,
        section_type: fields.section_type,
        zero_textbook_cost: fields.zero_textbook_cost,
        delivery_method,
        weeks: fields.weeks,
        start_date: fields.start_date,
        end_date: fields.end_date,
        additional_hours,
        book_link: fields.book_link,
    }
}

/// "ACCT 101 - Financial Accounting" → ("ACCT", "101"). Empty strings when
/// the header is absent or does not match.
fn parse_course_code(header: Option<&str>) -> (String, String) {
    header
        .and_then(|h| COURSE_CODE_RE.captures(h))
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .unwrap_or_default()
}

/// The portion after the first " - " separator, trimmed. A header without
/// the separator is used whole, with a logged anomaly.
fn extract_title(
    header: Option<&str>,
    crn: &str,
    row_index: usize,
    report: &mut ParseReport,
) -> String {
    let Some(header) = header else {
        return "Unknown Course".to_string();
    };
    match header.split_once(TITLE_SEPARATOR) {
        Some((_, title)) => title.trim().to_string(),
        None => {
            debug!("course header without title separator: {header:?}");
            report.anomaly(row_index, Some(crn), "title", header, "no title separator in header");
            header.to_string()
        }
    }
}

/// First match wins; the arranged check only applies when no location token
/// already decided the method.
fn delivery_method(location: &str, meeting_times: &[MeetingTime]) -> String {
    let loc = location.to_lowercase();
    let method = if loc.contains("online") && loc.contains("async") {
        "Online ASYNC"
    } else if loc.contains("online") && loc.contains("sync") {
        "Online SYNC"
    } else if loc.contains("online") {
        "Online"
    } else if loc.contains("hybrid") {
        "Hybrid"
    } else if meeting_times.iter().any(|mt| mt.is_arranged) {
        "Arranged"
    } else {
        "In-Person"
    };
    method.to_string()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fields::MeetingBlock;

    fn fields_with(location: &str, meeting: MeetingBlock) -> RowFields {
        RowFields {
            status: "Open".into(),
            section_type: "LEC".into(),
            book_link: None,
            zero_textbook_cost: false,
            units: 3.0,
            meeting,
            location: location.into(),
            capacity: 30,
            actual: 25,
            remaining: 5,
            instructor: "Smith, John".into(),
            instructor_email: None,
            start_date: None,
            end_date: None,
            weeks: 16,
        }
    }

    fn ctx(subject: Option<&str>, title: Option<&str>) -> HeaderContext {
        let mut c = HeaderContext::new();
        if let Some(s) = subject {
            c.set_subject(s);
        }
        if let Some(t) = title {
            c.set_course_title(t);
        }
        c
    }

    fn in_person_slots() -> MeetingBlock {
        MeetingBlock::Slots(
            ["", "M", "", "W", "", "", "", "9:00 AM-10:50 AM"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn header_context_applied() {
        let ctx = ctx(Some("ACCT"), Some("ACCT 100 - Introduction to Accounting"));
        let mut report = ParseReport::default();
        let c = assemble("70001".into(), &ctx, fields_with("A207", in_person_slots()), 0, &mut report);
        assert_eq!(c.subject, "ACCT");
        assert_eq!(c.course_number, "100");
        assert_eq!(c.title, "Introduction to Accounting");
        assert_eq!(c.delivery_method, "In-Person");
        assert!(report.is_clean());
    }

    #[test]
    fn unparsable_header_falls_back_to_subject_context() {
        let ctx = ctx(Some("BIOL"), Some("Marine Biology Field Studies"));
        let mut report = ParseReport::default();
        let c = assemble("70002".into(), &ctx, fields_with("A1", in_person_slots()), 3, &mut report);
        assert_eq!(c.subject, "BIOL");
        assert_eq!(c.course_number, "");
        // Header without separator becomes the whole title, with an anomaly.
        assert_eq!(c.title, "Marine Biology Field Studies");
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].field, "title");
    }

    #[test]
    fn no_context_at_all() {
        let ctx = ctx(None, None);
        let mut report = ParseReport::default();
        let c = assemble("70003".into(), &ctx, fields_with("A1", in_person_slots()), 0, &mut report);
        assert_eq!(c.subject, "UNKNOWN");
        assert_eq!(c.title, "Unknown Course");
    }

    #[test]
    fn delivery_method_matrix() {
        let arranged = vec![MeetingTime::arranged("TBA")];
        let fixed = vec![MeetingTime::scheduled("MW", "9:00am", "9:50am")];
        let cases = [
            ("Online ASYNC", &arranged, "Online ASYNC"),
            ("Online SYNC", &fixed, "Online SYNC"),
            ("Online", &arranged, "Online"),
            ("Hybrid A207", &fixed, "Hybrid"),
            ("A207", &arranged, "Arranged"),
            ("A207", &fixed, "In-Person"),
        ];
        for (location, mts, expected) in cases {
            assert_eq!(delivery_method(location, mts), expected, "location {location:?}");
        }
    }

    #[test]
    fn online_async_record() {
        let ctx = ctx(Some("CS"), Some("CS 101 - Intro to Computing"));
        let mut report = ParseReport::default();
        let empty = MeetingBlock::Slots(vec![String::new(); 8]);
        let c = assemble("70010".into(), &ctx, fields_with("Online ASYNC", empty), 0, &mut report);
        assert_eq!(c.meeting_times, vec![MeetingTime::arranged("ASYNC")]);
        assert_eq!(c.delivery_method, "Online ASYNC");
    }

    #[test]
    fn merged_block_kept_as_additional_hours() {
        let ctx = ctx(Some("ART"), Some("ART 110 - Drawing I"));
        let mut report = ParseReport::default();
        let merged = MeetingBlock::Merged("6 hours arr in addition".into());
        let c = assemble("70011".into(), &ctx, fields_with("A207", merged), 0, &mut report);
        assert_eq!(c.additional_hours.as_deref(), Some("6 hours arr in addition"));
        assert_eq!(c.meeting_times, vec![MeetingTime::arranged("TBA")]);
        assert_eq!(c.delivery_method, "Arranged");
    }
}
