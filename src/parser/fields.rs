use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::report::ParseReport;
use super::rows;

static A_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static DATE_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}/\d{2})\s*-\s*(\d{2}/\d{2})").unwrap());

/// Logical column layout of a data row. Meaning is positional on this page;
/// layout drift is absorbed here, not in extraction logic.
pub mod col {
    pub const STATUS: usize = 0;
    pub const SECTION_TYPE: usize = 1;
    pub const BOOK_LINK: usize = 3;
    pub const ZERO_COST: usize = 4;
    pub const UNITS: usize = 5;
    pub const MEETING_START: usize = 6;
    pub const MEETING_LEN: usize = 8;
    pub const LOCATION: usize = 14;
    pub const CAPACITY: usize = 15;
    pub const ACTUAL: usize = 16;
    pub const REMAINING: usize = 17;
    pub const INSTRUCTOR: usize = 18;
    pub const EMAIL: usize = 19;
    pub const DATES: usize = 20;
    pub const WEEKS: usize = 21;
}

/// Marker in the zero-textbook-cost badge image source.
const ZTC_MARKER: &str = "ZeroCostTextbook";

pub const DEFAULT_WEEKS: u32 = 16;

/// The 8-cell meeting-time block, either cell-per-slot or merged free text
/// (a colspan layout used for "arr in addition to" annotations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingBlock {
    Merged(String),
    Slots(Vec<String>),
}

/// Everything one data row yields, before header context is applied.
#[derive(Debug, Clone)]
pub struct RowFields {
    pub status: String,
    pub section_type: String,
    pub book_link: Option<String>,
    pub zero_textbook_cost: bool,
    pub units: f64,
    pub meeting: MeetingBlock,
    pub location: String,
    pub capacity: u32,
    pub actual: u32,
    pub remaining: u32,
    pub instructor: String,
    pub instructor_email: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub weeks: u32,
}

/// Map a data row's cells onto the logical layout. Every access is
/// bounds-checked: a column beyond the row's cell count reads as empty, and
/// unconvertible numerics degrade to zero with a recorded anomaly.
pub fn extract(
    tds: &[ElementRef],
    crn: &str,
    row_index: usize,
    report: &mut ParseReport,
) -> RowFields {
    let crn = Some(crn);

    let section_type = non_empty_or(text_at(tds, col::SECTION_TYPE), "LEC");
    let instructor = non_empty_or(text_at(tds, col::INSTRUCTOR), "TBA");

    let units_raw = text_at(tds, col::UNITS);
    let units = parse_units(&units_raw).unwrap_or_else(|| {
        if !units_raw.is_empty() {
            report.anomaly(row_index, crn, "units", &units_raw, "not numeric, defaulted to 0.0");
        }
        0.0
    });

    let mut count_field = |idx: usize, field: &'static str| -> u32 {
        let raw = text_at(tds, idx);
        parse_count(&raw).unwrap_or_else(|| {
            if !raw.is_empty() {
                report.anomaly(row_index, crn, field, &raw, "not numeric, defaulted to 0");
            }
            0
        })
    };
    let capacity = count_field(col::CAPACITY, "capacity");
    let actual = count_field(col::ACTUAL, "actual");
    let remaining = count_field(col::REMAINING, "remaining");

    let weeks_raw = text_at(tds, col::WEEKS);
    let weeks = match parse_count(&weeks_raw) {
        Some(w) if w > 0 => w,
        _ => {
            if !weeks_raw.is_empty() {
                report.anomaly(row_index, crn, "weeks", &weeks_raw, "unreadable, defaulted");
            }
            DEFAULT_WEEKS
        }
    };

    let dates_raw = text_at(tds, col::DATES);
    let (start_date, end_date) = match DATE_RANGE_RE.captures(&dates_raw) {
        Some(c) => (Some(c[1].to_string()), Some(c[2].to_string())),
        None => {
            if !dates_raw.is_empty() {
                report.anomaly(row_index, crn, "dates", &dates_raw, "no MM/DD - MM/DD range");
            }
            (None, None)
        }
    };

    RowFields {
        status: text_at(tds, col::STATUS),
        section_type,
        book_link: book_link(tds),
        zero_textbook_cost: zero_cost_badge(tds),
        units,
        meeting: meeting_block(tds),
        location: text_at(tds, col::LOCATION),
        capacity,
        actual,
        remaining,
        instructor,
        instructor_email: email(tds),
        start_date,
        end_date,
        weeks,
    }
}

fn text_at(tds: &[ElementRef], idx: usize) -> String {
    tds.get(idx).map(|td| rows::cell_text(*td)).unwrap_or_default()
}

fn non_empty_or(text: String, default: &str) -> String {
    if text.is_empty() { default.to_string() } else { text }
}

fn meeting_block(tds: &[ElementRef]) -> MeetingBlock {
    match tds.get(col::MEETING_START) {
        Some(td) if spans_columns(td) => MeetingBlock::Merged(rows::cell_text(*td)),
        Some(_) => {
            let end = (col::MEETING_START + col::MEETING_LEN).min(tds.len());
            MeetingBlock::Slots((col::MEETING_START..end).map(|i| text_at(tds, i)).collect())
        }
        None => MeetingBlock::Slots(Vec::new()),
    }
}

fn spans_columns(td: &ElementRef) -> bool {
    match td.value().attr("colspan") {
        Some(v) => v.trim().parse::<u32>().map_or(true, |n| n > 1),
        None => false,
    }
}

fn book_link(tds: &[ElementRef]) -> Option<String> {
    let td = tds.get(col::BOOK_LINK)?;
    td.select(&A_SEL)
        .find_map(|a| a.value().attr("href"))
        .map(str::to_string)
}

fn zero_cost_badge(tds: &[ElementRef]) -> bool {
    tds.get(col::ZERO_COST).is_some_and(|td| {
        td.select(&IMG_SEL)
            .any(|img| img.value().attr("src").is_some_and(|s| s.contains(ZTC_MARKER)))
    })
}

fn email(tds: &[ElementRef]) -> Option<String> {
    let td = tds.get(col::EMAIL)?;
    td.select(&A_SEL)
        .find_map(|a| a.value().attr("href"))
        .and_then(|h| h.strip_prefix("mailto:"))
        .map(str::to_string)
}

/// Units text stripped to digits and decimal point, e.g. "3.00 units" → 3.0.
pub fn parse_units(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Seat/week counts stripped to digits, e.g. "30*" → 30.
pub fn parse_count(text: &str) -> Option<u32> {
    let cleaned: String = text.chars().filter(char::is_ascii_digit).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    /// A 22-cell data row, with selected cell bodies overridden.
    fn row_html(overrides: &[(usize, &str)]) -> String {
        let mut cells: Vec<String> = vec![
            "Open".into(),                                                       // 0 status
            "LEC".into(),                                                        // 1 type
            r#"<a href="pw_pub_sched.p_course_popup?crn=70001">70001</a>"#.into(), // 2 crn
            r#"<a href="https://bookstore.example.edu/crn/70001">Books</a>"#.into(), // 3
            String::new(),                                                       // 4 ztc
            "3.00".into(),                                                       // 5 units
            String::new(),                                                       // 6
            "M".into(),                                                          // 7
            String::new(),                                                       // 8
            "W".into(),                                                          // 9
            String::new(),                                                       // 10
            String::new(),                                                       // 11
            String::new(),                                                       // 12
            "9:00am - 10:50am".into(),                                           // 13
            "A207".into(),                                                       // 14 location
            "30".into(),                                                         // 15 cap
            "25".into(),                                                         // 16 act
            "5".into(),                                                          // 17 rem
            "Smith, John".into(),                                                // 18
            r#"<a href="mailto:jsmith@example.edu">Smith, John</a>"#.into(),     // 19
            "01/13 - 05/23".into(),                                              // 20
            "16".into(),                                                         // 21
        ];
        for (idx, body) in overrides {
            cells[*idx] = (*body).to_string();
        }
        let tds: String = cells
            .iter()
            .enumerate()
            .map(|(i, body)| format!(r#"<td class="default{}">{}</td>"#, 1 + i % 2, body))
            .collect();
        format!("<table><tr>{}</tr></table>", tds)
    }

    fn extract_from(html: &str) -> (RowFields, ParseReport) {
        let doc = Html::parse_document(html);
        let row = doc.select(rows::row_selector()).next().unwrap();
        let tds = rows::cells(row);
        let mut report = ParseReport::default();
        let fields = extract(&tds, "70001", 0, &mut report);
        (fields, report)
    }

    #[test]
    fn well_formed_row() {
        let (f, report) = extract_from(&row_html(&[]));
        assert_eq!(f.status, "Open");
        assert_eq!(f.section_type, "LEC");
        assert_eq!(f.units, 3.0);
        assert_eq!(f.location, "A207");
        assert_eq!((f.capacity, f.actual, f.remaining), (30, 25, 5));
        assert_eq!(f.instructor, "Smith, John");
        assert_eq!(f.instructor_email.as_deref(), Some("jsmith@example.edu"));
        assert_eq!(f.start_date.as_deref(), Some("01/13"));
        assert_eq!(f.end_date.as_deref(), Some("05/23"));
        assert_eq!(f.weeks, 16);
        assert_eq!(f.book_link.as_deref(), Some("https://bookstore.example.edu/crn/70001"));
        assert!(!f.zero_textbook_cost);
        assert_eq!(
            f.meeting,
            MeetingBlock::Slots(vec![
                "".into(), "M".into(), "".into(), "W".into(),
                "".into(), "".into(), "".into(), "9:00am - 10:50am".into(),
            ])
        );
        assert!(report.is_clean());
    }

    #[test]
    fn invalid_units_defaults_with_anomaly() {
        let (f, report) = extract_from(&row_html(&[(col::UNITS, "invalid")]));
        assert_eq!(f.units, 0.0);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].field, "units");
        assert_eq!(report.anomalies[0].crn.as_deref(), Some("70001"));
    }

    #[test]
    fn empty_numeric_cells_default_silently() {
        let (f, report) = extract_from(&row_html(&[
            (col::UNITS, ""),
            (col::CAPACITY, ""),
            (col::DATES, ""),
        ]));
        assert_eq!(f.units, 0.0);
        assert_eq!(f.capacity, 0);
        assert!(f.start_date.is_none());
        assert!(report.is_clean());
    }

    #[test]
    fn decorated_counts_strip_to_digits() {
        let (f, report) = extract_from(&row_html(&[(col::CAPACITY, "30*"), (col::ACTUAL, " 25 ")]));
        assert_eq!(f.capacity, 30);
        assert_eq!(f.actual, 25);
        assert!(report.is_clean());
    }

    #[test]
    fn zero_weeks_defaults() {
        let (f, _) = extract_from(&row_html(&[(col::WEEKS, "0")]));
        assert_eq!(f.weeks, DEFAULT_WEEKS);
    }

    #[test]
    fn truncated_row_degrades_to_defaults() {
        // Only the first 14 cells survive; everything past bounds reads empty.
        let full = row_html(&[]);
        let cut = full.find(r#"<td class="default1">A207"#).unwrap();
        let html = format!("{}</tr></table>", &full[..cut]);
        let (f, _) = extract_from(&html);
        assert_eq!(f.location, "");
        assert_eq!((f.capacity, f.actual, f.remaining), (0, 0, 0));
        assert_eq!(f.instructor, "TBA");
        assert!(f.instructor_email.is_none());
        assert_eq!(f.weeks, DEFAULT_WEEKS);
    }

    #[test]
    fn merged_meeting_cell() {
        let (f, _) = extract_from(&row_html(&[(
            col::MEETING_START,
            // colspan markup cannot be injected via cell body, so exercise
            // spans_columns directly below; here the slot path still applies.
            "Arr",
        )]));
        assert!(matches!(f.meeting, MeetingBlock::Slots(_)));

        let html = r#"<table><tr>
            <td class="default1">Open</td><td class="default2">LEC</td>
            <td class="default1"><a href="p_course_popup?crn=1">1</a></td>
            <td class="default2"></td><td class="default1"></td><td class="default2">1.00</td>
            <td class="default1" colspan="8">2.5 hours arr in addition to scheduled</td>
            <td class="default2">Online ASYNC</td>
        </tr></table>"#;
        let doc = Html::parse_document(html);
        let row = doc.select(rows::row_selector()).next().unwrap();
        let tds = rows::cells(row);
        let mut report = ParseReport::default();
        let f = extract(&tds, "1", 0, &mut report);
        assert_eq!(
            f.meeting,
            MeetingBlock::Merged("2.5 hours arr in addition to scheduled".into())
        );
    }

    #[test]
    fn zero_cost_badge_detected() {
        let (f, _) = extract_from(&row_html(&[(
            col::ZERO_COST,
            r#"<img src="/images/ZeroCostTextbook.png" alt="ZTC">"#,
        )]));
        assert!(f.zero_textbook_cost);
    }
}
