use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static A_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static SUBJECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+)\s*-").unwrap());

/// Course-detail popup href marker. A CRN cell links to
/// `..._sched.p_course_popup?...`; stray links elsewhere never match.
const POPUP_MARKER: &str = "p_course_popup";

/// Minimum styled cells for a row to qualify as course data. Real data rows
/// carry 20+ `default1`/`default2` cells; banners and spacers far fewer.
pub const DATA_ROW_MIN_CELLS: usize = 15;

/// The CRN anchor drifts between the first few columns; scan this many cells.
pub const CRN_SCAN_CELLS: usize = 5;

/// Classification of one `<tr>` in a schedule listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    /// "ACCT - Accounting" banner; carries the subject code.
    SubjectHeader { code: String },
    /// "ACCT 101 - Financial Accounting" banner; carries the full text.
    CourseHeader { text: String },
    /// One course section.
    Data,
    /// Spacers, column headers, section banners.
    Ignorable,
}

pub fn row_selector() -> &'static Selector {
    &TR_SEL
}

/// Direct `<td>` cells of a row, in document order.
pub fn cells(row: ElementRef) -> Vec<ElementRef> {
    row.select(&TD_SEL).collect()
}

/// Cell text with entity-decoded whitespace collapsed, BeautifulSoup-style.
pub fn cell_text(cell: ElementRef) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Label one table row. Data rows need BOTH signals: a popup-style CRN link
/// in the first few cells and enough styled cells; either alone is a stray.
pub fn classify(row: ElementRef) -> RowKind {
    let tds = cells(row);

    if let Some(code) = subject_header_code(&tds) {
        return RowKind::SubjectHeader { code };
    }

    if let Some(text) = course_header_text(&tds) {
        return RowKind::CourseHeader { text };
    }

    if popup_anchor(&tds).is_some() && styled_cell_count(&tds) >= DATA_ROW_MIN_CELLS {
        return RowKind::Data;
    }

    RowKind::Ignorable
}

/// True when a popup-style link is present regardless of the cell count.
/// Lets the builder log short rows as skips instead of silently dropping them.
pub fn has_popup_link(row: ElementRef) -> bool {
    popup_anchor(&cells(row)).is_some()
}

/// CRN text from the popup anchor, scanning the first `CRN_SCAN_CELLS` cells.
pub fn popup_crn(tds: &[ElementRef]) -> Option<String> {
    popup_anchor(tds).map(cell_text)
}

fn popup_anchor<'a>(tds: &[ElementRef<'a>]) -> Option<ElementRef<'a>> {
    tds.iter().take(CRN_SCAN_CELLS).find_map(|td| {
        td.select(&A_SEL)
            .find(|a| a.value().attr("href").is_some_and(|h| h.contains(POPUP_MARKER)))
    })
}

fn subject_header_code(tds: &[ElementRef]) -> Option<String> {
    let td = tds
        .iter()
        .find(|td| has_class_containing(td, "subject_header"))?;
    let text = cell_text(*td);
    SUBJECT_RE.captures(&text).map(|c| c[1].to_string())
}

fn course_header_text(tds: &[ElementRef]) -> Option<String> {
    let td = tds.iter().find(|td| has_class_containing(td, "crn_header"))?;
    let text = cell_text(*td);
    (!text.is_empty()).then_some(text)
}

fn has_class_containing(td: &ElementRef, marker: &str) -> bool {
    td.value().classes().any(|c| c.contains(marker))
}

fn styled_cell_count(tds: &[ElementRef]) -> usize {
    tds.iter()
        .filter(|td| td.value().classes().any(|c| c == "default1" || c == "default2"))
        .count()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn classify_first(row_html: &str) -> RowKind {
        let doc = Html::parse_document(&format!("<table>{}</table>", row_html));
        let row = doc.select(row_selector()).next().unwrap();
        classify(row)
    }

    fn data_row_html(n_cells: usize, crn_cell: usize) -> String {
        let mut tds = String::new();
        for i in 0..n_cells {
            let class = 1 + i % 2;
            if i == crn_cell {
                tds.push_str(&format!(
                    r#"<td class="default{class}"><a href="/prodssb/pw_pub_sched.p_course_popup?crn=70001">70001</a></td>"#
                ));
            } else {
                tds.push_str(&format!(r#"<td class="default{class}">x</td>"#));
            }
        }
        format!("<tr>{}</tr>", tds)
    }

    #[test]
    fn subject_header() {
        let kind = classify_first(r#"<tr><td class="subject_header" colspan="22">ACCT - Accounting</td></tr>"#);
        assert_eq!(kind, RowKind::SubjectHeader { code: "ACCT".into() });
    }

    #[test]
    fn subject_header_without_pattern_is_ignorable() {
        let kind = classify_first(r#"<tr><td class="subject_header">Accounting</td></tr>"#);
        assert_eq!(kind, RowKind::Ignorable);
    }

    #[test]
    fn course_header() {
        let kind = classify_first(r#"<tr><td class="crn_header" colspan="22">ACCT 101 - Financial Accounting</td></tr>"#);
        assert_eq!(
            kind,
            RowKind::CourseHeader { text: "ACCT 101 - Financial Accounting".into() }
        );
    }

    #[test]
    fn full_data_row() {
        assert_eq!(classify_first(&data_row_html(22, 2)), RowKind::Data);
    }

    #[test]
    fn crn_anchor_position_drifts() {
        for cell in 0..CRN_SCAN_CELLS {
            assert_eq!(classify_first(&data_row_html(22, cell)), RowKind::Data);
        }
    }

    #[test]
    fn crn_anchor_beyond_scan_window_not_data() {
        assert_eq!(classify_first(&data_row_html(22, 8)), RowKind::Ignorable);
    }

    #[test]
    fn short_row_with_link_never_promoted() {
        let html = data_row_html(6, 2);
        assert_eq!(classify_first(&html), RowKind::Ignorable);

        let doc = Html::parse_document(&format!("<table>{}</table>", html));
        let row = doc.select(row_selector()).next().unwrap();
        assert!(has_popup_link(row));
    }

    #[test]
    fn styled_cells_without_link_not_data() {
        let mut tds = String::new();
        for i in 0..20 {
            tds.push_str(&format!(r#"<td class="default{}">x</td>"#, 1 + i % 2));
        }
        assert_eq!(classify_first(&format!("<tr>{}</tr>", tds)), RowKind::Ignorable);
    }

    #[test]
    fn stray_link_in_unstyled_row_not_data() {
        let kind = classify_first(
            r#"<tr><td><a href="pw_pub_sched.p_course_popup?crn=1">1</a></td><td>spacer</td></tr>"#,
        );
        assert_eq!(kind, RowKind::Ignorable);
    }

    #[test]
    fn blank_spacer_ignorable() {
        assert_eq!(classify_first("<tr><td>&nbsp;</td></tr>"), RowKind::Ignorable);
    }

    #[test]
    fn cell_text_collapses_whitespace() {
        let doc = Html::parse_document("<table><tr><td>  9:00am &nbsp; -\n 10:50am </td></tr></table>");
        let row = doc.select(row_selector()).next().unwrap();
        let tds = cells(row);
        assert_eq!(cell_text(tds[0]), "9:00am - 10:50am");
    }
}
