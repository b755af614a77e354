//! Deterministic parsing of the structurer's reply into question records.
//!
//! Even well-prompted models occasionally disobey the output rules:
//! wrapping rows in ` ```csv ``` ` fences, echoing the header row,
//! emitting Windows line endings, or producing a commentary line between
//! rows. This module applies cheap, deterministic cleanup before a
//! quote-aware field split, so prompt and parser stay independently
//! testable.
//!
//! Parsing is forgiving at the field level and strict at the row level:
//! an unparseable `marks` or `year` becomes `None`, but a line that does
//! not yield exactly six fields — or has no question text or page number
//! — is dropped with a warning.

use crate::output::QuestionRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Result of parsing one model reply.
#[derive(Debug, Default)]
pub struct ParsedRows {
    /// Records parsed in reply order.
    pub records: Vec<QuestionRecord>,
    /// Non-empty lines that could not be parsed into a record.
    pub dropped: usize,
}

/// Parse a model reply into question records.
///
/// Applied rules, in order:
/// 1. Strip an outer code fence (models sometimes disobey the prompt)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Skip blank lines and an echoed header row
/// 4. Split each remaining line quote-aware into exactly six fields
pub fn parse_rows(response: &str) -> ParsedRows {
    let body = strip_code_fences(response);
    let body = body.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = ParsedRows::default();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || is_header_row(line) {
            continue;
        }

        match parse_record(line) {
            Some(record) => out.records.push(record),
            None => {
                out.dropped += 1;
                warn!("Dropping unparseable row: {}", truncate(line, 120));
            }
        }
    }

    out
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:csv)?\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Skip an echoed header row ────────────────────────────────────────

fn is_header_row(line: &str) -> bool {
    let collapsed: String = line
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '"')
        .collect();
    collapsed.eq_ignore_ascii_case("question,marks,paper_title,filename,page,year")
}

// ── Rule 4: Quote-aware field split ──────────────────────────────────────────

/// Split one CSV line into fields, honouring double quotes and `""`
/// escapes. Returns `None` when the quoting is unbalanced.
fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field).trim().to_string());
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return None;
    }
    fields.push(field.trim().to_string());
    Some(fields)
}

/// Parse one cleaned line into a record. `None` drops the line.
fn parse_record(line: &str) -> Option<QuestionRecord> {
    let fields = split_fields(line)?;
    if fields.len() != 6 {
        return None;
    }

    let question = fields[0].trim().to_string();
    if question.is_empty() {
        return None;
    }

    let page: usize = fields[4].trim().parse().ok().filter(|p| *p >= 1)?;

    Some(QuestionRecord {
        question,
        marks: parse_marks(&fields[1]),
        paper_title: fields[2].trim().to_string(),
        filename: fields[3].trim().to_string(),
        page,
        year: parse_year(&fields[5]),
    })
}

fn parse_marks(field: &str) -> Option<u32> {
    field.trim().parse().ok()
}

/// Years outside a plausible exam range are treated as absent rather than
/// poisoning the dataset with OCR noise like `19090`.
fn parse_year(field: &str) -> Option<i32> {
    field
        .trim()
        .parse()
        .ok()
        .filter(|y| (1900..=2100).contains(y))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\u{2026}", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        "\"Describe the surgical anatomy of the thyroid gland\",5,",
        "\"M.S. DEGREE EXAMINATION, March 1990\",\"surgery.pdf\",1,1990\n",
        "\"Write notes on: Deep palmar spaces\",5,",
        "\"M.S. DEGREE EXAMINATION, March 1990\",\"surgery.pdf\",1,1990\n",
        "\"Write notes on: Femoral canal\",5,",
        "\"M.S. DEGREE EXAMINATION, March 1990\",\"surgery.pdf\",1,1990\n",
    );

    #[test]
    fn parses_sample_reply_into_three_rows() {
        let parsed = parse_rows(SAMPLE);
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.dropped, 0);

        let first = &parsed.records[0];
        assert_eq!(
            first.question,
            "Describe the surgical anatomy of the thyroid gland"
        );
        assert_eq!(first.marks, Some(5));
        assert_eq!(first.paper_title, "M.S. DEGREE EXAMINATION, March 1990");
        assert_eq!(first.filename, "surgery.pdf");
        assert_eq!(first.page, 1);
        assert_eq!(first.year, Some(1990));
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = parse_rows(SAMPLE);
        let b = parse_rows(SAMPLE);
        assert_eq!(a.records, b.records);
    }

    #[test]
    fn strips_code_fences_and_header_echo() {
        let reply = "```csv\nquestion,marks,paper_title,filename,page,year\n\"Pain pathway\",5,\"Physiology\",\"phys.pdf\",2,1991\n```";
        let parsed = parse_rows(reply);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.records[0].question, "Pain pathway");
        assert_eq!(parsed.records[0].page, 2);
    }

    #[test]
    fn quoted_commas_stay_inside_fields() {
        let reply = "\"Write notes on: shock, sepsis, and burns\",10,\"Surgery Paper II\",\"s2.pdf\",3,1995";
        let parsed = parse_rows(reply);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(
            parsed.records[0].question,
            "Write notes on: shock, sepsis, and burns"
        );
        assert_eq!(parsed.records[0].marks, Some(10));
    }

    #[test]
    fn escaped_quotes_unescape() {
        let reply = r#""Define ""shock"" and classify it",5,"Surgery","s.pdf",1,2001"#;
        let parsed = parse_rows(reply);
        assert_eq!(parsed.records[0].question, r#"Define "shock" and classify it"#);
    }

    #[test]
    fn missing_marks_and_year_become_none() {
        let reply = "\"Cardiac cycle\",,\"Physiology\",\"phys.pdf\",2,";
        let parsed = parse_rows(reply);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].marks, None);
        assert_eq!(parsed.records[0].year, None);
    }

    #[test]
    fn non_numeric_marks_kept_as_none() {
        let reply = "\"Cardiac cycle\",five,\"Physiology\",\"phys.pdf\",2,1990";
        let parsed = parse_rows(reply);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].marks, None);
        assert_eq!(parsed.records[0].year, Some(1990));
    }

    #[test]
    fn implausible_year_becomes_none() {
        let reply = "\"Cardiac cycle\",5,\"Physiology\",\"phys.pdf\",2,19090";
        let parsed = parse_rows(reply);
        assert_eq!(parsed.records[0].year, None);
    }

    #[test]
    fn wrong_field_count_is_dropped() {
        let reply = "just some commentary from the model\n\"Cardiac cycle\",5,\"Physiology\",\"phys.pdf\",2,1990";
        let parsed = parse_rows(reply);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.dropped, 1);
    }

    #[test]
    fn bad_page_number_is_dropped() {
        let reply = "\"Cardiac cycle\",5,\"Physiology\",\"phys.pdf\",two,1990\n\"Pain pathway\",5,\"Physiology\",\"phys.pdf\",0,1990";
        let parsed = parse_rows(reply);
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.dropped, 2);
    }

    #[test]
    fn unbalanced_quotes_are_dropped() {
        let reply = "\"Cardiac cycle,5,\"Physiology\",\"phys.pdf\",2,1990";
        let parsed = parse_rows(reply);
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.dropped, 1);
    }

    #[test]
    fn empty_reply_yields_nothing() {
        let parsed = parse_rows("\n  \n");
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.dropped, 0);
    }
}
