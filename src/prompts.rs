//! Prompts for LLM-based question structuring.
//!
//! Centralising every prompt here keeps a single source of truth for the
//! extraction rules and lets unit tests inspect prompts directly without a
//! live model.
//!
//! Callers can override the system prompt via
//! [`crate::config::PipelineConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for the structuring call.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a precise CSV data extractor for exam papers. Output only valid CSV rows.";

/// Build the user prompt for one page of an exam.
///
/// The prompt pins `filename` and `page` so the model echoes them back in
/// every row; `header` carries the exam heading from the first page so
/// later pages can fill `paper_title` and `year` even though the heading
/// is not printed on them.
pub fn structuring_prompt(
    page_text: &str,
    filename: &str,
    page: usize,
    header: Option<&str>,
) -> String {
    let header_block = match header {
        Some(h) if !h.trim().is_empty() => format!(
            "### EXAM HEADING (from the first page of this exam) ###\n{}\n\n",
            h.trim()
        ),
        _ => String::new(),
    };

    format!(
        r#"Convert the following exam page text into CSV rows.

### OUTPUT FORMAT ###
Each row must follow this exact structure:
question,marks,paper_title,filename,page,year

### RULES ###
1. Use the exam heading as paper_title for ALL rows.
2. Extract EVERY question on the page (including subparts a, b, c as separate rows).
3. Clean questions: remove numbering, keep only the actual question text.
4. Set marks = 5 for each question unless the page states otherwise.
5. Use filename: {filename}
6. Use page: {page}
7. Extract year from the exam date in the heading (e.g. "March 1990" -> 1990). Leave the field empty if no year is stated.
8. Put double quotes around fields that contain commas.
9. Output ONLY CSV rows (no header, no notes, no code fences).

### SAMPLE INPUT ###
M.S. DEGREE EXAMINATION, March 1990
General Surgery - Applied Basic Sciences
1. Describe the surgical anatomy of the thyroid gland.
2. Write notes on: (a) Deep palmar spaces. (b) Femoral canal.

### SAMPLE OUTPUT ###
"Describe the surgical anatomy of the thyroid gland",5,"M.S. DEGREE EXAMINATION, March 1990 - General Surgery - Applied Basic Sciences","{filename}",{page},1990
"Write notes on: Deep palmar spaces",5,"M.S. DEGREE EXAMINATION, March 1990 - General Surgery - Applied Basic Sciences","{filename}",{page},1990
"Write notes on: Femoral canal",5,"M.S. DEGREE EXAMINATION, March 1990 - General Surgery - Applied Basic Sciences","{filename}",{page},1990

{header_block}### TEXT TO CONVERT (page {page}) ###
{page_text}

### CSV OUTPUT ###
"#
    )
}

/// Take the leading lines of a first page as the exam-heading context
/// passed to later pages.
///
/// Keeps at most `max_lines` non-empty lines. The heading of the papers
/// this pipeline targets (title, subject, date) fits comfortably in the
/// first handful of lines.
pub fn header_excerpt(first_page_text: &str, max_lines: usize) -> Option<String> {
    let lines: Vec<&str> = first_page_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(max_lines)
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_pins_filename_and_page() {
        let prompt = structuring_prompt("1. Describe X.", "surgery_1990.pdf", 3, None);
        assert!(prompt.contains("Use filename: surgery_1990.pdf"));
        assert!(prompt.contains("Use page: 3"));
        assert!(prompt.contains("### TEXT TO CONVERT (page 3) ###"));
        assert!(!prompt.contains("EXAM HEADING"));
    }

    #[test]
    fn prompt_includes_header_for_later_pages() {
        let prompt = structuring_prompt(
            "(a) Pain pathway",
            "surgery_1990.pdf",
            2,
            Some("M.S. DEGREE EXAMINATION, March 1990"),
        );
        assert!(prompt.contains("### EXAM HEADING"));
        assert!(prompt.contains("March 1990"));
    }

    #[test]
    fn header_excerpt_takes_leading_nonempty_lines() {
        let text = "\n\nM.S. DEGREE EXAMINATION, March 1990\n\nGeneral Surgery\n1. Describe X.\n2. Y.\n";
        let excerpt = header_excerpt(text, 3).unwrap();
        assert_eq!(
            excerpt,
            "M.S. DEGREE EXAMINATION, March 1990\nGeneral Surgery\n1. Describe X."
        );
    }

    #[test]
    fn header_excerpt_empty_page_is_none() {
        assert!(header_excerpt("  \n \t\n", 6).is_none());
    }
}
