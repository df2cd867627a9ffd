//! Post-processing: optional cleanup of OCR engine text.
//!
//! Tesseract output carries a few layout artefacts that are noise to a
//! search index or a text preview:
//!
//! - a form feed (`\x0c`) after every page
//! - `\r\n` line endings on Windows builds
//! - trailing spaces and long runs of blank lines where the page had
//!   whitespace or images
//!
//! The rules here remove those without touching words. They only run when
//! [`crate::PipelineConfig::normalize_text`] is set; otherwise the engine's
//! text is returned verbatim.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so that the per-line rules see every
//! line, and form feeds go before whitespace trimming so a page break line
//! becomes an ordinary blank line.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to recognised text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF and CR → LF)
/// 2. Remove form feeds (page breaks)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Remove leading and trailing blank lines
///
/// Text with no visible characters comes back as an empty string.
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_form_feeds(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_blank_edges(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove form feeds ────────────────────────────────────────────────

fn remove_form_feeds(input: &str) -> String {
    input.replace('\x0c', "")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

// Four newlines in a row are three blank lines.
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Rule 5: Trim blank edges ─────────────────────────────────────────────────

fn trim_blank_edges(input: &str) -> String {
    input.trim_matches('\n').to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
