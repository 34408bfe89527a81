//! Normalization: deterministic heuristic cleanup of raw OCR text.
//!
//! ## Why normalize before segmentation?
//!
//! OCR output is shaped by the page, not by the prose: hard line breaks mid
//! sentence, hyphens at line ends, page numbers and running headers embedded
//! in the text, and character-shape confusions (`l`/`1`, `o`/`0`). Repairing
//! the text's *shape* locally is cheap and deterministic, and it directly
//! determines where paragraph boundaries — and therefore chunk boundaries —
//! fall. The correction backend then only has to fix what a proof-reader
//! would, on text that already reads in paragraphs.
//!
//! ## Stage Order
//!
//! Stages run in a fixed order and the order is load-bearing: de-hyphenation
//! must precede sentence-flow merging (a trailing hyphen is a merge signal),
//! flow merging must precede paragraph detection (paragraphs are detected
//! from sentence ends), and whitespace collapse must run after everything
//! that inserts or deletes lines. Each stage is a pure `&str → String`
//! function, independently testable, and individually toggleable through
//! [`NormalizeOptions`].
//!
//! The character-confusion stage is best-effort, not correctness-preserving:
//! a legitimate token matching a confusable pattern (`1st`, a Roman-numeral
//! word alone on a line) will be altered. Disable
//! [`NormalizeOptions::ocr_confusables`] when the input is known clean.

use crate::pipeline::segment::split_sentences;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Per-stage switches for the normalization pass.
///
/// All stages default to on, matching the behaviour of a full cleanup run.
/// Tests toggle individual stages to pin down a single transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Stage 1: normalise line endings, strip form feeds.
    pub line_endings: bool,
    /// Stage 2: drop page numbers, dash rules, and `|`-separated running headers.
    pub page_artifacts: bool,
    /// Stage 3: re-join words hyphen-split across line breaks.
    pub dehyphenate: bool,
    /// Stage 4: merge hard-wrapped lines back into flowing sentences.
    pub sentence_flow: bool,
    /// Stage 5: insert blank lines at detected paragraph boundaries.
    pub paragraph_breaks: bool,
    /// Stage 6: repair capitalization and spacing around punctuation.
    pub punctuation: bool,
    /// Stage 7: context-limited character-confusion fixes (lossy).
    pub ocr_confusables: bool,
    /// Stage 8: smart quotes, dashes, and ellipses to ASCII.
    pub typography: bool,
    /// Stage 9: collapse runs of spaces and blank lines.
    pub whitespace: bool,
    /// Stage 10: split paragraphs longer than `max_sentences_per_paragraph`.
    pub split_oversized: bool,
    /// Sentence ceiling for stage 10.
    pub max_sentences_per_paragraph: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            line_endings: true,
            page_artifacts: true,
            dehyphenate: true,
            sentence_flow: true,
            paragraph_breaks: true,
            punctuation: true,
            ocr_confusables: true,
            typography: true,
            whitespace: true,
            split_oversized: true,
            max_sentences_per_paragraph: 8,
        }
    }
}

/// Apply the enabled normalization stages in their fixed order.
pub fn normalize(text: &str, opts: &NormalizeOptions) -> String {
    let mut s = text.to_string();
    if opts.line_endings {
        s = normalize_line_endings(&s);
    }
    if opts.page_artifacts {
        s = remove_page_artifacts(&s);
    }
    if opts.dehyphenate {
        s = dehyphenate(&s);
    }
    if opts.sentence_flow {
        s = merge_sentence_flow(&s);
    }
    if opts.paragraph_breaks {
        s = insert_paragraph_breaks(&s);
    }
    if opts.punctuation {
        s = repair_punctuation(&s);
    }
    if opts.ocr_confusables {
        s = fix_ocr_confusables(&s);
    }
    if opts.typography {
        s = normalize_typography(&s);
    }
    if opts.whitespace {
        s = collapse_whitespace(&s);
    }
    if opts.split_oversized {
        s = split_oversized_paragraphs(&s, opts.max_sentences_per_paragraph);
    }
    ensure_final_newline(&s)
}

// ── Stage 1: line endings and control artifacts ──────────────────────────────

fn normalize_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace(['\u{000C}', '\u{000B}'], "")
}

// ── Stage 2: page-boundary artifacts ─────────────────────────────────────────

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+\s*$").unwrap());
static RE_ROMAN_FOLIO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[ivxlcdm]+\s*$").unwrap());
static RE_DASH_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-–—_]{3,}\s*$").unwrap());
// Running header/footer: a folio token (digits or Roman numerals) on one side
// of a vertical bar, a label on the other. "xii | INTRODUCTION", "TITLE | 23".
static RE_BAR_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^\s*(?:[0-9ivxlcdm]{1,8}\s*\|.*|.*\|\s*[0-9ivxlcdm]{1,8})\s*$").unwrap()
});

fn remove_page_artifacts(input: &str) -> String {
    let s = RE_BAR_HEADER.replace_all(input, "");
    let s = RE_PAGE_NUMBER.replace_all(&s, "");
    let s = RE_ROMAN_FOLIO.replace_all(&s, "");
    RE_DASH_RULE.replace_all(&s, "").to_string()
}

// ── Stage 3: de-hyphenation ──────────────────────────────────────────────────

static RE_LINEBREAK_HYPHEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w)-\s*\n\s*(\w)").unwrap());
static RE_INLINE_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)-\s+(\w)").unwrap());

fn dehyphenate(input: &str) -> String {
    let s = RE_LINEBREAK_HYPHEN.replace_all(input, "${1}${2}");
    RE_INLINE_HYPHEN.replace_all(&s, "${1}${2}").to_string()
}

// ── Stage 4: sentence-flow merge ─────────────────────────────────────────────

/// Lines shorter than this are never merge candidates; short fragments are
/// usually headings or list items, not wrapped prose.
const MIN_MERGE_LEN: usize = 10;

static RE_HEADING_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(Chapter|Part|Section|Foreword|Introduction|Conclusion|Appendix|Index|Bibliography|Table of Contents)\b",
    )
    .unwrap()
});
static RE_TITLED_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][a-z]*\s+(Chapter|Part|Section)").unwrap());
static RE_ALL_CAPS_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2,}").unwrap());

fn looks_like_heading(line: &str) -> bool {
    RE_HEADING_KEYWORD.is_match(line)
        || RE_TITLED_HEADING.is_match(line)
        || RE_ALL_CAPS_START.is_match(line)
}

fn ends_mid_sentence(line: &str) -> bool {
    !line
        .chars()
        .next_back()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | ':' | ';' | '"' | '\''))
}

fn merge_sentence_flow(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mut merged: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let current = lines[i].trim_end();
        if current.is_empty() {
            merged.push(String::new());
            i += 1;
            continue;
        }

        if i + 1 < lines.len() {
            let next = lines[i + 1].trim();
            let should_merge = !next.is_empty()
                && current.len() > MIN_MERGE_LEN
                && ends_mid_sentence(current)
                && !looks_like_heading(next);

            if should_merge {
                let separator = if current.ends_with('-') || current.ends_with(' ') {
                    ""
                } else {
                    " "
                };
                merged.push(format!("{current}{separator}{next}"));
                i += 2;
                continue;
            }
        }

        merged.push(current.to_string());
        i += 1;
    }

    merged.join("\n")
}

// ── Stage 5: paragraph-boundary insertion ────────────────────────────────────

static RE_SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[.!?]\s*["']?$"#).unwrap());
static RE_STARTS_CAP_OR_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]").unwrap());

fn insert_paragraph_breaks(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();

    for raw in input.split('\n') {
        let line = raw.trim();
        if line.is_empty() {
            out.push(String::new());
            continue;
        }

        let mut should_break = false;

        if let Some(prev) = out.last() {
            if !prev.is_empty()
                && RE_SENTENCE_END.is_match(prev)
                && RE_STARTS_CAP_OR_DIGIT.is_match(line)
            {
                should_break = true;
            }
        }

        if RE_HEADING_KEYWORD.is_match(line) {
            should_break = true;
        }

        if should_break && out.last().is_some_and(|l| !l.is_empty()) {
            out.push(String::new());
        }

        out.push(line.to_string());
    }

    out.join("\n")
}

// ── Stage 6: punctuation and capitalization repair ───────────────────────────

static RE_CAP_AFTER_TERMINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?]\s+)([a-z])").unwrap());
static RE_CAP_PARAGRAPH_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\n\n)([a-z])").unwrap());
static RE_SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([.!?,:;])").unwrap());
static RE_MISSING_SPACE_AFTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])([A-Z])").unwrap());

fn repair_punctuation(input: &str) -> String {
    let s = RE_CAP_AFTER_TERMINAL.replace_all(input, |caps: &Captures<'_>| {
        format!("{}{}", &caps[1], caps[2].to_uppercase())
    });
    let s = RE_CAP_PARAGRAPH_START.replace_all(&s, |caps: &Captures<'_>| {
        format!("{}{}", &caps[1], caps[2].to_uppercase())
    });
    let s = RE_SPACE_BEFORE_PUNCT.replace_all(&s, "${1}");
    RE_MISSING_SPACE_AFTER
        .replace_all(&s, "${1} ${2}")
        .to_string()
}

// ── Stage 7: character-confusion fixes (lossy) ───────────────────────────────
//
// Two layers, applied in order:
//   1. A closed word list for common OCR misreads ("tl1e" → "the") and
//      split words ("t he" → "the"). Word fixes run first so a known word
//      is not half-repaired by the character rules below.
//   2. Context-limited character substitutions: `0`/`1` adjacent to
//      lowercase letters become `o`/`l`. Never applied globally.

static WORD_FIXES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // l/1 misreads of function words
        ("tl1e", "the"),
        ("tl1at", "that"),
        ("tl1is", "this"),
        ("tl1ey", "they"),
        ("tl1ere", "there"),
        ("wl1ich", "which"),
        ("witl1", "with"),
        ("wl1en", "when"),
        ("wl1ere", "where"),
        ("wl1at", "what"),
        ("wl1o", "who"),
        ("wl1y", "why"),
        // i/1 misreads
        ("qu1ck", "quick"),
        ("l1ke", "like"),
        ("t1me", "time"),
        // o/0 misreads
        ("0f", "of"),
        ("t0", "to"),
        // words broken by a stray space
        ("o f", "of"),
        ("t o", "to"),
        ("i n", "in"),
        ("a nd", "and"),
        ("t he", "the"),
        ("i s", "is"),
        ("a re", "are"),
        ("w as", "was"),
        ("w ere", "were"),
    ]
    .into_iter()
    .map(|(pat, rep)| {
        let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(pat))).unwrap();
        (re, rep)
    })
    .collect()
});

static RE_STANDALONE_RN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\brn\b").unwrap());
static RE_ZERO_WORD_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b0([a-z])").unwrap());
static RE_ONE_WORD_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b1([a-z])").unwrap());
static RE_ZERO_BETWEEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z])0([a-z])").unwrap());
static RE_ONE_BETWEEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z])1([a-z])").unwrap());

/// Apply `replacement` with the matched text's leading-case preserved.
fn match_case(matched: &str, replacement: &str) -> String {
    if matched.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}

fn fix_ocr_confusables(input: &str) -> String {
    let mut s = input.to_string();

    for (re, replacement) in WORD_FIXES.iter() {
        s = re
            .replace_all(&s, |caps: &Captures<'_>| match_case(&caps[0], replacement))
            .to_string();
    }

    let s = RE_STANDALONE_RN.replace_all(&s, "m");
    let s = RE_ZERO_WORD_START.replace_all(&s, "o${1}");
    let s = RE_ONE_WORD_START.replace_all(&s, "l${1}");
    let s = RE_ZERO_BETWEEN.replace_all(&s, "${1}o${2}");
    RE_ONE_BETWEEN.replace_all(&s, "${1}l${2}").to_string()
}

// ── Stage 8: typography normalization ────────────────────────────────────────

fn normalize_typography(input: &str) -> String {
    input
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{2013}', "-")
        .replace('\u{2014}', "--")
        .replace('\u{2026}', "...")
}

// ── Stage 9: whitespace collapse ─────────────────────────────────────────────

static RE_MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());
static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*\n+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    let s = RE_MULTI_SPACE.replace_all(input, " ");
    let s = s
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    RE_BLANK_RUN.replace_all(&s, "\n\n").to_string()
}

// ── Stage 10: oversized-paragraph split ──────────────────────────────────────

/// Split any paragraph with more than `max_sentences` sentences into
/// consecutive sub-paragraphs of at most `max_sentences` each.
///
/// Public because the split can alternatively run at final assembly instead
/// of during normalization; see
/// [`crate::config::ParagraphSplitStage`].
pub fn split_oversized_paragraphs(text: &str, max_sentences: usize) -> String {
    if max_sentences == 0 {
        return text.to_string();
    }

    let mut out: Vec<String> = Vec::new();
    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let sentences = split_sentences(paragraph);
        if sentences.len() <= max_sentences {
            out.push(paragraph.to_string());
        } else {
            for group in sentences.chunks(max_sentences) {
                out.push(group.join(" "));
            }
        }
    }
    out.join("\n\n")
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings_normalised() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\u{000C}d"), "a\nb\ncd");
    }

    #[test]
    fn page_numbers_and_folios_removed() {
        let input = "end of page.\n42\nxvii\nnext page starts.";
        let out = remove_page_artifacts(input);
        assert!(!out.contains("42"));
        assert!(!out.contains("xvii"));
        assert!(out.contains("end of page."));
        assert!(out.contains("next page starts."));
    }

    #[test]
    fn dash_rules_removed() {
        let out = remove_page_artifacts("above\n--------\nbelow");
        assert!(!out.contains("--------"));
        assert!(out.contains("above"));
        assert!(out.contains("below"));
    }

    #[test]
    fn bar_headers_removed_both_sides() {
        let input = "xii | INNER SPACE\nreal text continues here.\nTHE JOURNEY | 23";
        let out = remove_page_artifacts(input);
        assert!(!out.contains("INNER SPACE"));
        assert!(!out.contains("JOURNEY"));
        assert!(out.contains("real text continues here."));
    }

    #[test]
    fn hyphen_linebreak_joined() {
        assert_eq!(dehyphenate("beauti-\nful morning"), "beautiful morning");
    }

    #[test]
    fn hyphen_same_line_joined() {
        assert_eq!(dehyphenate("beauti- ful"), "beautiful");
    }

    #[test]
    fn intact_hyphenated_word_preserved() {
        assert_eq!(dehyphenate("well-known fact"), "well-known fact");
    }

    #[test]
    fn wrapped_sentence_merged() {
        let input = "the quick brown fox jumped\nover the lazy dog.";
        assert_eq!(
            merge_sentence_flow(input),
            "the quick brown fox jumped over the lazy dog."
        );
    }

    #[test]
    fn completed_sentence_not_merged() {
        let input = "This sentence is done.\nAnother one follows.";
        assert_eq!(merge_sentence_flow(input), input);
    }

    #[test]
    fn heading_line_not_absorbed() {
        let input = "some unfinished line of prose\nCHAPTER TWO";
        assert_eq!(merge_sentence_flow(input), input);

        let input = "some unfinished line of prose\nChapter 2";
        assert_eq!(merge_sentence_flow(input), input);
    }

    #[test]
    fn short_fragment_not_merged() {
        let input = "Contents\nmore text after";
        assert_eq!(merge_sentence_flow(input), input);
    }

    #[test]
    fn paragraph_break_after_sentence_end() {
        let input = "The first thought ends here.\nA new thought begins now.";
        let out = insert_paragraph_breaks(input);
        assert_eq!(
            out,
            "The first thought ends here.\n\nA new thought begins now."
        );
    }

    #[test]
    fn no_break_mid_sentence() {
        let input = "the line wraps without\npunctuation at the end";
        assert_eq!(insert_paragraph_breaks(input), input);
    }

    #[test]
    fn heading_keyword_gets_break() {
        let input = "previous paragraph text\nChapter 3 The Descent";
        let out = insert_paragraph_breaks(input);
        assert_eq!(out, "previous paragraph text\n\nChapter 3 The Descent");
    }

    #[test]
    fn capitalization_repaired() {
        let out = repair_punctuation("it was late. the moon rose.");
        assert_eq!(out, "It was late. The moon rose.");
    }

    #[test]
    fn spacing_around_punctuation_repaired() {
        let out = repair_punctuation("Hello , world .Next sentence.");
        assert_eq!(out, "Hello, world. Next sentence.");
    }

    #[test]
    fn confusables_spec_fixture() {
        assert_eq!(fix_ocr_confusables("tl1e qu1ck brown f0x"), "the quick brown fox");
    }

    #[test]
    fn confusables_preserve_leading_case() {
        assert_eq!(fix_ocr_confusables("Tl1e end"), "The end");
    }

    #[test]
    fn split_words_rejoined() {
        assert_eq!(
            fix_ocr_confusables("t he cat a nd t he dog"),
            "the cat and the dog"
        );
    }

    #[test]
    fn zero_between_letters_fixed_but_numbers_kept() {
        let out = fix_ocr_confusables("r0ck and roll in 1901");
        assert_eq!(out, "rock and roll in 1901");
    }

    #[test]
    fn typography_to_ascii() {
        assert_eq!(
            normalize_typography("\u{201C}why\u{201D} \u{2018}no\u{2019} \u{2013} yes \u{2014} ok\u{2026}"),
            "\"why\" 'no' - yes -- ok..."
        );
    }

    #[test]
    fn whitespace_collapsed() {
        let out = collapse_whitespace("too   many    spaces\n\n\n\n\nnext");
        assert_eq!(out, "too many spaces\n\nnext");
    }

    #[test]
    fn trailing_line_whitespace_trimmed() {
        assert_eq!(collapse_whitespace("line one   \nline two  "), "line one\nline two");
    }

    #[test]
    fn oversized_paragraph_split_at_ceiling() {
        let paragraph = "One. Two. Three. Four. Five.";
        let out = split_oversized_paragraphs(paragraph, 2);
        assert_eq!(out, "One. Two.\n\nThree. Four.\n\nFive.");
    }

    #[test]
    fn small_paragraph_untouched_by_split() {
        let text = "One. Two.\n\nThree.";
        assert_eq!(split_oversized_paragraphs(text, 8), text);
    }

    #[test]
    fn stage_toggles_respected() {
        let opts = NormalizeOptions {
            ocr_confusables: false,
            ..NormalizeOptions::default()
        };
        let out = normalize("tl1e word stays broken here today.", &opts);
        assert!(out.contains("tl1e"), "got: {out}");

        let out = normalize("tl1e word gets repaired here today.", &NormalizeOptions::default());
        assert!(out.contains("The word"), "got: {out}");
    }

    #[test]
    fn full_pipeline_fixture() {
        let input = "It was a dark and stormy night. tl1e rain\nfell in torrents.\n17\nexcept at occasional intervals , when it was\nchecked by a violent gust of wind.\n";
        let out = normalize(input, &NormalizeOptions::default());

        // Page number gone, confusable fixed, wraps merged, spacing repaired.
        assert!(!out.contains("\n17\n"));
        assert!(out.contains("The rain fell in torrents."));
        assert!(out.contains("intervals, when"));
        assert!(out.ends_with('\n'));
        assert!(!out.contains("\n\n\n"));
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize("", &NormalizeOptions::default()), "");
        assert_eq!(normalize("  \n \n ", &NormalizeOptions::default()), "");
    }

    #[test]
    fn normalize_is_deterministic() {
        let input = "s0me noisy   text.\nwith wraps and\nbreaks everywhere.";
        let opts = NormalizeOptions::default();
        assert_eq!(normalize(input, &opts), normalize(input, &opts));
    }
}
