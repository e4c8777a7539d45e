// src/extractors/text.rs
//! Text transforms shared by the pipeline stages. Every function works on a
//! single cell or label; callers decide how an emptied result is recorded.

// --- Imports ---
use once_cell::sync::Lazy;
use regex::Regex;

// --- Regex Patterns (Lazy Static) ---
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static ISSUER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)issuer").expect("issuer regex"));

static FIRST_PARENTHETICAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*)\)").expect("parenthetical regex"));

static OPEN_PAREN_PAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s+").expect("paren regex"));
static CLOSE_PAREN_PAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\)").expect("paren regex"));

static ZEROS_PARENTHETICAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*000[^)]*)\)").expect("zeros regex"));
static IN_ZEROS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bin\s*000['s,]*\b").expect("in-zeros regex"));
static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").expect("alnum regex"));

static DOLLAR_IN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$\s*(s\s*)?in").expect("dollar-in regex"));

static LAZY_PARENTHETICAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(.*?\)").expect("lazy parenthetical regex"));
static NON_LETTER_KEEP_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z\s]").expect("non-letter regex"));
static SCALE_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(billions?|millions?|thousands?)\b").expect("scale regex"));

static FOOTNOTE_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\([0-9a-zA-Z]\)([ ,/])?)+$").expect("footnote-only regex"));
static FOOTNOTE_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\s*([0-9]|[A-Za-z])\s*\)\s*([,/&])?\s*").expect("footnote marker regex")
});
static FOOTNOTE_CAPTURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*([0-9]|[A-Za-z])\s*\)").expect("footnote capture regex"));

static UNIT_IN_PARENS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(([^)]*?\b(thousands?|millions?|billions?)\b[^)]*?)\)")
        .expect("unit-in-parens regex")
});

const SUPERSCRIPTS: [(char, char); 9] = [
    ('¹', '1'),
    ('²', '2'),
    ('³', '3'),
    ('⁴', '4'),
    ('⁵', '5'),
    ('⁶', '6'),
    ('⁷', '7'),
    ('⁸', '8'),
    ('⁹', '9'),
];

// --- Whitespace & character cleanup ---

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

/// Replaces non-breaking and zero-width spaces, then collapses whitespace.
pub fn clean_unicode(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| match c {
            '\u{00a0}' | '\u{200b}' | '\u{200c}' => ' ',
            other => other,
        })
        .collect();
    collapse_whitespace(&replaced)
}

/// `Purchased¹²` becomes `Purchased(1)(2)`.
pub fn parenthesize_superscripts(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match SUPERSCRIPTS.iter().find(|(sup, _)| *sup == c) {
            Some((_, digit)) => {
                out.push('(');
                out.push(*digit);
                out.push(')');
            }
            None => out.push(c),
        }
    }
    out
}

pub fn brackets_to_parens(text: &str) -> String {
    text.replace('[', "(").replace(']', ")")
}

/// Cells mentioning the issuer keep only their first parenthetical; with no
/// parenthetical the cell is emptied.
pub fn keep_issuer_parenthetical(text: &str) -> Option<String> {
    if !ISSUER_RE.is_match(text) {
        return Some(text.to_string());
    }
    FIRST_PARENTHETICAL_RE
        .find(text)
        .map(|m| m.as_str().to_string())
}

/// Removes padding just inside parentheses: `( 1 )` becomes `(1)`.
pub fn tighten_parens(text: &str) -> String {
    let text = OPEN_PAREN_PAD_RE.replace_all(text, "(");
    CLOSE_PAREN_PAD_RE.replace_all(&text, ")").into_owned()
}

/// `(000s)` becomes `(thousand)`, `in 000's` becomes `in thousand`.
pub fn zeros_to_thousand(text: &str) -> String {
    let text = ZEROS_PARENTHETICAL_RE.replace_all(text, |caps: &regex::Captures| {
        let inner = &caps[1];
        let compact = NON_ALNUM_RE.replace_all(inner, "");
        if compact == "000s" || compact == "000" {
            "(thousand)".to_string()
        } else {
            format!("({})", inner)
        }
    });
    IN_ZEROS_RE.replace_all(&text, "in thousand").into_owned()
}

/// `$ in thousands` becomes `dollar in thousands`.
pub fn dollar_sign_to_word(text: &str) -> String {
    DOLLAR_IN_RE.replace_all(text, "dollar in").into_owned()
}

// --- Reducers ---

/// Lexical skeleton of a cell: no parentheticals, no non-letters, no scale
/// words.
pub fn reduce(text: &str) -> String {
    let text = LAZY_PARENTHETICAL_RE.replace_all(text, "");
    let text = NON_LETTER_KEEP_SPACE_RE.replace_all(&text, "");
    let text = SCALE_WORD_RE.replace_all(&text, "");
    collapse_whitespace(&text)
}

/// Like [`reduce`], but removed pieces leave a space so neighbours stay
/// separate words.
pub fn reduce_spaced(text: &str) -> String {
    let text = LAZY_PARENTHETICAL_RE.replace_all(text, " ");
    let text = NON_LETTER_KEEP_SPACE_RE.replace_all(&text, " ");
    let text = SCALE_WORD_RE.replace_all(&text, " ");
    collapse_whitespace(&text)
}

/// Lowercase whitespace-separated words longer than two characters.
pub fn long_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

// --- Footnotes ---

/// True for empty cells and cells holding nothing but markers like `(1)` or
/// `(a), (b)`.
pub fn is_footnote_only(cell: Option<&str>) -> bool {
    match cell {
        None => true,
        Some(text) => FOOTNOTE_ONLY_RE.is_match(text.trim()),
    }
}

pub fn is_dollar_only(cell: Option<&str>) -> bool {
    match cell {
        None => true,
        Some(text) => text.trim() == "$",
    }
}

/// Removes every single-character parenthetical marker (and a trailing
/// `,`, `/` or `&`). The result may be empty.
pub fn strip_footnote_markers(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let next = FOOTNOTE_MARKER_RE.replace_all(&current, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current.trim().to_string()
}

pub fn footnote_markers(text: &str) -> Vec<String> {
    FOOTNOTE_CAPTURE_RE
        .captures_iter(text.trim())
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Lowercased label with collapsed whitespace.
pub fn lower_label(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

/// Label with footnote markers stripped, lowercased.
pub fn label_key(text: &str) -> String {
    lower_label(&strip_footnote_markers(text))
}

pub fn balanced_parens(text: &str) -> bool {
    text.matches('(').count() == text.matches(')').count()
}

// --- Units ---

/// The unit phrase of a cell: the contents of a parenthetical naming a
/// scale word, else the whole text if a scale word appears anywhere.
pub fn unit_phrase(text: &str) -> Option<String> {
    if let Some(caps) = UNIT_IN_PARENS_RE.captures(text) {
        return Some(caps[1].to_string());
    }
    if SCALE_WORD_RE.is_match(text) {
        return Some(text.to_string());
    }
    None
}

pub fn has_dollar(text: &str) -> bool {
    text.contains('$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_unicode_collapses_special_spaces() {
        assert_eq!(clean_unicode("  Total\u{00a0}\u{200b}Number \n of "), "Total Number of");
    }

    #[test]
    fn test_superscripts_become_markers() {
        assert_eq!(parenthesize_superscripts("Purchased¹²"), "Purchased(1)(2)");
    }

    #[test]
    fn test_issuer_cells_keep_parenthetical() {
        assert_eq!(
            keep_issuer_parenthetical("Issuer Purchases (in thousands)").as_deref(),
            Some("(in thousands)")
        );
        assert_eq!(keep_issuer_parenthetical("ISSUER PURCHASES"), None);
        assert_eq!(keep_issuer_parenthetical("Period").as_deref(), Some("Period"));
    }

    #[test]
    fn test_zeros_rewritten_as_thousand() {
        assert_eq!(zeros_to_thousand("Shares (000s)"), "Shares (thousand)");
        assert_eq!(zeros_to_thousand("Value (000's)"), "Value (thousand)");
        assert_eq!(zeros_to_thousand("Value (2000 plan)"), "Value (2000 plan)");
        assert_eq!(zeros_to_thousand("dollars in 000s"), "dollars in thousand");
    }

    #[test]
    fn test_dollar_sign_to_word() {
        assert_eq!(dollar_sign_to_word("($ in millions)"), "(dollar in millions)");
        assert_eq!(dollar_sign_to_word("$s in thousands"), "dollar in thousands");
        assert_eq!(dollar_sign_to_word("$ 12.50"), "$ 12.50");
    }

    #[test]
    fn test_reducers() {
        assert_eq!(
            reduce("Approximate Dollar Value (in millions) of Shares"),
            "Approximate Dollar Value of Shares"
        );
        assert_eq!(reduce("1,234"), "");
        assert_eq!(reduce_spaced("Price-Paid(1)per"), "Price Paid per");
    }

    #[test]
    fn test_footnote_helpers() {
        assert!(is_footnote_only(None));
        assert!(is_footnote_only(Some("(1)")));
        assert!(is_footnote_only(Some(" (a), (b) ")));
        assert!(!is_footnote_only(Some("(12)")));
        assert_eq!(strip_footnote_markers("April 2023 (1), (2)"), "April 2023");
        assert_eq!(strip_footnote_markers("(3)"), "");
        assert_eq!(footnote_markers("1,000 (1) (b)"), vec!["1", "b"]);
    }

    #[test]
    fn test_unit_phrase_prefers_parenthetical() {
        assert_eq!(
            unit_phrase("Maximum Value (in thousands)").as_deref(),
            Some("in thousands")
        );
        assert_eq!(
            unit_phrase("Dollars in millions").as_deref(),
            Some("Dollars in millions")
        );
        assert_eq!(unit_phrase("Average Price"), None);
    }

    #[test]
    fn test_balanced_parens() {
        assert!(balanced_parens("(a) (b)"));
        assert!(!balanced_parens("(a (b)"));
    }
}
