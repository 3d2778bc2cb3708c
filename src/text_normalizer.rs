//! Place Name and Text Normalization
//!
//! Listing text arrives in mixed scripts and forms:
//! - Compatibility glyphs and presentation forms (NFKC folds them)
//! - Arabic-Indic and Extended Arabic-Indic digits
//! - No-break and narrow no-break spaces
//! - Diacritics and generic category nouns ("cafe", "مطعم") around the real name
//!
//! Two name keys are produced with deliberately different strengths.
//! `similarity_key` is aggressive and feeds deduplication; `compare_key`
//! only lowercases and drops the branch qualifier, and feeds the
//! name/URL consistency check.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Generic nouns that carry no identity ("Cafe Riche" and "Riche" are the same place).
static CATEGORY_NOUNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(cafe|caf[eé]|restaurant|restaurante|مطعم|كوفي|coffee|coffeeshop|resto)\b")
        .expect("category noun pattern is valid")
});

static BRANCH_QUALIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(branch|فرع)\b").expect("branch pattern is valid"));

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("non-word pattern is valid"));

/// Map localized digit glyphs to ASCII digits.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            other => other,
        })
        .collect()
}

/// Full text cleanup: NFKC, ASCII digits, single spaces, trimmed.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfkc().collect();
    normalize_whitespace(&normalize_digits(&composed))
}

/// Light cleanup applied to every persisted field: NFKC, no-break spaces
/// turned into plain spaces, trimmed. Digits and inner spacing are kept.
pub fn normalize_field(text: &str) -> String {
    let composed: String = text.nfkc().collect();
    composed
        .replace(['\u{00A0}', '\u{202F}'], " ")
        .trim()
        .to_string()
}

/// Aggressive key used for dedup and slug comparison.
pub fn similarity_key(name: &str) -> String {
    let composed: String = name.nfkc().collect();
    let lowered = strip_diacritics(&composed).to_lowercase();
    let without_nouns = CATEGORY_NOUNS.replace_all(&lowered, "");
    let without_punct = NON_WORD.replace_all(&without_nouns, " ");
    normalize_whitespace(&without_punct)
}

/// Lighter key for name/URL consistency checks.
pub fn compare_key(name: &str) -> String {
    let composed: String = name.nfkc().collect();
    let lowered = normalize_whitespace(&composed).to_lowercase();
    normalize_whitespace(&BRANCH_QUALIFIER.replace_all(&lowered, ""))
}

/// Normalized edit similarity in [0, 1]; two empty strings are not similar.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    strsim::normalized_levenshtein(a, b)
}

/// Locality key used next to the name key in the dedup ledger.
pub fn locality_key(locality: &str) -> String {
    normalize_whitespace(locality).to_lowercase()
}

fn strip_diacritics(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}

/// Collapse any run of whitespace (including no-break variants) into one space.
fn normalize_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{00A0}' || c == '\u{202F}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
