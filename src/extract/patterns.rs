//! Text classifiers shared by the card and detail extractors.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::text_normalizer::normalize_digits;

static HOURS_VOCABULARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Open|Closed|Closes|Opens|24 hours|مفتوح|مغلق|٢٤ ساعة|24 ساعة")
        .expect("hours pattern is valid")
});

static RATING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[0-5](?:[.,]\d)?\s*(?:\([0-9,]+\)|$)").expect("rating line pattern is valid"));

static PLUS_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z0-9]{4}\+[A-Z0-9]{3,}\b").expect("plus code pattern is valid"));

/// Looser form used on address control labels, where codes may be shorter.
static PLUS_CODE_LOOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z0-9]{4}\+[A-Z0-9]{2,}").expect("loose plus code pattern is valid"));

static NON_PHONE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9+]+").expect("phone strip pattern is valid"));

static INTERNATIONAL_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+|^00)([0-9]{6,15})").expect("international phone pattern is valid"));

static LOCAL_PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b0[0-9]{7,11}\b").expect("local phone pattern is valid"));

static RATING_WITH_REVIEWS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*stars?\s*([0-9,]+)\s*Reviews?").expect("rating pattern is valid")
});

static RATING_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*stars?").expect("rating pattern is valid"));

static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("decimal pattern is valid"));

static SHORT_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,6}\b").expect("count pattern is valid"));

static LETTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z\x{0600}-\x{06FF}]").expect("letter pattern is valid"));

pub fn looks_like_hours(text: &str) -> bool {
    HOURS_VOCABULARY.is_match(text)
}

/// Card rows such as `4.5(1,234)` that only carry the rating badge.
pub fn looks_like_rating_line(text: &str) -> bool {
    !text.trim().is_empty() && RATING_LINE.is_match(text)
}

pub fn has_letters(text: &str) -> bool {
    LETTERS.is_match(text)
}

pub fn find_plus_code(text: &str) -> Option<String> {
    PLUS_CODE.find(text).map(|m| m.as_str().to_string())
}

/// Remove a plus code from free text.
pub fn strip_plus_code(text: &str) -> String {
    PLUS_CODE.replace_all(text, "").trim().to_string()
}

/// Split an address control label into (address, plus code).
pub fn split_address_label(text: &str) -> (String, String) {
    let flat = text.replace('\n', " ");
    let plus = PLUS_CODE_LOOSE
        .find(&flat)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let address = PLUS_CODE_LOOSE.replace_all(&flat, "").trim().to_string();
    (address, plus)
}

/// Pull one phone number out of noisy text.
///
/// Returns a `+`-prefixed international number when the text carries a `+`
/// prefix (or starts with `00`), else a local number of 8 to 12 digits
/// starting with `0`, else an empty string.
pub fn strong_phone_extract(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let digits = NON_PHONE_CHARS.replace_all(&normalize_digits(text), "").into_owned();
    if let Some(caps) = INTERNATIONAL_PHONE.captures(&digits) {
        return format!("+{}", &caps[1]);
    }
    LOCAL_PHONE
        .find(&digits)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Parse `<float> stars <int> reviews`, or `<float> stars` alone.
pub fn parse_rating_and_reviews(text: &str) -> (Option<f64>, Option<u32>) {
    let text = normalize_digits(text);
    if let Some(caps) = RATING_WITH_REVIEWS.captures(&text) {
        let rating = caps[1].parse::<f64>().ok();
        let reviews = caps[2].replace(',', "").parse::<u32>().ok();
        if rating.is_some() {
            return (rating, reviews);
        }
    }
    if let Some(caps) = RATING_ONLY.captures(&text) {
        return (caps[1].parse::<f64>().ok(), None);
    }
    (None, None)
}

/// First decimal number in badge text such as `4.6`.
pub fn first_decimal(text: &str) -> Option<f64> {
    DECIMAL
        .find(&normalize_digits(text))
        .and_then(|m| m.as_str().parse().ok())
}

/// First short integer after dropping thousands separators, e.g. `(1,234)`.
pub fn first_count(text: &str) -> Option<u32> {
    let cleaned = normalize_digits(&text.replace(',', ""));
    SHORT_COUNT.find(&cleaned).and_then(|m| m.as_str().parse().ok())
}

/// Collapse internal whitespace runs.
pub fn squash_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_with_reviews() {
        assert_eq!(parse_rating_and_reviews("4.5 stars 128 Reviews"), (Some(4.5), Some(128)));
        assert_eq!(parse_rating_and_reviews("4.2 stars 1,204 reviews"), (Some(4.2), Some(1204)));
    }

    #[test]
    fn test_rating_alone() {
        assert_eq!(parse_rating_and_reviews("4.5 stars"), (Some(4.5), None));
        assert_eq!(parse_rating_and_reviews("٤.٥ stars"), (Some(4.5), None));
        assert_eq!(parse_rating_and_reviews("no rating"), (None, None));
    }

    #[test]
    fn test_phone_international_preferred() {
        assert_eq!(strong_phone_extract("Phone: +20 ١٠٠ ١٢٣ ٤٥٦٧"), "+201001234567");
        assert_eq!(strong_phone_extract("tel (0020) 2-2738-0000"), "+20227380000");
    }

    #[test]
    fn test_phone_local_fallback() {
        assert_eq!(strong_phone_extract("02 2738 0000"), "0227380000");
        assert_eq!(strong_phone_extract("٠١٠-٠١٢٣-٤٥٦٧"), "01001234567");
    }

    #[test]
    fn test_local_phone_length_bounds() {
        assert_eq!(strong_phone_extract("0227 3800"), "02273800");
        assert_eq!(strong_phone_extract("0100 1234 5678"), "010012345678");
        assert_eq!(strong_phone_extract("0227 380"), "");
        assert_eq!(strong_phone_extract("0100 1234 56789"), "");
    }

    #[test]
    fn test_phone_rejects_noise() {
        assert_eq!(strong_phone_extract("Open 24 hours"), "");
        assert_eq!(strong_phone_extract("12345"), "");
        assert_eq!(strong_phone_extract(""), "");
    }

    #[test]
    fn test_hours_vocabulary() {
        assert!(looks_like_hours("Open ⋅ Closes 11 PM"));
        assert!(looks_like_hours("مفتوح ٢٤ ساعة"));
        assert!(looks_like_hours("closed now"));
        assert!(!looks_like_hours("Egyptian restaurant · 26th of July St"));
    }

    #[test]
    fn test_rating_line_detection() {
        assert!(looks_like_rating_line("4.5(1,234)"));
        assert!(looks_like_rating_line(" 4 (12)"));
        assert!(looks_like_rating_line("4.5"));
        assert!(!looks_like_rating_line("Cafe · Zamalek"));
        assert!(!looks_like_rating_line("26th of July St"));
        assert!(!looks_like_rating_line("5 Tahrir Sq"));
        assert!(!looks_like_rating_line(""));
    }

    #[test]
    fn test_plus_code_handling() {
        assert_eq!(find_plus_code("2X5R+QHV Cairo").as_deref(), Some("2X5R+QHV"));
        assert_eq!(find_plus_code("no code"), None);
        assert_eq!(strip_plus_code("2X5R+QHV Zamalek, Cairo"), "Zamalek, Cairo");
        assert_eq!(
            split_address_label("Address: 26 July St\nV8C2+4X"),
            ("Address: 26 July St".to_string(), "V8C2+4X".to_string())
        );
    }

    #[test]
    fn test_badge_fallbacks() {
        assert_eq!(first_decimal("4.6"), Some(4.6));
        assert_eq!(first_decimal("—"), None);
        assert_eq!(first_count("(1,234)"), Some(1234));
        assert_eq!(first_count("(٣٢)"), Some(32));
    }
}
