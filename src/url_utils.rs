//! URL canonicalization and place identity helpers.
//!
//! Profile links copied out of the results UI carry session and tracking
//! parameters that change on every visit. Everything persisted goes through
//! [`canonicalize`], and a numeric place id (`cid`) is preferred over the
//! navigated URL whenever one can be found.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::text_normalizer::similarity_key;

/// Query keys dropped from every persisted URL (compared case-insensitively).
const TRACKING_KEYS: &[&str] = &[
    "hl", "fbclid", "gclid", "entry", "ved", "sa", "source", "authuser", "rclk",
];

/// Key prefixes dropped from every persisted URL.
const TRACKING_PREFIXES: &[&str] = &["utm_", "hsa_"];

/// Hosts that never count as a listing's own website.
static NON_WEBSITE_HOSTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:google\.[a-z.]+/|goo\.gl|maps\.app\.goo\.gl|googleusercontent\.com|ggpht\.com|youtube\.com|youtu\.be|drive\.google\.com)",
    )
    .expect("non-website pattern is valid")
});

pub const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "x.com",
    "twitter.com",
    "tiktok.com",
];

static CID_IN_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]cid=(\d+)").expect("cid pattern is valid"));

static CID_IN_SOURCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"maps\?cid=(\d{10,})").expect("cid source pattern is valid"));

static PLACE_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/maps/place/([^/?#]+)").expect("slug pattern is valid"));

static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_+]+").expect("separator pattern is valid"));

/// Make a raw href absolute https and strip tracking parameters.
///
/// Idempotent: canonicalizing an already canonical URL returns it unchanged.
pub fn canonicalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let absolute = if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{}", rest)
    } else if !trimmed.contains("://") {
        format!("https://{}", trimmed.trim_start_matches('/'))
    } else {
        trimmed.to_string()
    };

    let mut parsed = match Url::parse(&absolute) {
        Ok(u) => u,
        Err(_) => return absolute.trim_end_matches(['&', '?', ' ']).to_string(),
    };

    let kept: Option<String> = parsed.query().map(|query| {
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or_default();
                !is_tracking_key(key)
            })
            .collect::<Vec<_>>()
            .join("&")
    });

    match kept {
        Some(q) if !q.is_empty() => parsed.set_query(Some(&q)),
        _ => parsed.set_query(None),
    }

    parsed.to_string()
}

fn is_tracking_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_KEYS.contains(&key.as_str()) || TRACKING_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Numeric place id from a URL query string (`?cid=` / `&cid=`).
pub fn extract_cid_from_url(url: &str) -> Option<String> {
    CID_IN_URL.captures(url).map(|c| c[1].to_string())
}

/// Numeric place id scraped from raw page markup.
pub fn extract_cid_from_source(source: &str) -> Option<String> {
    CID_IN_SOURCE.captures(source).map(|c| c[1].to_string())
}

/// True when a `data-cid` attribute value is usable as a place id.
pub fn is_numeric_id(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Stable lookup URL for a place id.
pub fn canonical_from_id(base_url: &str, id: &str) -> String {
    format!("{}?cid={}", base_url.trim_end_matches('/'), id)
}

/// Decoded, space-separated text of a `/maps/place/<slug>/` path segment.
pub fn slug_text(url: &str) -> String {
    let Some(caps) = PLACE_SLUG.captures(url) else {
        return String::new();
    };
    let raw = &caps[1];
    let decoded = urlencoding::decode(raw)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let spaced = SLUG_SEPARATORS.replace_all(&decoded, " ");
    spaced
        .chars()
        .filter(|c| !('\u{202A}'..='\u{202E}').contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Human-readable identity taken from the place slug, keyed for comparison.
///
/// Used only as a cross-check against the extracted name.
pub fn slug_identity(url: &str) -> String {
    similarity_key(&slug_text(url))
}

/// Search results URL for `"{query} in {location}"` with a locale pair.
pub fn build_search_url(base_url: &str, query: &str, location: &str, hl: &str, gl: &str) -> String {
    let term = format!("{} in {}", query.trim(), location.trim());
    let encoded: String = url::form_urlencoded::byte_serialize(term.as_bytes()).collect();
    format!(
        "{}/search/{}?hl={}&gl={}",
        base_url.trim_end_matches('/'),
        encoded,
        hl,
        gl
    )
}

/// Lowercased host of an absolute URL.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|h| h.to_ascii_lowercase())
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// True when the URL is served from one of the accepted image hosts.
pub fn is_image_host(url: &str, hosts: &[String]) -> bool {
    let upgraded = upgrade_scheme(url);
    match host_of(&upgraded) {
        Some(host) => hosts.iter().any(|h| host_matches(&host, h)),
        None => false,
    }
}

/// True for links to social profiles on a known network.
pub fn is_social_link(url: &str) -> bool {
    match host_of(url) {
        Some(host) => SOCIAL_DOMAINS.iter().any(|d| host_matches(&host, d)),
        None => false,
    }
}

/// True when a link could be the listing's own website. Social profiles
/// are kept apart in their own column.
pub fn is_candidate_website(url: &str) -> bool {
    url.starts_with("http") && !NON_WEBSITE_HOSTS.is_match(url) && !is_social_link(url)
}

/// Upgrade protocol-relative URLs (`//host/..`) to https.
pub fn upgrade_scheme(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}
