use chrono::{Local, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::extract::{CardFields, DetailFields};

/// Column order of the persisted record file.
pub const CSV_FIELDS: [&str; 16] = [
    "category",
    "query_location",
    "name",
    "category_line",
    "address_line",
    "plus_code",
    "phone",
    "website",
    "profile_url",
    "rating",
    "reviews_count",
    "opening_hours",
    "social_links",
    "photo_urls",
    "name_url_flag",
    "timestamp",
];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Separator for list-valued columns.
pub const LIST_SEPARATOR: &str = ", ";

static ADDRESS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(Address|العنوان)\s*:\s*").expect("address label pattern is valid"));

/// Outcome of comparing the extracted name with the profile URL slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameUrlFlag {
    #[default]
    Consistent,
    WeakMatch,
}

impl NameUrlFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameUrlFlag::Consistent => "",
            NameUrlFlag::WeakMatch => "weak_match",
        }
    }
}

impl fmt::Display for NameUrlFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One harvested listing. Built once per card, then persisted or dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub category: String,
    pub query_location: String,
    pub name: String,
    pub category_line: String,
    pub address_line: String,
    pub plus_code: String,
    pub phone: String,
    pub website: String,
    /// Canonical form, or empty
    pub profile_url: String,
    pub rating: Option<f64>,
    pub reviews_count: Option<u32>,
    pub opening_hours: String,
    pub social_links: Vec<String>,
    pub photo_urls: Vec<String>,
    pub name_url_flag: NameUrlFlag,
    pub timestamp: NaiveDateTime,
}

impl Place {
    /// Merge list-card and detail-pane fields. Detail values win when present.
    pub fn from_parts(
        category: &str,
        query_location: &str,
        card: CardFields,
        detail: DetailFields,
        profile_url: String,
        name_url_flag: NameUrlFlag,
    ) -> Self {
        let address = prefer(detail.address, card.address_line);
        Self {
            category: category.to_string(),
            query_location: query_location.to_string(),
            name: prefer(detail.name, card.name),
            category_line: card.category_line,
            address_line: ADDRESS_LABEL.replace(&address, "").into_owned(),
            plus_code: detail.plus_code,
            phone: prefer(detail.phone, card.phone),
            website: detail.website,
            profile_url,
            rating: detail.rating,
            reviews_count: detail.reviews_count,
            opening_hours: prefer(detail.opening_hours, card.opening_hours),
            social_links: detail.social_links,
            photo_urls: detail.photo_urls,
            name_url_flag,
            timestamp: Local::now().naive_local(),
        }
    }

    /// Row values in [`CSV_FIELDS`] order, not yet normalized.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.category.clone(),
            self.query_location.clone(),
            self.name.clone(),
            self.category_line.clone(),
            self.address_line.clone(),
            self.plus_code.clone(),
            self.phone.clone(),
            self.website.clone(),
            self.profile_url.clone(),
            self.rating.map(|r| r.to_string()).unwrap_or_default(),
            self.reviews_count.map(|c| c.to_string()).unwrap_or_default(),
            self.opening_hours.clone(),
            self.social_links.join(LIST_SEPARATOR),
            self.photo_urls.join(LIST_SEPARATOR),
            self.name_url_flag.to_string(),
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ]
    }
}

fn prefer(primary: String, fallback: String) -> String {
    if primary.trim().is_empty() {
        fallback
    } else {
        primary
    }
}
