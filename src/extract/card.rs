//! Result-card extraction.
//!
//! A card is read in one pass into a [`CardSnapshot`] (anchor, title and info
//! rows), then parsed without touching the page again.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

use super::patterns::{looks_like_hours, looks_like_rating_line, squash_spaces, strong_phone_extract};
use super::selectors::{CARD_ANCHOR, CARD_CONTAINER, CARD_INFO_ROW, CARD_TITLE, DETAIL_NAME, DETAIL_PHOTO_IMAGES};
use crate::browser::{wait_for_any, DriverError, Locator, Node, PageHandle};
use crate::pacing::Pacer;

static LINE_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[·•]").expect("separator pattern is valid"));

/// Best-effort fields visible on a results card.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardFields {
    pub name: String,
    /// Raw href of the card anchor, not canonicalized
    pub profile_url: String,
    pub category_line: String,
    pub address_line: String,
    pub opening_hours: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardSnapshot {
    pub anchor: Option<Node>,
    pub title: Option<Node>,
    pub rows: Vec<String>,
}

pub fn card_locator() -> Locator {
    Locator::css(CARD_CONTAINER)
}

/// Anchor of the `index`-th card.
pub fn anchor_locator(index: usize) -> Locator {
    Locator::css(CARD_ANCHOR).within(&card_locator(), index)
}

/// Read the `index`-th card. A card that has vanished from the list is `Stale`.
pub fn snapshot_card(page: &dyn PageHandle, index: usize) -> Result<CardSnapshot, DriverError> {
    let card = card_locator();
    let anchor = page.query(&anchor_locator(index))?.into_iter().next();
    let title = page
        .query(&Locator::css(CARD_TITLE).within(&card, index))?
        .into_iter()
        .next();
    let rows: Vec<String> = page
        .query(&Locator::css(CARD_INFO_ROW).within(&card, index))?
        .into_iter()
        .map(|n| n.text.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if anchor.is_none() && title.is_none() && rows.is_empty() {
        return Err(DriverError::Stale(format!("card {} is no longer in the list", index)));
    }
    Ok(CardSnapshot { anchor, title, rows })
}

/// Classify a card's rows into fields.
///
/// Rating rows are dropped first. Hours are matched before anything else so
/// an "Open ⋅ Closes 11 PM" row never lands in the address. A row containing
/// a mid-dot or bullet is split into category and address; otherwise the first
/// two informative rows are taken in that order.
pub fn parse_card(snapshot: &CardSnapshot) -> CardFields {
    let mut fields = CardFields::default();

    if let Some(anchor) = &snapshot.anchor {
        fields.profile_url = anchor.get("href").to_string();
        fields.name = anchor.get("aria-label").to_string();
    }
    if fields.name.is_empty() {
        if let Some(title) = &snapshot.title {
            fields.name = title.trimmed_text().to_string();
        }
    }

    let texts: Vec<&str> = snapshot
        .rows
        .iter()
        .map(String::as_str)
        .filter(|t| !looks_like_rating_line(t))
        .collect();

    for text in &texts {
        if fields.opening_hours.is_empty() && looks_like_hours(text) {
            fields.opening_hours = squash_spaces(text);
        }
        if fields.phone.is_empty() {
            fields.phone = strong_phone_extract(text);
        }
    }

    for text in &texts {
        if !LINE_SEPARATOR.is_match(text) {
            continue;
        }
        let mut parts = LINE_SEPARATOR.splitn(text, 2).map(str::trim);
        if let (Some(category), Some(address)) = (parts.next(), parts.next()) {
            if !category.is_empty() && !address.is_empty() {
                fields.category_line = category.to_string();
                fields.address_line = address.to_string();
                break;
            }
        }
    }

    if fields.category_line.is_empty() {
        if let Some(first) = texts.first() {
            fields.category_line = first.to_string();
        }
    }
    if fields.address_line.is_empty() {
        if let Some(second) = texts.get(1) {
            fields.address_line = second.to_string();
        }
    }

    fields
}

pub fn extract_card(page: &dyn PageHandle, index: usize) -> Result<CardFields, DriverError> {
    let snapshot = snapshot_card(page, index)?;
    Ok(parse_card(&snapshot))
}

/// Click through to the card's detail pane and wait for it to render.
///
/// Returns whether the pane showed up within `wait`. A card that can no longer
/// be clicked is `Stale`.
pub fn open_card_detail(
    page: &dyn PageHandle,
    pacer: &mut Pacer,
    index: usize,
    wait: Duration,
) -> Result<bool, DriverError> {
    let anchor = anchor_locator(index);
    let card = card_locator();

    let clicked = if page.scroll_into_view(&anchor, 0)? {
        pacer.jitter(0.2, 0.45);
        page.click(&anchor, 0)?
    } else {
        page.scroll_into_view(&card, index)?;
        pacer.jitter(0.2, 0.45);
        page.click(&card, index)?
    };
    if !clicked {
        return Err(DriverError::Stale(format!("card {} could not be clicked", index)));
    }

    let ready = wait_for_any(
        page,
        pacer,
        &[Locator::xpath(DETAIL_NAME), Locator::xpath(DETAIL_PHOTO_IMAGES)],
        wait,
    );
    if ready.is_none() {
        debug!("Detail pane for card {} did not render within {:?}", index, wait);
    }
    Ok(ready.is_some())
}
