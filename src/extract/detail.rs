//! Detail-pane extraction.

use std::time::Duration;
use tracing::debug;

use super::patterns::{
    find_plus_code, first_count, first_decimal, has_letters, looks_like_hours, parse_rating_and_reviews,
    split_address_label, strip_plus_code, strong_phone_extract,
};
use super::photos::collect_photos;
use super::selectors::*;
use super::{first_hit, non_empty, ExtractContext, Strategy};
use crate::browser::{wait_for_any, DriverError, Locator, PageHandle};
use crate::url_utils::{
    canonical_from_id, canonicalize, extract_cid_from_source, extract_cid_from_url, is_candidate_website,
    is_numeric_id, is_social_link,
};

/// How long the star rating gets to render after the pane opens.
const RATING_WAIT: Duration = Duration::from_secs(8);

/// Fields read from an open detail pane. Empty means not found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailFields {
    pub name: String,
    pub rating: Option<f64>,
    pub reviews_count: Option<u32>,
    pub opening_hours: String,
    pub address: String,
    pub plus_code: String,
    pub phone: String,
    pub website: String,
    pub social_links: Vec<String>,
    pub photo_urls: Vec<String>,
}

/// Stable identity of the listing currently shown in the detail pane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileRef {
    pub url: String,
    /// Numeric place id, when one was found
    pub id: Option<String>,
}

type Rated = (f64, Option<u32>);

fn first_node_text(page: &dyn PageHandle, xpath: &str) -> Result<Option<String>, DriverError> {
    Ok(page
        .query(&Locator::xpath(xpath))?
        .first()
        .and_then(|n| non_empty(n.text.clone())))
}

// name

fn name_from_heading(ctx: &mut ExtractContext<'_>) -> Result<Option<String>, DriverError> {
    first_node_text(ctx.page, DETAIL_NAME)
}

// rating

fn rated_from_stars(ctx: &ExtractContext<'_>, xpath: &str) -> Result<Option<Rated>, DriverError> {
    let nodes = ctx.page.query(&Locator::xpath(xpath))?;
    let Some(node) = nodes.first() else {
        return Ok(None);
    };
    match parse_rating_and_reviews(node.get("aria-label")) {
        (Some(rating), reviews) => Ok(Some((rating, reviews))),
        _ => Ok(None),
    }
}

fn rating_from_main_stars(ctx: &mut ExtractContext<'_>) -> Result<Option<Rated>, DriverError> {
    let stars = Locator::xpath(DETAIL_MAIN_STARS);
    if wait_for_any(ctx.page, ctx.pacer, std::slice::from_ref(&stars), RATING_WAIT).is_none() {
        return Ok(None);
    }
    rated_from_stars(ctx, DETAIL_MAIN_STARS)
}

fn rating_from_pane_stars(ctx: &mut ExtractContext<'_>) -> Result<Option<Rated>, DriverError> {
    rated_from_stars(ctx, DETAIL_PANE_STARS)
}

fn rating_from_badge(ctx: &mut ExtractContext<'_>) -> Result<Option<Rated>, DriverError> {
    Ok(first_node_text(ctx.page, DETAIL_RATING_BADGE)?
        .and_then(|t| first_decimal(&t))
        .map(|r| (r, None)))
}

fn reviews_from_count_span(ctx: &mut ExtractContext<'_>) -> Result<Option<u32>, DriverError> {
    Ok(ctx
        .page
        .query(&Locator::xpath(DETAIL_REVIEW_COUNT))?
        .iter()
        .find_map(|n| first_count(&n.text)))
}

// hours

fn hours_from_status(ctx: &mut ExtractContext<'_>) -> Result<Option<String>, DriverError> {
    first_node_text(ctx.page, DETAIL_HOURS_STATUS)
}

// phone

fn phone_from_button(ctx: &mut ExtractContext<'_>) -> Result<Option<String>, DriverError> {
    let nodes = ctx.page.query(&Locator::xpath(DETAIL_PHONE_BUTTON))?;
    Ok(nodes.first().and_then(|n| {
        let raw = if n.get("aria-label").is_empty() { n.trimmed_text() } else { n.get("aria-label") };
        non_empty(strong_phone_extract(raw))
    }))
}

fn phone_from_link(ctx: &mut ExtractContext<'_>) -> Result<Option<String>, DriverError> {
    let nodes = ctx.page.query(&Locator::xpath(DETAIL_PHONE_ANY))?;
    Ok(nodes.first().and_then(|n| {
        let raw = [n.get("href"), n.get("aria-label"), n.trimmed_text()]
            .into_iter()
            .find(|v| !v.is_empty())
            .unwrap_or_default();
        non_empty(strong_phone_extract(raw.trim_start_matches("tel:")))
    }))
}

/// Line by line, so digits from neighbouring lines are never glued together.
fn phone_from_panel_text(ctx: &mut ExtractContext<'_>) -> Result<Option<String>, DriverError> {
    let nodes = ctx.page.query(&Locator::css(DETAIL_MAIN_PANEL))?;
    Ok(nodes
        .first()
        .and_then(|n| n.text.lines().find_map(|line| non_empty(strong_phone_extract(line)))))
}

// website

/// First href under `xpath` that can be the listing's own site.
fn first_website(page: &dyn PageHandle, xpath: &str) -> Result<Option<String>, DriverError> {
    Ok(page
        .query(&Locator::xpath(xpath))?
        .iter()
        .map(|n| n.get("href").trim())
        .find(|href| is_candidate_website(href))
        .map(str::to_string))
}

fn website_from_action_bar(ctx: &mut ExtractContext<'_>) -> Result<Option<String>, DriverError> {
    first_website(ctx.page, DETAIL_WEBSITE_ACTION)
}

fn website_from_authority(ctx: &mut ExtractContext<'_>) -> Result<Option<String>, DriverError> {
    first_website(ctx.page, DETAIL_WEBSITE_AUTHORITY)
}

fn website_from_label(ctx: &mut ExtractContext<'_>) -> Result<Option<String>, DriverError> {
    first_website(ctx.page, DETAIL_WEBSITE_LABELLED)
}

fn website_from_external_links(ctx: &mut ExtractContext<'_>) -> Result<Option<String>, DriverError> {
    first_website(ctx.page, DETAIL_EXTERNAL_LINKS)
}

// address

/// Address and plus code, tried through progressively looser sources.
fn address_and_plus_code(page: &dyn PageHandle) -> (String, String) {
    let mut address = first_node_text(page, DETAIL_ADDRESS_BUTTON).ok().flatten().unwrap_or_default();
    let mut plus_code = first_node_text(page, DETAIL_PLUS_CODE_BUTTON).ok().flatten().unwrap_or_default();

    if address.is_empty() || plus_code.is_empty() {
        match page.query(&Locator::xpath(DETAIL_INFO_SPANS)) {
            Ok(spans) => {
                for span in &spans {
                    let text = span.trimmed_text();
                    if text.is_empty() {
                        continue;
                    }
                    if plus_code.is_empty() {
                        plus_code = find_plus_code(text).unwrap_or_default();
                    }
                    if address.is_empty()
                        && !looks_like_hours(text)
                        && strong_phone_extract(text).is_empty()
                        && has_letters(text)
                    {
                        address = text.to_string();
                    }
                    if !address.is_empty() && !plus_code.is_empty() {
                        break;
                    }
                }
            }
            Err(e) => debug!("address: info span scan failed: {}", e),
        }
    }

    if address.is_empty() && plus_code.is_empty() {
        let (label_address, label_plus) = address_from_controls(page);
        address = label_address;
        plus_code = label_plus;
    }

    if let Some(embedded) = find_plus_code(&address) {
        if plus_code.is_empty() {
            plus_code = embedded;
        }
        address = strip_plus_code(&address);
    }

    (address, plus_code)
}

fn address_from_controls(page: &dyn PageHandle) -> (String, String) {
    for xpath in DETAIL_ADDRESS_CONTROLS {
        let Ok(nodes) = page.query(&Locator::xpath(xpath)) else {
            continue;
        };
        if let Some(node) = nodes.first() {
            let label = if node.get("aria-label").is_empty() { node.trimmed_text() } else { node.get("aria-label") };
            if !label.is_empty() {
                return split_address_label(label);
            }
        }
    }
    (String::new(), String::new())
}

// social

fn social_links(page: &dyn PageHandle) -> Vec<String> {
    let nodes = match page.query(&Locator::xpath(DETAIL_SOCIAL_LINKS)) {
        Ok(nodes) => nodes,
        Err(e) => {
            debug!("social: link scan failed: {}", e);
            return Vec::new();
        }
    };
    let mut links: Vec<String> = Vec::new();
    for href in nodes.iter().map(|n| n.get("href")) {
        if is_social_link(href) && !links.iter().any(|l| l == href) {
            links.push(href.to_string());
        }
    }
    links
}

/// Read every field of the open detail pane. Never fails; missing data is empty.
pub fn extract_detail(ctx: &mut ExtractContext<'_>) -> DetailFields {
    let mut fields = DetailFields {
        name: first_hit("name", ctx, &[Strategy::new("heading", name_from_heading)]).unwrap_or_default(),
        ..DetailFields::default()
    };

    let rated = first_hit(
        "rating",
        ctx,
        &[
            Strategy::new("main_stars", rating_from_main_stars),
            Strategy::new("pane_stars", rating_from_pane_stars),
            Strategy::new("badge", rating_from_badge),
        ],
    );
    if let Some((rating, reviews)) = rated {
        fields.rating = Some(rating);
        fields.reviews_count = reviews;
    }
    if fields.reviews_count.is_none() {
        fields.reviews_count = first_hit(
            "reviews_count",
            ctx,
            &[Strategy::new("count_span", reviews_from_count_span)],
        );
    }

    fields.opening_hours =
        first_hit("opening_hours", ctx, &[Strategy::new("status_span", hours_from_status)]).unwrap_or_default();

    let (address, plus_code) = address_and_plus_code(ctx.page);
    fields.address = address;
    fields.plus_code = plus_code;

    fields.phone = first_hit(
        "phone",
        ctx,
        &[
            Strategy::new("phone_button", phone_from_button),
            Strategy::new("phone_link", phone_from_link),
            Strategy::new("panel_text", phone_from_panel_text),
        ],
    )
    .unwrap_or_default();

    fields.website = first_hit(
        "website",
        ctx,
        &[
            Strategy::new("action_bar", website_from_action_bar),
            Strategy::new("authority", website_from_authority),
            Strategy::new("labelled", website_from_label),
            Strategy::new("external_links", website_from_external_links),
        ],
    )
    .unwrap_or_default();

    fields.social_links = social_links(ctx.page);
    fields.photo_urls = collect_photos(ctx);
    fields
}

/// Canonical profile of the open listing.
///
/// A numeric `data-cid` in the pane wins, then a `cid` in the current URL,
/// then one embedded in the page source. Without any id the canonicalized
/// current URL is used.
pub fn canonical_profile(page: &dyn PageHandle, base_url: &str) -> ProfileRef {
    let from_id = |id: String| ProfileRef {
        url: canonical_from_id(base_url, &id),
        id: Some(id),
    };

    for selector in DATA_CID {
        let Ok(nodes) = page.query(&Locator::css(selector)) else {
            continue;
        };
        if let Some(id) = nodes.iter().map(|n| n.get("data-cid")).find(|v| is_numeric_id(v)) {
            return from_id(id.to_string());
        }
    }

    let current = page.current_url().unwrap_or_default();
    let current = current.trim();
    if current.is_empty() {
        return ProfileRef::default();
    }
    if let Some(id) = extract_cid_from_url(current) {
        return from_id(id);
    }
    if let Some(id) = page.page_source().ok().as_deref().and_then(extract_cid_from_source) {
        return from_id(id);
    }
    ProfileRef {
        url: canonicalize(current),
        id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Node;
    use crate::config::PhotoConfig;
    use crate::pacing::Pacer;
    use crate::test_utils::{ManualClock, ScriptedPage};

    const BASE: &str = "https://www.google.com/maps";

    fn run(page: &ScriptedPage) -> DetailFields {
        let mut pacer = Pacer::seeded(Box::new(ManualClock::new()), 9);
        let photos = PhotoConfig::default();
        let mut ctx = ExtractContext { page, pacer: &mut pacer, photos: &photos };
        extract_detail(&mut ctx)
    }

    fn set(page: &ScriptedPage, xpath: &str, nodes: Vec<Node>) {
        page.set_nodes(&Locator::xpath(xpath), nodes);
    }

    #[test]
    fn test_full_pane() {
        let page = ScriptedPage::new();
        set(&page, DETAIL_NAME, vec![Node::with_text("Zooba ")]);
        set(&page, DETAIL_MAIN_STARS, vec![Node::default().attr("aria-label", "4.5 stars 1,204 Reviews")]);
        set(&page, DETAIL_HOURS_STATUS, vec![Node::with_text("Open ⋅ Closes 1 AM")]);
        set(&page, DETAIL_ADDRESS_BUTTON, vec![Node::with_text("26th of July St, Zamalek")]);
        set(&page, DETAIL_PLUS_CODE_BUTTON, vec![Node::with_text("V8C2+4X Zamalek")]);
        set(&page, DETAIL_PHONE_BUTTON, vec![Node::default().attr("aria-label", "Phone: 0100 123 4567")]);
        set(&page, DETAIL_WEBSITE_AUTHORITY, vec![Node::default().attr("href", "https://zoobaeats.com/")]);
        set(
            &page,
            DETAIL_SOCIAL_LINKS,
            vec![
                Node::default().attr("href", "https://www.instagram.com/zoobaeats"),
                Node::default().attr("href", "https://www.facebook.com/zooba"),
                Node::default().attr("href", "https://www.instagram.com/zoobaeats"),
                Node::default().attr("href", "https://notfacebook.com.evil.io/x"),
            ],
        );
        set(&page, DETAIL_PHOTO_IMAGES, vec![Node::default().attr("src", "https://lh3.googleusercontent.com/p/z")]);

        let fields = run(&page);
        assert_eq!(fields.name, "Zooba");
        assert_eq!(fields.rating, Some(4.5));
        assert_eq!(fields.reviews_count, Some(1204));
        assert_eq!(fields.opening_hours, "Open ⋅ Closes 1 AM");
        assert_eq!(fields.address, "26th of July St, Zamalek");
        assert_eq!(fields.plus_code, "V8C2+4X Zamalek");
        assert_eq!(fields.phone, "01001234567");
        assert_eq!(fields.website, "https://zoobaeats.com/");
        assert_eq!(
            fields.social_links,
            vec!["https://www.instagram.com/zoobaeats".to_string(), "https://www.facebook.com/zooba".to_string()]
        );
        assert_eq!(fields.photo_urls, vec!["https://lh3.googleusercontent.com/p/z".to_string()]);
    }

    #[test]
    fn test_rating_falls_back_to_badge_and_count_span() {
        let page = ScriptedPage::new();
        set(&page, DETAIL_RATING_BADGE, vec![Node::with_text("4.6")]);
        set(&page, DETAIL_REVIEW_COUNT, vec![Node::with_text("Overview"), Node::with_text("(٣٢)")]);
        let fields = run(&page);
        assert_eq!(fields.rating, Some(4.6));
        assert_eq!(fields.reviews_count, Some(32));
    }

    #[test]
    fn test_pane_stars_used_when_main_absent() {
        let page = ScriptedPage::new();
        set(&page, DETAIL_PANE_STARS, vec![Node::default().attr("aria-label", "3.9 stars")]);
        let fields = run(&page);
        assert_eq!(fields.rating, Some(3.9));
        assert_eq!(fields.reviews_count, None);
    }

    #[test]
    fn test_address_from_info_spans_skips_hours_and_phones() {
        let page = ScriptedPage::new();
        set(
            &page,
            DETAIL_INFO_SPANS,
            vec![
                Node::with_text("Open 24 hours"),
                Node::with_text("02 2738 0000"),
                Node::with_text("·"),
                Node::with_text("2X5R+QHV Maadi, Cairo"),
            ],
        );
        let fields = run(&page);
        assert_eq!(fields.plus_code, "2X5R+QHV");
        assert_eq!(fields.address, "Maadi, Cairo");
    }

    #[test]
    fn test_address_from_control_label() {
        let page = ScriptedPage::new();
        set(
            &page,
            DETAIL_ADDRESS_CONTROLS[1],
            vec![Node::default().attr("aria-label", "Address: 9 Road 233, Degla\nV8C2+4X")],
        );
        let fields = run(&page);
        assert_eq!(fields.address, "Address: 9 Road 233, Degla");
        assert_eq!(fields.plus_code, "V8C2+4X");
    }

    #[test]
    fn test_phone_link_and_panel_fallbacks() {
        let page = ScriptedPage::new();
        set(&page, DETAIL_PHONE_ANY, vec![Node::default().attr("href", "tel:+20227380000")]);
        assert_eq!(run(&page).phone, "+20227380000");

        let page = ScriptedPage::new();
        page.set_nodes(
            &Locator::css(DETAIL_MAIN_PANEL),
            vec![Node::with_text("Zooba\n4.5\n26 July St\n010 0123 4567\nOrder online")],
        );
        assert_eq!(run(&page).phone, "01001234567");
    }

    #[test]
    fn test_website_skips_google_links() {
        let page = ScriptedPage::new();
        set(
            &page,
            DETAIL_EXTERNAL_LINKS,
            vec![
                Node::default().attr("href", "https://www.google.com/maps/reserve"),
                Node::default().attr("href", "https://www.youtube.com/watch?v=1"),
                Node::default().attr("href", "https://abou-tarek.com/"),
            ],
        );
        assert_eq!(run(&page).website, "https://abou-tarek.com/");
    }

    #[test]
    fn test_action_bar_social_link_is_not_the_website() {
        let page = ScriptedPage::new();
        set(
            &page,
            DETAIL_WEBSITE_ACTION,
            vec![Node::default().attr("href", "https://www.facebook.com/koshary.eltahrir")],
        );
        set(
            &page,
            DETAIL_WEBSITE_AUTHORITY,
            vec![Node::default().attr("href", "https://maps.app.goo.gl/xyz")],
        );
        set(
            &page,
            DETAIL_EXTERNAL_LINKS,
            vec![
                Node::default().attr("href", "https://www.facebook.com/koshary.eltahrir"),
                Node::default().attr("href", "https://koshary-eltahrir.com/"),
            ],
        );
        assert_eq!(run(&page).website, "https://koshary-eltahrir.com/");
    }

    #[test]
    fn test_canonical_profile_prefers_numeric_data_cid() {
        let page = ScriptedPage::new();
        page.set_nodes(
            &Locator::css(DATA_CID[2]),
            vec![Node::default().attr("data-cid", "abc"), Node::default().attr("data-cid", "1234567890123")],
        );
        page.set_url("https://www.google.com/maps/place/Zooba/?cid=99");
        let profile = canonical_profile(&page, BASE);
        assert_eq!(profile.url, "https://www.google.com/maps?cid=1234567890123");
        assert_eq!(profile.id.as_deref(), Some("1234567890123"));
    }

    #[test]
    fn test_canonical_profile_url_then_source_then_plain() {
        let page = ScriptedPage::new();
        page.set_url("https://www.google.com/maps/place/Zooba/?cid=42&hl=en");
        assert_eq!(canonical_profile(&page, BASE).id.as_deref(), Some("42"));

        page.set_url("https://www.google.com/maps/place/Zooba/data=!4m7?entry=ttu");
        page.set_source("<a href=\"https://maps.google.com/maps?cid=16512345678901234567\">");
        assert_eq!(
            canonical_profile(&page, BASE).url,
            "https://www.google.com/maps?cid=16512345678901234567"
        );

        page.set_source("");
        let profile = canonical_profile(&page, BASE);
        assert_eq!(profile.url, "https://www.google.com/maps/place/Zooba/data=!4m7");
        assert_eq!(profile.id, None);
    }

    #[test]
    fn test_canonical_profile_empty_without_url() {
        let page = ScriptedPage::new();
        assert_eq!(canonical_profile(&page, BASE), ProfileRef::default());
    }
}
