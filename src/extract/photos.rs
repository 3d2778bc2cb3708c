//! Photo URL collection from the gallery dialog, with an inline fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

use super::selectors::{
    DETAIL_PHOTO_IMAGES, GALLERY_BACKGROUNDS, GALLERY_CLOSE, GALLERY_DIALOG, GALLERY_HERO, GALLERY_IMAGES,
    GALLERY_THUMB, PHOTO_SCROLL_TARGETS,
};
use super::ExtractContext;
use crate::browser::{wait_for_any, DriverError, Locator, Node, PageHandle};
use crate::pacing::Pacer;
use crate::url_utils::{is_image_host, upgrade_scheme};

static BACKGROUND_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)background-image\s*:\s*url\((?:['"])?([^)'"]+)"#).expect("background image pattern is valid")
});

/// The gallery stops early once it has this many photos.
const GALLERY_ENOUGH: usize = 3;
const GALLERY_SCROLL_PX: i64 = 500;
const GALLERY_POLL: Duration = Duration::from_millis(250);
const INLINE_POLL: Duration = Duration::from_millis(400);
const CLICK_SETTLE: Duration = Duration::from_millis(200);
const SCROLL_SETTLE: Duration = Duration::from_millis(800);

/// Image URL of an `<img>` snapshot: `src`, else the last `srcset`
/// candidate, else `data-src`. Protocol-relative URLs become https.
pub fn resolve_image_src(node: &Node) -> Option<String> {
    let mut src = node.get("src").to_string();
    if src.is_empty() {
        if let Some(last) = node.get("srcset").split(',').map(str::trim).filter(|p| !p.is_empty()).last() {
            src = last.split_whitespace().next().unwrap_or_default().to_string();
        }
    }
    if src.is_empty() {
        src = node.get("data-src").to_string();
    }
    if src.is_empty() {
        None
    } else {
        Some(upgrade_scheme(&src))
    }
}

/// URL inside a `background-image: url(...)` declaration.
pub fn background_image_url(style: &str) -> Option<String> {
    BACKGROUND_IMAGE
        .captures(style)
        .map(|c| upgrade_scheme(c[1].trim()))
        .filter(|u| !u.is_empty())
}

/// Photos for the open detail pane, at most `PhotoConfig::limit()`.
pub fn collect_photos(ctx: &mut ExtractContext<'_>) -> Vec<String> {
    match gallery_photos(ctx) {
        Ok(photos) if !photos.is_empty() => return photos,
        Ok(_) => debug!("photos: gallery yielded nothing, trying inline images"),
        Err(e) => debug!("photos: gallery failed: {}", e),
    }
    inline_photos(ctx).unwrap_or_else(|e| {
        debug!("photos: inline scan failed: {}", e);
        Vec::new()
    })
}

fn push_photo(photos: &mut Vec<String>, url: String, hosts: &[String], max: usize) {
    if photos.len() < max && is_image_host(&url, hosts) && !photos.contains(&url) {
        photos.push(url);
    }
}

fn open_gallery(ctx: &mut ExtractContext<'_>) -> Result<bool, DriverError> {
    let page = ctx.page;
    for xpath in [GALLERY_HERO, GALLERY_THUMB] {
        let trigger = Locator::xpath(xpath);
        if page.scroll_into_view(&trigger, 0)? {
            ctx.pacer.pause(CLICK_SETTLE);
            if page.click(&trigger, 0)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn close_gallery(page: &dyn PageHandle) {
    if page.press_key("Escape").is_err() {
        let _ = page.click(&Locator::xpath(GALLERY_CLOSE), 0);
    }
}

fn gallery_photos(ctx: &mut ExtractContext<'_>) -> Result<Vec<String>, DriverError> {
    let page = ctx.page;
    let max = ctx.photos.limit();
    let timeout = Duration::from_secs(ctx.photos.gallery_timeout_secs);

    if !open_gallery(ctx)? {
        return Ok(Vec::new());
    }
    let dialog = Locator::xpath(GALLERY_DIALOG);
    if wait_for_any(page, ctx.pacer, std::slice::from_ref(&dialog), timeout).is_none() {
        debug!("photos: gallery dialog never appeared");
        return Ok(Vec::new());
    }

    let mut photos = Vec::new();
    let deadline = ctx.pacer.deadline_after(timeout);
    while photos.len() < max && !ctx.pacer.expired(deadline) {
        if let Err(e) = scan_gallery(page, &ctx.photos.image_hosts, max, &mut photos) {
            debug!("photos: gallery scan interrupted: {}", e);
            break;
        }
        if photos.len() >= GALLERY_ENOUGH {
            break;
        }
        if !page.scroll_by(&dialog, 0, GALLERY_SCROLL_PX).unwrap_or(false) {
            let _ = page.press_key("PageDown");
        }
        ctx.pacer.pause(GALLERY_POLL);
    }

    close_gallery(page);
    Ok(photos)
}

/// One pass over the dialog's images and background-image tiles.
fn scan_gallery(
    page: &dyn PageHandle,
    hosts: &[String],
    max: usize,
    photos: &mut Vec<String>,
) -> Result<(), DriverError> {
    for node in page.query(&Locator::xpath(GALLERY_IMAGES))? {
        if let Some(url) = resolve_image_src(&node) {
            push_photo(photos, url, hosts, max);
        }
    }
    for node in page.query(&Locator::xpath(GALLERY_BACKGROUNDS))? {
        if let Some(url) = background_image_url(node.get("style")) {
            push_photo(photos, url, hosts, max);
        }
    }
    Ok(())
}

/// Bring the photo strip of the detail pane into view so its images load.
pub fn scroll_photos_into_view(page: &dyn PageHandle, pacer: &mut Pacer) -> bool {
    for xpath in PHOTO_SCROLL_TARGETS {
        if page.scroll_into_view(&Locator::xpath(xpath), 0).unwrap_or(false) {
            pacer.pause(SCROLL_SETTLE);
            return true;
        }
    }
    false
}

fn inline_photos(ctx: &mut ExtractContext<'_>) -> Result<Vec<String>, DriverError> {
    let page = ctx.page;
    scroll_photos_into_view(page, ctx.pacer);

    let images = Locator::xpath(DETAIL_PHOTO_IMAGES);
    let max = ctx.photos.limit();
    let deadline = ctx.pacer.deadline_after(Duration::from_secs(ctx.photos.inline_timeout_secs));
    // Thumbnails lazy-load, so placeholders can precede the real URLs.
    loop {
        let mut photos = Vec::new();
        for node in page.query(&images)? {
            if let Some(url) = resolve_image_src(&node) {
                push_photo(&mut photos, url, &ctx.photos.image_hosts, max);
            }
        }
        if !photos.is_empty() || ctx.pacer.expired(deadline) {
            return Ok(photos);
        }
        ctx.pacer.pause(INLINE_POLL);
    }
}
