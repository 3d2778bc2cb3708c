//! Field extraction from the results list and the detail pane.
//!
//! The UI exposes the same data through different DOM shapes depending on
//! locale, listing type and layout experiments. Each field is therefore read
//! by an ordered list of [`Strategy`] values; the first one that yields a
//! non-empty value wins. Strategies never abort extraction: a driver error
//! inside one is logged and treated as "absent".

pub mod card;
pub mod detail;
pub mod patterns;
pub mod photos;

pub use card::{extract_card, open_card_detail, parse_card, CardFields, CardSnapshot};
pub use detail::{canonical_profile, extract_detail, DetailFields, ProfileRef};
pub use photos::scroll_photos_into_view;

use tracing::debug;

use crate::browser::{DriverError, PageHandle};
use crate::config::PhotoConfig;
use crate::pacing::Pacer;

/// Selectors for the results UI.
pub mod selectors {
    pub const CARD_CONTAINER: &str = "div.Nv2PK";
    pub const CARD_TITLE: &str = ".qBF1Pd";
    pub const CARD_ANCHOR: &str = "a.hfpxzc";
    pub const CARD_INFO_ROW: &str = ".W4Efsd";

    pub const DETAIL_NAME: &str =
        "//h1[contains(@class,'fontHeadline') or contains(@class,'DUwDvf') or @role='heading']";
    pub const DETAIL_MAIN_STARS: &str = "//div[@role='main']//span[@role='img' and contains(@aria-label,'stars')]";
    pub const DETAIL_PANE_STARS: &str = "//*[@id='pane']//span[@role='img' and contains(@aria-label,'stars')]";
    pub const DETAIL_RATING_BADGE: &str = "//div[@role='main']//span[contains(@class,'F7nice')]";
    pub const DETAIL_REVIEW_COUNT: &str = "//*[@id='pane']//span[contains(text(),'(') or contains(@class,'UY7F9')]";
    pub const DETAIL_HOURS_STATUS: &str = "//span[(@aria-label and (contains(@aria-label,'Open') or contains(@aria-label,'Closed') or contains(@aria-label,'مفتوح') or contains(@aria-label,'مغلق'))) or (contains(normalize-space(.),'Open') or contains(normalize-space(.),'Closed') or contains(normalize-space(.),'24 hours') or contains(normalize-space(.),'مفتوح') or contains(normalize-space(.),'مغلق') or contains(normalize-space(.),'٢٤ ساعة') or contains(normalize-space(.),'24 ساعة'))][1]";
    pub const DETAIL_ADDRESS_BUTTON: &str =
        "//div[@role='main']//button[contains(@data-item-id,'address')]//div[contains(@class,'Io6YTe')]";
    pub const DETAIL_PLUS_CODE_BUTTON: &str =
        "//div[@role='main']//button[contains(@data-item-id,'plus_code')]//div[contains(@class,'Io6YTe')]";
    pub const DETAIL_INFO_SPANS: &str = "//*[@id='pane']//div[contains(@class,'W4Efsd')]//span[normalize-space()]";
    pub const DETAIL_ADDRESS_CONTROLS: [&str; 3] = [
        "//button[@data-item-id='address']",
        "//button[contains(@aria-label, 'Address')]",
        "//div[contains(text(),'Address') or contains(text(),'العنوان')]",
    ];
    pub const DETAIL_PHONE_BUTTON: &str = "//div[@role='main']//button[@data-item-id='phone' or starts-with(@data-item-id,'phone:') or contains(@aria-label,'Phone') or contains(@aria-label,'الهاتف') or contains(@aria-label,'اتصال')]";
    pub const DETAIL_PHONE_ANY: &str = "//button[@data-item-id='phone' or starts-with(@data-item-id,'phone:') or contains(@aria-label,'Phone') or contains(@aria-label,'الهاتف') or contains(@aria-label,'اتصال')] | //a[starts-with(@href,'tel:')]";
    pub const DETAIL_MAIN_PANEL: &str = "div[role='main']";
    pub const DETAIL_WEBSITE_ACTION: &str = "//div[contains(@class,'m6QErb') and contains(@class,'WNBkOb')]//a[@href and (contains(@aria-label,'Website') or .//span[normalize-space()='Website'])]";
    pub const DETAIL_WEBSITE_AUTHORITY: &str = "//div[@role='main']//a[@data-item-id='authority']";
    pub const DETAIL_WEBSITE_LABELLED: &str = "//div[@role='main']//a[@href and (contains(@aria-label,'Website') or contains(normalize-space(.),'Website') or contains(normalize-space(.),'الموقع الإلكتروني'))]";
    pub const DETAIL_EXTERNAL_LINKS: &str = "//div[@role='main']//a[@href and starts-with(@href,'http')]";
    pub const DETAIL_SOCIAL_LINKS: &str = "//a[@href and (contains(@href,'facebook.com') or contains(@href,'instagram.com') or contains(@href,'x.com') or contains(@href,'twitter.com') or contains(@href,'tiktok.com'))]";
    pub const DETAIL_PHOTO_IMAGES: &str = "//img[contains(@src,'googleusercontent') or contains(@src,'ggpht')][@src]";
    pub const DATA_CID: [&str; 3] = ["div.m6QErb.WNBkOb [data-cid]", "div.m6QErb [data-cid]", "[data-cid]"];

    pub const GALLERY_HERO: &str = "//div[@role='main']//button[.//img][1]";
    pub const GALLERY_THUMB: &str =
        "//*[@id='pane']//img[contains(@src,'ggpht') or contains(@src,'googleusercontent')][1]";
    pub const GALLERY_DIALOG: &str = "//div[@role='dialog' or @aria-modal='true']";
    pub const GALLERY_IMAGES: &str = "//div[@role='dialog']//img[@src or @srcset or @data-src]";
    pub const GALLERY_BACKGROUNDS: &str = "//div[@role='dialog']//*[contains(@style,'background-image')]";
    pub const GALLERY_CLOSE: &str = "//div[@role='dialog']//button[@aria-label='Close']";
    pub const PHOTO_SCROLL_TARGETS: [&str; 3] = [
        "//div[@role='main']//button[.//img][1]",
        "//div[@role='main']//div[contains(@class,'m6QErb')]//img[contains(@src,'ggpht') or contains(@src,'googleusercontent')][1]",
        "//*[@id='pane']//img[contains(@src,'ggpht') or contains(@src,'googleusercontent')][1]",
    ];

    pub const RESULTS_FEED: [&str; 3] = [
        "//div[@role='feed' and contains(@class,'m6QErb')]",
        "//div[@role='feed' and starts-with(@aria-label, 'Results for')]",
        "//div[contains(@class,'m6QErb') and (starts-with(@aria-label,'Results for') or @role='feed')]",
    ];
    pub const RESULTS_PANE: &str = "div.m6QErb";
    pub const END_OF_LIST: &str = "//span[contains(.,\"You've reached the end\") or contains(.,\"You\u{2019}ve reached the end\") or contains(.,\"You\u{b4}ve reached the end\") or contains(.,'لقد وصلت إلى النهاية') or contains(.,'End of results')] | //div[contains(.,\"You've reached the end\") or contains(.,\"You\u{2019}ve reached the end\") or contains(.,\"You\u{b4}ve reached the end\") or contains(.,'لقد وصلت إلى النهاية') or contains(.,'End of results')]";
    pub const MORE_PLACES: [&str; 3] = [
        "//button[.//span[contains(.,'More places') or contains(.,'View all') or contains(.,'المزيد من الأماكن') or contains(.,'عرض الكل')]]",
        "//a[contains(.,'More places') or contains(.,'View all') or contains(.,'المزيد من الأماكن') or contains(.,'عرض الكل')]",
        "//button[contains(.,'More places') or contains(.,'View all') or contains(.,'المزيد من الأماكن') or contains(.,'عرض الكل')]",
    ];
    pub const ZOOM_OUT: &str = "//button[@aria-label='Zoom out']";
}

/// What a strategy gets to work with.
pub struct ExtractContext<'a> {
    pub page: &'a dyn PageHandle,
    pub pacer: &'a mut Pacer,
    pub photos: &'a PhotoConfig,
}

/// One way of reading a field. `Ok(None)` and `Err` both mean "try the next one".
pub struct Strategy<T> {
    pub name: &'static str,
    pub run: fn(&mut ExtractContext<'_>) -> Result<Option<T>, DriverError>,
}

impl<T> Strategy<T> {
    pub fn new(name: &'static str, run: fn(&mut ExtractContext<'_>) -> Result<Option<T>, DriverError>) -> Self {
        Self { name, run }
    }
}

/// Run strategies in order; the first `Some` wins.
pub fn first_hit<T>(field: &str, ctx: &mut ExtractContext<'_>, strategies: &[Strategy<T>]) -> Option<T> {
    for strategy in strategies {
        match (strategy.run)(ctx) {
            Ok(Some(value)) => {
                debug!("{}: found via {}", field, strategy.name);
                return Some(value);
            }
            Ok(None) => {}
            Err(e) => debug!("{}: {} failed: {}", field, strategy.name, e),
        }
    }
    debug!("{}: no strategy matched", field);
    None
}

/// `Some` only for non-blank text.
pub(crate) fn non_empty(text: impl Into<String>) -> Option<String> {
    let text = text.into();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
