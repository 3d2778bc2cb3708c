//! End-to-end harvesting over scripted pages: resume, ordering and the
//! persisted row layout.

mod common;

use clap::Parser;
use common::{copy_fixture, data_lines, fixture_path, scripted_harvester};
use mapharvest::browser::{Locator, Node};
use mapharvest::cli::Cli;
use mapharvest::dedup::DedupLedger;
use mapharvest::extract::selectors::{DETAIL_MAIN_STARS, DETAIL_PHONE_BUTTON, DETAIL_WEBSITE_AUTHORITY};
use mapharvest::result_sink::read_persisted_rows;
use mapharvest::test_utils::{ScriptedListing, ScriptedPage};
use std::ffi::OsString;
use tempfile::TempDir;

fn categories(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn test_seeded_ledger_recognizes_previous_rows() {
    let dir = TempDir::new().unwrap();
    let path = copy_fixture("previous_run.csv", &dir);
    let ledger = DedupLedger::seed_from_csv(&path).unwrap();

    assert!(ledger.seen("111", "", ""));
    assert!(ledger.seen("", "Riche", "Cairo"));
    assert!(!ledger.seen("", "Riche", "Alexandria"));
    assert_eq!(ledger.count(), 1);
}

#[test]
fn test_resumed_run_appends_only_new_places() {
    let dir = TempDir::new().unwrap();
    let path = copy_fixture("previous_run.csv", &dir);

    let page = ScriptedPage::new();
    page.set_listings(&[
        ScriptedListing::new("Zooba").with_cid("111"),
        ScriptedListing::new("Riche"),
        ScriptedListing::new("Felfela").with_cid("333"),
    ]);
    let summary = scripted_harvester(&path, "Cairo", vec![page])
        .run(&categories(&["restaurant"]))
        .unwrap();

    assert_eq!(summary.written, 1);
    assert_eq!(summary.duplicates, 2);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.matches("category,query_location").count(), 1, "header written once");
    let lines = data_lines(&path);
    assert_eq!(lines.len(), 3);
    assert!(lines[2].starts_with("restaurant,Cairo,Felfela,"));
}

#[test]
fn test_categories_processed_in_input_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("places.csv");

    let pages: Vec<ScriptedPage> = ["Beano's", "Gourmet", "Seoudi"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let page = ScriptedPage::new();
            page.set_listings(&[ScriptedListing::new(name).with_cid(&format!("{}00", i + 1))]);
            page
        })
        .collect();
    let summary = scripted_harvester(&path, "Maadi", pages)
        .run(&categories(&["cafe", "bakery", "supermarket"]))
        .unwrap();
    assert_eq!(summary.categories_attempted, 3);
    assert_eq!(summary.written, 3);

    let rows = read_persisted_rows(&path).unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Beano's", "Gourmet", "Seoudi"]);
    assert!(rows.iter().all(|r| r.query_location == "Maadi"));

    let lines = data_lines(&path);
    assert!(lines[0].starts_with("cafe,"));
    assert!(lines[1].starts_with("bakery,"));
    assert!(lines[2].starts_with("supermarket,"));
}

#[test]
fn test_detail_fields_land_in_their_columns() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("places.csv");

    let page = ScriptedPage::new();
    page.set_listings(&[ScriptedListing::new("Zooba")
        .with_cid("4242")
        .with_rows(&["4.5(1,204)", "Egyptian restaurant · 26th of July St"])]);
    page.set_nodes(
        &Locator::xpath(DETAIL_MAIN_STARS),
        vec![Node::default().attr("aria-label", "4.5 stars 1,204 Reviews")],
    );
    page.set_nodes(
        &Locator::xpath(DETAIL_PHONE_BUTTON),
        vec![Node::default().attr("aria-label", "Phone: ٠١٠ ٠١٢٣ ٤٥٦٧")],
    );
    page.set_nodes(
        &Locator::xpath(DETAIL_WEBSITE_AUTHORITY),
        vec![Node::default().attr("href", "https://zoobaeats.com/")],
    );

    scripted_harvester(&path, "Cairo", vec![page])
        .run(&categories(&["restaurant"]))
        .unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let record = reader.records().next().unwrap().unwrap();
    assert_eq!(&record[2], "Zooba");
    assert_eq!(&record[3], "Egyptian restaurant");
    assert_eq!(&record[4], "26th of July St");
    assert_eq!(&record[6], "01001234567");
    assert_eq!(&record[7], "https://zoobaeats.com/");
    assert_eq!(&record[8], "https://www.google.com/maps?cid=4242");
    assert_eq!(&record[9], "4.5");
    assert_eq!(&record[10], "1204");
    assert_eq!(&record[14], "");
}

#[test]
fn test_categories_file_feeds_the_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("places.csv");
    let list = fixture_path("categories.txt");

    let args: Vec<OsString> = vec![
        "mapharvest".into(),
        "--categories".into(),
        "ignored".into(),
        "--categories-file".into(),
        list.into_os_string(),
        "--location".into(),
        "Cairo".into(),
        "--output".into(),
        path.clone().into_os_string(),
    ];
    let cli = Cli::parse_from(args);
    let wanted = cli.load_categories().unwrap();
    assert_eq!(wanted, categories(&["restaurant", "cafe"]));

    let pages: Vec<ScriptedPage> = ["Zooba", "Beano's"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let page = ScriptedPage::new();
            page.set_listings(&[ScriptedListing::new(name).with_cid(&format!("{}1", i + 5))]);
            page
        })
        .collect();
    let summary = scripted_harvester(&path, "Cairo", pages).run(&wanted).unwrap();
    assert_eq!(summary.categories_attempted, 2);

    let lines = data_lines(&path);
    assert!(lines[0].starts_with("restaurant,Cairo,Zooba,"));
    assert!(lines[1].starts_with("cafe,Cairo,Beano's,"));
}
