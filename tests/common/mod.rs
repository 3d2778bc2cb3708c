#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use mapharvest::config::AppConfig;
use mapharvest::harvest::{prepare_output, Harvester};
use mapharvest::pacing::Pacer;
use mapharvest::test_utils::{ManualClock, ScriptedPage, ScriptedSessions};

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// Copy a fixture into `dir` and return the copy's path.
pub fn copy_fixture(relative: &str, dir: &TempDir) -> PathBuf {
    let dst = dir.path().join(relative);
    std::fs::copy(fixture_path(relative), &dst)
        .unwrap_or_else(|_| panic!("Failed to copy fixture: {}", relative));
    dst
}

/// Harvester over scripted pages with virtual time, appending to `output`.
pub fn scripted_harvester(output: &Path, location: &str, pages: Vec<ScriptedPage>) -> Harvester<ScriptedSessions> {
    let config = AppConfig::embedded_default().expect("embedded config parses");
    let (sink, ledger) = prepare_output(output).expect("output opens");
    Harvester::new(config, ScriptedSessions::new(pages), sink, ledger, location)
        .with_pacer(Pacer::seeded(Box::new(ManualClock::new()), 42))
}

/// Data lines of a record file, header excluded.
pub fn data_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("output readable")
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}
