pub mod browser;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod extract;
pub mod harvest;
pub mod logger;
pub mod pacing;
pub mod pagination;
pub mod place;
pub mod result_sink;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod text_normalizer;
pub mod url_utils;

pub use harvest::{Harvester, RunSummary};
pub use place::Place;
