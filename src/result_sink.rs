// result_sink.rs - Append-only CSV record store
//
// One row per persisted Place, flushed after every row so a killed run loses at
// most the row in flight. The file is created with a UTF-8 BOM and the fixed
// header; an existing file is appended to as-is. The same file is read back
// at startup to seed the dedup ledger.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::place::{Place, CSV_FIELDS};
use crate::text_normalizer::normalize_field;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub struct ResultSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    count: usize,
}

impl ResultSink {
    /// Open (or create with header) the record file at `path` for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }

        let existing_len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let needs_newline = existing_len > 0 && !ends_with_newline(path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;

        if existing_len == 0 {
            file.write_all(UTF8_BOM)?;
        } else if needs_newline {
            // a previous run died mid-row; keep the fragment on its own line
            file.write_all(b"\n")?;
        }

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if existing_len == 0 {
            writer.write_record(CSV_FIELDS)?;
            writer.flush().context("Failed to write CSV header")?;
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            count: 0,
        })
    }

    /// Append one place, normalizing every field, and flush.
    pub fn append(&mut self, place: &Place) -> Result<()> {
        let record: Vec<String> = place.to_record().iter().map(|v| normalize_field(v)).collect();
        self.writer
            .write_record(&record)
            .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        self.count += 1;
        Ok(())
    }

    /// Rows written through this sink.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// The columns of a persisted row that resume needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRow {
    pub name: String,
    pub query_location: String,
    pub profile_url: String,
}

/// Read back a record file. A missing file yields no rows; corrupt rows are skipped.
pub fn read_persisted_rows(path: &Path) -> Result<Vec<PersistedRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open output file: {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (Some(name_idx), Some(loc_idx), Some(url_idx)) =
        (column("name"), column("query_location"), column("profile_url"))
    else {
        warn!("{} has no recognizable header; nothing to resume from", path.display());
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    let mut errors = 0;
    for (line_num, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let field = |i: usize| record.get(i).unwrap_or_default().trim().to_string();
                rows.push(PersistedRow {
                    name: field(name_idx),
                    query_location: field(loc_idx),
                    profile_url: field(url_idx),
                });
            }
            Err(e) => {
                errors += 1;
                if errors <= 3 {
                    warn!("Skipping corrupt row {} in {}: {}", line_num + 2, path.display(), e);
                }
            }
        }
    }

    if errors > 3 {
        warn!("{} total corrupt rows skipped in {}", errors, path.display());
    }

    Ok(rows)
}
