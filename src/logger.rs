use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::harvest::{CategoryReport, RunSummary};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,   // Only progress bar and final summary
    Summary = 1,  // Per-category progress (default)
    Detailed = 2, // Degraded paths, per-category failures
    Debug = 3,    // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }

    /// Diagnostic level for the crate's `tracing` output at this verbosity.
    pub fn tracing_level(&self) -> &'static str {
        match self {
            VerbosityLevel::Silent => "warn",
            VerbosityLevel::Summary => "info",
            VerbosityLevel::Detailed => "debug",
            VerbosityLevel::Debug => "trace",
        }
    }
}

/// Map a `--log` value (DEBUG, INFO, WARNING, ERROR, any case) to a tracing level.
pub fn parse_log_level(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}

/// Install the fmt subscriber. `RUST_LOG` wins over the given level.
pub fn init_tracing(level: &str, writer: BarWriter) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("mapharvest={},headless_chrome=warn", level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

/// `MakeWriter` for tracing output that keeps the progress bar intact.
/// Each event is buffered and written to stderr in one piece, with the bar
/// suspended while it prints.
#[derive(Clone)]
pub struct BarWriter {
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
}

impl<'a> MakeWriter<'a> for BarWriter {
    type Writer = BarLine;

    fn make_writer(&'a self) -> Self::Writer {
        BarLine {
            progress_bar: Arc::clone(&self.progress_bar),
            buf: Vec::new(),
        }
    }
}

/// One formatted event, flushed on drop.
pub struct BarLine {
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    buf: Vec<u8>,
}

impl Write for BarLine {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BarLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let emit = |buf: &[u8]| {
            let mut stderr = io::stderr().lock();
            let _ = stderr.write_all(buf);
            let _ = stderr.flush();
        };
        if let Ok(guard) = self.progress_bar.read() {
            if let Some(pb) = guard.as_ref() {
                pb.suspend(|| emit(&self.buf));
                return;
            }
        }
        emit(&self.buf);
    }
}

#[derive(Clone)]
pub struct HarvestLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    run_metadata: Arc<Mutex<RunMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<PathBuf>,
}

#[derive(Default, Clone)]
struct RunMetadata {
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    location: String,
    output_file: String,
    resumed_uniques: usize,
}

impl HarvestLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            run_metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: impl Into<PathBuf>) -> Self {
        Self {
            log_file_path: Some(log_file_path.into()),
            ..Self::new(verbosity)
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    /// Always shown.
    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", Local::now().format("%H:%M:%S%.3f"), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Route through the bar so it is redrawn below the message
        if let Ok(guard) = self.progress_bar.read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    /// Writer for the tracing subscriber that shares this logger's bar.
    pub fn tracing_writer(&self) -> BarWriter {
        BarWriter {
            progress_bar: Arc::clone(&self.progress_bar),
        }
    }

    // Progress bar over categories

    pub fn start_progress(&self, total_categories: u64) {
        let pb = ProgressBar::new(total_categories);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} categories {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("starting browser...");

        if let Ok(mut guard) = self.progress_bar.write() {
            *guard = Some(pb);
        }
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.start_time = Some(Instant::now());
        }
    }

    pub fn update_progress(&self, message: &str) {
        if let Ok(guard) = self.progress_bar.read() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(message.to_string());
            }
        }
    }

    pub fn advance_progress(&self, steps: u64) {
        if let Ok(guard) = self.progress_bar.read() {
            if let Some(pb) = guard.as_ref() {
                pb.inc(steps);
            }
        }
    }

    pub fn finish_progress(&self, final_message: &str) {
        if let Ok(mut guard) = self.progress_bar.write() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.end_time = Some(Instant::now());
        }
        self.info(final_message);
    }

    // Run events

    pub fn log_run_start(&self, categories: usize, location: &str, output: &Path) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.location = location.to_string();
            metadata.output_file = output.display().to_string();
        }
        self.info(&format!(
            "Harvesting {} categor{} in '{}' into {}",
            categories,
            if categories == 1 { "y" } else { "ies" },
            location,
            output.display()
        ));
    }

    pub fn log_resume(&self, uniques: usize, output: &Path) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.resumed_uniques = uniques;
        }
        self.info(&format!("Loaded {} existing uniques from {}", uniques, output.display()));
    }

    pub fn log_category_start(&self, index: usize, total: usize, category: &str) {
        self.update_progress(category);
        self.debug(&format!("Category {}/{}: {}", index, total, category));
    }

    pub fn log_category_report(&self, report: &CategoryReport) {
        self.info(&format!(
            "{}: {} cards, {} written, {} duplicates, {} faults{}",
            report.category,
            report.cards_found,
            report.written,
            report.duplicates,
            report.faults,
            report.stop.map(|s| format!(" (scroll stopped: {})", s)).unwrap_or_default()
        ));
        self.advance_progress(1);
    }

    pub fn log_category_retry(&self, category: &str, error: &str) {
        self.warn(&format!(
            "Driver error while harvesting '{}': {}. Recycling browser and retrying once.",
            category, error
        ));
    }

    pub fn log_category_failed(&self, category: &str, error: &str) {
        self.error(&format!("Skipping category '{}': {}", category, error));
        self.advance_progress(1);
    }

    pub fn print_final_summary(&self, summary: &RunSummary) {
        let metadata = match self.run_metadata.lock() {
            Ok(m) => m.clone(),
            Err(_) => RunMetadata::default(),
        };

        // Clear any leftover progress bar line
        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!("\n=== HARVEST SUMMARY ===");
        if let (Some(start), Some(end)) = (metadata.start_time, metadata.end_time) {
            println!("Duration: {:.2}s", end.duration_since(start).as_secs_f64());
        }
        if !metadata.location.is_empty() {
            println!("Location: {}", metadata.location);
        }
        println!("Categories Attempted: {}", summary.categories_attempted);
        println!("Categories Failed: {}", summary.categories_failed.len());
        for category in &summary.categories_failed {
            println!("  - {}", category);
        }
        println!("Cards Attempted: {}", summary.cards_attempted);
        println!("Rows Written: {}", summary.written);
        println!("Duplicates Skipped: {}", summary.duplicates);
        println!("Card Faults: {}", summary.faults);
        if metadata.resumed_uniques > 0 {
            println!("Resumed With: {} known places", metadata.resumed_uniques);
        }
        if !metadata.output_file.is_empty() {
            println!("Output: {}", metadata.output_file);
        }
        println!("=======================\n");

        if summary.interrupted {
            println!("⚠️  Run interrupted. Rows written so far are saved; rerun to resume.");
        } else if summary.written > 0 {
            println!("✅ Harvest completed. {} new rows written.", summary.written);
        } else {
            println!("✅ Harvest completed. No new rows written.");
        }
    }

    /// Write every buffered message to the log file, if one was configured.
    pub fn export_logs(&self) -> anyhow::Result<()> {
        let Some(path) = &self.log_file_path else {
            return Ok(());
        };
        let buffer = self
            .log_buffer
            .lock()
            .map_err(|_| anyhow::anyhow!("log buffer lock poisoned"))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        for entry in buffer.iter() {
            writeln!(file, "{}", entry)?;
        }
        file.flush()?;
        Ok(())
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}
