//! Progress tracking and display
//!
//! Upload progress is kept per file in a [`ProgressMap`] that is published with the
//! gallery state. Display concerns live behind the [`ProgressReporter`] trait so the
//! orchestrator stays decoupled from the terminal.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use indexmap::IndexMap;

use crate::record::FileId;

/// Percent complete of every in-flight upload, keyed by catalog id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressMap(IndexMap<FileId, u8>);

impl ProgressMap {
    pub fn get(&self, id: FileId) -> Option<u8> {
        self.0.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, u8)> + '_ {
        self.0.iter().map(|(id, percent)| (*id, *percent))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn set(&mut self, id: FileId, percent: u8) {
        self.0.insert(id, percent);
    }

    pub(crate) fn remove(&mut self, id: FileId) {
        self.0.shift_remove(&id);
    }
}

/// Status of a single file in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Extracting,
    Registering,
    Linking,
    Uploading { percent: u8 },
    Done,
    Failed(String),
}

/// Phase of the overall operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPhase {
    FetchingContext,
    Uploading,
    Removing,
    Completed,
    Failed(String),
}

/// Progress reporter trait - implement this for different display backends.
pub trait ProgressReporter {
    fn set_phase(&self, phase: BatchPhase);

    /// Register entries to track (call before processing starts).
    fn register_entries(&self, entries: Vec<String>);

    fn update_entry(&self, entry: &str, status: EntryStatus);

    /// Finish and clean up the display.
    fn finish(&self);
}

/// A no-op reporter for library callers that observe the gallery state instead.
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn set_phase(&self, _phase: BatchPhase) {}
    fn register_entries(&self, _entries: Vec<String>) {}
    fn update_entry(&self, _entry: &str, _status: EntryStatus) {}
    fn finish(&self) {}
}

#[derive(Debug, Default)]
struct Stats {
    total_entries: usize,
    successful_entries: usize,
    failed_entries: usize,
    start_time: Option<Instant>,
}

impl Stats {
    fn started() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record(&mut self, status: &EntryStatus) {
        match status {
            EntryStatus::Done => self.successful_entries += 1,
            EntryStatus::Failed(_) => self.failed_entries += 1,
            _ => {}
        }
    }

    fn print_summary(&self) {
        if self.total_entries == 0 {
            return;
        }
        let duration = self.start_time.map(|t| t.elapsed()).unwrap_or_default();
        eprintln!();
        eprintln!("   Files:      {} total", self.total_entries);
        eprintln!("   Uploaded:   {}", self.successful_entries);
        if self.failed_entries > 0 {
            eprintln!("   Failed:     {}", self.failed_entries);
        }
        eprintln!("   Duration:   {:.2}s", duration.as_secs_f64());
    }
}

fn phase_message(phase: &BatchPhase) -> String {
    match phase {
        BatchPhase::FetchingContext => "Fetching gallery...".to_string(),
        BatchPhase::Uploading => "Uploading files...".to_string(),
        BatchPhase::Removing => "Removing file...".to_string(),
        BatchPhase::Completed => "Completed!".to_string(),
        BatchPhase::Failed(e) => format!("Failed: {e}"),
    }
}

/// Plain line-oriented reporter for non-TTY stderr.
pub struct SimpleReporter {
    stats: RwLock<Stats>,
}

impl SimpleReporter {
    pub fn new() -> Self {
        Self {
            stats: RwLock::new(Stats::started()),
        }
    }
}

impl Default for SimpleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SimpleReporter {
    fn set_phase(&self, phase: BatchPhase) {
        eprintln!("{}", phase_message(&phase));
    }

    fn register_entries(&self, entries: Vec<String>) {
        if let Ok(mut stats) = self.stats.write() {
            stats.total_entries += entries.len();
        }
        eprintln!("   {} files queued", entries.len());
    }

    fn update_entry(&self, entry: &str, status: EntryStatus) {
        if let Ok(mut stats) = self.stats.write() {
            stats.record(&status);
        }
        match status {
            EntryStatus::Done => eprintln!("   ✓ {entry}"),
            EntryStatus::Failed(ref e) => eprintln!("   ✗ {entry}: {e}"),
            _ => {}
        }
    }

    fn finish(&self) {
        if let Ok(stats) = self.stats.read() {
            stats.print_summary();
        }
    }
}

/// Interactive reporter with one bar per in-flight file (for TTY).
pub struct FancyReporter {
    multi: indicatif::MultiProgress,
    phase_bar: indicatif::ProgressBar,
    entries: RwLock<HashMap<String, Option<indicatif::ProgressBar>>>,
    main_progress: RwLock<Option<indicatif::ProgressBar>>,
    stats: RwLock<Stats>,
}

impl FancyReporter {
    pub fn new() -> Self {
        let multi = indicatif::MultiProgress::new();
        let phase_bar = multi.add(indicatif::ProgressBar::new_spinner());
        phase_bar.set_style(
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
        );
        phase_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            phase_bar,
            entries: RwLock::new(HashMap::new()),
            main_progress: RwLock::new(None),
            stats: RwLock::new(Stats::started()),
        }
    }

    fn entry_bar(&self) -> indicatif::ProgressBar {
        let pb = self.multi.add(indicatif::ProgressBar::new(100));
        pb.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("   {bar:30.cyan/blue} {pos:>3}% {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        pb
    }

    fn status_detail(status: &EntryStatus) -> &'static str {
        match status {
            EntryStatus::Pending => "pending",
            EntryStatus::Extracting => "reading metadata",
            EntryStatus::Registering => "registering",
            EntryStatus::Linking => "linking to album",
            EntryStatus::Uploading { .. } => "uploading",
            EntryStatus::Done => "done",
            EntryStatus::Failed(_) => "failed",
        }
    }
}

impl Default for FancyReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for FancyReporter {
    fn set_phase(&self, phase: BatchPhase) {
        let msg = phase_message(&phase);
        if matches!(phase, BatchPhase::Completed | BatchPhase::Failed(_)) {
            self.phase_bar.finish_with_message(msg);
        } else {
            self.phase_bar.set_message(msg);
        }
    }

    fn register_entries(&self, entries: Vec<String>) {
        let total = entries.len();
        if let Ok(mut stats) = self.stats.write() {
            stats.total_entries += total;
        }

        let main_pb = self.multi.add(indicatif::ProgressBar::new(total as u64));
        main_pb.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("   {bar:40.cyan/blue} {pos}/{len} files")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        if let Ok(mut main_progress) = self.main_progress.write() {
            *main_progress = Some(main_pb);
        }

        // Bars are created on demand once a file starts moving
        if let Ok(mut map) = self.entries.write() {
            map.extend(entries.into_iter().map(|entry| (entry, None)));
        }
    }

    fn update_entry(&self, entry: &str, status: EntryStatus) {
        let Ok(mut map) = self.entries.write() else {
            return;
        };

        if matches!(status, EntryStatus::Done | EntryStatus::Failed(_)) {
            if let Some(Some(pb)) = map.remove(entry) {
                pb.finish_and_clear();
            }
            if let EntryStatus::Failed(ref e) = status {
                self.multi.println(format!("   ✗ {entry}: {e}")).ok();
            }
            if let Ok(main_progress) = self.main_progress.read()
                && let Some(main_pb) = main_progress.as_ref()
            {
                main_pb.inc(1);
            }
            if let Ok(mut stats) = self.stats.write() {
                stats.record(&status);
            }
            return;
        }

        if let Some(slot) = map.get_mut(entry) {
            let pb = slot.get_or_insert_with(|| self.entry_bar());
            if let EntryStatus::Uploading { percent } = status {
                pb.set_position(percent.into());
            }
            pb.set_message(format!("{entry}: {}", Self::status_detail(&status)));
        }
    }

    fn finish(&self) {
        if let Ok(map) = self.entries.read() {
            for pb in map.values().flatten() {
                pb.finish_and_clear();
            }
        }
        if let Ok(main_progress) = self.main_progress.read()
            && let Some(main_pb) = main_progress.as_ref()
        {
            main_pb.finish_and_clear();
        }
        self.phase_bar.finish_and_clear();
        if let Ok(stats) = self.stats.read() {
            stats.print_summary();
        }
    }
}

/// Create an appropriate reporter based on terminal capabilities.
pub fn create_reporter() -> Arc<dyn ProgressReporter> {
    use std::io::IsTerminal as _;
    if std::io::stderr().is_terminal() {
        Arc::new(FancyReporter::new())
    } else {
        Arc::new(SimpleReporter::new())
    }
}
