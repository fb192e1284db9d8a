use std::path::{Path, PathBuf};

use crate::storage::{CsvAssignments, CsvLedger, CsvScheduleStore, FileJournal};

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "data";

/// What a cancellation does to the practitioner's schedule grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancellationPolicy {
    /// Remove the ledger record and reopen the schedule cell
    #[default]
    ReleaseSlot,
    /// Remove the ledger record only; the cell stays booked
    LedgerOnly,
}

/// Locations of the flat files inside one data directory
#[derive(Debug, Clone)]
pub struct DataPaths {
    dir: PathBuf,
}

impl DataPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DataPaths { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn assignments(&self) -> PathBuf {
        self.dir.join("assignments.csv")
    }

    pub fn schedule(&self) -> PathBuf {
        self.dir.join("mhwp_schedule.csv")
    }

    pub fn appointments(&self) -> PathBuf {
        self.dir.join("appointments.csv")
    }

    pub fn mood(&self) -> PathBuf {
        self.dir.join("mood_entries.csv")
    }

    pub fn users(&self) -> PathBuf {
        self.dir.join("users.csv")
    }

    pub fn journal(&self) -> PathBuf {
        self.dir.join("booking.journal")
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        DataPaths::new(DEFAULT_DATA_DIR)
    }
}

/// Runtime settings shared by the menu, the one-shot commands and the web server
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub paths: DataPaths,
    pub cancellation: CancellationPolicy,
}

impl AppConfig {
    pub fn new(data_dir: impl Into<PathBuf>, keep_slot_held: bool) -> Self {
        AppConfig {
            paths: DataPaths::new(data_dir),
            cancellation: if keep_slot_held {
                CancellationPolicy::LedgerOnly
            } else {
                CancellationPolicy::ReleaseSlot
            },
        }
    }

    pub fn schedule_store(&self) -> CsvScheduleStore {
        CsvScheduleStore::new(self.paths.schedule())
    }

    pub fn ledger(&self) -> CsvLedger {
        CsvLedger::new(self.paths.appointments())
    }

    pub fn assignments(&self) -> CsvAssignments {
        CsvAssignments::new(self.paths.assignments())
    }

    pub fn journal(&self) -> FileJournal {
        FileJournal::new(self.paths.journal())
    }
}
