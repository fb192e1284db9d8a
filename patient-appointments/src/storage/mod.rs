//! Storage seams for the booking core.
//!
//! Each flat file sits behind a small trait so the booking service can run
//! against the CSV files in production and against in-memory doubles in tests.

pub mod csv_files;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schedule::{overlay_ledger, AppointmentRecord, ScheduleRow};

pub use csv_files::{CsvAssignments, CsvLedger, CsvScheduleStore, FileJournal};
pub use memory::{MemoryAssignments, MemoryJournal, MemoryLedger, MemoryScheduleStore};

/// Per-practitioner weekly slot grids
pub trait ScheduleStore {
    /// Every row for the practitioner, in stored order, unfiltered
    fn load_all_for(&self, mhwp_username: &str) -> Result<Vec<ScheduleRow>>;

    /// Replaces the practitioner's full row set. Rows of other practitioners are kept.
    fn save(&mut self, mhwp_username: &str, rows: &[ScheduleRow]) -> Result<()>;
}

/// Log of confirmed bookings
pub trait AppointmentLedger {
    fn append(&mut self, records: &[AppointmentRecord]) -> Result<()>;

    /// All records in ledger order. An absent ledger is empty.
    fn list_all(&self) -> Result<Vec<AppointmentRecord>>;

    /// Drops every record matching (patient, date, slot) and returns how many went
    fn remove_matching(&mut self, patient_username: &str, date: &str, time_slot: &str) -> Result<usize>;

    fn list_for_patient(&self, patient_username: &str) -> Result<Vec<AppointmentRecord>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|record| record.patient_username == patient_username)
            .collect())
    }

    fn list_for_mhwp(&self, mhwp_username: &str) -> Result<Vec<AppointmentRecord>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|record| record.mhwp_username == mhwp_username)
            .collect())
    }
}

pub trait AssignmentDirectory {
    /// First assignment row for the patient wins
    fn get_assigned_mhwp(&self, patient_username: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Book,
    Cancel,
}

/// A two-file update staged before either file is touched.
/// `records` are the ledger rows being added (book) or removed (cancel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub kind: WriteKind,
    pub records: Vec<AppointmentRecord>,
}

/// Staging area that makes the schedule + ledger update recoverable
pub trait WriteAheadJournal {
    /// Fails with `Conflict` if another write is still pending
    fn stage(&mut self, entry: &PendingWrite) -> Result<()>;
    fn pending(&self) -> Result<Option<PendingWrite>>;
    fn clear(&mut self) -> Result<()>;
}

/// Practitioner rows with every cell already held in the ledger shown as booked
pub fn load_available<S, L>(schedule: &S, ledger: &L, mhwp_username: &str) -> Result<Vec<ScheduleRow>>
where
    S: ScheduleStore + ?Sized,
    L: AppointmentLedger + ?Sized,
{
    let mut rows = schedule.load_all_for(mhwp_username)?;
    let held = ledger.list_for_mhwp(mhwp_username)?;
    overlay_ledger(&mut rows, &held);
    Ok(rows)
}

/// Replaces `mhwp_username`'s rows inside `existing` with `rows`.
/// Rows are matched by date and keep their stored position; new dates go to the end.
pub(crate) fn merge_rows(existing: Vec<ScheduleRow>, mhwp_username: &str, rows: &[ScheduleRow]) -> Vec<ScheduleRow> {
    let mut pending: Vec<Option<&ScheduleRow>> = rows.iter().map(Some).collect();
    let mut merged = Vec::with_capacity(existing.len() + rows.len());

    for row in existing {
        if row.mhwp_username != mhwp_username {
            merged.push(row);
            continue;
        }
        let replacement = pending
            .iter_mut()
            .find(|slot| slot.map(|r| r.date == row.date).unwrap_or(false))
            .and_then(|slot| slot.take());
        if let Some(replacement) = replacement {
            merged.push(replacement.clone());
        }
    }

    merged.extend(pending.into_iter().flatten().cloned());
    merged
}
