//! In-memory stores with the same semantics as the CSV files.
//! Used by tests and by anything that wants to drive the booking service without disk.

use std::io;

use crate::error::{BookingError, Result};
use crate::schedule::{AppointmentRecord, Assignment, ScheduleRow};
use super::{merge_rows, AppointmentLedger, AssignmentDirectory, PendingWrite, ScheduleStore, WriteAheadJournal};

#[derive(Debug, Clone, Default)]
pub struct MemoryScheduleStore {
    rows: Vec<ScheduleRow>,
    /// When set, loads behave like a missing schedule file
    pub missing: bool,
    /// Makes the next `save` fail without touching the rows
    pub fail_next_save: bool,
}

impl MemoryScheduleStore {
    pub fn with_rows(rows: Vec<ScheduleRow>) -> Self {
        MemoryScheduleStore {
            rows,
            missing: false,
            fail_next_save: false,
        }
    }

    pub fn rows(&self) -> &[ScheduleRow] {
        &self.rows
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn load_all_for(&self, mhwp_username: &str) -> Result<Vec<ScheduleRow>> {
        if self.missing {
            return Err(BookingError::FileNotFound {
                path: "mhwp_schedule.csv".into(),
            });
        }
        Ok(self
            .rows
            .iter()
            .filter(|row| row.mhwp_username == mhwp_username)
            .cloned()
            .collect())
    }

    fn save(&mut self, mhwp_username: &str, rows: &[ScheduleRow]) -> Result<()> {
        if self.fail_next_save {
            self.fail_next_save = false;
            return Err(BookingError::Io(io::Error::new(io::ErrorKind::Other, "schedule unavailable")));
        }
        let existing = std::mem::take(&mut self.rows);
        self.rows = merge_rows(existing, mhwp_username, rows);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Vec<AppointmentRecord>,
    /// Makes the next `append` fail, standing in for a crash between the two writes
    pub fail_next_append: bool,
}

impl MemoryLedger {
    pub fn with_records(records: Vec<AppointmentRecord>) -> Self {
        MemoryLedger {
            records,
            fail_next_append: false,
        }
    }
}

impl AppointmentLedger for MemoryLedger {
    fn append(&mut self, records: &[AppointmentRecord]) -> Result<()> {
        if self.fail_next_append {
            self.fail_next_append = false;
            return Err(BookingError::Io(io::Error::new(io::ErrorKind::Other, "ledger unavailable")));
        }
        self.records.extend(records.iter().cloned());
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<AppointmentRecord>> {
        Ok(self.records.clone())
    }

    fn remove_matching(&mut self, patient_username: &str, date: &str, time_slot: &str) -> Result<usize> {
        let before = self.records.len();
        self.records
            .retain(|record| !record.matches(patient_username, date, time_slot));
        Ok(before - self.records.len())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAssignments {
    assignments: Vec<Assignment>,
}

impl MemoryAssignments {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        MemoryAssignments {
            assignments: pairs
                .iter()
                .map(|(patient, mhwp)| Assignment {
                    patient_username: patient.to_string(),
                    mhwp_username: mhwp.to_string(),
                })
                .collect(),
        }
    }
}

impl AssignmentDirectory for MemoryAssignments {
    fn get_assigned_mhwp(&self, patient_username: &str) -> Result<Option<String>> {
        Ok(self
            .assignments
            .iter()
            .find(|a| a.patient_username == patient_username)
            .map(|a| a.mhwp_username.clone()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    entry: Option<PendingWrite>,
}

impl WriteAheadJournal for MemoryJournal {
    fn stage(&mut self, entry: &PendingWrite) -> Result<()> {
        if self.entry.is_some() {
            return Err(BookingError::Conflict("an unfinished booking is pending".to_string()));
        }
        self.entry = Some(entry.clone());
        Ok(())
    }

    fn pending(&self) -> Result<Option<PendingWrite>> {
        Ok(self.entry.clone())
    }

    fn clear(&mut self) -> Result<()> {
        self.entry = None;
        Ok(())
    }
}
