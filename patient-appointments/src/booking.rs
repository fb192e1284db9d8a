//! Slot booking and cancellation over the schedule grid and the ledger.
//!
//! Every change that touches both files is staged in the write-ahead journal
//! first. If the process dies between the schedule save and the ledger update,
//! the next `recover` finds the journal entry and rolls the change forward.

use tracing::{debug, info, warn};

use crate::config::{AppConfig, CancellationPolicy};
use crate::error::{BookingError, Result};
use crate::schedule::{
    list_open_slots, normalize_date, overlay_ledger, same_date, select, AppointmentRecord, OpenSlot, ScheduleRow,
    SlotMarker,
};
use crate::storage::{
    load_available, AppointmentLedger, AssignmentDirectory, CsvAssignments, CsvLedger, CsvScheduleStore, FileJournal,
    MemoryAssignments, MemoryJournal, MemoryLedger, MemoryScheduleStore, PendingWrite, ScheduleStore,
    WriteAheadJournal, WriteKind,
};

pub struct BookingService<S, L, A, J> {
    schedule: S,
    ledger: L,
    assignments: A,
    journal: J,
    policy: CancellationPolicy,
}

pub type FileBookingService = BookingService<CsvScheduleStore, CsvLedger, CsvAssignments, FileJournal>;
pub type MemoryBookingService = BookingService<MemoryScheduleStore, MemoryLedger, MemoryAssignments, MemoryJournal>;

impl FileBookingService {
    pub fn from_config(config: &AppConfig) -> Self {
        BookingService::new(
            config.schedule_store(),
            config.ledger(),
            config.assignments(),
            config.journal(),
            config.cancellation,
        )
    }
}

/// Distinct practitioners in first-seen order
fn practitioners(records: &[AppointmentRecord]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in records {
        if !names.contains(&record.mhwp_username) {
            names.push(record.mhwp_username.clone());
        }
    }
    names
}

impl<S, L, A, J> BookingService<S, L, A, J>
where
    S: ScheduleStore,
    L: AppointmentLedger,
    A: AssignmentDirectory,
    J: WriteAheadJournal,
{
    pub fn new(schedule: S, ledger: L, assignments: A, journal: J, policy: CancellationPolicy) -> Self {
        BookingService {
            schedule,
            ledger,
            assignments,
            journal,
            policy,
        }
    }

    pub fn schedule_store(&self) -> &S {
        &self.schedule
    }

    #[cfg(test)]
    pub(crate) fn schedule_store_mut(&mut self) -> &mut S {
        &mut self.schedule
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    #[cfg(test)]
    pub(crate) fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    /// The practitioner the patient is assigned to
    pub fn assigned_mhwp(&self, patient_username: &str) -> Result<String> {
        self.assignments
            .get_assigned_mhwp(patient_username)?
            .ok_or_else(|| BookingError::NotFound(format!("no MHWP assigned to {}", patient_username)))
    }

    /// The practitioner's grid with ledger-held cells shown as booked
    pub fn available_schedule(&self, mhwp_username: &str) -> Result<Vec<ScheduleRow>> {
        let rows = load_available(&self.schedule, &self.ledger, mhwp_username)?;
        if rows.is_empty() {
            return Err(BookingError::NotFound(format!("no schedule found for MHWP {}", mhwp_username)));
        }
        Ok(rows)
    }

    /// The practitioner's row for one date, as offered to patients
    pub fn day_schedule(&self, mhwp_username: &str, date: &str) -> Result<ScheduleRow> {
        let date = normalize_date(date)?;
        self.available_schedule(mhwp_username)?
            .into_iter()
            .find(|row| same_date(&row.date, &date))
            .ok_or_else(|| BookingError::NotFound(format!("no schedule found for {}", date)))
    }

    pub fn open_slots(&self, mhwp_username: &str, date: &str) -> Result<Vec<OpenSlot>> {
        let row = self.day_schedule(mhwp_username, date)?;
        Ok(list_open_slots(&row))
    }

    pub fn appointments_for(&self, patient_username: &str) -> Result<Vec<AppointmentRecord>> {
        self.ledger.list_for_patient(patient_username)
    }

    /// Books the chosen column indices on `date` with the patient's practitioner.
    /// Validation failures write nothing. Returns the new ledger records.
    pub fn book(&mut self, patient_username: &str, date: &str, chosen: &[usize]) -> Result<Vec<AppointmentRecord>> {
        self.recover()?;

        let mhwp_username = self.assigned_mhwp(patient_username)?;
        let date = normalize_date(date)?;

        let mut rows = self.schedule.load_all_for(&mhwp_username)?;
        let held = self.ledger.list_for_mhwp(&mhwp_username)?;
        let position = rows
            .iter()
            .position(|row| same_date(&row.date, &date))
            .ok_or_else(|| BookingError::NotFound(format!("no schedule found for {}", date)))?;

        // Validate against what the patient was offered
        let mut offered = rows[position].clone();
        overlay_ledger(std::slice::from_mut(&mut offered), &held);
        let booked = select(&mut offered, chosen)?;
        if booked.is_empty() {
            debug!(patient = patient_username, "empty selection, nothing booked");
            return Ok(Vec::new());
        }

        for slot in &booked {
            rows[position].set_marker(&slot.slot_name, SlotMarker::Booked);
        }
        let records: Vec<AppointmentRecord> = booked
            .iter()
            .map(|slot| AppointmentRecord::new(patient_username, &mhwp_username, &date, &slot.slot_name))
            .collect();

        let pending = PendingWrite {
            kind: WriteKind::Book,
            records,
        };
        self.journal.stage(&pending)?;
        if let Err(err) = self.schedule.save(&mhwp_username, &rows) {
            // The grid is replaced atomically, so a failed save left nothing to roll forward
            self.journal.clear()?;
            return Err(err);
        }
        self.ledger.append(&pending.records)?;
        self.journal.clear()?;

        info!(
            patient = patient_username,
            mhwp = %mhwp_username,
            date = %rows[position].date,
            slots = ?booked.iter().map(|b| b.slot_name.as_str()).collect::<Vec<_>>(),
            "appointment booked"
        );
        Ok(pending.records)
    }

    /// Removes the patient's booking for (date, slot). True iff a ledger record went.
    pub fn cancel(&mut self, patient_username: &str, date: &str, time_slot: &str) -> Result<bool> {
        self.recover()?;

        let date = normalize_date(date)?;
        let time_slot = time_slot.trim();

        let matching: Vec<AppointmentRecord> = self
            .ledger
            .list_for_patient(patient_username)?
            .into_iter()
            .filter(|record| record.matches(patient_username, &date, time_slot))
            .collect();
        if matching.is_empty() {
            warn!(patient = patient_username, %date, time_slot, "no matching appointment to cancel");
            return Ok(false);
        }

        let pending = PendingWrite {
            kind: WriteKind::Cancel,
            records: matching,
        };
        self.journal.stage(&pending)?;
        let removed = self.ledger.remove_matching(patient_username, &date, time_slot)?;
        self.release_cells(&pending.records)?;
        self.journal.clear()?;

        info!(patient = patient_username, %date, time_slot, removed, policy = ?self.policy, "appointment cancelled");
        Ok(removed > 0)
    }

    /// Finishes a write that was interrupted between the schedule and the ledger.
    /// Returns the entry that was completed, if any.
    pub fn recover(&mut self) -> Result<Option<PendingWrite>> {
        let Some(pending) = self.journal.pending()? else {
            return Ok(None);
        };
        warn!(kind = ?pending.kind, records = pending.records.len(), "completing interrupted write");

        match pending.kind {
            WriteKind::Book => {
                for mhwp_username in practitioners(&pending.records) {
                    let mut rows = match self.schedule.load_all_for(&mhwp_username) {
                        Ok(rows) => rows,
                        Err(BookingError::FileNotFound { path }) => {
                            // The grid was never written, so the booking never happened
                            warn!(path = %path.display(), "schedule missing, discarding interrupted booking");
                            self.journal.clear()?;
                            return Ok(None);
                        }
                        Err(e) => return Err(e),
                    };
                    for record in pending.records.iter().filter(|r| r.mhwp_username == mhwp_username) {
                        if let Some(row) = rows.iter_mut().find(|row| same_date(&row.date, &record.date)) {
                            row.set_marker(&record.time_slot, SlotMarker::Booked);
                        }
                    }
                    self.schedule.save(&mhwp_username, &rows)?;
                }

                let existing = self.ledger.list_all()?;
                let missing: Vec<AppointmentRecord> = pending
                    .records
                    .iter()
                    .filter(|record| !existing.contains(record))
                    .cloned()
                    .collect();
                self.ledger.append(&missing)?;
            }
            WriteKind::Cancel => {
                for record in &pending.records {
                    self.ledger
                        .remove_matching(&record.patient_username, &record.date, &record.time_slot)?;
                }
                self.release_cells(&pending.records)?;
            }
        }

        self.journal.clear()?;
        info!(kind = ?pending.kind, "interrupted write completed");
        Ok(Some(pending))
    }

    /// Reopens the cells of cancelled records unless the policy keeps them held
    /// or another ledger record still claims the same cell
    fn release_cells(&mut self, cancelled: &[AppointmentRecord]) -> Result<()> {
        if self.policy == CancellationPolicy::LedgerOnly {
            return Ok(());
        }

        for mhwp_username in practitioners(cancelled) {
            let mut rows = match self.schedule.load_all_for(&mhwp_username) {
                Ok(rows) => rows,
                Err(BookingError::FileNotFound { path }) => {
                    warn!(path = %path.display(), "schedule missing, cannot reopen cancelled slots");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let still_held = self.ledger.list_for_mhwp(&mhwp_username)?;

            let mut changed = false;
            for record in cancelled.iter().filter(|r| r.mhwp_username == mhwp_username) {
                let claimed = still_held
                    .iter()
                    .any(|held| held.time_slot == record.time_slot && same_date(&held.date, &record.date));
                if claimed {
                    continue;
                }
                if let Some(row) = rows.iter_mut().find(|row| same_date(&row.date, &record.date)) {
                    changed |= row.set_marker(&record.time_slot, SlotMarker::Open);
                }
            }
            if changed {
                self.schedule.save(&mhwp_username, &rows)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::schedule::SlotMarker::{Booked, Open};

    fn smith_grid() -> Vec<ScheduleRow> {
        vec![
            ScheduleRow::new(
                "drsmith",
                "2024/03/01",
                &[("09:00", Open), ("10:00", Open), ("11:00", Booked)],
            ),
            ScheduleRow::new(
                "drsmith",
                "2024/03/02",
                &[("09:00", Open), ("10:00", Open), ("11:00", Open)],
            ),
        ]
    }

    fn service(policy: CancellationPolicy) -> MemoryBookingService {
        BookingService::new(
            MemoryScheduleStore::with_rows(smith_grid()),
            MemoryLedger::default(),
            MemoryAssignments::new(&[("alice", "drsmith"), ("bob", "drsmith")]),
            MemoryJournal::default(),
            policy,
        )
    }

    fn stored_marker(svc: &MemoryBookingService, date: &str, slot: &str) -> Option<SlotMarker> {
        svc.schedule_store()
            .rows()
            .iter()
            .find(|r| r.date == date)
            .and_then(|r| r.marker(slot))
    }

    #[test]
    fn alice_books_two_slots() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);

        let records = svc.book("alice", "2024/03/01", &[0, 1]).unwrap();

        assert_eq!(
            records,
            vec![
                AppointmentRecord::new("alice", "drsmith", "2024/03/01", "09:00"),
                AppointmentRecord::new("alice", "drsmith", "2024/03/01", "10:00"),
            ]
        );
        assert_eq!(stored_marker(&svc, "2024/03/01", "09:00"), Some(Booked));
        assert_eq!(stored_marker(&svc, "2024/03/01", "10:00"), Some(Booked));
        assert_eq!(svc.ledger().list_all().unwrap(), records);
        assert!(svc.open_slots("drsmith", "2024/03/01").unwrap().is_empty());
        assert_eq!(svc.journal().pending().unwrap(), None);
    }

    #[test]
    fn invalid_selection_changes_nothing() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);

        let err = svc.book("alice", "2024/03/01", &[2]).unwrap_err();
        assert!(matches!(
            err,
            BookingError::Validation(ValidationError::SlotNotOpen { index: 2, .. })
        ));

        let err = svc.book("alice", "2024/03/02", &[0, 1, 2]).unwrap_err();
        assert!(err.is_validation());

        assert_eq!(svc.schedule_store().rows(), smith_grid().as_slice());
        assert!(svc.ledger().list_all().unwrap().is_empty());
    }

    #[test]
    fn dash_dates_are_accepted() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        let records = svc.book("alice", "2024-03-02", &[2]).unwrap();
        assert_eq!(records[0].date, "2024/03/02");
    }

    #[test]
    fn ledger_held_slot_is_not_offered_even_if_grid_says_open() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        svc.ledger_mut()
            .append(&[AppointmentRecord::new("bob", "drsmith", "2024/03/02", "09:00")])
            .unwrap();

        let open: Vec<usize> = svc
            .open_slots("drsmith", "2024/03/02")
            .unwrap()
            .iter()
            .map(|s| s.index)
            .collect();
        assert_eq!(open, vec![1, 2]);
        assert!(svc.book("alice", "2024/03/02", &[0]).unwrap_err().is_validation());
    }

    #[test]
    fn unassigned_patient_and_unknown_date_are_not_found() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        assert!(matches!(svc.book("carol", "2024/03/01", &[0]), Err(BookingError::NotFound(_))));
        assert!(matches!(svc.book("alice", "2024/04/01", &[0]), Err(BookingError::NotFound(_))));
    }

    #[test]
    fn missing_schedule_aborts_booking() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        svc.schedule_store_mut().missing = true;
        assert!(matches!(
            svc.book("alice", "2024/03/01", &[0]),
            Err(BookingError::FileNotFound { .. })
        ));
    }

    #[test]
    fn cancel_removes_one_record() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        svc.book("alice", "2024/03/01", &[0, 1]).unwrap();

        assert!(svc.cancel("alice", "2024/03/01", "09:00").unwrap());
        let left = svc.appointments_for("alice").unwrap();
        assert_eq!(left, vec![AppointmentRecord::new("alice", "drsmith", "2024/03/01", "10:00")]);
    }

    #[test]
    fn cancel_of_unknown_booking_is_false_and_harmless() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        svc.book("alice", "2024/03/01", &[0]).unwrap();
        let before = svc.ledger().list_all().unwrap();

        assert!(!svc.cancel("alice", "2024/03/01", "10:00").unwrap());
        assert!(!svc.cancel("bob", "2024/03/01", "09:00").unwrap());
        assert_eq!(svc.ledger().list_all().unwrap(), before);
        assert_eq!(svc.journal().pending().unwrap(), None);
    }

    #[test]
    fn cancelled_slot_is_offered_again() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        svc.book("alice", "2024/03/01", &[0]).unwrap();
        svc.cancel("alice", "2024/03/01", "09:00").unwrap();

        assert_eq!(stored_marker(&svc, "2024/03/01", "09:00"), Some(Open));
        let open: Vec<usize> = svc
            .open_slots("drsmith", "2024/03/01")
            .unwrap()
            .iter()
            .map(|s| s.index)
            .collect();
        assert_eq!(open, vec![0, 1]);
    }

    #[test]
    fn ledger_only_policy_keeps_cancelled_slot_held() {
        let mut svc = service(CancellationPolicy::LedgerOnly);
        svc.book("alice", "2024/03/01", &[0]).unwrap();
        assert!(svc.cancel("alice", "2024/03/01", "09:00").unwrap());

        // the grid still says booked although nobody holds the slot
        assert!(svc.appointments_for("alice").unwrap().is_empty());
        assert_eq!(stored_marker(&svc, "2024/03/01", "09:00"), Some(Booked));
        let open: Vec<usize> = svc
            .open_slots("drsmith", "2024/03/01")
            .unwrap()
            .iter()
            .map(|s| s.index)
            .collect();
        assert_eq!(open, vec![1]);
    }

    #[test]
    fn crash_between_writes_is_rolled_forward() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        svc.ledger_mut().fail_next_append = true;

        assert!(matches!(svc.book("alice", "2024/03/02", &[1]), Err(BookingError::Io(_))));
        // schedule written, ledger not: the journal still has the intent
        assert_eq!(stored_marker(&svc, "2024/03/02", "10:00"), Some(Booked));
        assert!(svc.ledger().list_all().unwrap().is_empty());
        assert!(svc.journal().pending().unwrap().is_some());

        let completed = svc.recover().unwrap().unwrap();
        assert_eq!(completed.kind, WriteKind::Book);
        assert_eq!(
            svc.ledger().list_all().unwrap(),
            vec![AppointmentRecord::new("alice", "drsmith", "2024/03/02", "10:00")]
        );
        assert_eq!(svc.recover().unwrap(), None);
    }

    #[test]
    fn next_operation_recovers_first() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        svc.ledger_mut().fail_next_append = true;
        let _ = svc.book("alice", "2024/03/02", &[0]);

        svc.book("bob", "2024/03/02", &[1]).unwrap();
        let all = svc.ledger().list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].patient_username, "alice");
    }

    #[test]
    fn booking_on_dash_dated_grid_can_be_cancelled() {
        let grid = vec![ScheduleRow::new("drsmith", "2024-03-01", &[("09:00", Open), ("10:00", Open)])];
        let mut svc = BookingService::new(
            MemoryScheduleStore::with_rows(grid),
            MemoryLedger::default(),
            MemoryAssignments::new(&[("alice", "drsmith")]),
            MemoryJournal::default(),
            CancellationPolicy::ReleaseSlot,
        );

        let records = svc.book("alice", "2024/03/01", &[0]).unwrap();
        assert_eq!(records[0].date, "2024/03/01");
        assert_eq!(stored_marker(&svc, "2024-03-01", "09:00"), Some(Booked));
        assert_eq!(svc.open_slots("drsmith", "2024-03-01").unwrap().len(), 1);

        assert!(svc.cancel("alice", "2024-03-01", "09:00").unwrap());
        assert!(svc.appointments_for("alice").unwrap().is_empty());
        assert_eq!(stored_marker(&svc, "2024-03-01", "09:00"), Some(Open));
    }

    #[test]
    fn failed_schedule_save_leaves_no_pending_write() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        svc.schedule_store_mut().fail_next_save = true;

        assert!(matches!(svc.book("alice", "2024/03/01", &[0]), Err(BookingError::Io(_))));
        assert_eq!(svc.journal().pending().unwrap(), None);
        assert_eq!(svc.schedule_store().rows(), smith_grid().as_slice());

        // the patient was told it failed, so the next action must not book it
        svc.book("bob", "2024/03/02", &[0]).unwrap();
        assert!(svc.appointments_for("alice").unwrap().is_empty());
    }

    #[test]
    fn stale_booking_without_schedule_does_not_block_cancel() {
        let mut svc = BookingService::new(
            MemoryScheduleStore::default(),
            MemoryLedger::with_records(vec![AppointmentRecord::new("alice", "drsmith", "2024/03/01", "09:00")]),
            MemoryAssignments::new(&[("alice", "drsmith")]),
            MemoryJournal::default(),
            CancellationPolicy::LedgerOnly,
        );
        svc.schedule_store_mut().missing = true;
        svc.journal
            .stage(&PendingWrite {
                kind: WriteKind::Book,
                records: vec![AppointmentRecord::new("alice", "drsmith", "2024/03/01", "10:00")],
            })
            .unwrap();

        assert!(svc.cancel("alice", "2024/03/01", "09:00").unwrap());
        assert!(svc.appointments_for("alice").unwrap().is_empty());
        assert_eq!(svc.journal().pending().unwrap(), None);
    }

    #[test]
    fn empty_selection_writes_nothing() {
        let mut svc = service(CancellationPolicy::ReleaseSlot);
        assert!(svc.book("alice", "2024/03/01", &[]).unwrap().is_empty());
        assert!(svc.ledger().list_all().unwrap().is_empty());
        assert_eq!(svc.schedule_store().rows(), smith_grid().as_slice());
    }
}
