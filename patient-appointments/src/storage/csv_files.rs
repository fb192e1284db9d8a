use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{Reader, StringRecord, WriterBuilder};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{BookingError, Result};
use crate::schedule::{AppointmentRecord, Assignment, ScheduleRow, SlotCell, SlotMarker};
use super::{merge_rows, AppointmentLedger, AssignmentDirectory, PendingWrite, ScheduleStore, WriteAheadJournal};

pub const MHWP_COLUMN: &str = "mhwp_username";
pub const DATE_COLUMN: &str = "Date";

/// Canonical ledger header
pub const LEDGER_HEADER: [&str; 4] = ["patient_username", "mhwp_username", "Date", "time_slot"];

/// Writes a file through a temp file in the same directory and renames it into place,
/// so readers see either the old or the new contents
pub(crate) fn replace_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| BookingError::Io(e.error))?;
    Ok(())
}

fn require_file(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(BookingError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Schedule grid file: `mhwp_username, Date, <slot columns...>`
#[derive(Debug, Clone)]
pub struct CsvScheduleStore {
    path: PathBuf,
}

impl CsvScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvScheduleStore { path: path.into() }
    }

    /// Reads the header and every row of the file
    fn read_file(&self) -> Result<(StringRecord, Vec<ScheduleRow>)> {
        require_file(&self.path)?;
        let mut reader = Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();

        // Find column indices
        let mhwp_col = headers
            .iter()
            .position(|h| h.trim() == MHWP_COLUMN)
            .ok_or_else(|| BookingError::format(&self.path, "missing mhwp_username column"))?;
        let date_col = headers
            .iter()
            .position(|h| h.trim() == DATE_COLUMN)
            .ok_or_else(|| BookingError::format(&self.path, "missing Date column"))?;
        let slot_cols: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != mhwp_col && *idx != date_col)
            .map(|(idx, name)| (idx, name.trim().to_string()))
            .collect();
        debug!(columns = ?slot_cols.iter().map(|(_, n)| n.as_str()).collect::<Vec<_>>(), "schedule slot columns");

        let mut rows = Vec::new();
        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let mut slots = Vec::with_capacity(slot_cols.len());
            for (idx, name) in &slot_cols {
                let cell = record.get(*idx).unwrap_or("");
                let marker = SlotMarker::parse(cell).ok_or_else(|| {
                    BookingError::format(
                        &self.path,
                        format!("row {}: slot '{}' holds '{}'", line + 2, name, cell.trim()),
                    )
                })?;
                slots.push(SlotCell {
                    name: name.clone(),
                    marker,
                });
            }
            rows.push(ScheduleRow {
                mhwp_username: record.get(mhwp_col).unwrap_or("").trim().to_string(),
                date: record.get(date_col).unwrap_or("").trim().to_string(),
                slots,
            });
        }
        Ok((headers, rows))
    }

    fn write_file(&self, slot_names: &[String], rows: &[ScheduleRow]) -> Result<()> {
        let path = self.path.clone();
        replace_file(&self.path, |file| {
            let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);

            let mut header = vec![MHWP_COLUMN.to_string(), DATE_COLUMN.to_string()];
            header.extend(slot_names.iter().cloned());
            wtr.write_record(&header)?;

            for row in rows {
                let mut record = vec![row.mhwp_username.clone(), row.date.clone()];
                for name in slot_names {
                    let marker = row.marker(name).ok_or_else(|| {
                        BookingError::format(&path, format!("row for {} has no '{}' slot", row.date, name))
                    })?;
                    record.push(marker.as_str().to_string());
                }
                wtr.write_record(&record)?;
            }
            wtr.flush()?;
            Ok(())
        })
    }
}

impl ScheduleStore for CsvScheduleStore {
    fn load_all_for(&self, mhwp_username: &str) -> Result<Vec<ScheduleRow>> {
        let (_, rows) = self.read_file()?;
        Ok(rows
            .into_iter()
            .filter(|row| row.mhwp_username == mhwp_username)
            .collect())
    }

    fn save(&mut self, mhwp_username: &str, rows: &[ScheduleRow]) -> Result<()> {
        let (headers, existing) = self.read_file()?;
        let slot_names: Vec<String> = headers
            .iter()
            .map(|h| h.trim())
            .filter(|h| *h != MHWP_COLUMN && *h != DATE_COLUMN)
            .map(str::to_string)
            .collect();

        let merged = merge_rows(existing, mhwp_username, rows);
        self.write_file(&slot_names, &merged)
    }
}

/// Appointments ledger file
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvLedger { path: path.into() }
    }

    fn rewrite(&self, records: &[AppointmentRecord]) -> Result<()> {
        replace_file(&self.path, |file| {
            let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
            wtr.write_record(LEDGER_HEADER)?;
            for record in records {
                wtr.serialize(record)?;
            }
            wtr.flush()?;
            Ok(())
        })
    }

    fn has_canonical_header(&self) -> Result<bool> {
        let mut reader = Reader::from_path(&self.path)?;
        let headers = reader.headers()?;
        Ok(headers.iter().map(str::trim).eq(LEDGER_HEADER.iter().copied()))
    }
}

impl AppointmentLedger for CsvLedger {
    fn append(&mut self, records: &[AppointmentRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let file_exists = self.path.exists() && fs::metadata(&self.path)?.len() > 0;

        // Files written with the old `Slot` header are migrated on first write
        if file_exists && !self.has_canonical_header()? {
            warn!(path = %self.path.display(), "rewriting ledger with canonical header");
            let mut all = self.list_all()?;
            all.extend(records.iter().cloned());
            return self.rewrite(&all);
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        if !file_exists {
            wtr.write_record(LEDGER_HEADER)?;
        }
        for record in records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<AppointmentRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for result in reader.deserialize() {
            records.push(result?);
        }
        Ok(records)
    }

    fn remove_matching(&mut self, patient_username: &str, date: &str, time_slot: &str) -> Result<usize> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no ledger yet, nothing to remove");
            return Ok(0);
        }
        let all = self.list_all()?;
        let before = all.len();
        let kept: Vec<AppointmentRecord> = all
            .into_iter()
            .filter(|record| !record.matches(patient_username, date, time_slot))
            .collect();
        let removed = before - kept.len();

        // A miss leaves the file untouched
        if removed > 0 {
            self.rewrite(&kept)?;
        }
        Ok(removed)
    }
}

/// Patient to practitioner assignments file
#[derive(Debug, Clone)]
pub struct CsvAssignments {
    path: PathBuf,
}

impl CsvAssignments {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvAssignments { path: path.into() }
    }
}

impl AssignmentDirectory for CsvAssignments {
    fn get_assigned_mhwp(&self, patient_username: &str) -> Result<Option<String>> {
        require_file(&self.path)?;
        let mut reader = Reader::from_path(&self.path)?;
        for result in reader.deserialize() {
            let assignment: Assignment = result?;
            if assignment.patient_username.trim() == patient_username {
                return Ok(Some(assignment.mhwp_username.trim().to_string()));
            }
        }
        Ok(None)
    }
}

/// JSON staging file for a two-file update in flight
#[derive(Debug, Clone)]
pub struct FileJournal {
    path: PathBuf,
}

impl FileJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileJournal { path: path.into() }
    }
}

impl WriteAheadJournal for FileJournal {
    fn stage(&mut self, entry: &PendingWrite) -> Result<()> {
        if self.path.exists() {
            return Err(BookingError::Conflict(format!(
                "an unfinished booking is recorded in '{}'",
                self.path.display()
            )));
        }
        replace_file(&self.path, |file| {
            serde_json::to_writer_pretty(file, entry)?;
            Ok(())
        })
    }

    fn pending(&self) -> Result<Option<PendingWrite>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        Ok(Some(serde_json::from_reader(file)?))
    }

    fn clear(&mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::SlotMarker::{Booked, Open};
    use crate::storage::WriteKind;
    use tempfile::TempDir;

    const SCHEDULE: &str = "mhwp_username,Date,09:00,10:00,11:00\n\
                            drsmith,2024/03/01,⬜,⬜,⬛\n\
                            drjones,2024/03/01,⬜,⬛,⬜\n\
                            drsmith,2024/03/02,⬛,⬜,⬜\n";

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn schedule_rows_load_per_practitioner() {
        let dir = TempDir::new().unwrap();
        let store = CsvScheduleStore::new(write(&dir, "mhwp_schedule.csv", SCHEDULE));

        let rows = store.load_all_for("drsmith").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            ScheduleRow::new("drsmith", "2024/03/01", &[("09:00", Open), ("10:00", Open), ("11:00", Booked)])
        );
        assert!(store.load_all_for("nobody").unwrap().is_empty());
    }

    #[test]
    fn missing_schedule_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = CsvScheduleStore::new(dir.path().join("mhwp_schedule.csv"));
        assert!(matches!(
            store.load_all_for("drsmith"),
            Err(BookingError::FileNotFound { .. })
        ));
    }

    #[test]
    fn unknown_cell_value_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "mhwp_schedule.csv", "mhwp_username,Date,09:00\ndrsmith,2024/03/01,maybe\n");
        let store = CsvScheduleStore::new(path);
        assert!(matches!(store.load_all_for("drsmith"), Err(BookingError::Format { .. })));
    }

    #[test]
    fn saving_keeps_other_practitioners() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "mhwp_schedule.csv", SCHEDULE);
        let mut store = CsvScheduleStore::new(&path);

        let mut rows = store.load_all_for("drsmith").unwrap();
        rows[0].set_marker("09:00", Booked);
        store.save("drsmith", &rows).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "mhwp_username,Date,09:00,10:00,11:00\n\
             drsmith,2024/03/01,⬛,⬜,⬛\n\
             drjones,2024/03/01,⬜,⬛,⬜\n\
             drsmith,2024/03/02,⬛,⬜,⬜\n"
        );
    }

    #[test]
    fn ledger_is_created_with_header_on_first_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appointments.csv");
        let mut ledger = CsvLedger::new(&path);

        assert!(ledger.list_all().unwrap().is_empty());
        ledger
            .append(&[AppointmentRecord::new("alice", "drsmith", "2024/03/01", "09:00")])
            .unwrap();
        ledger
            .append(&[AppointmentRecord::new("alice", "drsmith", "2024/03/01", "10:00")])
            .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "patient_username,mhwp_username,Date,time_slot\n\
             alice,drsmith,2024/03/01,09:00\n\
             alice,drsmith,2024/03/01,10:00\n"
        );
    }

    #[test]
    fn legacy_slot_header_is_read_and_migrated() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "appointments.csv",
            "patient_username,mhwp_username,Date,Slot\nalice,drsmith,2024/03/01,09:00\n",
        );
        let mut ledger = CsvLedger::new(&path);

        assert_eq!(ledger.list_for_patient("alice").unwrap()[0].time_slot, "09:00");

        ledger
            .append(&[AppointmentRecord::new("bob", "drsmith", "2024/03/01", "10:00")])
            .unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("patient_username,mhwp_username,Date,time_slot\n"));
        assert_eq!(ledger.list_all().unwrap().len(), 2);
    }

    #[test]
    fn removing_a_missing_record_leaves_file_byte_identical() {
        let dir = TempDir::new().unwrap();
        let original = "patient_username,mhwp_username,Date,time_slot\nalice,drsmith,2024/03/01,09:00\n";
        let path = write(&dir, "appointments.csv", original);
        let mut ledger = CsvLedger::new(&path);

        assert_eq!(ledger.remove_matching("alice", "2024/03/01", "11:00").unwrap(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), original);

        assert_eq!(ledger.remove_matching("alice", "2024/03/01", "09:00").unwrap(), 1);
        assert!(ledger.list_all().unwrap().is_empty());
    }

    #[test]
    fn absent_ledger_removal_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appointments.csv");
        let mut ledger = CsvLedger::new(&path);
        assert_eq!(ledger.remove_matching("alice", "2024/03/01", "09:00").unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn first_assignment_wins() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "assignments.csv",
            "patient_username,mhwp_username\nalice,drsmith\nalice,drjones\n",
        );
        let directory = CsvAssignments::new(path);
        assert_eq!(directory.get_assigned_mhwp("alice").unwrap(), Some("drsmith".to_string()));
        assert_eq!(directory.get_assigned_mhwp("carol").unwrap(), None);
    }

    #[test]
    fn journal_holds_one_pending_write() {
        let dir = TempDir::new().unwrap();
        let mut journal = FileJournal::new(dir.path().join("booking.journal"));
        let entry = PendingWrite {
            kind: WriteKind::Book,
            records: vec![AppointmentRecord::new("alice", "drsmith", "2024/03/01", "09:00")],
        };

        assert_eq!(journal.pending().unwrap(), None);
        journal.stage(&entry).unwrap();
        assert_eq!(journal.pending().unwrap(), Some(entry.clone()));
        assert!(matches!(journal.stage(&entry), Err(BookingError::Conflict(_))));

        journal.clear().unwrap();
        assert_eq!(journal.pending().unwrap(), None);
    }
}
