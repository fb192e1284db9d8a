use serde::{Deserialize, Serialize};

use super::slot_utils::same_date;

/// Cell glyph for a slot the patient may still book
pub const OPEN_MARKER: &str = "⬜";
/// Cell glyph for a slot that is taken
pub const BOOKED_MARKER: &str = "⬛";

/// A single booking may hold at most this many slots
pub const MAX_SLOTS_PER_BOOKING: usize = 2;

/// Occupancy state of one schedule cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotMarker {
    #[serde(rename = "⬜")]
    Open,
    #[serde(rename = "⬛")]
    Booked,
}

impl SlotMarker {
    /// Reads a cell value, ignoring surrounding whitespace
    pub fn parse(cell: &str) -> Option<Self> {
        match cell.trim() {
            OPEN_MARKER => Some(SlotMarker::Open),
            BOOKED_MARKER => Some(SlotMarker::Booked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotMarker::Open => OPEN_MARKER,
            SlotMarker::Booked => BOOKED_MARKER,
        }
    }
}

/// One named time-slot column within a schedule row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotCell {
    pub name: String,
    pub marker: SlotMarker,
}

/// A practitioner's slot grid for a single date.
/// Slot cells keep the column order of the schedule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleRow {
    pub mhwp_username: String,
    pub date: String,
    pub slots: Vec<SlotCell>,
}

impl ScheduleRow {
    pub fn new(mhwp_username: &str, date: &str, slots: &[(&str, SlotMarker)]) -> Self {
        ScheduleRow {
            mhwp_username: mhwp_username.to_string(),
            date: date.to_string(),
            slots: slots
                .iter()
                .map(|(name, marker)| SlotCell {
                    name: name.to_string(),
                    marker: *marker,
                })
                .collect(),
        }
    }

    pub fn marker(&self, slot_name: &str) -> Option<SlotMarker> {
        self.slots
            .iter()
            .find(|cell| cell.name == slot_name)
            .map(|cell| cell.marker)
    }

    /// Sets the marker of the named slot. Returns false if the row has no such column.
    pub fn set_marker(&mut self, slot_name: &str, marker: SlotMarker) -> bool {
        match self.slots.iter_mut().find(|cell| cell.name == slot_name) {
            Some(cell) => {
                cell.marker = marker;
                true
            }
            None => false,
        }
    }
}

/// An open cell as offered to the patient: column index plus column name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenSlot {
    pub index: usize,
    pub slot_name: String,
}

/// Column indices that passed validation, in the order the patient gave them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    indices: Vec<usize>,
}

impl Selection {
    pub(crate) fn new(indices: Vec<usize>) -> Self {
        Selection { indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

/// A (date, slot) pair that a selection turned from open to booked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookedSlot {
    pub date: String,
    pub slot_name: String,
}

/// One confirmed booking in the appointments ledger.
/// Older files used a `Slot` header; it is read as `time_slot`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub patient_username: String,
    pub mhwp_username: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(alias = "Slot")]
    pub time_slot: String,
}

impl AppointmentRecord {
    pub fn new(patient_username: &str, mhwp_username: &str, date: &str, time_slot: &str) -> Self {
        AppointmentRecord {
            patient_username: patient_username.to_string(),
            mhwp_username: mhwp_username.to_string(),
            date: date.to_string(),
            time_slot: time_slot.to_string(),
        }
    }

    /// Cancellation key match: patient, date and slot (practitioner is not part of the key).
    /// Dates compare in canonical form.
    pub fn matches(&self, patient_username: &str, date: &str, time_slot: &str) -> bool {
        self.patient_username == patient_username && self.time_slot == time_slot && same_date(&self.date, date)
    }
}

/// Patient to practitioner assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub patient_username: String,
    pub mhwp_username: String,
}
