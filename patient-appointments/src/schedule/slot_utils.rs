use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::ValidationError;
use super::types::{
    AppointmentRecord, BookedSlot, OpenSlot, ScheduleRow, Selection, SlotMarker, MAX_SLOTS_PER_BOOKING,
};

/// Canonical date format used in every data file
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// Scans the slot columns left to right and returns every open cell,
/// indexed by its column position
pub fn list_open_slots(row: &ScheduleRow) -> Vec<OpenSlot> {
    let mut open = Vec::new();
    for (index, cell) in row.slots.iter().enumerate() {
        if cell.marker == SlotMarker::Open {
            debug!(date = %row.date, slot = %cell.name, index, "slot open");
            open.push(OpenSlot {
                index,
                slot_name: cell.name.clone(),
            });
        } else {
            debug!(date = %row.date, slot = %cell.name, index, "slot taken");
        }
    }
    open
}

/// Checks a patient's pick against the currently open slots.
/// Repeated indices count once. Nothing is mutated.
pub fn validate_selection(open_slots: &[OpenSlot], chosen: &[usize]) -> Result<Selection, ValidationError> {
    let mut seen = HashSet::new();
    let indices: Vec<usize> = chosen.iter().copied().filter(|idx| seen.insert(*idx)).collect();

    if indices.len() > MAX_SLOTS_PER_BOOKING {
        return Err(ValidationError::TooManySlots {
            chosen: indices.len(),
            max: MAX_SLOTS_PER_BOOKING,
        });
    }

    for &index in &indices {
        if !open_slots.iter().any(|slot| slot.index == index) {
            return Err(ValidationError::SlotNotOpen {
                index,
                open: open_slots.iter().map(|slot| slot.index).collect(),
            });
        }
    }

    Ok(Selection::new(indices))
}

/// Validates `chosen` against the row and marks the chosen cells booked.
/// On error the row is left untouched.
pub fn select(row: &mut ScheduleRow, chosen: &[usize]) -> Result<Vec<BookedSlot>, ValidationError> {
    let open = list_open_slots(row);
    let selection = validate_selection(&open, chosen)?;

    let mut booked = Vec::with_capacity(selection.indices().len());
    for &index in selection.indices() {
        let cell = &mut row.slots[index];
        cell.marker = SlotMarker::Booked;
        booked.push(BookedSlot {
            date: row.date.clone(),
            slot_name: cell.name.clone(),
        });
    }
    Ok(booked)
}

/// Parses comma separated slot indices such as "0, 2".
/// Empty input is an empty selection.
pub fn parse_indices(input: &str) -> Result<Vec<usize>, ValidationError> {
    let mut indices = Vec::new();
    for part in input.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let index = trimmed
            .parse::<usize>()
            .map_err(|_| ValidationError::UnparseableIndex(trimmed.to_string()))?;
        if !indices.contains(&index) {
            indices.push(index);
        }
    }
    Ok(indices)
}

/// Accepts YYYY/MM/DD or YYYY-MM-DD and returns the YYYY/MM/DD form
pub fn normalize_date(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .map(|date| date.format(DATE_FORMAT).to_string())
        .map_err(|_| ValidationError::InvalidDate(trimmed.to_string()))
}

/// Compares two dates in canonical form, so "2024-3-1" and "2024/03/01" are the same day
pub fn same_date(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (normalize_date(a), normalize_date(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Marks every cell that the ledger already holds for this practitioner as booked
pub fn overlay_ledger(rows: &mut [ScheduleRow], records: &[AppointmentRecord]) {
    for record in records {
        for row in rows.iter_mut() {
            if row.mhwp_username == record.mhwp_username && same_date(&row.date, &record.date) {
                row.set_marker(&record.time_slot, SlotMarker::Booked);
            }
        }
    }
}
