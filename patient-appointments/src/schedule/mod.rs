pub mod types;
pub mod slot_utils;

pub use types::{
    AppointmentRecord, Assignment, BookedSlot, OpenSlot, ScheduleRow, Selection, SlotCell, SlotMarker,
    BOOKED_MARKER, MAX_SLOTS_PER_BOOKING, OPEN_MARKER,
};
pub use slot_utils::{
    list_open_slots, normalize_date, overlay_ledger, parse_indices, same_date, select, validate_selection,
};
