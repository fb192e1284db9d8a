use crate::mood::MoodEntry;
use crate::schedule::{AppointmentRecord, OpenSlot, ScheduleRow};

/// Renders rows as a boxed grid:
/// +------+-----+
/// | head | ... |
/// +======+=====+
pub fn render_grid(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx < widths.len() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }
    }

    let rule = |fill: char| -> String {
        let mut line = String::from("+");
        for width in &widths {
            line.push_str(&fill.to_string().repeat(width + 2));
            line.push('+');
        }
        line
    };
    let line = |cells: &[String]| -> String {
        let mut out = String::from("|");
        for (idx, width) in widths.iter().enumerate() {
            let cell = cells.get(idx).map(String::as_str).unwrap_or("");
            let pad = width - cell.chars().count();
            out.push_str(&format!(" {}{} |", cell, " ".repeat(pad)));
        }
        out
    };

    let mut out = vec![rule('-'), line(headers), rule('=')];
    for row in rows {
        out.push(line(row));
        out.push(rule('-'));
    }
    out.join("\n")
}

/// Practitioner grid, one line per date
pub fn format_schedule(rows: &[ScheduleRow]) -> String {
    let mut headers = vec!["mhwp_username".to_string(), "Date".to_string()];
    if let Some(first) = rows.first() {
        headers.extend(first.slots.iter().map(|cell| cell.name.clone()));
    }
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.mhwp_username.clone(), row.date.clone()];
            cells.extend(row.slots.iter().map(|cell| cell.marker.as_str().to_string()));
            cells
        })
        .collect();
    render_grid(&headers, &body)
}

pub fn format_appointments(records: &[AppointmentRecord]) -> String {
    let headers: Vec<String> = ["patient_username", "mhwp_username", "Date", "time_slot"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let body: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.patient_username.clone(),
                r.mhwp_username.clone(),
                r.date.clone(),
                r.time_slot.clone(),
            ]
        })
        .collect();
    render_grid(&headers, &body)
}

/// "0 (09:00), 1 (10:00)"
pub fn format_open_slots(slots: &[OpenSlot]) -> String {
    slots
        .iter()
        .map(|slot| format!("{} ({})", slot.index, slot.slot_name))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_mood_history(entries: &[MoodEntry]) -> String {
    let headers: Vec<String> = ["timestamp", "color_code", "comments"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let body: Vec<Vec<String>> = entries
        .iter()
        .map(|e| vec![e.timestamp.clone(), e.color_code.to_string(), e.comments.clone()])
        .collect();
    render_grid(&headers, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::SlotMarker::{Booked, Open};

    #[test]
    fn grid_pads_columns() {
        let grid = render_grid(
            &["a".to_string(), "bbb".to_string()],
            &[vec!["long".to_string(), "x".to_string()]],
        );
        assert_eq!(
            grid,
            "+------+-----+\n\
             | a    | bbb |\n\
             +======+=====+\n\
             | long | x   |\n\
             +------+-----+"
        );
    }

    #[test]
    fn schedule_shows_markers() {
        let rows = vec![ScheduleRow::new("drsmith", "2024/03/01", &[("09:00", Open), ("10:00", Booked)])];
        let text = format_schedule(&rows);
        assert!(text.contains("| 09:00 |"));
        assert!(text.contains("| ⬜     | ⬛     |"));
    }

    #[test]
    fn open_slot_list() {
        let slots = vec![
            OpenSlot { index: 0, slot_name: "09:00".to_string() },
            OpenSlot { index: 2, slot_name: "11:00".to_string() },
        ];
        assert_eq!(format_open_slots(&slots), "0 (09:00), 2 (11:00)");
    }
}
