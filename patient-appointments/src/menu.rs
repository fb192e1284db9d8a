//! Interactive patient menu. A thin adapter: it reads answers, calls the
//! booking service and prints what happened. Errors from an operation are
//! printed and the menu carries on; only terminal I/O failures end the session.

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::booking::BookingService;
use crate::display::{format_appointments, format_mood_history, format_open_slots, format_schedule};
use crate::error::BookingError;
use crate::mood::{MoodColor, MoodEntry, MoodLog, RECENT_ENTRIES};
use crate::schedule::{list_open_slots, parse_indices, validate_selection};
use crate::storage::{AppointmentLedger, AssignmentDirectory, ScheduleStore, WriteAheadJournal};
use crate::users::UserDirectory;

pub struct PatientMenu<'a, R, W, S, L, A, J> {
    input: R,
    output: W,
    username: String,
    booking: &'a mut BookingService<S, L, A, J>,
    users: &'a mut dyn UserDirectory,
    moods: &'a MoodLog,
}

impl<'a, R, W, S, L, A, J> PatientMenu<'a, R, W, S, L, A, J>
where
    R: BufRead,
    W: Write,
    S: ScheduleStore,
    L: AppointmentLedger,
    A: AssignmentDirectory,
    J: WriteAheadJournal,
{
    pub fn new(
        input: R,
        output: W,
        username: &str,
        booking: &'a mut BookingService<S, L, A, J>,
        users: &'a mut dyn UserDirectory,
        moods: &'a MoodLog,
    ) -> Self {
        PatientMenu {
            input,
            output,
            username: username.to_string(),
            booking,
            users,
            moods,
        }
    }

    /// Prints `text` and reads one trimmed line. None at end of input.
    fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn say(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{}", text)
    }

    fn report(&mut self, err: &BookingError) -> io::Result<()> {
        match err {
            BookingError::NotFound(msg) => self.say(&format!("Sorry, {}.", msg)),
            other => self.say(&format!("Error: {}", other)),
        }
    }

    /// Runs until logout, account deletion or end of input
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            self.say("\nPatient Options:")?;
            self.say("1. Update Personal Info")?;
            self.say("2. Change Password")?;
            self.say("3. Change email")?;
            self.say("4. Change emergency email")?;
            self.say("5. View Medical Records")?;
            self.say("6. Book/Cancel Appointment")?;
            self.say("7. Delete Account")?;
            self.say("8. Track Mood")?;
            self.say("9. Logout")?;

            let Some(choice) = self.prompt("Select an option (1-9): ")? else {
                return Ok(());
            };
            match choice.as_str() {
                "1" => self.update_field("username", "Enter new username: ", "Username")?,
                "2" => self.update_field("password", "Enter new password: ", "Password")?,
                "3" => self.update_field("email", "Enter new email: ", "Email")?,
                "4" => self.update_field("emergency_email", "Enter new emergency email: ", "Emergency email")?,
                "5" => self.say("Medical records feature coming soon...")?,
                "6" => self.appointments_menu()?,
                "7" => {
                    if self.delete_account()? {
                        return Ok(());
                    }
                }
                "8" => self.track_mood()?,
                "9" => {
                    self.say("Logging out.")?;
                    return Ok(());
                }
                _ => self.say("Invalid choice, please try again.")?,
            }
        }
    }

    fn update_field(&mut self, field: &str, question: &str, label: &str) -> io::Result<()> {
        let Some(value) = self.prompt(question)? else {
            return Ok(());
        };
        let username = self.username.clone();
        match self.users.update_user_field(&username, field, &value) {
            Ok(true) => {
                if field == "username" {
                    self.username = value;
                }
                self.say(&format!("{} updated successfully!", label))
            }
            Ok(false) => self.say(&format!("Failed to update {}. Try again.", label.to_lowercase())),
            Err(err) => self.report(&err),
        }
    }

    fn delete_account(&mut self) -> io::Result<bool> {
        let Some(answer) = self.prompt("Confirm delete account? (yes/no): ")? else {
            return Ok(false);
        };
        if !answer.eq_ignore_ascii_case("yes") {
            return Ok(false);
        }
        let username = self.username.clone();
        match self.users.delete_user(&username) {
            Ok(()) => {
                self.say("Account deleted successfully.")?;
                Ok(true)
            }
            Err(err) => {
                self.report(&err)?;
                Ok(false)
            }
        }
    }

    fn appointments_menu(&mut self) -> io::Result<()> {
        self.say("\nBook/Cancel Appointment:")?;
        self.say("1. Book an appointment by selecting time slots")?;
        self.say("2. Cancel an appointment")?;
        self.say("3. View your booked appointments")?;

        let Some(choice) = self.prompt("Select an option (1/2/3): ")? else {
            return Ok(());
        };
        match choice.as_str() {
            "1" => self.book(),
            "2" => self.cancel(),
            "3" => self.view_appointments(),
            _ => self.say("Invalid choice."),
        }
    }

    fn book(&mut self) -> io::Result<()> {
        let mhwp = match self.booking.assigned_mhwp(&self.username) {
            Ok(mhwp) => mhwp,
            Err(BookingError::NotFound(_)) => return self.say("No MHWP assigned to you. Please contact support."),
            Err(err) => return self.report(&err),
        };
        self.say(&format!("Your assigned MHWP: {}", mhwp))?;

        let rows = match self.booking.available_schedule(&mhwp) {
            Ok(rows) => rows,
            Err(err) => return self.report(&err),
        };
        self.say("\nAvailable Dates for MHWP:")?;
        self.say(&format_schedule(&rows))?;

        let Some(date) = self.prompt("\nEnter a date (YYYY/MM/DD) from the schedule: ")? else {
            return Ok(());
        };
        let row = match self.booking.day_schedule(&mhwp, &date) {
            Ok(row) => row,
            Err(err) => return self.report(&err),
        };
        self.say(&format!("\nSchedule for {}:", row.date))?;
        self.say(&format_schedule(std::slice::from_ref(&row)))?;

        let open = list_open_slots(&row);
        if open.is_empty() {
            return self.say("No available slots for the selected date. Please try another date.");
        }
        self.say("\nAvailable Slots (Indices with ⬜):")?;
        self.say(&format_open_slots(&open))?;

        // Re-prompt until the pick is valid
        let chosen = loop {
            let Some(answer) =
                self.prompt("\nSelect up to two time slots by entering their indices (separated by commas): ")?
            else {
                return Ok(());
            };
            match parse_indices(&answer).and_then(|indices| validate_selection(&open, &indices).map(|_| indices)) {
                Ok(indices) => break indices,
                Err(err) => {
                    debug!(%err, "slot selection rejected");
                    self.say(&format!("Invalid input. {}", err))?;
                }
            }
        };

        let username = self.username.clone();
        match self.booking.book(&username, &row.date, &chosen) {
            Ok(records) if records.is_empty() => self.say("No slots selected, nothing booked."),
            Ok(_) => self.say("\nAppointment(s) booked successfully."),
            Err(err) => self.report(&err),
        }
    }

    fn cancel(&mut self) -> io::Result<()> {
        let Some(date) = self.prompt("Enter appointment date (YYYY/MM/DD): ")? else {
            return Ok(());
        };
        let Some(slot) = self.prompt("Enter appointment time slot: ")? else {
            return Ok(());
        };

        let username = self.username.clone();
        match self.booking.cancel(&username, &date, &slot) {
            Ok(true) => self.say("Appointment cancelled successfully!"),
            Ok(false) => match self.booking.appointments_for(&username) {
                Ok(records) if records.is_empty() => self.say("No appointments found."),
                Ok(_) => self.say("No matching appointment found."),
                Err(err) => self.report(&err),
            },
            Err(err) => self.report(&err),
        }
    }

    fn view_appointments(&mut self) -> io::Result<()> {
        match self.booking.appointments_for(&self.username) {
            Ok(records) if records.is_empty() => self.say("\nNo appointments found."),
            Ok(records) => {
                self.say("\nYour Appointments:")?;
                self.say(&format_appointments(&records))
            }
            Err(err) => self.report(&err),
        }
    }

    fn track_mood(&mut self) -> io::Result<()> {
        self.say("\nMood Tracking")?;
        self.say("How are you feeling today?")?;
        for color in MoodColor::ALL {
            self.say(&format!("{}. {}", color.code(), color.label()))?;
        }

        let Some(answer) = self.prompt("Select your mood (1-5): ")? else {
            return Ok(());
        };
        let color = match MoodColor::parse(&answer) {
            Ok(color) => color,
            Err(_) => return self.say("Invalid mood selection."),
        };
        let comments = self
            .prompt("Would you like to add any comments about your mood? ")?
            .unwrap_or_default();

        let entry = MoodEntry::new(&self.username, color, &comments);
        if let Err(err) = self.moods.record(&entry) {
            return self.report(&err);
        }

        self.say("\nYour recent mood history:")?;
        match self.moods.recent(&self.username, RECENT_ENTRIES) {
            Ok(history) => self.say(&format_mood_history(&history)),
            Err(err) => self.report(&err),
        }
    }
}
