use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use patient_appointments::config::DEFAULT_DATA_DIR;
use patient_appointments::display::{format_appointments, format_mood_history, format_open_slots};
use patient_appointments::menu::PatientMenu;
use patient_appointments::mood::{MoodColor, MoodEntry, MoodLog, RECENT_ENTRIES};
use patient_appointments::schedule::parse_indices;
use patient_appointments::users::CsvUserDirectory;
use patient_appointments::{web, AppConfig, FileBookingService};

#[derive(Parser)]
#[command(name = "patient-appointments")]
#[command(version = "0.1.0")]
#[command(about = "Book and manage appointments with your assigned MHWP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding the CSV data files
    #[arg(long, env = "PATIENT_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,

    /// Leave the schedule slot booked when an appointment is cancelled
    #[arg(long, global = true)]
    keep_slot_held: bool,

    /// Patient username
    #[arg(short, long, global = true)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive patient menu (the default)
    Menu,

    /// Show open slots on a date
    Slots {
        #[arg(short, long)]
        date: String,
    },

    /// Book up to two slots by index
    Book {
        #[arg(short, long)]
        date: String,

        /// Comma separated slot indices, e.g. "0,2"
        #[arg(short, long)]
        slots: String,
    },

    /// Cancel a booked slot
    Cancel {
        #[arg(short, long)]
        date: String,

        #[arg(short, long)]
        slot: String,
    },

    /// List booked appointments
    Appointments,

    /// Record today's mood (1 = Green ... 5 = Red)
    Mood {
        #[arg(short, long)]
        color: String,

        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Serve the JSON API
    Web {
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
}

/// Resolves the patient and opens the file-backed booking service, finishing
/// any booking a previous run left half written
fn open_session(
    user: &Option<String>,
    config: &AppConfig,
) -> Result<(String, FileBookingService), Box<dyn std::error::Error>> {
    let username = user
        .clone()
        .ok_or("--user <USERNAME> is required for this command")?;
    let mut booking = FileBookingService::from_config(config);
    if let Some(completed) = booking.recover()? {
        println!("Completed an interrupted {:?} of {} slot(s).", completed.kind, completed.records.len());
    }
    Ok((username, booking))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::new(&cli.data_dir, cli.keep_slot_held);
    let moods = MoodLog::new(config.paths.mood());

    match cli.command.unwrap_or(Commands::Menu) {
        Commands::Web { port } => {
            println!("Starting web server on port {}...", port);
            println!("Access the API at http://localhost:{}/api/patients/<username>/", port);
            web::start_server(port, config).await?;
        }
        Commands::Menu => {
            let (username, mut booking) = open_session(&cli.user, &config)?;
            let mut users = CsvUserDirectory::new(config.paths.users());
            let stdin = io::stdin();
            PatientMenu::new(stdin.lock(), io::stdout(), &username, &mut booking, &mut users, &moods).run()?;
        }
        Commands::Slots { date } => {
            let (username, booking) = open_session(&cli.user, &config)?;
            let mhwp = booking.assigned_mhwp(&username)?;
            let open = booking.open_slots(&mhwp, &date)?;
            if open.is_empty() {
                println!("No available slots with {} on {}.", mhwp, date);
            } else {
                println!("Open slots with {} on {}: {}", mhwp, date, format_open_slots(&open));
            }
        }
        Commands::Book { date, slots } => {
            let (username, mut booking) = open_session(&cli.user, &config)?;
            let indices = parse_indices(&slots)?;
            let booked = booking.book(&username, &date, &indices)?;
            if booked.is_empty() {
                println!("No slots selected, nothing booked.");
            } else {
                println!("Appointment(s) booked successfully.");
                println!("{}", format_appointments(&booked));
            }
        }
        Commands::Cancel { date, slot } => {
            let (username, mut booking) = open_session(&cli.user, &config)?;
            if booking.cancel(&username, &date, &slot)? {
                println!("Appointment cancelled successfully!");
            } else {
                println!("No matching appointment found.");
            }
        }
        Commands::Appointments => {
            let (username, booking) = open_session(&cli.user, &config)?;
            let records = booking.appointments_for(&username)?;
            if records.is_empty() {
                println!("No appointments found.");
            } else {
                println!("{}", format_appointments(&records));
            }
        }
        Commands::Mood { color, comment } => {
            let username = cli.user.clone().ok_or("--user <USERNAME> is required for this command")?;
            let color = MoodColor::parse(&color)?;
            moods.record(&MoodEntry::new(&username, color, &comment))?;
            println!("Your recent mood history:");
            println!("{}", format_mood_history(&moods.recent(&username, RECENT_ENTRIES)?));
        }
    }

    Ok(())
}
