//! Patient-side appointment booking over flat CSV files: practitioner
//! schedules, the appointments ledger, assignments and mood history.

pub mod booking;
pub mod config;
pub mod display;
pub mod error;
pub mod menu;
pub mod mood;
pub mod schedule;
pub mod storage;
pub mod users;
pub mod web;

pub use booking::{BookingService, FileBookingService, MemoryBookingService};
pub use config::{AppConfig, CancellationPolicy, DataPaths};
pub use error::{BookingError, Result, ValidationError};
