use std::sync::Mutex;

use actix_web::{middleware, web, App, HttpResponse, HttpServer, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::booking::FileBookingService;
use crate::config::AppConfig;
use crate::error::BookingError;
use crate::mood::{MoodColor, MoodEntry, MoodLog, RECENT_ENTRIES};
use crate::schedule::{AppointmentRecord, OpenSlot};

/// Shared by every worker. The mutex serialises all bookings inside this process.
pub struct AppState {
    pub booking: Mutex<FileBookingService>,
    pub moods: MoodLog,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        AppState {
            booking: Mutex::new(FileBookingService::from_config(config)),
            moods: MoodLog::new(config.paths.mood()),
        }
    }
}

#[derive(Deserialize)]
pub struct DateQuery {
    date: String,
}

#[derive(Deserialize)]
pub struct BookRequest {
    date: String,
    #[serde(default)]
    indices: Vec<usize>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    date: String,
    time_slot: String,
}

#[derive(Deserialize)]
pub struct MoodRequest {
    color_code: u8,
    #[serde(default)]
    comments: String,
}

#[derive(Serialize)]
pub struct OpenSlotsResponse {
    mhwp_username: String,
    date: String,
    open_slots: Vec<OpenSlot>,
}

#[derive(Serialize)]
pub struct BookResponse {
    booked: Vec<AppointmentRecord>,
}

#[derive(Serialize)]
pub struct CancelResponse {
    cancelled: bool,
}

fn error_response(err: &BookingError) -> HttpResponse {
    let body = serde_json::json!({"success": false, "error": err.to_string()});
    match err {
        BookingError::Validation(_) => HttpResponse::BadRequest().json(body),
        BookingError::NotFound(_) | BookingError::FileNotFound { .. } => HttpResponse::NotFound().json(body),
        BookingError::Conflict(_) => HttpResponse::Conflict().json(body),
        _ => {
            error!(%err, "request failed");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn lock(state: &AppState) -> Result<std::sync::MutexGuard<'_, FileBookingService>> {
    state
        .booking
        .lock()
        .map_err(|_| actix_web::error::ErrorInternalServerError("booking state poisoned"))
}

async fn get_mhwp(username: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let booking = lock(&state)?;
    Ok(match booking.assigned_mhwp(&username) {
        Ok(mhwp) => HttpResponse::Ok().json(serde_json::json!({"mhwp_username": mhwp})),
        Err(err) => error_response(&err),
    })
}

async fn get_schedule(username: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let booking = lock(&state)?;
    let result = booking
        .assigned_mhwp(&username)
        .and_then(|mhwp| booking.available_schedule(&mhwp));
    Ok(match result {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(err) => error_response(&err),
    })
}

async fn get_open_slots(
    username: web::Path<String>,
    query: web::Query<DateQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let booking = lock(&state)?;
    let result = booking.assigned_mhwp(&username).and_then(|mhwp| {
        let row = booking.day_schedule(&mhwp, &query.date)?;
        Ok(OpenSlotsResponse {
            mhwp_username: mhwp,
            open_slots: crate::schedule::list_open_slots(&row),
            date: row.date,
        })
    });
    Ok(match result {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(err) => error_response(&err),
    })
}

async fn list_appointments(username: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let booking = lock(&state)?;
    Ok(match booking.appointments_for(&username) {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(err) => error_response(&err),
    })
}

async fn book_appointment(
    username: web::Path<String>,
    req: web::Json<BookRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let mut booking = lock(&state)?;
    Ok(match booking.book(&username, &req.date, &req.indices) {
        Ok(booked) => HttpResponse::Created().json(BookResponse { booked }),
        Err(err) => error_response(&err),
    })
}

async fn cancel_appointment(
    username: web::Path<String>,
    req: web::Json<CancelRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let mut booking = lock(&state)?;
    Ok(match booking.cancel(&username, &req.date, &req.time_slot) {
        Ok(true) => HttpResponse::Ok().json(CancelResponse { cancelled: true }),
        Ok(false) => HttpResponse::NotFound().json(CancelResponse { cancelled: false }),
        Err(err) => error_response(&err),
    })
}

async fn recent_moods(username: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(match state.moods.recent(&username, RECENT_ENTRIES) {
        Ok(entries) => HttpResponse::Ok().json(entries),
        Err(err) => error_response(&err),
    })
}

async fn record_mood(
    username: web::Path<String>,
    req: web::Json<MoodRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let color = match MoodColor::from_code(req.color_code) {
        Some(color) => color,
        None => {
            let err = BookingError::from(crate::error::ValidationError::InvalidMood(req.color_code.to_string()));
            return Ok(error_response(&err));
        }
    };
    let entry = MoodEntry::new(&username, color, &req.comments);
    Ok(match state.moods.record(&entry) {
        Ok(()) => HttpResponse::Created().json(entry),
        Err(err) => error_response(&err),
    })
}

/// Routes under /api/patients/{username}
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/patients/{username}")
            .route("/mhwp", web::get().to(get_mhwp))
            .route("/schedule", web::get().to(get_schedule))
            .route("/slots", web::get().to(get_open_slots))
            .route("/appointments", web::get().to(list_appointments))
            .route("/appointments", web::post().to(book_appointment))
            .route("/appointments", web::delete().to(cancel_appointment))
            .route("/mood", web::get().to(recent_moods))
            .route("/mood", web::post().to(record_mood)),
    );
}

pub async fn start_server(port: u16, config: AppConfig) -> std::io::Result<()> {
    let state = AppState::from_config(&config);
    if let Ok(mut booking) = state.booking.lock() {
        if let Err(err) = booking.recover() {
            error!(%err, "could not complete an interrupted booking");
        }
    }
    let app_state = web::Data::new(state);

    info!(port, data_dir = %config.paths.dir().display(), "starting web server");
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
