//! Simple REST API server example for the reservation engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /reservations` - Reserve seats (explicit date or next available)
//! - `GET /reservations/:id` - Get an active reservation by id
//! - `DELETE /experiences/:id/reservations/:user` - Cancel a reservation
//! - `GET /experiences` - List all experiences with their next open slot
//! - `GET /experiences/:id` - Get an experience snapshot (optional `?date=`)
//! - `GET /experiences/:id/next` - Next available date slot
//!
//! ## Example Usage
//!
//! ```bash
//! # Reserve four seats at the next available date
//! curl -X POST http://localhost:3000/reservations \
//!   -H "Content-Type: application/json" \
//!   -d '{"experienceId": 1, "userId": 7, "userName": "Ana", "seats": 4}'
//!
//! # Reserve at an explicit date
//! curl -X POST http://localhost:3000/reservations \
//!   -H "Content-Type: application/json" \
//!   -d '{"experienceId": 1, "userId": 8, "userName": "Luis", "seats": 2, "date": "2026-03-13"}'
//!
//! # Snapshot
//! curl http://localhost:3000/experiences/1
//!
//! # Cancel
//! curl -X DELETE http://localhost:3000/experiences/1/reservations/7
//! ```

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use reserva_rs::{
    DateSlot, Engine, ExperienceConfig, ExperienceId, ExperienceView, Guest, Reservation,
    ReservationError, ReservationId, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

// === Request/Response DTOs ===

/// Request body for reserving seats:
/// ```json
/// {"experienceId": 1, "userId": 7, "userName": "Ana", "seats": 4, "date": "2026-03-06"}
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    experience_id: u32,
    user_id: u32,
    user_name: String,
    #[serde(default)]
    user_avatar: Option<String>,
    seats: u32,
    #[serde(default)]
    date: Option<NaiveDate>,
}

/// Response body for an accepted reservation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveResponse {
    pub reservation_id: ReservationId,
}

/// Optional explicit date, e.g. `?date=2026-03-13`.
#[derive(Debug, Deserialize)]
pub struct DateParam {
    #[serde(default)]
    date: Option<NaiveDate>,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the reservation engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `ReservationError` into HTTP responses.
pub struct AppError(ReservationError);

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            ReservationError::InvalidSeats => (StatusCode::BAD_REQUEST, "INVALID_SEATS"),
            ReservationError::InvalidCapacity => (StatusCode::BAD_REQUEST, "INVALID_CAPACITY"),
            ReservationError::InvalidHorizon => (StatusCode::BAD_REQUEST, "INVALID_HORIZON"),
            ReservationError::ExperienceNotFound => {
                (StatusCode::NOT_FOUND, "EXPERIENCE_NOT_FOUND")
            }
            ReservationError::DateNotFound => (StatusCode::NOT_FOUND, "DATE_NOT_FOUND"),
            ReservationError::NoAvailableDate => (StatusCode::CONFLICT, "NO_AVAILABLE_DATE"),
            ReservationError::CapacityExceeded { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CAPACITY_EXCEEDED")
            }
            ReservationError::DuplicateReservation => {
                (StatusCode::CONFLICT, "DUPLICATE_RESERVATION")
            }
            ReservationError::ReservationNotFound => {
                (StatusCode::NOT_FOUND, "RESERVATION_NOT_FOUND")
            }
            ReservationError::Storage(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /reservations - Reserve seats.
async fn create_reservation(
    State(state): State<AppState>,
    Json(request): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReserveResponse>), AppError> {
    let guest = Guest {
        user_id: UserId(request.user_id),
        user_name: request.user_name,
        user_avatar: request.user_avatar,
    };
    let reservation_id = state.engine.reserve(
        ExperienceId(request.experience_id),
        &guest,
        request.seats,
        request.date,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(ReserveResponse { reservation_id }),
    ))
}

/// GET /reservations/:id - Get an active reservation by id.
async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .find_reservation(&ReservationId(id))
        .map(|reservation| Json((*reservation).clone()))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Reservation not found".to_string(),
                    code: "RESERVATION_NOT_FOUND".to_string(),
                }),
            )
        })
}

/// DELETE /experiences/:id/reservations/:user - Cancel a reservation.
async fn cancel_reservation(
    State(state): State<AppState>,
    Path((experience_id, user_id)): Path<(u32, u32)>,
    Query(params): Query<DateParam>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .cancel(ExperienceId(experience_id), UserId(user_id), params.date)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /experiences - List all experiences with their next open slot.
async fn list_experiences(State(state): State<AppState>) -> Json<Vec<ExperienceView>> {
    let mut views: Vec<ExperienceView> = state
        .engine
        .experiences()
        .filter_map(|entry| entry.value().snapshot(None).ok())
        .collect();
    views.sort_by_key(|view| view.id);
    Json(views)
}

/// GET /experiences/:id - Snapshot of one experience.
async fn get_experience(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(params): Query<DateParam>,
) -> Result<Json<ExperienceView>, AppError> {
    let view = state.engine.snapshot(ExperienceId(id), params.date)?;
    Ok(Json(view))
}

/// GET /experiences/:id/next - Next available date slot.
async fn next_available(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<DateSlot>, AppError> {
    state
        .engine
        .next_available(ExperienceId(id))?
        .map(Json)
        .ok_or(AppError(ReservationError::NoAvailableDate))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/reservations", post(create_reservation))
        .route("/reservations/{id}", get(get_reservation))
        .route(
            "/experiences/{id}/reservations/{user}",
            delete(cancel_reservation),
        )
        .route("/experiences", get(list_experiences))
        .route("/experiences/{id}", get(get_experience))
        .route("/experiences/{id}/next", get(next_available))
        .with_state(state)
}

// === Main ===

fn seed_catalog(engine: &Engine) {
    let reference_date = chrono::Utc::now().date_naive();
    let configs = [
        ExperienceConfig {
            id: ExperienceId(1),
            title: "Cellar tasting".into(),
            description: Some("Guided tasting in the old cellar".into()),
            max_seats: 10,
            reference_date,
            horizon: 8,
        },
        ExperienceConfig {
            id: ExperienceId(2),
            title: "Chef's table".into(),
            description: Some("Seven courses at the pass".into()),
            max_seats: 6,
            reference_date,
            horizon: 8,
        },
    ];
    for config in &configs {
        engine.register(config).expect("static catalog is valid");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let engine = Arc::new(Engine::new());
    seed_catalog(&engine);

    let state = AppState { engine };
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    tracing::info!("Reservation API server running on http://127.0.0.1:3000");
    tracing::info!("  POST   /reservations                          - Reserve seats");
    tracing::info!("  GET    /reservations/:id                      - Get reservation by id");
    tracing::info!("  DELETE /experiences/:id/reservations/:user    - Cancel a reservation");
    tracing::info!("  GET    /experiences                           - List experiences");
    tracing::info!("  GET    /experiences/:id                       - Experience snapshot");
    tracing::info!("  GET    /experiences/:id/next                  - Next available slot");

    axum::serve(listener, app).await.unwrap();
}
