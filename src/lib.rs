// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # Reserva
//!
//! This library provides a seat reservation engine for premium dining
//! experiences booked on weekly date slots, handling reservation,
//! cancellation, automatic next-date selection, and legacy ledger migration.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central reservation processor managing experience ledgers
//! - [`Experience`]: Per-experience ledger with date slots and capacity enforcement
//! - [`BookingRequest`]: Supported booking operations (reserve, cancel)
//! - [`ReservationError`]: Error types for reservation processing failures
//!
//! ## Example
//!
//! ```
//! use chrono::NaiveDate;
//! use reserva_rs::{Engine, ExperienceConfig, ExperienceId, Guest, UserId};
//!
//! let engine = Engine::new();
//! engine
//!     .register(&ExperienceConfig {
//!         id: ExperienceId(1),
//!         title: "Cellar tasting".into(),
//!         description: None,
//!         max_seats: 10,
//!         reference_date: NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
//!         horizon: 8,
//!     })
//!     .unwrap();
//!
//! // Reserve four seats at the next available date
//! let guest = Guest {
//!     user_id: UserId(7),
//!     user_name: "Ana".into(),
//!     user_avatar: None,
//! };
//! let reservation_id = engine.reserve(ExperienceId(1), &guest, 4, None).unwrap();
//! assert!(engine.find_reservation(&reservation_id).is_some());
//!
//! // Check slot occupancy
//! let view = engine.snapshot(ExperienceId(1), None).unwrap();
//! assert_eq!(view.slot.unwrap().reserved_seats, 4);
//! ```
//!
//! ## Thread Safety
//!
//! The engine handles concurrent access to experiences, serializing the
//! check-and-reserve sequence per experience so concurrent callers can
//! never jointly overbook a date slot.

mod base;
mod booking;
mod catalog;
mod engine;
pub mod error;
pub mod experience;
pub mod normalize;
mod reservation_index;
mod schedule;
pub mod store;

pub use base::{ExperienceId, ReservationId, UserId};
pub use booking::{BookingRequest, Guest};
pub use catalog::{ExperienceConfig, load_catalog};
pub use engine::Engine;
pub use error::ReservationError;
pub use experience::{DateSlot, Experience, ExperienceView, Reservation};
pub use normalize::{ExperienceRecord, RawExperience, SCHEMA_VERSION, normalize, normalize_all};
pub use reservation_index::ReservationIndex;
pub use schedule::{DEFAULT_HORIZON, generate};
pub use store::{JsonFileStore, MemoryStore, ReservationStore, StorageError};
