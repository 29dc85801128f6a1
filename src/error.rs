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

//! Error types for reservation processing.

use crate::store::StorageError;
use thiserror::Error;

/// Reservation processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// Seat count is zero
    #[error("seat count must be at least 1")]
    InvalidSeats,

    /// Experience capacity is zero
    #[error("experience capacity must be at least 1")]
    InvalidCapacity,

    /// Slot horizon is zero or the generated dates overflow the calendar
    #[error("invalid slot horizon")]
    InvalidHorizon,

    /// Referenced experience id does not exist
    #[error("experience not found")]
    ExperienceNotFound,

    /// Explicit date is not among the generated slots
    #[error("date is not a bookable slot")]
    DateNotFound,

    /// Every generated slot is full
    #[error("no available date")]
    NoAvailableDate,

    /// Requested seats exceed the remaining capacity at the target slot
    #[error("capacity exceeded (requested {requested}, remaining {remaining})")]
    CapacityExceeded { requested: u32, remaining: u32 },

    /// User already holds an active reservation for this experience
    #[error("user already holds a reservation for this experience")]
    DuplicateReservation,

    /// Cancel target does not exist
    #[error("reservation not found")]
    ReservationNotFound,

    /// Persistence failed; the in-memory mutation has been rolled back
    #[error(transparent)]
    Storage(#[from] StorageError),
}
