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

//! Date inventory generation.
//!
//! Produces the finite, ordered set of bookable date slots for an
//! experience: `horizon` slots spaced exactly one week apart, starting at
//! the reference date. Deterministic and side-effect free.

use crate::error::ReservationError;
use crate::experience::DateSlot;
use chrono::{Days, NaiveDate};

/// Weekly slots generated per experience unless configured otherwise.
pub const DEFAULT_HORIZON: usize = 8;

const SLOT_INTERVAL_DAYS: u64 = 7;

/// Generates `horizon` empty weekly slots starting at `reference`.
///
/// # Errors
///
/// Returns [`ReservationError::InvalidHorizon`] when `horizon` is zero or
/// the generated dates would overflow the calendar.
pub fn generate(
    reference: NaiveDate,
    horizon: usize,
) -> Result<Vec<DateSlot>, ReservationError> {
    if horizon == 0 {
        return Err(ReservationError::InvalidHorizon);
    }

    let mut slots = Vec::with_capacity(horizon);
    for week in 0..horizon as u64 {
        let date = reference
            .checked_add_days(Days::new(SLOT_INTERVAL_DAYS * week))
            .ok_or(ReservationError::InvalidHorizon)?;
        slots.push(DateSlot::empty(date));
    }
    Ok(slots)
}
