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

//! Thread-safe index of active reservations.
//!
//! Provides O(1) lookup by reservation id with duplicate detection, while
//! recording global acceptance order.

use crate::base::ReservationId;
use crate::error::ReservationError;
use crate::experience::Reservation;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Concurrent index over every active reservation in the ledger.
///
/// Combines a [`DashMap`] for O(1) id lookup with a [`SegQueue`] that
/// preserves acceptance order. All operations are safe for concurrent
/// access without external locking.
#[derive(Debug)]
pub struct ReservationIndex {
    /// Active reservations keyed by id.
    active: DashMap<ReservationId, Arc<Reservation>>,

    /// Reservation ids in global acceptance order.
    accepted: SegQueue<ReservationId>,
}

impl ReservationIndex {
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            accepted: SegQueue::new(),
        }
    }

    /// Registers an accepted reservation.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::DuplicateReservation`] if a reservation
    /// with the same id is already active.
    pub fn push(&self, reservation: Arc<Reservation>) -> Result<(), ReservationError> {
        let id = reservation.id;

        // Entry API for atomic check-and-insert.
        match self.active.entry(id) {
            Entry::Occupied(_) => Err(ReservationError::DuplicateReservation),
            Entry::Vacant(entry) => {
                entry.insert(reservation);
                self.accepted.push(id);
                Ok(())
            }
        }
    }

    /// Removes a reservation from the active set, returning it if present.
    pub fn remove(&self, id: &ReservationId) -> Option<Arc<Reservation>> {
        self.active.remove(id).map(|(_, reservation)| reservation)
    }

    /// Looks up an active reservation by id.
    pub fn get(&self, id: &ReservationId) -> Option<Arc<Reservation>> {
        self.active.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of active reservations.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for ReservationIndex {
    fn default() -> Self {
        Self::new()
    }
}
