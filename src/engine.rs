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

//! Reservation processing engine.
//!
//! The [`Engine`] is the sole mutator of ledger state. It validates and
//! applies reserve/cancel operations against per-experience aggregates,
//! resolves target dates through the availability scan, and persists every
//! accepted mutation through an injected [`ReservationStore`] handle.
//!
//! # Thread Safety
//!
//! The engine uses [`DashMap`] for concurrent access to experiences; each
//! aggregate serializes its own check-and-reserve sequence, so callers
//! working on different experiences never block each other.
//!
//! # Invariants
//!
//! - A slot's reserved count always equals the sum of its entry seats.
//! - A slot's reserved count never exceeds the experience capacity.
//! - A user holds at most one active reservation per experience.
//! - On a storage failure the triggering mutation is rolled back, so
//!   in-memory state never diverges durably from persisted state.

use crate::base::{ExperienceId, ReservationId, UserId};
use crate::booking::{BookingRequest, Guest};
use crate::catalog::ExperienceConfig;
use crate::error::ReservationError;
use crate::experience::{DateSlot, Experience, ExperienceView, Reservation};
use crate::normalize::ExperienceRecord;
use crate::reservation_index::ReservationIndex;
use crate::store::ReservationStore;
use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::warn;

/// Reservation engine managing the ledgers of every catalog experience.
pub struct Engine {
    /// Experience aggregates indexed by id.
    experiences: DashMap<ExperienceId, Experience>,
    /// Active reservations for O(1) id lookup.
    index: ReservationIndex,
    /// Injected persistence handle; `None` keeps the engine in-memory only.
    store: Option<Arc<dyn ReservationStore>>,
}

impl Engine {
    /// Creates an in-memory engine with no experiences.
    pub fn new() -> Self {
        Engine {
            experiences: DashMap::new(),
            index: ReservationIndex::new(),
            store: None,
        }
    }

    /// Creates an engine backed by `store`, hydrating any previously
    /// persisted ledgers (legacy records are migrated on the way in).
    ///
    /// # Errors
    ///
    /// Surfaces [`ReservationError::Storage`] when the store cannot be read.
    pub fn with_store(store: Arc<dyn ReservationStore>) -> Result<Self, ReservationError> {
        let records = store.load()?;
        let engine = Engine {
            experiences: DashMap::new(),
            index: ReservationIndex::new(),
            store: Some(store),
        };
        for record in records {
            for slot in &record.dates {
                for reservation in &slot.reservations {
                    if engine.index.push(Arc::new(reservation.clone())).is_err() {
                        warn!(id = %reservation.id, "duplicate reservation id in stored ledger");
                    }
                }
            }
            engine
                .experiences
                .insert(record.id, Experience::from_record(record));
        }
        Ok(engine)
    }

    /// Registers a catalog experience, generating its slot inventory.
    ///
    /// Idempotent: an id that already exists keeps its ledger untouched, so
    /// a load-then-register boot sequence cannot wipe reservations.
    pub fn register(&self, config: &ExperienceConfig) -> Result<(), ReservationError> {
        let experience = Experience::new(config)?;
        match self.experiences.entry(config.id) {
            Entry::Occupied(_) => return Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(experience);
            }
        }
        if let Err(error) = self.persist() {
            self.experiences.remove(&config.id);
            return Err(error);
        }
        Ok(())
    }

    /// Validates and applies a reserve operation.
    ///
    /// The target slot is the explicit `date` if given, otherwise the next
    /// available one. All preconditions are checked before any mutation.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::ExperienceNotFound`] - Unknown experience id.
    /// - [`ReservationError::InvalidSeats`] - Zero seats requested.
    /// - [`ReservationError::DateNotFound`] - Explicit date is not a slot.
    /// - [`ReservationError::NoAvailableDate`] - No date given and all slots full.
    /// - [`ReservationError::CapacityExceeded`] - Request exceeds remaining room.
    /// - [`ReservationError::DuplicateReservation`] - User already holds one.
    /// - [`ReservationError::Storage`] - Persistence failed; mutation rolled back.
    pub fn reserve(
        &self,
        experience_id: ExperienceId,
        guest: &Guest,
        seats: u32,
        date: Option<NaiveDate>,
    ) -> Result<ReservationId, ReservationError> {
        let reservation = {
            let experience = self
                .experiences
                .get(&experience_id)
                .ok_or(ReservationError::ExperienceNotFound)?;
            experience.reserve(guest, seats, date)?
            // Aggregate lock and map reference released here; persistence
            // below must not run under either.
        };
        let reservation_id = reservation.id;

        if let Err(error) = self.index.push(Arc::new(reservation)) {
            self.rollback_reserve(experience_id, &reservation_id);
            return Err(error);
        }
        if let Err(error) = self.persist() {
            self.rollback_reserve(experience_id, &reservation_id);
            self.index.remove(&reservation_id);
            return Err(error);
        }
        Ok(reservation_id)
    }

    /// Cancels the user's reservation at the target slot, or the earliest
    /// match when `date` is omitted. Removes the entire reservation; there
    /// is no partial-seat cancellation.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::ExperienceNotFound`] - Unknown experience id.
    /// - [`ReservationError::DateNotFound`] - Explicit date is not a slot.
    /// - [`ReservationError::ReservationNotFound`] - Nothing to cancel
    ///   (idempotent callers treat this as already canceled).
    /// - [`ReservationError::Storage`] - Persistence failed; the reservation
    ///   is restored at its original position.
    pub fn cancel(
        &self,
        experience_id: ExperienceId,
        user_id: UserId,
        date: Option<NaiveDate>,
    ) -> Result<(), ReservationError> {
        let (removed, position) = {
            let experience = self
                .experiences
                .get(&experience_id)
                .ok_or(ReservationError::ExperienceNotFound)?;
            experience.cancel_indexed(user_id, date)?
        };

        if let Err(error) = self.persist() {
            if let Some(experience) = self.experiences.get(&experience_id) {
                experience.restore(removed, position);
            }
            return Err(error);
        }
        self.index.remove(&removed.id);
        Ok(())
    }

    /// Dispatches a [`BookingRequest`] to [`Engine::reserve`] or
    /// [`Engine::cancel`]. Returns the reservation id for reserve operations.
    pub fn process(
        &self,
        request: BookingRequest,
    ) -> Result<Option<ReservationId>, ReservationError> {
        match request {
            BookingRequest::Reserve {
                experience_id,
                guest,
                seats,
                date,
            } => self
                .reserve(experience_id, &guest, seats, date)
                .map(Some),
            BookingRequest::Cancel {
                experience_id,
                user_id,
                date,
            } => self.cancel(experience_id, user_id, date).map(|_| None),
        }
    }

    /// Earliest slot with free capacity, or `None` when every slot is full.
    pub fn next_available(
        &self,
        experience_id: ExperienceId,
    ) -> Result<Option<DateSlot>, ReservationError> {
        let experience = self
            .experiences
            .get(&experience_id)
            .ok_or(ReservationError::ExperienceNotFound)?;
        Ok(experience.next_available())
    }

    /// Read-only projection for presentation layers. Never mutates.
    pub fn snapshot(
        &self,
        experience_id: ExperienceId,
        date: Option<NaiveDate>,
    ) -> Result<ExperienceView, ReservationError> {
        let experience = self
            .experiences
            .get(&experience_id)
            .ok_or(ReservationError::ExperienceNotFound)?;
        experience.snapshot(date)
    }

    /// Looks up an active reservation by id.
    pub fn find_reservation(&self, id: &ReservationId) -> Option<Arc<Reservation>> {
        self.index.get(id)
    }

    /// Number of active reservations across all experiences.
    pub fn active_reservations(&self) -> usize {
        self.index.len()
    }

    /// Returns an iterator over all experience aggregates.
    pub fn experiences(
        &self,
    ) -> impl Iterator<Item = dashmap::mapref::multiple::RefMulti<'_, ExperienceId, Experience>>
    {
        self.experiences.iter()
    }

    /// Retrieves an experience aggregate by id.
    pub fn get_experience(
        &self,
        experience_id: &ExperienceId,
    ) -> Option<dashmap::mapref::one::Ref<'_, ExperienceId, Experience>> {
        self.experiences.get(experience_id)
    }

    /// Canonical records of every ledger, sorted by experience id.
    pub fn records(&self) -> Vec<ExperienceRecord> {
        let mut records: Vec<ExperienceRecord> = self
            .experiences
            .iter()
            .map(|entry| entry.value().record())
            .collect();
        records.sort_by_key(|record| record.id);
        records
    }

    /// Saves the full ledger through the injected store, if any.
    pub fn persist(&self) -> Result<(), ReservationError> {
        if let Some(store) = &self.store {
            store.save(&self.records())?;
        }
        Ok(())
    }

    fn rollback_reserve(&self, experience_id: ExperienceId, reservation_id: &ReservationId) {
        if let Some(experience) = self.experiences.get(&experience_id) {
            experience.cancel_by_id(reservation_id);
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
