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

//! Experience ledger aggregate.
//!
//! Each slot moves between two logical states:
//!
//  Slot (Open) ──reserve to capacity──► Slot (Full)
//         ▲                                  │
//         └────────────cancel────────────────┘
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use reserva_rs::{Experience, ExperienceConfig, ExperienceId};
//!
//! let config = ExperienceConfig {
//!     id: ExperienceId(1),
//!     title: "Cellar tasting".into(),
//!     description: None,
//!     max_seats: 10,
//!     reference_date: NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
//!     horizon: 8,
//! };
//! let experience = Experience::new(&config).unwrap();
//! assert_eq!(experience.max_seats(), 10);
//! ```

use crate::base::{ExperienceId, ReservationId, UserId};
use crate::booking::Guest;
use crate::catalog::ExperienceConfig;
use crate::error::ReservationError;
use crate::normalize::{ExperienceRecord, SCHEMA_VERSION};
use crate::schedule;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// One party's claim on seats at one date slot.
///
/// Serialized field names follow the persisted ledger layout (`userId`,
/// `userName`, `userAvatar`). Missing identity fields deserialize to
/// defaults so that compact-schema records load back cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    #[serde(default = "ReservationId::new")]
    pub id: ReservationId,
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    pub seats: u32,
    #[serde(default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
}

/// One bookable date for one experience.
///
/// `reservations` is kept in acceptance order; `reserved_seats` always equals
/// the sum of the entry seat counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateSlot {
    pub date: NaiveDate,
    pub reserved_seats: u32,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

impl DateSlot {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            reserved_seats: 0,
            reservations: Vec::new(),
        }
    }

    /// Seats still free at this slot under the given capacity.
    pub fn remaining(&self, max_seats: u32) -> u32 {
        max_seats.saturating_sub(self.reserved_seats)
    }

    pub fn is_full(&self, max_seats: u32) -> bool {
        self.reserved_seats >= max_seats
    }
}

/// Read-only projection of an experience for presentation layers.
///
/// `slot` is the explicitly requested date, or the next available one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceView {
    pub id: ExperienceId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_seats: u32,
    #[serde(default)]
    pub slot: Option<DateSlot>,
}

#[derive(Debug)]
struct ExperienceData {
    id: ExperienceId,
    title: String,
    description: Option<String>,
    max_seats: u32,
    /// Slots sorted ascending by date; never removed, only exhausted.
    slots: Vec<DateSlot>,
}

impl ExperienceData {
    fn assert_invariants(&self) {
        for slot in &self.slots {
            let sum: u32 = slot.reservations.iter().map(|r| r.seats).sum();
            debug_assert!(
                slot.reserved_seats == sum,
                "Invariant violated: slot {} counter {} != entry sum {}",
                slot.date,
                slot.reserved_seats,
                sum
            );
            debug_assert!(
                slot.reserved_seats <= self.max_seats,
                "Invariant violated: slot {} overbooked: {} > {}",
                slot.date,
                slot.reserved_seats,
                self.max_seats
            );
        }
    }

    fn slot_index(&self, date: NaiveDate) -> Option<usize> {
        self.slots.iter().position(|slot| slot.date == date)
    }

    /// First slot in ascending date order with free capacity.
    fn next_open_index(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| !slot.is_full(self.max_seats))
    }

    /// Earliest slot holding a reservation for `user_id`, with its position.
    fn holder(&self, user_id: UserId) -> Option<(usize, usize)> {
        self.slots.iter().enumerate().find_map(|(slot_idx, slot)| {
            slot.reservations
                .iter()
                .position(|r| r.user_id == user_id)
                .map(|res_idx| (slot_idx, res_idx))
        })
    }

    fn reserve(
        &mut self,
        guest: &Guest,
        seats: u32,
        date: Option<NaiveDate>,
    ) -> Result<Reservation, ReservationError> {
        if seats == 0 {
            return Err(ReservationError::InvalidSeats);
        }
        // One active reservation per user per experience, across all dates.
        if self.holder(guest.user_id).is_some() {
            return Err(ReservationError::DuplicateReservation);
        }

        let index = match date {
            Some(date) => self
                .slot_index(date)
                .ok_or(ReservationError::DateNotFound)?,
            None => self
                .next_open_index()
                .ok_or(ReservationError::NoAvailableDate)?,
        };

        let remaining = self.slots[index].remaining(self.max_seats);
        if seats > remaining {
            // All-or-nothing: never accept part of a request.
            return Err(ReservationError::CapacityExceeded {
                requested: seats,
                remaining,
            });
        }

        let slot = &mut self.slots[index];
        let reservation = Reservation {
            id: ReservationId::new(),
            user_id: guest.user_id,
            user_name: guest.user_name.clone(),
            user_avatar: guest.user_avatar.clone(),
            seats,
            timestamp: Utc::now(),
            date: slot.date,
        };
        slot.reservations.push(reservation.clone());
        slot.reserved_seats += seats;
        self.assert_invariants();
        Ok(reservation)
    }

    fn cancel(
        &mut self,
        user_id: UserId,
        date: Option<NaiveDate>,
    ) -> Result<(Reservation, usize), ReservationError> {
        let (slot_idx, res_idx) = match date {
            Some(date) => {
                let slot_idx = self
                    .slot_index(date)
                    .ok_or(ReservationError::DateNotFound)?;
                let res_idx = self.slots[slot_idx]
                    .reservations
                    .iter()
                    .position(|r| r.user_id == user_id)
                    .ok_or(ReservationError::ReservationNotFound)?;
                (slot_idx, res_idx)
            }
            // No date given: cancel the earliest match.
            None => self
                .holder(user_id)
                .ok_or(ReservationError::ReservationNotFound)?,
        };

        let slot = &mut self.slots[slot_idx];
        let reservation = slot.reservations.remove(res_idx);
        slot.reserved_seats -= reservation.seats;
        self.assert_invariants();
        Ok((reservation, res_idx))
    }

    fn cancel_by_id(&mut self, id: &ReservationId) -> Option<Reservation> {
        let (slot_idx, res_idx) = self.slots.iter().enumerate().find_map(|(slot_idx, slot)| {
            slot.reservations
                .iter()
                .position(|r| r.id == *id)
                .map(|res_idx| (slot_idx, res_idx))
        })?;
        let slot = &mut self.slots[slot_idx];
        let reservation = slot.reservations.remove(res_idx);
        slot.reserved_seats -= reservation.seats;
        self.assert_invariants();
        Some(reservation)
    }

    /// Reinserts a canceled reservation at its original position.
    fn restore(&mut self, reservation: Reservation, position: usize) {
        if let Some(slot_idx) = self.slot_index(reservation.date) {
            let slot = &mut self.slots[slot_idx];
            let position = position.min(slot.reservations.len());
            slot.reserved_seats += reservation.seats;
            slot.reservations.insert(position, reservation);
            self.assert_invariants();
        }
    }
}

/// Ledger aggregate for one experience.
///
/// The check-and-reserve and check-and-cancel sequences are serialized by the
/// inner mutex, which is the per-slot critical section that prevents two
/// concurrent callers from jointly overbooking a date.
#[derive(Debug)]
pub struct Experience {
    inner: Mutex<ExperienceData>,
}

impl Experience {
    /// Creates an experience from catalog configuration, generating its
    /// full slot inventory.
    pub fn new(config: &ExperienceConfig) -> Result<Self, ReservationError> {
        if config.max_seats == 0 {
            return Err(ReservationError::InvalidCapacity);
        }
        let slots = schedule::generate(config.reference_date, config.horizon)?;
        let data = ExperienceData {
            id: config.id,
            title: config.title.clone(),
            description: config.description.clone(),
            max_seats: config.max_seats,
            slots,
        };
        Ok(Self {
            inner: Mutex::new(data),
        })
    }

    /// Rehydrates an experience from its canonical persisted record.
    pub fn from_record(record: ExperienceRecord) -> Self {
        let mut slots = record.dates;
        slots.sort_by_key(|slot| slot.date);
        let data = ExperienceData {
            id: record.id,
            title: record.title,
            description: record.description,
            max_seats: record.max_seats,
            slots,
        };
        data.assert_invariants();
        Self {
            inner: Mutex::new(data),
        }
    }

    pub fn id(&self) -> ExperienceId {
        self.inner.lock().id
    }

    pub fn title(&self) -> String {
        self.inner.lock().title.clone()
    }

    pub fn max_seats(&self) -> u32 {
        self.inner.lock().max_seats
    }

    /// Reserved seat count at the given date, if it is a generated slot.
    pub fn reserved_at(&self, date: NaiveDate) -> Option<u32> {
        let data = self.inner.lock();
        data.slot_index(date)
            .map(|index| data.slots[index].reserved_seats)
    }

    /// Earliest slot with free capacity, or `None` when every slot is full.
    ///
    /// Pure read: clones the slot out of the ledger without mutating it.
    pub fn next_available(&self) -> Option<DateSlot> {
        let data = self.inner.lock();
        data.next_open_index().map(|index| data.slots[index].clone())
    }

    /// Read-only projection combining metadata with either the slot for
    /// `date` or the next available one.
    pub fn snapshot(&self, date: Option<NaiveDate>) -> Result<ExperienceView, ReservationError> {
        let data = self.inner.lock();
        let slot = match date {
            Some(date) => {
                let index = data
                    .slot_index(date)
                    .ok_or(ReservationError::DateNotFound)?;
                Some(data.slots[index].clone())
            }
            None => data.next_open_index().map(|index| data.slots[index].clone()),
        };
        Ok(ExperienceView {
            id: data.id,
            title: data.title.clone(),
            description: data.description.clone(),
            max_seats: data.max_seats,
            slot,
        })
    }

    /// Canonical persisted record of the full ledger state.
    pub fn record(&self) -> ExperienceRecord {
        let data = self.inner.lock();
        ExperienceRecord {
            schema_version: SCHEMA_VERSION,
            id: data.id,
            title: data.title.clone(),
            description: data.description.clone(),
            max_seats: data.max_seats,
            dates: data.slots.clone(),
        }
    }

    /// Validates and applies a reserve operation.
    ///
    /// The target slot is the explicit `date` if given, otherwise the next
    /// available one. Returns the accepted reservation.
    pub fn reserve(
        &self,
        guest: &Guest,
        seats: u32,
        date: Option<NaiveDate>,
    ) -> Result<Reservation, ReservationError> {
        self.inner.lock().reserve(guest, seats, date)
    }

    /// Removes the user's reservation at the target slot (or the earliest
    /// match when `date` is omitted), returning the removed reservation.
    pub fn cancel(
        &self,
        user_id: UserId,
        date: Option<NaiveDate>,
    ) -> Result<Reservation, ReservationError> {
        self.cancel_indexed(user_id, date)
            .map(|(reservation, _)| reservation)
    }

    /// Like [`Experience::cancel`], but also reports the position the
    /// reservation occupied within its slot so the engine can undo the
    /// removal if persistence fails.
    pub(crate) fn cancel_indexed(
        &self,
        user_id: UserId,
        date: Option<NaiveDate>,
    ) -> Result<(Reservation, usize), ReservationError> {
        self.inner.lock().cancel(user_id, date)
    }

    pub(crate) fn cancel_by_id(&self, id: &ReservationId) -> Option<Reservation> {
        self.inner.lock().cancel_by_id(id)
    }

    pub(crate) fn restore(&self, reservation: Reservation, position: usize) {
        self.inner.lock().restore(reservation, position);
    }
}

impl Serialize for Experience {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Serialize a consistent snapshot taken under the lock.
        self.record().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // === ExperienceData Internal Tests ===
    // These test the private ExperienceData methods directly.

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn guest(user: u32) -> Guest {
        Guest {
            user_id: UserId(user),
            user_name: format!("user {user}"),
            user_avatar: None,
        }
    }

    fn data(max_seats: u32, slot_count: usize) -> ExperienceData {
        ExperienceData {
            id: ExperienceId(1),
            title: "Cellar tasting".into(),
            description: None,
            max_seats,
            slots: (0..slot_count)
                .map(|week| DateSlot::empty(date(6 + 7 * week as u32)))
                .collect(),
        }
    }

    #[test]
    fn reserve_lands_on_first_open_slot() {
        let mut data = data(10, 2);
        let reservation = data.reserve(&guest(1), 4, None).unwrap();
        assert_eq!(reservation.date, date(6));
        assert_eq!(data.slots[0].reserved_seats, 4);
        assert_eq!(data.slots[1].reserved_seats, 0);
    }

    #[test]
    fn reserve_skips_full_slot() {
        let mut data = data(10, 2);
        data.reserve(&guest(1), 10, None).unwrap();
        let reservation = data.reserve(&guest(2), 1, None).unwrap();
        assert_eq!(reservation.date, date(13));
    }

    #[test]
    fn reserve_is_all_or_nothing() {
        let mut data = data(10, 1);
        data.reserve(&guest(1), 4, None).unwrap();

        let result = data.reserve(&guest(2), 7, None);
        assert_eq!(
            result,
            Err(ReservationError::CapacityExceeded {
                requested: 7,
                remaining: 6
            })
        );
        assert_eq!(data.slots[0].reserved_seats, 4);
        assert_eq!(data.slots[0].reservations.len(), 1);
    }

    #[test]
    fn reserve_rejects_zero_seats() {
        let mut data = data(10, 1);
        let result = data.reserve(&guest(1), 0, None);
        assert_eq!(result, Err(ReservationError::InvalidSeats));
    }

    #[test]
    fn reserve_rejects_second_reservation_for_user() {
        let mut data = data(10, 2);
        data.reserve(&guest(1), 2, None).unwrap();

        // Same slot and a different date are both rejected.
        assert_eq!(
            data.reserve(&guest(1), 1, Some(date(6))),
            Err(ReservationError::DuplicateReservation)
        );
        assert_eq!(
            data.reserve(&guest(1), 1, Some(date(13))),
            Err(ReservationError::DuplicateReservation)
        );
    }

    #[test]
    fn reserve_with_unknown_date_fails() {
        let mut data = data(10, 1);
        let result = data.reserve(&guest(1), 2, Some(date(7)));
        assert_eq!(result, Err(ReservationError::DateNotFound));
    }

    #[test]
    fn cancel_releases_seats() {
        let mut data = data(10, 1);
        data.reserve(&guest(1), 4, None).unwrap();
        data.reserve(&guest(2), 6, None).unwrap();

        let (removed, position) = data.cancel(UserId(1), None).unwrap();
        assert_eq!(removed.seats, 4);
        assert_eq!(position, 0);
        assert_eq!(data.slots[0].reserved_seats, 6);
        assert_eq!(data.slots[0].reservations.len(), 1);
    }

    #[test]
    fn cancel_keeps_survivor_order() {
        let mut data = data(10, 1);
        data.reserve(&guest(1), 2, None).unwrap();
        data.reserve(&guest(2), 2, None).unwrap();
        data.reserve(&guest(3), 2, None).unwrap();

        data.cancel(UserId(2), None).unwrap();

        let users: Vec<u32> = data.slots[0]
            .reservations
            .iter()
            .map(|r| r.user_id.0)
            .collect();
        assert_eq!(users, vec![1, 3]);
    }

    #[test]
    fn cancel_without_match_fails() {
        let mut data = data(10, 1);
        data.reserve(&guest(1), 4, None).unwrap();
        let result = data.cancel(UserId(9), None);
        assert_eq!(result, Err(ReservationError::ReservationNotFound));
        assert_eq!(data.slots[0].reserved_seats, 4);
    }

    #[test]
    fn restore_reinserts_at_original_position() {
        let mut data = data(10, 1);
        data.reserve(&guest(1), 2, None).unwrap();
        data.reserve(&guest(2), 2, None).unwrap();
        data.reserve(&guest(3), 2, None).unwrap();

        let (removed, position) = data.cancel(UserId(2), None).unwrap();
        data.restore(removed, position);

        let users: Vec<u32> = data.slots[0]
            .reservations
            .iter()
            .map(|r| r.user_id.0)
            .collect();
        assert_eq!(users, vec![1, 2, 3]);
        assert_eq!(data.slots[0].reserved_seats, 6);
    }

    #[test]
    fn cancel_by_id_removes_exact_reservation() {
        let mut data = data(10, 2);
        let first = data.reserve(&guest(1), 2, Some(date(6))).unwrap();
        data.reserve(&guest(2), 2, Some(date(13))).unwrap();

        let removed = data.cancel_by_id(&first.id).unwrap();
        assert_eq!(removed.id, first.id);
        assert_eq!(data.slots[0].reserved_seats, 0);
        assert_eq!(data.slots[1].reserved_seats, 2);
    }

    // === Serialization Tests ===

    #[test]
    fn serializer_uses_ledger_field_names() {
        let config = ExperienceConfig {
            id: ExperienceId(3),
            title: "Chef's table".into(),
            description: Some("Seven courses".into()),
            max_seats: 6,
            reference_date: date(6),
            horizon: 2,
        };
        let experience = Experience::new(&config).unwrap();
        experience.reserve(&guest(7), 2, None).unwrap();

        let json = serde_json::to_value(&experience).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["maxSeats"], 6);
        assert_eq!(json["dates"][0]["date"], "2026-03-06");
        assert_eq!(json["dates"][0]["reservedSeats"], 2);
        assert_eq!(json["dates"][0]["reservations"][0]["userId"], 7);
        assert_eq!(json["dates"][0]["reservations"][0]["userName"], "user 7");
        assert_eq!(json["dates"][1]["date"], "2026-03-13");
    }

    #[test]
    fn absent_avatar_is_omitted() {
        let reservation = Reservation {
            id: ReservationId::new(),
            user_id: UserId(1),
            user_name: "Ana".into(),
            user_avatar: None,
            seats: 2,
            timestamp: unix_epoch(),
            date: date(6),
        };
        let json = serde_json::to_value(&reservation).unwrap();
        assert!(json.get("userAvatar").is_none());
    }

    #[test]
    fn compact_reservation_deserializes_with_defaults() {
        let json = r#"{"userId": 4, "seats": 3, "date": "2026-03-06"}"#;
        let reservation: Reservation = serde_json::from_str(json).unwrap();
        assert_eq!(reservation.user_id, UserId(4));
        assert_eq!(reservation.seats, 3);
        assert_eq!(reservation.user_name, "");
        assert_eq!(reservation.timestamp, unix_epoch());
    }
}
