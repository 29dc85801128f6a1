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

//! Schema normalization for persisted experience records.
//!
//! Stored records come in two shapes: the canonical per-date ledger
//! (`schemaVersion` 2, a populated `dates` array) and the legacy flat shape
//! (a single implicit reservation list with no date partition). Normalizing
//! migrates flat records into the canonical shape and passes canonical
//! records through unchanged, so the migration is idempotent. Seat totals
//! are conserved: every surviving legacy entry lands in the first generated
//! slot with its seat count intact.
//!
//! Malformed entries are a data-quality problem, not a load failure: they
//! are logged and skipped, and a record that cannot be read at all is
//! treated as having no prior reservations.

use crate::base::{ExperienceId, ReservationId, UserId};
use crate::error::ReservationError;
use crate::experience::{DateSlot, Reservation};
use crate::schedule::{self, DEFAULT_HORIZON};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Current canonical schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Canonical persisted shape of one experience ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceRecord {
    pub schema_version: u32,
    pub id: ExperienceId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_seats: u32,
    pub dates: Vec<DateSlot>,
}

impl ExperienceRecord {
    /// Total seats reserved across all slots.
    pub fn total_seats(&self) -> u32 {
        self.dates.iter().map(|slot| slot.reserved_seats).sum()
    }
}

/// A stored record before normalization: canonical, legacy, or anywhere
/// in between. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExperience {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub id: ExperienceId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub max_seats: u32,
    /// Present on canonical records.
    #[serde(default)]
    pub dates: Option<Vec<DateSlot>>,
    /// Present on legacy flat records; entries parsed individually so one
    /// bad entry cannot poison the rest.
    #[serde(default)]
    pub reservations: Option<Vec<Value>>,
    /// Legacy flat counter; the entries are the ledger of record.
    #[serde(default)]
    pub reserved_seats: Option<u32>,
    /// Reference date for slot generation on legacy records.
    #[serde(default)]
    pub reference_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyReservation {
    user_id: UserId,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    user_avatar: Option<String>,
    seats: u32,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Normalizes one raw record into the canonical per-date shape.
///
/// `reference` seeds slot generation for legacy records that do not carry
/// their own reference date. Canonical records pass through unchanged.
pub fn normalize(
    mut raw: RawExperience,
    reference: NaiveDate,
) -> Result<ExperienceRecord, ReservationError> {
    let title = raw
        .title
        .clone()
        .unwrap_or_else(|| format!("Experience {}", raw.id));

    if let Some(dates) = raw.dates.take() {
        // Already partitioned by date: a no-op apart from the version tag.
        return Ok(ExperienceRecord {
            schema_version: SCHEMA_VERSION,
            id: raw.id,
            title,
            description: raw.description,
            max_seats: raw.max_seats,
            dates,
        });
    }

    if raw.schema_version.is_some_and(|v| v >= SCHEMA_VERSION) {
        warn!(
            experience = %raw.id,
            "record tagged canonical but has no date partition; migrating as flat"
        );
    }

    migrate_flat(raw, title, reference)
}

/// v1 migration: generate the canonical slots and place every surviving
/// legacy reservation into the first one.
fn migrate_flat(
    raw: RawExperience,
    title: String,
    reference: NaiveDate,
) -> Result<ExperienceRecord, ReservationError> {
    let reference = raw.reference_date.unwrap_or(reference);
    let mut dates = schedule::generate(reference, DEFAULT_HORIZON)?;
    let first_date = dates[0].date;
    let fallback_timestamp = reference.and_time(NaiveTime::MIN).and_utc();

    let mut migrated = Vec::new();
    let mut total = 0u32;
    for entry in raw.reservations.unwrap_or_default() {
        let legacy: LegacyReservation = match serde_json::from_value(entry) {
            Ok(legacy) => legacy,
            Err(error) => {
                warn!(experience = %raw.id, %error, "skipping malformed legacy reservation");
                continue;
            }
        };
        if legacy.seats == 0 {
            warn!(experience = %raw.id, user = %legacy.user_id, "skipping zero-seat legacy reservation");
            continue;
        }
        total += legacy.seats;
        migrated.push(Reservation {
            id: ReservationId::new(),
            user_id: legacy.user_id,
            user_name: legacy.user_name.unwrap_or_default(),
            user_avatar: legacy.user_avatar,
            seats: legacy.seats,
            timestamp: legacy.timestamp.unwrap_or(fallback_timestamp),
            date: first_date,
        });
    }

    if raw.reserved_seats.is_some_and(|counter| counter != total) {
        warn!(
            experience = %raw.id,
            counter = raw.reserved_seats.unwrap_or(0),
            total,
            "legacy seat counter disagrees with entries; recomputed from entries"
        );
    }

    dates[0].reserved_seats = total;
    dates[0].reservations = migrated;

    Ok(ExperienceRecord {
        schema_version: SCHEMA_VERSION,
        id: raw.id,
        title,
        description: raw.description,
        max_seats: raw.max_seats,
        dates,
    })
}

/// Normalizes a whole stored catalog, skipping records that cannot be read.
pub fn normalize_all(values: Vec<Value>, reference: NaiveDate) -> Vec<ExperienceRecord> {
    values
        .into_iter()
        .filter_map(|value| {
            let raw: RawExperience = match serde_json::from_value(value) {
                Ok(raw) => raw,
                Err(error) => {
                    warn!(%error, "skipping unreadable experience record");
                    return None;
                }
            };
            let id = raw.id;
            match normalize(raw, reference) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(experience = %id, %error, "skipping unnormalizable experience record");
                    None
                }
            }
        })
        .collect()
}
