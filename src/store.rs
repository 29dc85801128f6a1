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

//! Ledger persistence.
//!
//! The engine holds an injected [`ReservationStore`] handle and never talks
//! to a concrete storage technology directly. The bundled [`JsonFileStore`]
//! persists the canonical JSON layout with an optional serialized-size
//! budget: when the canonical form exceeds the budget it falls back to a
//! compact schema that still conserves every `(userId, seats, date)` triple,
//! and when even that is too large the write is rejected outright. Nothing
//! is ever silently dropped or partially written.

use crate::base::{ExperienceId, UserId};
use crate::normalize::{self, ExperienceRecord, SCHEMA_VERSION};
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::warn;

/// Persistence-layer failures.
///
/// These are fatal for the triggering write; the engine rolls the in-memory
/// mutation back before surfacing them. Callers retry with backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Serialized ledger exceeds the size budget even in compact form
    #[error("storage quota exceeded ({bytes} bytes over a {budget} byte budget)")]
    QuotaExceeded { bytes: usize, budget: usize },

    /// Underlying storage cannot be read or written
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored ledger exists but cannot be parsed at all
    #[error("stored ledger is corrupt: {0}")]
    Corrupt(String),
}

/// Load/save contract the engine depends on.
///
/// Implementations backed by remote storage should let callers apply a
/// request-level timeout and treat a timeout as unknown rather than as a
/// confirmed failure.
pub trait ReservationStore: Send + Sync {
    fn load(&self) -> Result<Vec<ExperienceRecord>, StorageError>;
    fn save(&self, records: &[ExperienceRecord]) -> Result<(), StorageError>;
}

// === Compact fallback schema ===
//
// Conserves every (userId, seats, date) triple; identity metadata is
// sacrificed. Field names stay within the canonical layout so compact
// files load back through the normal path.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompactReservation {
    user_id: UserId,
    seats: u32,
    date: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompactSlot {
    date: NaiveDate,
    reserved_seats: u32,
    reservations: Vec<CompactReservation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompactRecord {
    schema_version: u32,
    id: ExperienceId,
    title: String,
    max_seats: u32,
    dates: Vec<CompactSlot>,
}

fn compact(records: &[ExperienceRecord]) -> Vec<CompactRecord> {
    records
        .iter()
        .map(|record| CompactRecord {
            schema_version: SCHEMA_VERSION,
            id: record.id,
            title: record.title.clone(),
            max_seats: record.max_seats,
            dates: record
                .dates
                .iter()
                .map(|slot| CompactSlot {
                    date: slot.date,
                    reserved_seats: slot.reserved_seats,
                    reservations: slot
                        .reservations
                        .iter()
                        .map(|r| CompactReservation {
                            user_id: r.user_id,
                            seats: r.seats,
                            date: r.date,
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

/// JSON-file ledger store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    budget: Option<usize>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            budget: None,
        }
    }

    /// Caps the serialized ledger at `budget` bytes.
    pub fn with_budget(path: impl Into<PathBuf>, budget: usize) -> Self {
        Self {
            path: path.into(),
            budget: Some(budget),
        }
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

impl ReservationStore for JsonFileStore {
    fn load(&self) -> Result<Vec<ExperienceRecord>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StorageError::Unavailable(error.to_string())),
        };
        let values: Vec<Value> = serde_json::from_slice(&bytes)
            .map_err(|error| StorageError::Corrupt(error.to_string()))?;
        Ok(normalize::normalize_all(values, Utc::now().date_naive()))
    }

    fn save(&self, records: &[ExperienceRecord]) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|error| StorageError::Corrupt(error.to_string()))?;

        let Some(budget) = self.budget else {
            return self.write_atomic(&bytes);
        };
        if bytes.len() <= budget {
            return self.write_atomic(&bytes);
        }

        warn!(
            bytes = bytes.len(),
            budget, "ledger exceeds size budget; falling back to compact schema"
        );
        let compact_bytes = serde_json::to_vec(&compact(records))
            .map_err(|error| StorageError::Corrupt(error.to_string()))?;
        if compact_bytes.len() > budget {
            return Err(StorageError::QuotaExceeded {
                bytes: compact_bytes.len(),
                budget,
            });
        }
        self.write_atomic(&compact_bytes)
    }
}

/// In-memory store for tests and demos.
///
/// `fail_saves` simulates a storage outage so rollback paths can be
/// exercised deterministically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ExperienceRecord>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ExperienceRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved snapshot.
    pub fn records(&self) -> Vec<ExperienceRecord> {
        self.records.lock().clone()
    }
}

impl ReservationStore for MemoryStore {
    fn load(&self) -> Result<Vec<ExperienceRecord>, StorageError> {
        Ok(self.records.lock().clone())
    }

    fn save(&self, records: &[ExperienceRecord]) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("simulated outage".into()));
        }
        *self.records.lock() = records.to_vec();
        Ok(())
    }
}
