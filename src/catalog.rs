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

//! Static experience catalog configuration.

use crate::base::ExperienceId;
use crate::schedule::DEFAULT_HORIZON;
use crate::store::StorageError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_horizon() -> usize {
    DEFAULT_HORIZON
}

/// Catalog entry for one bookable experience.
///
/// Immutable at runtime; metadata edits happen through external admin
/// tooling and arrive as a fresh catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceConfig {
    pub id: ExperienceId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Seat capacity shared by every date slot of this experience.
    pub max_seats: u32,
    /// First bookable date; the remaining slots follow weekly.
    pub reference_date: NaiveDate,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
}

/// Reads a JSON catalog file (an array of [`ExperienceConfig`]).
pub fn load_catalog(path: &Path) -> Result<Vec<ExperienceConfig>, StorageError> {
    let bytes = fs::read(path).map_err(|error| StorageError::Unavailable(error.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|error| StorageError::Corrupt(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_defaults_to_eight() {
        let config: ExperienceConfig = serde_json::from_str(
            r#"{ "id": 1, "title": "Cellar tasting", "maxSeats": 10, "referenceDate": "2026-03-06" }"#,
        )
        .unwrap();
        assert_eq!(config.horizon, 8);
        assert_eq!(config.max_seats, 10);
    }
}
