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

//! Booking operations.
//!
//! A [`BookingRequest`] targets one experience and resolves to a date slot
//! either explicitly or through the availability scan.

use crate::base::{ExperienceId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Calling user identity, supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingRequest {
    Reserve {
        experience_id: ExperienceId,
        guest: Guest,
        seats: u32,
        /// Explicit target date; `None` books the next available slot.
        date: Option<NaiveDate>,
    },
    Cancel {
        experience_id: ExperienceId,
        user_id: UserId,
        /// Explicit target date; `None` cancels the earliest match.
        date: Option<NaiveDate>,
    },
}

impl BookingRequest {
    pub fn experience_id(&self) -> ExperienceId {
        match self {
            Self::Reserve { experience_id, .. } => *experience_id,
            Self::Cancel { experience_id, .. } => *experience_id,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            Self::Reserve { guest, .. } => guest.user_id,
            Self::Cancel { user_id, .. } => *user_id,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Reserve { date, .. } => *date,
            Self::Cancel { date, .. } => *date,
        }
    }
}
