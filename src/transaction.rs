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

//! Time transaction records.
//!
//! Entries follow a small state machine:
//! - [`Pending`] → [`Completed`] (stamps `processed_at` once)
//! - [`Pending`] → [`Cancelled`] or [`Failed`]
//!
//! [`Pending`]: TransactionStatus::Pending
//! [`Completed`]: TransactionStatus::Completed
//! [`Cancelled`]: TransactionStatus::Cancelled
//! [`Failed`]: TransactionStatus::Failed

use crate::base::{RequestId, ServiceId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
    Adjustment,
    Bonus,
}

impl TransactionKind {
    /// Whether entries of this kind add to the balance.
    pub fn is_inflow(self) -> bool {
        matches!(self, Self::Credit | Self::Bonus)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
}

/// Links an entry back to whatever caused it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionContext {
    pub service: Option<ServiceId>,
    pub request: Option<RequestId>,
    /// Identity of the user or admin that triggered the entry.
    pub processed_by: Option<UserId>,
}

/// One immutable line of an account's history.
///
/// `amount` is always stored positive; the direction comes from `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeTransaction {
    pub id: TransactionId,
    pub account: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub description: String,
    pub context: TransactionContext,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl TimeTransaction {
    /// Builds a pending entry. The amount is normalised to its absolute value.
    pub fn new(
        id: TransactionId,
        account: UserId,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
        context: TransactionContext,
    ) -> Self {
        Self {
            id,
            account,
            kind,
            amount: amount.abs(),
            status: TransactionStatus::Pending,
            description: description.into(),
            context,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Returns `+amount` for credits and bonuses, `-amount` otherwise.
    pub fn signed_amount(&self) -> Decimal {
        if self.kind.is_inflow() {
            self.amount
        } else {
            -self.amount
        }
    }

    /// Moves the entry to `status`, stamping `processed_at` on the first
    /// transition to [`TransactionStatus::Completed`].
    pub fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
        if status == TransactionStatus::Completed && self.processed_at.is_none() {
            self.processed_at = Some(Utc::now());
        }
    }

    pub fn completed(mut self) -> Self {
        self.set_status(TransactionStatus::Completed);
        self
    }
}
