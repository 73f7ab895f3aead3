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

//! Thread-safe append-only transaction log.
//!
//! Entries are indexed by ID and by owning account. IDs are handed out in
//! append order, so sorting by ID recovers the history.

use crate::MarketError;
use crate::base::{LongIdSequence, TransactionId, UserId};
use crate::transaction::{
    TimeTransaction, TransactionContext, TransactionKind, TransactionStatus,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Optional filters for [`TransactionLog::history`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    fn matches(&self, tx: &TimeTransaction) -> bool {
        self.kind.is_none_or(|kind| tx.kind == kind)
            && self.status.is_none_or(|status| tx.status == status)
    }
}

/// Append-only log of every balance change.
///
/// Combines a [`DashMap`] keyed by transaction ID with a per-account index.
/// Entries are shared as `Arc` and never mutated once appended.
#[derive(Debug)]
pub struct TransactionLog {
    /// Entries by transaction ID.
    entries: DashMap<TransactionId, Arc<TimeTransaction>>,

    /// Transaction IDs per account, in append order.
    by_account: DashMap<UserId, Vec<TransactionId>>,

    ids: LongIdSequence,
}

impl TransactionLog {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            by_account: DashMap::new(),
            ids: LongIdSequence::new(),
        }
    }

    /// Appends a completed entry and returns it.
    pub fn append(
        &self,
        account: UserId,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
        context: TransactionContext,
    ) -> Arc<TimeTransaction> {
        let id = TransactionId(self.ids.next());
        let transaction =
            Arc::new(TimeTransaction::new(id, account, kind, amount, description, context).completed());

        self.entries.insert(id, Arc::clone(&transaction));
        self.by_account.entry(account).or_default().push(id);
        transaction
    }

    pub fn get(&self, id: TransactionId) -> Result<Arc<TimeTransaction>, MarketError> {
        self.entries
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(MarketError::TransactionNotFound(id))
    }

    /// Entries for `account` matching `filter`, newest first.
    pub fn history(&self, account: UserId, filter: TransactionFilter) -> Vec<Arc<TimeTransaction>> {
        let ids = match self.by_account.get(&account) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .rev()
            .filter_map(|id| self.entries.get(id).map(|entry| Arc::clone(entry.value())))
            .filter(|tx| filter.matches(tx))
            .collect()
    }

    /// Sum of the signed amounts of `account`'s completed entries.
    pub fn net_for(&self, account: UserId) -> Decimal {
        let filter = TransactionFilter {
            status: Some(TransactionStatus::Completed),
            ..Default::default()
        };
        self.history(account, filter)
            .iter()
            .map(|tx| tx.signed_amount())
            .sum()
    }

    /// All entries in append order.
    pub fn entries(&self) -> Vec<Arc<TimeTransaction>> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by_key(|tx| tx.id);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new()
    }
}
