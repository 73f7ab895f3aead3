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

//! The books: one [`TimeAccount`] per user plus the [`TransactionLog`].
//!
//! Accounts are only mutated here (administrative adjustment, opening grant)
//! and in [`settlement`](crate::settlement).

use crate::MarketError;
use crate::account::TimeAccount;
use crate::base::UserId;
use crate::transaction::{TimeTransaction, TransactionContext, TransactionKind};
use crate::transaction_log::TransactionLog;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct Ledger {
    /// Accounts indexed by owner.
    accounts: DashMap<UserId, Arc<TimeAccount>>,
    log: TransactionLog,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's account, creating an empty one if none exists.
    pub fn get_or_create(&self, user: UserId) -> Arc<TimeAccount> {
        let account = self.accounts.entry(user).or_insert_with(|| {
            debug!(%user, "opening empty time account");
            Arc::new(TimeAccount::new(user))
        });
        Arc::clone(account.value())
    }

    /// Opens the user's account with `grant` hours, recording the grant as
    /// a bonus entry. An existing account is returned untouched.
    ///
    /// [`MarketConfig`](crate::MarketConfig) refuses negative grants; one
    /// passed here directly is logged as an adjustment.
    pub fn open(&self, user: UserId, grant: Decimal) -> Arc<TimeAccount> {
        match self.accounts.entry(user) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let account = Arc::new(TimeAccount::with_opening_balance(user, grant));
                if !grant.is_zero() {
                    // A negative opening balance still has to show up in the log.
                    let kind = if grant > Decimal::ZERO {
                        TransactionKind::Bonus
                    } else {
                        TransactionKind::Adjustment
                    };
                    self.log.append(
                        user,
                        kind,
                        grant,
                        "Welcome grant",
                        TransactionContext::default(),
                    );
                }
                info!(%user, %grant, "opened time account");
                entry.insert(Arc::clone(&account));
                account
            }
        }
    }

    pub fn get(&self, user: UserId) -> Result<Arc<TimeAccount>, MarketError> {
        self.accounts
            .get(&user)
            .map(|account| Arc::clone(account.value()))
            .ok_or(MarketError::UserNotFound(user))
    }

    /// Applies an administrative correction of `hours` (signed).
    ///
    /// This is the only path that may take a balance below zero. Positive
    /// corrections are logged as [`TransactionKind::Bonus`], negative ones as
    /// [`TransactionKind::Adjustment`].
    pub fn adjust(
        &self,
        user: UserId,
        hours: Decimal,
        processed_by: UserId,
        description: impl Into<String>,
    ) -> Result<Arc<TimeTransaction>, MarketError> {
        let account = self.get_or_create(user);
        let mut data = account.lock();
        data.adjust(hours)?;

        let kind = if hours > Decimal::ZERO {
            TransactionKind::Bonus
        } else {
            TransactionKind::Adjustment
        };
        let context = TransactionContext {
            processed_by: Some(processed_by),
            ..Default::default()
        };
        let transaction = self.log.append(user, kind, hours, description, context);
        info!(%user, %hours, by = %processed_by, balance = %data.balance(), "adjusted balance");
        Ok(transaction)
    }

    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    /// All accounts ordered by user.
    pub fn accounts(&self) -> Vec<Arc<TimeAccount>> {
        let mut accounts: Vec<_> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        accounts.sort_by_key(|account| account.user());
        accounts
    }

    /// Sum of every account balance.
    pub fn total_balance(&self) -> Decimal {
        self.accounts
            .iter()
            .map(|entry| entry.value().balance())
            .sum()
    }
}
