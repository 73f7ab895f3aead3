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

//! Time account (ledger) management.
//!
//! Every account keeps a running balance together with lifetime earned and
//! spent totals, so that at all times:
//!
//! ```text
//! balance = opening + adjusted + total_earned - total_spent
//! ```
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use timebank::{TimeAccount, UserId};
//!
//! let account = TimeAccount::new(UserId(1));
//! assert_eq!(account.balance(), dec!(0.00));
//! assert_eq!(account.participation_ratio(), 0.0);
//! ```

use crate::MarketError;
use crate::base::UserId;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub(crate) struct AccountData {
    user: UserId,
    balance: Decimal,
    total_earned: Decimal,
    total_spent: Decimal,
    /// Hours granted when the account was opened.
    opening: Decimal,
    /// Net sum of administrative adjustments.
    adjusted: Decimal,
}

impl AccountData {
    fn new(user: UserId, opening: Decimal) -> Self {
        Self {
            user,
            balance: opening,
            total_earned: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            opening,
            adjusted: Decimal::ZERO,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.total_earned >= Decimal::ZERO,
            "Invariant violated: total earned went negative: {}",
            self.total_earned
        );
        debug_assert!(
            self.total_spent >= Decimal::ZERO,
            "Invariant violated: total spent went negative: {}",
            self.total_spent
        );
        debug_assert_eq!(
            self.balance,
            self.opening + self.adjusted + self.total_earned - self.total_spent,
            "Invariant violated: balance does not reconcile with totals"
        );
    }

    pub(crate) fn user(&self) -> UserId {
        self.user
    }

    pub(crate) fn balance(&self) -> Decimal {
        self.balance
    }

    /// Increases balance and lifetime earnings.
    pub(crate) fn credit(&mut self, hours: Decimal) -> Result<(), MarketError> {
        if hours <= Decimal::ZERO {
            return Err(MarketError::InvalidAmount(hours));
        }
        self.balance += hours;
        self.total_earned += hours;
        self.assert_invariants();
        Ok(())
    }

    /// Decreases balance and increases lifetime spending.
    ///
    /// Never lets the balance drop below zero.
    pub(crate) fn debit(&mut self, hours: Decimal) -> Result<(), MarketError> {
        if hours <= Decimal::ZERO {
            return Err(MarketError::InvalidAmount(hours));
        }
        if self.balance < hours {
            return Err(MarketError::InsufficientBalance {
                required: hours,
                available: self.balance,
            });
        }
        self.balance -= hours;
        self.total_spent += hours;
        self.assert_invariants();
        Ok(())
    }

    /// Applies a signed administrative correction. May go negative.
    pub(crate) fn adjust(&mut self, hours: Decimal) -> Result<(), MarketError> {
        if hours.is_zero() {
            return Err(MarketError::InvalidAmount(hours));
        }
        self.balance += hours;
        self.adjusted += hours;
        self.assert_invariants();
        Ok(())
    }

    fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            user: self.user,
            balance: self.balance,
            total_earned: self.total_earned,
            total_spent: self.total_spent,
        }
    }
}

/// Ledger account for a single user.
#[derive(Debug)]
pub struct TimeAccount {
    inner: Mutex<AccountData>,
}

impl TimeAccount {
    /// Opens an empty account.
    pub fn new(user: UserId) -> Self {
        Self::with_opening_balance(user, Decimal::ZERO)
    }

    /// Opens an account pre-loaded with `opening` hours.
    pub fn with_opening_balance(user: UserId, opening: Decimal) -> Self {
        Self {
            inner: Mutex::new(AccountData::new(user, opening)),
        }
    }

    pub fn user(&self) -> UserId {
        self.inner.lock().user
    }

    pub fn balance(&self) -> Decimal {
        self.inner.lock().balance
    }

    pub fn total_earned(&self) -> Decimal {
        self.inner.lock().total_earned
    }

    pub fn total_spent(&self) -> Decimal {
        self.inner.lock().total_spent
    }

    pub fn opening_balance(&self) -> Decimal {
        self.inner.lock().opening
    }

    pub fn is_positive_balance(&self) -> bool {
        self.snapshot().is_positive_balance()
    }

    pub fn participation_ratio(&self) -> f64 {
        self.snapshot().participation_ratio()
    }

    /// Consistent copy of all figures taken under one lock.
    pub fn snapshot(&self) -> AccountSnapshot {
        self.inner.lock().snapshot()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AccountData> {
        self.inner.lock()
    }
}

/// Locks two distinct accounts in ascending user order.
///
/// Guards are returned in argument order. Every code path that needs two
/// accounts at once goes through here so the lock graph stays acyclic.
pub(crate) fn lock_pair<'a>(
    first: &'a TimeAccount,
    second: &'a TimeAccount,
) -> (MutexGuard<'a, AccountData>, MutexGuard<'a, AccountData>) {
    let first_user = first.user();
    let second_user = second.user();
    debug_assert_ne!(first_user, second_user, "cannot lock an account twice");

    if first_user < second_user {
        let a = first.lock();
        let b = second.lock();
        (a, b)
    } else {
        let b = second.lock();
        let a = first.lock();
        (a, b)
    }
}

/// Point-in-time view of an account, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub user: UserId,
    pub balance: Decimal,
    pub total_earned: Decimal,
    pub total_spent: Decimal,
}

impl AccountSnapshot {
    pub fn is_positive_balance(&self) -> bool {
        self.balance > Decimal::ZERO
    }

    /// Ratio of giving to receiving (`total_earned / total_spent`).
    ///
    /// With nothing spent the ratio is `+inf` if anything was earned and
    /// `0` otherwise.
    pub fn participation_ratio(&self) -> f64 {
        if self.total_spent.is_zero() {
            return if self.total_earned > Decimal::ZERO {
                f64::INFINITY
            } else {
                0.0
            };
        }
        (self.total_earned / self.total_spent)
            .to_f64()
            .unwrap_or(f64::NAN)
    }

    /// Rounds every figure to `dp` decimal places (banker's rounding) and pads
    /// shorter ones, so `0` reports as `0.00` at two places.
    pub fn rounded(self, dp: u32) -> Self {
        Self {
            balance: to_places(self.balance, dp),
            total_earned: to_places(self.total_earned, dp),
            total_spent: to_places(self.total_spent, dp),
            ..self
        }
    }
}

fn to_places(value: Decimal, dp: u32) -> Decimal {
    let mut value = value.round_dp(dp);
    value.rescale(dp);
    value
}
