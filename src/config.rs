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

//! Marketplace configuration.

use crate::MarketError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Tunables for a [`Marketplace`](crate::Marketplace).
///
/// | Field               | Default |
/// |---------------------|---------|
/// | `starting_grant`    | `3.00`  |
/// | `display_precision` | `2`     |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketConfig {
    /// Hours credited to every account opened at registration.
    pub starting_grant: Decimal,
    /// Decimal places used when reporting balances.
    pub display_precision: u32,
}

impl MarketConfig {
    pub const DEFAULT_STARTING_GRANT: Decimal = dec!(3.00);
    pub const DEFAULT_DISPLAY_PRECISION: u32 = 2;

    /// Sets the registration grant. Grants below zero are refused.
    pub fn with_starting_grant(mut self, starting_grant: Decimal) -> Result<Self, MarketError> {
        if starting_grant < Decimal::ZERO {
            return Err(MarketError::InvalidAmount(starting_grant));
        }
        self.starting_grant = starting_grant;
        Ok(self)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            starting_grant: Self::DEFAULT_STARTING_GRANT,
            display_precision: Self::DEFAULT_DISPLAY_PRECISION,
        }
    }
}
