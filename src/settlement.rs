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

//! Dual-entry hour settlement.
//!
//! A settlement moves `hours` from a payer to a receiver and appends exactly
//! one debit and one credit to the log. Both accounts stay locked from the
//! balance check until both entries are written, so two settlements against
//! the same payer can never both pass the check on a stale balance.
//!
//! # Direction
//!
//! | Service kind | Payer     | Receiver  |
//! |--------------|-----------|-----------|
//! | Offer        | requester | owner     |
//! | Need         | owner     | requester |

use crate::MarketError;
use crate::account::lock_pair;
use crate::base::{RequestId, ServiceId, UserId};
use crate::ledger::Ledger;
use crate::request::Party;
use crate::service::ServiceKind;
use crate::transaction::{TimeTransaction, TransactionContext, TransactionKind};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Who pays whom, resolved once per completion from the service kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFlow {
    /// Owner provides the service; requester pays.
    OfferFlow,
    /// Requester provides the help the owner asked for; owner pays.
    NeedFlow,
}

impl PaymentFlow {
    pub fn for_kind(kind: ServiceKind) -> Self {
        match kind {
            ServiceKind::Offer => Self::OfferFlow,
            ServiceKind::Need => Self::NeedFlow,
        }
    }

    pub fn payer(self) -> Party {
        match self {
            Self::OfferFlow => Party::Requester,
            Self::NeedFlow => Party::Owner,
        }
    }

    pub fn receiver(self) -> Party {
        match self {
            Self::OfferFlow => Party::Owner,
            Self::NeedFlow => Party::Requester,
        }
    }

    /// Maps the roles onto concrete users as `(payer, receiver)`.
    pub fn resolve(self, owner: UserId, requester: UserId) -> (UserId, UserId) {
        let user = |party: Party| match party {
            Party::Owner => owner,
            Party::Requester => requester,
        };
        (user(self.payer()), user(self.receiver()))
    }
}

/// What a settlement is paying for.
#[derive(Debug, Clone)]
pub struct SettlementContext {
    pub service: ServiceId,
    pub request: RequestId,
    pub service_title: String,
    pub processed_by: UserId,
}

/// Receipt of a successful transfer.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub payer: UserId,
    pub receiver: UserId,
    pub hours: Decimal,
    pub debit: Arc<TimeTransaction>,
    pub credit: Arc<TimeTransaction>,
}

/// Transfers `hours` from `payer` to `receiver`.
///
/// Accounts are created empty if they do not exist yet.
///
/// # Errors
///
/// - [`MarketError::InvalidAmount`] - `hours` is not positive.
/// - [`MarketError::SelfRequest`] - payer and receiver are the same user.
/// - [`MarketError::InsufficientBalance`] - payer balance is below `hours`.
///
/// On error nothing is mutated and nothing is logged.
pub fn settle(
    ledger: &Ledger,
    payer: UserId,
    receiver: UserId,
    hours: Decimal,
    context: &SettlementContext,
) -> Result<Settlement, MarketError> {
    if hours <= Decimal::ZERO {
        return Err(MarketError::InvalidAmount(hours));
    }
    if payer == receiver {
        return Err(MarketError::SelfRequest);
    }

    let payer_account = ledger.get_or_create(payer);
    let receiver_account = ledger.get_or_create(receiver);
    let (mut payer_data, mut receiver_data) = lock_pair(&payer_account, &receiver_account);

    if payer_data.balance() < hours {
        warn!(
            %payer,
            required = %hours,
            available = %payer_data.balance(),
            request = %context.request,
            "settlement rejected"
        );
        return Err(MarketError::InsufficientBalance {
            required: hours,
            available: payer_data.balance(),
        });
    }

    // Both primitives are infallible past the checks above.
    payer_data.debit(hours)?;
    receiver_data.credit(hours)?;

    let links = TransactionContext {
        service: Some(context.service),
        request: Some(context.request),
        processed_by: Some(context.processed_by),
    };
    let log = ledger.log();
    let debit = log.append(
        payer,
        TransactionKind::Debit,
        hours,
        format!("Payment for service: {}", context.service_title),
        links,
    );
    let credit = log.append(
        receiver,
        TransactionKind::Credit,
        hours,
        format!("Earned from service: {}", context.service_title),
        links,
    );

    info!(
        %payer,
        %receiver,
        %hours,
        request = %context.request,
        "settled"
    );

    Ok(Settlement {
        payer,
        receiver,
        hours,
        debit,
        credit,
    })
}
