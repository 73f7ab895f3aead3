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

//! Error types for marketplace operations.

use crate::base::{RequestId, ServiceId, TransactionId, UserId};
use crate::request::RequestStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Marketplace operation errors.
///
/// Every variant is user-visible; none of them is swallowed by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Actor is not allowed to perform the operation
    #[error("actor is not allowed to perform this action")]
    Forbidden,

    /// Operation is not valid in the request's current status
    #[error("cannot {action} a request that is {from}")]
    InvalidTransition {
        from: RequestStatus,
        action: &'static str,
    },

    /// A request already exists for this (requester, service) pair
    #[error("a {existing} request already exists for this service")]
    DuplicateRequest { existing: RequestStatus },

    /// Requester owns the service
    #[error("cannot request your own service")]
    SelfRequest,

    /// Hours are negative, or zero where a positive amount is required
    #[error("invalid amount of hours: {0}")]
    InvalidAmount(Decimal),

    /// A prerequisite for the operation is missing
    #[error("precondition failed: {0}")]
    PreconditionFailed(&'static str),

    /// Payer cannot cover the settlement
    #[error("insufficient balance: required {required}h, available {available}h")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("service {0} not found")]
    ServiceNotFound(ServiceId),

    #[error("service request {0} not found")]
    RequestNotFound(RequestId),

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
}
