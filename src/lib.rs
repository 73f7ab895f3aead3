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

//! # Time Bank
//!
//! This library provides the engine of a time-banking marketplace: members
//! exchange services for hours of credit. It drives a service request from
//! creation through mutual approval and execution to completion, and settles
//! the hours between the two parties with paired ledger entries.
//!
//! ## Core Components
//!
//! - [`Marketplace`]: Request lifecycle and orchestration
//! - [`Ledger`] / [`TimeAccount`]: Per-user hour balances
//! - [`TransactionLog`] / [`TimeTransaction`]: Append-only history of every balance change
//! - [`settle`]: Atomic dual-entry transfer used at completion
//! - [`MarketError`]: Error types for rejected operations
//!
//! ## Example
//!
//! ```
//! use timebank::{Decision, Marketplace, NewService, ServiceKind, UserId};
//! use rust_decimal_macros::dec;
//!
//! let market = Marketplace::new();
//! let (owner, requester) = (UserId(1), UserId(2));
//! market.register_user(owner);
//! market.register_user(requester);
//!
//! let service = market
//!     .post_service(owner, NewService {
//!         kind: ServiceKind::Offer,
//!         title: "Bike repair".into(),
//!         description: "Tune-ups and flat tyres".into(),
//!         estimated_hours: Some(2),
//!     })
//!     .unwrap();
//!
//! let request = market.create_request(requester, service.id, "").unwrap();
//! market.decide(request.id, owner, Decision::Accept, None).unwrap();
//! market.approve_start(request.id, owner).unwrap();
//! market.approve_start(request.id, requester).unwrap();
//! market.complete(request.id, requester).unwrap();
//!
//! assert_eq!(market.account(requester).balance(), dec!(1.00));
//! assert_eq!(market.account(owner).balance(), dec!(5.00));
//! ```
//!
//! ## Thread Safety
//!
//! The marketplace handles concurrent access: operations on different
//! requests proceed in parallel, and settlements touching the same account
//! are serialized on that account's lock.

pub mod account;
mod base;
pub mod config;
mod conversation;
pub mod error;
mod ledger;
mod marketplace;
mod request;
mod service;
pub mod settlement;
mod transaction;
mod transaction_log;

pub use account::{AccountSnapshot, TimeAccount};
pub use base::{ConversationId, RequestId, ServiceId, TransactionId, UserId};
pub use config::MarketConfig;
pub use conversation::Conversation;
pub use error::MarketError;
pub use ledger::Ledger;
pub use marketplace::{Completion, Marketplace};
pub use request::{Approvals, Decision, Party, RequestStatus, ServiceRequest};
pub use service::{NewService, Service, ServiceFilter, ServiceKind, ServiceStatus};
pub use settlement::{PaymentFlow, Settlement, SettlementContext, settle};
pub use transaction::{TimeTransaction, TransactionContext, TransactionKind, TransactionStatus};
pub use transaction_log::{TransactionFilter, TransactionLog};
