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

//! Time-bank marketplace engine.
//!
//! The [`Marketplace`] ties the service catalog, the request lifecycle and the
//! ledger together. Every operation takes the acting user's identity and
//! returns the updated record or a [`MarketError`].
//!
//! # Operations
//!
//! - **Create**: open a pending request against someone else's service.
//! - **Decide**: owner accepts or rejects a pending request.
//! - **Cancel**: requester withdraws a pending or accepted request.
//! - **Approve start**: each party gives the go-ahead; both move it in progress.
//! - **Propose / approve hours**: agree on the actual duration.
//! - **Complete**: settle the hours and close the request.
//!
//! # Thread Safety
//!
//! Requests and services are stored as individually locked rows inside
//! [`DashMap`]s, so operations on different requests run in parallel. Lock
//! order is always service row, then request row, then accounts (ascending
//! user), which keeps concurrent completions deadlock-free.

use crate::account::TimeAccount;
use crate::base::{ConversationId, IdSequence, RequestId, ServiceId, UserId};
use crate::config::MarketConfig;
use crate::conversation::{Conversation, Conversations};
use crate::ledger::Ledger;
use crate::request::{Decision, RequestStatus, ServiceRequest};
use crate::service::{NewService, Service, ServiceCatalog, ServiceFilter, ServiceStatus};
use crate::settlement::{PaymentFlow, Settlement, SettlementContext, settle};
use crate::transaction::TimeTransaction;
use crate::transaction_log::TransactionFilter;
use crate::MarketError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a successful [`Marketplace::complete`].
#[derive(Debug, Clone)]
pub struct Completion {
    pub request: ServiceRequest,
    pub settlement: Settlement,
    /// Status of the service after the completion side effects.
    pub service_status: ServiceStatus,
}

/// Marketplace engine managing services, requests and the books.
///
/// # Invariants
///
/// - At most one request ever exists per (requester, service) pair.
/// - A user never requests their own service.
/// - Completion settles exactly once; a failed settlement leaves the request
///   in progress and the ledger untouched.
/// - The sum of all balances only changes through registration grants and
///   administrative adjustments, never through settlement.
pub struct Marketplace {
    config: MarketConfig,
    catalog: ServiceCatalog,
    /// Request rows indexed by ID.
    requests: DashMap<RequestId, Arc<Mutex<ServiceRequest>>>,
    /// Uniqueness index over (requester, service).
    pairs: DashMap<(UserId, ServiceId), RequestId>,
    /// Requests per service, in creation order.
    by_service: DashMap<ServiceId, Vec<RequestId>>,
    ledger: Ledger,
    conversations: Conversations,
    request_ids: IdSequence,
}

impl Marketplace {
    /// Creates an empty marketplace with default configuration.
    pub fn new() -> Self {
        Self::with_config(MarketConfig::default())
    }

    pub fn with_config(config: MarketConfig) -> Self {
        Marketplace {
            config,
            catalog: ServiceCatalog::new(),
            requests: DashMap::new(),
            pairs: DashMap::new(),
            by_service: DashMap::new(),
            ledger: Ledger::new(),
            conversations: Conversations::new(),
            request_ids: IdSequence::new(),
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    // === Accounts ===

    /// Opens the user's time account with the configured starting grant.
    ///
    /// Called once at registration; calling it again returns the existing
    /// account without a second grant.
    pub fn register_user(&self, user: UserId) -> Arc<TimeAccount> {
        self.ledger.open(user, self.config.starting_grant)
    }

    /// Returns the user's account, creating an empty one if registration
    /// never ran.
    pub fn account(&self, user: UserId) -> Arc<TimeAccount> {
        self.ledger.get_or_create(user)
    }

    /// The user's transaction history, newest first.
    pub fn transactions(
        &self,
        user: UserId,
        filter: TransactionFilter,
    ) -> Vec<Arc<TimeTransaction>> {
        self.ledger.log().history(user, filter)
    }

    /// Administrative balance correction. See [`Ledger::adjust`].
    pub fn adjust(
        &self,
        user: UserId,
        hours: Decimal,
        processed_by: UserId,
        description: impl Into<String>,
    ) -> Result<Arc<TimeTransaction>, MarketError> {
        self.ledger.adjust(user, hours, processed_by, description)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // === Catalog ===

    pub fn post_service(&self, owner: UserId, new: NewService) -> Result<Service, MarketError> {
        self.catalog.post(owner, new)
    }

    pub fn service(&self, id: ServiceId) -> Result<Service, MarketError> {
        self.catalog.get(id)
    }

    pub fn services(&self, filter: &ServiceFilter) -> Vec<Service> {
        self.catalog.list(filter)
    }

    pub fn set_service_status(
        &self,
        id: ServiceId,
        actor: UserId,
        status: ServiceStatus,
    ) -> Result<Service, MarketError> {
        self.catalog.set_status(id, actor, status)
    }

    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.conversations.get(id)
    }

    // === Requests ===

    /// Opens a pending request from `requester` against `service_id`, along
    /// with a private conversation between the two parties.
    ///
    /// # Errors
    ///
    /// - [`MarketError::ServiceNotFound`] - Unknown service.
    /// - [`MarketError::DuplicateRequest`] - The pair already has a request,
    ///   whatever its status.
    /// - [`MarketError::SelfRequest`] - Requester owns the service.
    /// - [`MarketError::PreconditionFailed`] - Service is not active.
    pub fn create_request(
        &self,
        requester: UserId,
        service_id: ServiceId,
        message: impl Into<String>,
    ) -> Result<ServiceRequest, MarketError> {
        // Held until the request is indexed, so a concurrent `complete` on
        // this service either sees the new request or runs before it exists.
        let service_row = self.catalog.row(service_id)?;
        let service = service_row.lock();

        // Entry API gives an atomic check-and-insert on the pair.
        let slot = match self.pairs.entry((requester, service_id)) {
            Entry::Occupied(existing) => {
                let existing = self.row(*existing.get())?.lock().status;
                return Err(MarketError::DuplicateRequest { existing });
            }
            Entry::Vacant(slot) => slot,
        };
        if service.owner == requester {
            return Err(MarketError::SelfRequest);
        }
        if service.status != ServiceStatus::Active {
            return Err(MarketError::PreconditionFailed(
                "service is not accepting requests",
            ));
        }

        let mut request = ServiceRequest::new(
            RequestId(self.request_ids.next()),
            service.id,
            service.owner,
            requester,
            message.into(),
        );
        let conversation =
            self.conversations
                .open(service.id, &service.title, requester, service.owner);
        request.conversation = Some(conversation.id);

        self.requests
            .insert(request.id, Arc::new(Mutex::new(request.clone())));
        self.by_service
            .entry(service.id)
            .or_default()
            .push(request.id);
        slot.insert(request.id);

        info!(request = %request.id, %requester, service = %service.id, "request created");
        Ok(request)
    }

    pub fn request(&self, id: RequestId) -> Result<ServiceRequest, MarketError> {
        Ok(self.row(id)?.lock().clone())
    }

    /// Requests where `user` is the requester or the service owner, newest
    /// first.
    pub fn requests_for(&self, user: UserId) -> Vec<ServiceRequest> {
        let mut requests: Vec<_> = self
            .rows()
            .iter()
            .map(|row| row.lock().clone())
            .filter(|request| request.involves(user))
            .collect();
        requests.sort_by(|a, b| b.id.cmp(&a.id));
        requests
    }

    /// Owner accepts or rejects a pending request.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Forbidden`] - `actor` is not the service owner.
    /// - [`MarketError::InvalidTransition`] - Request is not pending.
    pub fn decide(
        &self,
        id: RequestId,
        actor: UserId,
        decision: Decision,
        note: Option<String>,
    ) -> Result<ServiceRequest, MarketError> {
        self.update(id, |request| {
            request.decide(actor, decision, note)?;
            info!(request = %id, status = %request.status, "request decided");
            Ok(())
        })
    }

    /// Requester withdraws a pending or accepted request.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Forbidden`] - `actor` is not the requester.
    /// - [`MarketError::InvalidTransition`] - Work has already started or the
    ///   request is closed.
    pub fn cancel(&self, id: RequestId, actor: UserId) -> Result<ServiceRequest, MarketError> {
        self.update(id, |request| {
            request.cancel(actor)?;
            info!(request = %id, "request cancelled");
            Ok(())
        })
    }

    /// Records one party's approval to start. When both have approved the
    /// request moves to [`RequestStatus::InProgress`].
    pub fn approve_start(
        &self,
        id: RequestId,
        actor: UserId,
    ) -> Result<ServiceRequest, MarketError> {
        self.update(id, |request| {
            if request.approve_start(actor)? {
                info!(request = %id, "request in progress");
            } else {
                debug!(request = %id, %actor, "start approved, waiting for other party");
            }
            Ok(())
        })
    }

    /// Proposes the actual duration; both hour approvals are reset.
    pub fn propose_hours(
        &self,
        id: RequestId,
        actor: UserId,
        hours: Decimal,
    ) -> Result<ServiceRequest, MarketError> {
        self.update(id, |request| {
            request.propose_hours(actor, hours)?;
            info!(request = %id, %actor, %hours, "hours proposed");
            Ok(())
        })
    }

    pub fn approve_hours(
        &self,
        id: RequestId,
        actor: UserId,
    ) -> Result<ServiceRequest, MarketError> {
        self.update(id, |request| {
            request.approve_hours(actor)?;
            debug!(request = %id, %actor, "hours approved");
            Ok(())
        })
    }

    /// Completes an in-progress request and settles the hours.
    ///
    /// Hours are the agreed `actual_hours` when both parties approved them,
    /// otherwise the service estimate. Payment direction follows
    /// [`PaymentFlow`]. Once settled, the service is marked completed if no
    /// other request against it is still open.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Forbidden`] - `actor` is not a party.
    /// - [`MarketError::InvalidTransition`] - Request is not in progress.
    /// - [`MarketError::InvalidAmount`] - Resolved hours are not positive.
    /// - [`MarketError::InsufficientBalance`] - Payer cannot cover the hours;
    ///   the request stays in progress and no balance changes.
    pub fn complete(&self, id: RequestId, actor: UserId) -> Result<Completion, MarketError> {
        let row = self.row(id)?;
        let service_id = row.lock().service;
        let service_row = self.catalog.row(service_id)?;

        let mut service = service_row.lock();
        let mut request = row.lock();
        request.check_completable(actor)?;

        let hours = request.settlement_hours(service.estimated_decimal());
        if hours <= Decimal::ZERO {
            return Err(MarketError::InvalidAmount(hours));
        }

        let flow = PaymentFlow::for_kind(service.kind);
        let (payer, receiver) = flow.resolve(request.owner, request.requester);
        let context = SettlementContext {
            service: service.id,
            request: id,
            service_title: service.title.clone(),
            processed_by: actor,
        };
        let settlement = settle(&self.ledger, payer, receiver, hours, &context)?;
        request.mark_completed();

        if !self.has_open_requests(service_id, id) {
            service.status = ServiceStatus::Completed;
            service.updated_at = request.updated_at;
            info!(service = %service_id, "service completed");
        }
        info!(request = %id, ?flow, %hours, "request completed");

        Ok(Completion {
            request: request.clone(),
            settlement,
            service_status: service.status,
        })
    }

    // === Internals ===

    fn row(&self, id: RequestId) -> Result<Arc<Mutex<ServiceRequest>>, MarketError> {
        self.requests
            .get(&id)
            .map(|row| Arc::clone(row.value()))
            .ok_or(MarketError::RequestNotFound(id))
    }

    fn rows(&self) -> Vec<Arc<Mutex<ServiceRequest>>> {
        self.requests
            .iter()
            .map(|row| Arc::clone(row.value()))
            .collect()
    }

    /// Applies `f` to the locked request row and returns the new state.
    fn update<F>(&self, id: RequestId, f: F) -> Result<ServiceRequest, MarketError>
    where
        F: FnOnce(&mut ServiceRequest) -> Result<(), MarketError>,
    {
        let row = self.row(id)?;
        let mut request = row.lock();
        f(&mut request)?;
        Ok(request.clone())
    }

    /// Whether any request against `service`, other than `except`, is still
    /// non-terminal. Caller holds the service row lock.
    fn has_open_requests(&self, service: ServiceId, except: RequestId) -> bool {
        let ids = match self.by_service.get(&service) {
            Some(ids) => ids.value().clone(),
            None => return false,
        };
        ids.into_iter()
            .filter(|other| *other != except)
            .filter_map(|other| self.row(other).ok())
            .any(|row| !row.lock().status.is_terminal())
    }
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}
