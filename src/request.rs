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

//! Service request lifecycle.
//!
//! ```text
//!  Pending ──accept──► Accepted ──both approve start──► InProgress ──complete──► Completed
//!     │                   │
//!     ├──reject──► Rejected
//!     └──cancel──► Cancelled ◄──cancel──┘
//! ```
//!
//! Transitions here are pure record updates. Locking, settlement and the
//! service-level side effects live in [`Marketplace`](crate::Marketplace).

use crate::MarketError;
use crate::base::{ConversationId, RequestId, ServiceId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    /// `Completed`, `Rejected` and `Cancelled` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two participants of a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Owner,
    Requester,
}

/// Owner's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    fn status(self) -> RequestStatus {
        match self {
            Self::Accept => RequestStatus::Accepted,
            Self::Reject => RequestStatus::Rejected,
        }
    }
}

/// A pair of independent approval flags.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Approvals {
    pub owner: bool,
    pub requester: bool,
}

impl Approvals {
    /// Returns the flags with `party`'s approval set. Setting it again is a
    /// no-op.
    #[must_use]
    pub fn set(self, party: Party) -> Self {
        match party {
            Party::Owner => Self { owner: true, ..self },
            Party::Requester => Self {
                requester: true,
                ..self
            },
        }
    }

    pub fn both(self) -> bool {
        self.owner && self.requester
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub service: ServiceId,
    /// Owner of `service`, copied at creation.
    pub owner: UserId,
    pub requester: UserId,
    pub status: RequestStatus,
    pub start_approvals: Approvals,
    /// Agreed duration; overrides the service estimate once both approve it.
    pub actual_hours: Option<Decimal>,
    pub hour_approvals: Approvals,
    pub message: String,
    pub response_note: Option<String>,
    pub conversation: Option<ConversationId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl ServiceRequest {
    pub(crate) fn new(
        id: RequestId,
        service: ServiceId,
        owner: UserId,
        requester: UserId,
        message: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            service,
            owner,
            requester,
            status: RequestStatus::Pending,
            start_approvals: Approvals::default(),
            actual_hours: None,
            hour_approvals: Approvals::default(),
            message,
            response_note: None,
            conversation: None,
            created_at: now,
            updated_at: now,
            responded_at: None,
        }
    }

    /// Resolves `actor`'s role in this request.
    ///
    /// # Errors
    ///
    /// [`MarketError::Forbidden`] if `actor` is neither owner nor requester.
    pub fn party(&self, actor: UserId) -> Result<Party, MarketError> {
        if actor == self.owner {
            Ok(Party::Owner)
        } else if actor == self.requester {
            Ok(Party::Requester)
        } else {
            Err(MarketError::Forbidden)
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.party(user).is_ok()
    }

    fn expect_status(
        &self,
        allowed: &[RequestStatus],
        action: &'static str,
    ) -> Result<(), MarketError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(MarketError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Owner accepts or rejects a pending request.
    pub(crate) fn decide(
        &mut self,
        actor: UserId,
        decision: Decision,
        note: Option<String>,
    ) -> Result<(), MarketError> {
        if actor != self.owner {
            return Err(MarketError::Forbidden);
        }
        self.expect_status(&[RequestStatus::Pending], "decide")?;

        self.status = decision.status();
        self.response_note = note;
        self.touch();
        self.responded_at = Some(self.updated_at);
        Ok(())
    }

    /// Requester withdraws before work starts.
    pub(crate) fn cancel(&mut self, actor: UserId) -> Result<(), MarketError> {
        if actor != self.requester {
            return Err(MarketError::Forbidden);
        }
        self.expect_status(&[RequestStatus::Pending, RequestStatus::Accepted], "cancel")?;

        self.status = RequestStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Records `actor`'s go-ahead. Returns `true` if this moved the request
    /// to [`RequestStatus::InProgress`].
    pub(crate) fn approve_start(&mut self, actor: UserId) -> Result<bool, MarketError> {
        let party = self.party(actor)?;
        self.expect_status(&[RequestStatus::Accepted], "approve the start of")?;

        self.start_approvals = self.start_approvals.set(party);
        self.touch();
        if self.start_approvals.both() {
            self.status = RequestStatus::InProgress;
            return Ok(true);
        }
        Ok(false)
    }

    /// Replaces the proposed duration and clears both hour approvals.
    pub(crate) fn propose_hours(&mut self, actor: UserId, hours: Decimal) -> Result<(), MarketError> {
        self.party(actor)?;
        self.expect_status(
            &[RequestStatus::InProgress, RequestStatus::Completed],
            "propose hours for",
        )?;
        if hours < Decimal::ZERO {
            return Err(MarketError::InvalidAmount(hours));
        }

        self.actual_hours = Some(hours);
        self.hour_approvals = Approvals::default();
        self.touch();
        Ok(())
    }

    pub(crate) fn approve_hours(&mut self, actor: UserId) -> Result<(), MarketError> {
        let party = self.party(actor)?;
        if self.proposed_hours().is_none() {
            return Err(MarketError::PreconditionFailed(
                "actual hours must be proposed first",
            ));
        }

        self.hour_approvals = self.hour_approvals.set(party);
        self.touch();
        Ok(())
    }

    /// Hours owed at completion: the agreed `actual_hours` when both parties
    /// approved them, otherwise `estimated`.
    pub fn settlement_hours(&self, estimated: Decimal) -> Decimal {
        match self.proposed_hours() {
            Some(hours) if self.hour_approvals.both() => hours,
            _ => estimated,
        }
    }

    /// A proposal of zero hours counts as no proposal.
    fn proposed_hours(&self) -> Option<Decimal> {
        self.actual_hours.filter(|hours| !hours.is_zero())
    }

    /// Checks that `actor` may complete the request right now.
    pub(crate) fn check_completable(&self, actor: UserId) -> Result<Party, MarketError> {
        let party = self.party(actor)?;
        self.expect_status(&[RequestStatus::InProgress], "complete")?;
        Ok(party)
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = RequestStatus::Completed;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const OWNER: UserId = UserId(1);
    const REQUESTER: UserId = UserId(2);
    const STRANGER: UserId = UserId(3);

    fn pending() -> ServiceRequest {
        ServiceRequest::new(RequestId(1), ServiceId(1), OWNER, REQUESTER, String::new())
    }

    fn in_progress() -> ServiceRequest {
        let mut request = pending();
        request.decide(OWNER, Decision::Accept, None).unwrap();
        request.approve_start(OWNER).unwrap();
        request.approve_start(REQUESTER).unwrap();
        request
    }

    // === Approvals ===

    #[test]
    fn set_approval_is_idempotent() {
        let flags = Approvals::default().set(Party::Owner);
        assert_eq!(flags, flags.set(Party::Owner));
        assert!(!flags.both());
        assert!(flags.set(Party::Requester).both());
    }

    // === Decide ===

    #[test]
    fn owner_accepts_pending_request() {
        let mut request = pending();
        request
            .decide(OWNER, Decision::Accept, Some("see you Saturday".into()))
            .unwrap();
        assert_eq!(request.status, RequestStatus::Accepted);
        assert!(request.responded_at.is_some());
        assert_eq!(request.response_note.as_deref(), Some("see you Saturday"));
    }

    #[test]
    fn requester_cannot_decide() {
        let mut request = pending();
        assert_eq!(
            request.decide(REQUESTER, Decision::Accept, None),
            Err(MarketError::Forbidden)
        );
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.responded_at.is_none());
    }

    #[test]
    fn decide_twice_is_invalid() {
        let mut request = pending();
        request.decide(OWNER, Decision::Reject, None).unwrap();
        assert_eq!(
            request.decide(OWNER, Decision::Accept, None),
            Err(MarketError::InvalidTransition {
                from: RequestStatus::Rejected,
                action: "decide",
            })
        );
    }

    // === Cancel ===

    #[test]
    fn requester_cancels_accepted_request() {
        let mut request = pending();
        request.decide(OWNER, Decision::Accept, None).unwrap();
        request.cancel(REQUESTER).unwrap();
        assert_eq!(request.status, RequestStatus::Cancelled);
    }

    #[test]
    fn owner_cannot_cancel() {
        let mut request = pending();
        assert_eq!(request.cancel(OWNER), Err(MarketError::Forbidden));
    }

    #[test]
    fn cancel_after_start_is_invalid() {
        let mut request = in_progress();
        assert!(matches!(
            request.cancel(REQUESTER),
            Err(MarketError::InvalidTransition {
                from: RequestStatus::InProgress,
                ..
            })
        ));
    }

    // === Approve start ===

    #[test]
    fn start_needs_both_parties() {
        let mut request = pending();
        request.decide(OWNER, Decision::Accept, None).unwrap();

        assert!(!request.approve_start(OWNER).unwrap());
        assert_eq!(request.status, RequestStatus::Accepted);

        // Re-approving is a no-op success.
        assert!(!request.approve_start(OWNER).unwrap());
        assert_eq!(request.status, RequestStatus::Accepted);

        assert!(request.approve_start(REQUESTER).unwrap());
        assert_eq!(request.status, RequestStatus::InProgress);
    }

    #[test]
    fn approve_start_requires_accepted() {
        let mut request = pending();
        assert!(matches!(
            request.approve_start(OWNER),
            Err(MarketError::InvalidTransition {
                from: RequestStatus::Pending,
                ..
            })
        ));
    }

    #[test]
    fn stranger_cannot_approve_start() {
        let mut request = pending();
        request.decide(OWNER, Decision::Accept, None).unwrap();
        assert_eq!(request.approve_start(STRANGER), Err(MarketError::Forbidden));
    }

    // === Hours ===

    #[test]
    fn proposing_hours_resets_approvals() {
        let mut request = in_progress();
        request.propose_hours(OWNER, dec!(1.5)).unwrap();
        request.approve_hours(OWNER).unwrap();
        request.approve_hours(REQUESTER).unwrap();
        assert!(request.hour_approvals.both());

        request.propose_hours(REQUESTER, dec!(2)).unwrap();
        assert_eq!(request.actual_hours, Some(dec!(2)));
        assert_eq!(request.hour_approvals, Approvals::default());
    }

    #[test]
    fn negative_hours_rejected() {
        let mut request = in_progress();
        assert_eq!(
            request.propose_hours(OWNER, dec!(-0.5)),
            Err(MarketError::InvalidAmount(dec!(-0.5)))
        );
        assert_eq!(request.actual_hours, None);
    }

    #[test]
    fn hours_cannot_be_proposed_before_start() {
        let mut request = pending();
        assert!(matches!(
            request.propose_hours(OWNER, dec!(1)),
            Err(MarketError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn approve_hours_requires_proposal() {
        let mut request = in_progress();
        assert!(matches!(
            request.approve_hours(OWNER),
            Err(MarketError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn zero_hours_cannot_be_approved() {
        let mut request = in_progress();
        request.propose_hours(REQUESTER, Decimal::ZERO).unwrap();
        assert_eq!(request.actual_hours, Some(Decimal::ZERO));

        assert!(matches!(
            request.approve_hours(OWNER),
            Err(MarketError::PreconditionFailed(_))
        ));
        assert!(!request.hour_approvals.both());
        assert_eq!(request.settlement_hours(dec!(2)), dec!(2));
    }

    #[test]
    fn settlement_hours_uses_actual_only_when_both_approved() {
        let mut request = in_progress();
        assert_eq!(request.settlement_hours(dec!(2)), dec!(2));

        request.propose_hours(OWNER, dec!(3.5)).unwrap();
        request.approve_hours(OWNER).unwrap();
        assert_eq!(request.settlement_hours(dec!(2)), dec!(2));

        request.approve_hours(REQUESTER).unwrap();
        assert_eq!(request.settlement_hours(dec!(2)), dec!(3.5));
    }

    // === Complete ===

    #[test]
    fn completable_only_in_progress() {
        let request = in_progress();
        assert_eq!(request.check_completable(REQUESTER), Ok(Party::Requester));
        assert_eq!(request.check_completable(STRANGER), Err(MarketError::Forbidden));

        let mut done = request.clone();
        done.mark_completed();
        assert_eq!(
            done.check_completable(OWNER),
            Err(MarketError::InvalidTransition {
                from: RequestStatus::Completed,
                action: "complete",
            })
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::InProgress.is_terminal());
        assert!(!RequestStatus::Accepted.is_terminal());
    }
}
