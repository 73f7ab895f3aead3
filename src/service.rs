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

//! Service catalog: offers and needs posted by users.

use crate::MarketError;
use crate::base::{IdSequence, ServiceId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Whether the owner is giving help or asking for it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Offer,
    Need,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Active,
    Inactive,
    /// Every request against the service reached a terminal state after at
    /// least one completion.
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub id: ServiceId,
    pub owner: UserId,
    pub kind: ServiceKind,
    pub title: String,
    pub description: String,
    /// Whole hours the owner expects the service to take.
    pub estimated_hours: Option<u32>,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// Estimated hours as a decimal, `0` when absent.
    pub fn estimated_decimal(&self) -> Decimal {
        self.estimated_hours.map(Decimal::from).unwrap_or_default()
    }

    fn matches(&self, filter: &ServiceFilter) -> bool {
        if filter.kind.is_some_and(|kind| kind != self.kind)
            || filter.status.is_some_and(|status| status != self.status)
            || filter.owner.is_some_and(|owner| owner != self.owner)
        {
            return false;
        }
        match &filter.search {
            Some(needle) => {
                let needle = needle.to_lowercase();
                self.title.to_lowercase().contains(&needle)
                    || self.description.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

/// Fields required to post a service.
#[derive(Debug, Clone)]
pub struct NewService {
    pub kind: ServiceKind,
    pub title: String,
    pub description: String,
    pub estimated_hours: Option<u32>,
}

/// Browse filters; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub kind: Option<ServiceKind>,
    pub status: Option<ServiceStatus>,
    pub owner: Option<UserId>,
    /// Case-insensitive substring over title and description.
    pub search: Option<String>,
}

/// Read-mostly store of posted services.
#[derive(Debug)]
pub struct ServiceCatalog {
    services: DashMap<ServiceId, Arc<Mutex<Service>>>,
    ids: IdSequence,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            ids: IdSequence::new(),
        }
    }

    /// Posts a new active service owned by `owner`.
    ///
    /// # Errors
    ///
    /// [`MarketError::InvalidAmount`] if an estimate of zero hours is given.
    pub fn post(&self, owner: UserId, new: NewService) -> Result<Service, MarketError> {
        if new.estimated_hours == Some(0) {
            return Err(MarketError::InvalidAmount(Decimal::ZERO));
        }
        let now = Utc::now();
        let service = Service {
            id: ServiceId(self.ids.next()),
            owner,
            kind: new.kind,
            title: new.title,
            description: new.description,
            estimated_hours: new.estimated_hours,
            status: ServiceStatus::Active,
            created_at: now,
            updated_at: now,
        };
        info!(service = %service.id, %owner, kind = ?service.kind, "posted service");
        self.services
            .insert(service.id, Arc::new(Mutex::new(service.clone())));
        Ok(service)
    }

    pub fn get(&self, id: ServiceId) -> Result<Service, MarketError> {
        Ok(self.row(id)?.lock().clone())
    }

    /// Lockable row for `id`.
    pub(crate) fn row(&self, id: ServiceId) -> Result<Arc<Mutex<Service>>, MarketError> {
        self.services
            .get(&id)
            .map(|row| Arc::clone(row.value()))
            .ok_or(MarketError::ServiceNotFound(id))
    }

    /// Services matching `filter`, newest first.
    pub fn list(&self, filter: &ServiceFilter) -> Vec<Service> {
        let rows: Vec<_> = self
            .services
            .iter()
            .map(|row| Arc::clone(row.value()))
            .collect();
        let mut services: Vec<_> = rows
            .iter()
            .map(|row| row.lock().clone())
            .filter(|service| service.matches(filter))
            .collect();
        services.sort_by(|a, b| b.id.cmp(&a.id));
        services
    }

    /// Lets the owner pause or resume a service.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Forbidden`] if `actor` is not the owner.
    /// - [`MarketError::PreconditionFailed`] when asked to mark the service
    ///   completed, or to reopen one that already is.
    pub fn set_status(
        &self,
        id: ServiceId,
        actor: UserId,
        status: ServiceStatus,
    ) -> Result<Service, MarketError> {
        let row = self.row(id)?;
        let mut service = row.lock();
        if service.owner != actor {
            return Err(MarketError::Forbidden);
        }
        if status == ServiceStatus::Completed {
            return Err(MarketError::PreconditionFailed(
                "services complete only through their requests",
            ));
        }
        if service.status == ServiceStatus::Completed {
            return Err(MarketError::PreconditionFailed("service is already completed"));
        }
        service.status = status;
        service.updated_at = Utc::now();
        Ok(service.clone())
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new()
    }
}
