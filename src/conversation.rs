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

//! Private two-party chats opened alongside each service request.
//!
//! Only creation and lookup are handled here; messages belong to the
//! messaging layer.

use crate::base::{ConversationId, IdSequence, ServiceId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub service: ServiceId,
    pub participants: [UserId; 2],
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn includes(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }
}

#[derive(Debug)]
pub struct Conversations {
    conversations: DashMap<ConversationId, Conversation>,
    ids: IdSequence,
}

impl Conversations {
    pub fn new() -> Self {
        Self {
            conversations: DashMap::new(),
            ids: IdSequence::new(),
        }
    }

    /// Opens `"Chat: <service_title>"` between `first` and `second`.
    pub fn open(
        &self,
        service: ServiceId,
        service_title: &str,
        first: UserId,
        second: UserId,
    ) -> Conversation {
        let conversation = Conversation {
            id: ConversationId(self.ids.next()),
            title: format!("Chat: {service_title}"),
            service,
            participants: [first, second],
            created_at: Utc::now(),
        };
        self.conversations
            .insert(conversation.id, conversation.clone());
        conversation
    }

    pub fn get(&self, id: ConversationId) -> Option<Conversation> {
        self.conversations.get(&id).map(|c| c.value().clone())
    }
}

impl Default for Conversations {
    fn default() -> Self {
        Self::new()
    }
}
