// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::session::{CompletionRoute, PoolSession, SessionConfig};
use super::SessionId;
use crate::error::PoolError;
use crate::platform::Platform;

/// All live sessions, keyed by an id that stays valid until that session is
/// disposed. Disposing a session never changes the id of another.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, PoolSession>,
    next_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session. An id is only consumed when the pool was allocated.
    pub fn create(
        &mut self,
        config: SessionConfig,
        platform: Arc<dyn Platform>,
        route: CompletionRoute,
    ) -> Result<SessionId, PoolError> {
        let id = SessionId(self.next_id);
        let session = PoolSession::create(id, config, platform, route)?;
        self.next_id += 1;
        self.sessions.insert(id, session);
        Ok(id)
    }

    pub fn get(&self, id: SessionId) -> Result<&PoolSession, PoolError> {
        self.sessions.get(&id).ok_or(PoolError::UnknownSession(id))
    }

    pub fn get_mut(&mut self, id: SessionId) -> Result<&mut PoolSession, PoolError> {
        self.sessions
            .get_mut(&id)
            .ok_or(PoolError::UnknownSession(id))
    }

    /// Releases a session's pool for good and forgets the session.
    pub fn dispose(&mut self, id: SessionId) -> Result<(), PoolError> {
        let mut session = self
            .sessions
            .remove(&id)
            .ok_or(PoolError::UnknownSession(id))?;
        session.dispose();
        Ok(())
    }

    /// Disposes every session.
    pub fn dispose_all(&mut self) {
        let count = self.sessions.len();
        for (_, mut session) in std::mem::take(&mut self.sessions) {
            session.dispose();
        }
        if count > 0 {
            info!(count, "Disposed all sessions");
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
