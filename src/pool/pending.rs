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

//! Correlates asynchronous load completions with the callers waiting on them.
//!
//! The sound id of a load is only known once the platform call returns on a
//! worker, and the platform may signal completion before that worker's result
//! reaches the coordinator. While any load is in flight, completions for ids
//! nobody has registered yet are parked and claimed on registration. Once no
//! loads are in flight, parked completions can only be stale and are dropped.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::PoolError;
use crate::platform::SoundId;

/// The reply channel of a caller waiting on a result.
pub type Responder<T> = oneshot::Sender<Result<T, PoolError>>;

/// Tracks loads that the platform accepted but has not finished.
#[derive(Default)]
pub struct PendingLoadRegistry {
    pending: HashMap<SoundId, Responder<SoundId>>,
    /// Completions that arrived before their load was registered.
    parked: HashMap<SoundId, i32>,
    /// Loads whose platform call has not yet reported back.
    in_flight: usize,
}

impl PendingLoadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a load as running on a worker.
    pub fn begin_load(&mut self) {
        self.in_flight += 1;
    }

    /// Marks a worker's load call as settled, whatever its outcome.
    pub fn end_load(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 && !self.parked.is_empty() {
            debug!(dropped = self.parked.len(), "Dropping unclaimed completions");
            self.parked.clear();
        }
    }

    /// Associates a responder with an accepted load.
    ///
    /// If the completion for `id` has already arrived, the responder is answered
    /// immediately.
    pub fn register(&mut self, id: SoundId, responder: Responder<SoundId>) -> Result<(), PoolError> {
        if self.pending.contains_key(&id) {
            warn!(sound = %id, "Load registered twice");
            let _ = responder.send(Err(PoolError::DuplicateId(id)));
            return Err(PoolError::DuplicateId(id));
        }

        if let Some(status) = self.parked.remove(&id) {
            debug!(sound = %id, status, "Claimed early completion");
            Self::answer(id, status, responder);
            return Ok(());
        }

        self.pending.insert(id, responder);
        Ok(())
    }

    /// Resolves the load for `id`. Returns true if a waiting caller was answered.
    ///
    /// A completion with no matching registration is parked while loads are in
    /// flight and dropped otherwise.
    pub fn resolve(&mut self, id: SoundId, status: i32) -> bool {
        match self.pending.remove(&id) {
            Some(responder) => {
                Self::answer(id, status, responder);
                true
            }
            None if self.in_flight > 0 => {
                debug!(sound = %id, status, "Parking completion for unregistered load");
                self.parked.insert(id, status);
                false
            }
            None => {
                debug!(sound = %id, status, "Dropping completion for unknown load");
                false
            }
        }
    }

    /// Fails a caller whose load never reached the registry.
    pub fn immediate_fail(responder: Responder<SoundId>, reason: PoolError) {
        let _ = responder.send(Err(reason));
    }

    /// Fails every waiting caller with [`PoolError::Abandoned`] and forgets all
    /// in-flight bookkeeping.
    pub fn abandon_all(&mut self) -> usize {
        let abandoned = self.pending.len();
        for (_, responder) in self.pending.drain() {
            let _ = responder.send(Err(PoolError::Abandoned));
        }
        self.parked.clear();
        self.in_flight = 0;
        abandoned
    }

    /// Number of callers still waiting on a completion.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn answer(id: SoundId, status: i32, responder: Responder<SoundId>) {
        let result = if status == 0 {
            Ok(id)
        } else {
            Err(PoolError::LoadFailure(status))
        };
        if responder.send(result).is_err() {
            debug!(sound = %id, "Caller stopped waiting for load");
        }
    }
}

impl std::fmt::Debug for PendingLoadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLoadRegistry")
            .field("pending", &self.pending.len())
            .field("parked", &self.parked.len())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
