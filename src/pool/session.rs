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

//! One sample pool and the bookkeeping scoped to it.
//!
//! A session only ever runs on the coordinator. Anything that blocks (staging,
//! platform loads, starting streams) is handed to workers along with a clone of
//! the pool handle, and the outcome comes back through [`PoolSession::load_accepted`]
//! and friends.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::pending::{PendingLoadRegistry, Responder};
use super::volume::VolumeOverrideTable;
use super::SessionId;
use crate::error::PoolError;
use crate::platform::{
    CompletionSink, Platform, PlayParams, PoolConfig, SoundId, SoundPool, StreamCategory, StreamId,
};

/// Routes a completion signal back to the coordinator, tagged with the session
/// and the epoch of the pool that produced it.
pub type CompletionRoute = Arc<dyn Fn(SessionId, u64, SoundId, i32) + Send + Sync>;

/// Default number of concurrent streams when the caller doesn't specify one.
pub const DEFAULT_MAX_STREAMS: i32 = 1;

/// Validated session configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    max_streams: u32,
    category: StreamCategory,
}

impl SessionConfig {
    /// Validates a raw stream count and category index. Both are checked before
    /// any pool is allocated.
    pub fn new(max_streams: i32, category: i32) -> Result<SessionConfig, PoolError> {
        let category = StreamCategory::try_from(category)
            .map_err(|c| PoolError::InvalidConfig(format!("unknown stream category {}", c)))?;
        let max_streams = u32::try_from(max_streams)
            .ok()
            .filter(|m| *m > 0)
            .ok_or_else(|| {
                PoolError::InvalidConfig(format!("max streams must be positive, got {}", max_streams))
            })?;
        Ok(SessionConfig {
            max_streams,
            category,
        })
    }

    pub fn max_streams(&self) -> u32 {
        self.max_streams
    }

    pub fn category(&self) -> StreamCategory {
        self.category
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_streams: self.max_streams,
            category: self.category,
        }
    }
}

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// A pool is allocated and accepting calls.
    Active,
    /// The pool was released and a fresh one has not been allocated yet.
    Released,
    /// The session is gone for good.
    Disposed,
}

/// A request to start a stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayRequest {
    pub sound: SoundId,
    /// 0 plays once, a negative value loops forever, N repeats N more times.
    pub loop_count: i32,
    pub rate: f32,
    /// Explicit volumes. Missing channels fall back to the sound's default volume.
    pub left: Option<f32>,
    pub right: Option<f32>,
}

impl PlayRequest {
    pub fn new(sound: SoundId) -> PlayRequest {
        PlayRequest {
            sound,
            loop_count: 0,
            rate: 1.0,
            left: None,
            right: None,
        }
    }
}

/// A request to change volume on a live stream, a sound's default, or both.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeRequest {
    pub stream: Option<StreamId>,
    pub sound: Option<SoundId>,
    pub left: f32,
    pub right: f32,
}

/// What a worker needs to run a load: the pool it targets and the epoch that
/// pool belongs to.
#[derive(Clone)]
pub struct LoadTicket {
    pub pool: Arc<dyn SoundPool>,
    pub epoch: u64,
}

/// Owns one pool handle along with its pending loads and volume defaults.
pub struct PoolSession {
    id: SessionId,
    config: SessionConfig,
    platform: Arc<dyn Platform>,
    route: CompletionRoute,
    pool: Option<Arc<dyn SoundPool>>,
    /// Bumped every time the pool is released, so results from an old pool
    /// can be told apart from the current one.
    epoch: u64,
    state: SessionState,
    pending: PendingLoadRegistry,
    volumes: VolumeOverrideTable,
}

impl PoolSession {
    /// Allocates the pool for a new session.
    pub fn create(
        id: SessionId,
        config: SessionConfig,
        platform: Arc<dyn Platform>,
        route: CompletionRoute,
    ) -> Result<PoolSession, PoolError> {
        let mut session = PoolSession {
            id,
            config,
            platform,
            route,
            pool: None,
            epoch: 0,
            state: SessionState::Released,
            pending: PendingLoadRegistry::new(),
            volumes: VolumeOverrideTable::new(),
        };
        session.allocate()?;

        info!(
            session = %id,
            max_streams = config.max_streams(),
            category = ?config.category(),
            "Session created"
        );
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pending(&self) -> &PendingLoadRegistry {
        &self.pending
    }

    pub fn volumes(&self) -> &VolumeOverrideTable {
        &self.volumes
    }

    /// Returns the live pool, allocating a fresh one if the last release left
    /// the session without one.
    pub fn pool(&mut self) -> Result<Arc<dyn SoundPool>, PoolError> {
        match self.state {
            SessionState::Active => {}
            SessionState::Released => self.allocate()?,
            SessionState::Disposed => return Err(PoolError::UnknownSession(self.id)),
        }
        self.pool
            .clone()
            .ok_or(PoolError::UnknownSession(self.id))
    }

    /// Starts a load that will report back through [`PoolSession::load_accepted`].
    pub fn begin_load(&mut self) -> Result<LoadTicket, PoolError> {
        let pool = self.pool()?;
        self.pending.begin_load();
        Ok(LoadTicket {
            pool,
            epoch: self.epoch,
        })
    }

    /// Handles the outcome of a worker's load call.
    ///
    /// Accepted ids wait for their completion signal; rejections and staging
    /// failures are answered right away. Outcomes from a released pool are
    /// abandoned, since the ids they carry no longer mean anything.
    pub fn load_accepted(
        &mut self,
        epoch: u64,
        outcome: Result<SoundId, PoolError>,
        responder: Responder<SoundId>,
    ) {
        if epoch != self.epoch || self.state == SessionState::Disposed {
            debug!(session = %self.id, epoch, "Load finished on a released pool");
            PendingLoadRegistry::immediate_fail(responder, PoolError::Abandoned);
            return;
        }

        match outcome {
            Ok(sound) if sound.is_rejected() => {
                debug!(session = %self.id, sound = %sound, "Load rejected by platform");
                PendingLoadRegistry::immediate_fail(responder, PoolError::LoadRejected(sound));
            }
            Ok(sound) => {
                debug!(session = %self.id, sound = %sound, "Load accepted");
                // A duplicate has already been reported to the responder.
                let _ = self.pending.register(sound, responder);
            }
            Err(e) => {
                warn!(session = %self.id, err = %e, "Load failed");
                PendingLoadRegistry::immediate_fail(responder, e);
            }
        }
        self.pending.end_load();
    }

    /// Handles a completion signal from the pool of `epoch`.
    pub fn load_completed(&mut self, epoch: u64, sound: SoundId, status: i32) {
        if epoch != self.epoch {
            debug!(session = %self.id, sound = %sound, epoch, "Dropping completion from released pool");
            return;
        }
        if self.pending.resolve(sound, status) {
            debug!(session = %self.id, sound = %sound, status, "Load completed");
        }
    }

    /// Builds the platform parameters for a play request, filling in missing
    /// volumes from the sound's default.
    pub fn play_params(&self, request: &PlayRequest) -> Result<PlayParams, PoolError> {
        check_rate(request.rate)?;
        let defaults = self.volumes.get(request.sound);
        Ok(PlayParams {
            left: request.left.unwrap_or(defaults.left),
            right: request.right.unwrap_or(defaults.right),
            priority: 0,
            loop_count: request.loop_count,
            rate: request.rate,
        })
    }

    /// Applies a volume change to a live stream, a sound's default, or both.
    pub fn set_volume(&mut self, request: VolumeRequest) -> Result<(), PoolError> {
        if request.stream.is_none() && request.sound.is_none() {
            return Err(PoolError::InvalidParameters(
                "either 'streamId' or 'soundId' has to be passed".to_string(),
            ));
        }

        if let Some(stream) = request.stream {
            self.pool()?.set_volume(stream, request.left, request.right);
        }
        if let Some(sound) = request.sound {
            self.volumes.set(sound, request.left, request.right);
        }
        Ok(())
    }

    /// Changes the playback rate of a live stream.
    pub fn set_rate(&mut self, stream: StreamId, rate: f32) -> Result<(), PoolError> {
        check_rate(rate)?;
        self.pool()?.set_rate(stream, rate);
        Ok(())
    }

    /// Releases the pool and immediately allocates a fresh one. Every sound and
    /// stream id handed out before this call is invalid afterwards; volume
    /// defaults are kept.
    pub fn release(&mut self) -> Result<(), PoolError> {
        if self.state == SessionState::Disposed {
            return Err(PoolError::UnknownSession(self.id));
        }
        self.release_pool();
        self.allocate()?;
        info!(session = %self.id, epoch = self.epoch, "Session pool recreated");
        Ok(())
    }

    /// Releases the pool for good.
    pub fn dispose(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        self.release_pool();
        self.state = SessionState::Disposed;
        info!(session = %self.id, "Session disposed");
    }

    fn release_pool(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release();
        }
        let abandoned = self.pending.abandon_all();
        if abandoned > 0 {
            warn!(session = %self.id, abandoned, "Abandoned pending loads");
        }
        self.epoch += 1;
        self.state = SessionState::Released;
    }

    fn allocate(&mut self) -> Result<(), PoolError> {
        let route = self.route.clone();
        let (id, epoch) = (self.id, self.epoch);
        let sink = CompletionSink::new(move |sound, status| route(id, epoch, sound, status));

        let pool = self.platform.create_pool(self.config.pool_config(), sink)?;
        self.pool = Some(pool);
        self.state = SessionState::Active;
        Ok(())
    }
}

fn check_rate(rate: f32) -> Result<(), PoolError> {
    if rate.is_finite() {
        Ok(())
    } else {
        Err(PoolError::InvalidParameters(format!(
            "rate must be finite, got {}",
            rate
        )))
    }
}

impl std::fmt::Debug for PoolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSession")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("epoch", &self.epoch)
            .field("state", &self.state)
            .field("pending", &self.pending)
            .finish()
    }
}
