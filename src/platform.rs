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

//! The native sample pool contract.
//!
//! A platform owns the actual sound engine. This crate only ever talks to it
//! through the [`Platform`] and [`SoundPool`] traits, and the platform reports
//! finished loads back through a [`CompletionSink`].

use std::{fmt, fs::File, path::Path, sync::Arc};

use serde::Serialize;

use crate::pool::builtin::ResourceRef;

pub mod mock;
pub mod software;

/// The identifier the platform assigns to a loaded sample. Negative values are
/// rejections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SoundId(pub i32);

impl SoundId {
    /// The value a platform returns when it refuses a load outright.
    pub const REJECTED: SoundId = SoundId(-1);

    pub fn get(self) -> i32 {
        self.0
    }

    /// Returns true if the platform refused the load synchronously.
    pub fn is_rejected(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identifier of one playing instance of a sample. Zero means the stream
/// never started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StreamId(pub i32);

impl StreamId {
    pub const NONE: StreamId = StreamId(0);

    pub fn get(self) -> i32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The stream category a pool plays on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamCategory {
    Ring,
    Alarm,
    Music,
    Notification,
}

impl StreamCategory {
    /// The usage hint handed to the platform alongside the category.
    pub fn usage(self) -> Usage {
        match self {
            StreamCategory::Ring => Usage::NotificationRingtone,
            StreamCategory::Alarm => Usage::Alarm,
            StreamCategory::Notification => Usage::Notification,
            StreamCategory::Music => Usage::Game,
        }
    }
}

impl TryFrom<i32> for StreamCategory {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StreamCategory::Ring),
            1 => Ok(StreamCategory::Alarm),
            2 => Ok(StreamCategory::Music),
            3 => Ok(StreamCategory::Notification),
            other => Err(other),
        }
    }
}

/// How the platform should treat the audio of a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Usage {
    NotificationRingtone,
    Alarm,
    Notification,
    Game,
}

/// Everything a platform needs to allocate a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of streams the pool plays at once.
    pub max_streams: u32,
    pub category: StreamCategory,
}

impl PoolConfig {
    pub fn usage(&self) -> Usage {
        self.category.usage()
    }
}

/// Per-play settings handed to [`SoundPool::play`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayParams {
    pub left: f32,
    pub right: f32,
    /// Streams with a lower priority are stolen first when the pool is full.
    pub priority: i32,
    /// 0 plays once, a negative value loops forever, N repeats N more times.
    pub loop_count: i32,
    pub rate: f32,
}

/// Error raised when a platform cannot allocate a pool.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("unable to create pool: {0}")]
    Create(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives asynchronous load completions from a pool.
///
/// Status 0 means the sample is ready to play; anything else is a platform
/// specific failure code. A sink may be called from any thread.
#[derive(Clone)]
pub struct CompletionSink {
    deliver: Arc<dyn Fn(SoundId, i32) + Send + Sync>,
}

impl CompletionSink {
    pub fn new<F>(deliver: F) -> CompletionSink
    where
        F: Fn(SoundId, i32) + Send + Sync + 'static,
    {
        CompletionSink {
            deliver: Arc::new(deliver),
        }
    }

    /// Reports that the load for `sound` finished with `status`.
    pub fn complete(&self, sound: SoundId, status: i32) {
        (self.deliver)(sound, status)
    }
}

impl fmt::Debug for CompletionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSink").finish_non_exhaustive()
    }
}

/// Allocates pools.
pub trait Platform: Send + Sync + 'static {
    fn create_pool(
        &self,
        config: PoolConfig,
        completions: CompletionSink,
    ) -> Result<Arc<dyn SoundPool>, PlatformError>;
}

/// One native sample pool. Implementations must be safe to call from worker
/// threads; every call may block.
pub trait SoundPool: Send + Sync {
    /// Loads the file at `path`. The file is fully read before this returns.
    fn load_from_path(&self, path: &Path, priority: i32) -> SoundId;

    /// Loads from an already opened descriptor.
    fn load_from_descriptor(&self, file: File, priority: i32) -> SoundId;

    /// Loads a bundled resource.
    fn load_builtin(&self, resource: &ResourceRef) -> SoundId;

    /// Starts a stream for a loaded sound, returning [`StreamId::NONE`] on failure.
    fn play(&self, sound: SoundId, params: &PlayParams) -> StreamId;

    fn pause(&self, stream: StreamId);

    fn resume(&self, stream: StreamId);

    fn stop(&self, stream: StreamId);

    fn set_volume(&self, stream: StreamId, left: f32, right: f32);

    fn set_rate(&self, stream: StreamId, rate: f32);

    /// Frees every sound and stream. The pool is unusable afterwards.
    fn release(&self);
}
