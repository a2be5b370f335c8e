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
use serde::Serialize;

use crate::platform::{PlatformError, SoundId};
use crate::pool::SessionId;

/// Errors surfaced by sessions and the session manager. None of these are
/// retried; each one goes straight back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown session {0}")]
    UnknownSession(SessionId),

    /// A session index that can never name a session, such as a negative one.
    #[error("Unknown session {0}")]
    UnknownSessionIndex(i64),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Unable to stage sound data: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("Unable to fetch {locator}: {reason}")]
    FetchFailure { locator: String, reason: String },

    #[error("Loading failed, error code: {0}")]
    LoadFailure(i32),

    #[error("Sound {0} is already awaiting completion")]
    DuplicateId(SoundId),

    #[error("Platform rejected the load with {0}")]
    LoadRejected(SoundId),

    #[error("Platform could not start sound {0}")]
    PlayRejected(SoundId),

    #[error("Load abandoned before it completed")]
    Abandoned,

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("Method {0} is not implemented")]
    NotImplemented(String),

    #[error("Session manager has shut down")]
    Shutdown,
}

/// A stable, serializable name for each class of [`PoolError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidConfig,
    UnknownSession,
    InvalidParameters,
    IoFailure,
    FetchFailure,
    LoadFailure,
    DuplicateId,
    LoadRejected,
    PlayRejected,
    Abandoned,
    PlatformFailure,
    WorkerFailure,
    NotImplemented,
    Shutdown,
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            PoolError::UnknownSession(_) | PoolError::UnknownSessionIndex(_) => {
                ErrorKind::UnknownSession
            }
            PoolError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            PoolError::IoFailure(_) => ErrorKind::IoFailure,
            PoolError::FetchFailure { .. } => ErrorKind::FetchFailure,
            PoolError::LoadFailure(_) => ErrorKind::LoadFailure,
            PoolError::DuplicateId(_) => ErrorKind::DuplicateId,
            PoolError::LoadRejected(_) => ErrorKind::LoadRejected,
            PoolError::PlayRejected(_) => ErrorKind::PlayRejected,
            PoolError::Abandoned => ErrorKind::Abandoned,
            PoolError::Platform(_) => ErrorKind::PlatformFailure,
            PoolError::Worker(_) => ErrorKind::WorkerFailure,
            PoolError::NotImplemented(_) => ErrorKind::NotImplemented,
            PoolError::Shutdown => ErrorKind::Shutdown,
        }
    }
}

/// The structured failure handed back across the method-call boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<PoolError> for Failure {
    fn from(err: PoolError) -> Self {
        Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
