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

//! Sample pool sessions.
//!
//! This module provides:
//! - Staging of in-memory sound data to scratch files
//! - Correlation of asynchronous load completions with waiting callers
//! - Per-sound default volumes
//! - Session lifecycle (create, release, dispose) keyed by stable ids

use std::fmt;

use serde::Serialize;

pub mod builtin;
pub mod load;
pub mod pending;
pub mod registry;
pub mod session;
pub mod temp_blob;
pub mod volume;

pub use pending::{PendingLoadRegistry, Responder};
pub use registry::SessionRegistry;
pub use session::{PlayRequest, PoolSession, SessionConfig, SessionState, VolumeRequest};
pub use temp_blob::{TempBlob, TempBlobStore};
pub use volume::VolumeOverrideTable;

/// Identifies a session. Ids are handed out in creation order and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
