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
use std::collections::HashMap;

use crate::platform::SoundId;

/// Left and right gain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Volume {
    pub left: f32,
    pub right: f32,
}

impl Default for Volume {
    fn default() -> Self {
        Volume {
            left: 1.0,
            right: 1.0,
        }
    }
}

/// Default playback volume per sound, used when a play call leaves the volume out.
#[derive(Debug, Default)]
pub struct VolumeOverrideTable {
    volumes: HashMap<SoundId, Volume>,
}

impl VolumeOverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the volume for a sound, replacing any earlier value.
    pub fn set(&mut self, sound: SoundId, left: f32, right: f32) {
        self.volumes.insert(sound, Volume { left, right });
    }

    /// Gets the volume for a sound, or full volume if none was set.
    pub fn get(&self, sound: SoundId) -> Volume {
        self.volumes.get(&sound).copied().unwrap_or_default()
    }
}
