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
use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::Read,
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{
    CompletionSink, PlatformError, PlayParams, PoolConfig, SoundId, SoundPool, StreamId,
};
use crate::pool::builtin::ResourceRef;

/// A mock platform. Doesn't play anything, but remembers what it was asked to do.
#[derive(Clone)]
pub struct MockPlatform {
    first_sound_id: i32,
    auto_complete: Option<i32>,
    state: Arc<Mutex<MockPlatformState>>,
}

#[derive(Default)]
struct MockPlatformState {
    pools: Vec<Arc<MockPool>>,
    reject_loads: bool,
    fail_creates: bool,
}

impl MockPlatform {
    /// Creates a mock platform whose pools number sounds from 1 and wait for
    /// [`MockPool::complete`] before reporting loads as finished.
    pub fn new() -> MockPlatform {
        MockPlatform {
            first_sound_id: 1,
            auto_complete: None,
            state: Arc::new(Mutex::new(MockPlatformState::default())),
        }
    }

    /// Numbers sounds starting at `id` in every pool created afterwards.
    pub fn with_first_sound_id(mut self, id: i32) -> MockPlatform {
        self.first_sound_id = id;
        self
    }

    /// Reports every load as finished with `status` before the load call returns.
    pub fn with_auto_complete(mut self, status: i32) -> MockPlatform {
        self.auto_complete = Some(status);
        self
    }

    /// Makes every pool refuse loads outright.
    pub fn reject_loads(&self, reject: bool) {
        self.state.lock().reject_loads = reject;
    }

    /// Makes pool creation fail.
    pub fn fail_creates(&self, fail: bool) {
        self.state.lock().fail_creates = fail;
    }

    /// Returns the pool created `index`-th on this platform.
    pub fn pool(&self, index: usize) -> Option<Arc<MockPool>> {
        self.state.lock().pools.get(index).cloned()
    }

    pub fn pool_count(&self) -> usize {
        self.state.lock().pools.len()
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Platform for MockPlatform {
    fn create_pool(
        &self,
        config: PoolConfig,
        completions: CompletionSink,
    ) -> Result<Arc<dyn SoundPool>, PlatformError> {
        let mut state = self.state.lock();
        if state.fail_creates {
            return Err(PlatformError::Create("mock pool creation disabled".to_string()));
        }

        let pool = Arc::new(MockPool {
            config,
            completions,
            auto_complete: self.auto_complete,
            platform: self.state.clone(),
            state: Mutex::new(MockPoolState {
                next_sound: self.first_sound_id,
                next_stream: 1,
                ..Default::default()
            }),
        });
        info!(
            pool = state.pools.len(),
            max_streams = config.max_streams,
            usage = ?config.usage(),
            "Created mock pool."
        );
        state.pools.push(pool.clone());
        Ok(pool)
    }
}

/// A stream started on a mock pool.
#[derive(Clone, Debug, PartialEq)]
pub struct MockStream {
    pub sound: SoundId,
    pub params: PlayParams,
    pub paused: bool,
}

#[derive(Default)]
struct MockPoolState {
    next_sound: i32,
    next_stream: i32,
    /// Sounds that finished loading successfully.
    ready: HashSet<SoundId>,
    /// Bytes read for each accepted load.
    loaded: HashMap<SoundId, Vec<u8>>,
    priorities: HashMap<SoundId, i32>,
    streams: HashMap<StreamId, MockStream>,
    released: bool,
}

/// A pool on the mock platform.
pub struct MockPool {
    config: PoolConfig,
    completions: CompletionSink,
    auto_complete: Option<i32>,
    platform: Arc<Mutex<MockPlatformState>>,
    state: Mutex<MockPoolState>,
}

impl MockPool {
    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Finishes the load of `sound` and signals the completion.
    pub fn complete(&self, sound: SoundId, status: i32) {
        if status == 0 {
            self.state.lock().ready.insert(sound);
        }
        self.completions.complete(sound, status);
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Returns the bytes the pool read when `sound` was loaded.
    pub fn loaded_bytes(&self, sound: SoundId) -> Option<Vec<u8>> {
        self.state.lock().loaded.get(&sound).cloned()
    }

    /// The priority an accepted load was requested with.
    pub fn load_priority(&self, sound: SoundId) -> Option<i32> {
        self.state.lock().priorities.get(&sound).copied()
    }

    pub fn stream(&self, stream: StreamId) -> Option<MockStream> {
        self.state.lock().streams.get(&stream).cloned()
    }

    pub fn stream_count(&self) -> usize {
        self.state.lock().streams.len()
    }

    fn accept(&self, bytes: Vec<u8>, priority: i32) -> SoundId {
        if self.platform.lock().reject_loads {
            return SoundId::REJECTED;
        }

        let sound = {
            let mut state = self.state.lock();
            if state.released {
                return SoundId::REJECTED;
            }
            let sound = SoundId(state.next_sound);
            state.next_sound += 1;
            state.loaded.insert(sound, bytes);
            state.priorities.insert(sound, priority);
            sound
        };
        debug!(sound = %sound, "Mock load accepted.");

        if let Some(status) = self.auto_complete {
            self.complete(sound, status);
        }
        sound
    }
}

impl SoundPool for MockPool {
    fn load_from_path(&self, path: &Path, priority: i32) -> SoundId {
        match fs::read(path) {
            Ok(bytes) => self.accept(bytes, priority),
            Err(_) => SoundId::REJECTED,
        }
    }

    fn load_from_descriptor(&self, mut file: File, priority: i32) -> SoundId {
        let mut bytes = Vec::new();
        match file.read_to_end(&mut bytes) {
            Ok(_) => self.accept(bytes, priority),
            Err(_) => SoundId::REJECTED,
        }
    }

    fn load_builtin(&self, resource: &ResourceRef) -> SoundId {
        let sound = self.accept(resource.name().into_bytes(), 1);
        if !sound.is_rejected() {
            self.state.lock().ready.insert(sound);
        }
        sound
    }

    fn play(&self, sound: SoundId, params: &PlayParams) -> StreamId {
        let mut state = self.state.lock();
        if state.released || !state.ready.contains(&sound) {
            return StreamId::NONE;
        }
        let stream = StreamId(state.next_stream);
        state.next_stream += 1;
        state.streams.insert(
            stream,
            MockStream {
                sound,
                params: *params,
                paused: false,
            },
        );
        stream
    }

    fn pause(&self, stream: StreamId) {
        if let Some(s) = self.state.lock().streams.get_mut(&stream) {
            s.paused = true;
        }
    }

    fn resume(&self, stream: StreamId) {
        if let Some(s) = self.state.lock().streams.get_mut(&stream) {
            s.paused = false;
        }
    }

    fn stop(&self, stream: StreamId) {
        self.state.lock().streams.remove(&stream);
    }

    fn set_volume(&self, stream: StreamId, left: f32, right: f32) {
        if let Some(s) = self.state.lock().streams.get_mut(&stream) {
            s.params.left = left;
            s.params.right = right;
        }
    }

    fn set_rate(&self, stream: StreamId, rate: f32) {
        if let Some(s) = self.state.lock().streams.get_mut(&stream) {
            s.params.rate = rate;
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        state.ready.clear();
        state.loaded.clear();
        state.streams.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::{Platform, StreamCategory};

    fn config() -> PoolConfig {
        PoolConfig {
            max_streams: 2,
            category: StreamCategory::Alarm,
        }
    }

    #[test]
    fn test_load_requires_completion_before_play() {
        let platform = MockPlatform::new().with_first_sound_id(7);
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let completed = completed.clone();
            CompletionSink::new(move |sound, status| completed.lock().push((sound, status)))
        };
        let pool = platform.create_pool(config(), sink).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sound.wav");
        fs::write(&path, b"data").unwrap();

        let sound = pool.load_from_path(&path, 1);
        assert_eq!(sound, SoundId(7));
        assert_eq!(pool.play(sound, &play_params()), StreamId::NONE);

        platform.pool(0).unwrap().complete(sound, 0);
        assert_eq!(completed.lock().as_slice(), &[(SoundId(7), 0)]);
        assert_eq!(pool.play(sound, &play_params()), StreamId(1));
        assert_eq!(platform.pool(0).unwrap().loaded_bytes(sound), Some(b"data".to_vec()));
    }

    #[test]
    fn test_missing_path_rejected() {
        let platform = MockPlatform::new();
        let pool = platform
            .create_pool(config(), CompletionSink::new(|_, _| {}))
            .unwrap();
        assert!(pool
            .load_from_path(Path::new("/definitely/not/here"), 1)
            .is_rejected());
    }

    #[test]
    fn test_released_pool_refuses_everything() {
        let platform = MockPlatform::new().with_auto_complete(0);
        let pool = platform
            .create_pool(config(), CompletionSink::new(|_, _| {}))
            .unwrap();
        let resource = ResourceRef::lookup("moderate", 3).unwrap();
        let sound = pool.load_builtin(&resource);
        pool.release();

        assert_eq!(pool.play(sound, &play_params()), StreamId::NONE);
        assert!(pool.load_builtin(&resource).is_rejected());
    }

    fn play_params() -> PlayParams {
        PlayParams {
            left: 1.0,
            right: 1.0,
            priority: 0,
            loop_count: 0,
            rate: 1.0,
        }
    }
}
