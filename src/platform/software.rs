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

//! An in-process sample pool.
//!
//! Sounds are decoded into memory on a per-pool decoder thread, and completion
//! is signalled once decoding finishes. Streams are tracked with the pool's
//! polyphony limit, stealing the lowest priority (then oldest) stream when the
//! pool is full. Nothing is sent to an audio device.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, error, info, warn};

use super::{
    CompletionSink, Platform, PlatformError, PlayParams, PoolConfig, SoundId, SoundPool, StreamId,
};
use crate::pool::builtin::ResourceRef;

/// Extensions tried, in order, when resolving a bundled resource.
const BUILTIN_EXTENSIONS: &[&str] = &["wav", "ogg", "flac", "mp3"];

/// Playback rates are clamped to this range.
const MIN_RATE: f32 = 0.5;
const MAX_RATE: f32 = 2.0;

/// Clamps a playback rate, treating a non-finite rate as normal speed.
fn clamp_rate(rate: f32) -> f32 {
    if rate.is_finite() {
        rate.clamp(MIN_RATE, MAX_RATE)
    } else {
        1.0
    }
}

/// Completion status for data that could not be decoded.
pub const STATUS_MALFORMED: i32 = 1;

/// Completion status for formats or codecs the decoder does not support.
pub const STATUS_UNSUPPORTED: i32 = 2;

/// Error raised while decoding a sample.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Audio file error: {0}")]
    Audio(#[from] SymphoniaError),

    #[error("No audio track found")]
    NoTrack,

    #[error("Sample rate not specified")]
    MissingSampleRate,

    #[error("No audio samples decoded")]
    Empty,
}

impl DecodeError {
    /// The completion status reported for this error.
    pub fn status(&self) -> i32 {
        match self {
            DecodeError::Audio(SymphoniaError::Unsupported(_)) => STATUS_UNSUPPORTED,
            _ => STATUS_MALFORMED,
        }
    }
}

/// A sample decoded into memory.
#[derive(Clone)]
pub struct DecodedSound {
    /// Interleaved f32 samples, shared between the pool and its streams.
    data: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
}

impl DecodedSound {
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        let frames = self.data.len() as f64 / self.channel_count.max(1) as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Debug for DecodedSound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedSound")
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("samples", &self.data.len())
            .finish()
    }
}

/// Decodes a complete audio file held in memory.
pub fn decode(bytes: Vec<u8>) -> Result<DecodedSound, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let probed = get_probe().format(
        &Hint::new(),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::MissingSampleRate)?;
    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut channel_count = 0u16;
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Some decoders report trailing garbage as a decode error.
            Err(SymphoniaError::DecodeError(_)) if !samples.is_empty() => break,
            Err(e) => return Err(e.into()),
        };
        let spec = *decoded.spec();
        channel_count = spec.channels.count() as u16;
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() || channel_count == 0 {
        return Err(DecodeError::Empty);
    }

    Ok(DecodedSound {
        data: Arc::new(samples),
        channel_count,
        sample_rate,
    })
}

/// A platform backed by [`SoftwarePool`]s.
pub struct SoftwarePlatform {
    builtin_dir: PathBuf,
}

impl SoftwarePlatform {
    /// Creates a platform that resolves bundled resources under `builtin_dir`.
    pub fn new(builtin_dir: impl Into<PathBuf>) -> SoftwarePlatform {
        SoftwarePlatform {
            builtin_dir: builtin_dir.into(),
        }
    }
}

impl Platform for SoftwarePlatform {
    fn create_pool(
        &self,
        config: PoolConfig,
        completions: CompletionSink,
    ) -> Result<Arc<dyn SoundPool>, PlatformError> {
        Ok(Arc::new(SoftwarePool::new(
            config,
            completions,
            self.builtin_dir.clone(),
        )?))
    }
}

/// Playback state of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Playing,
    Paused,
}

/// A read-only view of a stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamSnapshot {
    pub sound: SoundId,
    pub state: StreamState,
    pub left: f32,
    pub right: f32,
    pub rate: f32,
    pub loop_count: i32,
}

struct Stream {
    id: StreamId,
    sound: SoundId,
    priority: i32,
    left: f32,
    right: f32,
    rate: f32,
    loop_count: i32,
    started: Instant,
    /// Media time played before the last pause.
    played: Duration,
    /// When the stream last started or resumed, None while paused.
    resumed_at: Option<Instant>,
    /// Total media time of the stream, None when looping forever.
    length: Option<Duration>,
}

impl Stream {
    fn position(&self, now: Instant) -> Duration {
        let running = self
            .resumed_at
            .map(|at| now.saturating_duration_since(at).mul_f32(self.rate))
            .unwrap_or_default();
        self.played + running
    }

    fn is_finished(&self, now: Instant) -> bool {
        self.length.is_some_and(|length| self.position(now) >= length)
    }

    fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            sound: self.sound,
            state: if self.resumed_at.is_some() {
                StreamState::Playing
            } else {
                StreamState::Paused
            },
            left: self.left,
            right: self.right,
            rate: self.rate,
            loop_count: self.loop_count,
        }
    }
}

struct DecodeJob {
    sound: SoundId,
    bytes: Vec<u8>,
}

struct PoolState {
    sounds: HashMap<SoundId, DecodedSound>,
    streams: Vec<Stream>,
    next_sound: i32,
    next_stream: i32,
    released: bool,
    /// Feeds the decoder thread. Dropped on release so the thread exits.
    jobs: Option<Sender<DecodeJob>>,
}

/// An in-process pool.
pub struct SoftwarePool {
    config: PoolConfig,
    builtin_dir: PathBuf,
    state: Arc<Mutex<PoolState>>,
}

impl SoftwarePool {
    pub fn new(
        config: PoolConfig,
        completions: CompletionSink,
        builtin_dir: PathBuf,
    ) -> Result<SoftwarePool, PlatformError> {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();
        let state = Arc::new(Mutex::new(PoolState {
            sounds: HashMap::new(),
            streams: Vec::new(),
            next_sound: 1,
            next_stream: 1,
            released: false,
            jobs: Some(jobs_tx),
        }));

        {
            let state = state.clone();
            thread::Builder::new()
                .name("samplepool-decoder".to_string())
                .spawn(move || Self::decode_loop(jobs_rx, state, completions))?;
        }

        info!(
            max_streams = config.max_streams,
            usage = ?config.usage(),
            "Created software pool"
        );
        Ok(SoftwarePool {
            config,
            builtin_dir,
            state,
        })
    }

    /// Returns the state of a stream that is still alive.
    pub fn stream(&self, stream: StreamId) -> Option<StreamSnapshot> {
        let state = self.state.lock();
        let now = Instant::now();
        state
            .streams
            .iter()
            .find(|s| s.id == stream && !s.is_finished(now))
            .map(Stream::snapshot)
    }

    /// Returns the number of streams still playing or paused.
    pub fn active_stream_count(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .streams
            .iter()
            .filter(|s| !s.is_finished(now))
            .count()
    }

    /// Returns a decoded sound, if it finished loading.
    pub fn sound(&self, sound: SoundId) -> Option<DecodedSound> {
        self.state.lock().sounds.get(&sound).cloned()
    }

    /// Returns the total memory used by decoded sounds.
    pub fn memory_usage(&self) -> usize {
        self.state
            .lock()
            .sounds
            .values()
            .map(DecodedSound::memory_size)
            .sum()
    }

    fn decode_loop(
        jobs: Receiver<DecodeJob>,
        state: Arc<Mutex<PoolState>>,
        completions: CompletionSink,
    ) {
        for job in jobs {
            let status = match decode(job.bytes) {
                Ok(decoded) => {
                    debug!(
                        sound = %job.sound,
                        channels = decoded.channel_count(),
                        sample_rate = decoded.sample_rate(),
                        duration_ms = decoded.duration().as_millis(),
                        memory_kb = decoded.memory_size() / 1024,
                        "Sound decoded"
                    );
                    let mut state = state.lock();
                    if state.released {
                        return;
                    }
                    state.sounds.insert(job.sound, decoded);
                    0
                }
                Err(e) => {
                    warn!(sound = %job.sound, err = %e, "Unable to decode sound");
                    e.status()
                }
            };
            completions.complete(job.sound, status);
        }
        debug!("Decoder thread exiting");
    }

    /// Queues `bytes` for decoding and hands out the new sound id.
    fn enqueue(&self, bytes: Vec<u8>) -> SoundId {
        let mut state = self.state.lock();
        if state.released {
            return SoundId::REJECTED;
        }
        let sound = SoundId(state.next_sound);
        let Some(jobs) = state.jobs.as_ref() else {
            return SoundId::REJECTED;
        };
        if jobs.send(DecodeJob { sound, bytes }).is_err() {
            error!("Decoder thread is gone");
            return SoundId::REJECTED;
        }
        state.next_sound += 1;
        sound
    }

    fn resolve_builtin(&self, resource: &ResourceRef) -> Option<PathBuf> {
        let name = resource.name();
        BUILTIN_EXTENSIONS
            .iter()
            .map(|ext| self.builtin_dir.join(format!("{}.{}", name, ext)))
            .find(|path| path.is_file())
    }

    fn with_stream<F>(&self, stream: StreamId, f: F)
    where
        F: FnOnce(&mut Stream, Instant),
    {
        let mut state = self.state.lock();
        let now = Instant::now();
        if let Some(s) = state
            .streams
            .iter_mut()
            .find(|s| s.id == stream && !s.is_finished(now))
        {
            f(s, now);
        }
    }
}

impl SoundPool for SoftwarePool {
    fn load_from_path(&self, path: &Path, _priority: i32) -> SoundId {
        match fs::read(path) {
            Ok(bytes) => self.enqueue(bytes),
            Err(e) => {
                warn!(path = ?path, err = %e, "Unable to read sound");
                SoundId::REJECTED
            }
        }
    }

    fn load_from_descriptor(&self, mut file: File, _priority: i32) -> SoundId {
        let mut bytes = Vec::new();
        match file.read_to_end(&mut bytes) {
            Ok(_) => self.enqueue(bytes),
            Err(e) => {
                warn!(err = %e, "Unable to read sound descriptor");
                SoundId::REJECTED
            }
        }
    }

    fn load_builtin(&self, resource: &ResourceRef) -> SoundId {
        match self.resolve_builtin(resource) {
            Some(path) => self.load_from_path(&path, 1),
            None => {
                warn!(resource = %resource, dir = ?self.builtin_dir, "Bundled resource missing");
                SoundId::REJECTED
            }
        }
    }

    fn play(&self, sound: SoundId, params: &PlayParams) -> StreamId {
        let mut state = self.state.lock();
        if state.released {
            return StreamId::NONE;
        }
        let Some(decoded) = state.sounds.get(&sound) else {
            debug!(sound = %sound, "Sound not loaded");
            return StreamId::NONE;
        };
        let length = u32::try_from(params.loop_count)
            .ok()
            .map(|repeats| decoded.duration() * (repeats + 1));

        let now = Instant::now();
        state.streams.retain(|s| !s.is_finished(now));

        if state.streams.len() >= self.config.max_streams as usize {
            // Steal the lowest priority stream, oldest first.
            if let Some(victim) = state
                .streams
                .iter()
                .min_by_key(|s| (s.priority, s.started))
                .map(|s| s.id)
            {
                state.streams.retain(|s| s.id != victim);
                debug!(
                    stolen = %victim,
                    max_streams = self.config.max_streams,
                    "Stream limit reached, stealing"
                );
            }
        }

        let id = StreamId(state.next_stream);
        state.next_stream += 1;
        state.streams.push(Stream {
            id,
            sound,
            priority: params.priority,
            left: params.left.clamp(0.0, 1.0),
            right: params.right.clamp(0.0, 1.0),
            rate: clamp_rate(params.rate),
            loop_count: params.loop_count,
            started: now,
            played: Duration::ZERO,
            resumed_at: Some(now),
            length,
        });
        id
    }

    fn pause(&self, stream: StreamId) {
        self.with_stream(stream, |s, now| {
            s.played = s.position(now);
            s.resumed_at = None;
        });
    }

    fn resume(&self, stream: StreamId) {
        self.with_stream(stream, |s, now| {
            if s.resumed_at.is_none() {
                s.resumed_at = Some(now);
            }
        });
    }

    fn stop(&self, stream: StreamId) {
        self.state.lock().streams.retain(|s| s.id != stream);
    }

    fn set_volume(&self, stream: StreamId, left: f32, right: f32) {
        self.with_stream(stream, |s, _| {
            s.left = left.clamp(0.0, 1.0);
            s.right = right.clamp(0.0, 1.0);
        });
    }

    fn set_rate(&self, stream: StreamId, rate: f32) {
        self.with_stream(stream, |s, now| {
            s.played = s.position(now);
            if s.resumed_at.is_some() {
                s.resumed_at = Some(now);
            }
            s.rate = clamp_rate(rate);
        });
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        state.jobs = None;
        state.sounds.clear();
        state.streams.clear();
        debug!("Software pool released");
    }
}

impl Drop for SoftwarePool {
    fn drop(&mut self) {
        self.state.lock().jobs = None;
    }
}

impl std::fmt::Debug for SoftwarePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SoftwarePool")
            .field("max_streams", &self.config.max_streams)
            .field("sounds", &state.sounds.len())
            .field("streams", &state.streams.len())
            .field("released", &state.released)
            .finish()
    }
}
