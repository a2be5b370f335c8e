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

//! The method-call boundary.
//!
//! Every call arrives as a method name plus a flat JSON argument bundle. The
//! bundle is validated once into a typed request, handed to the session
//! manager, and the outcome is turned back into a JSON value or a structured
//! [`Failure`]. Synchronous rejections are reported as sentinel values rather
//! than failures: `-1` for a rejected pool or load, `0` for a stream that
//! could not be started.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::coordinator::SessionManager;
use crate::error::{Failure, PoolError};
use crate::platform::{SoundId, StreamId};
use crate::pool::load::Locator;
use crate::pool::session::DEFAULT_MAX_STREAMS;
use crate::pool::{PlayRequest, SessionConfig, SessionId, VolumeRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitArgs {
    stream_type: Option<i32>,
    #[serde(default = "default_max_streams")]
    max_streams: i32,
}

fn default_max_streams() -> i32 {
    DEFAULT_MAX_STREAMS
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolArgs {
    pool_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadArgs {
    pool_id: i64,
    raw_sound: Vec<u8>,
    priority: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadUriArgs {
    pool_id: i64,
    uri: String,
    priority: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadNoteArgs {
    pool_id: i64,
    #[serde(rename = "type")]
    category: String,
    index: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayArgs {
    pool_id: i64,
    sound_id: i32,
    #[serde(default)]
    repeat: i32,
    #[serde(default = "default_rate")]
    rate: f32,
    volume_left: Option<f32>,
    volume_right: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamArgs {
    pool_id: i64,
    stream_id: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeArgs {
    pool_id: i64,
    stream_id: Option<i32>,
    sound_id: Option<i32>,
    volume_left: f32,
    volume_right: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateArgs {
    pool_id: i64,
    stream_id: i32,
    #[serde(default = "default_rate")]
    rate: f32,
}

fn default_rate() -> f32 {
    1.0
}

fn session_id(raw: i64) -> Result<SessionId, PoolError> {
    u64::try_from(raw)
        .map(SessionId)
        .map_err(|_| PoolError::UnknownSessionIndex(raw))
}

/// Handles one method call.
pub async fn handle(
    manager: &SessionManager,
    method: &str,
    arguments: Value,
) -> Result<Value, Failure> {
    debug!(method, "Handling call");
    dispatch(manager, method, arguments)
        .await
        .map_err(Failure::from)
}

async fn dispatch(
    manager: &SessionManager,
    method: &str,
    arguments: Value,
) -> Result<Value, PoolError> {
    match method {
        "initSoundpool" => {
            let args: InitArgs = parse(arguments)?;
            let config = match args.stream_type {
                Some(category) => SessionConfig::new(args.max_streams, category),
                None => Err(PoolError::InvalidConfig(
                    "missing stream category".to_string(),
                )),
            };
            let created = match config {
                Ok(config) => manager.create_session(config).await,
                Err(e) => Err(e),
            };
            match created {
                Ok(session) => Ok(json!(session)),
                Err(PoolError::InvalidConfig(reason)) => {
                    debug!(reason = %reason, "Rejected pool configuration");
                    Ok(json!(-1))
                }
                Err(e) => Err(e),
            }
        }
        "dispose" => {
            let args: PoolArgs = parse(arguments)?;
            manager.dispose_session(session_id(args.pool_id)?).await?;
            Ok(Value::Null)
        }
        "load" => {
            let args: LoadArgs = parse(arguments)?;
            sound_result(
                manager
                    .load(session_id(args.pool_id)?, args.raw_sound, args.priority)
                    .await,
            )
        }
        "loadUri" => {
            let args: LoadUriArgs = parse(arguments)?;
            let locator: Locator = args.uri.parse()?;
            sound_result(
                manager
                    .load_uri(session_id(args.pool_id)?, locator, args.priority)
                    .await,
            )
        }
        "loadNote" => {
            let args: LoadNoteArgs = parse(arguments)?;
            sound_result(
                manager
                    .load_builtin(session_id(args.pool_id)?, args.category, args.index)
                    .await,
            )
        }
        "release" => {
            let args: PoolArgs = parse(arguments)?;
            manager.release(session_id(args.pool_id)?).await?;
            Ok(Value::Null)
        }
        "play" => {
            let args: PlayArgs = parse(arguments)?;
            let request = PlayRequest {
                sound: SoundId(args.sound_id),
                loop_count: args.repeat,
                rate: args.rate,
                left: args.volume_left,
                right: args.volume_right,
            };
            match manager.play(session_id(args.pool_id)?, request).await {
                Ok(stream) => Ok(json!(stream)),
                Err(PoolError::PlayRejected(_)) => Ok(json!(StreamId::NONE)),
                Err(e) => Err(e),
            }
        }
        "pause" | "resume" | "stop" => {
            let args: StreamArgs = parse(arguments)?;
            let (session, stream) = (session_id(args.pool_id)?, StreamId(args.stream_id));
            let acknowledged = match method {
                "pause" => manager.pause(session, stream).await?,
                "resume" => manager.resume(session, stream).await?,
                _ => manager.stop(session, stream).await?,
            };
            Ok(json!(acknowledged))
        }
        "setVolume" => {
            let args: VolumeArgs = parse(arguments)?;
            let request = VolumeRequest {
                stream: args.stream_id.map(StreamId),
                sound: args.sound_id.map(SoundId),
                left: args.volume_left,
                right: args.volume_right,
            };
            manager.set_volume(session_id(args.pool_id)?, request).await?;
            Ok(Value::Null)
        }
        "setRate" => {
            let args: RateArgs = parse(arguments)?;
            manager
                .set_rate(
                    session_id(args.pool_id)?,
                    StreamId(args.stream_id),
                    args.rate,
                )
                .await?;
            Ok(Value::Null)
        }
        _ => Err(PoolError::NotImplemented(method.to_string())),
    }
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, PoolError> {
    serde_json::from_value(arguments).map_err(|e| PoolError::InvalidParameters(e.to_string()))
}

/// Reports a synchronous load rejection as the id the platform returned.
fn sound_result(result: Result<SoundId, PoolError>) -> Result<Value, PoolError> {
    match result {
        Ok(sound) | Err(PoolError::LoadRejected(sound)) => Ok(json!(sound)),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::platform::mock::MockPlatform;
    use crate::pool::TempBlobStore;
    use crate::testutil::eventually_async;

    fn start(platform: &MockPlatform) -> (SessionManager, tempfile::TempDir) {
        let scratch = tempfile::tempdir().unwrap();
        let (manager, _) = SessionManager::start(
            Arc::new(platform.clone()),
            TempBlobStore::new(scratch.path()),
            false,
        );
        (manager, scratch)
    }

    #[tokio::test]
    async fn test_scenario() {
        let platform = MockPlatform::new().with_first_sound_id(7);
        let (manager, _scratch) = start(&platform);

        let pool = handle(&manager, "initSoundpool", json!({"maxStreams": 4, "streamType": 2}))
            .await
            .unwrap();
        assert_eq!(pool, json!(0));

        let load = tokio::spawn({
            let manager = manager.clone();
            async move {
                handle(
                    &manager,
                    "load",
                    json!({"poolId": 0, "rawSound": [82, 73, 70, 70], "priority": 1}),
                )
                .await
            }
        });
        eventually_async(
            || {
                let platform = platform.clone();
                async move {
                    platform
                        .pool(0)
                        .and_then(|p| p.loaded_bytes(SoundId(7)))
                        .is_some()
                }
            },
            "Load never reached the pool",
        )
        .await;
        platform.pool(0).unwrap().complete(SoundId(7), 0);
        assert_eq!(load.await.unwrap().unwrap(), json!(7));

        let stream = handle(
            &manager,
            "play",
            json!({"poolId": 0, "soundId": 7, "repeat": 0, "rate": 1.0}),
        )
        .await
        .unwrap();
        assert_eq!(stream, json!(1));

        let ack = handle(
            &manager,
            "setVolume",
            json!({"poolId": 0, "streamId": 1, "volumeLeft": 0.5, "volumeRight": 0.5}),
        )
        .await
        .unwrap();
        assert_eq!(ack, Value::Null);

        let stopped = handle(&manager, "stop", json!({"poolId": 0, "streamId": 1}))
            .await
            .unwrap();
        assert_eq!(stopped, json!(1));
    }

    #[tokio::test]
    async fn test_invalid_stream_type_is_sentinel() {
        let platform = MockPlatform::new();
        let (manager, _scratch) = start(&platform);

        let result = handle(&manager, "initSoundpool", json!({"streamType": 9}))
            .await
            .unwrap();
        assert_eq!(result, json!(-1));
        assert_eq!(platform.pool_count(), 0);

        let result = handle(&manager, "initSoundpool", json!({"maxStreams": 2}))
            .await
            .unwrap();
        assert_eq!(result, json!(-1));
        assert_eq!(platform.pool_count(), 0);

        // maxStreams defaults to one.
        handle(&manager, "initSoundpool", json!({"streamType": 3}))
            .await
            .unwrap();
        assert_eq!(platform.pool(0).unwrap().config().max_streams, 1);
    }

    #[tokio::test]
    async fn test_rejections_are_sentinels() {
        let platform = MockPlatform::new();
        let (manager, _scratch) = start(&platform);
        handle(&manager, "initSoundpool", json!({"streamType": 0}))
            .await
            .unwrap();

        let note = handle(
            &manager,
            "loadNote",
            json!({"poolId": 0, "type": "moderate", "index": 200}),
        )
        .await
        .unwrap();
        assert_eq!(note, json!(-1));

        platform.reject_loads(true);
        let load = handle(
            &manager,
            "load",
            json!({"poolId": 0, "rawSound": [1, 2, 3], "priority": 1}),
        )
        .await
        .unwrap();
        assert_eq!(load, json!(-1));

        let stream = handle(&manager, "play", json!({"poolId": 0, "soundId": 5}))
            .await
            .unwrap();
        assert_eq!(stream, json!(0));
    }

    #[tokio::test]
    async fn test_failures() {
        let platform = MockPlatform::new();
        let (manager, _scratch) = start(&platform);
        handle(&manager, "initSoundpool", json!({"streamType": 1}))
            .await
            .unwrap();

        let failure = handle(
            &manager,
            "setVolume",
            json!({"poolId": 0, "volumeLeft": 1.0, "volumeRight": 1.0}),
        )
        .await
        .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InvalidParameters);

        let failure = handle(&manager, "pause", json!({"poolId": 3, "streamId": 1}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::UnknownSession);

        let failure = handle(&manager, "stop", json!({"poolId": -1, "streamId": 1}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::UnknownSession);
        assert_eq!(failure.message, "Unknown session -1");

        let failure = handle(&manager, "pause", json!({"poolId": 0}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InvalidParameters);

        let failure = handle(&manager, "getVersion", json!({})).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::NotImplemented);

        let failure = handle(
            &manager,
            "loadUri",
            json!({"poolId": 0, "uri": "gopher://example.com/a", "priority": 1}),
        )
        .await
        .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InvalidParameters);
    }

    #[tokio::test]
    async fn test_controls_and_lifecycle() {
        let platform = MockPlatform::new().with_auto_complete(0);
        let (manager, _scratch) = start(&platform);
        handle(&manager, "initSoundpool", json!({"streamType": 2, "maxStreams": 2}))
            .await
            .unwrap();
        let sound = handle(
            &manager,
            "load",
            json!({"poolId": 0, "rawSound": [1], "priority": 1}),
        )
        .await
        .unwrap();
        let stream = handle(
            &manager,
            "play",
            json!({"poolId": 0, "soundId": sound, "repeat": -1, "volumeLeft": 0.3}),
        )
        .await
        .unwrap();
        let played = platform
            .pool(0)
            .unwrap()
            .stream(StreamId(stream.as_i64().unwrap() as i32))
            .unwrap();
        assert_eq!(played.params.loop_count, -1);
        assert_eq!((played.params.left, played.params.right), (0.3, 1.0));

        for method in ["pause", "resume"] {
            let ack = handle(&manager, method, json!({"poolId": 0, "streamId": stream}))
                .await
                .unwrap();
            assert_eq!(ack, stream);
        }
        assert_eq!(
            handle(&manager, "setRate", json!({"poolId": 0, "streamId": stream}))
                .await
                .unwrap(),
            Value::Null
        );

        assert_eq!(
            handle(&manager, "release", json!({"poolId": 0})).await.unwrap(),
            Value::Null
        );
        assert_eq!(
            handle(&manager, "dispose", json!({"poolId": 0})).await.unwrap(),
            Value::Null
        );
        let failure = handle(&manager, "release", json!({"poolId": 0}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::UnknownSession);
    }
}
