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

//! The blocking and network halves of each load variant. These run on workers
//! and never touch session state; their result is posted back to the
//! coordinator.

use std::fmt;
use std::fs::{self, File};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use super::builtin::ResourceRef;
use super::temp_blob::TempBlobStore;
use crate::error::PoolError;
use crate::platform::{SoundId, SoundPool};

/// Priority handed to the pool for provider-backed resources, whatever the
/// caller asked for.
const DESCRIPTOR_PRIORITY: i32 = 1;

/// Where a sound should be loaded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locator {
    /// A provider-backed resource, opened and handed to the pool as a
    /// descriptor without staging.
    Content(PathBuf),
    /// A local file, read into memory and staged.
    File(PathBuf),
    /// An http(s) resource, fetched into memory and staged.
    Remote(Url),
}

impl FromStr for Locator {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = match Url::parse(s) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                return Ok(Locator::File(PathBuf::from(s)))
            }
            Err(e) => {
                return Err(PoolError::InvalidParameters(format!(
                    "invalid uri {}: {}",
                    s, e
                )))
            }
        };

        match url.scheme() {
            "content" => {
                let path = match url.host_str() {
                    Some(host) if !host.is_empty() => format!("/{}{}", host, url.path()),
                    _ => url.path().to_string(),
                };
                Ok(Locator::Content(PathBuf::from(path)))
            }
            "file" => url
                .to_file_path()
                .map(Locator::File)
                .map_err(|_| PoolError::InvalidParameters(format!("invalid file uri {}", s))),
            "http" | "https" => Ok(Locator::Remote(url)),
            scheme => Err(PoolError::InvalidParameters(format!(
                "unsupported uri scheme {}",
                scheme
            ))),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Content(path) => write!(f, "content://{}", path.display()),
            Locator::File(path) => write!(f, "{}", path.display()),
            Locator::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Stages `bytes` to a scratch file and loads it. The scratch file is gone by
/// the time this returns.
pub fn load_from_bytes(
    pool: &dyn SoundPool,
    store: &TempBlobStore,
    bytes: &[u8],
    priority: i32,
) -> Result<SoundId, PoolError> {
    let blob = store.store(bytes)?;
    let sound = pool.load_from_path(blob.path(), priority);
    debug!(sound = %sound, size = bytes.len(), "Loaded staged sound");
    Ok(sound)
}

/// Loads from any supported locator.
pub async fn load_from_locator(
    pool: Arc<dyn SoundPool>,
    store: TempBlobStore,
    client: reqwest::Client,
    locator: Locator,
    priority: i32,
) -> Result<SoundId, PoolError> {
    match locator {
        Locator::Content(path) => {
            blocking(move || {
                let file = File::open(&path).map_err(|e| fetch_failure(&path.display(), e))?;
                Ok(pool.load_from_descriptor(file, DESCRIPTOR_PRIORITY))
            })
            .await
        }
        Locator::File(path) => {
            blocking(move || {
                let bytes = fs::read(&path).map_err(|e| fetch_failure(&path.display(), e))?;
                load_from_bytes(pool.as_ref(), &store, &bytes, priority)
            })
            .await
        }
        Locator::Remote(url) => {
            let bytes = fetch(&client, &url).await?;
            blocking(move || load_from_bytes(pool.as_ref(), &store, &bytes, priority)).await
        }
    }
}

/// Loads a bundled resource. Unknown categories and out of range indices are
/// rejected without reaching the pool.
pub fn load_builtin(
    pool: &dyn SoundPool,
    category: &str,
    index: i64,
) -> Result<SoundId, PoolError> {
    let resource = ResourceRef::lookup(category, index).ok_or_else(|| {
        warn!(category, index, "Unknown bundled resource");
        PoolError::LoadRejected(SoundId::REJECTED)
    })?;

    let sound = pool.load_builtin(&resource);
    if sound.is_rejected() {
        return Err(PoolError::LoadRejected(sound));
    }
    Ok(sound)
}

async fn fetch(client: &reqwest::Client, url: &Url) -> Result<Vec<u8>, PoolError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| fetch_failure(url, e))?;

    let status = response.status();
    if !status.is_success() {
        warn!(url = %url, status = %status, "Remote sound request failed");
        return Err(fetch_failure(url, format!("HTTP {}", status)));
    }

    let bytes = response.bytes().await.map_err(|e| fetch_failure(url, e))?;
    debug!(url = %url, size = bytes.len(), "Fetched remote sound");
    Ok(bytes.to_vec())
}

async fn blocking<F, T>(f: F) -> Result<T, PoolError>
where
    F: FnOnce() -> Result<T, PoolError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn fetch_failure(locator: &dyn fmt::Display, err: impl fmt::Display) -> PoolError {
    PoolError::FetchFailure {
        locator: locator.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod test {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::platform::mock::MockPlatform;
    use crate::platform::{CompletionSink, Platform, PoolConfig, StreamCategory};

    fn mock_pool() -> (MockPlatform, Arc<dyn SoundPool>) {
        let platform = MockPlatform::new().with_first_sound_id(7);
        let pool = platform
            .create_pool(
                PoolConfig {
                    max_streams: 1,
                    category: StreamCategory::Music,
                },
                CompletionSink::new(|_, _| {}),
            )
            .unwrap();
        (platform, pool)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    /// Answers a single HTTP request with `status` and `body`, returning the
    /// url to request.
    async fn serve_once(status: &'static str, body: &'static [u8]) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        Url::parse(&format!("http://{}/sound.wav", addr)).unwrap()
    }

    #[test]
    fn test_parse_locators() {
        assert_eq!(
            "content:///media/a.wav".parse::<Locator>().unwrap(),
            Locator::Content(PathBuf::from("/media/a.wav"))
        );
        assert_eq!(
            "content://media/a.wav".parse::<Locator>().unwrap(),
            Locator::Content(PathBuf::from("/media/a.wav"))
        );
        assert_eq!(
            "file:///tmp/b.ogg".parse::<Locator>().unwrap(),
            Locator::File(PathBuf::from("/tmp/b.ogg"))
        );
        assert_eq!(
            "sounds/c.wav".parse::<Locator>().unwrap(),
            Locator::File(PathBuf::from("sounds/c.wav"))
        );
        assert!(matches!(
            "https://example.com/d.mp3".parse::<Locator>().unwrap(),
            Locator::Remote(_)
        ));
        assert!(matches!(
            "ftp://example.com/e.wav".parse::<Locator>(),
            Err(PoolError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_load_from_bytes_cleans_up() {
        let (platform, pool) = mock_pool();
        let dir = tempfile::tempdir().unwrap();
        let store = TempBlobStore::new(dir.path());

        let sound = load_from_bytes(pool.as_ref(), &store, b"riff", 1).unwrap();
        assert_eq!(sound, SoundId(7));
        assert_eq!(
            platform.pool(0).unwrap().loaded_bytes(sound),
            Some(b"riff".to_vec())
        );
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_load_from_bytes_unwritable() {
        let (_platform, pool) = mock_pool();
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();
        let store = TempBlobStore::new(blocker.join("scratch"));

        assert!(matches!(
            load_from_bytes(pool.as_ref(), &store, b"riff", 1),
            Err(PoolError::IoFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_load_file_locator() {
        let (platform, pool) = mock_pool();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sound.wav");
        fs::write(&path, b"wave").unwrap();
        let store = TempBlobStore::new(dir.path().join("scratch"));

        let sound = load_from_locator(
            pool,
            store,
            reqwest::Client::new(),
            Locator::File(path),
            1,
        )
        .await
        .unwrap();
        assert_eq!(
            platform.pool(0).unwrap().loaded_bytes(sound),
            Some(b"wave".to_vec())
        );
    }

    #[tokio::test]
    async fn test_load_content_locator_skips_staging() {
        let (platform, pool) = mock_pool();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provided.wav");
        fs::write(&path, b"provided").unwrap();
        let scratch = dir.path().join("scratch");

        let sound = load_from_locator(
            pool,
            TempBlobStore::new(&scratch),
            reqwest::Client::new(),
            Locator::Content(path),
            5,
        )
        .await
        .unwrap();
        let mock = platform.pool(0).unwrap();
        assert_eq!(mock.loaded_bytes(sound), Some(b"provided".to_vec()));
        assert_eq!(mock.load_priority(sound), Some(1));
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_load_remote_locator() {
        let (platform, pool) = mock_pool();
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("200 OK", b"remote wave").await;

        let sound = load_from_locator(
            pool,
            TempBlobStore::new(dir.path()),
            client(),
            Locator::Remote(url),
            3,
        )
        .await
        .unwrap();
        let mock = platform.pool(0).unwrap();
        assert_eq!(mock.loaded_bytes(sound), Some(b"remote wave".to_vec()));
        assert_eq!(mock.load_priority(sound), Some(3));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_status_is_fetch_failure() {
        let (platform, pool) = mock_pool();
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once("404 Not Found", b"").await;

        let result = load_from_locator(
            pool,
            TempBlobStore::new(dir.path()),
            client(),
            Locator::Remote(url),
            1,
        )
        .await;
        match result {
            Err(PoolError::FetchFailure { reason, .. }) => assert!(reason.contains("404")),
            other => panic!("expected a fetch failure, got {:?}", other),
        }
        assert_eq!(platform.pool(0).unwrap().loaded_bytes(SoundId(7)), None);
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_fetch_failure() {
        let (_platform, pool) = mock_pool();
        let dir = tempfile::tempdir().unwrap();
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = Url::parse(&format!("http://127.0.0.1:{}/x.wav", port)).unwrap();

        let result = load_from_locator(
            pool,
            TempBlobStore::new(dir.path()),
            client(),
            Locator::Remote(url),
            1,
        )
        .await;
        assert!(matches!(result, Err(PoolError::FetchFailure { .. })));
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_failure() {
        let (_platform, pool) = mock_pool();
        let dir = tempfile::tempdir().unwrap();

        let result = load_from_locator(
            pool,
            TempBlobStore::new(dir.path()),
            reqwest::Client::new(),
            Locator::File(dir.path().join("missing.wav")),
            1,
        )
        .await;
        assert!(matches!(result, Err(PoolError::FetchFailure { .. })));
    }

    #[test]
    fn test_load_builtin() {
        let (_platform, pool) = mock_pool();
        assert_eq!(load_builtin(pool.as_ref(), "moderate", 0).unwrap(), SoundId(7));
        assert!(matches!(
            load_builtin(pool.as_ref(), "moderate", 88),
            Err(PoolError::LoadRejected(SoundId(-1)))
        ));
        assert!(matches!(
            load_builtin(pool.as_ref(), "loud", 0),
            Err(PoolError::LoadRejected(SoundId(-1)))
        ));
        assert!(matches!(
            load_builtin(pool.as_ref(), "moderate", -1),
            Err(PoolError::LoadRejected(SoundId(-1)))
        ));
    }
}
