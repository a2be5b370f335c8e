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

//! The session manager.
//!
//! A single task owns every session and handles all caller requests and
//! platform completion signals in arrival order. Anything that blocks runs on
//! a worker, which posts its result back as a message instead of touching a
//! session.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::error::PoolError;
use crate::platform::{Platform, SoundId, StreamId};
use crate::pool::load::{self, Locator};
use crate::pool::session::CompletionRoute;
use crate::pool::{
    PlayRequest, Responder, SessionConfig, SessionId, SessionRegistry, TempBlobStore,
    VolumeRequest,
};

/// Control actions on a live stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamAction {
    Pause,
    Resume,
    Stop,
}

/// A request against an existing session.
enum SessionCall {
    Release(Responder<()>),
    LoadBytes {
        bytes: Vec<u8>,
        priority: i32,
        reply: Responder<SoundId>,
    },
    LoadLocator {
        locator: Locator,
        priority: i32,
        reply: Responder<SoundId>,
    },
    LoadBuiltin {
        category: String,
        index: i64,
        reply: Responder<SoundId>,
    },
    Play {
        request: PlayRequest,
        reply: Responder<StreamId>,
    },
    Control {
        stream: StreamId,
        action: StreamAction,
        reply: Responder<StreamId>,
    },
    SetVolume {
        request: VolumeRequest,
        reply: Responder<()>,
    },
    SetRate {
        stream: StreamId,
        rate: f32,
        reply: Responder<()>,
    },
}

impl SessionCall {
    /// Fails the call without running it.
    fn fail(self, err: PoolError) {
        match self {
            SessionCall::Release(reply)
            | SessionCall::SetVolume { reply, .. }
            | SessionCall::SetRate { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            SessionCall::LoadBytes { reply, .. }
            | SessionCall::LoadLocator { reply, .. }
            | SessionCall::LoadBuiltin { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            SessionCall::Play { reply, .. } | SessionCall::Control { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

enum Message {
    Create {
        config: SessionConfig,
        reply: Responder<SessionId>,
    },
    Dispose {
        session: SessionId,
        reply: Responder<()>,
    },
    Call {
        session: SessionId,
        call: SessionCall,
    },
    /// A completion signal raised by the pool of `epoch`.
    Completion {
        session: SessionId,
        epoch: u64,
        sound: SoundId,
        status: i32,
    },
    /// A worker finished the platform load call of a load that expects a
    /// completion signal.
    Loaded {
        session: SessionId,
        epoch: u64,
        outcome: Result<SoundId, PoolError>,
        reply: Responder<SoundId>,
    },
    /// A worker finished and its answer is ready for the caller.
    Deliver(Box<dyn FnOnce() + Send>),
}

/// Posts messages back to the coordinator without keeping it alive.
#[derive(Clone)]
struct Mailbox(mpsc::WeakUnboundedSender<Message>);

impl Mailbox {
    fn post(&self, message: Message) {
        match self.0.upgrade() {
            Some(tx) => {
                if tx.send(message).is_err() {
                    debug!("Coordinator gone, dropping message");
                }
            }
            None => debug!("Coordinator gone, dropping message"),
        }
    }

    /// Answers a caller once the coordinator gets to it.
    fn deliver<T: Send + 'static>(&self, reply: Responder<T>, result: Result<T, PoolError>) {
        self.post(Message::Deliver(Box::new(move || {
            let _ = reply.send(result);
        })));
    }
}

/// A handle to the session manager. Cloning is cheap; the coordinator runs
/// until every handle is dropped, then disposes all remaining sessions.
#[derive(Clone)]
pub struct SessionManager {
    tx: mpsc::UnboundedSender<Message>,
}

impl SessionManager {
    /// Starts the coordinator. When `sweep_on_start` is set, scratch files left
    /// behind by an earlier process are removed first.
    pub fn start(
        platform: Arc<dyn Platform>,
        store: TempBlobStore,
        sweep_on_start: bool,
    ) -> (SessionManager, JoinHandle<()>) {
        if sweep_on_start {
            match store.sweep() {
                Ok(removed) => info!(dir = ?store.dir(), removed, "Swept scratch directory"),
                Err(e) => warn!(dir = ?store.dir(), err = %e, "Unable to sweep scratch directory"),
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            registry: SessionRegistry::new(),
            platform,
            store,
            client: reqwest::Client::new(),
            mailbox: Mailbox(tx.downgrade()),
        };
        let span = span!(Level::INFO, "session manager");
        let handle = tokio::spawn(coordinator.run(rx).instrument(span));
        (SessionManager { tx }, handle)
    }

    /// Creates a session and allocates its pool.
    pub async fn create_session(&self, config: SessionConfig) -> Result<SessionId, PoolError> {
        self.request(|reply| Message::Create { config, reply }).await
    }

    /// Releases a session's pool permanently and forgets the session.
    pub async fn dispose_session(&self, session: SessionId) -> Result<(), PoolError> {
        self.request(|reply| Message::Dispose { session, reply })
            .await
    }

    /// Releases the session's pool and allocates a fresh one. Sound and stream
    /// ids from before the release are no longer valid.
    pub async fn release(&self, session: SessionId) -> Result<(), PoolError> {
        self.call(session, SessionCall::Release).await
    }

    /// Loads a sound from raw bytes. Resolves once the pool reports the load as
    /// finished.
    pub async fn load(
        &self,
        session: SessionId,
        bytes: Vec<u8>,
        priority: i32,
    ) -> Result<SoundId, PoolError> {
        self.call(session, |reply| SessionCall::LoadBytes {
            bytes,
            priority,
            reply,
        })
        .await
    }

    /// Loads a sound from a locator. Resolves once the pool reports the load as
    /// finished.
    pub async fn load_uri(
        &self,
        session: SessionId,
        locator: Locator,
        priority: i32,
    ) -> Result<SoundId, PoolError> {
        self.call(session, |reply| SessionCall::LoadLocator {
            locator,
            priority,
            reply,
        })
        .await
    }

    /// Loads a bundled resource. Resolves as soon as the pool hands out an id.
    pub async fn load_builtin(
        &self,
        session: SessionId,
        category: impl Into<String>,
        index: i64,
    ) -> Result<SoundId, PoolError> {
        let category = category.into();
        self.call(session, |reply| SessionCall::LoadBuiltin {
            category,
            index,
            reply,
        })
        .await
    }

    pub async fn play(
        &self,
        session: SessionId,
        request: PlayRequest,
    ) -> Result<StreamId, PoolError> {
        self.call(session, |reply| SessionCall::Play { request, reply })
            .await
    }

    pub async fn pause(&self, session: SessionId, stream: StreamId) -> Result<StreamId, PoolError> {
        self.control(session, stream, StreamAction::Pause).await
    }

    pub async fn resume(&self, session: SessionId, stream: StreamId) -> Result<StreamId, PoolError> {
        self.control(session, stream, StreamAction::Resume).await
    }

    pub async fn stop(&self, session: SessionId, stream: StreamId) -> Result<StreamId, PoolError> {
        self.control(session, stream, StreamAction::Stop).await
    }

    pub async fn set_volume(
        &self,
        session: SessionId,
        request: VolumeRequest,
    ) -> Result<(), PoolError> {
        self.call(session, |reply| SessionCall::SetVolume { request, reply })
            .await
    }

    pub async fn set_rate(
        &self,
        session: SessionId,
        stream: StreamId,
        rate: f32,
    ) -> Result<(), PoolError> {
        self.call(session, |reply| SessionCall::SetRate {
            stream,
            rate,
            reply,
        })
        .await
    }

    async fn control(
        &self,
        session: SessionId,
        stream: StreamId,
        action: StreamAction,
    ) -> Result<StreamId, PoolError> {
        self.call(session, |reply| SessionCall::Control {
            stream,
            action,
            reply,
        })
        .await
    }

    async fn call<T>(
        &self,
        session: SessionId,
        build: impl FnOnce(Responder<T>) -> SessionCall,
    ) -> Result<T, PoolError> {
        self.request(|reply| Message::Call {
            session,
            call: build(reply),
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Responder<T>) -> Message,
    ) -> Result<T, PoolError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| PoolError::Shutdown)?;
        rx.await.map_err(|_| PoolError::Shutdown)?
    }
}

struct Coordinator {
    registry: SessionRegistry,
    platform: Arc<dyn Platform>,
    store: TempBlobStore,
    client: reqwest::Client,
    mailbox: Mailbox,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        info!(scratch_dir = ?self.store.dir(), "Session manager started.");

        while let Some(message) = rx.recv().await {
            self.handle(message);
        }

        info!("Session manager closing.");
        self.registry.dispose_all();
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Create { config, reply } => {
                let route = self.completion_route();
                let result = self.registry.create(config, self.platform.clone(), route);
                if let Err(e) = &result {
                    error!(err = %e, "Unable to create session");
                }
                let _ = reply.send(result);
            }
            Message::Dispose { session, reply } => {
                let _ = reply.send(self.registry.dispose(session));
            }
            Message::Call { session, call } => self.dispatch(session, call),
            Message::Completion {
                session,
                epoch,
                sound,
                status,
            } => match self.registry.get_mut(session) {
                Ok(s) => s.load_completed(epoch, sound, status),
                Err(_) => debug!(session = %session, sound = %sound, "Completion for disposed session"),
            },
            Message::Loaded {
                session,
                epoch,
                outcome,
                reply,
            } => match self.registry.get_mut(session) {
                Ok(s) => s.load_accepted(epoch, outcome, reply),
                Err(_) => {
                    let _ = reply.send(Err(PoolError::Abandoned));
                }
            },
            Message::Deliver(deliver) => deliver(),
        }
    }

    fn dispatch(&mut self, id: SessionId, call: SessionCall) {
        let session = match self.registry.get_mut(id) {
            Ok(session) => session,
            Err(e) => return call.fail(e),
        };

        match call {
            SessionCall::Release(reply) => {
                let _ = reply.send(session.release());
            }
            SessionCall::LoadBytes {
                bytes,
                priority,
                reply,
            } => {
                let ticket = match session.begin_load() {
                    Ok(ticket) => ticket,
                    Err(e) => return send(reply, Err(e)),
                };
                let store = self.store.clone();
                let mailbox = self.mailbox.clone();
                tokio::spawn(async move {
                    let pool = ticket.pool;
                    let outcome = tokio::task::spawn_blocking(move || {
                        load::load_from_bytes(pool.as_ref(), &store, &bytes, priority)
                    })
                    .await
                    .unwrap_or_else(|e| Err(e.into()));
                    mailbox.post(Message::Loaded {
                        session: id,
                        epoch: ticket.epoch,
                        outcome,
                        reply,
                    });
                });
            }
            SessionCall::LoadLocator {
                locator,
                priority,
                reply,
            } => {
                let ticket = match session.begin_load() {
                    Ok(ticket) => ticket,
                    Err(e) => return send(reply, Err(e)),
                };
                debug!(session = %id, locator = %locator, "Loading from locator");
                let store = self.store.clone();
                let client = self.client.clone();
                let mailbox = self.mailbox.clone();
                tokio::spawn(async move {
                    let outcome =
                        load::load_from_locator(ticket.pool, store, client, locator, priority)
                            .await;
                    mailbox.post(Message::Loaded {
                        session: id,
                        epoch: ticket.epoch,
                        outcome,
                        reply,
                    });
                });
            }
            SessionCall::LoadBuiltin {
                category,
                index,
                reply,
            } => {
                let pool = match session.pool() {
                    Ok(pool) => pool,
                    Err(e) => return send(reply, Err(e)),
                };
                self.blocking(reply, move || {
                    load::load_builtin(pool.as_ref(), &category, index)
                });
            }
            SessionCall::Play { request, reply } => {
                let params = match session.play_params(&request) {
                    Ok(params) => params,
                    Err(e) => return send(reply, Err(e)),
                };
                let pool = match session.pool() {
                    Ok(pool) => pool,
                    Err(e) => return send(reply, Err(e)),
                };
                self.blocking(reply, move || {
                    let stream = pool.play(request.sound, &params);
                    if stream.is_none() {
                        return Err(PoolError::PlayRejected(request.sound));
                    }
                    Ok(stream)
                });
            }
            SessionCall::Control {
                stream,
                action,
                reply,
            } => {
                let pool = match session.pool() {
                    Ok(pool) => pool,
                    Err(e) => return send(reply, Err(e)),
                };
                self.blocking(reply, move || {
                    match action {
                        StreamAction::Pause => pool.pause(stream),
                        StreamAction::Resume => pool.resume(stream),
                        StreamAction::Stop => pool.stop(stream),
                    }
                    Ok(stream)
                });
            }
            SessionCall::SetVolume { request, reply } => {
                let _ = reply.send(session.set_volume(request));
            }
            SessionCall::SetRate {
                stream,
                rate,
                reply,
            } => {
                let _ = reply.send(session.set_rate(stream, rate));
            }
        }
    }

    /// Runs `f` on a worker and hands its result back for delivery.
    fn blocking<T, F>(&self, reply: Responder<T>, f: F)
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, PoolError> + Send + 'static,
    {
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(f)
                .await
                .unwrap_or_else(|e| Err(e.into()));
            mailbox.deliver(reply, result);
        });
    }

    /// Builds the route pool completion signals take back to this task.
    fn completion_route(&self) -> CompletionRoute {
        let mailbox = self.mailbox.clone();
        Arc::new(move |session, epoch, sound, status| {
            mailbox.post(Message::Completion {
                session,
                epoch,
                sound,
                status,
            })
        })
    }
}

fn send<T>(reply: Responder<T>, result: Result<T, PoolError>) {
    let _ = reply.send(result);
}
