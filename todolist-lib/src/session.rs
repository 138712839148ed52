//! One subscriber's live event stream.
//!
//! A [`Session`] hands payloads to its dispatch task through a rendezvous:
//! [`Session::send`] only returns once the dispatch task has taken the
//! payload, so a slow client slows down its producers instead of growing a
//! buffer. The dispatch task frames each payload as a Server-Sent-Events
//! `data:` frame, writes it and flushes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::cancel::{TerminalCause, Termination};
use crate::sink::Sink;

/// Errors returned when opening a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("close notification not supported by sink")]
    CapabilityUnsupported,
}

struct Delivery {
    payload: Arc<[u8]>,
    accepted: oneshot::Sender<()>,
}

struct Inner {
    id: u64,
    termination: Termination,
    queue: mpsc::Sender<Delivery>,
    send_timeout: Option<Duration>,
}

/// Handle to a subscriber session. Clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

/// The dispatch half of a session, returned by [`Session::create`].
/// Nothing is written to the sink until it is spawned.
pub struct Dispatch<S: Sink> {
    inner: Arc<Inner>,
    queue: mpsc::Receiver<Delivery>,
    sink: S,
}

impl Session {
    /// Open session `id` on `sink`, terminated when `parent` is cancelled.
    ///
    /// Fails if the sink cannot report client disconnects. On success a
    /// watcher task is already running; the returned [`Dispatch`] still has
    /// to be spawned.
    pub fn create<S: Sink>(
        id: u64,
        mut sink: S,
        parent: &CancellationToken,
        send_timeout: Option<Duration>,
    ) -> Result<(Session, Dispatch<S>), SessionError> {
        let close = sink
            .close_notify()
            .ok_or(SessionError::CapabilityUnsupported)?;

        let (tx, rx) = mpsc::channel(1);
        let inner = Arc::new(Inner {
            id,
            termination: Termination::child_of(parent),
            queue: tx,
            send_timeout,
        });

        let watched = Arc::clone(&inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = close => {
                    if watched.termination.terminate(TerminalCause::Disconnected) {
                        debug!("session {}: client disconnected", watched.id);
                    }
                }
                _ = watched.termination.terminated() => {}
            }
        });

        let dispatch = Dispatch {
            inner: Arc::clone(&inner),
            queue: rx,
            sink,
        };
        Ok((Session { inner }, dispatch))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.termination.is_terminated()
    }

    /// Terminal cause, or `None` while the session is active.
    pub fn cause(&self) -> Option<TerminalCause> {
        self.inner.termination.cause()
    }

    /// Deliver one payload.
    ///
    /// A no-op on a terminated session. Otherwise waits until the dispatch
    /// task takes the payload or the session terminates. If a send timeout is
    /// set and the hand-off does not finish in time, the session is
    /// terminated as [`TerminalCause::Stalled`].
    pub async fn send(&self, payload: impl Into<Arc<[u8]>>) {
        let inner = &self.inner;
        if inner.termination.is_terminated() {
            return;
        }

        let (accepted, handoff) = oneshot::channel();
        let delivery = Delivery {
            payload: payload.into(),
            accepted,
        };
        let handoff = async {
            if inner.queue.send(delivery).await.is_ok() {
                let _ = handoff.await;
            }
        };

        match inner.send_timeout {
            Some(limit) => tokio::select! {
                biased;
                _ = inner.termination.terminated() => {}
                res = tokio::time::timeout(limit, handoff) => {
                    if res.is_err() && inner.termination.terminate(TerminalCause::Stalled(limit)) {
                        warn!("session {}: client stalled for {:?}, dropping it", inner.id, limit);
                    }
                }
            },
            None => tokio::select! {
                biased;
                _ = inner.termination.terminated() => {}
                _ = handoff => {}
            },
        }
    }

    /// Terminate the session from outside.
    pub fn cancel(&self) {
        if self.inner.termination.terminate(TerminalCause::Cancelled) {
            debug!("session {}: cancelled", self.inner.id);
        }
    }

    /// Wait until the session is terminated and return why.
    pub async fn wait(&self) -> TerminalCause {
        self.inner.termination.wait().await
    }

    pub(crate) fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl<S: Sink> Dispatch<S> {
    /// Spawn the dispatch task. `teardown` runs once, after the session
    /// has terminated.
    pub fn spawn<F>(self, teardown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(teardown))
    }

    async fn run<F>(mut self, teardown: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        loop {
            // `inner` owns the sender, so the queue stays open
            let Delivery { payload, accepted } = tokio::select! {
                biased;
                _ = inner.termination.terminated() => break,
                Some(delivery) = self.queue.recv() => delivery,
            };
            let _ = accepted.send(());

            let frame = frame(&payload);
            debug!("session {}: {}", inner.id, String::from_utf8_lossy(&frame).trim_end());

            // a write cut short by termination leaves a partial frame; the
            // stream is finished either way
            let written = tokio::select! {
                biased;
                _ = inner.termination.terminated() => break,
                res = self.write_frame(&frame) => res,
            };
            if let Err(e) = written {
                debug!("session {}: failed to write to client: {}", inner.id, e);
                inner.termination.terminate(TerminalCause::WriteFailed(Arc::new(e)));
                break;
            }
        }

        if let Some(cause) = inner.termination.cause() {
            debug!("session {} ended: {}", inner.id, cause);
        }
        teardown.await;
    }

    async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.sink.write(frame).await?;
        self.sink.flush().await
    }
}

/// Frame a payload as a Server-Sent-Events message. Every line of the
/// payload gets its own `data:` field.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    for line in payload.split(|b| *b == b'\n') {
        out.extend_from_slice(b"data: ");
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out.push(b'\n');
    out
}
