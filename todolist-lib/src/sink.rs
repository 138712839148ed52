use std::future::Future;
use std::io;
use futures::future::BoxFuture;

/// Resolves once the client behind a sink has gone away.
pub type CloseNotify = BoxFuture<'static, ()>;

/// The outbound side of one client connection.
///
/// Writes are ordered; `flush` pushes everything written so far to the
/// client. Transports that can tell when the client disconnects hand out a
/// [`CloseNotify`] from `close_notify`; it is asked for exactly once, when a
/// session is created on the sink.
pub trait Sink: Send + 'static {
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    fn close_notify(&mut self) -> Option<CloseNotify> {
        None
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Sink that records frames in memory.
    pub(crate) struct MemorySink {
        frames: Arc<Mutex<Vec<String>>>,
        close: Option<oneshot::Receiver<()>>,
        fail: Arc<AtomicBool>,
        stall: Arc<AtomicBool>,
    }

    /// Test-side controls for a [`MemorySink`].
    pub(crate) struct SinkHandle {
        frames: Arc<Mutex<Vec<String>>>,
        disconnect: Option<oneshot::Sender<()>>,
        fail: Arc<AtomicBool>,
        stall: Arc<AtomicBool>,
    }

    pub(crate) fn memory_sink() -> (MemorySink, SinkHandle) {
        let (tx, rx) = oneshot::channel();
        build(Some(rx), Some(tx))
    }

    /// A sink that cannot report disconnects.
    pub(crate) fn memory_sink_without_close() -> (MemorySink, SinkHandle) {
        build(None, None)
    }

    fn build(
        close: Option<oneshot::Receiver<()>>,
        disconnect: Option<oneshot::Sender<()>>,
    ) -> (MemorySink, SinkHandle) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let fail = Arc::new(AtomicBool::new(false));
        let stall = Arc::new(AtomicBool::new(false));
        let sink = MemorySink {
            frames: Arc::clone(&frames),
            close,
            fail: Arc::clone(&fail),
            stall: Arc::clone(&stall),
        };
        let handle = SinkHandle { frames, disconnect, fail, stall };
        (sink, handle)
    }

    impl Sink for MemorySink {
        async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
            if self.stall.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
            }
            self.frames
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(buf).into_owned());
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn close_notify(&mut self) -> Option<CloseNotify> {
            self.close.take().map(|rx| {
                async move {
                    let _ = rx.await;
                }
                .boxed()
            })
        }
    }

    impl SinkHandle {
        /// Raw frames as written, including the SSE framing.
        pub(crate) fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }

        /// Frame payloads with the `data: ` prefix and terminator stripped.
        pub(crate) fn payloads(&self) -> Vec<String> {
            self.frames()
                .iter()
                .map(|f| {
                    f.strip_prefix("data: ")
                        .and_then(|f| f.strip_suffix("\n\n"))
                        .unwrap_or(f)
                        .to_string()
                })
                .collect()
        }

        pub(crate) fn disconnect(&mut self) {
            if let Some(tx) = self.disconnect.take() {
                let _ = tx.send(());
            }
        }

        pub(crate) fn fail_writes(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        pub(crate) fn stall_writes(&self) {
            self.stall.store(true, Ordering::SeqCst);
        }

        /// Wait until at least `n` frames were written.
        pub(crate) async fn wait_for(&self, n: usize) {
            tokio::time::timeout(Duration::from_secs(2), async {
                while self.frames.lock().unwrap().len() < n {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("frames were not written in time");
        }
    }
}
