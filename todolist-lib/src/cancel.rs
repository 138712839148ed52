use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a session stopped. Recorded once, by whichever trigger fires first.
#[derive(Clone, Debug, Error)]
pub enum TerminalCause {
    #[error("client connection closed or lost")]
    Disconnected,

    #[error("write to client failed: {0}")]
    WriteFailed(Arc<std::io::Error>),

    #[error("session cancelled")]
    Cancelled,

    #[error("client did not accept an event within {0:?}")]
    Stalled(Duration),
}

/// A cancellation token that remembers its terminal cause.
///
/// Cancelling the parent token counts as [`TerminalCause::Cancelled`] unless
/// another cause was recorded first.
pub(crate) struct Termination {
    token: CancellationToken,
    cause: OnceLock<TerminalCause>,
}

impl Termination {
    pub(crate) fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            cause: OnceLock::new(),
        }
    }

    /// Terminate with `cause`. Returns `false` if already terminated.
    pub(crate) fn terminate(&self, cause: TerminalCause) -> bool {
        if self.token.is_cancelled() {
            // pin the cause of a parent cancellation before anyone else can
            let _ = self.cause.get_or_init(|| TerminalCause::Cancelled);
            return false;
        }
        if self.cause.set(cause).is_err() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once terminated, without reading the cause.
    pub(crate) async fn terminated(&self) {
        self.token.cancelled().await
    }

    pub(crate) fn cause(&self) -> Option<TerminalCause> {
        if !self.token.is_cancelled() {
            return None;
        }
        Some(self.cause.get_or_init(|| TerminalCause::Cancelled).clone())
    }

    pub(crate) async fn wait(&self) -> TerminalCause {
        self.token.cancelled().await;
        self.cause.get_or_init(|| TerminalCause::Cancelled).clone()
    }
}
