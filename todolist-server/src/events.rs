use std::convert::Infallible;
use std::io;
use async_stream::stream;
use futures_util::{FutureExt, Stream};
use log::{debug, error};
use tokio::sync::mpsc;
use warp::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HeaderValue};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};
use todolist_lib::{CloseNotify, ListEvent, Sink};
use crate::{AppState, with_state};

/// Frames buffered between a session and hyper before writes wait.
const BODY_BUFFER: usize = 16;

/// Session sink feeding a streaming response body.
///
/// The client is gone once hyper drops the body, which closes the channel.
pub struct HttpSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl Sink for HttpSink {
    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.tx
            .send(buf.to_vec())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped"))
    }

    // every write is already its own body chunk
    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close_notify(&mut self) -> Option<CloseNotify> {
        let tx = self.tx.clone();
        Some(async move { tx.closed().await }.boxed())
    }
}

/// A sink and the body stream it feeds.
pub fn sse_channel() -> (HttpSink, impl Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static) {
    let (tx, mut rx) = mpsc::channel(BODY_BUFFER);
    let body = stream! {
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, Infallible>(frame);
        }
    };
    (HttpSink { tx }, body)
}

/// `GET /events`
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::get()
        .and(warp::path("events"))
        .and(warp::path::end())
        .and(with_state(state))
        .and_then(handle_events)
}

async fn handle_events(state: AppState) -> Result<Response, Infallible> {
    let lists = match state.store.todo_lists().await {
        Ok(lists) => lists,
        Err(e) => {
            error!("failed to get todo lists: {}", e);
            return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    let mut snapshot = Vec::with_capacity(lists.len());
    for list in lists {
        match serde_json::to_vec(&ListEvent::updated(list)) {
            Ok(data) => snapshot.push(data),
            Err(e) => {
                error!("failed to marshal event: {}", e);
                return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }
        }
    }

    let (sink, body) = sse_channel();
    let session = match state.registry.new_session(sink).await {
        Ok(session) => session,
        Err(e) => {
            error!("failed to make SSE session: {}", e);
            return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    // the body is only polled after we return, so the snapshot goes out
    // from its own task
    tokio::spawn(async move {
        for event in snapshot {
            session.send(event).await;
        }
        let cause = session.wait().await;
        debug!("event stream {} closed: {}", session.id(), cause);
    });

    let mut res = Response::new(Body::wrap_stream(body));
    let headers = res.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use todolist_lib::{Registry, TerminalCause, TodoList, TodoStore};

    #[tokio::test]
    async fn body_carries_session_frames() {
        let registry = Registry::default();
        let (sink, body) = sse_channel();
        let mut body = Box::pin(body);
        let session = registry.new_session(sink).await.unwrap();

        registry.broadcast(&b"{\"n\":1}"[..]).await;
        let frame = body.next().await.unwrap().unwrap();
        assert_eq!(frame, b"data: {\"n\":1}\n\n");

        session.cancel();
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_body_reads_as_disconnect() {
        let registry = Registry::default();
        let (sink, body) = sse_channel();
        let session = registry.new_session(sink).await.unwrap();

        drop(body);
        assert!(matches!(session.wait().await, TerminalCause::Disconnected));
    }

    #[tokio::test]
    async fn stream_starts_with_snapshot() {
        let store = TodoStore::open_in_memory().await.unwrap();
        let mut list = TodoList {
            name: "Shopping".into(),
            owner: "Jonas".into(),
            ..Default::default()
        };
        list.assign_ids();
        store.add_todo_list(&list).await.unwrap();

        let registry = Registry::default();
        let state = AppState { store, registry: registry.clone() };
        let filter = routes(state);

        // the stream never ends on its own
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            registry.shutdown();
        });

        let res = warp::test::request().path("/events").reply(&filter).await;
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["content-type"], "text/event-stream");

        let body = String::from_utf8(res.body().to_vec()).unwrap();
        let expected = format!(
            "data: {}\n\n",
            serde_json::to_string(&ListEvent::updated(list)).unwrap()
        );
        assert_eq!(body, expected);
    }
}
