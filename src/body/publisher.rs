//! Drives a transport stream into an `AsyncBodySubscriber`.
//!
//! The pump runs as a spawned task. It pulls an item from the stream only
//! when the subscriber has credit, with a single-item lookahead so that end
//! of stream and errors are reported even while no credit is outstanding.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};

use crate::body::decode::LineDecoder;
use crate::body::demand::Demand;
use crate::body::subscriber::AsyncBodySubscriber;
use crate::http::error::TransportError;
use crate::transport::ByteStream;

/// Subscribe `subscriber` to `stream` and start pumping.
pub fn publish<T, S>(stream: S, subscriber: Arc<AsyncBodySubscriber<T>>)
where
    T: Send + 'static,
    S: Stream<Item = Result<T, TransportError>> + Send + Unpin + 'static,
{
    let demand = Arc::new(Demand::new());
    subscriber.on_subscribe(demand.clone());
    tokio::spawn(pump(stream, subscriber, demand));
}

async fn pump<T, S>(mut stream: S, subscriber: Arc<AsyncBodySubscriber<T>>, demand: Arc<Demand>)
where
    T: Send + 'static,
    S: Stream<Item = Result<T, TransportError>> + Send + Unpin + 'static,
{
    let mut lookahead: Option<T> = None;
    loop {
        if let Some(item) = lookahead.take() {
            if !demand.acquire().await {
                break;
            }
            subscriber.on_next(item);
            continue;
        }

        let next = tokio::select! {
            biased;
            _ = demand.cancelled() => break,
            granted = demand.acquire() => {
                if !granted {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = demand.cancelled() => break,
                    next = stream.next() => Delivery::Now(next),
                }
            }
            next = stream.next() => Delivery::Later(next),
        };

        match next {
            Delivery::Now(Some(Ok(item))) => subscriber.on_next(item),
            Delivery::Later(Some(Ok(item))) => lookahead = Some(item),
            Delivery::Now(Some(Err(e))) | Delivery::Later(Some(Err(e))) => {
                tracing::debug!(error = %e, "Response body stream failed");
                subscriber.on_error(e);
                break;
            }
            Delivery::Now(None) | Delivery::Later(None) => {
                subscriber.on_complete();
                break;
            }
        }
    }
    if demand.is_cancelled() {
        tracing::trace!("Body pump stopped after cancellation");
    }
}

/// Whether an item was pulled with credit in hand or ahead of it.
enum Delivery<T> {
    Now(Option<Result<T, TransportError>>),
    Later(Option<Result<T, TransportError>>),
}

/// Split a byte stream into lines (`\n`, `\r` or `\r\n`). An unterminated
/// last line is still emitted.
pub fn lines(body: ByteStream) -> BoxStream<'static, Result<String, TransportError>> {
    futures_util::stream::unfold(
        (body, LineDecoder::default(), VecDeque::new(), false),
        |(mut body, mut decoder, mut ready, mut finished)| async move {
            loop {
                if let Some(line) = ready.pop_front() {
                    return Some((Ok(line), (body, decoder, ready, finished)));
                }
                if finished {
                    return None;
                }
                match body.next().await {
                    Some(Ok(chunk)) => ready.extend(decoder.decode(&chunk)),
                    Some(Err(e)) => return Some((Err(e), (body, decoder, ready, true))),
                    None => {
                        finished = true;
                        ready.extend(decoder.finish());
                    }
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::subscriber::AsyncBody;
    use crate::http::error::BodyError;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;

    fn body_of(chunks: Vec<&'static str>) -> ByteStream {
        futures_util::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes())))).boxed()
    }

    #[tokio::test]
    async fn lines_split_across_chunks() {
        let out: Vec<String> = lines(body_of(vec!["a\nb", "c\r\n", "tail"]))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["a", "bc", "tail"]);
    }

    #[tokio::test]
    async fn pump_waits_for_consume() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (subscriber, body) = AsyncBodySubscriber::new(move |line: String, _body: &AsyncBody| {
            sink.lock().unwrap().push(line);
            Ok(())
        });
        publish(lines(body_of(vec!["one\ntwo\nthree\n"])), subscriber);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["one"]);

        body.consume();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
        assert!(!body.is_done());

        body.consume();
        let done = tokio::time::timeout(Duration::from_secs(1), body.done()).await.unwrap();
        assert!(done.is_ok());
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn self_pulling_consumer_drains_everything() {
        let count = Arc::new(Mutex::new(0usize));
        let counter = count.clone();
        let (subscriber, body) = AsyncBodySubscriber::new(move |_line: String, body: &AsyncBody| {
            *counter.lock().unwrap() += 1;
            body.consume();
            Ok(())
        });
        publish(lines(body_of(vec!["1\n2\n", "3\n4\n5"])), subscriber);

        tokio::time::timeout(Duration::from_secs(1), body.done())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*count.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn cancel_stops_a_pending_stream() {
        let (subscriber, body) = AsyncBodySubscriber::new(|_chunk: Bytes, _body: &AsyncBody| Ok(()));
        let never: ByteStream = futures_util::stream::pending().boxed();
        publish(never, subscriber);

        body.cancel();
        let done = tokio::time::timeout(Duration::from_secs(1), body.done()).await.unwrap();
        assert!(matches!(done, Err(BodyError::Cancelled)));
    }

    #[tokio::test]
    async fn stream_error_reaches_done() {
        let (subscriber, body) = AsyncBodySubscriber::new(|_chunk: Bytes, body: &AsyncBody| {
            body.consume();
            Ok(())
        });
        let failing: ByteStream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(TransportError::Timeout(Duration::from_secs(1))),
        ])
        .boxed();
        publish(failing, subscriber);

        let done = tokio::time::timeout(Duration::from_secs(1), body.done()).await.unwrap();
        assert!(matches!(done, Err(BodyError::Upstream(_))));
    }
}
