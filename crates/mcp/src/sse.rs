//! Server-sent event framing over a byte stream.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};

use crate::error::Error;

/// Event name used when the server omits the `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: String,
    pub data: String,
    pub id: Option<String>,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent, Error>> + Send>>;

/// Decode a raw response body into server-sent events.
pub fn parse_sse_stream<S, B, E>(byte_stream: S) -> SseStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + 'static,
{
    let events = byte_stream.eventsource().map(|result| {
        result
            .map(|event| SseEvent {
                event_type: if event.event.is_empty() {
                    DEFAULT_EVENT.to_string()
                } else {
                    event.event
                },
                data: event.data,
                id: (!event.id.is_empty()).then_some(event.id),
            })
            .map_err(|e| Error::Stream(e.to_string()))
    });

    Box::pin(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn events_from(chunks: Vec<&'static str>) -> SseStream {
        parse_sse_stream(stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok::<_, std::io::Error>(chunk.as_bytes().to_vec())),
        ))
    }

    #[tokio::test]
    async fn endpoint_then_message() {
        let mut events = events_from(vec![
            "event: endpoint\ndata: /messages/?session_id=abc\n\n",
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1}\n\n",
        ]);

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first.event_type, "endpoint");
        assert_eq!(first.data, "/messages/?session_id=abc");

        let second = events.next().await.unwrap().unwrap();
        assert_eq!(second.event_type, "message");
        assert_eq!(second.data, "{\"jsonrpc\":\"2.0\",\"id\":1}");
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn unnamed_events_default_to_message() {
        let mut events = events_from(vec!["id: 7\ndata: hello\n\n"]);

        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, DEFAULT_EVENT);
        assert_eq!(event.id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn events_split_across_chunks() {
        let mut events = events_from(vec!["event: mess", "age\ndata: {}\n", "\n"]);

        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, "message");
        assert_eq!(event.data, "{}");
    }
}
