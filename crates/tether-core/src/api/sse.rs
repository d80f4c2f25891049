//! Event framing for the agent's streamed responses.
//!
//! The agent streams a single HTTP body containing blank-line-delimited
//! event records (`event:` / `data:` lines). Chunks arrive fragmented and
//! coalesced arbitrarily, and some servers omit the final blank-line
//! terminator, so the framer buffers across chunks and flushes whatever
//! remains when the body ends.

use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use tokio_util::bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::error::StreamError;

/// Event name assumed when a record carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// One complete, delimited record parsed out of the streamed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

pub type SseEventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, StreamError>> + Send>>;

/// Reassemble raw byte chunks into complete [`SseEvent`] records.
///
/// Records are emitted in arrival order, never split across emissions.
/// Cancellation abandons the underlying read and ends the stream without
/// an error; transport failures surface once and terminate emission.
pub fn frame_event_stream<S, E>(byte_stream: S, token: CancellationToken) -> SseEventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(stream! {
        let mut byte_stream = std::pin::pin!(byte_stream);
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let chunk = tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(target: "api::sse", "stream cancelled mid-read; abandoning");
                    return;
                }
                chunk = byte_stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some((record_end, next_start)) = next_boundary(&buffer) {
                        let record: Vec<u8> = buffer[..record_end].to_vec();
                        buffer.drain(..next_start);
                        if let Some(event) = parse_record(&record) {
                            yield Ok(event);
                        }
                    }
                }
                Some(Err(e)) => {
                    yield Err(StreamError::transport(e.to_string()));
                    return;
                }
                None => break,
            }
        }

        // Flush: the final record may arrive without its terminator.
        for record in split_records(&buffer) {
            if let Some(event) = parse_record(record) {
                yield Ok(event);
            }
        }
    })
}

/// Locate the next record boundary, detecting the line-ending convention
/// from the buffer itself rather than assuming one. CRLF is checked first
/// so CRLF streams are never mis-split on the `\n\n` inside their own
/// terminator sequence.
fn next_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    if let Some(idx) = find_subslice(buf, b"\r\n\r\n") {
        return Some((idx, idx + 4));
    }
    find_subslice(buf, b"\n\n").map(|idx| (idx, idx + 2))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split_records(buf: &[u8]) -> Vec<&[u8]> {
    let delimiter: &[u8] = if find_subslice(buf, b"\r\n\r\n").is_some() {
        b"\r\n\r\n"
    } else {
        b"\n\n"
    };

    let mut records = Vec::new();
    let mut rest = buf;
    while let Some(idx) = find_subslice(rest, delimiter) {
        records.push(&rest[..idx]);
        rest = &rest[idx + delimiter.len()..];
    }
    if !rest.is_empty() {
        records.push(rest);
    }
    records
}

/// Parse one record's raw text into an event.
///
/// Field prefixes are matched case-insensitively; multiple `data:` lines
/// are joined with `\n`; unrecognized lines are ignored. A record with no
/// data lines produces no event.
fn parse_record(raw: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(raw);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = strip_prefix_ignore_case(trimmed, "event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = strip_prefix_ignore_case(trimmed, "data:") {
            data_lines.push(rest.trim().to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseEvent {
        event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        data: data_lines.join("\n"),
    })
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use proptest::prelude::*;

    fn byte_chunks(
        chunks: Vec<Vec<u8>>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
    }

    async fn collect_events(chunks: Vec<Vec<u8>>) -> Vec<SseEvent> {
        let token = CancellationToken::new();
        let mut framed = frame_event_stream(byte_chunks(chunks), token);
        let mut events = Vec::new();
        while let Some(item) = framed.next().await {
            events.push(item.unwrap());
        }
        events
    }

    #[tokio::test]
    async fn parses_single_event() {
        let events =
            collect_events(vec![b"event: data\ndata: {\"x\": 1}\n\n".to_vec()]).await;
        assert_eq!(
            events,
            vec![SseEvent {
                event: "data".to_string(),
                data: "{\"x\": 1}".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn parses_multiple_events_in_one_chunk() {
        let events =
            collect_events(vec![b"event: start\ndata: first\n\nevent: delta\ndata: second\n\n"
                .to_vec()])
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "start");
        assert_eq!(events[0].data, "first");
        assert_eq!(events[1].event, "delta");
        assert_eq!(events[1].data, "second");
    }

    #[tokio::test]
    async fn handles_crlf_line_endings() {
        let events = collect_events(vec![
            b"event: data\r\ndata: one\r\n\r\nevent: end\r\ndata: done\r\n\r\n".to_vec(),
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "one");
        assert_eq!(events[1].event, "end");
    }

    #[tokio::test]
    async fn one_byte_at_a_time_matches_single_chunk() {
        let raw = b"event: data\ndata: alpha\n\nevent: metadata\ndata: beta\ndata: gamma\n\n";
        let whole = collect_events(vec![raw.to_vec()]).await;
        let bytewise =
            collect_events(raw.iter().map(|b| vec![*b]).collect::<Vec<_>>()).await;
        assert_eq!(whole, bytewise);
        assert_eq!(whole.len(), 2);
        assert_eq!(whole[1].data, "beta\ngamma");
    }

    #[tokio::test]
    async fn flushes_trailing_record_without_terminator() {
        let events =
            collect_events(vec![b"event: data\ndata: one\n\nevent: end\ndata: bye".to_vec()])
                .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, "end");
        assert_eq!(events[1].data, "bye");
    }

    #[tokio::test]
    async fn record_without_data_lines_is_discarded() {
        let events = collect_events(vec![
            b"event: ping\n\nevent: data\ndata: kept\n\n".to_vec(),
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "kept");
    }

    #[tokio::test]
    async fn field_prefixes_match_case_insensitively() {
        let events = collect_events(vec![b"EVENT: data\nDATA: shouty\n\n".to_vec()]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "data");
        assert_eq!(events[0].data, "shouty");
    }

    #[tokio::test]
    async fn unrecognized_lines_are_ignored() {
        let events = collect_events(vec![
            b": comment\nid: 42\nretry: 100\ndata: payload\n\n".to_vec(),
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, DEFAULT_EVENT);
        assert_eq!(events[0].data, "payload");
    }

    #[tokio::test]
    async fn cancellation_stops_emission_without_error() {
        let token = CancellationToken::new();
        token.cancel();
        let mut framed = frame_event_stream(
            byte_chunks(vec![b"event: data\ndata: never\n\n".to_vec()]),
            token,
        );
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn transport_failure_surfaces_and_terminates() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"event: data\ndata: ok\n\n")),
            Err(std::io::Error::other("connection reset")),
        ];
        let mut framed = frame_event_stream(stream::iter(chunks), CancellationToken::new());

        assert!(framed.next().await.unwrap().is_ok());
        let err = framed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Transport { .. }));
        assert!(framed.next().await.is_none());
    }

    fn arb_record() -> impl Strategy<Value = (String, Vec<String>)> {
        (
            prop_oneof![
                Just("data".to_string()),
                Just("metadata".to_string()),
                Just("end".to_string()),
                "[a-z]{1,8}",
            ],
            prop::collection::vec("[a-zA-Z0-9 {}:,\"]{1,40}", 1..4),
        )
    }

    fn render(records: &[(String, Vec<String>)], crlf: bool) -> Vec<u8> {
        let eol = if crlf { "\r\n" } else { "\n" };
        let mut out = String::new();
        for (event, data) in records {
            out.push_str(&format!("event: {event}{eol}"));
            for line in data {
                out.push_str(&format!("data: {line}{eol}"));
            }
            out.push_str(eol);
        }
        out.into_bytes()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // For any chunking of the same bytes, the framer emits the same records.
        #[test]
        fn prop_chunking_is_invariant(
            records in prop::collection::vec(arb_record(), 1..6),
            crlf in any::<bool>(),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let raw = render(&records, crlf);

            let mut indices: Vec<usize> =
                cuts.iter().map(|i| i.index(raw.len().max(1))).collect();
            indices.sort_unstable();
            indices.dedup();

            let mut chunks = Vec::new();
            let mut start = 0;
            for idx in indices {
                if idx > start {
                    chunks.push(raw[start..idx].to_vec());
                    start = idx;
                }
            }
            chunks.push(raw[start..].to_vec());

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let whole = runtime.block_on(collect_events(vec![raw.clone()]));
            let split = runtime.block_on(collect_events(chunks));

            prop_assert_eq!(whole.len(), records.len());
            prop_assert_eq!(whole, split);
        }
    }
}
