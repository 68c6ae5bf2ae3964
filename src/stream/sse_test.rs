use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::StreamExt;
use tracing_test::traced_test;
use warp::http::StatusCode;
use warp::Filter;
use warp::Reply;

use crate::BackoffPolicy;
use crate::ConfigKey;
use crate::Error;
use crate::SseDecoder;
use crate::SseTransportFactory;
use crate::StreamConfig;
use crate::StreamError;
use crate::StreamEvent;
use crate::StreamMessage;
use crate::TransportFactory;

#[test]
fn decoder_emits_event_on_blank_line() {
    let mut decoder = SseDecoder::new();
    let events = decoder.push(b"event: features\ndata: {\"features\":{}}\n\n");
    assert_eq!(events, vec![StreamEvent::new("features", r#"{"features":{}}"#)]);
}

#[test]
fn decoder_handles_chunks_split_anywhere() {
    let frame = "event: features\r\ndata: {\"features\":{\"caf\u{e9}\":{}}}\r\n\r\n".as_bytes();
    let mut decoder = SseDecoder::new();
    let mut events = Vec::new();
    for byte in frame {
        events.extend(decoder.push(std::slice::from_ref(byte)));
    }
    assert_eq!(
        events,
        vec![StreamEvent::new("features", "{\"features\":{\"caf\u{e9}\":{}}}")]
    );
}

#[test]
fn decoder_joins_multi_line_data_and_skips_comments() {
    let mut decoder = SseDecoder::new();
    let events = decoder.push(b": keep-alive\n\ndata: first\ndata:second\nid: 7\n\n");
    assert_eq!(events, vec![StreamEvent::new("message", "first\nsecond")]);
}

#[test]
fn decoder_drops_frames_without_data() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"event: features\n\n").is_empty());
    // event name does not leak into the next frame
    assert_eq!(decoder.push(b"data: x\n\n"), vec![StreamEvent::new("message", "x")]);
}

#[test]
fn decoder_keeps_incomplete_frame_buffered() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"event: features\ndata: {}").is_empty());
    assert_eq!(decoder.push(b"\n\n"), vec![StreamEvent::new("features", "{}")]);
}

#[test]
#[traced_test]
fn decoder_bounds_a_line_that_never_ends() {
    let limit = 1024 * 1024;
    let mut decoder = SseDecoder::with_limit(limit);
    assert!(decoder.push(b"event: features\n").is_empty());

    let chunk = vec![b'x'; limit];
    for _ in 0..8 {
        assert!(decoder.push(&chunk).is_empty());
        assert!(decoder.buffered_len() <= limit);
    }
    assert!(logs_contain("sse line exceeds size limit"));

    // the tail of the long line and its event are dropped, the next event decodes
    let events = decoder.push(b"xxx\ndata: late\n\nevent: features\ndata: {}\n\n");
    assert_eq!(events, vec![StreamEvent::new("features", "{}")]);
    assert_eq!(decoder.buffered_len(), 0);
}

#[test]
fn decoder_drops_an_oversized_line_that_arrives_whole() {
    let mut decoder = SseDecoder::with_limit(16);
    let mut frame = b"event: ".to_vec();
    frame.extend(vec![b'e'; 32]);
    frame.extend_from_slice(b"\ndata: lost\n\ndata: kept\n\n");
    assert_eq!(decoder.push(&frame), vec![StreamEvent::new("message", "kept")]);
}

#[test]
#[traced_test]
fn decoder_drops_an_event_whose_body_grows_too_large() {
    let mut decoder = SseDecoder::with_limit(16);
    let events = decoder.push(b"event: features\ndata: 0123456789\ndata: 0123456789\nid: 1\n\ndata: ok\n\n");
    assert_eq!(events, vec![StreamEvent::new("message", "ok")]);
    assert!(logs_contain("sse event body exceeds size limit"));
}

#[test]
fn only_features_events_decode_to_payloads() {
    let features = StreamEvent::new("features", r#"{"features":{"f":{"defaultValue":1}}}"#);
    match StreamMessage::decode(&features).unwrap() {
        StreamMessage::Features(payload) => assert!(payload.feature("f").is_some()),
        other => panic!("unexpected message {other:?}"),
    }

    let other = StreamEvent::new("heartbeat", "not json");
    assert_eq!(
        StreamMessage::decode(&other).unwrap(),
        StreamMessage::Unknown("heartbeat".into())
    );

    assert!(StreamMessage::decode(&StreamEvent::new("features", "{oops")).is_err());
}

const BODY: &str = "event: features\ndata: {\"features\":{\"flag1\":{\"defaultValue\":true}}}\n\n: ping\n\nevent: heartbeat\ndata: 1\n\n";

fn fast_config(max_retries: usize) -> StreamConfig {
    StreamConfig {
        subscribe_path: "/sub".into(),
        channel_capacity: 4,
        max_event_bytes: 64 * 1024,
        reconnect: BackoffPolicy {
            max_retries,
            timeout_ms: 1_000,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
    }
}

/// `/sub/live` answers one SSE body then 503 for every reconnect;
/// anything else is 404.
async fn spawn_server(hits: Arc<AtomicUsize>) -> SocketAddr {
    let routes = warp::path!("sub" / String).map(move |key: String| {
        let hit = hits.fetch_add(1, Ordering::SeqCst);
        match key.as_str() {
            "live" if hit == 0 => warp::reply::with_header(BODY, "content-type", "text/event-stream").into_response(),
            "live" => warp::reply::with_status("busy", StatusCode::SERVICE_UNAVAILABLE).into_response(),
            _ => warp::reply::with_status("no", StatusCode::NOT_FOUND).into_response(),
        }
    });
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

#[tokio::test]
async fn sse_transport_reads_events_then_reports_exhausted_reconnects() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_server(hits.clone()).await;
    let factory = SseTransportFactory::new(fast_config(2));

    let mut events = factory
        .connect(&ConfigKey::new(format!("http://{addr}"), "live"))
        .await
        .unwrap();

    let first = events.next().await.unwrap().unwrap();
    assert_eq!(first.event_type, "features");
    assert_eq!(first.body, r#"{"features":{"flag1":{"defaultValue":true}}}"#);
    assert_eq!(events.next().await.unwrap().unwrap(), StreamEvent::new("heartbeat", "1"));

    let err = events.next().await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::Stream(StreamError::ReconnectExhausted { attempts: 2 })
    ));
    assert!(events.next().await.is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn sse_transport_fails_connect_on_error_status() {
    let addr = spawn_server(Arc::new(AtomicUsize::new(0))).await;
    let factory = SseTransportFactory::new(fast_config(2));

    let result = factory.connect(&ConfigKey::new(format!("http://{addr}"), "unknown")).await;

    assert!(matches!(
        result,
        Err(Error::Stream(StreamError::Status { status: 404, .. }))
    ));
}
