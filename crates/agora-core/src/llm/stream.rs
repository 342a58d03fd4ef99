//! Streaming plumbing shared by every provider adapter
//!
//! Adapters only describe how to build the HTTP request and how to decode one
//! frame of the response body. SSE bodies are framed by `eventsource-stream`,
//! NDJSON bodies by [`LineBuffer`]. Cancellation and the terminal event are
//! handled here.

use super::LlmError;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the per-call event channel
pub const STREAM_CAPACITY: usize = 100;

/// Normalized event produced by every adapter.
///
/// Exactly one of `Done`, `Cancelled` or `Error` ends the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// A visible text fragment
    Chunk(String),

    /// Upstream finished normally
    Done,

    /// The caller's cancellation token fired
    Cancelled,

    /// Upstream or transport failure
    Error(LlmError),
}

impl LlmEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LlmEvent::Chunk(_))
    }
}

/// Receiving half of one chat call
pub type LlmStream = mpsc::Receiver<LlmEvent>;

/// Reassembles complete lines from arbitrarily split body chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them (without `\r\n`).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Flush a trailing line that had no terminating newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// How a decoded line ends the stream
#[derive(Debug)]
pub(crate) enum Finish {
    Done,
    Error(LlmError),
}

/// How a response body is split into frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// `text/event-stream`; one frame per dispatched event
    Sse,
    /// Newline-delimited JSON; one frame per line
    Lines,
}

/// Per-provider wire decoder, fed one complete frame at a time.
pub(crate) trait FrameDecoder: Send + 'static {
    const FRAMING: Framing = Framing::Sse;

    /// Decode one frame, pushing visible text to `out`. `event` is the SSE
    /// event name (empty for line framing) and `data` its payload. Returns
    /// `Some` once the upstream signalled the end of the stream.
    fn decode(&mut self, event: &str, data: &str, out: &mut Vec<String>) -> Option<Finish>;
}

/// Issue `request` on a background task and stream decoded events back.
pub(crate) fn spawn_stream<D: FrameDecoder>(
    request: reqwest::RequestBuilder,
    decoder: D,
    cancel: CancellationToken,
) -> LlmStream {
    let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
    tokio::spawn(pump(request, decoder, tx, cancel));
    rx
}

async fn pump<D: FrameDecoder>(
    request: reqwest::RequestBuilder,
    mut decoder: D,
    tx: mpsc::Sender<LlmEvent>,
    cancel: CancellationToken,
) {
    let terminal = tokio::select! {
        biased;
        _ = cancel.cancelled() => LlmEvent::Cancelled,
        _ = tx.closed() => return,
        outcome = drive(request, &mut decoder, &tx) => outcome,
    };

    if let LlmEvent::Error(ref e) = terminal {
        tracing::warn!("LLM stream failed: {}", e);
    }
    let _ = tx.send(terminal).await;
}

async fn drive<D: FrameDecoder>(
    request: reqwest::RequestBuilder,
    decoder: &mut D,
    tx: &mpsc::Sender<LlmEvent>,
) -> LlmEvent {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return LlmEvent::Error(e.into()),
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return LlmEvent::Error(LlmError::from_status(status.as_u16(), body));
    }

    match D::FRAMING {
        Framing::Sse => read_events(response, decoder, tx).await,
        Framing::Lines => read_lines(response, decoder, tx).await,
    }
}

async fn read_events<D: FrameDecoder>(
    response: reqwest::Response,
    decoder: &mut D,
    tx: &mpsc::Sender<LlmEvent>,
) -> LlmEvent {
    let mut events = response.bytes_stream().eventsource();
    let mut chunks = Vec::new();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => return LlmEvent::Error(LlmError::Stream(e.to_string())),
        };
        tracing::trace!("SSE event: {} {}", event.event, event.data);
        if let Some(terminal) = deliver(decoder, &event.event, &event.data, &mut chunks, tx).await
        {
            return terminal;
        }
    }
    LlmEvent::Done
}

async fn read_lines<D: FrameDecoder>(
    response: reqwest::Response,
    decoder: &mut D,
    tx: &mpsc::Sender<LlmEvent>,
) -> LlmEvent {
    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::new();
    let mut chunks = Vec::new();

    loop {
        let (pending, eof) = match body.next().await {
            Some(Ok(bytes)) => (lines.push(&bytes), false),
            Some(Err(e)) => return LlmEvent::Error(LlmError::Stream(e.to_string())),
            None => (lines.finish().into_iter().collect(), true),
        };

        for line in pending {
            if let Some(terminal) = deliver(decoder, "", &line, &mut chunks, tx).await {
                return terminal;
            }
        }

        if eof {
            return LlmEvent::Done;
        }
    }
}

/// Decode one frame and forward its text. Returns the terminal event once
/// the stream is over.
async fn deliver<D: FrameDecoder>(
    decoder: &mut D,
    event: &str,
    data: &str,
    chunks: &mut Vec<String>,
    tx: &mpsc::Sender<LlmEvent>,
) -> Option<LlmEvent> {
    let finish = decoder.decode(event, data, chunks);
    for text in chunks.drain(..) {
        if tx.send(LlmEvent::Chunk(text)).await.is_err() {
            return Some(LlmEvent::Done);
        }
    }
    match finish {
        Some(Finish::Done) => Some(LlmEvent::Done),
        Some(Finish::Error(e)) => Some(LlmEvent::Error(e)),
        None => None,
    }
}

/// Extract a human readable message from an `{"error": ...}` payload.
pub(crate) fn error_message(json: &serde_json::Value) -> Option<String> {
    let error = json.get("error")?;
    if let Some(msg) = error.get("message").and_then(|m| m.as_str()) {
        return Some(msg.to_string());
    }
    Some(error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string()))
}
