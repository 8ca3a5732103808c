//! Server-sent event decoding for streamed completions

use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

use crate::error::Result;
use crate::llm::provider::ChatStream;
use crate::llm::types::StreamChunk;

const DONE_SENTINEL: &str = "[DONE]";

/// Extracts the text delta from one `data:` payload. `Ok(None)` means the
/// event carried no text.
pub(crate) type DeltaParser = fn(&str) -> serde_json::Result<Option<String>>;

struct SseState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamChunk>>,
    parse: DeltaParser,
    done: bool,
}

impl<S> SseState<S> {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
        }
    }

    fn handle_line(&mut self, line: &str) {
        if self.done {
            return;
        }
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == DONE_SENTINEL {
            self.finish();
            return;
        }
        match (self.parse)(data) {
            Ok(Some(content)) if !content.is_empty() => self.pending.push_back(Ok(StreamChunk {
                content,
                is_complete: false,
            })),
            Ok(_) => {}
            Err(e) => debug!("Skipping malformed stream event: {}", e),
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.pending.push_back(Ok(StreamChunk {
            content: String::new(),
            is_complete: true,
        }));
    }
}

/// Turn a raw byte stream into completion chunks. The last chunk always has
/// `is_complete` set, whether the server sent `[DONE]` or just closed.
pub(crate) fn decode<S, B>(bytes: S, parse: DeltaParser) -> ChatStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        parse,
        done: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.push_back(Err(e.into()));
                }
                None => {
                    let rest = std::mem::take(&mut state.buffer);
                    state.handle_line(&String::from_utf8_lossy(&rest));
                    if !state.done {
                        state.finish();
                    }
                }
            }
        }
    });

    Box::pin(stream)
}
