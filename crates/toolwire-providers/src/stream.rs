//! Server-sent events decoding for streamed chat completions.
//!
//! OpenAI-compatible APIs send `data: {chunk}` lines terminated by
//! `data: [DONE]`. Text deltas are forwarded as they arrive; tool-call
//! deltas are concatenated per `index` and released once the choice
//! finishes, since a partial argument string is useless to the caller.

use std::collections::{BTreeMap, VecDeque};

use futures_util::stream::{self, Stream, StreamExt};
use tracing::{debug, warn};

use toolwire_core::types::{ChatCompletionChunk, ToolCall};

use crate::traits::{Fragment, FragmentStream};

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Incremental SSE parser. Feed raw body bytes with [`push`](Self::push),
/// then call [`finish`](Self::finish) at end of body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    calls: BTreeMap<usize, PartialCall>,
    finish_reason: Option<String>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of body bytes and return any complete fragments.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Fragment> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\r', '\n']), &mut out);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        out
    }

    /// Flush whatever remains once the body has ended.
    pub fn finish(&mut self) -> Vec<Fragment> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() && !self.done {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest);
            self.handle_line(rest.trim_end_matches(['\r', '\n']), &mut out);
        }
        self.complete(&mut out);
        out
    }

    /// End the stream early with an error text.
    pub fn fail(&mut self, message: impl Into<String>) -> Vec<Fragment> {
        if self.done {
            return Vec::new();
        }
        self.calls.clear();
        self.done = true;
        vec![
            Fragment::Text(message.into()),
            Fragment::Done {
                finish_reason: Some("error".to_string()),
            },
        ]
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<Fragment>) {
        // Blank separators, comments and `event:`/`id:` fields carry nothing we use.
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim();

        if payload == "[DONE]" {
            self.complete(out);
            return;
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "skipping unreadable stream chunk");
                return;
            }
        };

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                out.push(Fragment::Text(text));
            }

            for delta in choice.delta.tool_calls {
                let call = self.calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    call.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(args) = function.arguments {
                        call.arguments.push_str(&args);
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
                self.flush_calls(out);
            }
        }
    }

    fn flush_calls(&mut self, out: &mut Vec<Fragment>) {
        for (index, call) in std::mem::take(&mut self.calls) {
            if call.name.is_empty() {
                warn!(index, "dropping streamed tool call without a name");
                continue;
            }
            let id = if call.id.is_empty() {
                format!("call_{index}")
            } else {
                call.id
            };
            let arguments = if call.arguments.trim().is_empty() {
                "{}".to_string()
            } else {
                call.arguments
            };
            out.push(Fragment::ToolCall(ToolCall::new(id, call.name, arguments)));
        }
    }

    fn complete(&mut self, out: &mut Vec<Fragment>) {
        if self.done {
            return;
        }
        self.flush_calls(out);
        self.done = true;
        debug!(finish_reason = ?self.finish_reason, "stream complete");
        out.push(Fragment::Done {
            finish_reason: self.finish_reason.take(),
        });
    }
}

/// Turn a streamed response body into fragments.
pub fn sse_fragments<S, B, E>(body: S) -> FragmentStream<'static>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<S> {
        body: std::pin::Pin<Box<S>>,
        decoder: SseDecoder,
        queue: VecDeque<Fragment>,
        ended: bool,
    }

    let state = State {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        ended: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.queue.pop_front() {
                return Some((fragment, st));
            }
            if st.ended {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let fragments = st.decoder.push(bytes.as_ref());
                    st.queue.extend(fragments);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "stream interrupted");
                    let fragments = st.decoder.fail(format!("Error reading LLM stream: {e}"));
                    st.queue.extend(fragments);
                    st.ended = true;
                }
                None => {
                    let fragments = st.decoder.finish();
                    st.queue.extend(fragments);
                    st.ended = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_chunk(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": text }, "finish_reason": null }] })
        )
    }

    #[test]
    fn test_text_deltas() {
        let mut decoder = SseDecoder::new();
        let mut fragments = decoder.push(text_chunk("Hel").as_bytes());
        fragments.extend(decoder.push(text_chunk("lo").as_bytes()));
        fragments.extend(decoder.push(b"data: [DONE]\n\n"));

        assert_eq!(
            fragments,
            vec![
                Fragment::Text("Hel".into()),
                Fragment::Text("lo".into()),
                Fragment::Done { finish_reason: None },
            ]
        );
    }

    #[test]
    fn test_line_split_across_chunks() {
        let line = text_chunk("split");
        let (a, b) = line.split_at(10);

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(a.as_bytes()).is_empty());
        assert_eq!(decoder.push(b.as_bytes()), vec![Fragment::Text("split".into())]);
    }

    #[test]
    fn test_tool_call_deltas_are_accumulated() {
        let body = concat!(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"get_repository_stars","arguments":""}}]}}]}"#, "\n",
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"owner\":"}}]}}]}"#, "\n",
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"get_user_repositories","arguments":"{}"}}]}}]}"#, "\n",
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust-lang\"}"}}]}}]}"#, "\n",
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#, "\n",
            "data: [DONE]\n",
        );

        let mut decoder = SseDecoder::new();
        let fragments = decoder.push(body.as_bytes());

        assert_eq!(fragments.len(), 3);
        match &fragments[0] {
            Fragment::ToolCall(call) => {
                assert_eq!(call.id, "call_a");
                assert_eq!(call.function.name, "get_repository_stars");
                assert_eq!(call.function.arguments, r#"{"owner":"rust-lang"}"#);
            }
            other => panic!("expected tool call, got {other:?}"),
        }
        assert!(matches!(&fragments[1], Fragment::ToolCall(c) if c.id == "call_b"));
        assert_eq!(
            fragments[2],
            Fragment::Done {
                finish_reason: Some("tool_calls".into())
            }
        );
    }

    #[test]
    fn test_missing_done_marker_still_completes() {
        let mut decoder = SseDecoder::new();
        let mut fragments = decoder.push(text_chunk("partial").as_bytes());
        fragments.extend(decoder.finish());
        assert_eq!(fragments.last(), Some(&Fragment::Done { finish_reason: None }));

        // Nothing after completion.
        assert!(decoder.finish().is_empty());
        assert!(decoder.push(text_chunk("late").as_bytes()).is_empty());
    }

    #[test]
    fn test_garbage_lines_are_skipped() {
        let mut decoder = SseDecoder::new();
        let fragments = decoder.push(b": keep-alive\nevent: ping\ndata: {not json}\n");
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_ends_with_text() {
        let body = stream::iter(vec![
            Ok(text_chunk("one").into_bytes()),
            Err("connection reset"),
        ]);
        let fragments: Vec<Fragment> = sse_fragments(body).collect().await;

        assert_eq!(fragments[0], Fragment::Text("one".into()));
        assert!(matches!(&fragments[1], Fragment::Text(t) if t.contains("connection reset")));
        assert_eq!(
            fragments[2],
            Fragment::Done {
                finish_reason: Some("error".into())
            }
        );
    }
}
