//! OpenAI Responses API client
//!
//! Blocking calls read the `output_text` parts of the response body.
//! Streaming calls consume server-sent events until `response.completed`,
//! yielding every `response.output_text.delta` as one fragment.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::config::LlmConfig;

use super::client::{
    CompletionClient, CompletionRequest, LlmError, LlmResult, PromptMessage, TokenStream,
};

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a [PromptMessage],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl ResponsesBody {
    /// Concatenated text of every `output_text` part of every message item
    fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

/// Streamed event payloads this client acts on
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.completed")]
    Completed {},
    #[serde(rename = "response.failed")]
    Failed {
        #[serde(default)]
        response: serde_json::Value,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// What a single SSE data payload means for the token stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    Delta(String),
    Done,
    Failed(String),
}

/// Interpret one SSE `data:` payload. Unknown event types yield `None`.
pub fn interpret_event(data: &str) -> Option<StreamSignal> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(StreamSignal::Done);
    }

    match serde_json::from_str::<ResponseEvent>(data) {
        Ok(ResponseEvent::OutputTextDelta { delta }) => Some(StreamSignal::Delta(delta)),
        Ok(ResponseEvent::Completed {}) => Some(StreamSignal::Done),
        Ok(ResponseEvent::Failed { response }) => {
            let message = response
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("response failed")
                .to_string();
            Some(StreamSignal::Failed(message))
        },
        Ok(ResponseEvent::Error { message }) => Some(StreamSignal::Failed(
            message.unwrap_or_else(|| "stream error".to_string()),
        )),
        Ok(ResponseEvent::Other) => None,
        Err(e) => {
            debug!("Skipping undecodable stream event: {}", e);
            None
        },
    }
}

/// Incremental splitter for `text/event-stream` bodies.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters and `\r\n` pairs split across network chunks decode intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Feed a network chunk; returns the data payloads of every completed event
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = self.process_line(&line[..pos]) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush whatever is left once the body ends without a trailing blank line
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        // An unterminated line still belongs to the last event
        if !rest.is_empty()
            && let Some(data) = self.process_line(&rest)
        {
            return Some(data);
        }
        self.take_event()
    }

    /// Handle one line without its `\n`; a blank line closes the event
    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return self.take_event();
        }

        let line = match String::from_utf8(line.to_vec()) {
            Ok(line) => line,
            Err(e) => {
                warn!("Invalid UTF-8 in stream event: {}", e);
                String::from_utf8_lossy(line).into_owned()
            },
        };

        if let Some(data) = line.strip_prefix("data:") {
            self.data_lines
                .push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        None
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data_lines).join("\n"))
        }
    }
}

/// Completion client for the OpenAI Responses API
#[derive(Clone)]
pub struct ResponsesClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl ResponsesClient {
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.config.base_url.trim_end_matches('/'))
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> LlmResult<reqwest::Response> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey)?;

        let body = ResponsesRequest {
            model: &self.config.model,
            input: &request.messages,
            stream,
        };

        let mut builder = self.http.post(self.endpoint()).bearer_auth(api_key).json(&body);
        if !stream {
            builder = builder.timeout(Duration::from_secs(self.config.timeout_seconds));
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("Completion API returned {}: {}", status, body);
            return Err(LlmError::Status { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for ResponsesClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        let response = self.send(&request, false).await?;
        let bytes = response.bytes().await?;
        let body: ResponsesBody = serde_json::from_slice(&bytes)?;

        if let Some(error) = body.error {
            return Err(LlmError::Api(
                error.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(body.output_text())
    }

    fn stream(&self, request: CompletionRequest) -> TokenStream {
        let client = self.clone();

        Box::pin(async_stream::stream! {
            let response = match client.send(&request, true).await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(LlmError::Request(e));
                        return;
                    }
                };

                for data in decoder.push(&chunk) {
                    match interpret_event(&data) {
                        Some(StreamSignal::Delta(delta)) => yield Ok(delta),
                        Some(StreamSignal::Done) => return,
                        Some(StreamSignal::Failed(message)) => {
                            yield Err(LlmError::Api(message));
                            return;
                        }
                        None => {}
                    }
                }
            }

            match decoder.finish().as_deref().and_then(interpret_event) {
                Some(StreamSignal::Delta(delta)) => yield Ok(delta),
                Some(StreamSignal::Done) => {}
                Some(StreamSignal::Failed(message)) => yield Err(LlmError::Api(message)),
                None => yield Err(LlmError::StreamEnded),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = CompletionRequest::with_system("sys", "hi");
        let body = ResponsesRequest {
            model: "gpt-5-mini",
            input: &request.messages,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-5-mini");
        assert_eq!(json["input"][0]["role"], "system");
        assert_eq!(json["input"][1]["content"], "hi");
        assert!(json.get("stream").is_none());

        let streaming = ResponsesRequest {
            model: "gpt-5-mini",
            input: &request.messages,
            stream: true,
        };
        assert_eq!(serde_json::to_value(&streaming).unwrap()["stream"], true);
    }

    #[test]
    fn test_output_text_skips_reasoning_items() {
        let body: ResponsesBody = serde_json::from_value(serde_json::json!({
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "role": "assistant", "content": [
                    {"type": "output_text", "text": "Hello", "annotations": []},
                    {"type": "output_text", "text": " there", "annotations": []}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(body.output_text(), "Hello there");
    }

    #[test]
    fn test_interpret_events() {
        assert_eq!(
            interpret_event(r#"{"type":"response.output_text.delta","item_id":"m1","delta":"Hi"}"#),
            Some(StreamSignal::Delta("Hi".to_string()))
        );
        assert_eq!(
            interpret_event(r#"{"type":"response.completed","response":{"id":"r1"}}"#),
            Some(StreamSignal::Done)
        );
        assert_eq!(
            interpret_event(
                r#"{"type":"response.failed","response":{"error":{"message":"quota"}}}"#
            ),
            Some(StreamSignal::Failed("quota".to_string()))
        );
        assert_eq!(
            interpret_event(r#"{"type":"response.created","response":{}}"#),
            None
        );
        assert_eq!(interpret_event("[DONE]"), Some(StreamSignal::Done));
        assert_eq!(interpret_event("not json"), None);
    }

    #[test]
    fn test_sse_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::default();

        let first = decoder.push(b"event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",");
        assert!(first.is_empty());

        let second = decoder.push(b"\"delta\":\"Hel\"}\n\nevent: x\r\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"lo\"}\r\n\r\n");
        assert_eq!(second.len(), 2);

        let deltas: Vec<_> = second
            .iter()
            .filter_map(|d| match interpret_event(d) {
                Some(StreamSignal::Delta(text)) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[test]
    fn test_sse_decoder_keeps_split_multibyte_characters() {
        let event = "data: {\"type\":\"response.output_text.delta\",\"delta\":\"caf\u{e9}\"}\n\n";
        let bytes = event.as_bytes();
        // Split between the two bytes of 'é'
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let payloads = decoder.push(&bytes[split..]);

        assert_eq!(payloads.len(), 1);
        assert_eq!(
            interpret_event(&payloads[0]),
            Some(StreamSignal::Delta("caf\u{e9}".to_string()))
        );
    }

    #[test]
    fn test_sse_decoder_joins_crlf_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"type\":\"response.completed\"}\r").is_empty());
        assert!(decoder.push(b"\n\r").is_empty());

        let payloads = decoder.push(b"\n");
        assert_eq!(payloads, vec![r#"{"type":"response.completed"}"#.to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_sse_decoder_finish_flushes_tail() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"type\":\"response.completed\"}").is_empty());
        let tail = decoder.finish();
        assert_eq!(
            tail.as_deref().and_then(interpret_event),
            Some(StreamSignal::Done)
        );
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_fast() {
        let client = ResponsesClient::new(LlmConfig::default()).unwrap();
        let err = client
            .complete(CompletionRequest::from_prompt("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));

        let mut stream = client.stream(CompletionRequest::from_prompt("hi"));
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(LlmError::MissingApiKey)));
        assert!(stream.next().await.is_none());
    }
}
