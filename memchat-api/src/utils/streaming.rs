use axum::{
    body::Body,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;
use tracing::error;

use crate::core::llm::{LlmError, LlmResult, TokenStream};

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// Wait for the first token so a failure before any output can still be
/// reported with a proper status. The returned stream replays that token.
pub async fn await_first_token(mut tokens: TokenStream) -> LlmResult<TokenStream> {
    match tokens.next().await {
        Some(Err(e)) => Err(e),
        Some(Ok(first)) => {
            let first = futures::stream::once(async move { Ok::<_, LlmError>(first) });
            Ok(Box::pin(first.chain(tokens)))
        },
        None => Ok(tokens),
    }
}

/// Chunked `text/plain` body carrying the tokens as they arrive.
///
/// Headers are already sent when a token error shows up, so the body is
/// cut short and the failure only goes to the log.
pub fn create_text_stream(mut tokens: TokenStream) -> Response {
    let body = async_stream::stream! {
        while let Some(token) = tokens.next().await {
            match token {
                Ok(token) => yield Ok::<Bytes, Infallible>(Bytes::from(token)),
                Err(e) => {
                    error!("Reply stream aborted: {}", e);
                    return;
                }
            }
        }
    };

    let mut response = Body::from_stream(body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(TEXT_PLAIN_UTF8),
    );
    response
}
