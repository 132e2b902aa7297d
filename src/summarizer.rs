//! Map-reduce summarization for documents too long for a single call.
//!
//! The document is chunked with overlap, each chunk summarized concurrently,
//! and the partial summaries combined in one final call. Every provider call
//! goes through the shared rate limiter, so fan-out width is bounded by the
//! window no matter how many chunks the document splits into.

use std::sync::Arc;

use futures::future::try_join_all;

use crate::error::ProviderError;
use crate::provider::ModelProvider;
use crate::utilities::text::chunk_text;
use crate::utilities::RateLimiter;

/// Characters per chunk.
pub const CHUNK_SIZE: usize = 8000;

/// Characters shared between consecutive chunks.
pub const CHUNK_OVERLAP: usize = 200;

const EMPTY_DOCUMENT_RESPONSE: &str = "I can't summarize an empty document.";

/// Summarize `text` with chunked fan-out and a final combine pass.
///
/// A single-chunk document still goes through the combine step so the output
/// register is uniform. Any chunk failure aborts the reduce and propagates.
pub async fn summarize_map_reduce(
    provider: Arc<dyn ModelProvider>,
    limiter: &RateLimiter,
    text: &str,
) -> Result<String, ProviderError> {
    if text.trim().is_empty() {
        return Ok(EMPTY_DOCUMENT_RESPONSE.to_string());
    }

    let chunks = chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP);
    log::debug!(
        "summarizing {} chars in {} chunk(s)",
        text.chars().count(),
        chunks.len()
    );

    let map_calls = chunks.into_iter().map(|chunk| {
        let provider = Arc::clone(&provider);
        async move {
            let prompt = format!(
                "Summarize the following text concisely:\n\n---\n{chunk}\n---\n\nSummary:"
            );
            limiter
                .execute(move || {
                    let provider = Arc::clone(&provider);
                    let prompt = prompt.clone();
                    async move { provider.generate(&prompt).await }
                })
                .await
        }
    });
    let partials = try_join_all(map_calls).await?;

    let combined = partials.join("\n\n");
    let reduce_prompt = format!(
        "The following are multiple summaries of different parts of a long document. \
         Combine them into a single, coherent, and well-structured final summary that \
         captures the key points of the entire document.\n\n---\n{combined}\n---\n\nFinal Summary:"
    );
    limiter
        .execute(move || {
            let provider = Arc::clone(&provider);
            let prompt = reduce_prompt.clone();
            async move { provider.generate(&prompt).await }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::provider::{TurnRequest, TurnResponse};

    struct EchoProvider {
        prompts: Mutex<Vec<String>>,
        fail_on_call: Option<usize>,
    }

    impl EchoProvider {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail_on_call: None,
            }
        }

        fn failing_on(call: usize) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail_on_call: Some(call),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for EchoProvider {
        async fn send_turn(&self, request: &TurnRequest) -> Result<TurnResponse, ProviderError> {
            let prompt = request.history[0].text();
            let call_index = {
                let mut prompts = self.prompts.lock();
                prompts.push(prompt);
                prompts.len() - 1
            };
            if self.fail_on_call == Some(call_index) {
                return Err(ProviderError::new("invalid request"));
            }
            Ok(TurnResponse {
                text: format!("summary-{call_index}"),
                tool_calls: Vec::new(),
            })
        }
    }

    fn fast_limiter() -> RateLimiter {
        RateLimiter::new(crate::utilities::RateLimitConfig {
            min_delay: std::time::Duration::ZERO,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_document_short_circuits() {
        let provider = Arc::new(EchoProvider::new());
        let result =
            summarize_map_reduce(Arc::clone(&provider) as _, &fast_limiter(), "  \n ").await;
        assert_eq!(result.unwrap(), EMPTY_DOCUMENT_RESPONSE);
        assert!(provider.prompts.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_document_two_calls() {
        let provider = Arc::new(EchoProvider::new());
        let result = summarize_map_reduce(
            Arc::clone(&provider) as _,
            &fast_limiter(),
            "photosynthesis turns light into sugar",
        )
        .await
        .unwrap();

        let prompts = provider.prompts.lock();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].starts_with("Summarize the following text concisely:"));
        assert!(prompts[1].starts_with("The following are multiple summaries"));
        assert!(prompts[1].contains("summary-0"));
        assert_eq!(result, "summary-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_document_fans_out_per_chunk() {
        let provider = Arc::new(EchoProvider::new());
        let text = "a".repeat(CHUNK_SIZE * 2);
        summarize_map_reduce(Arc::clone(&provider) as _, &fast_limiter(), &text)
            .await
            .unwrap();

        let prompts = provider.prompts.lock();
        // ceil(16000 / 7800) = 3 chunks, plus the combine call.
        let map_calls = prompts
            .iter()
            .filter(|p| p.starts_with("Summarize the following"))
            .count();
        assert_eq!(map_calls, 3);
        assert_eq!(prompts.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_failure_aborts_reduce() {
        let provider = Arc::new(EchoProvider::failing_on(1));
        let text = "b".repeat(CHUNK_SIZE * 2);
        let result = summarize_map_reduce(Arc::clone(&provider) as _, &fast_limiter(), &text).await;
        assert!(result.is_err());

        // No combine prompt was ever issued.
        let prompts = provider.prompts.lock();
        assert!(prompts
            .iter()
            .all(|p| p.starts_with("Summarize the following")));
    }
}
