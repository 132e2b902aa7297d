//! History trimming for provider requests.
//!
//! The durable session record keeps every message; trimming applies only to
//! the view sent upstream, so a long conversation never loses its past, it
//! just stops sending all of it.

use crate::provider::Content;
use crate::utilities::text::estimate_tokens;

/// Token budget for the history slice of a provider request.
pub const DEFAULT_HISTORY_TOKEN_BUDGET: usize = 20_000;

/// Always keep at least this many trailing messages, budget or not.
const MIN_KEPT_MESSAGES: usize = 4;

/// Most recent suffix of `messages` that fits `token_budget`.
///
/// Walks backwards accumulating estimated tokens; the last
/// [`MIN_KEPT_MESSAGES`] are kept unconditionally so the current exchange
/// always survives even when a single message blows the budget.
pub fn trim_history(messages: &[Content], token_budget: usize) -> Vec<Content> {
    let mut kept = 0;
    let mut spent = 0;
    for message in messages.iter().rev() {
        let cost = estimate_tokens(&message.text());
        if kept >= MIN_KEPT_MESSAGES && spent + cost > token_budget {
            break;
        }
        spent += cost;
        kept += 1;
    }
    messages[messages.len() - kept..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(n: usize, chars: usize) -> Content {
        let text = format!("{n}:{}", "x".repeat(chars.saturating_sub(2)));
        if n % 2 == 0 {
            Content::user_text(text)
        } else {
            Content::model_text(text)
        }
    }

    #[test]
    fn test_short_history_untouched() {
        let messages: Vec<Content> = (0..6).map(|n| message(n, 20)).collect();
        let trimmed = trim_history(&messages, DEFAULT_HISTORY_TOKEN_BUDGET);
        assert_eq!(trimmed.len(), 6);
    }

    #[test]
    fn test_oldest_messages_dropped_first() {
        // 100 chars each = 25 tokens; budget 100 fits 4 messages.
        let messages: Vec<Content> = (0..10).map(|n| message(n, 100)).collect();
        let trimmed = trim_history(&messages, 100);
        assert_eq!(trimmed.len(), 4);
        assert_eq!(trimmed[0].text(), messages[6].text());
        assert_eq!(trimmed[3].text(), messages[9].text());
    }

    #[test]
    fn test_minimum_suffix_survives_tiny_budget() {
        let messages: Vec<Content> = (0..10).map(|n| message(n, 1000)).collect();
        let trimmed = trim_history(&messages, 1);
        assert_eq!(trimmed.len(), 4);
    }

    #[test]
    fn test_history_shorter_than_minimum() {
        let messages: Vec<Content> = (0..2).map(|n| message(n, 1000)).collect();
        let trimmed = trim_history(&messages, 1);
        assert_eq!(trimmed.len(), 2);
    }

    #[test]
    fn test_empty_history() {
        assert!(trim_history(&[], 100).is_empty());
    }
}
