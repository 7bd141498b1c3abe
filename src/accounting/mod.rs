//! Token Accountant — estimates input tokens before admission and samples
//! output token counts for the mock generator. Both directions share the
//! same tokenizer so pre-admission estimates and post-generation reports
//! always agree (§4.5, §9 Open Question).

/// Fixed per-message overhead, in tokens, approximating role/framing
/// tokens a real chat-format tokenizer would add around each message.
const MESSAGE_OVERHEAD: u64 = 4;

/// One chat message as carried in the OpenAI-shaped request body.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Deterministic whitespace-approximated tokenizer: splits `content` on
/// Unicode whitespace and counts the resulting words. Pure and
/// process-independent, so every node scores identical input identically.
fn count_text(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// `TA.count_input(messages)`: per-message overhead plus tokenized content,
/// summed across the whole conversation.
pub fn count_input(messages: &[Message]) -> u64 {
    messages
        .iter()
        .map(|m| MESSAGE_OVERHEAD + count_text(&m.content))
        .sum()
}

/// `TA.sample_output(max_tokens)`: a deterministic, bounded stand-in for the
/// generator's actual completion length. Always in `[1, max_tokens]`; never
/// calls into randomness that would make two nodes disagree about a
/// reconciled value for the same event.
pub fn sample_output(max_tokens: u64) -> u64 {
    if max_tokens <= 1 {
        return max_tokens.max(1);
    }
    // A fixed fraction rather than a uniform draw: deterministic and cheap,
    // while still usually landing short of the cap so reconcile exercises
    // the shrink path in tests.
    let sampled = (max_tokens * 3) / 4;
    sampled.clamp(1, max_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> Message {
        Message {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn count_input_is_deterministic() {
        let messages = vec![msg("hello there"), msg("how are you today")];
        assert_eq!(count_input(&messages), count_input(&messages));
    }

    #[test]
    fn count_input_sums_overhead_and_words() {
        let messages = vec![msg("one two three")];
        assert_eq!(count_input(&messages), MESSAGE_OVERHEAD + 3);
    }

    #[test]
    fn count_input_empty_messages_is_zero() {
        assert_eq!(count_input(&[]), 0);
    }

    #[test]
    fn sample_output_stays_in_bounds() {
        for max in [1, 2, 16, 100, 4096] {
            let sampled = sample_output(max);
            assert!(sampled >= 1 && sampled <= max, "max={} sampled={}", max, sampled);
        }
    }
}
