//! Mock generator — the one external-collaborator boundary this repo
//! implements directly (§4.5). A deployment may swap in a real model
//! server behind the same signature without touching AE, CR, or TA.

use crate::accounting::{count_input, sample_output, Message};

/// Result of one mock generation.
pub struct GeneratedCompletion {
    pub content: String,
    pub actual_prompt_tokens: u64,
    pub actual_completion_tokens: u64,
}

/// `(model, messages, max_tokens, temperature) -> (content,
/// actual_prompt_tokens, actual_completion_tokens)`. Deterministic given its
/// inputs: `actual_prompt_tokens` reuses `count_input` so step 7 of the
/// request handler's protocol is always a no-op, by construction.
pub fn generate(
    model: &str,
    messages: &[Message],
    max_tokens: u64,
    _temperature: f64,
) -> GeneratedCompletion {
    let actual_prompt_tokens = count_input(messages);
    let actual_completion_tokens = sample_output(max_tokens);

    let content = format!(
        "[mock completion from {}: {} token(s) of response]",
        model, actual_completion_tokens
    );

    GeneratedCompletion {
        content,
        actual_prompt_tokens,
        actual_completion_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actual_prompt_tokens_matches_count_input() {
        let messages = vec![Message {
            role: "user".to_string(),
            content: "tell me a short story please".to_string(),
        }];
        let result = generate("mock-model", &messages, 64, 0.7);
        assert_eq!(result.actual_prompt_tokens, count_input(&messages));
    }

    #[test]
    fn actual_completion_tokens_respects_max() {
        let messages = vec![];
        let result = generate("mock-model", &messages, 32, 1.0);
        assert!(result.actual_completion_tokens >= 1);
        assert!(result.actual_completion_tokens <= 32);
    }
}
