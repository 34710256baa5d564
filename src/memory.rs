/// Conversation memory bounded by a token budget.
///
/// Messages are kept in arrival order. Whenever the rendered buffer costs
/// more than `max_tokens`, the oldest message is dropped until it fits.
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::llm::ChatMessage;
use crate::tokenizer::TokenCounter;

pub struct ConversationTokenBuffer {
    counter: Arc<dyn TokenCounter>,
    max_tokens: usize,
    messages: VecDeque<ChatMessage>,
}

impl ConversationTokenBuffer {
    #[must_use]
    pub fn new(counter: Arc<dyn TokenCounter>, max_tokens: usize) -> Self {
        Self {
            counter,
            max_tokens,
            messages: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Append one message, evicting from the front as needed.
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        self.prune();
    }

    /// Record a completed turn.
    pub fn save_context(&mut self, input: &str, output: &str) {
        self.messages.push_back(ChatMessage::human(input));
        self.messages.push_back(ChatMessage::ai(output));
        self.prune();
    }

    /// Retained messages, oldest first.
    #[must_use]
    pub fn load_context(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Retained messages rendered as `Human: ...` / `AI: ...` lines.
    #[must_use]
    pub fn buffer_string(&self) -> String {
        render(self.messages.iter())
    }

    /// Token cost of the retained messages.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.counter.count(&self.buffer_string())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn prune(&mut self) {
        let mut evicted = 0usize;
        while !self.messages.is_empty() && self.token_count() > self.max_tokens {
            self.messages.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(
                evicted,
                retained = self.messages.len(),
                "conversation memory pruned"
            );
        }
    }
}

fn render<'a>(messages: impl Iterator<Item = &'a ChatMessage>) -> String {
    messages
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
