/// Conversational retrieval QA chain.
///
/// One `run` condenses the question against prior turns (when there are
/// any), retrieves context, asks the chat model and records the turn.
/// Nothing is written to memory unless the model call succeeds.
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{GaleError, Result};
use crate::llm::{CallOptions, ChatMessage, ChatModel};
use crate::memory::ConversationTokenBuffer;
use crate::vectorstore::{Document, Retriever};

const CONDENSE_QUESTION_PROMPT: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:";

const QA_PROMPT: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.

{context}
{chat_history}
Question: {question}
Helpful Answer:";

/// Generation limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub max_tokens: usize,
    pub min_length: usize,
}

impl From<RunOptions> for CallOptions {
    fn from(opts: RunOptions) -> Self {
        Self {
            max_tokens: Some(opts.max_tokens),
            min_length: Some(opts.min_length),
        }
    }
}

pub struct ConversationalRetrievalQa {
    llm: Arc<dyn ChatModel>,
    retriever: Retriever,
    memory: ConversationTokenBuffer,
}

impl ConversationalRetrievalQa {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        retriever: Retriever,
        memory: ConversationTokenBuffer,
    ) -> Self {
        Self {
            llm,
            retriever,
            memory,
        }
    }

    #[must_use]
    pub fn memory(&self) -> &ConversationTokenBuffer {
        &self.memory
    }

    /// Answer `question`, aborting at the next suspension point once
    /// `cancel` fires.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
        question: &str,
        opts: RunOptions,
    ) -> Result<String> {
        let call_opts = CallOptions::from(opts);
        let history = self.memory.buffer_string();

        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            let prompt = CONDENSE_QUESTION_PROMPT
                .replace("{chat_history}", &history)
                .replace("{question}", question);
            let condensed = until_cancelled(
                cancel,
                self.llm.generate(&[ChatMessage::human(prompt)], &call_opts),
            )
            .await?;
            debug!(standalone = %condensed.trim(), "condensed follow-up question");
            condensed.trim().to_string()
        };

        let docs = until_cancelled(cancel, self.retriever.relevant_documents(&standalone)).await?;
        info!(documents = docs.len(), "context retrieved");

        let prompt = build_qa_prompt(&docs, &history, &standalone);
        let answer = until_cancelled(
            cancel,
            self.llm.generate(&[ChatMessage::human(prompt)], &call_opts),
        )
        .await?;

        self.memory.save_context(question, &answer);
        Ok(answer)
    }
}

/// Stuff the retrieved documents and prior turns into the QA prompt.
fn build_qa_prompt(docs: &[Document], history: &str, question: &str) -> String {
    let context = docs
        .iter()
        .map(|d| d.page_content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let history = if history.is_empty() {
        String::new()
    } else {
        format!("\nChat History:\n{history}\n")
    };
    QA_PROMPT
        .replace("{context}", &context)
        .replace("{chat_history}", &history)
        .replace("{question}", question)
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GaleError::Cancelled),
        res = fut => res,
    }
}
