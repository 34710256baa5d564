//! # Gale: retrieval-augmented question answering
//!
//! A small HTTP front end that answers natural-language questions with an
//! OpenAI chat model grounded in documents retrieved from a Pinecone index,
//! plus the tooling to load documents into that index.
//!
//! ## Architecture
//!
//! - **[`config`]**: Environment / `.env` configuration and validation
//! - **[`error`]**: Error taxonomy with stable codes and HTTP mapping
//! - **[`embedder`]**: Text embedding (OpenAI REST, deterministic mock)
//! - **[`tokenizer`]**: Token counting for the memory budget
//! - **[`vectorstore`]**: Pinecone store, documents, top-k retriever
//! - **[`llm`]**: Chat model trait and OpenAI chat completions client
//! - **[`memory`]**: Token-bounded conversation buffer
//! - **[`chain`]**: Conversational retrieval QA chain
//! - **[`splitter`]** / **[`ingest`]**: Chunking and index loading
//! - **[`server`]**: axum routes (`/`, `/static/*`, `/run`)

pub mod chain;
pub mod config;
pub mod embedder;
pub mod error;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod server;
pub mod splitter;
pub mod tokenizer;
pub mod vectorstore;
