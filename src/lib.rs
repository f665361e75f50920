#![deny(missing_docs)]

//! Core library for rustysum, a chunked meeting-transcript summarizer.

/// Bounded worker pool for independent requests.
pub mod batch;
/// Line-bounded chunking with overlap.
pub mod chunking;
/// Completion client abstraction and the Azure OpenAI adapter.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Summarization run counters.
pub mod metrics;
/// Retry and backoff around outbound calls.
pub mod retry;
/// Map-reduce summarization pipeline.
pub mod summarizer;
/// Transcript discovery and summary file output.
pub mod transcripts;
