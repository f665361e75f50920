use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing summarization activity.
#[derive(Default)]
pub struct SummaryMetrics {
    transcripts_summarized: AtomicU64,
    transcripts_failed: AtomicU64,
    chunks_summarized: AtomicU64,
    completion_calls: AtomicU64,
    retries: AtomicU64,
}

impl SummaryMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished transcript and the number of chunks it was split into.
    pub fn record_transcript(&self, chunk_count: u64) {
        self.transcripts_summarized.fetch_add(1, Ordering::Relaxed);
        self.chunks_summarized
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a transcript whose summary could not be produced.
    pub fn record_failure(&self) {
        self.transcripts_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one outbound completion attempt.
    pub fn record_completion_call(&self) {
        self.completion_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record retries scheduled after transient failures.
    pub fn record_retries(&self, count: u64) {
        self.retries.fetch_add(count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transcripts_summarized: self.transcripts_summarized.load(Ordering::Relaxed),
            transcripts_failed: self.transcripts_failed.load(Ordering::Relaxed),
            chunks_summarized: self.chunks_summarized.load(Ordering::Relaxed),
            completion_calls: self.completion_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of summarization counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Transcripts whose summary was written.
    pub transcripts_summarized: u64,
    /// Transcripts that failed after retries or with a fatal error.
    pub transcripts_failed: u64,
    /// Total chunks produced across summarized transcripts.
    pub chunks_summarized: u64,
    /// Completion attempts sent to the provider, retries included.
    pub completion_calls: u64,
    /// Retries scheduled after transient failures.
    pub retries: u64,
}
