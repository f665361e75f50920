//! Hierarchical summarization: one completion per chunk, then one merge over the partials.
//!
//! Chunks are summarized strictly in order on the calling task. Each request carries only its own
//! chunk plus a note that it is one segment of a longer transcript, so the model does not assume
//! continuity it cannot see. When more than one partial exists they are joined with
//! [`PARTIAL_SEPARATOR`] and merged into the fixed sections of the [`SummaryStyle`]; a single
//! partial is returned untouched.
//!
//! Retries are not handled here. Wrap the client in [`crate::retry::RetryingClient`].

use thiserror::Error;

use crate::chunking::Document;
use crate::completion::{CompletionClient, CompletionError, CompletionRequest, FatalKind};
use crate::config::SummarizerSettings;

/// Separator placed between partial summaries in the merge request.
pub const PARTIAL_SEPARATOR: &str = "\n\n---\n\n";

const MERGE_GUIDANCE: &str = "Combine duplicates and keep bullets short. Do not invent details.";

/// Errors raised while summarizing a document.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Summarizing one chunk failed.
    #[error("Failed to summarize chunk {index} of {total}: {source}")]
    Chunk {
        /// Zero-based chunk position.
        index: usize,
        /// Number of chunks in the document.
        total: usize,
        /// Provider error.
        #[source]
        source: CompletionError,
    },
    /// Merging the partial summaries failed.
    #[error("Failed to merge {partials} partial summaries: {source}")]
    Reduce {
        /// Number of partials sent to the merge call.
        partials: usize,
        /// Provider error.
        #[source]
        source: CompletionError,
    },
}

impl SummarizeError {
    /// Underlying provider error.
    pub fn completion_error(&self) -> &CompletionError {
        match self {
            Self::Chunk { source, .. } | Self::Reduce { source, .. } => source,
        }
    }
}

/// Prompts and sampling parameters shaping every request.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStyle {
    /// System instructions shared by chunk and merge calls.
    pub system_prompt: String,
    /// Reminder that a chunk is only part of the transcript.
    pub segment_note: String,
    /// What to extract from each chunk.
    pub chunk_instructions: String,
    /// How to merge partial summaries.
    pub merge_instructions: String,
    /// Headings the merged summary must contain, in order.
    pub sections: Vec<String>,
    /// Sampling temperature for every call.
    pub temperature: f32,
    /// Token budget of each chunk summary.
    pub chunk_max_tokens: u32,
    /// Token budget of the merged summary.
    pub merge_max_tokens: u32,
}

impl SummaryStyle {
    /// Meeting-notes style producing Key Points, Decisions and Action Items.
    pub fn meeting() -> Self {
        Self {
            system_prompt: "You summarize meeting notes. Write concise, structured summaries \
                with the sections Key Points, Decisions and Action Items. Use bullets and keep \
                them specific and actionable, including owners and dates when they are stated. \
                Never invent details; when something is missing or unclear, say so briefly."
                .into(),
            segment_note: "Note: this text is one segment of a longer meeting transcript and may \
                refer to parts that are not shown. Summarize it on its own terms and flag \
                incomplete references (such as missing owners or dates) instead of guessing."
                .into(),
            chunk_instructions: "Summarize the transcript below. Extract:\n\
                - Key Points\n\
                - Decisions\n\
                - Action Items (with owners and due dates when mentioned)"
                .into(),
            merge_instructions: "The following partial summaries all come from one long \
                meeting. Merge them into a single concise summary without repetition, using \
                exactly these sections:"
                .into(),
            sections: vec![
                "## Key Points".into(),
                "## Decisions".into(),
                "## Action Items".into(),
            ],
            temperature: 0.2,
            chunk_max_tokens: 900,
            merge_max_tokens: 1200,
        }
    }
}

impl Default for SummaryStyle {
    fn default() -> Self {
        Self::meeting()
    }
}

/// Result of summarizing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOutcome {
    /// Final summary text.
    pub summary: String,
    /// Number of chunks the document was split into.
    pub chunk_count: usize,
    /// Whether a merge call was made.
    pub reduced: bool,
}

/// Chunk, summarize and merge documents through a [`CompletionClient`].
pub struct Summarizer<C> {
    client: C,
    settings: SummarizerSettings,
    style: SummaryStyle,
}

impl<C> Summarizer<C>
where
    C: CompletionClient,
{
    /// Build a summarizer around an already-configured client.
    pub fn new(client: C, settings: SummarizerSettings, style: SummaryStyle) -> Self {
        Self {
            client,
            settings,
            style,
        }
    }

    /// Settings used for chunking.
    pub fn settings(&self) -> &SummarizerSettings {
        &self.settings
    }

    /// Summarize a whole document.
    ///
    /// With chunking disabled the full text goes out in one request. Otherwise every chunk is
    /// summarized in order and the partials are merged unless only one exists.
    pub async fn summarize(&self, text: &str) -> Result<SummaryOutcome, SummarizeError> {
        if !self.settings.use_chunking {
            let prompt = self.whole_text_prompt(text);
            let result = self.call(prompt, self.style.chunk_max_tokens).await;
            let summary = result.map_err(|source| SummarizeError::Chunk {
                index: 0,
                total: 1,
                source,
            })?;
            return Ok(SummaryOutcome {
                summary,
                chunk_count: 1,
                reduced: false,
            });
        }

        let chunks = Document::new(text).chunk(&self.settings.chunking);
        let total = chunks.len();
        tracing::info!(
            chunks = total,
            limit = self.settings.chunking.limit(),
            overlap_ratio = self.settings.chunking.overlap_ratio(),
            "Summarizing document"
        );

        let mut partials = Vec::with_capacity(total);
        for (index, chunk) in chunks.iter().enumerate() {
            tracing::debug!(
                index,
                total,
                start_line = chunk.start_line,
                end_line = chunk.end_line,
                "Summarizing chunk"
            );
            let result = self.summarize_chunk(&chunk.text).await;
            let partial = result.map_err(|source| SummarizeError::Chunk {
                index,
                total,
                source,
            })?;
            partials.push(partial);
        }

        let reduced = partials.len() > 1;
        let result = self.reduce(&partials).await;
        let summary = result.map_err(|source| SummarizeError::Reduce {
            partials: partials.len(),
            source,
        })?;

        Ok(SummaryOutcome {
            summary,
            chunk_count: total,
            reduced,
        })
    }

    /// Summarize one chunk in isolation.
    pub async fn summarize_chunk(&self, chunk_text: &str) -> Result<String, CompletionError> {
        let note = &self.style.segment_note;
        let instructions = &self.style.chunk_instructions;
        let prompt = format!("{note}\n\n{instructions}\n\nTranscript segment:\n{chunk_text}");
        self.call(prompt, self.style.chunk_max_tokens).await
    }

    /// Merge ordered partial summaries into one.
    ///
    /// A single partial is returned verbatim without contacting the provider. An empty slice is
    /// rejected as an invalid request so it never turns into an empty summary.
    pub async fn reduce(&self, partials: &[String]) -> Result<String, CompletionError> {
        match partials {
            [] => Err(CompletionError::fatal(
                FatalKind::InvalidRequest,
                "no partial summaries to merge",
            )),
            [single] => Ok(single.clone()),
            _ => {
                tracing::debug!(partials = partials.len(), "Merging partial summaries");
                let instructions = &self.style.merge_instructions;
                let sections = self.style.sections.join("\n");
                let merged = partials.join(PARTIAL_SEPARATOR);
                let user_content = format!(
                    "{instructions}\n{sections}\n{MERGE_GUIDANCE}\n\nPartial summaries:\n{merged}"
                );
                self.call(user_content, self.style.merge_max_tokens).await
            }
        }
    }

    fn whole_text_prompt(&self, text: &str) -> String {
        format!("{}\n\nTranscript:\n{text}", self.style.chunk_instructions)
    }

    async fn call(
        &self,
        user_content: String,
        max_output_tokens: u32,
    ) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            instructions: self.style.system_prompt.clone(),
            user_content,
            temperature: self.style.temperature,
            max_output_tokens,
        };
        self.client.complete(request).await
    }
}
