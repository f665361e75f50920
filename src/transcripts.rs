//! Directory driver: find transcripts, summarize each one, write `<stem>_summary.txt`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use walkdir::WalkDir;

use crate::batch::{BatchOutcome, run_bounded};
use crate::completion::CompletionClient;
use crate::metrics::SummaryMetrics;
use crate::retry::Retryable;
use crate::summarizer::{SummarizeError, Summarizer};

const TRANSCRIPT_EXTENSION: &str = "txt";
const SUMMARY_SUFFIX: &str = "_summary.txt";

/// Errors raised while processing one transcript file.
#[derive(Debug, Error)]
pub enum TranscriptError {
    /// Reading, writing or listing files failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The summarization pipeline failed.
    #[error(transparent)]
    Summarize(#[from] SummarizeError),
}

impl Retryable for TranscriptError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Io { .. } => false,
            Self::Summarize(error) => error.completion_error().is_transient(),
        }
    }
}

/// Summary written for one transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryFile {
    /// Where the summary was written.
    pub output: PathBuf,
    /// Number of chunks the transcript was split into.
    pub chunk_count: usize,
}

/// Per-transcript result of a directory run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptReport {
    /// Transcript that was processed.
    pub input: PathBuf,
    /// Written summary or failure marker.
    pub outcome: BatchOutcome<SummaryFile>,
}

impl fmt::Display for TranscriptReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            BatchOutcome::Completed(file) => write!(
                f,
                "[OK] {} -> {} ({} chunk(s))",
                self.input.display(),
                file.output.display(),
                file.chunk_count
            ),
            BatchOutcome::Failed { error, .. } => {
                write!(f, "[FAIL] {}: {error}", self.input.display())
            }
        }
    }
}

/// Recursively list `.txt` files under `dir`, sorted by path.
pub fn discover_transcripts(dir: &Path) -> Result<Vec<PathBuf>, TranscriptError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|error| TranscriptError::Io {
            path: error
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf()),
            source: error.into(),
        })?;
        let is_transcript = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|extension| extension.eq_ignore_ascii_case(TRANSCRIPT_EXTENSION));
        if is_transcript {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Output location for the summary of `input`.
pub fn summary_path(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcript".into());
    output_dir.join(format!("{stem}{SUMMARY_SUFFIX}"))
}

/// Summarize one transcript and write the result next to its siblings in `output_dir`.
pub async fn summarize_file<C>(
    summarizer: &Summarizer<C>,
    input: &Path,
    output_dir: &Path,
) -> Result<SummaryFile, TranscriptError>
where
    C: CompletionClient,
{
    tracing::info!(path = %input.display(), "Summarizing transcript");
    let text = tokio::fs::read_to_string(input)
        .await
        .map_err(|source| TranscriptError::Io {
            path: input.to_path_buf(),
            source,
        })?;

    let outcome = summarizer.summarize(&text).await?;

    let output = summary_path(output_dir, input);
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|source| TranscriptError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;
    tokio::fs::write(&output, outcome.summary.as_bytes())
        .await
        .map_err(|source| TranscriptError::Io {
            path: output.clone(),
            source,
        })?;

    tracing::info!(
        path = %input.display(),
        output = %output.display(),
        chunks = outcome.chunk_count,
        reduced = outcome.reduced,
        "Saved summary"
    );
    Ok(SummaryFile {
        output,
        chunk_count: outcome.chunk_count,
    })
}

/// Summarize every transcript in `inputs` with up to `workers` files in flight.
///
/// Reports come back in input order; a failing file is reported and the rest still run.
pub async fn summarize_all<C>(
    summarizer: Arc<Summarizer<C>>,
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    workers: usize,
    metrics: Arc<SummaryMetrics>,
) -> Vec<TranscriptReport>
where
    C: CompletionClient + 'static,
{
    let output_dir = Arc::new(output_dir);
    let task_metrics = metrics.clone();
    let outcomes = run_bounded(inputs.clone(), workers, move |_, input| {
        let summarizer = summarizer.clone();
        let output_dir = output_dir.clone();
        let metrics = task_metrics.clone();
        async move {
            let result = summarize_file(&summarizer, &input, &output_dir).await;
            match &result {
                Ok(file) => metrics.record_transcript(file.chunk_count as u64),
                Err(_) => metrics.record_failure(),
            }
            result
        }
    })
    .await;

    inputs
        .into_iter()
        .zip(outcomes)
        .map(|(input, outcome)| TranscriptReport { input, outcome })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, CompletionRequest, FatalKind};
    use crate::config::SummarizerSettings;
    use crate::summarizer::SummaryStyle;
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
            if request.user_content.contains("REJECT") {
                return Err(CompletionError::fatal(FatalKind::InvalidRequest, "content filter"));
            }
            let last_line = request.user_content.lines().last().unwrap_or_default();
            Ok(format!("summary of {last_line}"))
        }
    }

    fn summarizer() -> Arc<Summarizer<EchoClient>> {
        Arc::new(Summarizer::new(
            EchoClient,
            SummarizerSettings::new(1_000, 0.15, true).expect("settings"),
            SummaryStyle::meeting(),
        ))
    }

    #[test]
    fn discovers_txt_files_recursively_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("nested")).expect("mkdir");
        std::fs::write(dir.path().join("b.txt"), "b").expect("write");
        std::fs::write(dir.path().join("nested/a.TXT"), "a").expect("write");
        std::fs::write(dir.path().join("notes.md"), "skip").expect("write");

        let found = discover_transcripts(dir.path()).expect("discover");

        assert_eq!(
            found,
            vec![dir.path().join("b.txt"), dir.path().join("nested/a.TXT")]
        );
    }

    #[test]
    fn summary_path_uses_stem() {
        let path = summary_path(Path::new("out"), Path::new("in/standup 2024-05-01.txt"));
        assert_eq!(path, Path::new("out/standup 2024-05-01_summary.txt"));
    }

    #[tokio::test]
    async fn writes_summaries_and_records_failures() {
        let input_dir = tempfile::tempdir().expect("tempdir");
        let output_dir = tempfile::tempdir().expect("tempdir");
        let good = input_dir.path().join("good.txt");
        let bad = input_dir.path().join("bad.txt");
        std::fs::write(&good, "Alice: launch moved to May").expect("write");
        std::fs::write(&bad, "REJECT this transcript").expect("write");
        let missing = input_dir.path().join("missing.txt");

        let metrics = Arc::new(SummaryMetrics::new());
        let reports = summarize_all(
            summarizer(),
            vec![good.clone(), bad.clone(), missing.clone()],
            output_dir.path().join("summaries"),
            2,
            metrics.clone(),
        )
        .await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].input, good);
        let written = reports[0].outcome.completed().expect("good summary");
        assert_eq!(
            std::fs::read_to_string(&written.output).expect("read"),
            "summary of Alice: launch moved to May"
        );
        assert!(reports[0].to_string().starts_with("[OK]"));

        assert!(matches!(
            &reports[1].outcome,
            BatchOutcome::Failed { transient: false, error } if error.contains("content filter")
        ));
        assert!(matches!(&reports[2].outcome, BatchOutcome::Failed { .. }));
        assert!(reports[2].to_string().starts_with("[FAIL]"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.transcripts_summarized, 1);
        assert_eq!(snapshot.transcripts_failed, 2);
    }
}
