//! Pipeline executor: drives one [`LanguageAdapter`] through a run.
//!
//! ```text
//! execute(input)
//!   init_project ─► pipeline.log
//!   ┌ snippet 1: prepare_app_code ─► write ─► generate_tests ─► prepare_test_code ─► write
//!   ├ snippet 2: ...                                   (concurrent, optionally bounded)
//!   └ snippet N: ...
//!   join ─► execute_tests (once, skipped if nothing was written) ─► generate_report ─► test_report.xml
//! ```
//!
//! A snippet that fails is recorded in its [`SnippetResult`] and the run
//! carries on; only project creation, log/report writes and report
//! serialization abort a run.

pub mod log;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::adapter::{AdapterError, FileSlot, LanguageAdapter, ProjectLayout, RawTestResult};
use crate::report::xml::XML_DECLARATION;
use crate::report::{RunStatus, TestReport};

use self::log::RunLog;

/// Snippets handed to [`PipelineExecutor::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineInput {
    Single(String),
    Batch(Vec<String>),
}

impl PipelineInput {
    pub fn into_snippets(self) -> Vec<String> {
        match self {
            PipelineInput::Single(s) => vec![s],
            PipelineInput::Batch(v) => v,
        }
    }
}

impl From<String> for PipelineInput {
    fn from(s: String) -> Self {
        PipelineInput::Single(s)
    }
}

impl From<&str> for PipelineInput {
    fn from(s: &str) -> Self {
        PipelineInput::Single(s.to_string())
    }
}

impl From<Vec<String>> for PipelineInput {
    fn from(v: Vec<String>) -> Self {
        PipelineInput::Batch(v)
    }
}

/// Per-snippet progress, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Created,
    Initialized,
    AppPrepared,
    TestsGenerated,
    TestsPrepared,
    Written,
    Executed,
    Reported,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::Initialized => "initialized",
            Stage::AppPrepared => "app_prepared",
            Stage::TestsGenerated => "tests_generated",
            Stage::TestsPrepared => "tests_prepared",
            Stage::Written => "written",
            Stage::Executed => "executed",
            Stage::Reported => "reported",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one snippet before the shared test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnippetOutcome {
    /// A test file was written.
    TestWritten { path: PathBuf },
    /// The engine call failed.
    EngineFailed { message: String },
    /// The engine answered without usable test code.
    GenerationFailed { message: String },
    /// The app or test file could not be written.
    WriteFailed { message: String },
}

impl SnippetOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SnippetOutcome::TestWritten { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetResult {
    /// 1-based position in the input.
    pub position: usize,
    pub slot: FileSlot,
    /// App file, when it was written.
    pub app_file: Option<PathBuf>,
    pub outcome: SnippetOutcome,
    /// Furthest stage reached.
    pub last_stage: Stage,
}

/// Outcome of the single test-runner invocation.
#[derive(Debug, Clone)]
pub enum TestRun {
    Completed(RawTestResult),
    /// The runner could not be launched.
    InfrastructureFailure { message: String },
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub project: ProjectLayout,
    pub snippets: Vec<SnippetResult>,
    pub test_run: TestRun,
    pub report: TestReport,
    pub report_path: PathBuf,
    pub log_path: PathBuf,
}

impl PipelineResult {
    /// Test files written during the run, in input order.
    pub fn test_files(&self) -> Vec<&Path> {
        self.snippets
            .iter()
            .filter_map(|s| match &s.outcome {
                SnippetOutcome::TestWritten { path } => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }

    pub fn is_infrastructure_failure(&self) -> bool {
        matches!(self.test_run, TestRun::InfrastructureFailure { .. })
    }

    /// Every snippet produced a test and the run passed.
    pub fn all_passed(&self) -> bool {
        self.snippets.iter().all(|s| s.outcome.is_written())
            && self.report.status == RunStatus::Passed
    }
}

/// Run-level failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no snippets to process")]
    EmptyInput,

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Sequences adapter calls for single and batch input and owns every write.
pub struct PipelineExecutor {
    adapter: Arc<dyn LanguageAdapter>,
    work_dir: PathBuf,
    max_concurrency: Option<usize>,
}

impl fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("language", &self.adapter.language())
            .field("work_dir", &self.work_dir)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl PipelineExecutor {
    pub fn new(adapter: Arc<dyn LanguageAdapter>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            adapter,
            work_dir: work_dir.into(),
            max_concurrency: None,
        }
    }

    /// Bound how many snippets are processed at once (minimum 1).
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run the whole pipeline for `input`.
    pub async fn execute(
        &self,
        input: impl Into<PipelineInput>,
    ) -> Result<PipelineResult, PipelineError> {
        let snippets = input.into().into_snippets();
        if snippets.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let language = self.adapter.language();
        let project = self.adapter.init_project(&self.work_dir)?;
        let log_path = project.log_path();
        let log = RunLog::create(&log_path).map_err(|source| PipelineError::Io {
            path: log_path.clone(),
            source,
        })?;
        log.info(format!(
            "{language} project initialized at {} ({} snippet(s))",
            project.root.display(),
            snippets.len()
        ));

        let semaphore = self.max_concurrency.map(Semaphore::new);
        let len = snippets.len();
        let mut results = join_all(snippets.iter().enumerate().map(|(index, snippet)| {
            self.process_snippet(&project, &log, semaphore.as_ref(), index, len, snippet)
        }))
        .await;

        let written = results.iter().filter(|r| r.outcome.is_written()).count();
        let test_run = if written == 0 {
            log.warn(format!(
                "No test files written for {len} snippet(s); skipping test execution"
            ));
            TestRun::Completed(RawTestResult::not_run("no test files were written"))
        } else {
            log.info(format!(
                "Starting test execution ({written} of {len} test file(s) written)"
            ));
            match self.adapter.execute_tests(&project).await {
                Ok(raw) => {
                    log.info(format!(
                        "Test execution completed with return code {}",
                        raw.exit_code
                            .map_or_else(|| "none".to_string(), |c| c.to_string())
                    ));
                    if raw.timed_out {
                        log.warn("Test runner timed out");
                    }
                    TestRun::Completed(raw)
                }
                Err(AdapterError::Execution(message)) => {
                    log.error(format!("Test runner could not be started: {message}"));
                    TestRun::InfrastructureFailure { message }
                }
                Err(e) => return Err(e.into()),
            }
        };
        advance_written(&mut results, &log, Stage::Executed);

        let launch_failure;
        let raw = match &test_run {
            TestRun::Completed(raw) => raw,
            TestRun::InfrastructureFailure { message } => {
                launch_failure = RawTestResult::launch_failure(message.clone());
                &launch_failure
            }
        };

        let xml = self.adapter.generate_report(&project, raw).inspect_err(|e| {
            log.error(format!("Report generation failed: {e}"));
        })?;
        let report_path = project.report_path();
        tokio::fs::write(&report_path, format!("{XML_DECLARATION}\n{xml}"))
            .await
            .map_err(|source| PipelineError::Io {
                path: report_path.clone(),
                source,
            })?;
        let report = TestReport::from_raw(language, &project.root, raw);
        log.info(format!(
            "Report generated at {} (status {}, {} passed, {} failed, {} errored, {} skipped)",
            report_path.display(),
            report.status,
            report.summary.passed,
            report.summary.failed,
            report.summary.errored,
            report.summary.skipped
        ));
        advance_written(&mut results, &log, Stage::Reported);

        Ok(PipelineResult {
            project,
            snippets: results,
            test_run,
            report,
            report_path,
            log_path,
        })
    }

    /// Write one snippet's app and test files. Errors become the outcome.
    async fn process_snippet(
        &self,
        project: &ProjectLayout,
        log: &RunLog,
        semaphore: Option<&Semaphore>,
        index: usize,
        len: usize,
        snippet: &str,
    ) -> SnippetResult {
        // The semaphore is never closed, so acquire cannot fail.
        let _permit = match semaphore {
            Some(s) => s.acquire().await.ok(),
            None => None,
        };

        let mut tracker = StageTracker::new(log, index + 1);
        let slot = FileSlot::for_position(index, len);
        tracker.advance(Stage::Initialized);

        let app = self.adapter.prepare_app_code(snippet, slot);
        let app_path = project.app_dir.join(&app.filename);
        if let Err(e) = tokio::fs::write(&app_path, &app.code).await {
            let message = format!("failed to write {}: {e}", app_path.display());
            return tracker.fail(slot, None, SnippetOutcome::WriteFailed { message });
        }
        tracker.advance(Stage::AppPrepared);

        let generated = match self.adapter.generate_tests(snippet).await {
            Ok(code) => code,
            Err(AdapterError::Engine(e)) => {
                let outcome = SnippetOutcome::EngineFailed {
                    message: e.to_string(),
                };
                return tracker.fail(slot, Some(app_path), outcome);
            }
            Err(e) => {
                let outcome = SnippetOutcome::GenerationFailed {
                    message: e.to_string(),
                };
                return tracker.fail(slot, Some(app_path), outcome);
            }
        };
        tracker.advance(Stage::TestsGenerated);

        let test = self.adapter.prepare_test_code(&generated, &app, slot);
        tracker.advance(Stage::TestsPrepared);

        let test_path = project.tests_dir.join(&test.filename);
        if let Err(e) = tokio::fs::write(&test_path, &test.code).await {
            let message = format!("failed to write {}: {e}", test_path.display());
            return tracker.fail(slot, Some(app_path), SnippetOutcome::WriteFailed { message });
        }
        tracker.advance(Stage::Written);
        log.info(format!(
            "snippet {}: {} -> {}",
            index + 1,
            app.filename,
            test.filename
        ));

        tracker.finish(
            slot,
            Some(app_path),
            SnippetOutcome::TestWritten { path: test_path },
        )
    }
}

/// Move every snippet that produced a test to `stage`.
fn advance_written(results: &mut [SnippetResult], log: &RunLog, stage: Stage) {
    for result in results.iter_mut().filter(|r| r.outcome.is_written()) {
        result.last_stage = stage;
        log.info(format!("snippet {}: stage {stage}", result.position));
    }
}

/// Logs stage transitions for one snippet.
struct StageTracker<'a> {
    log: &'a RunLog,
    position: usize,
    stage: Stage,
}

impl<'a> StageTracker<'a> {
    fn new(log: &'a RunLog, position: usize) -> Self {
        Self {
            log,
            position,
            stage: Stage::Created,
        }
    }

    fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        self.log
            .info(format!("snippet {}: stage {stage}", self.position));
    }

    fn fail(self, slot: FileSlot, app_file: Option<PathBuf>, outcome: SnippetOutcome) -> SnippetResult {
        let message = match &outcome {
            SnippetOutcome::EngineFailed { message } => format!("engine failed: {message}"),
            SnippetOutcome::GenerationFailed { message } => {
                format!("test generation failed: {message}")
            }
            SnippetOutcome::WriteFailed { message } => message.clone(),
            SnippetOutcome::TestWritten { .. } => String::new(),
        };
        self.log.error(format!(
            "snippet {}: {message} (last stage {})",
            self.position, self.stage
        ));
        self.finish(slot, app_file, outcome)
    }

    fn finish(self, slot: FileSlot, app_file: Option<PathBuf>, outcome: SnippetOutcome) -> SnippetResult {
        SnippetResult {
            position: self.position,
            slot,
            app_file,
            outcome,
            last_stage: self.stage,
        }
    }
}
