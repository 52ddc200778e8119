//! Language adapter interface.
//!
//! Every language-specific decision (directory layout, build descriptors,
//! file naming, import rewriting, test runner invocation) lives behind the
//! [`LanguageAdapter`] trait so the pipeline executor stays language-agnostic.
//!
//! # Architecture
//!
//! ```text
//! AdapterRegistry --get("python")--> Arc<dyn LanguageAdapter>
//!     |                                   |
//!     |   init_project(work_dir) ---------+--> ProjectLayout
//!     |   prepare_app_code(snippet, slot) --> PreparedFile
//!     |   generate_tests(snippet) ----------> LlmEngine::send_message
//!     |   prepare_test_code(test, app, slot) -> PreparedFile
//!     |   execute_tests(project) -----------> runner::run_command
//!     |   generate_report(project, raw) ----> report::TestReport::to_xml
//! ```

pub mod csharp;
pub mod extract;
pub mod java;
pub mod prompts;
pub mod python;
pub mod registry;
pub mod scaffold;
pub mod types;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::engine::EngineError;
use crate::report::TestReport;

pub use csharp::{CsharpAdapter, CsharpConfig};
pub use java::{JavaAdapter, JavaConfig};
pub use python::{PythonAdapter, PythonConfig};
pub use registry::AdapterRegistry;
pub use types::{FileSlot, Language, PreparedFile, ProjectLayout, RawTestResult};

/// Failures raised by adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The project directory could not be created, or already existed.
    #[error("failed to initialize project at {}: {reason}", path.display())]
    ProjectInit { path: PathBuf, reason: String },

    /// The LLM engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The engine answered but no test code could be extracted.
    #[error("no test code in model response: {0}")]
    Generation(#[from] extract::ExtractError),

    /// The test runner could not be launched.
    #[error("failed to launch test runner: {0}")]
    Execution(String),

    /// The report could not be serialized.
    #[error("failed to generate report: {0}")]
    Report(String),
}

/// Capability set every supported language implements.
///
/// Object-safe: the executor holds an `Arc<dyn LanguageAdapter>`.
#[async_trait]
pub trait LanguageAdapter: Send + Sync {
    /// The language this adapter targets.
    fn language(&self) -> Language;

    /// Create a fresh, timestamped project under `work_dir`.
    ///
    /// Fails with [`AdapterError::ProjectInit`] if the project root already
    /// exists or cannot be created.
    fn init_project(&self, work_dir: &Path) -> Result<ProjectLayout, AdapterError>;

    /// Turn a raw snippet into a runnable app file.
    fn prepare_app_code(&self, snippet: &str, slot: FileSlot) -> PreparedFile;

    /// Ask the engine for tests covering `snippet` and extract the code.
    async fn generate_tests(&self, snippet: &str) -> Result<String, AdapterError>;

    /// Point generated test code at its app file and name it to match.
    fn prepare_test_code(&self, test_code: &str, app: &PreparedFile, slot: FileSlot)
    -> PreparedFile;

    /// Run the language's test runner over the whole project.
    ///
    /// Failing tests are reported through the returned cases; only a runner
    /// that cannot be started yields [`AdapterError::Execution`].
    async fn execute_tests(&self, project: &ProjectLayout) -> Result<RawTestResult, AdapterError>;

    /// Serialize a run into the XML report document (without declaration).
    fn generate_report(
        &self,
        project: &ProjectLayout,
        result: &RawTestResult,
    ) -> Result<String, AdapterError> {
        TestReport::from_raw(self.language(), &project.root, result)
            .to_xml()
            .map_err(|e| AdapterError::Report(e.to_string()))
    }
}

const _: () = {
    fn _assert_object_safe(_: &dyn LanguageAdapter) {}
};
