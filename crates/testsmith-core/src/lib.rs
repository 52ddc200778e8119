//! Core of testsmith: LLM-driven unit test generation for source snippets.
//!
//! # Architecture
//!
//! ```text
//! PipelineExecutor
//!     |
//!     v
//! Arc<dyn LanguageAdapter> --(generate_tests)--> Arc<dyn LlmEngine>
//!     |
//!     |   init_project(work_dir)        -> ProjectLayout
//!     |   prepare_app_code(snippet)     -> PreparedFile   (written by executor)
//!     |   prepare_test_code(test, app)  -> PreparedFile   (written by executor)
//!     |   execute_tests(project)        -> RawTestResult  (runner subprocess)
//!     |   generate_report(project, raw) -> XML text       (written by executor)
//! ```

pub mod adapter;
pub mod engine;
pub mod pipeline;
pub mod report;
pub mod runner;

pub use adapter::{
    AdapterError, AdapterRegistry, CsharpAdapter, CsharpConfig, FileSlot, JavaAdapter, JavaConfig,
    Language, LanguageAdapter, PreparedFile, ProjectLayout, PythonAdapter, PythonConfig,
    RawTestResult,
};
pub use engine::{AnthropicEngine, EngineConfig, EngineError, LlmEngine};
pub use pipeline::{
    PipelineError, PipelineExecutor, PipelineInput, PipelineResult, SnippetOutcome,
    SnippetResult, Stage, TestRun,
};
pub use report::{CaseStatus, ReportSummary, RunStatus, TestCase, TestReport};
