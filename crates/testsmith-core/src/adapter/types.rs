use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::report::{CaseStatus, TestCase};

/// Target language of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Csharp,
    Java,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::Csharp, Language::Java];

    /// Canonical lowercase name, used as the registry key and in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Csharp => "csharp",
            Language::Java => "java",
        }
    }

    /// Accepted alternative spellings, all lowercase.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py"],
            Language::Csharp => &["cs", "c#"],
            Language::Java => &[],
        }
    }

    /// Fixed system instructions for this language's engine.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Language::Python => super::prompts::PYTHON_UNIT_TEST_GENERATOR,
            Language::Csharp => super::prompts::CSHARP_UNIT_TEST_GENERATOR,
            Language::Java => super::prompts::JAVA_UNIT_TEST_GENERATOR,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|l| l.as_str() == name || l.aliases().contains(&name.as_str()))
            .ok_or_else(|| format!("unsupported language {name:?} (expected python, csharp or java)"))
    }
}

/// Naming position of a snippet within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSlot {
    /// The only snippet of the run; gets the canonical filename.
    Single,
    /// 1-based position within a batch; gets an index-suffixed filename.
    Batch(usize),
}

impl FileSlot {
    /// Slot for the snippet at zero-based `position` in a run of `len`.
    pub fn for_position(position: usize, len: usize) -> Self {
        if len == 1 {
            FileSlot::Single
        } else {
            FileSlot::Batch(position + 1)
        }
    }
}

/// Directory layout of one scaffolded project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    /// Project root (`<work_dir>/<prefix>project_<timestamp>`).
    pub root: PathBuf,
    /// Where app files go.
    pub app_dir: PathBuf,
    /// Where test files go.
    pub tests_dir: PathBuf,
}

impl ProjectLayout {
    pub const REPORT_FILE: &str = "test_report.xml";
    pub const LOG_FILE: &str = "pipeline.log";

    pub fn report_path(&self) -> PathBuf {
        self.root.join(Self::REPORT_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(Self::LOG_FILE)
    }
}

/// File content plus the name it should be written under.
///
/// Adapters compute these; the executor performs the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFile {
    pub code: String,
    pub filename: String,
}

impl PreparedFile {
    pub fn new(code: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            filename: filename.into(),
        }
    }

    /// Filename without its extension.
    pub fn stem(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map_or(self.filename.as_str(), |(stem, _)| stem)
    }
}

/// Outcome of one test-runner invocation, already parsed into cases.
#[derive(Debug, Clone, Default)]
pub struct RawTestResult {
    /// Exit code of the last runner step, `None` if killed or never started.
    pub exit_code: Option<i32>,
    /// Combined runner output.
    pub output: String,
    /// Wall-clock duration of all runner steps.
    pub duration_ms: u64,
    /// Whether a runner step hit its timeout.
    pub timed_out: bool,
    /// Per-case results parsed from the output.
    pub cases: Vec<TestCase>,
    /// Set when the runner could not be launched at all.
    pub launch_error: Option<String>,
    /// The runner was skipped because there was nothing to run.
    pub not_run: bool,
}

impl RawTestResult {
    /// Result for a runner that never started.
    pub fn launch_failure(error: impl Into<String>) -> Self {
        Self {
            launch_error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Result for a run that was skipped; `reason` becomes the output.
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self {
            output: reason.into(),
            not_run: true,
            ..Self::default()
        }
    }

    pub fn is_infrastructure_failure(&self) -> bool {
        self.launch_error.is_some()
    }

    /// Add one failed case named `step` when the runner failed but printed
    /// nothing that parsed as a case (build errors, import crashes, timeouts).
    pub fn attribute_unparsed_failure(&mut self, step: &str) {
        let failed = self.timed_out || self.exit_code != Some(0);
        if !failed || !self.cases.is_empty() {
            return;
        }
        let message = if self.timed_out {
            format!("{step} timed out")
        } else {
            self.output
                .lines()
                .map(str::trim)
                .find(|l| l.to_ascii_lowercase().contains("error"))
                .or_else(|| self.output.lines().map(str::trim).rfind(|l| !l.is_empty()))
                .map_or_else(
                    || format!("{step} exited with {:?}", self.exit_code),
                    str::to_string,
                )
        };
        self.cases
            .push(TestCase::new(step, CaseStatus::Failed).message(message));
    }
}
