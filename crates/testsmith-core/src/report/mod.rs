//! Test report model and its XML serialization.
//!
//! A [`TestReport`] is built from one [`RawTestResult`]; its summary is
//! always recomputed from the cases, so the counts written to XML can never
//! disagree with the `<testcase>` entries next to them.

pub mod xml;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::adapter::types::{Language, RawTestResult};

use self::xml::XmlWriter;

/// Runner output is cut to this many bytes in the report.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;
/// Per-case failure messages are cut to this many bytes.
pub const MAX_MESSAGE_BYTES: usize = 1024;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Status of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    Passed,
    Failed,
    /// The test could not run (setup/teardown error).
    Errored,
    Skipped,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "passed",
            CaseStatus::Failed => "failed",
            CaseStatus::Errored => "errored",
            CaseStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test case as reported by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Fully qualified name (pytest node id, dotnet test name).
    pub name: String,
    /// Test file the case came from, when the runner says so.
    pub file: Option<String>,
    pub status: CaseStatus,
    /// Failure or skip reason.
    pub message: Option<String>,
    pub duration_ms: Option<u64>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, status: CaseStatus) -> Self {
        Self {
            name: name.into(),
            file: None,
            status,
            message: None,
            duration_ms: None,
        }
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }
}

/// Tallies per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl ReportSummary {
    pub fn from_cases(cases: &[TestCase]) -> Self {
        let mut summary = Self {
            total: cases.len(),
            ..Self::default()
        };
        for case in cases {
            match case.status {
                CaseStatus::Passed => summary.passed += 1,
                CaseStatus::Failed => summary.failed += 1,
                CaseStatus::Errored => summary.errored += 1,
                CaseStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Runner exited cleanly and no case failed or errored.
    Passed,
    /// The runner ran but something failed.
    Failed,
    /// The runner could not be launched.
    Error,
    /// No test file was written, so the runner was skipped.
    NotRun,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
            RunStatus::NotRun => "not_run",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything written to `test_report.xml`.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub language: Language,
    pub project_path: PathBuf,
    pub generated_at: DateTime<Local>,
    pub status: RunStatus,
    pub return_code: Option<i32>,
    pub duration_ms: u64,
    pub summary: ReportSummary,
    pub cases: Vec<TestCase>,
    pub infrastructure_error: Option<String>,
    pub output: String,
}

impl TestReport {
    /// Build a report from a runner result.
    pub fn from_raw(language: Language, project_path: &Path, raw: &RawTestResult) -> Self {
        let summary = ReportSummary::from_cases(&raw.cases);
        let status = if raw.launch_error.is_some() {
            RunStatus::Error
        } else if raw.not_run {
            RunStatus::NotRun
        } else if raw.timed_out
            || raw.exit_code != Some(0)
            || summary.failed > 0
            || summary.errored > 0
        {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        };

        Self {
            language,
            project_path: project_path.to_path_buf(),
            generated_at: Local::now(),
            status,
            return_code: raw.exit_code,
            duration_ms: raw.duration_ms,
            summary,
            cases: raw.cases.clone(),
            infrastructure_error: raw.launch_error.clone(),
            output: raw.output.clone(),
        }
    }

    /// Serialize to XML (without the `<?xml ...?>` declaration).
    pub fn to_xml(&self) -> Result<String, fmt::Error> {
        let mut w = XmlWriter::new();

        w.open(
            "test_report",
            &[
                ("language", self.language.to_string()),
                ("generated_at", self.generated_at.to_rfc3339()),
            ],
        )?;
        w.text("project_path", &[], &self.project_path.display().to_string())?;
        w.text("status", &[], self.status.as_str())?;
        w.text(
            "return_code",
            &[],
            &self
                .return_code
                .map_or_else(String::new, |code| code.to_string()),
        )?;
        w.text("duration_ms", &[], &self.duration_ms.to_string())?;
        w.empty(
            "summary",
            &[
                ("total", self.summary.total.to_string()),
                ("passed", self.summary.passed.to_string()),
                ("failed", self.summary.failed.to_string()),
                ("errored", self.summary.errored.to_string()),
                ("skipped", self.summary.skipped.to_string()),
            ],
        )?;

        if self.cases.is_empty() {
            w.empty("testcases", &[])?;
        } else {
            w.open("testcases", &[])?;
            for case in &self.cases {
                let mut attrs = vec![("name", case.name.clone())];
                if let Some(file) = &case.file {
                    attrs.push(("file", file.clone()));
                }
                attrs.push(("status", case.status.to_string()));
                if let Some(ms) = case.duration_ms {
                    attrs.push(("duration_ms", ms.to_string()));
                }
                match &case.message {
                    Some(msg) => {
                        w.open("testcase", &attrs)?;
                        w.text("message", &[], &truncate_snippet(msg, MAX_MESSAGE_BYTES))?;
                        w.close("testcase")?;
                    }
                    None => w.empty("testcase", &attrs)?,
                }
            }
            w.close("testcases")?;
        }

        if let Some(err) = &self.infrastructure_error {
            w.text("infrastructure_error", &[], err)?;
        }
        w.text("output", &[], &truncate_snippet(&self.output, MAX_OUTPUT_BYTES))?;
        w.close("test_report")?;

        Ok(w.finish())
    }
}

/// Truncate a string to at most `max_bytes` bytes, appending "..." if
/// truncated.
pub fn truncate_snippet(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_owned();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with(cases: Vec<TestCase>, exit_code: Option<i32>) -> RawTestResult {
        RawTestResult {
            exit_code,
            output: "runner output".into(),
            duration_ms: 42,
            cases,
            ..RawTestResult::default()
        }
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn summary_counts_each_status() {
        let cases = vec![
            TestCase::new("a", CaseStatus::Passed),
            TestCase::new("b", CaseStatus::Passed),
            TestCase::new("c", CaseStatus::Failed),
            TestCase::new("d", CaseStatus::Errored),
            TestCase::new("e", CaseStatus::Skipped),
        ];
        let s = ReportSummary::from_cases(&cases);
        assert_eq!(
            s,
            ReportSummary {
                total: 5,
                passed: 2,
                failed: 1,
                errored: 1,
                skipped: 1
            }
        );
        assert_eq!(s.total, s.passed + s.failed + s.errored + s.skipped);
    }

    #[test]
    fn all_passing_clean_exit_is_passed() {
        let raw = raw_with(vec![TestCase::new("a", CaseStatus::Passed)], Some(0));
        let report = TestReport::from_raw(Language::Python, Path::new("/p"), &raw);
        assert_eq!(report.status, RunStatus::Passed);
    }

    #[test]
    fn nonzero_exit_is_failed_even_without_failing_cases() {
        let raw = raw_with(vec![TestCase::new("a", CaseStatus::Passed)], Some(1));
        let report = TestReport::from_raw(Language::Python, Path::new("/p"), &raw);
        assert_eq!(report.status, RunStatus::Failed);
    }

    #[test]
    fn launch_error_is_error_status() {
        let raw = RawTestResult::launch_failure("no such file: dotnet");
        let report = TestReport::from_raw(Language::Csharp, Path::new("/p"), &raw);
        assert_eq!(report.status, RunStatus::Error);

        let xml = report.to_xml().unwrap();
        assert!(xml.contains("<status>error</status>"));
        assert!(xml.contains("<infrastructure_error>no such file: dotnet</infrastructure_error>"));
        assert!(xml.contains("<return_code></return_code>"));
        assert!(xml.contains("<testcases/>"));
    }

    #[test]
    fn skipped_run_is_not_run_status() {
        let raw = RawTestResult::not_run("no test files were written");
        let report = TestReport::from_raw(Language::Python, Path::new("/p"), &raw);
        assert_eq!(report.status, RunStatus::NotRun);
        assert_eq!(report.summary.total, 0);
        assert!(report.infrastructure_error.is_none());

        let xml = report.to_xml().unwrap();
        assert!(xml.contains("<status>not_run</status>"));
        assert!(xml.contains("<testcases/>"));
    }

    #[test]
    fn xml_summary_matches_case_entries() {
        let raw = raw_with(
            vec![
                TestCase::new("tests/test_main.py::test_add", CaseStatus::Passed)
                    .file("tests/test_main.py")
                    .duration_ms(3),
                TestCase::new("tests/test_main.py::test_div", CaseStatus::Failed)
                    .file("tests/test_main.py")
                    .message("AssertionError: 1 != 2"),
                TestCase::new("tests/test_main.py::test_skip", CaseStatus::Skipped),
            ],
            Some(1),
        );
        let report = TestReport::from_raw(Language::Python, Path::new("/p"), &raw);
        let xml = report.to_xml().unwrap();

        assert!(xml.starts_with("<test_report language=\"python\""));
        assert!(xml.contains(
            "<summary total=\"3\" passed=\"1\" failed=\"1\" errored=\"0\" skipped=\"1\"/>"
        ));
        assert_eq!(count(&xml, "<testcase "), 3);
        assert_eq!(count(&xml, "status=\"passed\""), 1);
        assert_eq!(count(&xml, "status=\"failed\""), 1);
        assert_eq!(count(&xml, "status=\"skipped\""), 1);
        assert!(xml.contains("duration_ms=\"3\""));
        assert!(xml.contains("<message>AssertionError: 1 != 2</message>"));
        assert!(xml.contains("<status>failed</status>"));
        assert!(xml.trim_end().ends_with("</test_report>"));
    }

    #[test]
    fn long_output_is_truncated() {
        let mut raw = raw_with(vec![], Some(0));
        raw.output = "x".repeat(MAX_OUTPUT_BYTES + 100);
        let xml = TestReport::from_raw(Language::Python, Path::new("/p"), &raw)
            .to_xml()
            .unwrap();
        assert!(xml.contains("..."));
        assert!(xml.len() < MAX_OUTPUT_BYTES + 1024);
    }

    #[test]
    fn truncate_short_string_unchanged() {
        assert_eq!(truncate_snippet("hello", 10), "hello");
    }

    #[test]
    fn truncate_long_string_with_ellipsis() {
        assert_eq!(truncate_snippet("abcdefghij", 5), "abcde...");
    }

    #[test]
    fn truncate_respects_char_boundary() {
        assert_eq!(truncate_snippet("ééé", 3), "é...");
    }
}
