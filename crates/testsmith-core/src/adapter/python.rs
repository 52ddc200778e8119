//! Python adapter: `app/` package, unittest-style tests run through pytest.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use regex::Regex;

use super::extract::extract_code_block;
use super::scaffold::{create_project_root, project_dir_name, write_scaffold_file};
use super::types::{FileSlot, Language, PreparedFile, ProjectLayout, RawTestResult};
use super::{AdapterError, LanguageAdapter};
use crate::engine::LlmEngine;
use crate::report::{CaseStatus, TestCase};
use crate::runner::{CommandSpec, run_command};

const APP_DIR: &str = "app";
const TESTS_DIR: &str = "tests";
const FENCE_TAGS: &[&str] = &["python", "py"];

/// Module name the generation prompt tells the model to import from.
const PROMPT_MODULE: &str = "main";

/// Runner settings for [`PythonAdapter`].
#[derive(Debug, Clone)]
pub struct PythonConfig {
    /// Interpreter used to launch pytest.
    pub interpreter: String,
    /// Arguments passed to the interpreter.
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            args: [
                "-m",
                "pytest",
                "-q",
                "-rA",
                "--disable-warnings",
                "--durations=0",
                "--continue-on-collection-errors",
                "-p",
                "no:cacheprovider",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            timeout: CommandSpec::DEFAULT_TIMEOUT,
        }
    }
}

pub struct PythonAdapter {
    engine: Arc<dyn LlmEngine>,
    config: PythonConfig,
}

impl std::fmt::Debug for PythonAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonAdapter")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish()
    }
}

impl PythonAdapter {
    pub fn new(engine: Arc<dyn LlmEngine>, config: PythonConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &PythonConfig {
        &self.config
    }

    /// [`LanguageAdapter::init_project`] with an explicit timestamp.
    pub fn init_project_at(
        &self,
        work_dir: &Path,
        timestamp: NaiveDateTime,
    ) -> Result<ProjectLayout, AdapterError> {
        let name = project_dir_name("", timestamp);
        let root = create_project_root(work_dir, &name, &[APP_DIR, TESTS_DIR])?;

        // Both directories must be packages for `from app.x import` to
        // resolve under pytest's rootdir-relative imports.
        write_scaffold_file(&root, "app/__init__.py", "")?;
        write_scaffold_file(&root, "tests/__init__.py", "")?;

        tracing::info!(project = %root.display(), "python project initialized");
        Ok(ProjectLayout {
            app_dir: root.join(APP_DIR),
            tests_dir: root.join(TESTS_DIR),
            root,
        })
    }

    fn runner_command(&self) -> CommandSpec {
        CommandSpec::new(&self.config.interpreter)
            .args(self.config.args.iter().cloned())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .timeout(self.config.timeout)
    }
}

#[async_trait]
impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn init_project(&self, work_dir: &Path) -> Result<ProjectLayout, AdapterError> {
        self.init_project_at(work_dir, Local::now().naive_local())
    }

    fn prepare_app_code(&self, snippet: &str, slot: FileSlot) -> PreparedFile {
        let filename = match slot {
            FileSlot::Single => format!("{PROMPT_MODULE}.py"),
            FileSlot::Batch(n) => format!("module_{n}.py"),
        };
        PreparedFile::new(format!("{}\n", dedent(snippet)), filename)
    }

    async fn generate_tests(&self, snippet: &str) -> Result<String, AdapterError> {
        let response = self.engine.send_message(snippet).await?;
        Ok(extract_code_block(&response, FENCE_TAGS)?)
    }

    fn prepare_test_code(
        &self,
        test_code: &str,
        app: &PreparedFile,
        _slot: FileSlot,
    ) -> PreparedFile {
        let module = app.stem();
        let code = rewrite_imports(test_code, module);
        PreparedFile::new(format!("{}\n", code.trim_end()), format!("test_{module}.py"))
    }

    async fn execute_tests(&self, project: &ProjectLayout) -> Result<RawTestResult, AdapterError> {
        let cmd = self.runner_command();
        tracing::info!(command = %cmd.display(), cwd = %project.root.display(), "running pytest");

        let output = run_command(&cmd, &project.root)
            .await
            .map_err(|e| AdapterError::Execution(format!("{e:#}")))?;

        let text = output.combined();
        let mut raw = RawTestResult {
            exit_code: output.exit_code,
            cases: parse_pytest_output(&text),
            output: text,
            duration_ms: output.duration_ms,
            timed_out: output.timed_out,
            ..RawTestResult::default()
        };
        raw.attribute_unparsed_failure("pytest");

        tracing::info!(
            exit_code = ?raw.exit_code,
            cases = raw.cases.len(),
            duration_ms = raw.duration_ms,
            "pytest finished"
        );
        Ok(raw)
    }
}

/// Drop blank lines at both ends and the leading whitespace shared by every
/// non-blank line.
fn dedent(code: &str) -> String {
    fn is_blank(line: &str) -> bool {
        line.trim().is_empty()
    }

    let lines: Vec<&str> = code.lines().collect();
    let start = lines.iter().position(|l| !is_blank(l)).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !is_blank(l))
        .map_or(start, |i| i + 1);
    let body = &lines[start..end];

    let indent = body
        .iter()
        .copied()
        .filter(|l| !is_blank(l))
        .map(|l| &l[..l.len() - l.trim_start().len()])
        .reduce(common_prefix)
        .unwrap_or("");

    body.iter()
        .copied()
        .map(|l| {
            if is_blank(l) {
                ""
            } else {
                l.strip_prefix(indent).unwrap_or(l)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix<'a>(a: &'a str, b: &'a str) -> &'a str {
    let len = a
        .char_indices()
        .zip(b.chars())
        .take_while(|((_, x), y)| x == y)
        .last()
        .map_or(0, |((i, c), _)| i + c.len_utf8());
    &a[..len]
}

// ---------------------------------------------------------------------------
// Import rewriting
// ---------------------------------------------------------------------------

static FROM_MAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\s*)from\s+main(\s+import\b)").expect("from-import regex is valid")
});

static IMPORT_MAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\s*)import\s+main\b(\s+as\s+(\w+))?").expect("import regex is valid")
});

static MAIN_STRING_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(["'])main\."#).expect("string-ref regex is valid")
});

/// Point references to the prompt's `main` module at `app.<module>`.
///
/// Covers `from main import`, `import main [as x]`, and dotted string
/// targets such as `patch("main.requests")`.
fn rewrite_imports(test_code: &str, module: &str) -> String {
    let code = FROM_MAIN.replace_all(test_code, format!("${{1}}from {APP_DIR}.{module}${{2}}"));
    let code = IMPORT_MAIN.replace_all(&code, |caps: &regex::Captures<'_>| {
        let alias = caps.get(3).map_or(PROMPT_MODULE, |m| m.as_str());
        format!("{}import {APP_DIR}.{module} as {alias}", &caps[1])
    });
    MAIN_STRING_REF
        .replace_all(&code, format!("${{1}}{APP_DIR}.{module}."))
        .into_owned()
}

// ---------------------------------------------------------------------------
// pytest output parsing
// ---------------------------------------------------------------------------

static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)\s+(\S+)(?:\s+-\s+(.*))?$")
        .expect("summary regex is valid")
});

static SKIPPED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^SKIPPED\s+\[(\d+)\]\s+([^:\s]+):(\d+):\s*(.*)$").expect("skip regex is valid")
});

static DURATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+\.\d+)s\s+(call|setup|teardown)\s+(\S+)").expect("duration regex is valid")
});

const SUMMARY_MARKER: &str = "short test summary info";

/// Parse the `-rA` short summary (plus `--durations`) into cases.
///
/// An `ERROR` line without a `::` node id is a collection error for a whole
/// file; it is recorded as a failed case named after that file.
pub fn parse_pytest_output(output: &str) -> Vec<TestCase> {
    let durations = parse_durations(output);

    let summary = output
        .find(SUMMARY_MARKER)
        .map_or(output, |idx| &output[idx + SUMMARY_MARKER.len()..]);

    let mut cases = Vec::new();
    for line in summary.lines().map(str::trim_end) {
        if let Some(caps) = SKIPPED_LINE.captures(line) {
            let count: usize = caps[1].parse().unwrap_or(1);
            let file = &caps[2];
            let name = format!("{file}:{}", &caps[3]);
            for _ in 0..count.max(1) {
                cases.push(
                    TestCase::new(name.clone(), CaseStatus::Skipped)
                        .file(file)
                        .message(&caps[4]),
                );
            }
            continue;
        }

        let Some(caps) = SUMMARY_LINE.captures(line) else {
            continue;
        };
        let node = &caps[2];
        let (file, is_node) = match node.split_once("::") {
            Some((file, _)) => (file, true),
            None => (node, false),
        };
        let status = match &caps[1] {
            "PASSED" | "XPASS" => CaseStatus::Passed,
            "FAILED" => CaseStatus::Failed,
            "ERROR" if is_node => CaseStatus::Errored,
            "ERROR" => CaseStatus::Failed,
            _ => CaseStatus::Skipped,
        };

        let mut case = TestCase::new(node, status).file(file);
        if let Some(msg) = caps.get(3) {
            case = case.message(msg.as_str().trim());
        }
        if let Some(ms) = durations.get(node) {
            case = case.duration_ms(*ms);
        }
        cases.push(case);
    }
    cases
}

/// Sum setup/call/teardown times per node id, in milliseconds.
fn parse_durations(output: &str) -> HashMap<&str, u64> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for line in output.lines() {
        if let Some(caps) = DURATION_LINE.captures(line.trim()) {
            let secs: f64 = caps[1].parse().unwrap_or(0.0);
            let node = caps.get(3).map_or("", |m| m.as_str());
            *totals.entry(node).or_default() += secs;
        }
    }
    totals
        .into_iter()
        .map(|(node, secs)| (node, (secs * 1000.0).round() as u64))
        .collect()
}
