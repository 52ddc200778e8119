//! Java adapter: plain `javac` + `java`, no build tool.
//!
//! App classes go to `src/`, generated test classes to `tests/`; both
//! compile into `bin/`. Every test class is a program with a `main` that
//! prints one `PASSED`/`FAILED` line per check.

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use regex::Regex;

use super::extract::extract_code_block;
use super::scaffold::{create_project_root, project_dir_name};
use super::types::{FileSlot, Language, PreparedFile, ProjectLayout, RawTestResult};
use super::{AdapterError, LanguageAdapter};
use crate::engine::LlmEngine;
use crate::report::{CaseStatus, TestCase};
use crate::runner::{CommandOutput, CommandSpec, run_command};

const APP_DIR: &str = "src";
const TESTS_DIR: &str = "tests";
const CLASSES_DIR: &str = "bin";
const PROJECT_PREFIX: &str = "java_";
const FENCE_TAGS: &[&str] = &["java"];

/// Runner settings for [`JavaAdapter`].
///
/// Each command is a program followed by leading arguments; the adapter
/// appends its own (`-d bin ...`, `-cp bin <Class>`).
#[derive(Debug, Clone)]
pub struct JavaConfig {
    pub javac: Vec<String>,
    pub java: Vec<String>,
    /// Applied to every compile and run step.
    pub timeout: Duration,
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            javac: vec!["javac".to_string()],
            java: vec!["java".to_string()],
            timeout: CommandSpec::DEFAULT_TIMEOUT,
        }
    }
}

pub struct JavaAdapter {
    engine: Arc<dyn LlmEngine>,
    config: JavaConfig,
}

impl std::fmt::Debug for JavaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JavaAdapter")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish()
    }
}

impl JavaAdapter {
    pub fn new(engine: Arc<dyn LlmEngine>, config: JavaConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &JavaConfig {
        &self.config
    }

    /// [`LanguageAdapter::init_project`] with an explicit timestamp.
    pub fn init_project_at(
        &self,
        work_dir: &Path,
        timestamp: NaiveDateTime,
    ) -> Result<ProjectLayout, AdapterError> {
        let name = project_dir_name(PROJECT_PREFIX, timestamp);
        let root = create_project_root(work_dir, &name, &[APP_DIR, TESTS_DIR, CLASSES_DIR])?;

        tracing::info!(project = %root.display(), "java project initialized");
        Ok(ProjectLayout {
            app_dir: root.join(APP_DIR),
            tests_dir: root.join(TESTS_DIR),
            root,
        })
    }

    fn command<I>(&self, base: &[String], extra: I) -> Result<CommandSpec, AdapterError>
    where
        I: IntoIterator<Item = String>,
    {
        let (program, leading) = base
            .split_first()
            .ok_or_else(|| AdapterError::Execution("empty java command in config".into()))?;
        Ok(CommandSpec::new(program)
            .args(leading.iter().cloned().chain(extra))
            .timeout(self.config.timeout))
    }

    async fn step(&self, cmd: &CommandSpec, project: &ProjectLayout) -> Result<CommandOutput, AdapterError> {
        tracing::info!(command = %cmd.display(), cwd = %project.root.display(), "running java step");
        run_command(cmd, &project.root)
            .await
            .map_err(|e| AdapterError::Execution(format!("{e:#}")))
    }
}

#[async_trait]
impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn init_project(&self, work_dir: &Path) -> Result<ProjectLayout, AdapterError> {
        self.init_project_at(work_dir, Local::now().naive_local())
    }

    fn prepare_app_code(&self, snippet: &str, slot: FileSlot) -> PreparedFile {
        let code = strip_package(snippet.trim());
        let filename = match (public_class(&code), slot) {
            (Some(class), _) => format!("{class}.java"),
            (None, FileSlot::Single) => "Main.java".to_string(),
            (None, FileSlot::Batch(n)) => format!("Module{n}.java"),
        };
        PreparedFile::new(format!("{code}\n"), filename)
    }

    async fn generate_tests(&self, snippet: &str) -> Result<String, AdapterError> {
        let response = self.engine.send_message(snippet).await?;
        Ok(extract_code_block(&response, FENCE_TAGS)?)
    }

    fn prepare_test_code(&self, test_code: &str, _app: &PreparedFile, slot: FileSlot) -> PreparedFile {
        let code = strip_package(test_code.trim());
        let filename = match (public_class(&code), slot) {
            (Some(class), _) => format!("{class}.java"),
            (None, FileSlot::Single) => "MainTest.java".to_string(),
            (None, FileSlot::Batch(n)) => format!("Module{n}Test.java"),
        };
        PreparedFile::new(format!("{code}\n"), filename)
    }

    async fn execute_tests(&self, project: &ProjectLayout) -> Result<RawTestResult, AdapterError> {
        let sources = java_files(&project.app_dir)?;
        if sources.is_empty() {
            let mut raw = RawTestResult {
                exit_code: Some(1),
                output: "no source files found in src".to_string(),
                ..RawTestResult::default()
            };
            raw.attribute_unparsed_failure("javac");
            return Ok(raw);
        }

        let mut run = RunAccumulator::default();

        let compile = self.command(
            &self.config.javac,
            ["-d".to_string(), CLASSES_DIR.to_string()]
                .into_iter()
                .chain(sources.iter().map(|f| format!("{APP_DIR}/{f}"))),
        )?;
        let compiled = self.step(&compile, project).await?;
        if !run.push_step(&compiled) {
            tracing::warn!(exit_code = ?compiled.exit_code, "javac failed for app sources");
            return Ok(run.finish_with_failure("javac"));
        }

        let tests = java_files(&project.tests_dir)?;
        if tests.is_empty() {
            return Ok(run.finish());
        }

        let compile_tests = self.command(
            &self.config.javac,
            ["-cp", CLASSES_DIR, "-d", CLASSES_DIR]
                .into_iter()
                .map(str::to_string)
                .chain(tests.iter().map(|f| format!("{TESTS_DIR}/{f}"))),
        )?;
        let compiled = self.step(&compile_tests, project).await?;
        if !run.push_step(&compiled) {
            tracing::warn!(exit_code = ?compiled.exit_code, "javac failed for test sources");
            return Ok(run.finish_with_failure("javac tests"));
        }

        for file in &tests {
            let class = file.trim_end_matches(".java");
            let cmd = self.command(
                &self.config.java,
                ["-cp", CLASSES_DIR, class].into_iter().map(str::to_string),
            )?;
            let output = self.step(&cmd, project).await?;
            run.push_class(class, &output);
        }

        let raw = run.finish();
        tracing::info!(
            exit_code = ?raw.exit_code,
            cases = raw.cases.len(),
            duration_ms = raw.duration_ms,
            "java test classes finished"
        );
        Ok(raw)
    }
}

/// Folds compile and run steps into one [`RawTestResult`].
#[derive(Default)]
struct RunAccumulator {
    outputs: Vec<String>,
    duration_ms: u64,
    timed_out: bool,
    failed_exit: Option<Option<i32>>,
    cases: Vec<TestCase>,
}

impl RunAccumulator {
    /// Record one step; returns whether it succeeded.
    fn push_step(&mut self, output: &CommandOutput) -> bool {
        let text = output.combined();
        if !text.trim().is_empty() {
            self.outputs.push(text.trim_end().to_string());
        }
        self.duration_ms += output.duration_ms;
        self.timed_out |= output.timed_out;
        if !output.success() && self.failed_exit.is_none() {
            self.failed_exit = Some(output.exit_code);
        }
        output.success()
    }

    /// Record one test class run, with a synthetic case if it printed none.
    fn push_class(&mut self, class: &str, output: &CommandOutput) {
        self.push_step(output);
        let mut raw = RawTestResult {
            exit_code: output.exit_code,
            output: output.combined(),
            timed_out: output.timed_out,
            cases: parse_java_output(&output.stdout),
            ..RawTestResult::default()
        };
        raw.attribute_unparsed_failure(class);
        self.cases.append(&mut raw.cases);
    }

    fn finish_with_failure(self, step: &str) -> RawTestResult {
        let mut raw = self.finish();
        raw.attribute_unparsed_failure(step);
        raw
    }

    fn finish(self) -> RawTestResult {
        RawTestResult {
            exit_code: self.failed_exit.unwrap_or(Some(0)),
            output: self.outputs.join("\n"),
            duration_ms: self.duration_ms,
            timed_out: self.timed_out,
            cases: self.cases,
            ..RawTestResult::default()
        }
    }
}

/// `*.java` file names directly under `dir`, sorted.
fn java_files(dir: &Path) -> Result<Vec<String>, AdapterError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| AdapterError::Execution(format!("cannot list {}: {e}", dir.display())))?;
    let mut files: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".java"))
        .collect();
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Source fix-ups
// ---------------------------------------------------------------------------

static PUBLIC_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*public\s+(?:(?:final|abstract)\s+)*(?:class|interface|enum|record)\s+([A-Za-z_]\w*)")
        .expect("public class regex is valid")
});

static PACKAGE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*package\s+[\w.]+\s*;[ \t]*\r?\n?").expect("package regex is valid")
});

/// Name of the first top-level public type, which `javac` requires to
/// match the file name.
fn public_class(code: &str) -> Option<&str> {
    PUBLIC_CLASS
        .captures(code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Everything is compiled into the default package so `java -cp bin <Class>`
/// finds it.
fn strip_package(code: &str) -> String {
    PACKAGE_DECL.replace_all(code, "").trim_start().to_string()
}

// ---------------------------------------------------------------------------
// Test class output parsing
// ---------------------------------------------------------------------------

static CASE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(PASSED|FAILED|SKIPPED)\s+(\S+?)(?::\s*(.*))?\s*$").expect("case regex is valid")
});

/// Parse `PASSED Class.method` / `FAILED Class.method: reason` lines.
pub fn parse_java_output(output: &str) -> Vec<TestCase> {
    output
        .lines()
        .filter_map(|line| CASE_LINE.captures(line))
        .map(|caps| {
            let status = match &caps[1] {
                "PASSED" => CaseStatus::Passed,
                "FAILED" => CaseStatus::Failed,
                _ => CaseStatus::Skipped,
            };
            let case = TestCase::new(&caps[2], status);
            match caps.get(3).map(|m| m.as_str().trim()).filter(|m| !m.is_empty()) {
                Some(message) => case.message(message),
                None => case,
            }
        })
        .collect()
}
