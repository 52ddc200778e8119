//! C# adapter: `src/App.csproj` + `tests/Tests.csproj`, run through
//! `dotnet restore` and `dotnet test`.

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

const APP_DIR: &str = "src";
const TESTS_DIR: &str = "tests";
const PROJECT_PREFIX: &str = "cs_";
const FENCE_TAGS: &[&str] = &["csharp", "cs", "c#"];

/// Runner and template settings for [`CsharpAdapter`].
#[derive(Debug, Clone)]
pub struct CsharpConfig {
    /// The `dotnet` executable.
    pub program: String,
    /// `<TargetFramework>` written into both project files.
    pub target_framework: String,
    /// Applied to each of `restore` and `test`.
    pub timeout: Duration,
}

impl Default for CsharpConfig {
    fn default() -> Self {
        Self {
            program: "dotnet".to_string(),
            target_framework: "net8.0".to_string(),
            timeout: CommandSpec::DEFAULT_TIMEOUT,
        }
    }
}

pub struct CsharpAdapter {
    engine: Arc<dyn LlmEngine>,
    config: CsharpConfig,
}

impl std::fmt::Debug for CsharpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsharpAdapter")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish()
    }
}

impl CsharpAdapter {
    pub fn new(engine: Arc<dyn LlmEngine>, config: CsharpConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &CsharpConfig {
        &self.config
    }

    /// [`LanguageAdapter::init_project`] with an explicit timestamp.
    pub fn init_project_at(
        &self,
        work_dir: &Path,
        timestamp: NaiveDateTime,
    ) -> Result<ProjectLayout, AdapterError> {
        let name = project_dir_name(PROJECT_PREFIX, timestamp);
        let root = create_project_root(work_dir, &name, &[APP_DIR, TESTS_DIR])?;

        write_scaffold_file(&root, "src/App.csproj", &app_csproj(&self.config))?;
        write_scaffold_file(&root, "tests/Tests.csproj", &tests_csproj(&self.config))?;

        tracing::info!(project = %root.display(), "c# project initialized");
        Ok(ProjectLayout {
            app_dir: root.join(APP_DIR),
            tests_dir: root.join(TESTS_DIR),
            root,
        })
    }

    fn dotnet(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new(&self.config.program)
            .args(args.iter().copied())
            .env("DOTNET_CLI_TELEMETRY_OPTOUT", "1")
            .env("DOTNET_NOLOGO", "1")
            .timeout(self.config.timeout)
    }
}

fn app_csproj(config: &CsharpConfig) -> String {
    format!(
        r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>{tf}</TargetFramework>
    <Nullable>enable</Nullable>
  </PropertyGroup>
</Project>
"#,
        tf = config.target_framework
    )
}

fn tests_csproj(config: &CsharpConfig) -> String {
    format!(
        r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>{tf}</TargetFramework>
    <Nullable>enable</Nullable>
    <IsPackable>false</IsPackable>
    <IsTestProject>true</IsTestProject>
  </PropertyGroup>

  <ItemGroup>
    <PackageReference Include="Microsoft.NET.Test.Sdk" Version="17.6.0" />
    <PackageReference Include="xunit" Version="2.4.2" />
    <PackageReference Include="xunit.runner.visualstudio" Version="2.4.3">
      <IncludeAssets>runtime; build; native; contentfiles; analyzers; buildtransitive</IncludeAssets>
      <PrivateAssets>all</PrivateAssets>
    </PackageReference>
  </ItemGroup>

  <ItemGroup>
    <ProjectReference Include="../src/App.csproj" />
  </ItemGroup>
</Project>
"#,
        tf = config.target_framework
    )
}

#[async_trait]
impl LanguageAdapter for CsharpAdapter {
    fn language(&self) -> Language {
        Language::Csharp
    }

    fn init_project(&self, work_dir: &Path) -> Result<ProjectLayout, AdapterError> {
        self.init_project_at(work_dir, Local::now().naive_local())
    }

    fn prepare_app_code(&self, snippet: &str, slot: FileSlot) -> PreparedFile {
        let filename = match slot {
            FileSlot::Single => "Program.cs".to_string(),
            FileSlot::Batch(n) => format!("Module_{n}.cs"),
        };
        let code = ensure_using(snippet.trim(), "System");
        PreparedFile::new(format!("{code}\n"), filename)
    }

    async fn generate_tests(&self, snippet: &str) -> Result<String, AdapterError> {
        let response = self.engine.send_message(snippet).await?;
        Ok(extract_code_block(&response, FENCE_TAGS)?)
    }

    fn prepare_test_code(&self, test_code: &str, app: &PreparedFile, slot: FileSlot) -> PreparedFile {
        let filename = match slot {
            FileSlot::Single => "UnitTests.cs".to_string(),
            FileSlot::Batch(_) => format!("{}Tests.cs", app.stem()),
        };

        let mut code = test_code.trim().to_string();
        for ns in ["System", "Xunit"] {
            code = ensure_using(&code, ns);
        }
        if let Some(ns) = declared_namespace(&app.code) {
            code = ensure_using(&code, ns);
        }
        PreparedFile::new(format!("{code}\n"), filename)
    }

    async fn execute_tests(&self, project: &ProjectLayout) -> Result<RawTestResult, AdapterError> {
        let restore = self.dotnet(&["restore"]);
        tracing::info!(command = %restore.display(), cwd = %project.tests_dir.display(), "restoring packages");
        let restored = run_command(&restore, &project.tests_dir)
            .await
            .map_err(|e| AdapterError::Execution(format!("{e:#}")))?;

        if !restored.success() {
            tracing::warn!(exit_code = ?restored.exit_code, "dotnet restore failed");
            let mut raw = RawTestResult {
                exit_code: restored.exit_code,
                output: restored.combined(),
                duration_ms: restored.duration_ms,
                timed_out: restored.timed_out,
                cases: Vec::new(),
                ..RawTestResult::default()
            };
            raw.attribute_unparsed_failure("dotnet restore");
            return Ok(raw);
        }

        let test = self.dotnet(&[
            "test",
            "--no-restore",
            "--logger",
            "console;verbosity=normal",
        ]);
        tracing::info!(command = %test.display(), cwd = %project.tests_dir.display(), "running dotnet test");
        let tested = run_command(&test, &project.tests_dir)
            .await
            .map_err(|e| AdapterError::Execution(format!("{e:#}")))?;

        let output = format!("{}\n{}", restored.combined().trim_end(), tested.combined());
        let mut raw = RawTestResult {
            exit_code: tested.exit_code,
            cases: parse_dotnet_output(&tested.combined()),
            output,
            duration_ms: restored.duration_ms + tested.duration_ms,
            timed_out: tested.timed_out,
            ..RawTestResult::default()
        };
        raw.attribute_unparsed_failure("dotnet test");

        tracing::info!(
            exit_code = ?raw.exit_code,
            cases = raw.cases.len(),
            duration_ms = raw.duration_ms,
            "dotnet test finished"
        );
        Ok(raw)
    }
}

// ---------------------------------------------------------------------------
// Source fix-ups
// ---------------------------------------------------------------------------

static NAMESPACE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*namespace\s+([A-Za-z_][\w.]*)").expect("namespace regex is valid")
});

fn declared_namespace(code: &str) -> Option<&str> {
    NAMESPACE_DECL
        .captures(code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn is_using_directive(line: &str) -> bool {
    line.starts_with("using ") && line.ends_with(';') && !line.contains('(')
}

/// Make sure `using <namespace>;` is present.
///
/// Inserted after the leading block of using directives, or prepended when
/// the file has none.
fn ensure_using(code: &str, namespace: &str) -> String {
    let directive = format!("using {namespace};");
    if code.lines().any(|l| l.trim() == directive) {
        return code.to_string();
    }

    let lines: Vec<&str> = code.lines().collect();
    let last_using = lines
        .iter()
        .map(|l| l.trim())
        .take_while(|t| t.is_empty() || t.starts_with("//") || is_using_directive(t))
        .enumerate()
        .filter(|(_, t)| is_using_directive(t))
        .map(|(i, _)| i)
        .last();

    match last_using {
        Some(i) => {
            let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
            out.extend_from_slice(&lines[..=i]);
            out.push(directive.as_str());
            out.extend_from_slice(&lines[i + 1..]);
            out.join("\n")
        }
        None => format!("{directive}\n\n{code}"),
    }
}

// ---------------------------------------------------------------------------
// dotnet test output parsing
// ---------------------------------------------------------------------------

static CASE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(Passed|Failed|Skipped)\s+(.+?)\s+\[([^\]]*)\]\s*$")
        .expect("case regex is valid")
});

/// Parse the console logger's per-test lines.
///
/// A failed case takes its message from the first line after the
/// `Error Message:` header that follows it.
pub fn parse_dotnet_output(output: &str) -> Vec<TestCase> {
    let mut cases: Vec<TestCase> = Vec::new();
    let mut awaiting_message = false;

    for line in output.lines() {
        if let Some(caps) = CASE_LINE.captures(line) {
            let status = match &caps[1] {
                "Passed" => CaseStatus::Passed,
                "Failed" => CaseStatus::Failed,
                _ => CaseStatus::Skipped,
            };
            let mut case = TestCase::new(caps[2].trim(), status);
            if let Some(ms) = parse_duration_ms(&caps[3]) {
                case = case.duration_ms(ms);
            }
            cases.push(case);
            awaiting_message = false;
            continue;
        }

        let trimmed = line.trim();
        if trimmed == "Error Message:" {
            awaiting_message = true;
        } else if awaiting_message && !trimmed.is_empty() {
            if let Some(last) = cases.last_mut().filter(|c| c.message.is_none()) {
                last.message = Some(trimmed.to_string());
            }
            awaiting_message = false;
        }
    }
    cases
}

/// Bracketed duration: `< 1 ms`, `12 ms` or `1.5 s`.
fn parse_duration_ms(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.starts_with('<') {
        return Some(0);
    }
    let (value, unit) = raw.split_once(' ')?;
    let value: f64 = value.trim().parse().ok()?;
    let ms = match unit.trim() {
        "ms" => value,
        "s" => value * 1000.0,
        _ => return None,
    };
    Some(ms.round() as u64)
}
