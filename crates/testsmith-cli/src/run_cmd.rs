//! `testsmith run` command: generate and execute tests for source snippets.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};

use testsmith_core::{
    AdapterRegistry, AnthropicEngine, CsharpAdapter, CsharpConfig, JavaAdapter, JavaConfig,
    Language, PipelineExecutor, PipelineInput, PipelineResult, PythonAdapter, PythonConfig,
    SnippetOutcome,
};

use crate::config::{CliOverrides, TestsmithConfig};

/// Exit code when the test runner could not be launched.
const EXIT_INFRASTRUCTURE: u8 = 2;

/// Build a registry holding one adapter per supported language, each with
/// an engine primed for that language.
pub fn build_registry(cfg: &TestsmithConfig) -> Result<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    for language in Language::ALL {
        let engine = AnthropicEngine::new(cfg.engine_config(), language.system_prompt())
            .with_context(|| format!("failed to build {language} engine"))?;
        let engine = Arc::new(engine);
        match language {
            Language::Python => {
                let config = PythonConfig {
                    timeout: cfg.runner_timeout,
                    ..PythonConfig::default()
                };
                registry.register(PythonAdapter::new(engine, config));
            }
            Language::Csharp => {
                let config = CsharpConfig {
                    timeout: cfg.runner_timeout,
                    ..CsharpConfig::default()
                };
                registry.register(CsharpAdapter::new(engine, config));
            }
            Language::Java => {
                let config = JavaConfig {
                    timeout: cfg.runner_timeout,
                    ..JavaConfig::default()
                };
                registry.register(JavaAdapter::new(engine, config));
            }
        }
    }
    Ok(registry)
}

/// Run the pipeline for `files` and print a summary.
///
/// Exit code 0 means every snippet got a test file and the run passed,
/// 2 means the runner could not be launched, 1 covers everything else.
pub async fn run(language: &str, files: &[PathBuf], overrides: &CliOverrides) -> Result<ExitCode> {
    let language: Language = language.parse().map_err(|e: String| anyhow!(e))?;
    let snippets = read_snippets(files)?;

    let cfg = TestsmithConfig::resolve(overrides)?;
    let registry = build_registry(&cfg)?;
    let adapter = registry
        .get(language.as_str())
        .with_context(|| format!("no adapter registered for {language}"))?;

    let mut executor = PipelineExecutor::new(adapter, &cfg.work_dir);
    if let Some(limit) = cfg.max_concurrency {
        executor = executor.with_max_concurrency(limit);
    }

    tracing::info!(
        language = %language,
        snippets = snippets.len(),
        work_dir = %cfg.work_dir.display(),
        model = %cfg.model,
        "starting pipeline"
    );

    let input = match <[String; 1]>::try_from(snippets) {
        Ok([single]) => PipelineInput::Single(single),
        Err(batch) => PipelineInput::Batch(batch),
    };
    let result = executor.execute(input).await?;

    print_summary(&result);

    Ok(if result.all_passed() {
        ExitCode::SUCCESS
    } else if result.is_infrastructure_failure() {
        ExitCode::from(EXIT_INFRASTRUCTURE)
    } else {
        ExitCode::FAILURE
    })
}

/// Read each snippet file; `-` reads standard input.
fn read_snippets(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut snippets = Vec::with_capacity(files.len());
    for path in files {
        let code = if path.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read snippet from stdin")?;
            buf
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read snippet file {}", path.display()))?
        };
        if code.trim().is_empty() {
            bail!("snippet {} is empty", path.display());
        }
        snippets.push(code);
    }
    Ok(snippets)
}

fn print_summary(result: &PipelineResult) {
    let root = &result.project.root;
    println!("Project: {}", root.display());
    for snippet in &result.snippets {
        let app = snippet
            .app_file
            .as_deref()
            .map(|p| relative(p, root))
            .unwrap_or_else(|| "-".to_string());
        match &snippet.outcome {
            SnippetOutcome::TestWritten { path } => {
                println!("  [{}] {app} -> {}", snippet.position, relative(path, root));
            }
            SnippetOutcome::EngineFailed { message } => {
                println!("  [{}] {app}: engine failed: {message}", snippet.position);
            }
            SnippetOutcome::GenerationFailed { message } => {
                println!("  [{}] {app}: no tests generated: {message}", snippet.position);
            }
            SnippetOutcome::WriteFailed { message } => {
                println!("  [{}] {app}: write failed: {message}", snippet.position);
            }
        }
    }
    println!();

    let report = &result.report;
    let s = &report.summary;
    println!("Status: {}", report.status);
    println!(
        "Tests:  {} total, {} passed, {} failed, {} errored, {} skipped",
        s.total, s.passed, s.failed, s.errored, s.skipped
    );
    if let Some(err) = &report.infrastructure_error {
        println!("Runner: {err}");
    }
    println!("Report: {}", result.report_path.display());
    println!("Log:    {}", result.log_path.display());
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
