//! Shared test utilities for testsmith integration tests.
//!
//! - [`ScriptedEngine`]: an [`LlmEngine`] that answers from a script instead
//!   of the network, and records what it was asked.
//! - [`fenced`]: wrap code in a Markdown fence the way a model would.
//! - [`scripted_python_config`]: a [`PythonConfig`] whose "pytest" is a
//!   shell script, for hosts without Python.
//! - [`pytest_available`]: whether the real runner can be used.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use testsmith_core::{EngineError, LlmEngine, PythonConfig};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Return this text.
    Text(String),
    /// Fail as a transport error with this reason.
    NetworkError(String),
    /// Fail as rejected credentials.
    AuthFailed,
}

impl Reply {
    fn produce(&self, provider: &str) -> Result<String, EngineError> {
        match self {
            Reply::Text(text) => Ok(text.clone()),
            Reply::NetworkError(reason) => Err(EngineError::Request {
                provider: provider.to_string(),
                reason: reason.clone(),
            }),
            Reply::AuthFailed => Err(EngineError::AuthFailed {
                provider: provider.to_string(),
            }),
        }
    }
}

/// Engine that picks its reply by matching the user content.
///
/// Rules are checked in insertion order; the first rule whose needle occurs
/// in the content wins, otherwise the fallback is used.
#[derive(Debug)]
pub struct ScriptedEngine {
    rules: Vec<(String, Reply)>,
    fallback: Reply,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub const PROVIDER: &str = "scripted";

    /// Always answer with `reply`.
    pub fn new(reply: Reply) -> Self {
        Self {
            rules: Vec::new(),
            fallback: reply,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(Reply::Text(text.into()))
    }

    /// Answer with `reply` when the content contains `needle`.
    pub fn when(mut self, needle: impl Into<String>, reply: Reply) -> Self {
        self.rules.push((needle.into(), reply));
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Contents received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmEngine for ScriptedEngine {
    fn name(&self) -> &str {
        Self::PROVIDER
    }

    async fn send_message(&self, content: &str) -> Result<String, EngineError> {
        self.calls.lock().unwrap().push(content.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| content.contains(needle.as_str()))
            .map_or(&self.fallback, |(_, reply)| reply);
        reply.produce(Self::PROVIDER)
    }
}

/// `code` inside a fence tagged `lang`, with chatter around it.
pub fn fenced(lang: &str, code: &str) -> String {
    format!("Here are the tests:\n\n```{lang}\n{code}\n```\n\nLet me know if you need more.")
}

/// Fresh scratch directory for a test's work dir.
pub fn work_dir() -> TempDir {
    TempDir::new().expect("failed to create temp dir")
}

/// A [`PythonConfig`] that runs `sh -c <script>` in place of pytest.
pub fn scripted_python_config(script: &str) -> PythonConfig {
    PythonConfig {
        interpreter: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        ..PythonConfig::default()
    }
}

/// Whether `python3 -m pytest` can run on this host.
pub fn pytest_available() -> bool {
    std::process::Command::new("python3")
        .args(["-m", "pytest", "--version"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
