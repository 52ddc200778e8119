mod config;
mod run_cmd;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};

use testsmith_core::{EngineConfig, Language};

use config::CliOverrides;

#[derive(Parser)]
#[command(name = "testsmith", about = "Generate and run unit tests for code snippets with an LLM")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a testsmith config file
    Init {
        /// Anthropic API key stored in the config file
        #[arg(long)]
        api_key: Option<String>,
        /// Model identifier
        #[arg(long)]
        model: Option<String>,
        /// Directory where generated projects are created
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Generate tests for one or more snippets and run them
    Run {
        /// Target language (python, csharp, java, or an alias such as py, cs)
        #[arg(short, long, default_value = "python")]
        language: String,
        /// Snippet files; several files form one batch. Use `-` for stdin.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Model identifier (overrides TESTSMITH_MODEL and the config file)
        #[arg(long)]
        model: Option<String>,
        /// Directory where the project is created (overrides TESTSMITH_WORK_DIR)
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Maximum number of snippets sent to the model at once
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_concurrency: Option<u64>,
        /// Test runner timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List supported languages
    Languages,
    /// Print shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Execute the `testsmith init` command: write the config file.
fn cmd_init(
    api_key: Option<String>,
    model: Option<String>,
    work_dir: Option<PathBuf>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let masked = api_key.as_deref().map(mask_key);
    let cfg = config::ConfigFile {
        llm: config::LlmSection {
            api_key,
            model: model.clone(),
            ..config::LlmSection::default()
        },
        pipeline: config::PipelineSection {
            work_dir: work_dir.clone(),
            ..config::PipelineSection::default()
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    match masked {
        Some(key) => println!("  llm.api_key = {key}"),
        None => println!("  llm.api_key not set; export {}", config::API_KEY_ENV),
    }
    println!(
        "  llm.model = {}",
        model.as_deref().unwrap_or(EngineConfig::DEFAULT_MODEL)
    );
    println!(
        "  pipeline.work_dir = {}",
        work_dir
            .unwrap_or_else(|| PathBuf::from(config::DEFAULT_WORK_DIR))
            .display()
    );
    println!();
    println!("Next: run `testsmith run --language python snippet.py`.");

    Ok(())
}

fn cmd_languages() {
    for language in Language::ALL {
        let aliases = match language.aliases() {
            [] => "-".to_string(),
            list => list.join(", "),
        };
        println!("{:<8} aliases: {aliases}", language.as_str());
    }
}

/// Show the first and last four characters of a key.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            api_key,
            model,
            work_dir,
            force,
        } => cmd_init(api_key, model, work_dir, force).map(|()| ExitCode::SUCCESS),
        Commands::Run {
            language,
            files,
            model,
            work_dir,
            max_concurrency,
            timeout,
        } => {
            let overrides = CliOverrides {
                model,
                work_dir,
                max_concurrency: max_concurrency.map(|n| n as usize),
                runner_timeout_secs: timeout,
            };
            run_cmd::run(&language, &files, &overrides).await
        }
        Commands::Languages => {
            cmd_languages();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "testsmith", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_several_files() {
        let cli = Cli::try_parse_from(["testsmith", "run", "-l", "cs", "a.cs", "b.cs"]).unwrap();
        match cli.command {
            Commands::Run {
                language, files, ..
            } => {
                assert_eq!(language, "cs");
                assert_eq!(files, vec![PathBuf::from("a.cs"), PathBuf::from("b.cs")]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_a_file() {
        assert!(Cli::try_parse_from(["testsmith", "run"]).is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let parsed =
            Cli::try_parse_from(["testsmith", "run", "--max-concurrency", "0", "a.py"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn mask_key_hides_the_middle() {
        assert_eq!(mask_key("sk-ant-0123456789abcdef"), "sk-a...cdef");
        assert_eq!(mask_key("short"), "*****");
    }
}
