mod loader;
mod runner;
mod schema;
mod session;
mod tasks;
mod validator;

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser)]
#[command(name = "shelltest")]
#[command(about = "A declarative acceptance test runner for third-party CLI executables")]
#[command(version)]
struct Cli {
    /// Log verbosity (RUST_LOG overrides this)
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run criteria files against their targets
    Run {
        /// Path to a criteria file, or a directory scanned recursively
        path: PathBuf,
        /// Show the captured output of tasks and the target
        #[arg(short, long)]
        output: bool,
    },
    /// Validate criteria files without running them
    Validate {
        /// Path to a criteria file or directory
        path: PathBuf,
    },
    /// Scaffold a new criteria file
    Init {
        /// Output path for the new criteria file
        #[arg(default_value = "criteria/example.yaml")]
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run { path, output } => {
            let files = match loader::find_criteria_files(&path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Error finding criteria files: {e}");
                    std::process::exit(1);
                }
            };

            if files.is_empty() {
                eprintln!("No criteria files found at: {}", path.display());
                std::process::exit(1);
            }

            let failures = runner::run_batch(&files, output, Path::new("."));

            println!("\n{} file(s) processed, {failures} failure(s)", files.len());
            if failures > 0 {
                std::process::exit(1);
            }
        }
        Command::Validate { path } => {
            let files = match loader::find_criteria_files(&path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Error finding criteria files: {e}");
                    std::process::exit(1);
                }
            };

            if files.is_empty() {
                eprintln!("No criteria files found at: {}", path.display());
                std::process::exit(1);
            }

            let mut errors = 0;
            for file in &files {
                match loader::load_criteria(&file.to_string_lossy()) {
                    Ok(criteria) => {
                        println!("✓ {} ({})", file.display(), criteria.target.execute);
                    }
                    Err(e) => {
                        eprintln!("✗ {}: {e}", file.display());
                        errors += 1;
                    }
                }
            }

            if errors > 0 {
                eprintln!("\n{errors} criteria file(s) failed validation");
                std::process::exit(1);
            }
            println!("\nAll {} criteria file(s) valid", files.len());
        }
        Command::Init { path } => {
            let template = r#"# should_echo:
#   - command: status
#     should_have: "all systems go"

should_have:
  - ready

should_lack:
  - error

target:
  execute: echo ready
  pre_tasks: []
  post_tasks: []
  should_echo_delay: 0
  timeout: 30
"#;
            if path.exists() {
                eprintln!("Error: file already exists: {}", path.display());
                std::process::exit(1);
            }
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
                && let Err(e) = fs::create_dir_all(parent)
            {
                eprintln!("Error creating directory: {e}");
                std::process::exit(1);
            }
            if let Err(e) = fs::write(&path, template) {
                eprintln!("Error writing file: {e}");
                std::process::exit(1);
            }
            println!("Created: {}", path.display());
        }
    }
}
