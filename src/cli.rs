use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use std::path::Path;

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::protocol::StartOptions;

/// Runlink - Drive remote script runs and shells over a websocket
#[derive(Parser, Debug)]
#[command(name = "runlink")]
#[command(version)]
#[command(about = "Drive remote script runs and shells over a websocket")]
#[command(long_about = "Runlink connects to a studio server and drives one remote session:
either a script/notebook/flow run whose output is streamed back line by line,
or an interactive shell passed through to the local terminal.

Quick start:
  1. Run 'runlink --init' to generate a config file
  2. Edit .runlink.toml to point 'server' at your studio server
  3. Run 'runlink run flows/main.py' or 'runlink terminal'")]
pub struct Cli {
    /// Path to config file (defaults to .runlink.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Server URL (overrides config file setting)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Initialize a new .runlink.toml config file
    #[arg(long)]
    pub init: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a file on the server and stream its output
    Run(RunArgs),
    /// Open an interactive shell on the server (Ctrl-] to quit)
    #[command(visible_alias = "t")]
    Terminal {
        /// Working directory, relative to the server's workspace root
        #[arg(long, default_value = "")]
        cwd: String,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path of the file to run, as the server sees it
    pub path: String,
    /// Argument passed to the program (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// Environment variable as KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,
    /// Working directory of the remote process
    #[arg(long)]
    pub cwd: Option<String>,
    /// Virtual environment to run in
    #[arg(long)]
    pub venv: Option<String>,
    /// Run a module (python -m) instead of the file
    #[arg(long)]
    pub module: Option<String>,
    /// Start a fresh kernel for notebook runs
    #[arg(long)]
    pub fresh_kernel: bool,
    /// Give up after this many seconds
    #[arg(long = "timeout")]
    pub timeout_sec: Option<u64>,
}

impl RunArgs {
    /// Start options from the command line, filled in from `defaults`
    pub fn start_options(&self, defaults: &StartOptions) -> StartOptions {
        StartOptions {
            args: self.args.clone(),
            env: self.env.iter().cloned().collect(),
            cwd: self.cwd.clone(),
            venv: self.venv.clone(),
            module: self.module.clone(),
            fresh_kernel: self.fresh_kernel,
            timeout_sec: self.timeout_sec,
        }
        .or_defaults(defaults)
    }
}

pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Write a default config file unless one already exists
pub fn init_config(config_path: &str, server: Option<&str>) -> anyhow::Result<()> {
    if Path::new(config_path).exists() {
        println!("Config file '{}' already exists.", config_path);
        return Ok(());
    }

    let mut config = Config::default();
    if let Some(server) = server {
        config.server = server.to_string();
    }
    config
        .validate()
        .with_context(|| format!("Refusing to write invalid config to '{}'", config_path))?;
    config
        .save(config_path)
        .with_context(|| format!("Failed to write config to '{}'", config_path))?;

    // Commented-out start defaults, for discoverability
    use std::fs::OpenOptions;
    use std::io::Write;
    let mut file = OpenOptions::new()
        .append(true)
        .open(config_path)
        .with_context(|| format!("Failed to append to '{}'", config_path))?;
    writeln!(file, "\n# Start options applied to every run, under [default_start]")?;
    writeln!(file, "# venv = \".venv\"")?;
    writeln!(file, "# timeoutSec = 300")?;

    println!("Created {} for server {}", config_path, config.server);
    println!("\nNext steps:");
    println!("  1. Edit {} if the server runs elsewhere", config_path);
    println!("  2. Run 'runlink run <path>' or 'runlink terminal'");
    Ok(())
}

/// Load and validate the config, applying command line overrides
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(server) = &cli.server {
        config.server = server.clone();
    }
    config
        .validate()
        .map_err(|err| anyhow!("Invalid configuration in '{}': {:#}", cli.config, err))?;
    Ok(config)
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
