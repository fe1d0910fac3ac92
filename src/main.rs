use clap::Parser;
use tracing_subscriber::EnvFilter;

use runlink::cli::{Cli, Commands, init_config, load_config};
use runlink::console;

fn init_tracing(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.init {
        return init_config(&cli.config, cli.server.as_deref());
    }

    let config = load_config(&cli)?;
    init_tracing(&config.log_level);

    match &cli.command {
        Some(Commands::Run(args)) => {
            let code = console::run_script(&config, args).await?;
            std::process::exit(code);
        }
        Some(Commands::Terminal { cwd }) => console::run_terminal(&config, cwd).await,
        None => {
            eprintln!("Nothing to do: use 'runlink run <path>' or 'runlink terminal'.");
            eprintln!("See 'runlink --help' for details.");
            std::process::exit(2);
        }
    }
}
