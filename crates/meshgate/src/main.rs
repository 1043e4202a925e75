mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use meshgate_core::Session;

use crate::cli::{Cli, Command, CompletionsArgs, GlobalOpts, LogFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_format);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config and completions never touch the network
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),
        Command::Completions(args) => completions(&args),

        // Account lookup only, no gateway session
        Command::Gateways => commands::gateways::handle(&cli.global).await,

        cmd => {
            let session = connect(&cli.global).await?;
            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &session, &cli.global).await;
            session.shutdown().await;
            result
        }
    }
}

async fn connect(global: &GlobalOpts) -> Result<Session, CliError> {
    let config = config::build_session_config(global)?;
    let message = format!("Connecting to gateway {}", config.gateway_id);
    let session = commands::util::with_spinner(message, global, Session::connect(config)).await?;
    Ok(session)
}

fn completions(args: &CompletionsArgs) -> Result<(), CliError> {
    let mut cmd = Cli::command();
    match &args.out {
        Some(path) => {
            let mut file = std::fs::File::create(path)?;
            clap_complete::generate(args.shell, &mut cmd, "meshgate", &mut file);
        }
        None => clap_complete::generate(args.shell, &mut cmd, "meshgate", &mut std::io::stdout()),
    }
    Ok(())
}
