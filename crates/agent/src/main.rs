use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ra_agent::bootstrap;
use ra_agent::cli::{self, Cli, Command, ConfigCommand};
use ra_domain::config::{Config, ObservabilityConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("relayagent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = cli::load_config()?;
            cli::show(&config)
        }
        Command::Tools { session } => {
            let config = load_for_run()?;
            let session = session.unwrap_or_else(|| config.sessions.default_session.clone());
            let upstream = bootstrap::connect_upstream(&config, cli.offline).await?;
            let gateway = bootstrap::build_gateway(&config, Some(upstream.clone()), &session).await?;

            for tool in gateway.list_tools() {
                println!("{:<24} {}", tool.name, tool.description);
            }
            upstream.close().await?;
            Ok(())
        }
        Command::Call { name, args, session } => {
            let args = cli::parse_tool_args(&args)?;
            let config = load_for_run()?;
            let session = session.unwrap_or_else(|| config.sessions.default_session.clone());
            let upstream = bootstrap::connect_upstream(&config, cli.offline).await?;
            let gateway = bootstrap::build_gateway(&config, Some(upstream.clone()), &session).await?;

            let result = gateway
                .call_tool(&name, args)
                .await
                .with_context(|| format!("calling {name}"))?;
            upstream.close().await?;

            if result.is_error {
                eprintln!("{}", result.text());
                std::process::exit(1);
            }
            println!("{}", result.text());
            Ok(())
        }
    }
}

/// Load config, refuse invalid ones, and install tracing.
fn load_for_run() -> anyhow::Result<Config> {
    let (config, config_path) = cli::load_config()?;
    init_tracing(&config.observability);

    let errors: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|e| e.severity == ra_domain::config::ConfigSeverity::Error)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("invalid config {config_path}:\n{}", errors.join("\n"));
    }
    Ok(config)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));

    if obs.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}
