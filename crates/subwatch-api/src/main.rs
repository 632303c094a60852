use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use subwatch_api::config::CONFIG_ENV;
use subwatch_api::{telemetry, LogFormat, Server, ServerConfig};
use subwatch_engine::{http_probes, MonitorStores, OperationRegistry};

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .env(CONFIG_ENV)
        .value_parser(value_parser!(PathBuf))
        .help("Path to the TOML configuration file")
}

fn cli() -> Command {
    Command::new("subwatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Submission monitoring and recovery server")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Run the HTTP server and periodic monitor tasks")
                .long_about(
                    "Run the HTTP server and periodic monitor tasks.\n\n\
                     The standalone server keeps events, snapshots and retries in memory \
                     with an empty submission directory, so every submission lookup answers 404. \
                     Embed subwatch_api::Server to supply a real directory and retryable \
                     operations.",
                )
                .arg(config_arg())
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .value_parser(value_parser!(SocketAddr))
                        .help("Listen address, overriding the config file"),
                )
                .arg(
                    Arg::new("json-logs")
                        .long("json-logs")
                        .action(ArgAction::SetTrue)
                        .help("Emit logs as JSON"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validate the configuration and print the effective settings")
                .arg(config_arg()),
        )
}

fn load_config(args: &ArgMatches) -> anyhow::Result<ServerConfig> {
    let path = args.get_one::<PathBuf>("config");
    let config = ServerConfig::load(path.map(PathBuf::as_path))
        .context("loading configuration")?
        .apply_env();
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn check_config(args: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args)?;
    print!("{}", config.to_toml().context("rendering configuration")?);
    Ok(())
}

async fn serve(args: &ArgMatches) -> anyhow::Result<()> {
    let mut config = load_config(args)?;
    if let Some(bind) = args.get_one::<SocketAddr>("bind") {
        config.bind = *bind;
    }
    if args.get_flag("json-logs") {
        config.log.format = LogFormat::Json;
    }
    telemetry::init_logging(&config.log);

    if config.admin_tokens.is_empty() {
        tracing::warn!("No admin tokens configured; admin routes will refuse every request");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.monitor.health.probe_timeout_ms))
        .build()
        .context("building probe HTTP client")?;
    let probes = http_probes(&config.monitor.health, &client);
    tracing::info!("Configured {} external health probes", probes.len());

    tracing::warn!(
        "Standalone server uses in-memory stores; submissions are only known when embedding via subwatch_api::Server"
    );
    let (stores, _directory) = MonitorStores::in_memory(&config.monitor);
    let bind = config.bind;
    let server = Server::new(config, stores, OperationRegistry::new(), probes);

    let (addr, serving) = server
        .bind(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!("subwatch listening on {}", addr);

    serving.await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("serve", args)) => serve(args).await,
        Some(("check-config", args)) => check_config(args),
        _ => Ok(()),
    }
}
