// Main CLI entry point for Spectra
// Uses clap for argument parsing

use clap::{Arg, ArgAction, ArgMatches, Command};
use spectra::{demo, Console, ConsoleConfig};
use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "spectra.json";

fn cli() -> Command {
    Command::new("spectra")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Jake Abendroth")
        .about("In-process API inspection console for axum applications")
        .after_help("EXAMPLES:\n  spectra serve --bind 127.0.0.1:8080\n  spectra --config spectra.json sync --force\n\nENVIRONMENT:\n  SPECTRA_ENABLED, SPECTRA_ENV, SPECTRA_DESKTOP_ENABLED, SPECTRA_DESKTOP_URL, SPECTRA_DESKTOP_KEY\n  RUST_LOG (default: spectra=info)")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .global(true)
            .num_args(1)
            .help("Path to a JSON config file (default: spectra.json when present)"))
        .subcommand(Command::new("serve")
            .about("Serve the demo application with the console mounted")
            .arg(Arg::new("bind")
                .short('b')
                .long("bind")
                .num_args(1)
                .default_value("127.0.0.1:8080")
                .help("Address to listen on")))
        .subcommand(Command::new("sync")
            .about("Push the route and model snapshot to the desktop tool once")
            .arg(Arg::new("force")
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Push even when the fingerprint is unchanged")))
}

fn load_config(matches: &ArgMatches) -> Result<ConsoleConfig, Box<dyn Error>> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => ConsoleConfig::load(Path::new(path))?,
        None if Path::new(DEFAULT_CONFIG).exists() => ConsoleConfig::load(Path::new(DEFAULT_CONFIG))?,
        None => ConsoleConfig::default(),
    };
    Ok(config.with_env())
}

async fn serve(console: Arc<Console>, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let bind: SocketAddr = matches
        .get_one::<String>("bind")
        .map(String::as_str)
        .unwrap_or("127.0.0.1:8080")
        .parse()?;

    let startup = Arc::clone(&console);
    tokio::spawn(async move {
        match startup.sync().await {
            Ok(outcome) => tracing::info!(%outcome, "startup sync finished"),
            Err(e) => tracing::warn!(error = %e, "startup sync failed"),
        }
    });

    let prefix = console.config().prefix();
    // console routes sit outside the host's own layers, so they get the auth layer here too
    let app = console
        .mount()
        .layer(axum::middleware::from_fn(demo::authenticate));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, %prefix, "serving demo application");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spectra=info")))
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    if !config.is_active() {
        tracing::warn!(environment = %config.environment, "console disabled for this environment");
    }

    let console = Arc::new(Console::new(
        config,
        demo::host(),
        Arc::new(demo::DemoUsers),
        Arc::new(demo::DemoGate),
    )?);

    match matches.subcommand() {
        Some(("serve", sub)) => serve(console, sub).await?,
        Some(("sync", sub)) => {
            let outcome = if sub.get_flag("force") {
                console.force_sync().await?
            } else {
                console.sync().await?
            };
            println!("{}", outcome);
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn global_config_after_subcommand() {
        let matches = cli()
            .try_get_matches_from(["spectra", "sync", "--force", "--config", "alt.json"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("config").map(String::as_str), Some("alt.json"));
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "sync");
        assert!(sub.get_flag("force"));
    }
}
