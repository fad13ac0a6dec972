//! HAP accessory server - demo accessories and declarative definitions
//! served to HomeKit controllers.

mod definition;
mod demos;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hap_discovery::MdnsAdvertiser;
use hap_server::{ServerBuilder, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use definition::Definition;
use demos::Demo;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "hap-accessory-server", version, about)]
struct Args {
    /// Setup code (XXX-XX-XXX); a random one is generated when omitted
    #[arg(long)]
    pin: Option<String>,

    /// Pairing store file; pairings are forgotten on exit when omitted
    #[arg(long, value_name = "FILE")]
    persist: Option<PathBuf>,

    /// TCP port
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    address: Option<IpAddr>,

    /// Built-in demo accessory
    #[arg(long, value_enum, default_value_t = Demo::Thermostat, conflicts_with = "accessories")]
    demo: Demo,

    /// JSON accessory definitions to serve instead of a demo
    #[arg(long, value_name = "FILE")]
    accessories: Option<PathBuf>,

    /// JSON server configuration; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Skip Bonjour advertisement
    #[arg(long)]
    no_advertise: bool,
}

fn setup_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = &args.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating log file {}", path.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .init();
    Ok(Some(guard))
}

fn server_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(pin) = &args.pin {
        config.setup_code = pin.clone();
    }
    if let Some(path) = &args.persist {
        config.state_path = Some(path.clone());
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(address) = args.address {
        config.bind_address = address;
    }
    if config.category.is_none() && args.accessories.is_none() {
        config.category = Some(args.demo.category());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = setup_logging(&args)?;

    let graph = match &args.accessories {
        Some(path) => Definition::load(path)?.build()?,
        None => args.demo.graph()?,
    };
    let config = server_config(&args)?;
    let setup_code = config.setup_code.clone();

    let mut builder = ServerBuilder::new(config).accessories(graph);
    if !args.no_advertise {
        let advertiser = MdnsAdvertiser::new(Vec::new()).context("starting mDNS responder")?;
        builder = builder.advertiser(Arc::new(advertiser));
    }
    let server = builder.build().await?;

    if server.is_paired() {
        info!("Accessory is already paired");
    } else {
        // Shown once on the console, never logged.
        println!("Setup code: {}", setup_code);
    }

    let simulation = match &args.accessories {
        Some(_) => None,
        None => args.demo.simulate(&server),
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let result = server.run_until(shutdown).await;

    if let Some(simulation) = simulation {
        simulation.abort();
    }
    result.context("accessory server failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "hap-accessory-server",
            "--pin",
            "031-45-154",
            "--port",
            "0",
            "--address",
            "127.0.0.1",
            "--demo",
            "bridge",
        ]);
        let config = server_config(&args).unwrap();
        assert_eq!(config.setup_code, "031-45-154");
        assert_eq!(config.port, 0);
        assert_eq!(config.bind_address, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(config.category, Some(hap_core::Category::Bridge));
    }

    #[test]
    fn demo_and_definitions_conflict() {
        let result = Args::try_parse_from([
            "hap-accessory-server",
            "--demo",
            "bridge",
            "--accessories",
            "lights.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn defaults() {
        let args = Args::parse_from(["hap-accessory-server"]);
        assert_eq!(args.demo, Demo::Thermostat);
        assert!(args.persist.is_none());
        let config = server_config(&args).unwrap();
        assert_eq!(config.port, hap_server::DEFAULT_PORT);
    }
}
