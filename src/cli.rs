use crate::config::{load_config, HostConfig};
use crate::errors::{HostError, HostResult};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI interface for the XML-RPC host
#[derive(Parser, Debug)]
#[command(
    name = "xmlrpc_host",
    version,
    about = "Single-endpoint XML-RPC host exposing the `service` namespace"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve the XML-RPC endpoint (the default)
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Host/IP to bind, overrides the configuration
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overrides the configuration
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the names of all registered methods
    Methods {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Subcommand to run; no subcommand means `serve` with defaults.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve {
            config: None,
            host: None,
            port: None,
        })
    }
}

/// Resolve the effective configuration for a command.
pub fn resolve_config(command: &Commands) -> HostResult<HostConfig> {
    match command {
        Commands::Serve { config, host, port } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(host) = host {
                cfg.host = host.clone();
            }
            if let Some(port) = port {
                cfg.port = *port;
            }
            cfg.validate()?;
            Ok(cfg)
        }
        Commands::Methods { config } => load_config(config.as_deref()),
    }
}

/// Run a command to completion on a fresh multi-threaded runtime.
pub fn dispatch(cli: Cli) -> HostResult<()> {
    let command = cli.command();
    let config = resolve_config(&command)?;
    crate::logging::init(&config.log_filter);
    let registry = crate::build_registry(&config)?;

    match command {
        Commands::Methods { .. } => {
            for method in registry.methods() {
                println!("{}", method.full_name);
            }
            Ok(())
        }
        Commands::Serve { .. } => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| HostError::io("build tokio runtime", e))?;
            rt.block_on(crate::server::start(&config, registry))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["xmlrpc_host"]);
        assert_eq!(
            cli.command(),
            Commands::Serve {
                config: None,
                host: None,
                port: None
            }
        );
    }

    #[test]
    fn flags_override_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.toml");
        let cli = Cli::parse_from([
            "xmlrpc_host",
            "serve",
            "--config",
            missing.to_str().unwrap(),
            "--host",
            "127.0.0.1",
            "--port",
            "7000",
        ]);
        let cfg = resolve_config(&cli.command()).unwrap();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:7000");
    }

    #[test]
    fn zero_port_flag_is_rejected() {
        let cli = Cli::parse_from(["xmlrpc_host", "serve", "--port", "0"]);
        assert!(matches!(
            resolve_config(&cli.command()),
            Err(HostError::Config { .. })
        ));
    }
}
