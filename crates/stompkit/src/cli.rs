//! Command line arguments.

use std::path::PathBuf;

use anyhow::{bail, Context};
use stompkit_core::ClientConfig;

/// Usage text printed for `--help`.
pub const USAGE: &str = "\
Usage: stompkit [OPTIONS]

Options:
  --config <PATH>   YAML client configuration
  --url <URL>       Broker URL, overrides broker.url
  --sender <NAME>   Name used in chat messages [default: stompkit]
  --restore-handlers
                    Keep application handlers across reconnects
  -h, --help        Print this help";

/// Parsed command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Configuration file
    pub config: Option<PathBuf>,
    /// Broker URL override
    pub url: Option<String>,
    /// Chat sender name
    pub sender: Option<String>,
    /// Force `session.restore_handlers` on
    pub restore_handlers: bool,
    /// `--help` was given
    pub help: bool,
}

impl CliArgs {
    /// Parse arguments, excluding the program name.
    pub fn parse<I, S>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config requires a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--url" => parsed.url = Some(args.next().context("--url requires a value")?),
                "--sender" => {
                    parsed.sender = Some(args.next().context("--sender requires a value")?)
                }
                "--restore-handlers" => parsed.restore_handlers = true,
                "-h" | "--help" => parsed.help = true,
                other => bail!("unknown argument: {other}"),
            }
        }

        Ok(parsed)
    }

    /// Load the configuration file, if any, and apply overrides.
    pub fn load_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => ClientConfig::default(),
        };

        if let Some(url) = &self.url {
            config.broker.url = url.clone();
        }
        if self.restore_handlers {
            config.session.restore_handlers = true;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}
