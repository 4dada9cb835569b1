pub mod chat;
pub mod config;

use clap::{Parser, Subcommand};

use pt_domain::config::Config;

/// psytrainer: practice clinical interviews with simulated patients.
#[derive(Debug, Parser)]
#[command(name = "psytrainer", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Train in the terminal.
    Chat {
        /// Trainee id the sessions and archive are kept under.
        #[arg(long, default_value = "local")]
        user: String,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from `PT_CONFIG` (or `config.toml`). A missing
/// file yields the defaults. Returns the config and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("PT_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = read_config(&config_path)?;
    Ok((config, config_path))
}

fn read_config(path: &str) -> anyhow::Result<Config> {
    if !std::path::Path::new(path).exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = read_config(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 3220);
    }

    #[test]
    fn partial_file_is_merged_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9000\n\n[dialog]\ntyping_cap_ms = 500\n").unwrap();
        let cfg = read_config(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.dialog.typing_cap_ms, 500);
        assert_eq!(cfg.dialog.patient_max_tokens, 200);
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = read_config(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn chat_user_defaults_to_local() {
        let cli = Cli::try_parse_from(["psytrainer", "chat"]).unwrap();
        match cli.command {
            Some(Command::Chat { user }) => assert_eq!(user, "local"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
