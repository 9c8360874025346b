use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "forum-pilot")]
#[command(about = "Scheduled sign-in, invite review, reward and TOTP automation for forum sites", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to `forum-pilot.toml`)
    #[arg(short, long, env = "PILOT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler and the HTTP API (default)
    Serve,
    /// Run one plugin once and print its report
    Run {
        /// Plugin id, e.g. `signin`
        plugin: String,
        /// Keep run data in memory instead of the configured database
        #[arg(long)]
        dry: bool,
    },
    /// Print the current TOTP codes
    Totp,
    /// Validate the configuration and exit
    Check,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::parse_from(["forum-pilot"]);
        assert!(matches!(cli.command(), Command::Serve));
    }

    #[test]
    fn run_takes_plugin_and_global_config() {
        let cli = Cli::parse_from(["forum-pilot", "run", "signin", "--dry", "-c", "x.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        match cli.command() {
            Command::Run { plugin, dry } => {
                assert_eq!(plugin, "signin");
                assert!(*dry);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
