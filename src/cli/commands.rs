//! CLI command definitions using clap.
//!
//! - ask: run one request through the coordinator
//! - registry: list capability domains and their dispatch operations
//! - tools: list catalog operations, optionally for one tag

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// arr-router - route media-service requests to capability-scoped agents
#[derive(Parser, Debug)]
#[command(name = "arr-router")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Service profile, overrides router.service
    #[arg(short, long, global = true)]
    pub service: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask the coordinator a question
    Ask {
        /// Request text
        text: String,

        /// Dependency bag passed to every agent, as JSON
        #[arg(short, long)]
        deps: Option<String>,
    },

    /// List registry entries and their dispatch operations
    Registry,

    /// List catalog operations
    Tools {
        /// Only operations carrying this capability tag
        #[arg(short, long)]
        tag: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["arr-router"]).is_err());
    }

    #[test]
    fn test_cli_parse_ask() {
        let cli = Cli::try_parse_from(["arr-router", "ask", "what is downloading?"]).unwrap();
        match &cli.command {
            Commands::Ask { text, deps } => {
                assert_eq!(text, "what is downloading?");
                assert!(deps.is_none());
            }
            other => panic!("expected ask, got {:?}", other),
        }
        assert!(!cli.is_verbose());
    }

    #[test]
    fn test_cli_parse_ask_with_deps() {
        let cli = Cli::try_parse_from(["arr-router", "ask", "hi", "--deps", r#"{"user":"sam"}"#]).unwrap();
        assert!(matches!(cli.command, Commands::Ask { deps: Some(ref d), .. } if d == r#"{"user":"sam"}"#));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["arr-router", "registry", "--service", "sonarr", "-v", "-c", "x.yml"]).unwrap();
        assert!(matches!(cli.command, Commands::Registry));
        assert_eq!(cli.service.as_deref(), Some("sonarr"));
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
    }

    #[test]
    fn test_cli_parse_tools_tag() {
        let cli = Cli::try_parse_from(["arr-router", "tools", "--tag", "Queue"]).unwrap();
        assert!(matches!(cli.command, Commands::Tools { tag: Some(ref t) } if t == "Queue"));
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
