mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::serve::ServeArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quarry", version, about = "SQL tools over the Model Context Protocol")]
struct Cli {
    /// Log level (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Standard)]
    logging_format: LogFormat,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Standard,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server over HTTP (default) or stdio.
    Serve(ServeArgs),

    /// Load and validate a configuration file, then print a summary.
    Check {
        /// Configuration file path.
        #[arg(short, long, env = "QUARRY_CONFIG", default_value = "tools.yaml")]
        config: PathBuf,
    },

    /// List the tools of a configuration.
    Tools {
        /// Configuration file path.
        #[arg(short, long, env = "QUARRY_CONFIG", default_value = "tools.yaml")]
        config: PathBuf,

        /// Only list the tools of this toolset.
        #[arg(short, long)]
        toolset: Option<String>,
    },
}

/// Logs always go to stderr; stdout belongs to the stdio transport.
fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Standard => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.logging_format);

    match cli.cmd {
        Command::Serve(args) => commands::serve::run(args).await?,
        Command::Check { config } => commands::check::run(&config)?,
        Command::Tools { config, toolset } => commands::tools::list(&config, toolset.as_deref())?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["quarry", "serve", "--config", "fleet.yaml"]).unwrap();
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.logging_format, LogFormat::Standard);
        match cli.cmd {
            Command::Serve(args) => {
                assert_eq!(args.config, PathBuf::from("fleet.yaml"));
                assert_eq!(args.port, 5000);
                assert!(!args.stdio);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve_stdio_json_logs() {
        let cli = Cli::try_parse_from([
            "quarry",
            "serve",
            "--stdio",
            "--logging-format",
            "json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.logging_format, LogFormat::Json);
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.cmd, Command::Serve(ServeArgs { stdio: true, .. })));
    }

    #[test]
    fn test_parse_tools_with_toolset() {
        let cli =
            Cli::try_parse_from(["quarry", "tools", "-c", "fleet.yaml", "--toolset", "ops"])
                .unwrap();
        assert!(matches!(
            cli.cmd,
            Command::Tools { toolset: Some(ref t), .. } if t == "ops"
        ));
    }

    #[test]
    fn test_rejects_unknown_logging_format() {
        assert!(Cli::try_parse_from(["quarry", "--logging-format", "xml", "check"]).is_err());
    }
}
