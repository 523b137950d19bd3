use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "stratum", about = "Layered configuration for the agent toolset")]
pub struct Cli {
    /// Root for relative file references.
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Label recorded with every resolution.
    #[arg(long, global = true, default_value = "cli")]
    pub context: String,

    /// Field override, highest priority; repeatable.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Structured file used instead of `<workspace>/stratum.toml`.
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,

    #[arg(long, global = true)]
    pub secrets_dir: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Resolve and print configuration with the source of every value.
    Show {
        /// Schema to resolve; all known schemas when omitted.
        schema: Option<String>,
        /// Root file; its references are followed.
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        field: Option<String>,
    },
    /// Print every field of every known schema.
    List,
    /// Write a template configuration file.
    Init {
        schema: String,
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn command_name(&self) -> &'static str {
        match self.command {
            Command::Show { .. } => "show",
            Command::List => "list",
            Command::Init { .. } => "init",
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_owned(), value.to_owned()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, OutputFormat};
    use clap::Parser;

    #[test]
    fn parses_overrides_and_global_flags() {
        let cli = Cli::try_parse_from([
            "stratum",
            "--set",
            "timeout=60",
            "--set",
            "retry.max-attempts=2",
            "show",
            "worker",
            "--output",
            "json",
        ])
        .expect("valid arguments");
        assert_eq!(
            cli.overrides,
            vec![
                ("timeout".to_owned(), "60".to_owned()),
                ("retry.max-attempts".to_owned(), "2".to_owned()),
            ]
        );
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Show { schema: Some(ref name), .. } if name == "worker"));
    }

    #[test]
    fn rejects_malformed_override() {
        assert!(Cli::try_parse_from(["stratum", "--set", "novalue", "list"]).is_err());
    }
}
