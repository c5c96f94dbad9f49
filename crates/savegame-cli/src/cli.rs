use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "savegame", about = "Inspect SaveGame world snapshots", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize a snapshot: map, objects, tombstones, versions
    Inspect(InspectArgs),
    /// Decode a snapshot to JSON
    Export(ExportArgs),
    /// List the custom versions a snapshot was written with
    Versions(VersionsArgs),
    /// Validate a settings file
    CheckConfig(CheckConfigArgs),
}

#[derive(Args)]
pub struct InspectArgs {
    /// Compressed snapshot, as written to the `SaveGame` slot
    pub file: PathBuf,
    /// Also list each object's properties
    #[arg(long)]
    pub properties: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    pub file: PathBuf,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct VersionsArgs {
    pub file: PathBuf,
    /// Settings file used to name the version tags
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_export_with_output() {
        let cli = Cli::try_parse_from([
            "savegame", "--format", "json", "export", "SaveGame.sav", "-o", "out.json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Export(args) => {
                assert_eq!(args.file, PathBuf::from("SaveGame.sav"));
                assert_eq!(args.output, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["savegame", "check-config", "savegame.toml", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(matches!(cli.command, Command::CheckConfig(_)));
    }
}
