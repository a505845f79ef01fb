use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stagecad", author, version, about, long_about = None)]
pub struct Cli {
    /// JSON settings file (see `stagecad init-config`)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the log file from the settings
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Logs per-entity detail
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Profile dictionary switches shared by every command that imports a scene
#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    /// JSON profile dictionary (type name -> profile path)
    #[arg(long)]
    pub dictionary: Option<PathBuf>,

    /// Replaces bundled profiles with dictionary profiles by type name
    #[arg(long)]
    pub apply_dictionary: bool,

    /// Asks per type name when bundled and dictionary profiles differ
    #[arg(long)]
    pub prompt_conflicts: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Prints the layers, entities and resources of a scene document
    Inspect {
        input: PathBuf,
        #[command(flatten)]
        import: ImportArgs,
    },
    /// Imports a scene document and exports it again with fresh identifiers
    Repack {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        import: ImportArgs,
    },
    /// Saves a scene document as a project snapshot
    Snapshot {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        import: ImportArgs,
    },
    /// Exports a project snapshot as a scene document
    Restore { input: PathBuf, output: PathBuf },
    /// Writes the default settings file
    InitConfig { output: PathBuf },
}
