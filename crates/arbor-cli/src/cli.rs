use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: versioned, permission-aware tree store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repeat to raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Repository configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the effective configuration
    Config(ConfigArgs),
    /// Race document creation against permission changes and check the result
    Scenario(ScenarioArgs),
    /// Race threads creating the same names to exercise conflict retry
    Stress(StressArgs),
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Print the configuration as TOML instead of a summary
    #[arg(long)]
    pub toml: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioVariant {
    /// Permission change on the folder receiving the documents
    Folder,
    /// Permission change on level 1, documents created on level 5
    Deep,
    /// Concurrent changes on levels 1 and 2, documents created on level 2
    TwoLevels,
}

#[derive(Args)]
pub struct ScenarioArgs {
    #[arg(long, default_value = "folder")]
    pub variant: ScenarioVariant,
    /// Documents created by the writer thread
    #[arg(short = 'n', long, default_value = "20")]
    pub documents: usize,
}

#[derive(Args)]
pub struct StressArgs {
    #[arg(short, long, default_value = "8")]
    pub threads: usize,
    /// Names every thread tries to create
    #[arg(short, long, default_value = "32")]
    pub names: usize,
}
