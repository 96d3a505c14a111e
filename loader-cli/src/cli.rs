use std::path::PathBuf;

use crate::commands::Commands;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "loader-cli")]
#[clap(about = "Collect, transfer and cache compiled units", long_about = None)]
pub struct Cli {
    #[clap(long, global = true, help = "Loader configuration file (JSON)")]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Commands,
}
