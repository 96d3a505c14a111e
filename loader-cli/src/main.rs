use clap::Parser;

mod cli;
mod commands;
mod error;
mod util;

use cli::Cli;
use commands::Commands;
pub use error::AppError;

fn main() {
    env_logger::init();

    let args = Cli::parse();

    let result = match &args.command {
        Commands::Collect(collect) => collect.run(&args.config),
        Commands::Demo(demo) => demo.run(&args.config),
        Commands::Cache { subcommand } => subcommand.run(&args.config),
    };

    if let Err(e) = result {
        log::error!("loader-cli: {:?}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
