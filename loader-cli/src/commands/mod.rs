use clap::Subcommand;

pub mod cache;
mod collect;
mod demo;

#[derive(Debug, Subcommand)]
pub enum Commands {
    Collect(collect::Collect),
    Demo(demo::Demo),
    #[command(about = "Inspect a cache folder")]
    Cache {
        #[clap(subcommand)]
        subcommand: cache::Cache,
    },
}
