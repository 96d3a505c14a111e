use std::path::{Path, PathBuf};

use remote_loader::{FileRecord, LoaderConfig, Offer, StrategyKind};

use crate::AppError;

pub const LOADER_CONFIG: &str = "loader.json";

/// Configuration given explicitly, or `loader.json` of the working
/// directory, or the defaults.
pub fn load_config(path: &Option<PathBuf>) -> Result<LoaderConfig, AppError> {
    let found = match path {
        Some(path) => {
            println!("Configuration provided explicitly: {}", path.display());
            Some(path.clone())
        }
        None if Path::new(LOADER_CONFIG).is_file() => {
            println!("Configuration was found automatically: {}", LOADER_CONFIG);
            Some(PathBuf::from(LOADER_CONFIG))
        }
        None => None,
    };
    match found {
        Some(path) => LoaderConfig::from_file(&path)
            .map_err(|e| AppError::ConfigError(e.to_string())),
        None => Ok(LoaderConfig::default()),
    }
}

/// Overrides shared by the commands that run a collection strategy.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct OwnerArgs {
    #[clap(long, help = "Collection strategy (stub, class-based, file-based, dependency-based, complete)")]
    pub strategy: Option<StrategyKind>,
    #[clap(long, help = "Classpath entry of the owner, may be repeated")]
    pub classpath: Vec<PathBuf>,
    #[clap(long, help = "Base directory of dependency marker paths")]
    pub base_dir: Option<PathBuf>,
    #[clap(long, help = "Unit graph manifest")]
    pub graph: Option<PathBuf>,
}

impl OwnerArgs {
    pub fn apply(&self, config: &mut LoaderConfig) {
        if let Some(kind) = self.strategy {
            config.strategy.kind = kind;
        }
        if !self.classpath.is_empty() {
            config.classpath = self.classpath.clone();
        }
        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        if let Some(graph) = &self.graph {
            config.graph = Some(graph.clone());
        }
    }
}

pub fn format_file(file: &FileRecord) -> String {
    format!(
        "{:<14} {:>9} {:>15}  {}",
        file.kind.to_string(),
        file.size,
        file.last_modified,
        file.name
    )
}

pub fn print_offer(offer: &Offer) {
    println!("{}", offer);
    for file in offer.files() {
        println!("\t{}", format_file(file));
    }
    if !offer.units_with_files.is_empty() {
        println!("Units with files: {}", offer.units_with_files.join(", "));
    }
}
