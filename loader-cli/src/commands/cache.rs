use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use remote_loader::{CacheKind, CacheStore};

use crate::util::{format_file, load_config};
use crate::AppError;

/// Available commands for the `cache` subcommand
#[derive(Subcommand, Debug)]
pub enum Cache {
    List(List),
    Show(Show),
    Remove(Remove),
}

impl Cache {
    pub fn run(&self, config: &Option<PathBuf>) -> Result<(), AppError> {
        match self {
            Cache::List(list) => list.run(config),
            Cache::Show(show) => show.run(config),
            Cache::Remove(remove) => remove.run(config),
        }
    }
}

/// The shared file store of `folder`, or of the configured folder.
fn open_store(
    config: &Option<PathBuf>,
    folder: &Option<PathBuf>,
) -> Result<Arc<dyn CacheStore>, AppError> {
    let mut cache = load_config(config)?.cache;
    cache.kind = CacheKind::File;
    cache.share = true;
    if let Some(folder) = folder {
        cache.folder = folder.clone();
    }
    if !cache.folder.is_dir() {
        return Err(AppError::ConfigError(format!(
            "{} is not a cache folder",
            cache.folder.display()
        )));
    }
    Ok(cache.open()?)
}

#[derive(Clone, Debug, clap::Args)]
#[clap(name = "list", about = "List the items of a cache folder")]
pub struct List {
    #[clap(long, help = "Cache folder")]
    folder: Option<PathBuf>,
}

impl List {
    pub fn run(&self, config: &Option<PathBuf>) -> Result<(), AppError> {
        let store = open_store(config, &self.folder)?;
        let items = store.items();
        if items.is_empty() {
            println!("The cache is empty.");
        }
        for item in &items {
            if let Some(offer) = store.build_offer_metadata(item) {
                println!(
                    "{}\t{}\t{} file(s)\t{} bytes",
                    item,
                    offer.created_at,
                    offer.files().len(),
                    offer.total_size()
                );
            }
        }
        store.close()?;
        Ok(())
    }
}

#[derive(Clone, Debug, clap::Args)]
#[clap(name = "show", about = "Show the files of a cached item")]
pub struct Show {
    #[clap(help = "Item name")]
    item: String,
    #[clap(long, help = "Cache folder")]
    folder: Option<PathBuf>,
}

impl Show {
    pub fn run(&self, config: &Option<PathBuf>) -> Result<(), AppError> {
        let store = open_store(config, &self.folder)?;
        let shown = match store.build_offer_metadata(&self.item) {
            Some(offer) => {
                println!("{}", offer);
                for file in offer.files() {
                    let location = store
                        .file_location_of(&file.name, &self.item)
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "-".to_owned());
                    println!("\t{}\t{}", format_file(file), location);
                }
                let units = store.units_with_files_of(&self.item);
                if !units.is_empty() {
                    println!("Units with files: {}", units.join(", "));
                }
                Ok(())
            }
            None => Err(AppError::ItemNotFound(self.item.clone())),
        };
        store.close()?;
        shown
    }
}

#[derive(Clone, Debug, clap::Args)]
#[clap(name = "remove", about = "Remove an item from a cache folder")]
pub struct Remove {
    #[clap(help = "Item name")]
    item: String,
    #[clap(long, help = "Cache folder")]
    folder: Option<PathBuf>,
}

impl Remove {
    pub fn run(&self, config: &Option<PathBuf>) -> Result<(), AppError> {
        let store = open_store(config, &self.folder)?;
        let known = store.items().contains(&self.item);
        if known {
            store.remove_offer(&self.item);
            println!("Removed {}", self.item);
        }
        store.close()?;
        if known {
            Ok(())
        } else {
            Err(AppError::ItemNotFound(self.item.clone()))
        }
    }
}
