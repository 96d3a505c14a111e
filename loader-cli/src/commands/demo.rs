use std::path::PathBuf;
use std::sync::Arc;

use remote_loader::{
    CodeRegistry, LocalBus, OwnerResponder, ProviderRegistry,
    RequesterResolver,
};

use crate::util::{load_config, OwnerArgs};
use crate::AppError;

#[derive(Clone, Debug, clap::Args)]
#[clap(
    name = "demo",
    about = "Resolve a unit through an owner running in this process"
)]
pub struct Demo {
    #[clap(help = "Fully qualified unit name")]
    unit: String,
    #[clap(flatten)]
    owner: OwnerArgs,
    #[clap(long, help = "Cache folder of the requester")]
    cache: Option<PathBuf>,
    #[clap(long, default_value_t = 2, help = "How many fresh requesters resolve the unit")]
    rounds: usize,
}

impl Demo {
    pub fn run(&self, config: &Option<PathBuf>) -> Result<(), AppError> {
        let mut config = load_config(config)?;
        self.owner.apply(&mut config);
        if let Some(folder) = &self.cache {
            config.cache.folder = folder.clone();
        }

        let bus = LocalBus::new();
        let responder = Arc::new(OwnerResponder::from_config(
            &config,
            ProviderRegistry::new(),
        )?);
        let channel = bus.client(
            config.request_queue.clone(),
            config.response_queue.clone(),
            config.request_timeout(),
        );
        let serving = responder
            .serve(bus.subscribe(&config.request_queue), Arc::new(channel));

        let mut outcome = Ok(());
        for round in 1..=self.rounds {
            let resolver =
                RequesterResolver::connect(&config, &bus, CodeRegistry::new())?;
            match resolver.resolve(&self.unit) {
                Ok(defined) => {
                    println!(
                        "Round {}: {} defined ({} bytes, from {:?})",
                        round,
                        defined.name,
                        defined.bytecode.len(),
                        defined.origin
                    );
                    for archive in resolver.classpath() {
                        println!("\tclasspath += {}", archive.display());
                    }
                    println!("\tused offers: {}", resolver.used_offers().join(", "));
                }
                Err(e) => {
                    println!("Round {}: {}", round, e);
                    outcome = Err(e.into());
                }
            }
            resolver.close()?;
            if outcome.is_err() {
                break;
            }
        }
        serving.stop();
        outcome
    }
}
