use std::path::PathBuf;

use remote_loader::{OwnerResponder, ProviderRegistry, Request};

use crate::util::{load_config, print_offer, OwnerArgs};
use crate::AppError;

#[derive(Clone, Debug, clap::Args)]
#[clap(
    name = "collect",
    about = "Show the offer the owner would send for a unit"
)]
pub struct Collect {
    #[clap(help = "Fully qualified unit name or resource path")]
    unit: String,
    #[clap(flatten)]
    owner: OwnerArgs,
    #[clap(long, action = clap::ArgAction::SetTrue, help = "Print the offer metadata as JSON")]
    json: bool,
}

impl Collect {
    pub fn run(&self, config: &Option<PathBuf>) -> Result<(), AppError> {
        let mut config = load_config(config)?;
        self.owner.apply(&mut config);

        let responder =
            OwnerResponder::from_config(&config, ProviderRegistry::new())?;
        let response = responder.answer(&Request::new(self.unit.clone()));
        let offer = response
            .accepted_offer
            .ok_or_else(|| AppError::NothingToOffer(self.unit.clone()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&offer.metadata())?);
        } else {
            println!(
                "Strategy {}: {} bytes",
                config.strategy.kind,
                offer.total_size()
            );
            print_offer(&offer);
        }
        Ok(())
    }
}
