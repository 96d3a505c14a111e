use std::fmt;

use serde::{Deserialize, Serialize};

use data_error::Result;

use crate::offer::Offer;

/// Ask the owner for `unit_name`, proposing offers the requester already
/// holds. Candidates carry metadata only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub unit_name: String,
    pub candidate_offers: Vec<Offer>,
}

impl Request {
    pub fn new(unit_name: impl Into<String>) -> Self {
        Request {
            unit_name: unit_name.into(),
            candidate_offers: Vec::new(),
        }
    }

    pub fn with_candidates(
        unit_name: impl Into<String>,
        candidate_offers: Vec<Offer>,
    ) -> Self {
        Request {
            unit_name: unit_name.into(),
            candidate_offers,
        }
    }

    /// The candidate registered under `name`, if the requester proposed it.
    pub fn offer_by_name(&self, name: &str) -> Option<&Offer> {
        self.candidate_offers
            .iter()
            .find(|offer| offer.name.as_deref() == Some(name))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "REQUEST for {} has {} offers",
            self.unit_name,
            self.candidate_offers.len()
        )
    }
}

/// The owner's answer. `accepted_offer == None` means the owner cannot
/// provide the unit at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub unit_name: String,
    pub accepted_offer: Option<Offer>,
}

impl Response {
    pub fn new(unit_name: impl Into<String>, accepted: Option<Offer>) -> Self {
        Response {
            unit_name: unit_name.into(),
            accepted_offer: accepted,
        }
    }

    /// No offer, or an offer with neither files nor a reusable name.
    pub fn is_empty(&self) -> bool {
        match &self.accepted_offer {
            None => true,
            Some(offer) => !offer.has_files() && !offer.has_name(),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accepted = match &self.accepted_offer {
            None => "NULL OFFER",
            Some(offer) => offer.name.as_deref().unwrap_or("NEW OFFER"),
        };
        write!(f, "RESPONSE for {} accepted offer: {}", self.unit_name, accepted)
    }
}

/// Everything that travels over the message channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message> {
        Ok(bincode::deserialize(bytes)?)
    }
}
