//! Owner side: answers requests with authoritative offers or patches of
//! offers the requester already holds.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};

use data_error::Result;
use data_offer::{FileRecord, Message, Offer, Request, Response};
use fs_collect::{CollectionStrategy, ProviderRegistry};

use crate::channel::{Envelope, MessageChannel};
use crate::config::LoaderConfig;

pub struct OwnerResponder {
    strategy: Arc<dyn CollectionStrategy>,
}

impl OwnerResponder {
    pub fn new(strategy: Arc<dyn CollectionStrategy>) -> Self {
        OwnerResponder { strategy }
    }

    pub fn from_config(
        config: &LoaderConfig,
        providers: ProviderRegistry,
    ) -> Result<Self> {
        Ok(Self::new(config.build_strategy(providers)?))
    }

    pub fn strategy(&self) -> &Arc<dyn CollectionStrategy> {
        &self.strategy
    }

    /// Compute the response for one request. Never fails: every problem
    /// ends up as a response without an offer.
    pub fn answer(&self, request: &Request) -> Response {
        let unit = request.unit_name.as_str();
        let authoritative = match self.strategy.collect(unit) {
            Ok(Some(offer)) => offer,
            Ok(None) => {
                log::debug!("responder: nothing to offer for {}", unit);
                return Response::new(unit, None);
            }
            Err(err) => {
                log::error!("responder: failed to collect {}: {}", unit, err);
                return Response::new(unit, None);
            }
        };

        let by_name: HashMap<&str, &FileRecord> = authoritative
            .files()
            .iter()
            .map(|file| (file.name.as_str(), file))
            .collect();

        for candidate in &request.candidate_offers {
            if let Some(accepted) =
                self.try_accept(candidate, &authoritative, &by_name)
            {
                log::debug!(
                    "responder: {} reuses offer {}",
                    unit,
                    accepted.name.as_deref().unwrap_or_default()
                );
                return Response::new(unit, Some(accepted));
            }
        }

        let mut fresh = authoritative.metadata();
        fresh.files = Some(
            authoritative
                .files()
                .iter()
                .filter_map(|file| self.loaded(file))
                .collect(),
        );
        log::debug!(
            "responder: sending {} for {} ({} bytes)",
            fresh,
            unit,
            fresh.total_size()
        );
        Response::new(unit, Some(fresh))
    }

    /// The candidate turned into a patch against `authoritative`, or `None`
    /// if it cannot be reused.
    fn try_accept(
        &self,
        candidate: &Offer,
        authoritative: &Offer,
        by_name: &HashMap<&str, &FileRecord>,
    ) -> Option<Offer> {
        let label = candidate.name.as_deref().unwrap_or("NEW OFFER");
        let Some(files) = candidate.files.as_ref().filter(|_| candidate.has_name())
        else {
            log::debug!("responder: candidate {} is not reusable", label);
            return None;
        };

        let mut found = 0;
        let mut patches = Vec::new();
        for file in files {
            let Some(current) = by_name.get(file.name.as_str()) else {
                continue;
            };
            if file.last_modified > current.last_modified {
                log::debug!(
                    "responder: {} of candidate {} is newer than ours, \
                     rejecting the candidate",
                    file.name,
                    label
                );
                return None;
            }
            found += 1;
            if !file.same_version(current) {
                patches.extend(self.loaded(current));
            }
        }
        if found == 0 {
            return None;
        }

        for current in authoritative.files() {
            if !candidate.contains_file(&current.name) {
                patches.extend(self.loaded(current));
            }
        }

        let mut accepted = candidate.metadata();
        accepted.merge_units_with_files(&authoritative.units_with_files);
        accepted.files = if patches.is_empty() {
            None
        } else {
            Some(patches)
        };
        Some(accepted)
    }

    /// `file` with its bytes attached. Files whose bytes cannot be read are
    /// left out of the response.
    fn loaded(&self, file: &FileRecord) -> Option<FileRecord> {
        let mut file = file.clone();
        match self.strategy.load_content(&mut file) {
            Ok(()) => Some(file),
            Err(err) => {
                log::error!(
                    "responder: failed to load content of {}: {}",
                    file.name,
                    err
                );
                None
            }
        }
    }

    /// Decode one incoming message and send the answer to its reply
    /// destination.
    pub fn handle(
        &self,
        envelope: &Envelope,
        channel: &dyn MessageChannel,
    ) -> Result<()> {
        let request = match Message::decode(&envelope.body)? {
            Message::Request(request) => request,
            Message::Response(response) => {
                log::warn!("responder: ignoring stray {}", response);
                return Ok(());
            }
        };
        let Some(reply_to) = envelope.reply_to.as_deref() else {
            log::warn!("responder: {} has no reply destination", request);
            return Ok(());
        };
        log::debug!("responder: {}", request);

        let response = self.answer(&request);
        log::debug!("responder: {}", response);
        channel.respond(
            Message::Response(response).encode()?,
            reply_to,
            envelope.correlation_id,
        )
    }

    /// Handle everything arriving on `incoming` on a background thread,
    /// each message on its own worker thread.
    pub fn serve(
        self: Arc<Self>,
        incoming: Receiver<Envelope>,
        channel: Arc<dyn MessageChannel>,
    ) -> ServeHandle {
        let (shutdown, stop) = bounded::<()>(0);
        let thread = thread::spawn(move || loop {
            select! {
                recv(incoming) -> envelope => {
                    let Ok(envelope) = envelope else {
                        break;
                    };
                    let responder = Arc::clone(&self);
                    let channel = Arc::clone(&channel);
                    thread::spawn(move || {
                        if let Err(err) = responder.handle(&envelope, channel.as_ref()) {
                            log::error!(
                                "responder: failed to answer {}: {}",
                                envelope.correlation_id,
                                err
                            );
                        }
                    });
                }
                recv(stop) -> _ => break,
            }
        });
        ServeHandle {
            shutdown: Some(shutdown),
            thread: Some(thread),
        }
    }
}

/// Keeps a serving responder alive; stops it when dropped.
pub struct ServeHandle {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ServeHandle {
    /// Stop accepting messages. Workers already running finish on their own.
    pub fn stop(mut self) {
        self.shutdown_now();
    }

    fn shutdown_now(&mut self) {
        drop(self.shutdown.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("responder: serving thread panicked");
            }
        }
    }
}

impl Drop for ServeHandle {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{set_modified, write_class};
    use data_offer::ContentKind;
    use fs_collect::{
        Classpath, CollectContext, DependencyMarker, StrategyConfig,
        StrategyKind, UnitGraph, UnitInfo,
    };
    use std::fs;
    use rstest::rstest;
    use std::path::Path;
    use tempdir::TempDir;

    fn responder(root: &Path, graph: UnitGraph, kind: StrategyKind) -> OwnerResponder {
        let context = Arc::new(CollectContext::new(
            Classpath::new(vec![root.join("classes")]),
            graph,
            ProviderRegistry::new(),
            root,
        ));
        let config = StrategyConfig {
            kind,
            cache_capacity: None,
        };
        OwnerResponder::new(config.build(context).unwrap())
    }

    fn names(offer: &Offer) -> Vec<&str> {
        offer.files().iter().map(|file| file.name.as_str()).collect()
    }

    fn with_data_file() -> (TempDir, OwnerResponder) {
        let dir = TempDir::new("remote-loader").unwrap();
        let classes = dir.path().join("classes");
        set_modified(&write_class(&classes, "a.Foo", b"foo"), 1_000);
        fs::write(dir.path().join("data.txt"), b"data").unwrap();
        set_modified(&dir.path().join("data.txt"), 2_000);

        let mut graph = UnitGraph::new();
        graph.insert(
            UnitInfo::new("a.Foo")
                .in_module("app")
                .with_marker(DependencyMarker::Files(vec!["data.txt".into()])),
        );
        let responder = responder(dir.path(), graph, StrategyKind::ClassBased);
        (dir, responder)
    }

    fn cached(response: &Response, name: &str) -> Offer {
        let mut offer = response.accepted_offer.clone().unwrap().metadata();
        offer.name = Some(name.to_owned());
        offer
    }

    #[test]
    fn cold_request_gets_everything_with_content() {
        let (_dir, responder) = with_data_file();
        let response = responder.answer(&Request::new("a.Foo"));

        let offer = response.accepted_offer.unwrap();
        assert!(!offer.has_name());
        assert_eq!(names(&offer), vec!["data.txt", "a.Foo"]);
        assert!(offer.files().iter().all(FileRecord::has_content));
        assert_eq!(offer.units_with_files, vec!["a.Foo"]);
    }

    #[rstest]
    #[case::unchanged(0, Some("item-1"), vec![])]
    #[case::owner_copy_newer(-1, Some("item-1"), vec!["data.txt"])]
    #[case::candidate_newer(1, None, vec!["data.txt", "a.Foo"])]
    fn candidate_file_age_decides_acceptance(
        #[case] shift: i64,
        #[case] name: Option<&str>,
        #[case] sent: Vec<&str>,
    ) {
        let (_dir, responder) = with_data_file();
        let first = responder.answer(&Request::new("a.Foo"));
        let mut candidate = cached(&first, "item-1");
        candidate.files.as_mut().unwrap()[0].last_modified += shift;

        let accepted = responder
            .answer(&Request::with_candidates("a.Foo", vec![candidate]))
            .accepted_offer
            .unwrap();
        assert_eq!(accepted.name.as_deref(), name);
        assert_eq!(names(&accepted), sent);
        assert!(accepted.files().iter().all(FileRecord::has_content));
        assert_eq!(accepted.units_with_files, vec!["a.Foo"]);
    }

    #[test]
    fn older_file_is_patched() {
        let (dir, responder) = with_data_file();
        let first = responder.answer(&Request::new("a.Foo"));
        let candidate = cached(&first, "item-1");

        fs::write(dir.path().join("data.txt"), b"changed").unwrap();
        set_modified(&dir.path().join("data.txt"), 3_000);

        let second = responder
            .answer(&Request::with_candidates("a.Foo", vec![candidate]));
        let accepted = second.accepted_offer.unwrap();
        assert_eq!(accepted.name.as_deref(), Some("item-1"));
        assert_eq!(names(&accepted), vec!["data.txt"]);
        assert_eq!(accepted.files()[0].content.as_deref(), Some(&b"changed"[..]));
        assert_eq!(accepted.files()[0].last_modified, 3_000);
    }

    #[test]
    fn unrelated_and_malformed_candidates_are_skipped() {
        let (_dir, responder) = with_data_file();
        let unrelated = Offer {
            name: Some("other".into()),
            files: Some(vec![FileRecord::new("b.Bar", 1, 1, ContentKind::Class)]),
            ..Default::default()
        };
        let malformed = Offer::named("no-files", 0);
        let mut unnamed = cached(&responder.answer(&Request::new("a.Foo")), "x");
        unnamed.name = None;
        let reusable = cached(&responder.answer(&Request::new("a.Foo")), "good");

        let response = responder.answer(&Request::with_candidates(
            "a.Foo",
            vec![malformed, unrelated, unnamed, reusable],
        ));
        assert_eq!(
            response.accepted_offer.unwrap().name.as_deref(),
            Some("good")
        );
    }

    #[test]
    fn files_missing_from_candidate_are_added() {
        let (_dir, responder) = with_data_file();
        let mut candidate = cached(&responder.answer(&Request::new("a.Foo")), "item");
        candidate.files.as_mut().unwrap().retain(|file| file.name == "a.Foo");
        candidate.units_with_files.clear();

        let accepted = responder
            .answer(&Request::with_candidates("a.Foo", vec![candidate]))
            .accepted_offer
            .unwrap();
        assert_eq!(names(&accepted), vec!["data.txt"]);
        assert!(accepted.files()[0].has_content());
        assert_eq!(accepted.units_with_files, vec!["a.Foo"]);
    }

    #[test]
    fn unknown_unit_gets_no_offer() {
        let (_dir, responder) = with_data_file();
        let response = responder.answer(&Request::new("b.Bar"));
        assert!(response.accepted_offer.is_none());
    }

    #[test]
    fn failing_provider_gets_no_offer() {
        let dir = TempDir::new("remote-loader").unwrap();
        write_class(&dir.path().join("classes"), "a.Foo", b"foo");
        let mut graph = UnitGraph::new();
        graph.insert(
            UnitInfo::new("a.Foo")
                .with_marker(DependencyMarker::Provider("missing".into())),
        );
        let responder = responder(dir.path(), graph, StrategyKind::ClassBased);

        assert!(responder.answer(&Request::new("a.Foo")).accepted_offer.is_none());
    }

    // Known gap: a file whose bytes vanish between collection and loading
    // is dropped, yet the offer still claims the unit's files are complete.
    #[test]
    fn unreadable_file_is_silently_omitted() {
        let dir = TempDir::new("remote-loader").unwrap();
        write_class(&dir.path().join("classes"), "a.Foo", b"foo");
        fs::write(dir.path().join("data.txt"), b"data").unwrap();
        let mut graph = UnitGraph::new();
        graph.insert(
            UnitInfo::new("a.Foo")
                .with_marker(DependencyMarker::Files(vec!["data.txt".into()])),
        );
        let responder = responder(dir.path(), graph, StrategyKind::FileBased);

        let mut collected = responder.strategy().collect("a.Foo").unwrap().unwrap();
        fs::remove_file(dir.path().join("data.txt")).unwrap();
        let loaded: Vec<_> = collected
            .files
            .take()
            .unwrap()
            .iter()
            .filter_map(|file| responder.loaded(file))
            .collect();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "a.Foo");
        assert_eq!(collected.units_with_files, vec!["a.Foo"]);
    }
}
