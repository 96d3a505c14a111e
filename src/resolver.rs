//! Requester side: resolves units locally or asks the owner for them and
//! applies the offers it gets back.

use std::collections::HashSet;
use std::fs;
use std::path::{PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use uuid::Uuid;

use data_error::{LoaderError, Result};
use data_offer::{ContentKind, Message, Offer, Request, Response};
use fs_cache::{CacheStore, UnitOrigin};
use fs_collect::UnitGraph;

use crate::channel::{LocalBus, MessageChannel};
use crate::config::LoaderConfig;
use crate::registry::{CodeRegistry, DefinedUnit};

struct ResolverState {
    registry: CodeRegistry,
    /// Items this resolver has applied successfully.
    used_offers: HashSet<String>,
}

pub struct RequesterResolver {
    id: Uuid,
    label: String,
    state: Mutex<ResolverState>,
    cache: Arc<dyn CacheStore>,
    channel: Arc<dyn MessageChannel>,
    /// Only the dependency markers are looked at here.
    graph: UnitGraph,
    local_first: bool,
}

impl RequesterResolver {
    pub fn new(
        registry: CodeRegistry,
        cache: Arc<dyn CacheStore>,
        channel: Arc<dyn MessageChannel>,
    ) -> Self {
        let id = Uuid::new_v4();
        let short = id.simple().to_string();
        RequesterResolver {
            id,
            label: format!("resolver/{}", &short[..8]),
            state: Mutex::new(ResolverState {
                registry,
                used_offers: HashSet::new(),
            }),
            cache,
            channel,
            graph: UnitGraph::new(),
            local_first: true,
        }
    }

    pub fn with_graph(mut self, graph: UnitGraph) -> Self {
        self.graph = graph;
        self
    }

    pub fn local_first(mut self, local_first: bool) -> Self {
        self.local_first = local_first;
        self
    }

    /// A resolver talking to the owner through `bus`, with the cache store
    /// and settings described by `config`.
    pub fn connect(
        config: &LoaderConfig,
        bus: &Arc<LocalBus>,
        registry: CodeRegistry,
    ) -> Result<Self> {
        let channel = bus.client(
            config.request_queue.clone(),
            config.response_queue.clone(),
            config.request_timeout(),
        );
        Ok(Self::new(registry, config.cache.open()?, Arc::new(channel))
            .with_graph(config.load_graph()?)
            .local_first(config.local_first))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn is_defined(&self, unit: &str) -> bool {
        self.state.lock().registry.is_defined(unit)
    }

    pub fn used_offers(&self) -> Vec<String> {
        let mut used: Vec<String> =
            self.state.lock().used_offers.iter().cloned().collect();
        used.sort();
        used
    }

    /// Archives added to the classpath by applied offers.
    pub fn classpath(&self) -> Vec<PathBuf> {
        self.state.lock().registry.classpath().to_vec()
    }

    /// Define `unit`, from local sources if possible, otherwise from what
    /// the owner sends. Calls are serialized per resolver.
    pub fn resolve(&self, unit: &str) -> Result<DefinedUnit> {
        let mut state = self.state.lock();
        if let Some(defined) = state.registry.find_defined(unit) {
            return Ok(defined.clone());
        }

        let started = Instant::now();
        let result = match state.registry.find_local(unit)? {
            Some(defined) => {
                self.ensure_additional_files_loaded(&mut state, &defined)?;
                Ok(defined)
            }
            None => self.resolve_remote(&mut state, unit),
        };
        log::debug!(
            "{}: loading of {} took {}ms",
            self.label,
            unit,
            started.elapsed().as_millis()
        );
        result
    }

    /// A unit found locally may come from an archive of a cached item whose
    /// plain files were never fetched. Ask for just those files.
    fn ensure_additional_files_loaded(
        &self,
        state: &mut ResolverState,
        defined: &DefinedUnit,
    ) -> Result<()> {
        let unit = defined.name.as_str();
        if !self.cache.is_from_cache(&defined.origin) {
            return Ok(());
        }
        if self.graph.marker_of(unit).is_none() {
            return Ok(());
        }

        let used_item = match &defined.origin {
            UnitOrigin::Item(item) if state.used_offers.contains(item) => {
                Some(item.clone())
            }
            _ => self
                .cache
                .item_names_for(unit)
                .into_iter()
                .find(|item| state.used_offers.contains(item)),
        };

        let request = match used_item {
            Some(item) => {
                if self
                    .cache
                    .units_with_files_of(&item)
                    .iter()
                    .any(|known| known == unit)
                {
                    return Ok(());
                }
                let candidates =
                    self.cache.build_offer_metadata(&item).into_iter().collect();
                Request::with_candidates(unit, candidates)
            }
            None => {
                log::info!(
                    "{}: {} declares dependent files, but the offer it was taken \
                     from is unknown. Asking the owner.",
                    self.label,
                    unit
                );
                Request::new(unit)
            }
        };

        let response = match self.exchange(&request) {
            Ok(response) => response,
            Err(err) => {
                log::error!(
                    "{}: failed to load dependent files of {}: {}",
                    self.label,
                    unit,
                    err
                );
                return Ok(());
            }
        };
        match response.accepted_offer {
            Some(mut offer) if offer.has_files() => {
                self.cache.register_offer(&mut offer)?;
                self.use_offer(state, None, &offer)?;
            }
            _ => log::info!(
                "{}: asked for dependent files of {} but received an offer \
                 without files",
                self.label,
                unit
            ),
        }
        Ok(())
    }

    fn resolve_remote(
        &self,
        state: &mut ResolverState,
        unit: &str,
    ) -> Result<DefinedUnit> {
        let candidates: Vec<Offer> = self
            .cache
            .item_names_for(unit)
            .iter()
            .filter_map(|item| self.cache.build_offer_metadata(item))
            .collect();
        if candidates.is_empty() {
            log::debug!(
                "{}: {} is not cached, requesting it from the owner",
                self.label,
                unit
            );
        } else {
            log::debug!(
                "{}: {} is cached in {} offer(s), checking them with the owner",
                self.label,
                unit,
                candidates.len()
            );
        }
        let request = Request::with_candidates(unit, candidates);

        let response = self.exchange(&request).map_err(|err| {
            log::error!("{}: failed to load {}: {}", self.label, unit, err);
            LoaderError::UnitNotFound(unit.to_owned())
        })?;

        let mut accepted = match response.accepted_offer {
            Some(offer) if offer.has_files() || offer.has_name() => offer,
            _ => {
                if request.candidate_offers.is_empty() {
                    log::error!(
                        "{}: owner did not provide {} and no cached version is \
                         available",
                        self.label,
                        unit
                    );
                } else {
                    log::error!(
                        "{}: owner did not provide {} and selected none of the \
                         cached versions",
                        self.label,
                        unit
                    );
                }
                return Err(LoaderError::UnitNotFound(unit.to_owned()));
            }
        };

        let offer = if !accepted.has_files() {
            let selected = accepted.name.clone().unwrap_or_default();
            log::debug!(
                "{}: owner selected offer {} for {}",
                self.label,
                selected,
                unit
            );
            let Some(candidate) = request.offer_by_name(&selected) else {
                log::error!(
                    "{}: cannot use {} for {}, it was never proposed",
                    self.label,
                    selected,
                    unit
                );
                return Err(LoaderError::UnitNotFound(unit.to_owned()));
            };
            if accepted
                .units_with_files
                .iter()
                .any(|known| !candidate.units_with_files.contains(known))
            {
                self.cache.register_offer(&mut accepted)?;
            }
            candidate.clone()
        } else {
            log::debug!(
                "{}: owner provided {} within {} files",
                self.label,
                unit,
                accepted.files().len()
            );
            if let Some(candidate) = accepted
                .name
                .as_deref()
                .and_then(|name| request.offer_by_name(name))
            {
                accepted.merge_missing_files(candidate.files());
            }
            self.cache.register_offer(&mut accepted)?;
            accepted
        };

        self.use_offer(state, Some(unit), &offer)?
            .ok_or_else(|| LoaderError::UnitNotFound(unit.to_owned()))
    }

    /// Apply every file of `offer`. Files that cannot be applied are
    /// skipped; any other failure evicts the offer from the cache.
    fn use_offer(
        &self,
        state: &mut ResolverState,
        unit: Option<&str>,
        offer: &Offer,
    ) -> Result<Option<DefinedUnit>> {
        let Some(item) = offer.name.as_deref().filter(|_| offer.has_name()) else {
            log::error!(
                "{}: cannot apply an offer without a name for {}",
                self.label,
                unit.unwrap_or("dependent files")
            );
            return Ok(None);
        };

        match self.apply_files(state, unit, item, offer) {
            Ok(defined) => {
                state.used_offers.insert(item.to_owned());
                Ok(defined)
            }
            Err(err) => {
                log::error!(
                    "{}: failed to use offer {}, removing it: {}",
                    self.label,
                    item,
                    err
                );
                self.cache.remove_offer(item);
                Err(err)
            }
        }
    }

    fn apply_files(
        &self,
        state: &mut ResolverState,
        unit: Option<&str>,
        item: &str,
        offer: &Offer,
    ) -> Result<Option<DefinedUnit>> {
        let mut requested = None;
        for file in offer.files() {
            match file.kind {
                ContentKind::Class => {
                    if state.registry.is_defined(&file.name) {
                        log::info!(
                            "{}: {} is already defined",
                            self.label,
                            file.name
                        );
                        continue;
                    }
                    let bytecode = match &file.content {
                        Some(content) => Some(content.clone()),
                        None => self.cached_bytecode(&file.name, item),
                    };
                    let Some(bytecode) = bytecode else {
                        log::error!(
                            "{}: failed to define {} from offer {}",
                            self.label,
                            file.name,
                            item
                        );
                        continue;
                    };
                    let defined = state.registry.define(
                        &file.name,
                        bytecode,
                        UnitOrigin::Item(item.to_owned()),
                    )?;
                    if unit == Some(file.name.as_str()) {
                        requested = Some(defined.clone());
                    }
                }
                ContentKind::Jar => {
                    match self.cache.file_location_of(&file.name, item) {
                        Some(path) => {
                            state.registry.add_to_classpath(path);
                        }
                        None => log::error!(
                            "{}: failed to find {} of offer {}",
                            self.label,
                            file.name,
                            item
                        ),
                    }
                }
                ContentKind::ReadonlyFile => {
                    if !self.cache.deploy_file(&file.name, item) {
                        log::error!(
                            "{}: failed to deploy required file {}",
                            self.label,
                            file.name
                        );
                    }
                }
            }
        }

        // The unit may live inside an archive of the offer.
        if let Some(unit) = unit.filter(|_| requested.is_none()) {
            if let Some(defined) = state.registry.find_defined(unit) {
                requested = Some(defined.clone());
            } else if let Some(bytecode) = self.cached_bytecode(unit, item) {
                requested = Some(
                    state
                        .registry
                        .define(unit, bytecode, UnitOrigin::Item(item.to_owned()))?
                        .clone(),
                );
            }
        }
        Ok(requested)
    }

    fn cached_bytecode(&self, unit: &str, item: &str) -> Option<Vec<u8>> {
        match self.cache.bytecode_of(unit, item) {
            Ok(bytecode) => bytecode,
            Err(err) => {
                log::warn!(
                    "{}: cannot read {} from cached offer {}: {}",
                    self.label,
                    unit,
                    item,
                    err
                );
                None
            }
        }
    }

    /// Bytes of the resource `name`, looked up locally and remotely in the
    /// order given by `local_first`.
    pub fn get_resource(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        if self.local_first {
            if let Some(bytes) = state.registry.find_resource(name)? {
                return Ok(Some(bytes));
            }
            self.remote_resource(&mut state, name)
        } else {
            if let Some(bytes) = self.remote_resource(&mut state, name)? {
                return Ok(Some(bytes));
            }
            state.registry.find_resource(name)
        }
    }

    fn remote_resource(
        &self,
        state: &mut ResolverState,
        name: &str,
    ) -> Result<Option<Vec<u8>>> {
        log::debug!("{}: asking the owner for resource {}", self.label, name);
        let response = self.exchange(&Request::new(name))?;
        let Some(mut offer) = response.accepted_offer.filter(Offer::has_files)
        else {
            return Ok(None);
        };
        log::debug!("{}: resource {} arrived in {}", self.label, name, offer);

        self.cache.register_offer(&mut offer)?;
        self.use_offer(state, None, &offer)?;
        let Some(item) = offer.name.as_deref() else {
            return Ok(None);
        };

        let location = self.cache.file_location_of(name, item).or_else(|| {
            let native = name.replace(['/', '\\'], &MAIN_SEPARATOR.to_string());
            self.cache.file_location_of(&native, item)
        });
        let Some(path) = location else {
            log::warn!(
                "{}: offer {} does not hold resource {}",
                self.label,
                item,
                name
            );
            return Ok(None);
        };
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// One request/response round trip, correlated by the resolver id.
    /// Replies naming another unit belong to an earlier request that timed
    /// out and are never returned.
    fn exchange(&self, request: &Request) -> Result<Response> {
        let payload = Message::Request(request.clone()).encode()?;
        let answers = |reply: &[u8]| match Message::decode(reply) {
            Ok(Message::Response(response)) => {
                response.unit_name == request.unit_name
            }
            _ => true,
        };
        let reply = self
            .channel
            .request_response_matching(payload, self.id, &answers)?;
        match Message::decode(&reply)? {
            Message::Response(response)
                if response.unit_name == request.unit_name =>
            {
                Ok(response)
            }
            Message::Response(response) => Err(LoaderError::Channel(format!(
                "asked for {} but the response is for {}",
                request.unit_name, response.unit_name
            ))),
            Message::Request(other) => Err(LoaderError::Channel(format!(
                "expected a response, received {}",
                other
            ))),
        }
    }

    pub fn close(&self) -> Result<()> {
        self.cache.close()
    }
}
