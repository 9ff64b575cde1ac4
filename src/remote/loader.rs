use std::rc::Rc;

use crate::{
    config::Config,
    error::{Error, Result},
    function::{Function, Node},
    identifier::Identifier,
    paths::write_atomically,
};

use super::{
    adapter::RemoteProcedure, AdapterRegistry, DefaultFetcher, Fetch, NotebookAdapter,
    PythonAdapter, RemoteBinding, SourceAdapter,
};

/// Turns URIs into remote callables
pub struct Loader {
    adapters: AdapterRegistry,
    fetcher: Rc<dyn Fetch>,
}

impl Loader {
    /// The standard adapters, notebooks first
    pub fn new(config: &Config, fetcher: Rc<dyn Fetch>) -> Self {
        let mut adapters = AdapterRegistry::default();
        adapters.register(NotebookAdapter::new(
            config.notebook_runner.clone(),
            config.home_dir.join("notebooks"),
        ));
        adapters.register(PythonAdapter::new(config.python.clone()));
        Self::with_adapters(adapters, fetcher)
    }

    #[inline]
    pub fn with_adapters(adapters: AdapterRegistry, fetcher: Rc<dyn Fetch>) -> Self {
        Self { adapters, fetcher }
    }

    /// The standard adapters, reading sources with [`DefaultFetcher`]
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config, Rc::new(DefaultFetcher))
    }

    #[inline]
    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Loads the callable `uri` points at. Every adapter accepting the URI is
    /// tried in registration order; failures are logged and the next adapter
    /// is attempted, only exhaustion is reported.
    ///
    /// When the URI declares no revision and the source does, the loaded
    /// node's identifier carries the discovered one.
    pub fn load(&self, uri: &str) -> Result<Node> {
        log::info!("loading {uri}");
        let identifier = Identifier::parse(uri)?;
        let source: Rc<[u8]> = self.fetcher.fetch(&identifier)?.into();
        for adapter in self.adapters.accepting(&identifier) {
            match self.load_with(adapter, &identifier, &source) {
                Ok(node) => return Ok(node),
                Err(e) => log::info!("can not load {uri} as {}: {e}", adapter.name()),
            }
        }
        Err(Error::UnparseableIdentifier(uri.to_string()))
    }

    fn load_with(
        &self,
        adapter: &Rc<dyn SourceAdapter>,
        identifier: &Identifier,
        source: &Rc<[u8]>,
    ) -> Result<Node> {
        let signature = adapter.extract_parameters(identifier, source)?;
        let observed = adapter.extract_version(identifier, source)?;
        let identifier = match (&identifier.revision, observed) {
            (None, Some(observed)) => {
                log::info!("discovered revision {observed} of {identifier}");
                identifier.clone().with_revision(Some(observed))
            }
            (Some(declared), Some(observed)) if *declared != observed => {
                log::warn!("{identifier} declares {declared} but the source is at {observed}");
                identifier.clone()
            }
            _ => identifier.clone(),
        };

        let procedure = RemoteProcedure {
            name: callable_name(&identifier),
            signature,
            identifier: identifier.clone(),
            source: source.clone(),
            adapter: adapter.clone(),
        };
        let binding = RemoteBinding::new(identifier, adapter.clone(), self.fetcher.clone(), source.clone());
        let function = Function::remote(Rc::new(procedure), binding);
        log::info!("loaded {function:?}");
        Ok(function.into())
    }

    /// Copies the source of a remote callable to the `file://` location
    /// `target` and loads the callable from there
    pub fn relocate(&self, node: &Node, target: &str) -> Result<Node> {
        let Some(binding) = node.as_function().and_then(|f| f.remote_binding()) else {
            return Err(Error::adapter(format!("{node:?}"), "not a remote callable"));
        };
        let target = Identifier::parse(target)?;
        let Some(path) = target.local_path() else {
            return Err(Error::UnsupportedScheme(target.scheme.as_str().to_string()));
        };
        write_atomically(&path, binding.source())?;
        log::info!("stored {} to {path}", binding.identifier());

        let origin = binding.identifier();
        let relocated = Identifier {
            modifier: origin.modifier,
            member: origin.member.clone(),
            revision: None,
            ..target
        };
        self.load(&relocated.to_string())
    }
}

/// The member for sources holding several callables, the file stem otherwise
fn callable_name(identifier: &Identifier) -> String {
    if let Some(member) = &identifier.member {
        return member.clone();
    }
    let file_name = identifier.path.rsplit('/').next().unwrap_or(&identifier.path);
    match file_name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}
