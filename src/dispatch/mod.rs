//! Executor resolution.
//!
//! Executors form a closed, explicit registry: each one declares the node kind
//! it accepts and the value kind it produces through a static [`Descriptor`].
//! Resolution walks the registry in registration order and hands the node to
//! the first executor whose descriptor fits the node, the requested value kind
//! and the selector. There is no ranking and no backtracking.

mod file_cache;
pub mod graph;
mod local;
mod memo;
mod store;

pub use file_cache::FileCacheExecutor;
pub use local::{IdentityExecutor, LocalExecutor};
pub use memo::MemoExecutor;
pub use store::StoreExecutor;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::{fmt, rc::Rc};

use crate::{
    config::Config,
    error::{Error, Result},
    function::{Node, NodeKind, Payload, Value, ValueKind},
    remote::{DefaultFetcher, Fetch},
};

pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Name(pub &'static str);

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an executor declares at registration time
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub name: Name,
    pub accepts: NodeKind,
    pub produces: ValueKind,
    pub caching: bool,
}

/// Reduces nullary nodes of one kind to values of one kind.
pub trait Executor {
    fn descriptor(&self) -> Descriptor;

    /// Only called with nodes of the declared kind. The dispatcher is handed
    /// over so bound arguments can be reduced recursively.
    fn execute(&self, node: &Node, dispatcher: &Dispatcher) -> Result<Value>;
}

/// Extra admission filter applied after the kind checks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Selector {
    #[default]
    Any,
    Caching,
    NotCaching,
    Named(Name),
}

impl Selector {
    pub fn admits(&self, descriptor: &Descriptor) -> bool {
        match self {
            Self::Any => true,
            Self::Caching => descriptor.caching,
            Self::NotCaching => !descriptor.caching,
            Self::Named(name) => descriptor.name == *name,
        }
    }
}

pub struct Dispatcher {
    config: Config,
    fetcher: Rc<dyn Fetch>,
    executors: FxIndexMap<Name, Box<dyn Executor>>,
}

impl Dispatcher {
    /// A dispatcher with the standard registry, fetching remote sources with
    /// [`DefaultFetcher`]
    pub fn new(config: Config) -> Self {
        Self::with_fetcher(config, Rc::new(DefaultFetcher))
    }

    /// The standard registry, in resolution order: `identity`, `local`,
    /// `store`, `memo`, `file-cache`
    pub fn with_fetcher(config: Config, fetcher: Rc<dyn Fetch>) -> Self {
        let memo = MemoExecutor::open(config.memo_path.clone(), config.values_dir.clone());
        let file_cache = FileCacheExecutor::new(config.cache_dir.clone());
        let store = StoreExecutor::new(config.values_dir.clone());
        let mut dispatcher = Self::empty(config, fetcher);
        dispatcher.register(IdentityExecutor);
        dispatcher.register(LocalExecutor);
        dispatcher.register(store);
        dispatcher.register(memo);
        dispatcher.register(file_cache);
        dispatcher
    }

    /// A dispatcher with no executor registered
    pub fn empty(config: Config, fetcher: Rc<dyn Fetch>) -> Self {
        Self {
            config,
            fetcher,
            executors: FxIndexMap::default(),
        }
    }

    /// Appends `executor` to the registry. Registering a name twice replaces
    /// the earlier executor in place.
    pub fn register<E: Executor + 'static>(&mut self, executor: E) {
        let name = executor.descriptor().name;
        self.executors.insert(name, Box::new(executor));
    }

    #[inline]
    pub fn executor(&self, name: Name) -> Option<&dyn Executor> {
        self.executors.get(&name).map(|e| e.as_ref())
    }

    #[inline]
    pub fn descriptors(&self) -> impl Iterator<Item = Descriptor> + '_ {
        self.executors.values().map(|e| e.descriptor())
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn fetcher(&self) -> &dyn Fetch {
        self.fetcher.as_ref()
    }

    /// The node's identifier under the configured root
    #[inline]
    pub fn identifier(&self, node: &Node) -> String {
        node.identifier(&self.config.identifier_root)
    }

    /// Caching strategies are preferred for callables marked as cached and,
    /// when `cache_everything` is configured, for every callable. Values are
    /// already reduced and never go through a cache.
    pub fn selector_for(&self, node: &Node) -> Selector {
        match node {
            Node::Value(_) => Selector::Any,
            Node::Function(_) if node.is_cached() || self.config.cache_everything => {
                Selector::Caching
            }
            Node::Function(_) => Selector::Any,
        }
    }

    /// Reduces `node` to a value of kind `requested` (or a specialization of
    /// it) with the selector [`Dispatcher::selector_for`] picks. A caching
    /// preference falls back to any fitting executor when no caching one fits
    /// the node and the requested kind.
    pub fn reduce(&self, node: &Node, requested: ValueKind) -> Result<Value> {
        let selector = self.selector_for(node);
        let executor = match self.resolve(node, requested, selector) {
            None if selector == Selector::Caching => {
                log::debug!("no caching executor fits {node:?}, falling back to any");
                self.resolve(node, requested, Selector::Any)
            }
            resolved => resolved,
        };
        self.run(executor, node, requested)
    }

    /// First-fit resolution: the first registered executor that accepts the
    /// node's kind, produces `requested` and is admitted by `selector` runs
    pub fn reduce_with(&self, node: &Node, requested: ValueKind, selector: Selector) -> Result<Value> {
        self.run(self.resolve(node, requested, selector), node, requested)
    }

    fn resolve(&self, node: &Node, requested: ValueKind, selector: Selector) -> Option<&dyn Executor> {
        let kind = node.kind();
        for executor in self.executors.values() {
            let descriptor = executor.descriptor();
            if !kind.is_a(descriptor.accepts) {
                log::debug!(
                    "executor {} does not fit: node {node:?} is {kind:?} but executor accepts {:?}",
                    descriptor.name,
                    descriptor.accepts
                );
            } else if !descriptor.produces.specializes(requested) {
                log::debug!(
                    "executor {} does not fit: requested {:?} but executor produces {:?}",
                    descriptor.name,
                    requested,
                    descriptor.produces
                );
            } else if !selector.admits(&descriptor) {
                log::debug!("executor {} rejected by selector {selector:?}", descriptor.name);
            } else {
                log::info!("executor {} fits {node:?}", descriptor.name);
                return Some(executor.as_ref());
            }
        }
        None
    }

    fn run(&self, executor: Option<&dyn Executor>, node: &Node, requested: ValueKind) -> Result<Value> {
        match executor {
            Some(executor) => executor.execute(node, self),
            None => Err(Error::DispatchExhausted {
                node: node.kind(),
                requested,
            }),
        }
    }

    #[inline]
    pub fn execute(&self, node: &Node) -> Result<Value> {
        self.reduce(node, ValueKind::Value)
    }

    /// Reduces `node` to a plain value and returns its payload
    #[inline]
    pub fn evaluate(&self, node: &Node) -> Result<Payload> {
        Ok(self.execute(node)?.into_payload())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        function::{Parameter, Signature},
        provenance::Event,
        test_utils::HomeDir,
    };

    fn add() -> Node {
        Node::native(
            "add",
            Signature::new([
                Parameter::positional("x"),
                Parameter::positional("y"),
                Parameter::positional("z").with_default(1),
            ]),
            |args| {
                Ok(json!(
                    args.get_as::<i64>("x")? + args.get_as::<i64>("y")? + args.get_as::<i64>("z")?
                ))
            },
        )
    }

    struct Recording<'a> {
        descriptor: Descriptor,
        calls: &'a Cell<usize>,
    }

    #[test]
    fn test_standard_registry_order() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config());
        let names = dispatcher.descriptors().map(|d| d.name.0).collect::<Vec<_>>();
        assert_eq!(names, ["identity", "local", "store", "memo", "file-cache"]);
    }

    #[test]
    fn test_reduce_first_fit() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config());
        let f0 = add().apply(vec![1.into(), 2.into()], [("z", 3.into())]).unwrap();
        let value = dispatcher.reduce(&f0, ValueKind::Value).unwrap();
        assert_eq!(value.payload(), &json!(6));
        assert_eq!(value.kind(), ValueKind::Value);
        let last = value.provenance().last().unwrap();
        assert!(matches!(last, Event::Execute { executor, .. } if executor.0 == "local"));
    }

    #[test]
    fn test_reduce_remote_value_kind() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config());
        let f0 = add().call(vec![1.into(), 2.into()]).unwrap();
        let value = dispatcher.reduce(&f0, ValueKind::RemoteValue).unwrap();
        assert_eq!(value.kind(), ValueKind::RemoteValue);
        assert_eq!(value.payload(), &json!(4));
        assert!(value.location().unwrap().local_path().unwrap().starts_with(home.utf8_path()));
    }

    #[test]
    fn test_reduce_values_is_identity() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config());
        assert_eq!(dispatcher.evaluate(&Node::value("x")).unwrap(), json!("x"));
        assert!(matches!(
            dispatcher.reduce(&Node::value("x"), ValueKind::RemoteValue),
            Err(Error::DispatchExhausted {
                node: NodeKind::Value,
                requested: ValueKind::RemoteValue
            })
        ));
    }

    #[test]
    fn test_exhausted_on_empty_registry() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::empty(home.config(), Rc::new(DefaultFetcher));
        let f0 = add().call(vec![1.into(), 2.into()]).unwrap();
        for kind in [ValueKind::Value, ValueKind::RemoteValue] {
            assert!(matches!(
                dispatcher.reduce(&f0, kind),
                Err(Error::DispatchExhausted { .. })
            ));
        }
    }

    #[test]
    fn test_selector_filters() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config());
        let f0 = add().call(vec![1.into(), 2.into()]).unwrap();
        // memo only accepts remote callables, so a local node ends at file-cache,
        // which only caches nodes marked as cached
        let cached = f0.cached(true);
        let value = dispatcher
            .reduce_with(&cached, ValueKind::Value, Selector::Caching)
            .unwrap();
        assert!(matches!(
            value.provenance().last(),
            Some(Event::Execute { executor: Name("file-cache"), .. })
        ));
        let value = dispatcher
            .reduce_with(&f0, ValueKind::Value, Selector::Caching)
            .unwrap();
        assert!(matches!(
            value.provenance().last(),
            Some(Event::Execute { executor: Name("local"), .. })
        ));
        assert!(matches!(
            dispatcher.reduce_with(&f0, ValueKind::Value, Selector::Named(Name("nope"))),
            Err(Error::DispatchExhausted { .. })
        ));
    }

    #[test]
    fn test_caching_preference_falls_back() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config().cache_everything(true));
        assert_eq!(dispatcher.selector_for(&Node::value(1)), Selector::Any);
        assert_eq!(dispatcher.evaluate(&Node::value(1)).unwrap(), json!(1));

        // value arguments are resolved through the same dispatcher
        let f0 = add().call(vec![Node::value(10).into(), 2.into()]).unwrap();
        assert_eq!(dispatcher.selector_for(&f0), Selector::Caching);
        let value = dispatcher.execute(&f0).unwrap();
        assert_eq!(value.payload(), &json!(13));
        assert!(matches!(
            value.provenance().last(),
            Some(Event::Execute { executor: Name("file-cache"), .. })
        ));

        // no caching executor turns a local callable into a remote value
        let stored = dispatcher.reduce(&f0, ValueKind::RemoteValue).unwrap();
        assert_eq!(stored.kind(), ValueKind::RemoteValue);
        assert_eq!(stored.payload(), &json!(13));
        assert!(matches!(
            stored.provenance().last(),
            Some(Event::Execute { executor: Name("store"), .. })
        ));

        // an explicit selector is never widened
        assert!(matches!(
            dispatcher.reduce_with(&Node::value(1), ValueKind::Value, Selector::Caching),
            Err(Error::DispatchExhausted { .. })
        ));
    }

    #[test]
    fn test_registration_order_wins() {
        impl Executor for Recording<'_> {
            fn descriptor(&self) -> Descriptor {
                self.descriptor
            }

            fn execute(&self, _node: &Node, _dispatcher: &Dispatcher) -> Result<Value> {
                self.calls.set(self.calls.get() + 1);
                Ok(Value::new(json!(self.descriptor.name.0)))
            }
        }

        // the registry takes `'static` executors, so leak the counters
        let first: &'static Cell<usize> = Box::leak(Box::new(Cell::new(0)));
        let second: &'static Cell<usize> = Box::leak(Box::new(Cell::new(0)));
        let home = tempdir().unwrap();
        let mut dispatcher = Dispatcher::empty(home.config(), Rc::new(DefaultFetcher));
        for (name, calls) in [("first", first), ("second", second)] {
            dispatcher.register(Recording {
                descriptor: Descriptor {
                    name: Name(name),
                    accepts: NodeKind::Callable,
                    produces: ValueKind::Value,
                    caching: false,
                },
                calls,
            });
        }
        let f0 = add().call(vec![1.into(), 2.into()]).unwrap();
        assert_eq!(dispatcher.evaluate(&f0).unwrap(), json!("first"));
        assert_eq!((first.get(), second.get()), (1, 0));
    }
}
