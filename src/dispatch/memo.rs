use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;

use crate::{
    error::{Error, Result},
    function::{Function, Node, NodeKind, Value, ValueKind},
    identifier::Identifier,
    provenance::Event,
};

use super::{
    graph::{PersistedGraph, Triple},
    local::{check_nullary, reduce_local},
    store::persist_reduced,
    Descriptor, Dispatcher, Executor, Name,
};

pub(crate) const MEMO: Name = Name("memo");

/// Memoizes reductions of remote callables in a persistent graph mapping
/// `(source identity, "memo")` to the location of the persisted result.
///
/// Before trusting either a memoized or a fresh result, the revision the node
/// declares is checked against the one currently observed at its source.
pub struct MemoExecutor {
    store: RefCell<PersistedGraph>,
    values_dir: Utf8PathBuf,
}

impl MemoExecutor {
    /// Opens the graph persisted at `memo_path`; results are written under
    /// `values_dir`
    pub fn open(memo_path: Utf8PathBuf, values_dir: Utf8PathBuf) -> Self {
        Self {
            store: RefCell::new(PersistedGraph::open(memo_path)),
            values_dir,
        }
    }

    #[inline]
    pub fn memo_path(&self) -> Utf8PathBuf {
        self.store.borrow().path.clone()
    }

    #[inline]
    pub fn values_dir(&self) -> &Utf8Path {
        &self.values_dir
    }

    /// Number of memoized results
    #[inline]
    pub fn len(&self) -> usize {
        self.store.borrow().graph.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.borrow().graph.is_empty()
    }

    pub fn triples(&self) -> Vec<Triple> {
        self.store.borrow().graph.iter().cloned().collect()
    }

    fn check_revision(function: &Function) -> Result<()> {
        let Some(remote) = function.remote_binding() else {
            return Ok(());
        };
        let actual = remote.observe_revision()?;
        if remote.revision() != actual.as_deref() {
            return Err(Error::RevisionMismatch {
                source_id: remote.identifier().location(),
                declared: remote.revision().map(str::to_string),
                actual,
            });
        }
        log::debug!("revision {actual:?} of {} verified", remote.identifier());
        Ok(())
    }

    fn lookup(&self, source_id: &str) -> Result<Option<Identifier>> {
        let objects = self
            .store
            .borrow()
            .graph
            .objects(source_id, MEMO.0)
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        match objects.as_slice() {
            [] => Ok(None),
            [object] => Ok(Some(Identifier::parse(object)?)),
            _ => Err(Error::AmbiguousMemo {
                source_id: source_id.to_string(),
                executor: MEMO.to_string(),
                count: objects.len(),
            }),
        }
    }

    fn record(&self, source_id: &str, location: &Identifier) -> Result<()> {
        let mut store = self.store.borrow_mut();
        store.graph.record(source_id, MEMO.0, &location.to_string());
        store.persist()
    }
}

impl Executor for MemoExecutor {
    fn descriptor(&self) -> Descriptor {
        Descriptor {
            name: MEMO,
            accepts: NodeKind::RemoteCallable,
            produces: ValueKind::RemoteValue,
            caching: true,
        }
    }

    fn execute(&self, node: &Node, dispatcher: &Dispatcher) -> Result<Value> {
        let Node::Function(function) = node else {
            return Err(Error::DispatchExhausted {
                node: node.kind(),
                requested: ValueKind::RemoteValue,
            });
        };
        check_nullary(function)?;
        Self::check_revision(function)?;

        let source_id = dispatcher.identifier(node);
        if let Some(location) = self.lookup(&source_id)? {
            match Value::load(location.clone(), dispatcher.fetcher()) {
                Ok(value) => {
                    log::info!("loaded from cache {location} for {source_id}");
                    let provenance = node.provenance().then(Event::Execute {
                        executor: MEMO,
                        source: node.clone(),
                    });
                    return Ok(value.with_provenance(provenance).from_cache());
                }
                Err(e) => log::info!(
                    "{}",
                    Error::CacheLoad {
                        location: location.to_string(),
                        reason: e.to_string(),
                    }
                ),
            }
        }

        let value = reduce_local(node, dispatcher, MEMO)?;
        let value = persist_reduced(value, &self.values_dir, dispatcher)?;
        if let Some(location) = value.location() {
            self.record(&source_id, location)?;
            log::info!("memoized {source_id} as {location}");
        }
        Ok(value)
    }
}
