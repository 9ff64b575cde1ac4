use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    error::Result,
    function::{Node, NodeKind, Value, ValueKind},
    identifier::Identifier,
    paths::sanitize_relative,
};

use super::{local::reduce_local, Descriptor, Dispatcher, Executor, Name};

pub(crate) const STORE: Name = Name("store");

/// `file://` location under `values_dir` where the value identified by
/// `identifier` is persisted
pub(crate) fn value_location(values_dir: &Utf8Path, identifier: &str) -> Identifier {
    let path = values_dir.join(format!("{}.json", sanitize_relative(identifier)));
    Identifier::file(path.into_string())
}

/// Persists a freshly reduced value so that it can be found again through its
/// derived identifier.
pub(crate) fn persist_reduced(
    value: Value,
    values_dir: &Utf8Path,
    dispatcher: &Dispatcher,
) -> Result<Value> {
    let identifier = dispatcher.identifier(&Node::from(value.clone()));
    let location = value_location(values_dir, &identifier);
    log::debug!("derived location {location} for {identifier}");
    let provenance = value.provenance().clone();
    Value::persist(location, value.into_payload(), provenance)
}

/// Reduces callables locally and persists the result as a remote value
pub struct StoreExecutor {
    values_dir: Utf8PathBuf,
}

impl StoreExecutor {
    #[inline]
    pub fn new(values_dir: Utf8PathBuf) -> Self {
        Self { values_dir }
    }
}

impl Executor for StoreExecutor {
    fn descriptor(&self) -> Descriptor {
        Descriptor {
            name: STORE,
            accepts: NodeKind::Callable,
            produces: ValueKind::RemoteValue,
            caching: false,
        }
    }

    fn execute(&self, node: &Node, dispatcher: &Dispatcher) -> Result<Value> {
        let value = reduce_local(node, dispatcher, STORE)?;
        persist_reduced(value, &self.values_dir, dispatcher)
    }
}
