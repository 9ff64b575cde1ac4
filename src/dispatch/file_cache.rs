use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    error::{Error, Result},
    function::{Node, NodeKind, Value, ValueKind},
    paths::{short_hash, write_atomically},
    provenance::{Event, Provenance},
};

use super::{
    local::{check_nullary, reduce_local, LOCAL},
    Descriptor, Dispatcher, Executor, Name,
};

pub(crate) const FILE_CACHE: Name = Name("file-cache");

const CACHE_KEY_LEN: usize = 16;

/// Content-addressed cache: each reduced value is serialized to
/// `<cache_dir>/<hash of the node's provenance>.json`.
pub struct FileCacheExecutor {
    cache_dir: Utf8PathBuf,
}

impl FileCacheExecutor {
    #[inline]
    pub fn new(cache_dir: Utf8PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Nodes without provenance are told apart by their identifier, which for
    /// them is a hash of their rendering
    pub fn cache_path(&self, node: &Node, dispatcher: &Dispatcher) -> Utf8PathBuf {
        let root = &dispatcher.config().identifier_root;
        let key = short_hash(
            format!("{}\n{}", node.identifier(root), node.provenance().render(root)),
            CACHE_KEY_LEN,
        );
        self.cache_dir.join(format!("{key}.json"))
    }
}

fn load_entry(path: &Utf8Path, provenance: Provenance) -> Result<Value> {
    let cache_load = |reason: String| Error::CacheLoad {
        location: path.to_string(),
        reason,
    };
    let s = std::fs::read_to_string(path).map_err(|e| cache_load(e.to_string()))?;
    Value::loads(&s, provenance).map_err(|e| cache_load(e.to_string()))
}

impl Executor for FileCacheExecutor {
    fn descriptor(&self) -> Descriptor {
        Descriptor {
            name: FILE_CACHE,
            accepts: NodeKind::Callable,
            produces: ValueKind::Value,
            caching: true,
        }
    }

    fn execute(&self, node: &Node, dispatcher: &Dispatcher) -> Result<Value> {
        if !node.is_cached() && !dispatcher.config().cache_everything {
            log::debug!("{node:?} is not marked as cached, reducing locally");
            return reduce_local(node, dispatcher, LOCAL);
        }
        if let Node::Function(function) = node {
            check_nullary(function)?;
        }

        let path = self.cache_path(node, dispatcher);
        let provenance = node.provenance().then(Event::Execute {
            executor: FILE_CACHE,
            source: node.clone(),
        });
        match load_entry(&path, provenance) {
            Ok(value) => {
                log::info!("loaded from cache {path}: {value:?}");
                return Ok(value.from_cache());
            }
            Err(e) => log::info!("{e}"),
        }

        let value = reduce_local(node, dispatcher, FILE_CACHE)?;
        match write_atomically(&path, value.dumps()?.as_bytes()) {
            Ok(()) => log::info!("stored to cache {path}, {value:?}"),
            Err(e) => log::warn!("can not store to cache {path}: {e}"),
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::{cell::Cell, rc::Rc};
    use tempfile::tempdir;

    use super::*;
    use crate::{
        function::{Parameter, Signature},
        test_utils::HomeDir,
    };

    fn counting_add(calls: Rc<Cell<usize>>) -> Node {
        Node::native(
            "add",
            Signature::new([Parameter::positional("x"), Parameter::positional("y")]),
            move |args| {
                calls.set(calls.get() + 1);
                Ok(json!(args.get_as::<i64>("x")? + args.get_as::<i64>("y")?))
            },
        )
    }

    #[test]
    fn test_cache_hit_skips_procedure() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config());
        let calls = Rc::new(Cell::new(0));

        let first = counting_add(calls.clone())
            .cached(true)
            .call(vec![1.into(), 2.into()])
            .unwrap();
        let v1 = dispatcher.execute(&first).unwrap();
        assert!(!v1.loaded_from_cache());

        let second = counting_add(calls.clone())
            .cached(true)
            .call(vec![1.into(), 2.into()])
            .unwrap();
        let v2 = dispatcher.execute(&second).unwrap();
        assert!(v2.loaded_from_cache());
        assert_eq!(v1.payload(), v2.payload());
        assert_eq!(calls.get(), 1);

        // different arguments, different entry
        let third = counting_add(calls.clone())
            .cached(true)
            .call(vec![1.into(), 3.into()])
            .unwrap();
        assert_eq!(dispatcher.evaluate(&third).unwrap(), json!(4));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_uncached_nodes_are_reduced_locally() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config());
        let calls = Rc::new(Cell::new(0));
        let executor = FileCacheExecutor::new(home.config().cache_dir);
        for _ in 0..2 {
            let f0 = counting_add(calls.clone()).call(vec![1.into(), 2.into()]).unwrap();
            let value = executor.execute(&f0, &dispatcher).unwrap();
            assert!(!value.loaded_from_cache());
        }
        assert_eq!(calls.get(), 2);
        assert!(!home.config().cache_dir.exists());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config());
        let executor = FileCacheExecutor::new(home.config().cache_dir);
        let calls = Rc::new(Cell::new(0));
        let f0 = counting_add(calls.clone())
            .cached(true)
            .call(vec![1.into(), 2.into()])
            .unwrap();

        let path = executor.cache_path(&f0, &dispatcher);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"class\": \"Val").unwrap();

        let value = executor.execute(&f0, &dispatcher).unwrap();
        assert!(!value.loaded_from_cache());
        assert_eq!(calls.get(), 1);
        // the entry was rewritten in full
        let value = executor.execute(&f0, &dispatcher).unwrap();
        assert!(value.loaded_from_cache());
        assert_eq!(value.payload(), &json!(3));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_cache_everything() {
        let home = tempdir().unwrap();
        let dispatcher = Dispatcher::new(home.config().cache_everything(true));
        let calls = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let f0 = counting_add(calls.clone()).call(vec![5.into(), 2.into()]).unwrap();
            assert_eq!(dispatcher.evaluate(&f0).unwrap(), json!(7));
        }
        assert_eq!(calls.get(), 1);
    }
}
