use crate::{
    dispatch::{Dispatcher, FxIndexMap},
    error::{Error, Result},
    function::{Argument, Node, Payload},
};

/// Named nodes, looked up explicitly and invoked through a dispatcher
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: FxIndexMap<String, Node>,
}

impl Catalog {
    /// Registers `node` under `name`, replacing any earlier entry
    pub fn add(&mut self, name: impl Into<String>, node: Node) {
        let name = name.into();
        log::debug!("cataloging {node:?} as {name}");
        self.entries.insert(name, node);
    }

    #[inline]
    pub fn lookup(&self, name: &str) -> Option<&Node> {
        self.entries.get(name)
    }

    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies the arguments to the node registered under `name` and reduces
    /// the result to a plain value
    pub fn invoke<K: Into<String>>(
        &self,
        name: &str,
        args: Vec<Argument>,
        kwargs: impl IntoIterator<Item = (K, Argument)>,
        dispatcher: &Dispatcher,
    ) -> Result<Payload> {
        let node = self
            .lookup(name)
            .ok_or_else(|| Error::NotInCatalog(name.to_string()))?;
        dispatcher.evaluate(&node.apply(args, kwargs)?)
    }
}
