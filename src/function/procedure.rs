use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::fmt;

use super::{Payload, Signature};

/// Fully resolved arguments handed to a procedure, keyed by parameter name in
/// declaration order. Unbound parameters with defaults carry their default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments(pub(crate) IndexMap<String, Payload>);

impl Arguments {
    #[inline]
    pub fn get(&self, name: &str) -> anyhow::Result<&Payload> {
        self.0
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("argument '{name}' is not bound"))
    }

    /// Deserializes the argument named `name` into `T`
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let payload = self.get(name)?;
        serde_json::from_value(payload.clone())
            .map_err(|e| anyhow::anyhow!("argument '{name}' = {payload}: {e}"))
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Payload)> {
        self.0.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The arguments as a JSON object, as handed to external runners
    pub fn to_object(&self) -> serde_json::Map<String, Payload> {
        self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// The underlying unit of work of a callable node.
pub trait Procedure {
    /// Name used when rendering the node that wraps this procedure
    fn name(&self) -> &str;

    fn signature(&self) -> &Signature;

    fn call(&self, args: &Arguments) -> anyhow::Result<Payload>;
}

/// A procedure backed by a Rust closure
pub struct Native<B> {
    name: String,
    signature: Signature,
    body: B,
}

impl<B: Fn(&Arguments) -> anyhow::Result<Payload>> Native<B> {
    #[inline]
    pub fn new(name: impl Into<String>, signature: Signature, body: B) -> Self {
        Self {
            name: name.into(),
            signature,
            body,
        }
    }
}

impl<B: Fn(&Arguments) -> anyhow::Result<Payload>> Procedure for Native<B> {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn signature(&self) -> &Signature {
        &self.signature
    }

    #[inline]
    fn call(&self, args: &Arguments) -> anyhow::Result<Payload> {
        (self.body)(args)
    }
}

impl<B> fmt::Debug for Native<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native({}{})", self.name, self.signature)
    }
}
