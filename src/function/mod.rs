//! Expression nodes: deferred computations that are bound argument by
//! argument and reduced to values by the dispatcher.

mod procedure;
mod signature;
mod value;

pub use procedure::{Arguments, Native, Procedure};
pub use signature::{Bindings, ParamKind, Parameter, Signature};
pub use value::Value;

use indexmap::IndexMap;
use std::{fmt, rc::Rc};

use crate::{
    error::{Error, Result},
    identifier::Identifier,
    provenance::{self, Event, Provenance},
    remote::RemoteBinding,
};

/// Materialized data carried by values and literal arguments
pub type Payload = serde_json::Value;

/// Runtime kind of a node, as matched against the kinds strategies accept
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Callable,
    RemoteCallable,
    Value,
    RemoteValue,
}

impl NodeKind {
    /// Whether a node of kind `self` can stand where `other` is expected
    pub fn is_a(self, other: NodeKind) -> bool {
        self == other
            || matches!(
                (self, other),
                (Self::RemoteCallable, Self::Callable) | (Self::RemoteValue, Self::Value)
            )
    }
}

/// Kind of value a reduction produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Value,
    RemoteValue,
}

impl ValueKind {
    /// Whether `self` is `other` or a specialization of it
    pub fn specializes(self, other: ValueKind) -> bool {
        self == other || (self == Self::RemoteValue && other == Self::Value)
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "Value",
            Self::RemoteValue => "RemoteValue",
        }
    }
}

/// An argument bound to a parameter: either literal data or another node,
/// which is only reduced when the receiving node is.
#[derive(Clone, Debug)]
pub enum Argument {
    Value(Payload),
    Node(Node),
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Node(a), Self::Node(b)) => {
                let root = crate::config::DEFAULT_IDENTIFIER_ROOT;
                a.identifier(root) == b.identifier(root)
            }
            _ => false,
        }
    }
}

macro_rules! argument_from_payload {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Argument {
                #[inline]
                fn from(v: $t) -> Self {
                    Self::Value(Payload::from(v))
                }
            }
        )*
    };
}

argument_from_payload!(bool, i32, i64, u32, u64, f64, &str, String, Payload);

impl From<Node> for Argument {
    #[inline]
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<&Node> for Argument {
    #[inline]
    fn from(node: &Node) -> Self {
        Self::Node(node.clone())
    }
}

/// A callable node: a procedure, the arguments bound to it so far and the
/// signature of what is still unbound.
#[derive(Clone)]
pub struct Function {
    procedure: Rc<dyn Procedure>,
    signature: Signature,
    bindings: Bindings,
    remote: Option<Rc<RemoteBinding>>,
    uri: Option<Identifier>,
    provenance: Provenance,
    cached: bool,
}

impl Function {
    pub fn new(procedure: Rc<dyn Procedure>) -> Self {
        let signature = procedure.signature().clone();
        Self {
            procedure,
            signature,
            bindings: Bindings::default(),
            remote: None,
            uri: None,
            provenance: Provenance::default(),
            cached: false,
        }
    }

    /// A callable whose procedure was retrieved from `binding`'s location
    pub(crate) fn remote(procedure: Rc<dyn Procedure>, binding: RemoteBinding) -> Self {
        let mut function = Self::new(procedure);
        function.uri = Some(binding.identifier().clone());
        function.remote = Some(Rc::new(binding));
        function
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.procedure.name()
    }

    #[inline]
    pub fn procedure(&self) -> &Rc<dyn Procedure> {
        &self.procedure
    }

    /// Signature of the parameters that are still unbound
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.signature.arity()
    }

    #[inline]
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    #[inline]
    pub fn remote_binding(&self) -> Option<&RemoteBinding> {
        self.remote.as_deref()
    }

    #[inline]
    pub fn uri(&self) -> Option<&Identifier> {
        self.uri.as_ref()
    }

    #[inline]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    #[inline]
    pub fn is_cached(&self) -> bool {
        self.cached
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function {}: {}]", self.name(), self.signature)?;
        if let Some(uri) = &self.uri {
            write!(f, ":[{uri}]")?;
        }
        Ok(())
    }
}

/// Any expression node. Nodes are immutable: binding arguments returns a new
/// node whose provenance extends the receiver's.
#[derive(Clone)]
pub enum Node {
    Function(Rc<Function>),
    Value(Rc<Value>),
}

impl Node {
    /// A callable node backed by a Rust closure.
    ///
    /// The closure itself has no stable identity across processes, so the
    /// node is identified by `name` and `signature` alone. Cached nodes built
    /// from different closures must therefore use distinct names, or they
    /// share cache entries.
    pub fn native<B>(name: impl Into<String>, signature: Signature, body: B) -> Self
    where
        B: Fn(&Arguments) -> anyhow::Result<Payload> + 'static,
    {
        Self::Function(Rc::new(Function::new(Rc::new(Native::new(
            name, signature, body,
        )))))
    }

    #[inline]
    pub fn value(payload: impl Into<Payload>) -> Self {
        Self::Value(Rc::new(Value::new(payload.into())))
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Function(f) if f.remote.is_some() => NodeKind::RemoteCallable,
            Self::Function(_) => NodeKind::Callable,
            Self::Value(v) if v.location().is_some() => NodeKind::RemoteValue,
            Self::Value(_) => NodeKind::Value,
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        match self {
            Self::Function(f) => f.arity(),
            Self::Value(_) => 0,
        }
    }

    #[inline]
    pub fn provenance(&self) -> &Provenance {
        match self {
            Self::Function(f) => &f.provenance,
            Self::Value(v) => v.provenance(),
        }
    }

    /// The explicitly supplied identifier, if any
    #[inline]
    pub fn uri(&self) -> Option<&Identifier> {
        match self {
            Self::Function(f) => f.uri.as_ref(),
            Self::Value(v) => v.location(),
        }
    }

    /// The node's own identifier if it has one, otherwise the one derived from
    /// its provenance, rooted under `root` when the origin has no URI
    #[inline]
    pub fn identifier(&self, root: &str) -> String {
        provenance::identifier(self, root)
    }

    #[inline]
    pub fn is_cached(&self) -> bool {
        match self {
            Self::Function(f) => f.cached,
            Self::Value(_) => false,
        }
    }

    /// Marks the node as eligible for caching strategies
    pub fn cached(&self, cached: bool) -> Node {
        match self {
            Self::Function(f) => {
                let mut f = f.as_ref().clone();
                f.cached = cached;
                Self::Function(Rc::new(f))
            }
            Self::Value(_) => self.clone(),
        }
    }

    /// Binds arguments by position and name. Every parameter without a
    /// default must be bound; the result is nullary.
    pub fn apply<K: Into<String>>(
        &self,
        args: Vec<Argument>,
        kwargs: impl IntoIterator<Item = (K, Argument)>,
    ) -> Result<Node> {
        self.bind(args, collect_kwargs(kwargs), false)
    }

    /// Like [`Node::apply`], but parameters left unbound stay in the returned
    /// node's signature.
    pub fn partial<K: Into<String>>(
        &self,
        args: Vec<Argument>,
        kwargs: impl IntoIterator<Item = (K, Argument)>,
    ) -> Result<Node> {
        self.bind(args, collect_kwargs(kwargs), true)
    }

    /// Positional-only shorthand for [`Node::apply`]
    #[inline]
    pub fn call(&self, args: Vec<Argument>) -> Result<Node> {
        self.bind(args, IndexMap::default(), false)
    }

    fn bind(
        &self,
        args: Vec<Argument>,
        kwargs: IndexMap<String, Argument>,
        partial: bool,
    ) -> Result<Node> {
        match self {
            Self::Function(f) => {
                let (new_bindings, signature) =
                    f.signature.bind(args.clone(), kwargs.clone(), partial)?;
                let mut bindings = f.bindings.clone();
                bindings.extend(new_bindings);
                let provenance = f.provenance.then(Event::Apply {
                    base: self.clone(),
                    args,
                    kwargs,
                });
                Ok(Self::Function(Rc::new(Function {
                    procedure: f.procedure.clone(),
                    signature,
                    bindings,
                    remote: f.remote.clone(),
                    uri: None,
                    provenance,
                    cached: f.cached,
                })))
            }
            Self::Value(v) => {
                if !args.is_empty() || !kwargs.is_empty() {
                    return Err(Error::binding(
                        Signature::default(),
                        format!(
                            "takes 0 arguments but {} were given",
                            args.len() + kwargs.len()
                        ),
                    ));
                }
                let provenance = v.provenance().then(Event::Apply {
                    base: self.clone(),
                    args,
                    kwargs,
                });
                Ok(Self::Value(Rc::new(v.with_provenance(provenance))))
            }
        }
    }

    #[inline]
    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Self::Function(f) => Some(f),
            Self::Value(_) => None,
        }
    }

    #[inline]
    pub fn as_value(&self) -> Option<&Rc<Value>> {
        match self {
            Self::Value(v) => Some(v),
            Self::Function(_) => None,
        }
    }
}

fn collect_kwargs<K: Into<String>>(
    kwargs: impl IntoIterator<Item = (K, Argument)>,
) -> IndexMap<String, Argument> {
    kwargs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

impl From<Function> for Node {
    #[inline]
    fn from(function: Function) -> Self {
        Self::Function(Rc::new(function))
    }
}

impl From<Value> for Node {
    #[inline]
    fn from(value: Value) -> Self {
        Self::Value(Rc::new(value))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(func) => func.fmt(f),
            Self::Value(value) => value.fmt(f),
        }
    }
}
