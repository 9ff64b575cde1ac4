use indexmap::IndexMap;

use crate::{
    error::{Error, Result},
    function::{Argument, Arguments, Function, Node, NodeKind, Value, ValueKind},
    provenance::Event,
};

use super::{Descriptor, Dispatcher, Executor, Name};

pub(crate) const LOCAL: Name = Name("local");
pub(crate) const IDENTITY: Name = Name("identity");

/// Fails with [`Error::Arity`] unless `function` is nullary
pub(crate) fn check_nullary(function: &Function) -> Result<()> {
    if function.arity() == 0 {
        Ok(())
    } else {
        Err(Error::Arity {
            signature: function.signature().to_string(),
            remaining: function.arity(),
        })
    }
}

/// Resolves every bound argument, depth-first and left to right (positional
/// bindings before keyword ones), then fills unbound parameters with their
/// defaults, in the procedure's declaration order.
fn resolve_arguments(function: &Function, dispatcher: &Dispatcher) -> Result<Arguments> {
    let mut resolved = IndexMap::with_capacity(function.bindings().len());
    for (name, arg) in function.bindings() {
        let payload = match arg {
            Argument::Value(payload) => payload.clone(),
            Argument::Node(node) => {
                log::debug!("resolving argument {name} = {node:?}");
                dispatcher.evaluate(node)?
            }
        };
        resolved.insert(name.clone(), payload);
    }

    let mut arguments = IndexMap::with_capacity(resolved.len());
    for param in function.procedure().signature().params() {
        let payload = match (resolved.swap_remove(&param.name), &param.default) {
            (Some(payload), _) => payload,
            (None, Some(default)) => default.clone(),
            (None, None) => {
                return Err(Error::binding(
                    function.procedure().signature(),
                    format!("missing a required argument: '{}'", param.name),
                ))
            }
        };
        arguments.insert(param.name.clone(), payload);
    }
    Ok(Arguments(arguments))
}

/// The base case every strategy builds on: invokes the procedure of a nullary
/// callable with its resolved arguments and records an `Execute` event naming
/// `executor`.
pub(crate) fn reduce_local(node: &Node, dispatcher: &Dispatcher, executor: Name) -> Result<Value> {
    let Node::Function(function) = node else {
        return Err(Error::DispatchExhausted {
            node: node.kind(),
            requested: ValueKind::Value,
        });
    };
    check_nullary(function)?;
    let arguments = resolve_arguments(function, dispatcher)?;
    log::info!("calling {} with {} arguments", function.name(), arguments.len());
    let payload = function
        .procedure()
        .call(&arguments)
        .map_err(|source| Error::Procedure {
            name: function.name().to_string(),
            source,
        })?;
    let provenance = node.provenance().then(Event::Execute {
        executor,
        source: node.clone(),
    });
    Ok(Value::computed(payload, provenance))
}

/// Plain in-process reduction of callables
pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn descriptor(&self) -> Descriptor {
        Descriptor {
            name: LOCAL,
            accepts: NodeKind::Callable,
            produces: ValueKind::Value,
            caching: false,
        }
    }

    fn execute(&self, node: &Node, dispatcher: &Dispatcher) -> Result<Value> {
        reduce_local(node, dispatcher, LOCAL)
    }
}

/// Values are already reduced
pub struct IdentityExecutor;

impl Executor for IdentityExecutor {
    fn descriptor(&self) -> Descriptor {
        Descriptor {
            name: IDENTITY,
            accepts: NodeKind::Value,
            produces: ValueKind::Value,
            caching: false,
        }
    }

    fn execute(&self, node: &Node, _dispatcher: &Dispatcher) -> Result<Value> {
        match node {
            Node::Value(value) => Ok(value.as_ref().clone()),
            Node::Function(_) => Err(Error::DispatchExhausted {
                node: node.kind(),
                requested: ValueKind::Value,
            }),
        }
    }
}
