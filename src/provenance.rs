//! Construction history of nodes and the identifiers derived from it.
//!
//! Provenance is kept oldest event first. A node's identifier is its own URI
//! when it has one; otherwise it is the identifier of the node its newest
//! event was built from, followed by that event's segment:
//!
//! ```text
//! id(node) = uri(node)                          if the node has a URI
//!          | id(source(last)) "/" segment(last) if the node has provenance
//!          | root "/" Kind_hash8(repr(node))    otherwise
//! ```
//!
//! `Apply` segments hash the bound arguments (`apply_<hash8>`), `Execute`
//! segments name the executor. Explicit URIs are normalized: `::` becomes
//! `/` and source suffixes (`.py`, `.ipynb`) are dropped.

use indexmap::IndexMap;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, rc::Rc};

use crate::{
    dispatch::Name,
    function::{Argument, Node},
    identifier::Identifier,
    paths::short_hash,
};

const SEGMENT_HASH_LEN: usize = 8;

static SOURCE_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.(py|ipynb)(/|@|$)").expect("source suffix pattern is a valid regex")
});

/// One construction step
#[derive(Clone)]
pub enum Event {
    /// Arguments bound against `base`'s signature
    Apply {
        base: Node,
        args: Vec<Argument>,
        kwargs: IndexMap<String, Argument>,
    },
    /// Reduction of the nullary `source` by the named executor
    Execute { executor: Name, source: Node },
}

impl Event {
    /// The node this event was applied to
    #[inline]
    pub fn source(&self) -> &Node {
        match self {
            Self::Apply { base, .. } => base,
            Self::Execute { source, .. } => source,
        }
    }

    /// Path segment this event contributes to derived identifiers
    pub fn segment(&self, root: &str) -> String {
        match self {
            Self::Apply { args, kwargs, .. } => format!(
                "apply_{}",
                short_hash(arguments_text(args, kwargs, root), SEGMENT_HASH_LEN)
            ),
            Self::Execute { executor, .. } => executor.to_string(),
        }
    }

    /// Stable textual form, used for fingerprints
    pub fn render(&self, root: &str) -> String {
        match self {
            Self::Apply { base, args, kwargs } => format!(
                "Apply({}, {})",
                base.identifier(root),
                arguments_text(args, kwargs, root)
            ),
            Self::Execute { executor, source } => {
                format!("Execute({executor}, {})", source.identifier(root))
            }
        }
    }
}

fn argument_text(arg: &Argument, root: &str) -> String {
    match arg {
        // `serde_json` maps are ordered by key, so this rendering is canonical
        Argument::Value(payload) => payload.to_string(),
        Argument::Node(node) => node.identifier(root),
    }
}

/// `[a, b]{k=v, ...}`, keywords sorted by name
pub(crate) fn arguments_text(
    args: &[Argument],
    kwargs: &IndexMap<String, Argument>,
    root: &str,
) -> String {
    let args = args.iter().map(|a| argument_text(a, root)).join(", ");
    let kwargs = kwargs
        .iter()
        .sorted_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(k, v)| format!("{k}={}", argument_text(v, root)))
        .join(", ");
    format!("[{args}]{{{kwargs}}}")
}

/// Append-only event sequence, oldest first. Extending it yields a new
/// sequence; the events themselves are shared.
#[derive(Clone, Default)]
pub struct Provenance {
    events: Vec<Rc<Event>>,
}

impl Provenance {
    /// A new provenance made of `self` followed by `event`
    pub fn then(&self, event: Event) -> Provenance {
        let mut events = self.events.clone();
        events.push(Rc::new(event));
        Provenance { events }
    }

    #[inline]
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|e| e.as_ref())
    }

    #[inline]
    pub fn last(&self) -> Option<&Event> {
        self.events.last().map(|e| e.as_ref())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// One rendered event per line
    pub fn render(&self, root: &str) -> String {
        self.events().map(|e| e.render(root)).join("\n")
    }
}

impl fmt::Debug for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.events().map(|e| e.render(crate::config::DEFAULT_IDENTIFIER_ROOT)))
            .finish()
    }
}

/// Rewrites an explicit URI into identifier form
pub fn normalize(uri: &str) -> String {
    let uri = uri.replace("::", "/");
    SOURCE_SUFFIX_RE.replace_all(&uri, "$2").into_owned()
}

fn origin_segment(node: &Node) -> String {
    let (kind, repr) = match node {
        Node::Function(f) => ("Function", format!("{f:?}")),
        Node::Value(v) => ("Value", v.payload().to_string()),
    };
    format!("{kind}_{}", short_hash(repr, SEGMENT_HASH_LEN))
}

/// See the module documentation for the derivation rules
pub fn identifier(node: &Node, root: &str) -> String {
    if let Some(uri) = node.uri() {
        return normalize(&uri.to_string());
    }
    let id = match node.provenance().last() {
        Some(event) => format!("{}/{}", identifier(event.source(), root), event.segment(root)),
        None => origin_segment(node),
    };
    if Identifier::is_parseable(&id) {
        id
    } else {
        log::debug!("rooting derived identifier {id} under {root}");
        format!("{}/{id}", root.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use serde_json::json;

    use super::*;
    use crate::{
        config::DEFAULT_IDENTIFIER_ROOT as ROOT,
        function::{Parameter, Signature},
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

    #[test]
    fn test_normalize() {
        expect!["file://tests/data/filewithfunc/examplefunc"]
            .assert_eq(&normalize("file://tests/data/filewithfunc.py::examplefunc"));
        expect!["ipynb+file://tests/data/func@oda_version=v1"]
            .assert_eq(&normalize("ipynb+file://tests/data/func.ipynb@oda_version=v1"));
        expect!["https://host/pyramid.pyc/x"].assert_eq(&normalize("https://host/pyramid.pyc/x"));
    }

    #[test]
    fn test_arguments_text_sorts_keywords() {
        let kwargs = [("z", Argument::from(3)), ("a", Argument::from("s"))]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        expect![[r#"[1, {"a":1,"b":2}]{a="s", z=3}"#]].assert_eq(&arguments_text(
            &[1.into(), json!({"b": 2, "a": 1}).into()],
            &kwargs,
            ROOT,
        ));
    }

    #[test]
    fn test_identifier_shape() {
        let f = add();
        let id = f.identifier(ROOT);
        assert!(id.starts_with("file:///tmp/provfn/Function_"));
        let f0 = f.apply(vec![1.into(), 2.into()], [("z", 3.into())]).unwrap();
        let id0 = f0.identifier(ROOT);
        assert!(id0.starts_with(&format!("{id}/apply_")));
        assert_eq!(id0.len(), id.len() + "/apply_".len() + 8);
        assert!(Identifier::is_parseable(&id0));
    }

    #[test]
    fn test_native_identity_is_name_and_signature() {
        let sub = |name: &str| {
            Node::native(name, add().as_function().unwrap().signature().clone(), |args| {
                Ok(json!(args.get_as::<i64>("x")? - args.get_as::<i64>("y")?))
            })
        };
        assert_eq!(sub("add").identifier(ROOT), add().identifier(ROOT));
        assert_ne!(sub("sub").identifier(ROOT), add().identifier(ROOT));
        let signature = Signature::new([Parameter::positional("x"), Parameter::positional("y")]);
        let add2 = Node::native("add", signature, |_| Ok(json!(0)));
        assert_ne!(add2.identifier(ROOT), add().identifier(ROOT));
    }

    #[test]
    fn test_identifier_determinism() {
        let a = add().apply(vec![1.into(), 2.into()], [("z", 3.into())]).unwrap();
        let b = add().apply(vec![1.into(), 2.into()], [("z", 3.into())]).unwrap();
        assert_eq!(a.identifier(ROOT), b.identifier(ROOT));
        let c = add().apply(vec![1.into(), 2.into()], [("z", 4.into())]).unwrap();
        assert_ne!(a.identifier(ROOT), c.identifier(ROOT));
        // keyword order does not matter
        let d = add()
            .apply(vec![], [("y", 2.into()), ("x", 1.into()), ("z", 3.into())])
            .unwrap();
        let e = add()
            .apply(vec![], [("x", 1.into()), ("z", 3.into()), ("y", 2.into())])
            .unwrap();
        assert_eq!(d.identifier(ROOT), e.identifier(ROOT));
    }

    #[test]
    fn test_nested_arguments_contribute() {
        let inc = Node::native("inc", Signature::new([Parameter::positional("x")]), |args| {
            Ok(json!(args.get_as::<i64>("x")? + 1))
        });
        let one = inc.call(vec![1.into()]).unwrap();
        let two = inc.call(vec![2.into()]).unwrap();
        let a = add().call(vec![one.into(), 1.into()]).unwrap();
        let b = add().call(vec![two.into(), 1.into()]).unwrap();
        assert_ne!(a.identifier(ROOT), b.identifier(ROOT));
    }

    #[test]
    fn test_root_is_configurable() {
        let f0 = add().call(vec![1.into(), 2.into()]).unwrap();
        let id = f0.identifier("https://example.org/ontology/");
        assert!(id.starts_with("https://example.org/ontology/Function_"));
    }

    #[test]
    fn test_render() {
        let f0 = add().apply(vec![1.into(), 2.into()], [("z", 3.into())]).unwrap();
        let rendered = f0.provenance().render(ROOT);
        assert!(rendered.starts_with("Apply(file:///tmp/provfn/Function_"));
        assert!(rendered.ends_with(", [1, 2]{z=3})"));
    }
}
