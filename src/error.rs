use thiserror::Error;

use crate::function::{NodeKind, ValueKind};

/// Failures surfaced by binding, dispatch, reduction and the persistent stores.
///
/// Nothing in the crate retries; every variant reaches the immediate caller,
/// except [`Error::CacheLoad`], which the caching strategies log and treat as a
/// miss.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot bind arguments to {signature}: {reason}")]
    Binding { signature: String, reason: String },

    #[error(
        "found non-0 signature: {signature} ({remaining} unbound), \
         apply the remaining arguments before reducing"
    )]
    Arity { signature: String, remaining: usize },

    #[error("all executors gave up on {node:?} node requested as {requested:?}")]
    DispatchExhausted { node: NodeKind, requested: ValueKind },

    #[error("unable to parse identifier {0}")]
    UnparseableIdentifier(String),

    #[error("can not load from cache {location}: {reason}")]
    CacheLoad { location: String, reason: String },

    #[error("revision mismatch for {source_id}: declared {declared:?}, observed {actual:?}")]
    RevisionMismatch {
        source_id: String,
        declared: Option<String>,
        actual: Option<String>,
    },

    #[error("{count} memoized results for ({source_id}, {executor})")]
    AmbiguousMemo {
        source_id: String,
        executor: String,
        count: usize,
    },

    #[error("unable to fetch {location}: {reason}")]
    Fetch { location: String, reason: String },

    #[error("scheme {0} does not support writing")]
    UnsupportedScheme(String),

    #[error("source adapter failed on {location}: {reason}")]
    Adapter { location: String, reason: String },

    #[error("no function named {0} in the catalog")]
    NotInCatalog(String),

    #[error("procedure {name} failed: {source}")]
    Procedure {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn binding(signature: impl ToString, reason: impl Into<String>) -> Self {
        Self::Binding {
            signature: signature.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn adapter(location: impl ToString, reason: impl ToString) -> Self {
        Self::Adapter {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }
}
