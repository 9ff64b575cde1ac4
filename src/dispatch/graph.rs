//! The persistent triple set behind the `memo` executor.
//!
//! Each triple maps `(source identity, executor identity)` to a result
//! identity. The write path keeps a single triple per pair; a store holding
//! several is reported by the executor as ambiguous.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    paths::write_atomically,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

#[derive(Debug, Default)]
pub struct MemoGraph {
    triples: IndexSet<Triple>,
}

impl MemoGraph {
    /// Loads the graph persisted at `path`; a missing file is an empty graph
    pub fn load(path: &Utf8Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no memo graph at {path} yet");
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        let triples: Vec<Triple> = serde_json::from_slice(&bytes)?;
        log::info!("loaded {} memoized results from {path}", triples.len());
        Ok(Self {
            triples: triples.into_iter().collect(),
        })
    }

    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        let triples = self.triples.iter().collect::<Vec<_>>();
        write_atomically(path, &serde_json::to_vec_pretty(&triples)?)
    }

    /// Objects recorded for `(subject, predicate)`, in insertion order
    pub fn objects(&self, subject: &str, predicate: &str) -> Vec<&str> {
        self.triples
            .iter()
            .filter(|t| t.subject == subject && t.predicate == predicate)
            .map(|t| t.object.as_str())
            .collect()
    }

    /// Maps `(subject, predicate)` to `object`, dropping whatever the pair was
    /// mapped to before
    pub fn record(&mut self, subject: &str, predicate: &str, object: &str) {
        self.triples
            .retain(|t| !(t.subject == subject && t.predicate == predicate));
        self.triples.insert(Triple {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
        });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }
}

/// Location of a graph on disk together with its loaded content
#[derive(Debug)]
pub(crate) struct PersistedGraph {
    pub(crate) path: Utf8PathBuf,
    pub(crate) graph: MemoGraph,
}

impl PersistedGraph {
    /// Opens the graph at `path`. An unreadable graph is logged and replaced
    /// by an empty one, like any other unreadable cache content.
    pub(crate) fn open(path: Utf8PathBuf) -> Self {
        let graph = MemoGraph::load(&path).unwrap_or_else(|e| {
            let e = Error::CacheLoad {
                location: path.to_string(),
                reason: e.to_string(),
            };
            log::warn!("{e}, starting from an empty memo graph");
            MemoGraph::default()
        });
        Self { path, graph }
    }

    #[inline]
    pub(crate) fn persist(&self) -> Result<()> {
        self.graph.save(&self.path)
    }
}
