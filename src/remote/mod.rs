//! Callables retrieved from URIs.
//!
//! Source bytes are fetched through [`Fetch`], then handed to the first
//! [`SourceAdapter`] able to read parameters out of them. The resulting nodes
//! are remote callables: their identifier is the URI they were loaded from,
//! and the `memo` strategy checks their revision before trusting a result.

mod adapter;
mod loader;
mod notebook;
mod python;

pub use adapter::{AdapterRegistry, SourceAdapter};
pub use loader::Loader;
pub use notebook::NotebookAdapter;
pub use python::PythonAdapter;

use std::{fmt, rc::Rc};

use crate::{
    error::{Error, Result},
    identifier::{Identifier, Scheme},
};

/// Retrieval of the raw bytes an identifier points at. Blocking, no retries.
pub trait Fetch {
    fn fetch(&self, identifier: &Identifier) -> Result<Vec<u8>>;
}

/// Reads `file://` identifiers from disk and `http(s)://` ones over the network
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFetcher;

impl Fetch for DefaultFetcher {
    fn fetch(&self, identifier: &Identifier) -> Result<Vec<u8>> {
        let location = identifier.location();
        let fetch_error = |reason: String| Error::Fetch {
            location: location.clone(),
            reason,
        };
        match identifier.scheme {
            Scheme::File => {
                log::debug!("reading {location}");
                std::fs::read(&identifier.path).map_err(|e| fetch_error(e.to_string()))
            }
            Scheme::Http | Scheme::Https => {
                log::info!("fetching {location}");
                let response = reqwest::blocking::get(&location)
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| fetch_error(e.to_string()))?;
                let bytes = response.bytes().map_err(|e| fetch_error(e.to_string()))?;
                Ok(bytes.to_vec())
            }
        }
    }
}

/// What a remote callable keeps of its origin: the identifier it was loaded
/// under, the adapter that read it and the bytes it was read from.
#[derive(Clone)]
pub struct RemoteBinding {
    identifier: Identifier,
    adapter: Rc<dyn SourceAdapter>,
    fetcher: Rc<dyn Fetch>,
    source: Rc<[u8]>,
}

impl RemoteBinding {
    pub(crate) fn new(
        identifier: Identifier,
        adapter: Rc<dyn SourceAdapter>,
        fetcher: Rc<dyn Fetch>,
        source: Rc<[u8]>,
    ) -> Self {
        Self {
            identifier,
            adapter,
            fetcher,
            source,
        }
    }

    #[inline]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The revision token the identifier declares
    #[inline]
    pub fn revision(&self) -> Option<&str> {
        self.identifier.revision.as_deref()
    }

    /// Source bytes as fetched at load time
    #[inline]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    #[inline]
    pub fn adapter(&self) -> &dyn SourceAdapter {
        self.adapter.as_ref()
    }

    /// Fetches the source again and asks the adapter for its current revision
    pub fn observe_revision(&self) -> Result<Option<String>> {
        let bytes = self.fetcher.fetch(&self.identifier)?;
        self.adapter.extract_version(&self.identifier, &bytes)
    }
}

impl fmt::Debug for RemoteBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteBinding({} via {})", self.identifier, self.adapter.name())
    }
}
