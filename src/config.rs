use camino::{Utf8Path, Utf8PathBuf};

pub const DEFAULT_IDENTIFIER_ROOT: &str = "file:///tmp/provfn";

/// Settings threaded into the dispatcher, its strategies and the source
/// adapters. Nothing in the crate reads them from ambient state.
#[derive(Clone, Debug)]
pub struct Config {
    pub home_dir: Utf8PathBuf,
    /// Flat-file cache entries, one JSON file per provenance fingerprint
    pub cache_dir: Utf8PathBuf,
    /// Payloads of remote values derived from provenance
    pub values_dir: Utf8PathBuf,
    /// Memoization graph persisted by the `memo` strategy
    pub memo_path: Utf8PathBuf,
    /// Root prepended to identifiers whose origin has no URI of its own
    pub identifier_root: String,
    /// Selects caching strategies for every node, not only the ones marked as cached
    pub cache_everything: bool,
    pub python: Vec<String>,
    pub notebook_runner: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = home::home_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        Self::with_home(home_dir.join(".provfn"))
    }
}

impl Config {
    pub fn with_home(home_dir: impl AsRef<Utf8Path>) -> Self {
        let home_dir = home_dir.as_ref().to_path_buf();
        Self {
            cache_dir: home_dir.join("cache"),
            values_dir: home_dir.join("values"),
            memo_path: home_dir.join("memo.json"),
            home_dir,
            identifier_root: DEFAULT_IDENTIFIER_ROOT.to_string(),
            cache_everything: false,
            python: vec!["python3".to_string()],
            notebook_runner: vec!["provfn-nbrun".to_string()],
        }
    }

    #[inline]
    pub fn cache_everything(mut self, cache_everything: bool) -> Self {
        self.cache_everything = cache_everything;
        self
    }
}
