#![allow(dead_code)]

use camino::Utf8Path;
use serde_json::json;
use std::{cell::Cell, rc::Rc};
use tempfile::TempDir;

use provfn::{
    function::{Arguments, Parameter, Payload, Signature},
    remote::{AdapterRegistry, DefaultFetcher, SourceAdapter},
    Config, Dispatcher, Error, Identifier, Loader, Result,
};

/// A temporary directory used as the home of a test
pub trait HomeDir {
    fn utf8_path(&self) -> &Utf8Path;

    fn config(&self) -> Config {
        Config::with_home(self.utf8_path())
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.config())
    }

    /// Writes a summing source declaring `version` and returns its URI
    fn write_sum_source(&self, name: &str, version: Option<&str>) -> String {
        let path = self.utf8_path().join(format!("{name}.sum.json"));
        let source = json!({
            "version": version,
            "params": ["x", "y"],
            "defaults": {"z": 1},
        });
        std::fs::write(&path, serde_json::to_vec(&source).unwrap()).unwrap();
        format!("file://{path}")
    }
}

impl HomeDir for TempDir {
    fn utf8_path(&self) -> &Utf8Path {
        Utf8Path::from_path(self.path()).unwrap()
    }
}

/// Reads `*.sum.json` sources: positional parameters without defaults, then
/// defaulted ones. Running them sums every argument and counts the calls.
#[derive(Clone, Default)]
pub struct SumAdapter {
    pub calls: Rc<Cell<usize>>,
}

fn description(identifier: &Identifier, source: &[u8]) -> Result<Payload> {
    serde_json::from_slice(source).map_err(|e| Error::Adapter {
        location: identifier.to_string(),
        reason: e.to_string(),
    })
}

impl SourceAdapter for SumAdapter {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn accepts(&self, identifier: &Identifier) -> bool {
        identifier.path.ends_with(".sum.json")
    }

    fn extract_parameters(&self, identifier: &Identifier, source: &[u8]) -> Result<Signature> {
        let description = description(identifier, source)?;
        let mut params = Vec::new();
        for name in description["params"].as_array().into_iter().flatten() {
            params.push(Parameter::positional(name.as_str().unwrap_or_default()));
        }
        for (name, default) in description["defaults"].as_object().into_iter().flatten() {
            params.push(Parameter::positional(name.as_str()).with_default(default.clone()));
        }
        Ok(Signature::new(params))
    }

    fn extract_version(&self, identifier: &Identifier, source: &[u8]) -> Result<Option<String>> {
        let description = description(identifier, source)?;
        Ok(description["version"].as_str().map(|v| format!("version={v}")))
    }

    fn run(&self, _identifier: &Identifier, _source: &[u8], args: &Arguments) -> Result<Payload> {
        self.calls.set(self.calls.get() + 1);
        let sum: i64 = args.iter().filter_map(|(_, v)| v.as_i64()).sum();
        Ok(json!(sum))
    }
}

/// A loader knowing only [`SumAdapter`], together with its call counter
pub fn sum_loader() -> (Loader, Rc<Cell<usize>>) {
    let adapter = SumAdapter::default();
    let calls = adapter.calls.clone();
    let mut adapters = AdapterRegistry::default();
    adapters.register(adapter);
    (Loader::with_adapters(adapters, Rc::new(DefaultFetcher)), calls)
}
