//! Parameterized notebooks.
//!
//! The code cell tagged `parameters` declares the inputs, one `name = literal`
//! assignment per line, all of them keyword-only. The notebook metadata key
//! `oda_version` carries the revision, reported as `oda_version=<version>`.
//! Execution is delegated to an external runner command which receives the
//! notebook path as its last argument, the keyword arguments as JSON on stdin
//! and prints the notebook outputs as a JSON object.

use camino::Utf8PathBuf;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{Error, Result},
    function::{Arguments, Parameter, Payload, Signature},
    identifier::{Identifier, Modifier},
    paths::{short_hash, write_atomically},
};

use super::{adapter::run_json_command, python::parse_literal, SourceAdapter};

const VERSION_KEY: &str = "oda_version";
const PARAMETERS_TAG: &str = "parameters";

static ASSIGNMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z_]\w*)\s*(:[^=]*)?=\s*(?P<value>.+)$")
        .expect("assignment is a valid regex")
});

#[derive(Deserialize)]
struct Notebook {
    cells: Vec<Cell>,
    #[serde(default)]
    metadata: serde_json::Map<String, Payload>,
}

#[derive(Deserialize)]
struct Cell {
    cell_type: String,
    #[serde(default)]
    metadata: CellMetadata,
    #[serde(default)]
    source: CellSource,
}

#[derive(Deserialize, Default)]
struct CellMetadata {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CellSource {
    Lines(Vec<String>),
    Text(String),
}

impl Default for CellSource {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl CellSource {
    fn text(&self) -> String {
        match self {
            Self::Lines(lines) => lines.concat(),
            Self::Text(text) => text.clone(),
        }
    }
}

fn parse_notebook(identifier: &Identifier, source: &[u8]) -> Result<Notebook> {
    serde_json::from_slice(source).map_err(|e| Error::adapter(identifier, e))
}

/// Reads the right-hand side of an assignment, retrying without a trailing
/// comment
fn assigned_literal(value: &str) -> Option<Payload> {
    parse_literal(value).or_else(|| {
        let (code, _comment) = value.split_once('#')?;
        parse_literal(code)
    })
}

fn parameters_of(notebook: &Notebook) -> std::result::Result<Signature, String> {
    let Some(cell) = notebook
        .cells
        .iter()
        .find(|c| c.cell_type == "code" && c.metadata.tags.iter().any(|t| t == PARAMETERS_TAG))
    else {
        return Ok(Signature::default());
    };

    let mut params = Vec::new();
    for line in cell.source.text().lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let captures = ASSIGNMENT_RE
            .captures(line)
            .ok_or_else(|| format!("not an assignment: {line}"))?;
        let value = &captures["value"];
        let default =
            assigned_literal(value).ok_or_else(|| format!("not a literal: {value}"))?;
        params.push(Parameter::keyword_only(&captures["name"]).with_default(default));
    }
    Ok(Signature::new(params))
}

fn version_of(notebook: &Notebook) -> Option<String> {
    let version = match notebook.metadata.get(VERSION_KEY)? {
        Payload::String(s) => s.clone(),
        Payload::Null => return None,
        other => other.to_string(),
    };
    Some(format!("{VERSION_KEY}={version}"))
}

/// Notebooks, addressed as `ipynb+scheme://path` or by a `.ipynb` path
#[derive(Clone, Debug)]
pub struct NotebookAdapter {
    runner: Vec<String>,
    scratch_dir: Utf8PathBuf,
}

impl NotebookAdapter {
    /// Remote notebooks are written under `scratch_dir` before running
    #[inline]
    pub fn new(runner: Vec<String>, scratch_dir: Utf8PathBuf) -> Self {
        Self { runner, scratch_dir }
    }

    /// A local path holding `source`, for the runner to open
    fn materialize(&self, identifier: &Identifier, source: &[u8]) -> Result<Utf8PathBuf> {
        if let Some(path) = identifier.local_path() {
            return Ok(path);
        }
        let path = self
            .scratch_dir
            .join(format!("{}{}", short_hash(source, 16), Modifier::Ipynb.suffix()));
        if !path.exists() {
            write_atomically(&path, source)?;
            log::debug!("wrote {identifier} to {path}");
        }
        Ok(path)
    }
}

impl SourceAdapter for NotebookAdapter {
    fn name(&self) -> &'static str {
        "notebook"
    }

    fn accepts(&self, identifier: &Identifier) -> bool {
        match identifier.modifier {
            Some(modifier) => modifier == Modifier::Ipynb,
            None => identifier.member.is_none() && identifier.path.ends_with(Modifier::Ipynb.suffix()),
        }
    }

    fn extract_parameters(&self, identifier: &Identifier, source: &[u8]) -> Result<Signature> {
        let notebook = parse_notebook(identifier, source)?;
        let signature = parameters_of(&notebook).map_err(|reason| Error::adapter(identifier, reason))?;
        log::info!("parameter definitions of {identifier}: {signature}");
        Ok(signature)
    }

    fn extract_version(&self, identifier: &Identifier, source: &[u8]) -> Result<Option<String>> {
        Ok(version_of(&parse_notebook(identifier, source)?))
    }

    fn run(&self, identifier: &Identifier, source: &[u8], args: &Arguments) -> Result<Payload> {
        let path = self.materialize(identifier, source)?;
        let kwargs = serde_json::to_vec(&args.to_object())?;
        let outputs = run_json_command(&self.runner, &[path.as_str()], &kwargs, identifier)?;
        if !outputs.is_object() {
            return Err(Error::adapter(identifier, format!("outputs are not an object: {outputs}")));
        }
        Ok(json!({ "output_values": outputs }))
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use indexmap::IndexMap;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::test_utils::HomeDir;

    fn notebook(parameters: &str, version: Payload) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "cells": [
                {"cell_type": "markdown", "metadata": {}, "source": ["# Title\n"]},
                {
                    "cell_type": "code",
                    "metadata": {"tags": ["parameters"]},
                    "source": parameters.split_inclusive('\n').collect::<Vec<_>>(),
                },
                {"cell_type": "code", "metadata": {}, "source": "y = input_x + 1"},
            ],
            "metadata": {"oda_version": version},
            "nbformat": 4,
            "nbformat_minor": 5,
        }))
        .unwrap()
    }

    fn adapter(home: &TempDir, runner: &[&str]) -> NotebookAdapter {
        NotebookAdapter::new(
            runner.iter().map(|s| s.to_string()).collect(),
            home.utf8_path().join("notebooks"),
        )
    }

    #[test]
    fn test_parameters_and_version() {
        let home = tempdir().unwrap();
        let adapter = adapter(&home, &["true"]);
        let id = Identifier::parse("ipynb+file://tests/data/func.ipynb").unwrap();
        let source = notebook(
            "# inputs\ninput_x = 1  # the input\nlabel: str = 'x'\nflag = True\n",
            json!("v1"),
        );

        let signature = adapter.extract_parameters(&id, &source).unwrap();
        expect![[r#"(*, input_x=1, label="x", flag=true)"#]].assert_eq(&signature.to_string());
        assert_eq!(
            adapter.extract_version(&id, &source).unwrap().as_deref(),
            Some("oda_version=v1")
        );
        let unversioned = notebook("", Payload::Null);
        assert_eq!(adapter.extract_version(&id, &unversioned).unwrap(), None);
        assert!(adapter.extract_parameters(&id, &unversioned).unwrap().is_nullary());
    }

    #[test]
    fn test_invalid_notebooks() {
        let home = tempdir().unwrap();
        let adapter = adapter(&home, &["true"]);
        let id = Identifier::parse("ipynb+file://x.ipynb").unwrap();
        assert!(matches!(
            adapter.extract_parameters(&id, b"def f(): pass"),
            Err(Error::Adapter { .. })
        ));
        let source = notebook("x = compute()\n", json!("v1"));
        assert!(matches!(
            adapter.extract_parameters(&id, &source),
            Err(Error::Adapter { ref reason, .. }) if reason.contains("compute()")
        ));
    }

    #[test]
    fn test_accepts() {
        let home = tempdir().unwrap();
        let adapter = adapter(&home, &["true"]);
        for (uri, accepted) in [
            ("ipynb+file://tests/data/func.ipynb", true),
            ("ipynb+https://host/nb", true),
            ("file://tests/data/func.ipynb", true),
            ("file://tests/data/func.ipynb::f", false),
            ("py+file://tests/data/func.ipynb", false),
            ("file://tests/data/func.py", false),
        ] {
            assert_eq!(adapter.accepts(&Identifier::parse(uri).unwrap()), accepted, "{uri}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_through_runner() {
        let home = tempdir().unwrap();
        // echoes the keyword arguments back as the outputs
        let adapter = adapter(&home, &["sh", "-c", "test -f \"$1\" && cat", "runner"]);
        let id = Identifier::parse("ipynb+https://host/func.ipynb").unwrap();
        let source = notebook("input_x = 1\n", json!("v1"));
        let args = Arguments(IndexMap::from_iter([("input_x".to_string(), json!(10))]));

        let result = adapter.run(&id, &source, &args).unwrap();
        assert_eq!(result, json!({"output_values": {"input_x": 10}}));
        // remote sources are materialized for the runner
        assert_eq!(std::fs::read_dir(home.utf8_path().join("notebooks")).unwrap().count(), 1);
    }
}
