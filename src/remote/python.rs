use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::{
    error::{Error, Result},
    function::{Arguments, Parameter, Payload, Signature},
    identifier::{Identifier, Modifier},
};

use super::{adapter::run_json_command, SourceAdapter};

/// Executes the source in a fresh namespace and calls the member with the
/// keyword arguments read from stdin. The result goes to stdout as JSON.
const RUNNER: &str = r#"
import json, sys
request = json.load(sys.stdin)
namespace = {"__name__": "provfn_source"}
exec(compile(request["source"], request["origin"], "exec"), namespace)
json.dump(namespace[request["member"]](**request["kwargs"]), sys.stdout)
"#;

static BARE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("bare name is a valid regex"));

/// Parses a Python literal of the JSON-compatible subset: numbers, strings,
/// `True`, `False`, `None` and JSON-shaped lists and dicts
pub(crate) fn parse_literal(text: &str) -> Option<Payload> {
    let text = text.trim();
    match text {
        "True" => return Some(Payload::Bool(true)),
        "False" => return Some(Payload::Bool(false)),
        "None" => return Some(Payload::Null),
        _ => (),
    }
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        let inner = &text[1..text.len() - 1];
        return Some(Payload::String(inner.replace("\\'", "'")));
    }
    serde_json::from_str(text).ok()
}

/// Splits a parameter list at top-level commas
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let (mut depth, mut quote, mut start) = (0usize, None, 0);
    for (i, c) in params.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => (),
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&params[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    parts.push(&params[start..]);
    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Offset of the `)` closing a parameter list that starts right after `(`
fn closing_paren(text: &str) -> Option<usize> {
    let (mut depth, mut quote) = (0usize, None);
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => (),
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')') if depth == 0 => return Some(i),
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            _ => (),
        }
    }
    None
}

/// Parameters of `def member(...)` in a Python source
pub(crate) fn parse_def(source: &str, member: &str) -> std::result::Result<Signature, String> {
    let def_re = Regex::new(&format!(r"(?m)^def\s+{}\s*\(", regex::escape(member)))
        .map_err(|e| e.to_string())?;
    let start = def_re
        .find(source)
        .ok_or_else(|| format!("no top-level function named {member}"))?
        .end();
    let end = closing_paren(&source[start..])
        .ok_or_else(|| format!("unterminated parameter list of {member}"))?;

    let mut keyword_only = false;
    let mut params = Vec::new();
    for part in split_params(&source[start..start + end]) {
        match part {
            "*" => {
                keyword_only = true;
                continue;
            }
            "/" => continue,
            _ if part.starts_with('*') => {
                return Err(format!("variadic parameter {part} is not supported"));
            }
            _ => (),
        }
        let (head, default) = match part.split_once('=') {
            Some((head, default)) => {
                let literal = parse_literal(default)
                    .ok_or_else(|| format!("default of {head} is not a literal: {default}"))?;
                (head, Some(literal))
            }
            None => (part, None),
        };
        // drop annotations
        let name = head.split(':').next().unwrap_or(head).trim();
        if !BARE_NAME_RE.is_match(name) {
            return Err(format!("can not read parameter {part}"));
        }
        let param = if keyword_only {
            Parameter::keyword_only(name)
        } else {
            Parameter::positional(name)
        };
        params.push(match default {
            Some(default) => param.with_default(default),
            None => param,
        });
    }
    Ok(Signature::new(params))
}

/// Python modules, addressed as `[py+]scheme://path::member`
#[derive(Clone, Debug)]
pub struct PythonAdapter {
    interpreter: Vec<String>,
}

impl PythonAdapter {
    #[inline]
    pub fn new(interpreter: Vec<String>) -> Self {
        Self { interpreter }
    }
}

impl SourceAdapter for PythonAdapter {
    fn name(&self) -> &'static str {
        "python"
    }

    fn accepts(&self, identifier: &Identifier) -> bool {
        match identifier.modifier {
            Some(modifier) => modifier == Modifier::Py,
            None => identifier.member.is_some(),
        }
    }

    fn extract_parameters(&self, identifier: &Identifier, source: &[u8]) -> Result<Signature> {
        let Some(member) = &identifier.member else {
            return Err(Error::adapter(identifier, "no member to load"));
        };
        let source = std::str::from_utf8(source).map_err(|e| Error::adapter(identifier, e))?;
        parse_def(source, member).map_err(|reason| Error::adapter(identifier, reason))
    }

    fn run(&self, identifier: &Identifier, source: &[u8], args: &Arguments) -> Result<Payload> {
        let Some(member) = &identifier.member else {
            return Err(Error::adapter(identifier, "no member to run"));
        };
        let request = json!({
            "source": String::from_utf8_lossy(source),
            "origin": identifier.location(),
            "member": member,
            "kwargs": args.to_object(),
        });
        let mut command = self.interpreter.clone();
        command.extend(["-c".to_string(), RUNNER.to_string()]);
        run_json_command(&command, &[], &serde_json::to_vec(&request)?, identifier)
    }
}
