use indexmap::IndexMap;
use itertools::Itertools;
use std::fmt;

use crate::error::{Error, Result};

use super::{Argument, Payload};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Bindable by position or by name
    Positional,
    KeywordOnly,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Payload>,
}

impl Parameter {
    #[inline]
    pub fn positional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Positional,
            default: None,
        }
    }

    #[inline]
    pub fn keyword_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::KeywordOnly,
            default: None,
        }
    }

    #[inline]
    pub fn with_default(mut self, default: impl Into<Payload>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Ordered parameter list of a callable. Positional parameters always precede
/// keyword-only ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Signature {
    params: Vec<Parameter>,
}

/// Arguments bound by name, in binding order: positional ones first, then
/// keywords as they were supplied.
pub type Bindings = IndexMap<String, Argument>;

impl Signature {
    pub fn new<I: IntoIterator<Item = Parameter>>(params: I) -> Self {
        let mut params = params.into_iter().collect::<Vec<_>>();
        // a stable sort keeps the declared order within each kind
        params.sort_by_key(|p| p.kind == ParamKind::KeywordOnly);
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_nullary(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Binds `args` and `kwargs` by position and name. With `partial` unset,
    /// every parameter without a default must end up bound.
    ///
    /// Returns the bindings together with the signature of what remains
    /// unbound: empty for a complete binding, the untouched parameters for a
    /// partial one.
    pub fn bind(
        &self,
        args: Vec<Argument>,
        kwargs: IndexMap<String, Argument>,
        partial: bool,
    ) -> Result<(Bindings, Signature)> {
        let mut bindings = Bindings::default();

        let positional = self
            .params
            .iter()
            .filter(|p| p.kind == ParamKind::Positional)
            .collect::<Vec<_>>();
        if args.len() > positional.len() {
            return Err(Error::binding(
                self,
                format!(
                    "takes {} positional arguments but {} were given",
                    positional.len(),
                    args.len()
                ),
            ));
        }
        for (param, arg) in positional.into_iter().zip(args) {
            bindings.insert(param.name.clone(), arg);
        }

        for (name, arg) in kwargs {
            if self.get(&name).is_none() {
                return Err(Error::binding(
                    self,
                    format!("got an unexpected keyword argument '{name}'"),
                ));
            }
            if bindings.contains_key(&name) {
                return Err(Error::binding(
                    self,
                    format!("multiple values for argument '{name}'"),
                ));
            }
            bindings.insert(name, arg);
        }

        let unbound = self
            .params
            .iter()
            .filter(|p| !bindings.contains_key(&p.name))
            .cloned()
            .collect::<Vec<_>>();

        if partial {
            return Ok((bindings, Signature { params: unbound }));
        }

        if let Some(missing) = unbound.iter().find(|p| p.default.is_none()) {
            return Err(Error::binding(
                self,
                format!("missing a required argument: '{}'", missing.name),
            ));
        }
        Ok((bindings, Signature::default()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = Vec::with_capacity(self.params.len() + 1);
        let mut star_written = false;
        for param in &self.params {
            if param.kind == ParamKind::KeywordOnly && !star_written {
                rendered.push("*".to_string());
                star_written = true;
            }
            match &param.default {
                Some(default) => rendered.push(format!("{}={default}", param.name)),
                None => rendered.push(param.name.clone()),
            }
        }
        write!(f, "({})", rendered.iter().join(", "))
    }
}
