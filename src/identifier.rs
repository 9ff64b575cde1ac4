//! The URI-shaped identifier grammar:
//!
//! ```text
//! [(modifier)+]scheme://path[::member][@revision]
//! ```
//!
//! with `modifier` one of `py`, `ipynb` and `scheme` one of `file`, `http`,
//! `https`. The revision is a free-form `key=value` tag.

use camino::Utf8PathBuf;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^((?P<modifier>ipynb|py)\+)?(?P<scheme>https|http|file)://(?P<path>.*?)(::(?P<member>[^@]*))?(@(?P<revision>[^@]*))?$",
    )
    .expect("identifier grammar is a valid regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Py,
    Ipynb,
}

impl Modifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Py => "py",
            Self::Ipynb => "ipynb",
        }
    }

    /// File suffix conventionally carried by sources of this kind
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Py => ".py",
            Self::Ipynb => ".ipynb",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    File,
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    pub modifier: Option<Modifier>,
    pub scheme: Scheme,
    pub path: String,
    pub member: Option<String>,
    pub revision: Option<String>,
}

impl Identifier {
    pub fn parse(s: &str) -> Result<Self> {
        let captures = IDENTIFIER_RE
            .captures(s)
            .ok_or_else(|| Error::UnparseableIdentifier(s.to_string()))?;
        let modifier = captures.name("modifier").map(|m| match m.as_str() {
            "ipynb" => Modifier::Ipynb,
            _ => Modifier::Py,
        });
        let scheme = match &captures["scheme"] {
            "file" => Scheme::File,
            "http" => Scheme::Http,
            _ => Scheme::Https,
        };
        let identifier = Self {
            modifier,
            scheme,
            path: captures["path"].to_string(),
            member: captures.name("member").map(|m| m.as_str().to_string()),
            revision: captures.name("revision").map(|m| m.as_str().to_string()),
        };
        log::debug!("parsed identifier {s} as {identifier:?}");
        Ok(identifier)
    }

    #[inline]
    pub fn is_parseable(s: &str) -> bool {
        IDENTIFIER_RE.is_match(s)
    }

    /// A `file://` identifier pointing at `path`
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            modifier: None,
            scheme: Scheme::File,
            path: path.into(),
            member: None,
            revision: None,
        }
    }

    #[inline]
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    #[inline]
    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }

    #[inline]
    pub fn with_modifier(mut self, modifier: Option<Modifier>) -> Self {
        self.modifier = modifier;
        self
    }

    /// The location of the source, without modifier, member or revision
    pub fn location(&self) -> String {
        format!("{}://{}", self.scheme.as_str(), self.path)
    }

    /// Local filesystem path for `file://` identifiers
    pub fn local_path(&self) -> Option<Utf8PathBuf> {
        match self.scheme {
            Scheme::File => Some(Utf8PathBuf::from(&self.path)),
            Scheme::Http | Scheme::Https => None,
        }
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(modifier) = self.modifier {
            write!(f, "{}+", modifier.as_str())?;
        }
        write!(f, "{}://{}", self.scheme.as_str(), self.path)?;
        if let Some(member) = &self.member {
            write!(f, "::{member}")?;
        }
        if let Some(revision) = &self.revision {
            write!(f, "@{revision}")?;
        }
        Ok(())
    }
}
