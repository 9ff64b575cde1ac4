use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use std::{io::Write, path::Path};
use tempfile::NamedTempFile;

use crate::error::Result;

#[inline]
pub(crate) fn create_dir_all_and_return<P: AsRef<Path>>(path: P) -> Result<P> {
    std::fs::create_dir_all(path.as_ref())?;
    Ok(path)
}

/// Hex-encoded SHA-256 of `data`, truncated to `len` characters.
pub(crate) fn short_hash(data: impl AsRef<[u8]>, len: usize) -> String {
    let mut hex = hex::encode(Sha256::digest(data.as_ref()));
    hex.truncate(len);
    hex
}

/// Writes `bytes` to a sibling temporary file and persists it over `path`, so
/// a reader never observes a partially written file.
pub(crate) fn write_atomically(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(create_dir_all_and_return(parent)?)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' | '=' => c,
            _ => '_',
        })
        .collect()
}

/// Turns an identifier into a relative path made of portable characters. The
/// first segment names the scheme with its modifier, suffixed with `_root` for
/// absolute paths, so that distinct locations never share a path.
pub(crate) fn sanitize_relative(identifier: &str) -> Utf8PathBuf {
    let mut path = Utf8PathBuf::new();
    let rest = match identifier.split_once("://") {
        Some((scheme, rest)) => {
            let root = if rest.starts_with('/') { "_root" } else { "" };
            path.push(format!("{}{root}", sanitize_segment(scheme)));
            rest
        }
        None => identifier,
    };
    for segment in rest.split('/') {
        if !segment.is_empty() && segment != "." && segment != ".." {
            path.push(sanitize_segment(segment));
        }
    }
    path
}
