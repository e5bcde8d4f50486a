//! A [`ConfigStore`] over a line-oriented config file.
//!
//! The host keeps its settings as one assignment per line:
//!
//! ```text
//! <?php
//! $cache_compression = 0;
//! $cache_minify = 1;
//! ```
//!
//! Reading looks for the first `$<key> = <value>;` line. Writing rewrites
//! the matching lines in place (or appends one) and atomically replaces the
//! file, leaving every other line byte-for-byte intact.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::StoreError;
use crate::settings::ConfigStore;

#[derive(Debug, Clone)]
pub struct LineFileStore {
    path: PathBuf,
}

impl LineFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write_file(&self, contents: &str) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(contents.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| StoreError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}

/// Matches `$key = value;` with optional surrounding whitespace.
fn line_pattern(key: &str) -> Result<Regex, StoreError> {
    Regex::new(&format!(
        r"^\s*\${}\s*=\s*([^;\s]*)\s*;",
        regex::escape(key)
    ))
    .map_err(|e| StoreError::Unavailable(e.to_string()))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// The assignment line written for `key`.
fn render_line(key: &str, value: bool) -> String {
    format!("${key} = {};", u8::from(value))
}

impl ConfigStore for LineFileStore {
    fn read_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        let Some(contents) = self.read_file()? else {
            return Ok(None);
        };
        let pattern = line_pattern(key)?;

        let Some(raw) = contents
            .lines()
            .find_map(|line| pattern.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            return Ok(None);
        };

        parse_bool(raw).map(Some).ok_or_else(|| StoreError::InvalidValue {
            key: key.to_owned(),
            value: raw.to_owned(),
        })
    }

    fn write_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        let contents = self.read_file()?.unwrap_or_default();
        let pattern = line_pattern(key)?;
        let replacement = render_line(key, value);

        let mut out = String::with_capacity(contents.len() + replacement.len() + 1);
        let mut replaced = false;
        for line in contents.split_inclusive('\n') {
            let body = line.trim_end_matches(['\r', '\n']);
            if pattern.is_match(body) {
                out.push_str(&replacement);
                out.push_str(&line[body.len()..]);
                replaced = true;
            } else {
                out.push_str(line);
            }
        }

        if !replaced {
            out = append_line(&out, &replacement);
        }

        tracing::debug!(path = %self.path.display(), key, value, replaced, "writing config line");
        self.write_file(&out)
    }
}

/// Append `line`, keeping it ahead of a closing `?>` if the file has one.
fn append_line(contents: &str, line: &str) -> String {
    let trimmed = contents.trim_end();
    if let Some(head) = trimmed.strip_suffix("?>") {
        let mut out = head.to_owned();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(line);
        out.push_str("\n?>\n");
        return out;
    }

    let mut out = contents.to_owned();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
    out
}
