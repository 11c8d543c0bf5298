use crate::error::StoreError;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
enum Line {
    Entry { key: String, value: String, raw: String },
    Other(String),
}

/// A flat `KEY=VALUE` settings file.
///
/// Parsed once into an ordered list of lines. `set` replaces the text of
/// the matching line only; comments, blank lines and every other entry are
/// written back exactly as they were read.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<Line>,
    trailing_newline: bool,
}

impl EnvFile {
    /// Load the file at `path`. A missing file is an empty settings file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Ok(Self::parse(path, &text))
    }

    pub fn parse(path: &Path, text: &str) -> Self {
        let lines = text.lines().map(parse_line).collect();
        Self {
            path: path.to_path_buf(),
            lines,
            trailing_newline: text.is_empty() || text.ends_with('\n'),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value for `key`; empty values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|l| match l {
            Line::Entry { key: k, value, .. } if k.as_str() == key && !value.is_empty() => {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    /// Set `key` in memory and write the file back.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let raw = format!("{}={}", key, value);
        let existing = self.lines.iter_mut().find_map(|l| match l {
            Line::Entry { key: k, value: v, raw: r } if k.as_str() == key => Some((v, r)),
            _ => None,
        });
        match existing {
            Some((v, r)) => {
                *v = value.to_string();
                *r = raw;
            }
            None => self.lines.push(Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
                raw,
            }),
        }
        self.save()
    }

    pub fn render(&self) -> String {
        let mut out = self
            .lines
            .iter()
            .map(|l| match l {
                Line::Entry { raw, .. } => raw.as_str(),
                Line::Other(raw) => raw.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        std::fs::write(&self.path, self.render()).map_err(io_err)
    }
}

fn parse_line(line: &str) -> Line {
    if line.trim_start().starts_with('#') {
        return Line::Other(line.to_string());
    }
    match dotenvy::from_read_iter(line.as_bytes()).next() {
        Some(Ok((key, value))) => Line::Entry {
            key,
            value,
            raw: line.to_string(),
        },
        Some(Err(e)) => {
            warn!("ignoring unparsable settings line: {}", e);
            Line::Other(line.to_string())
        }
        None => Line::Other(line.to_string()),
    }
}
