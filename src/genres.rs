//! Genre class index → display name.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

/// Size of the synthesized table when no mapping file is usable.
pub const SYNTHETIC_GENRES: usize = 20;

#[derive(Error, Debug, PartialEq)]
pub enum MappingRowError {
    #[error("line {line}: malformed mapping row '{row}'")]
    MalformedMappingRow { line: usize, row: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreLabelTable {
    names: BTreeMap<usize, String>,
}

impl GenreLabelTable {
    /// Load an `index,name` table (no header). Never fails: an unreadable
    /// or empty table degrades to `Genre_1..=Genre_20`.
    pub fn load(path: &Path) -> Self {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!(
                    "Genre mapping {} not readable ({e}). Using default mapping.",
                    path.display()
                );
                return Self::synthetic(SYNTHETIC_GENRES);
            }
        };
        let table = Self::parse(BufReader::new(file));
        if table.is_empty() {
            log::warn!(
                "Genre mapping {} has no usable rows. Using default mapping.",
                path.display()
            );
            return Self::synthetic(SYNTHETIC_GENRES);
        }
        log::debug!("Loaded {} genre names from {}", table.len(), path.display());
        table
    }

    /// Permissive parse: bad rows are skipped with a warning.
    pub fn parse<R: BufRead>(reader: R) -> Self {
        let mut names = BTreeMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    log::warn!("Stopped reading genre mapping at line {}: {e}", idx + 1);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_row(idx + 1, &line) {
                Ok((index, name)) => {
                    names.insert(index, name);
                }
                Err(e) => log::warn!("Skipping {e}"),
            }
        }
        Self { names }
    }

    /// `Genre_<i>` for i in 1..=n.
    pub fn synthetic(n: usize) -> Self {
        Self {
            names: (1..=n).map(|i| (i, format!("Genre_{i}"))).collect(),
        }
    }

    pub fn resolve(&self, index: usize) -> String {
        self.names
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("Genre_{index}"))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn parse_row(line: usize, row: &str) -> Result<(usize, String), MappingRowError> {
    let malformed = || MappingRowError::MalformedMappingRow {
        line,
        row: row.to_string(),
    };
    let fields = split_csv_row(row);
    let [index, name, rest @ ..] = fields.as_slice() else {
        return Err(malformed());
    };
    let index: usize = index.trim().parse().map_err(|_| malformed())?;
    let name = name.trim();
    if name.is_empty() {
        return Err(malformed());
    }
    if !rest.is_empty() {
        log::debug!("Ignoring {} extra column(s) on genre mapping line {line}", rest.len());
    }
    Ok((index, name.to_string()))
}

/// Split one CSV row into fields. Double-quoted fields may hold commas and
/// `""` escapes.
pub(crate) fn split_csv_row(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = row.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
