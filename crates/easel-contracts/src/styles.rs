use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ContractError;

const DEFAULT_STYLES_JSON: &str = include_str!("../resources/styles.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleEntry {
    pub name: String,
    pub modifier: String,
}

/// Style name to modifier phrase, in listing order.
///
/// Built-in entries come from `resources/styles.json`. Overrides replace the
/// modifier of an existing name in place and append new names at the end, so
/// the listing order of the built-ins never moves.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: IndexMap<String, StyleEntry>,
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StyleCatalog {
    pub fn new(styles: Option<IndexMap<String, StyleEntry>>) -> Self {
        Self {
            styles: styles.unwrap_or_else(default_styles),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ContractError> {
        Ok(Self {
            styles: parse_style_rows(raw)?,
        })
    }

    pub fn with_overrides(mut self, raw: &str) -> Result<Self, ContractError> {
        for (name, entry) in parse_style_rows(raw)? {
            self.styles.insert(name, entry);
        }
        Ok(self)
    }

    pub fn with_override_file(self, path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(self.with_overrides(&raw)?)
    }

    pub fn lookup(&self, name: &str) -> Result<&str, ContractError> {
        self.styles
            .get(name)
            .map(|entry| entry.modifier.as_str())
            .ok_or_else(|| ContractError::StyleNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.styles.keys().map(String::as_str).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &StyleEntry> {
        self.styles.values()
    }

    /// The style a fresh form starts with.
    pub fn default_style(&self) -> Option<&str> {
        self.styles.keys().next().map(String::as_str)
    }

    /// Case-insensitive name match for user-typed input.
    pub fn resolve_name(&self, input: &str) -> Option<&str> {
        let needle = input.trim();
        if needle.is_empty() {
            return None;
        }
        self.styles
            .keys()
            .find(|name| name.eq_ignore_ascii_case(needle))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

fn parse_style_rows(raw: &str) -> Result<IndexMap<String, StyleEntry>, ContractError> {
    let rows: IndexMap<String, String> = serde_json::from_str(raw)
        .map_err(|err| ContractError::InvalidCatalog(err.to_string()))?;
    let mut styles = IndexMap::new();
    for (name, modifier) in rows {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ContractError::InvalidCatalog(
                "style names must not be empty".to_string(),
            ));
        }
        styles.insert(name.clone(), StyleEntry { name, modifier });
    }
    Ok(styles)
}

fn default_styles() -> IndexMap<String, StyleEntry> {
    // The embedded resource is covered by tests; an unparsable copy yields an
    // empty catalog rather than a panic.
    parse_style_rows(DEFAULT_STYLES_JSON).unwrap_or_default()
}
