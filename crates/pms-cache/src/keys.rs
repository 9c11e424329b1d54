//! Cache key derivation and TTL policy.
//!
//! Each query shape owns a key namespace:
//!
//! ```text
//! {type}:{id}                                                 single entity
//! {type}:{version}:{id}                                       versioned projection
//! {type}:{version}[:search={s}]:page={n}:size={m}[:sort={c}:{d}]  filtered list
//! ```
//!
//! Unset optional components are omitted entirely, so every default-filter
//! request for the same page maps to the same key.

use std::fmt::{self, Display, Write};

use crate::descriptor::CacheDuration;

/// TTL for single-entity reads.
pub const ENTITY_TTL: CacheDuration = CacheDuration::from_mins(10);

/// TTL for list reads, which go stale on any write in the collection.
pub const LIST_TTL: CacheDuration = CacheDuration::from_mins(5);

pub fn entity_key(resource: &str, id: impl Display) -> String {
    format!("{resource}:{id}")
}

pub fn versioned_key(resource: &str, version: &str, id: impl Display) -> String {
    format!("{resource}:{version}:{id}")
}

/// Builder for list-query keys.
#[derive(Debug, Clone)]
pub struct ListKey<'a> {
    resource: &'a str,
    version: &'a str,
    search: Option<&'a str>,
    page: u32,
    size: u32,
    sort: Option<(String, String)>,
}

impl<'a> ListKey<'a> {
    pub fn new(resource: &'a str, version: &'a str) -> Self {
        Self {
            resource,
            version,
            search: None,
            page: 1,
            size: 10,
            sort: None,
        }
    }

    /// Blank phrases count as unset.
    pub fn search(mut self, phrase: Option<&'a str>) -> Self {
        self.search = phrase.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn page(mut self, number: u32, size: u32) -> Self {
        self.page = number;
        self.size = size;
        self
    }

    pub fn sort(mut self, column: impl Display, direction: impl Display) -> Self {
        self.sort = Some((column.to_string(), direction.to_string()));
        self
    }

    pub fn build(&self) -> String {
        self.to_string()
    }
}

impl Display for ListKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.version)?;
        if let Some(phrase) = self.search {
            f.write_str(":search=")?;
            write_escaped(f, phrase)?;
        }
        write!(f, ":page={}:size={}", self.page, self.size)?;
        if let Some((column, direction)) = &self.sort {
            write!(f, ":sort={column}:{direction}")?;
        }
        Ok(())
    }
}

/// Escapes the key delimiter so a phrase can never mimic later components.
fn write_escaped(out: &mut impl Write, phrase: &str) -> fmt::Result {
    for c in phrase.chars() {
        match c {
            '%' => out.write_str("%25")?,
            ':' => out.write_str("%3A")?,
            other => out.write_char(other)?,
        }
    }
    Ok(())
}
