//! Catalog DTOs.
//!
//! # Design
//! These mirror the mock-server's schema but are defined independently;
//! integration tests catch drift between the two crates. Unknown category
//! names decode to `Category::Unknown` instead of failing the whole page.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Product category. `Unknown` is only ever produced by decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Category {
    #[default]
    Unknown,
    Album,
    Single,
    Track,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Unknown => "unknown",
            Category::Album => "album",
            Category::Single => "single",
            Category::Track => "track",
        }
    }

    /// Case-insensitive; anything unrecognized is `Unknown`.
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "album" => Category::Album,
            "single" => Category::Single,
            "track" => Category::Track,
            _ => Category::Unknown,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Category::parse_or_default(&value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Category,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

/// One page of a paged listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: usize,
    #[serde(default, rename = "startindex")]
    pub start_index: usize,
    #[serde(default, rename = "itemsperpage")]
    pub items_per_page: usize,
}

impl<T> ListPage<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Body of a successful `token/` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
}
