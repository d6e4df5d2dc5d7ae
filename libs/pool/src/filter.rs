//! Listing filters.
//!
//! A filter is built from a query field name and value and evaluated
//! against a manifest. Filters compose conjunctively.

use crate::manifest::Manifest;

/// How a `name` filter compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch {
    Exact(String),
    /// Value was given as `~fragment`.
    Contains(String),
}

/// A predicate over a manifest, keyed by query field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Owner(String),
    /// Manifest state by name; `all` matches everything.
    State(String),
    Name(NameMatch),
    Version(String),
    Public(bool),
    Os(String),
    Type(String),
}

impl Filter {
    /// Build the filter for a query field, or `None` for unknown fields.
    pub fn from_query(field: &str, value: &str) -> Option<Self> {
        let filter = match field {
            "owner" => Filter::Owner(value.to_string()),
            "state" => Filter::State(value.to_string()),
            "name" => match value.strip_prefix('~') {
                Some(fragment) => Filter::Name(NameMatch::Contains(fragment.to_string())),
                None => Filter::Name(NameMatch::Exact(value.to_string())),
            },
            "version" => Filter::Version(value.to_string()),
            "public" => Filter::Public(parse_bool(value)),
            "os" => Filter::Os(value.to_string()),
            "type" => Filter::Type(value.to_string()),
            _ => return None,
        };
        Some(filter)
    }

    pub fn owner(owner: impl Into<String>) -> Self {
        Filter::Owner(owner.into())
    }

    pub fn state(state: impl Into<String>) -> Self {
        Filter::State(state.into())
    }

    pub fn matches(&self, m: &Manifest) -> bool {
        match self {
            Filter::Owner(owner) => m.owner == *owner,
            Filter::State(state) => state == "all" || m.state.as_str() == state,
            Filter::Name(NameMatch::Exact(name)) => m.name == *name,
            Filter::Name(NameMatch::Contains(fragment)) => m.name.contains(fragment.as_str()),
            Filter::Version(version) => m.version == *version,
            Filter::Public(public) => m.public == *public,
            Filter::Os(os) => m.os == *os,
            Filter::Type(t) => m.image_type == *t,
        }
    }
}

/// True when every filter matches. An empty filter set matches all.
pub fn matches_all(filters: &[Filter], m: &Manifest) -> bool {
    filters.iter().all(|f| f.matches(m))
}

// Unparsable values count as false.
fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}
