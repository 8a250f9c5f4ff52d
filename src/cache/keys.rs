//! Query key definitions.
//!
//! A query is identified by an ordered tuple of primitive parts, e.g.
//! `["blogs", "home"]` or `["blog", <id>]`. Invalidation matches by prefix.

use std::fmt;

use uuid::Uuid;

/// One primitive component of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    Bool(bool),
    Id(Uuid),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

impl From<Uuid> for KeyPart {
    fn from(value: Uuid) -> Self {
        KeyPart::Id(value)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(value) => write!(f, "\"{value}\""),
            KeyPart::Int(value) => write!(f, "{value}"),
            KeyPart::Bool(value) => write!(f, "{value}"),
            KeyPart::Id(value) => write!(f, "\"{value}\""),
        }
    }
}

/// Ordered tuple identifying a cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new(root: impl Into<KeyPart>) -> Self {
        Self(vec![root.into()])
    }

    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// True when `prefix` matches the leading parts of this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, part) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("]")
    }
}

/// Build a [`QueryKey`] from a list of parts: `query_key!["blog", id]`.
#[macro_export]
macro_rules! query_key {
    [$root:expr $(, $part:expr)* $(,)?] => {
        $crate::cache::QueryKey::new($root)$(.with($part))*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matches_leading_parts_only() {
        let blogs = QueryKey::new("blogs");
        let home = QueryKey::new("blogs").with("home");
        let blog = QueryKey::new("blog").with(Uuid::nil());

        assert!(home.starts_with(&blogs));
        assert!(blogs.starts_with(&blogs));
        assert!(!blogs.starts_with(&home));
        assert!(!blog.starts_with(&blogs));
    }

    #[test]
    fn macro_builds_same_key_as_builder() {
        let id = Uuid::new_v4();
        assert_eq!(
            crate::query_key!["blogs", "related", id],
            QueryKey::new("blogs").with("related").with(id)
        );
    }

    #[test]
    fn display_renders_json_like_tuple() {
        let key = QueryKey::new("donations").with("all").with(3_i64).with(true);
        assert_eq!(key.to_string(), r#"["donations","all",3,true]"#);
    }
}
