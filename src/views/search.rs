//! Case-insensitive substring search over cached lists.

use std::sync::Arc;

use happylife_types::{Blog, Donation, Event};

/// Text fields a list page searches.
pub trait Searchable {
    fn search_fields(&self) -> Vec<&str>;

    /// `needle` must already be trimmed and lowercased.
    fn matches(&self, needle: &str) -> bool {
        self.search_fields()
            .into_iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

impl Searchable for Donation {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.description.as_str()]
    }
}

impl Searchable for Blog {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.author.as_str(), self.content.as_str()]
    }
}

impl Searchable for Event {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.title.as_str(),
            self.location.as_str(),
            self.description.as_str(),
        ]
    }
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Filter `items` by `query`. A blank query keeps everything.
pub fn search<T: Searchable + Clone>(items: &[T], query: &str) -> Vec<T> {
    let needle = normalize(query);
    items
        .iter()
        .filter(|item| needle.is_empty() || item.matches(&needle))
        .cloned()
        .collect()
}

/// Memoized search result.
///
/// Recomputes only when the query text or the source list (by identity)
/// changes, so re-rendering with the same cached `Arc` is free.
#[derive(Debug)]
pub struct SearchFilter<T> {
    query: String,
    source: Option<Arc<Vec<T>>>,
    result: Arc<Vec<T>>,
    computations: usize,
}

impl<T> Default for SearchFilter<T> {
    fn default() -> Self {
        Self {
            query: String::new(),
            source: None,
            result: Arc::new(Vec::new()),
            computations: 0,
        }
    }
}

impl<T: Searchable + Clone> SearchFilter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        let query = normalize(&query.into());
        if query != self.query {
            self.query = query;
            self.source = None;
        }
    }

    pub fn apply(&mut self, source: &Arc<Vec<T>>) -> Arc<Vec<T>> {
        if let Some(previous) = &self.source
            && Arc::ptr_eq(previous, source)
        {
            return Arc::clone(&self.result);
        }

        self.computations += 1;
        self.result = if self.query.is_empty() {
            Arc::clone(source)
        } else {
            Arc::new(
                source
                    .iter()
                    .filter(|item| item.matches(&self.query))
                    .cloned()
                    .collect(),
            )
        };
        self.source = Some(Arc::clone(source));
        Arc::clone(&self.result)
    }

    /// How many times the filter actually ran.
    pub fn computations(&self) -> usize {
        self.computations
    }
}
