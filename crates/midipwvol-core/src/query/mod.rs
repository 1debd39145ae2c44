//! Attribute-based queries over the [`Mirror`].
//!
//! A [`Query`] is a conjunction of [`Filter`]s evaluated in the order they
//! were added. Evaluation is lazy: [`Mirror::query_all`] walks a snapshot
//! and yields matches one at a time, and [`Mirror::query_one`] stops at
//! the first.
//!
//! ```ignore
//! let query = Query::new()
//!     .filter(Filter::equals(Attribute::Type, "Node"))
//!     .filter(Filter::equals(Attribute::IsSink, true))
//!     .and_spec("node_description", &json!({ "regex": "Speakers" }))?;
//! let sink = mirror.query_one(&query);
//! ```

mod attribute;
mod filter;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::QueryError;
use crate::model::MirroredObject;
use crate::store::Mirror;

pub use attribute::{Attribute, AttributeValue};
pub use filter::{Filter, Matcher, PredicateFn, SetKey};

/// Conjunction of filters. An empty query matches every object.
#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<Filter>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from `(attribute name, predicate spec)` pairs.
    pub fn from_specs<'a, I, K>(specs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, &'a Value)>,
        K: AsRef<str>,
    {
        specs
            .into_iter()
            .map(|(name, spec)| Filter::from_spec(name.as_ref(), spec))
            .collect::<Result<Vec<_>, _>>()
            .map(|filters| Self { filters })
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn and_spec(self, name: &str, spec: &Value) -> Result<Self, QueryError> {
        Ok(self.filter(Filter::from_spec(name, spec)?))
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches(&self, obj: &MirroredObject) -> bool {
        self.filters.iter().all(|f| f.matches(obj))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.filters.is_empty() {
            return f.write_str("<any object>");
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{filter}")?;
        }
        Ok(())
    }
}

// ── Mirror query surface ─────────────────────────────────────────────

impl Mirror {
    /// Every object matching `query`, lazily, over a point-in-time snapshot.
    pub fn query_all<'q>(
        &self,
        query: &'q Query,
    ) -> impl Iterator<Item = Arc<MirroredObject>> + use<'q> {
        self.scan_all().filter(move |obj| query.matches(obj))
    }

    /// The first object matching `query`, if any.
    pub fn query_one(&self, query: &Query) -> Option<Arc<MirroredObject>> {
        self.query_all(query).next()
    }
}
