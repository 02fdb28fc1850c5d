//! Access to the search index that holds one record per file.
//!
//! The [`RecordIndex`] trait covers the three operations the loader needs:
//! a liveness check, a field-expression search, and a partial "set" update
//! committed immediately. [`solr::SolrIndex`] talks to Solr over HTTP;
//! [`memory::MemoryIndex`] keeps records in a `Vec` for tests.

pub mod memory;
pub mod solr;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// One externally owned index document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl IndexRecord {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected response from {url}: {reason}")]
    Response { url: String, reason: String },

    #[error("no record with id {0}")]
    NotFound(String),

    #[error("request for {0} rejected")]
    Rejected(String),
}

/// A field expression: exact match, presence, conjunction and negation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Field { name: String, value: String },
    Present(String),
    And(Box<Query>, Box<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn field(name: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Field {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn present(name: impl Into<String>) -> Self {
        Query::Present(name.into())
    }

    pub fn and(self, other: Query) -> Self {
        Query::And(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Query::Not(Box::new(self))
    }

    /// Render as a Lucene/Solr standard query string.
    pub fn to_lucene(&self) -> String {
        match self {
            Query::Field { name, value } => format!("{}:{}", name, escape_term(value)),
            Query::Present(name) => format!("{}:*", name),
            Query::And(a, b) => format!("{} AND {}", a.to_lucene_grouped(), b.to_lucene_grouped()),
            Query::Not(inner) => format!("NOT {}", inner.to_lucene_grouped()),
        }
    }

    fn to_lucene_grouped(&self) -> String {
        match self {
            Query::And(..) => format!("({})", self.to_lucene()),
            _ => self.to_lucene(),
        }
    }

    /// Evaluate against a record's fields the way Solr would for string
    /// fields: a multi-valued field matches if any value does, and a field is
    /// present when it holds any indexed value. An empty string counts as a
    /// value (`url:*` matches it); null and an empty list do not.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Query::Field { name, value } => match fields.get(name) {
                Some(Value::Array(items)) => items.iter().any(|v| value_equals(v, value)),
                Some(v) => value_equals(v, value),
                None => false,
            },
            Query::Present(name) => fields.get(name).is_some_and(is_indexed),
            Query::And(a, b) => a.matches(fields) && b.matches(fields),
            Query::Not(inner) => !inner.matches(fields),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_lucene())
    }
}

fn value_equals(v: &Value, expected: &str) -> bool {
    match v {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        _ => false,
    }
}

fn is_indexed(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Array(items) => items.iter().any(is_indexed),
        _ => true,
    }
}

/// Backslash-escape Lucene query syntax characters and whitespace.
pub fn escape_term(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(
            c,
            '+' | '-'
                | '&'
                | '|'
                | '!'
                | '('
                | ')'
                | '{'
                | '}'
                | '['
                | ']'
                | '^'
                | '"'
                | '~'
                | '*'
                | '?'
                | ':'
                | '\\'
                | '/'
        ) || c.is_whitespace()
        {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
pub trait RecordIndex: Send + Sync {
    /// Check that the index answers at all.
    async fn ping(&self) -> Result<(), IndexError>;

    /// Return up to `rows` records matching `query`, in index order.
    async fn search(&self, query: &Query, rows: usize) -> Result<Vec<IndexRecord>, IndexError>;

    /// Set each of `fields` on record `id` and commit.
    async fn set_fields(&self, id: &str, fields: &Map<String, Value>) -> Result<(), IndexError>;
}
