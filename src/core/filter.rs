//! Store-level structured filters.
//!
//! A task's state predicate is data, not code: the scheduler ORs the filters
//! of every admissible task and hands the result to the resource store, which
//! may translate it to its native query language or evaluate it in memory with
//! [`StructuredFilter::matches`].
//!
//! Evaluation rules:
//! - paths are dotted and fan out over arrays, so `extensions.active`
//!   matches when any extension is active;
//! - `null` counts as absent;
//! - numbers compare numerically and strings lexicographically (ISO-8601
//!   timestamps therefore compare chronologically); mixed kinds never match;
//! - `Ne` and `Nin` match absent fields;
//! - an empty `Or` matches nothing and an empty `And` matches everything.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tagged union of comparison and logical operators over document paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StructuredFilter {
    /// Field equals value (or an array field contains it).
    Eq {
        /// Dotted path.
        path: String,
        /// Expected value.
        value: Value,
    },
    /// Negation of `Eq`.
    Ne {
        /// Dotted path.
        path: String,
        /// Rejected value.
        value: Value,
    },
    /// Field equals one of the values.
    In {
        /// Dotted path.
        path: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Negation of `In`.
    Nin {
        /// Dotted path.
        path: String,
        /// Rejected values.
        values: Vec<Value>,
    },
    /// Field strictly lower than value.
    Lt {
        /// Dotted path.
        path: String,
        /// Bound.
        value: Value,
    },
    /// Field lower than or equal to value.
    Lte {
        /// Dotted path.
        path: String,
        /// Bound.
        value: Value,
    },
    /// Field strictly greater than value.
    Gt {
        /// Dotted path.
        path: String,
        /// Bound.
        value: Value,
    },
    /// Field greater than or equal to value.
    Gte {
        /// Dotted path.
        path: String,
        /// Bound.
        value: Value,
    },
    /// Field presence (`true`) or absence (`false`).
    Exists {
        /// Dotted path.
        path: String,
        /// Expected presence.
        exists: bool,
    },
    /// Every clause matches.
    And {
        /// Clauses.
        clauses: Vec<StructuredFilter>,
    },
    /// At least one clause matches.
    Or {
        /// Clauses.
        clauses: Vec<StructuredFilter>,
    },
    /// The clause does not match.
    Not {
        /// Negated clause.
        clause: Box<StructuredFilter>,
    },
}

impl StructuredFilter {
    /// `path == value`.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `path != value`.
    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `path ∈ values`.
    pub fn is_in<V: Into<Value>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            path: path.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `path ∉ values`.
    pub fn not_in<V: Into<Value>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::Nin {
            path: path.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `path < value`.
    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `path <= value`.
    pub fn lte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `path > value`.
    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `path >= value`.
    pub fn gte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Field presence check.
    pub fn exists(path: impl Into<String>, exists: bool) -> Self {
        Self::Exists {
            path: path.into(),
            exists,
        }
    }

    /// Conjunction.
    pub fn and(clauses: impl IntoIterator<Item = Self>) -> Self {
        Self::And {
            clauses: clauses.into_iter().collect(),
        }
    }

    /// Disjunction.
    pub fn or(clauses: impl IntoIterator<Item = Self>) -> Self {
        Self::Or {
            clauses: clauses.into_iter().collect(),
        }
    }

    /// Negation.
    #[must_use]
    pub fn not(clause: Self) -> Self {
        Self::Not {
            clause: Box::new(clause),
        }
    }

    /// Same filter with every path prefixed, e.g. `prefixed("draft.")`
    /// turns a main-track clause into its draft-track twin.
    #[must_use]
    pub fn prefixed(&self, prefix: &str) -> Self {
        let p = |path: &String| format!("{prefix}{path}");
        match self {
            Self::Eq { path, value } => Self::Eq { path: p(path), value: value.clone() },
            Self::Ne { path, value } => Self::Ne { path: p(path), value: value.clone() },
            Self::In { path, values } => Self::In { path: p(path), values: values.clone() },
            Self::Nin { path, values } => Self::Nin { path: p(path), values: values.clone() },
            Self::Lt { path, value } => Self::Lt { path: p(path), value: value.clone() },
            Self::Lte { path, value } => Self::Lte { path: p(path), value: value.clone() },
            Self::Gt { path, value } => Self::Gt { path: p(path), value: value.clone() },
            Self::Gte { path, value } => Self::Gte { path: p(path), value: value.clone() },
            Self::Exists { path, exists } => Self::Exists { path: p(path), exists: *exists },
            Self::And { clauses } => Self::And {
                clauses: clauses.iter().map(|c| c.prefixed(prefix)).collect(),
            },
            Self::Or { clauses } => Self::Or {
                clauses: clauses.iter().map(|c| c.prefixed(prefix)).collect(),
            },
            Self::Not { clause } => Self::Not {
                clause: Box::new(clause.prefixed(prefix)),
            },
        }
    }

    /// Evaluate the filter against a document.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::Eq { path, value } => candidates(document, path).any(|v| v == value),
            Self::Ne { path, value } => !candidates(document, path).any(|v| v == value),
            Self::In { path, values } => candidates(document, path).any(|v| values.contains(v)),
            Self::Nin { path, values } => !candidates(document, path).any(|v| values.contains(v)),
            Self::Lt { path, value } => compares(document, path, value, Ordering::is_lt),
            Self::Lte { path, value } => compares(document, path, value, Ordering::is_le),
            Self::Gt { path, value } => compares(document, path, value, Ordering::is_gt),
            Self::Gte { path, value } => compares(document, path, value, Ordering::is_ge),
            Self::Exists { path, exists } => resolve(document, path).is_empty() != *exists,
            Self::And { clauses } => clauses.iter().all(|c| c.matches(document)),
            Self::Or { clauses } => clauses.iter().any(|c| c.matches(document)),
            Self::Not { clause } => !clause.matches(document),
        }
    }
}

/// Values reached by a dotted path, fanning out over arrays met on the way.
fn resolve<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    fn walk<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
        let Some((head, rest)) = segments.split_first() else {
            if !value.is_null() {
                out.push(value);
            }
            return;
        };
        match value {
            Value::Object(map) => {
                if let Some(next) = map.get(*head) {
                    walk(next, rest, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, segments, out);
                }
            }
            _ => {}
        }
    }

    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    walk(document, &segments, &mut out);
    out
}

/// Resolved values plus the elements of resolved arrays.
fn candidates<'a>(document: &'a Value, path: &str) -> impl Iterator<Item = &'a Value> {
    resolve(document, path).into_iter().flat_map(|value| {
        let elements = value.as_array().map(|items| items.iter()).into_iter().flatten();
        std::iter::once(value).chain(elements)
    })
}

fn compares(document: &Value, path: &str, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    candidates(document, path).any(|v| compare(v, bound).is_some_and(accept))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
