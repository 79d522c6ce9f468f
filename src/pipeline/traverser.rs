//! Traversers: a coefficient paired with a value and optional path history.
//!
//! Steps never mutate a traverser they were handed; every transformation
//! builds a new one via [`Traverser::split`].

use crate::bytecode::Value;
use crate::coefficient::Coefficient;
use serde::Serialize;
use std::fmt;

/// One entry in a traverser's path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PathEntry<S = Value> {
    pub label: Option<String>,
    pub value: S,
}

/// Ordered history of values a traverser has visited.
///
/// Labeled steps always record; unlabeled steps record only when the
/// execution tracks full paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Path<S = Value> {
    entries: Vec<PathEntry<S>>,
}

impl<S: Clone> Path<S> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[PathEntry<S>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent value recorded under `label`.
    pub fn get(&self, label: &str) -> Option<&S> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.label.as_deref() == Some(label))
            .map(|e| &e.value)
    }

    pub fn values(&self) -> impl Iterator<Item = &S> {
        self.entries.iter().map(|e| &e.value)
    }

    fn extended(&self, label: Option<&str>, value: &S) -> Self {
        let mut entries = self.entries.clone();
        entries.push(PathEntry {
            label: label.map(str::to_string),
            value: value.clone(),
        });
        Self { entries }
    }
}

/// The unit of data flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(bound(serialize = "C: Coefficient, S: Serialize"))]
pub struct Traverser<C: Coefficient, S = Value> {
    coefficient: C,
    value: S,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<Path<S>>,
}

impl<C: Coefficient, S: Clone> Traverser<C, S> {
    pub fn new(coefficient: C, value: S) -> Self {
        Self {
            coefficient,
            value,
            path: None,
        }
    }

    /// A fresh traverser with the identity coefficient.
    pub fn seed(value: S) -> Self {
        Self::new(C::identity(), value)
    }

    /// A seed that starts recording its path immediately.
    pub fn tracked_seed(value: S) -> Self {
        let mut t = Self::seed(value);
        t.path = Some(Path::new().extended(None, &t.value));
        t
    }

    pub fn coefficient(&self) -> &C {
        &self.coefficient
    }

    pub fn value(&self) -> &S {
        &self.value
    }

    pub fn path(&self) -> Option<&Path<S>> {
        self.path.as_ref()
    }

    pub fn into_value(self) -> S {
        self.value
    }

    /// Derive the traverser a step emits.
    ///
    /// The coefficient becomes `combine_sequential(self, step_coefficient)`.
    /// The path grows when the step is labeled, or when `track` is set and
    /// the path is already being recorded.
    pub fn split(&self, value: S, step_coefficient: &C, label: Option<&str>, track: bool) -> Self {
        let path = match (&self.path, label) {
            (Some(path), Some(_)) => Some(path.extended(label, &value)),
            (Some(path), None) if track => Some(path.extended(None, &value)),
            (Some(path), None) => Some(path.clone()),
            (None, Some(_)) => Some(Path::new().extended(label, &value)),
            (None, None) => None,
        };
        Self {
            coefficient: self.coefficient.combine_sequential(step_coefficient),
            value,
            path,
        }
    }

    /// Same value, coefficient and path replaced (used when merging).
    pub fn with_coefficient(mut self, coefficient: C) -> Self {
        self.coefficient = coefficient;
        self
    }
}

impl<C: Coefficient> Traverser<C> {
    /// Identity `Null` traverser that starts a pipeline headed by an
    /// initializing step when no seeds are given.
    pub fn trigger(track: bool) -> Self {
        Self {
            coefficient: C::identity(),
            value: Value::Null,
            path: track.then(Path::new),
        }
    }
}

impl<C: Coefficient, S: fmt::Display> fmt::Display for Traverser<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.coefficient.is_identity() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{}*{}", self.coefficient, self.value)
        }
    }
}
