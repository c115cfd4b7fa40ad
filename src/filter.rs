//! Error filters deciding which failures a breaker counts and a retry loop
//! retries.
//!
//! A filter is a set of accepted error types (or predicates) checked against
//! `&(dyn Error + 'static)`. Errors outside the set are not the layer's
//! business: breakers let them through without recording a failure and retry
//! loops return them on first occurrence. A filter that is too narrow
//! therefore silently disables protection for the excluded errors.
//!
//! ```rust
//! # use heimdall::{ErrorFilter, HeimdallError};
//! let filter = ErrorFilter::of::<HeimdallError>().or::<std::io::Error>();
//! let err = std::io::Error::other("reset");
//! assert!(filter.matches(&err));
//! ```

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::HeimdallError;

type Predicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// Set of errors a breaker or retry loop reacts to.
#[derive(Clone)]
pub struct ErrorFilter {
    kind: FilterKind,
}

#[derive(Clone)]
enum FilterKind {
    All,
    Any(Vec<(&'static str, Predicate)>),
}

impl ErrorFilter {
    /// Match every error. This is the default.
    pub fn all() -> Self {
        Self {
            kind: FilterKind::All,
        }
    }

    /// Match errors whose concrete type is exactly `E`.
    pub fn of<E: Error + 'static>() -> Self {
        Self {
            kind: FilterKind::Any(vec![type_predicate::<E>()]),
        }
    }

    /// Match errors accepted by an arbitrary predicate.
    pub fn when<P>(predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(predicate);
        Self {
            kind: FilterKind::Any(vec![("predicate", predicate)]),
        }
    }

    /// Match [`HeimdallError`] values classified as transient.
    pub fn transient() -> Self {
        let predicate: Predicate = Arc::new(|err: &(dyn Error + 'static)| {
            err.downcast_ref::<HeimdallError>()
                .is_some_and(HeimdallError::is_transient)
        });
        Self {
            kind: FilterKind::Any(vec![("transient", predicate)]),
        }
    }

    /// Extend the set with errors of concrete type `E`.
    pub fn or<E: Error + 'static>(mut self) -> Self {
        self.push(type_predicate::<E>());
        self
    }

    /// Check whether `err` belongs to the set.
    pub fn matches(&self, err: &(dyn Error + 'static)) -> bool {
        match &self.kind {
            FilterKind::All => true,
            FilterKind::Any(predicates) => predicates.iter().any(|(_, p)| p(err)),
        }
    }

    fn push(&mut self, entry: (&'static str, Predicate)) {
        // extending "everything" is still everything
        if let FilterKind::Any(predicates) = &mut self.kind {
            predicates.push(entry);
        }
    }
}

fn type_predicate<E: Error + 'static>() -> (&'static str, Predicate) {
    (
        std::any::type_name::<E>(),
        Arc::new(|err: &(dyn Error + 'static)| err.downcast_ref::<E>().is_some()),
    )
}

impl Default for ErrorFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for ErrorFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FilterKind::All => f.write_str("ErrorFilter(all)"),
            FilterKind::Any(predicates) => f
                .debug_tuple("ErrorFilter")
                .field(&predicates.iter().map(|(n, _)| *n).collect::<Vec<_>>())
                .finish(),
        }
    }
}
