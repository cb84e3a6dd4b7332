// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides the error handling system used across all of the TBTL's Rust code.
//!
//! Errors are constructed via [`Error::root`] (which also logs a warning with the caller
//! location), carry the backtrace of source errors with them, and may be enriched with extra
//! context via [`Error::ctx`].
//!
//! # Details
//!
//! Use `std::result::Result<T, bherror::Error<E>>`, or equivalently `bherror::Result<T, E>`, as
//! the return type of fallible functions.  The error type `E` must implement the [`BhError`]
//! trait.
//!
//! Errors not defined by us, i.e. those implementing [`std::error::Error`] but not [`BhError`],
//! are "foreign errors" and are converted & propagated via the
//! [`ForeignError`][traits::ForeignError] trait.  Propagating a `bherror::Error<E>` into a
//! `bherror::Error<F>` is done via the [`PropagateError`][traits::PropagateError] trait instead
//! of `?`, so the trace of source errors is preserved.
//!
//! # Examples
//!
//! ```
//! use bherror::traits::{ErrorContext, ForeignError};
//!
//! #[derive(Debug, PartialEq)]
//! enum ConfigError {
//!     NotANumber,
//! }
//!
//! impl std::fmt::Display for ConfigError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "value is not a number")
//!     }
//! }
//!
//! impl bherror::BhError for ConfigError {}
//!
//! fn parse_port(s: &str) -> bherror::Result<u16, ConfigError> {
//!     s.parse()
//!         .foreign_err(|| ConfigError::NotANumber)
//!         .ctx(|| format!("parsing {s}"))
//! }
//!
//! assert!(parse_port("8080").is_ok());
//! assert!(parse_port("eight").is_err());
//! ```

pub mod traits;

mod display;

/// The trait needed for compatibility with the [`Error`] functionality.
///
/// Concrete error types implementing this trait should *not* implement [`std::error::Error`]
/// themselves; that is handled by the [`Error`] wrapper.
pub trait BhError: std::fmt::Display + Send + Sync + 'static {}

/// A boxed source error, as stored within [`Error`].
pub(crate) type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error wrapper used for all errors in our projects.
///
/// It wraps a concrete error variant implementing [`BhError`], an optional chain of source
/// errors, and any number of free-form context messages elaborating on the error specifics.
pub struct Error<E>
where
    E: BhError,
{
    /// The concrete error variant.
    pub error: E,
    /// Context messages attached via [`Error::ctx`], oldest first.
    pub(crate) context: Vec<Box<dyn std::fmt::Display + Send + Sync>>,
    /// The source error, to be able to backtrace errors.
    pub(crate) source: Option<BoxedSource>,
}

/// The [`std::result::Result`] alias that wraps the error object into [`Error`].
pub type Result<T, E> = std::result::Result<T, Error<E>>;

impl<E> Error<E>
where
    E: BhError,
{
    /// Create a root error (i.e. one without a source) and log a warning.
    ///
    /// Use this where an error condition is *detected*, e.g. within `if` or `if let` constructs.
    /// Do *not* use this method to propagate another error, because the error chain would be
    /// lost; use the [`traits::ForeignError`] or [`traits::PropagateError`] traits instead.
    #[track_caller]
    pub fn root(error: E) -> Self {
        let location = std::panic::Location::caller();
        let error = Self {
            error,
            context: Vec::new(),
            source: None,
        };
        log::warn!(target: &location.to_string(), "{}", error);
        error
    }

    /// Create an error from its source.
    ///
    /// Stays private; library & service code propagates via the [`traits`] instead.
    pub(crate) fn from_source(error: E, source: BoxedSource) -> Self {
        Self {
            error,
            context: Vec::new(),
            source: Some(source),
        }
    }

    /// Attach additional context to the error and return it.
    ///
    /// The method takes ownership of `self` so that it can be chained.  Context can be added
    /// multiple times; all the contexts are retained.
    pub fn ctx<C>(mut self, context: C) -> Self
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.context.push(Box::new(context));
        self
    }
}

impl<E> std::error::Error for Error<E>
where
    E: BhError,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        // "as _" casts from (Error + Send + Sync) to (Error + 'static).
        self.source.as_ref().map(|source| source.as_ref() as _)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;
    use crate::traits::{ErrorContext, ForeignError, PropagateError};

    #[derive(Debug, PartialEq)]
    pub(crate) enum DummyError {
        Inner,
        Outer,
    }

    impl std::fmt::Display for DummyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Inner => write!(f, "inner error"),
                Self::Outer => write!(f, "outer error"),
            }
        }
    }

    impl BhError for DummyError {}

    #[test]
    fn root_has_no_source() {
        let error = Error::root(DummyError::Inner);

        assert_eq!(error.error, DummyError::Inner);
        assert!(error.source().is_none());
    }

    #[test]
    fn foreign_error_becomes_source() {
        let result: std::result::Result<(), _> = "nan".parse::<u32>().map(|_| ());

        let error = result.foreign_err(|| DummyError::Inner).unwrap_err();

        assert_eq!(error.error, DummyError::Inner);
        assert!(error.source().is_some());
    }

    #[test]
    fn propagated_error_keeps_chain() {
        let inner: Result<(), DummyError> = Err(Error::root(DummyError::Inner));

        let outer = inner.with_err(|| DummyError::Outer).unwrap_err();

        assert_eq!(outer.error, DummyError::Outer);
        let source = outer.source().unwrap();
        assert_eq!(source.to_string(), "inner error");
    }

    #[test]
    fn match_err_inspects_source_variant() {
        let inner: Result<(), DummyError> = Err(Error::root(DummyError::Inner));

        let outer = inner
            .match_err(|e| match e {
                DummyError::Inner => DummyError::Outer,
                DummyError::Outer => DummyError::Inner,
            })
            .unwrap_err();

        assert_eq!(outer.error, DummyError::Outer);
        assert!(outer.source().is_some());
    }

    #[test]
    fn contexts_accumulate() {
        let error = Error::root(DummyError::Inner)
            .ctx("first context")
            .ctx("second context");

        let contexts: Vec<String> = error.context.iter().map(ToString::to_string).collect();
        assert_eq!(contexts, ["first context", "second context"]);
    }

    #[test]
    fn result_ctx_is_error_only() {
        let ok: Result<u32, DummyError> = Ok(42);
        assert_eq!(ok.ctx(|| "unused").unwrap(), 42);

        let err: Result<u32, DummyError> = Err(Error::root(DummyError::Inner));
        let err = err.ctx(|| "used").unwrap_err();
        assert_eq!(err.context.len(), 1);
    }
}
