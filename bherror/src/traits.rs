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

//! Extension traits for converting & propagating errors into [`Error`].

use crate::{BhError, Error, Result};

/// A boxed foreign error, as returned by trait-object backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Converts a foreign error (one implementing [`std::error::Error`] but not [`BhError`]) into an
/// [`Error`], keeping the foreign error as the source.
pub trait ForeignError<T> {
    /// Propagate a foreign error as the source of the [`BhError`] produced by `op`.
    fn foreign_err<E, F>(self, op: F) -> Result<T, E>
    where
        E: BhError,
        F: FnOnce() -> E;
}

impl<T, S> ForeignError<T> for std::result::Result<T, S>
where
    S: std::error::Error + Send + Sync + 'static,
{
    fn foreign_err<E, F>(self, op: F) -> Result<T, E>
    where
        E: BhError,
        F: FnOnce() -> E,
    {
        self.map_err(|source| Error::from_source(op(), Box::new(source)))
    }
}

/// Converts a boxed foreign error into an [`Error`], keeping it as the source.
///
/// This is the [`ForeignError`] counterpart for backends whose error type is not statically
/// known, i.e. for `Result<T, BoxError>`.
pub trait ForeignBoxed<T> {
    /// Propagate a boxed foreign error as the source of the [`BhError`] produced by `op`.
    fn foreign_boxed_err<E, F>(self, op: F) -> Result<T, E>
    where
        E: BhError,
        F: FnOnce() -> E;
}

impl<T> ForeignBoxed<T> for std::result::Result<T, BoxError> {
    fn foreign_boxed_err<E, F>(self, op: F) -> Result<T, E>
    where
        E: BhError,
        F: FnOnce() -> E,
    {
        self.map_err(|source| Error::from_source(op(), source))
    }
}

/// Propagates an [`Error<S>`] as the source of an [`Error<E>`], preserving the chain of source
/// errors.
pub trait PropagateError<T, S>
where
    S: BhError,
{
    /// Propagate with the target error produced independently of the source.
    fn with_err<E, F>(self, op: F) -> Result<T, E>
    where
        E: BhError,
        F: FnOnce() -> E;

    /// Propagate with the target error derived from the source error variant.
    fn match_err<E, F>(self, op: F) -> Result<T, E>
    where
        E: BhError,
        F: FnOnce(&S) -> E;
}

impl<T, S> PropagateError<T, S> for Result<T, S>
where
    S: BhError,
{
    fn with_err<E, F>(self, op: F) -> Result<T, E>
    where
        E: BhError,
        F: FnOnce() -> E,
    {
        self.map_err(|source| Error::from_source(op(), Box::new(source)))
    }

    fn match_err<E, F>(self, op: F) -> Result<T, E>
    where
        E: BhError,
        F: FnOnce(&S) -> E,
    {
        self.map_err(|source| {
            let error = op(&source.error);
            Error::from_source(error, Box::new(source))
        })
    }
}

/// Extends [`Result`] with the [`Error::ctx`] method.
pub trait ErrorContext<T, E>
where
    E: BhError,
{
    /// Attach additional context to the error, if any.  The `op` closure is only evaluated on
    /// the error path.
    fn ctx<C, F>(self, op: F) -> Result<T, E>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    E: BhError,
{
    fn ctx<C, F>(self, op: F) -> Result<T, E>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| error.ctx(op()))
    }
}

/// Extends [`Result`] with error-level logging.
///
/// Note that all constructed errors are logged as warnings regardless; this trait escalates to
/// the error level at call sites which consider the error fatal.
pub trait Loggable {
    /// Logs the error if it occurred.
    fn log_err(self) -> Self;
}

impl<T, E> Loggable for Result<T, E>
where
    E: BhError,
{
    #[track_caller]
    fn log_err(self) -> Self {
        let location = std::panic::Location::caller();

        self.map_err(|error| {
            log::error!(target: &location.to_string(), "{:?}", error);
            error
        })
    }
}
