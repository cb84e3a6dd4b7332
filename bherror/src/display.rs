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

//! [`Display`] & [`Debug`] implementations for [`Error`].

use std::fmt::{Debug, Display};

use crate::{BhError, Error};

impl<E> Display for Error<E>
where
    E: BhError,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;

        for context in &self.context {
            write!(f, "; {}", context)?;
        }

        Ok(())
    }
}

impl<E> Debug for Error<E>
where
    E: BhError,
{
    /// Writes the whole error chain, one source per line.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)?;

        let mut source = std::error::Error::source(self);
        while let Some(error) = source {
            write!(f, "\n  caused by: {}", error)?;
            source = error.source();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        tests::DummyError,
        traits::{ErrorContext, PropagateError},
        Error, Result,
    };

    #[test]
    fn display_includes_contexts() {
        let error = Error::root(DummyError::Inner).ctx("while testing");

        assert_eq!(error.to_string(), "inner error; while testing");
    }

    #[test]
    fn debug_includes_chain() {
        let inner: Result<(), DummyError> = Err(Error::root(DummyError::Inner));
        let outer = inner
            .with_err(|| DummyError::Outer)
            .ctx(|| "top level")
            .unwrap_err();

        let debug = format!("{:?}", outer);
        assert_eq!(debug, "outer error; top level\n  caused by: inner error");
    }
}
