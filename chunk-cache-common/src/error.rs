// Copyright 2026 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    backtrace::Backtrace,
    fmt::{Debug, Display},
    sync::Arc,
};

/// ErrorKind is all kinds of recoverable Error of chunk-cache.
///
/// Broken pin/unpin pairing and accounting drift are not errors, they panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// I/O error while loading or spilling a chunk.
    Io,
    /// Config error.
    Config,
    /// External error.
    External,
    /// The requested chunk coordinates are outside of the array bounds.
    ChunkOutOfBounds,
    /// A chunk already exists at the requested address.
    ChunkAlreadyExists,
    /// The iterator is not positioned at a chunk.
    NoCurrentChunk,
    /// The on-disk chunk header is not valid.
    ChunkCorrupted,
    /// The query or session that owns the array is gone.
    InvalidSession,
    /// The store has been closed.
    Closed,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::Io => "I/O error",
            ErrorKind::Config => "Config error",
            ErrorKind::External => "External error",
            ErrorKind::ChunkOutOfBounds => "Chunk out of bounds",
            ErrorKind::ChunkAlreadyExists => "Chunk already exists",
            ErrorKind::NoCurrentChunk => "No current chunk",
            ErrorKind::ChunkCorrupted => "Chunk corrupted",
            ErrorKind::InvalidSession => "Invalid session",
            ErrorKind::Closed => "Closed",
        }
    }
}

/// Error is the error struct returned by all chunk-cache functions.
///
/// ## Display
///
/// - Via `Display`, the error is printed in a single line:
///
/// ```shell
/// Chunk out of bounds, context: { array: a, coords: [100] } => chunk out of boundaries
/// ```
///
/// - Via `Debug`, the error is printed in multiple lines with context, source and backtrace (if captured).
///
/// - Via `{:#?}`, the conventional struct-style representation is used.
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,

    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            de.field("backtrace", &self.backtrace);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "  {}: {}", k, v)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "  {source:#}")?;
        }

        if let Some(backtrace) = &self.backtrace {
            writeln!(f)?;
            writeln!(f, "Backtrace:")?;
            writeln!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            let mut iter = self.context.iter().peekable();
            while let Some((k, v)) = iter.next() {
                write!(f, "{}: {}", k, v)?;
                if iter.peek().is_some() {
                    write!(f, ", ")?;
                }
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            context: self.context.clone(),
            source: self.source.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}

impl Error {
    /// Create a new error.
    ///
    /// If the error needs to carry a source error, please use `with_source` method.
    ///
    /// ```rust
    /// # use chunk_cache_common::error::{Error, ErrorKind};
    /// let io_error = std::io::Error::other("disk is gone");
    /// Error::new(ErrorKind::Io, "spill chunk failed").with_source(io_error);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
            backtrace: Some(Arc::new(Backtrace::capture())),
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error context.
    pub fn context(&self) -> &Vec<(&'static str, String)> {
        &self.context
    }

    /// Get the error backtrace.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Get the error source.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the reference of the source error to a specific error type reference.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

/// Result type for chunk-cache.
pub type Result<T> = std::result::Result<T, Error>;

/// Helper methods for Error.
impl Error {
    /// Helper for creating an [`ErrorKind::Io`] error from [`std::io::Error`].
    pub fn io_error(source: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, "disk store i/o failed").with_source(source)
    }

    /// Helper for creating an [`ErrorKind::ChunkOutOfBounds`] error.
    pub fn out_of_bounds(array: &str, coords: &[i64]) -> Self {
        Error::new(ErrorKind::ChunkOutOfBounds, "chunk out of boundaries")
            .with_context("array", array)
            .with_context("coords", format!("{coords:?}"))
    }

    /// Helper for creating an [`ErrorKind::ChunkAlreadyExists`] error.
    pub fn already_exists(array: &str, attribute: u32, coords: &[i64]) -> Self {
        Error::new(ErrorKind::ChunkAlreadyExists, "chunk already exists")
            .with_context("array", array)
            .with_context("attribute", attribute)
            .with_context("coords", format!("{coords:?}"))
    }

    /// Helper for creating an [`ErrorKind::NoCurrentChunk`] error.
    pub fn no_current_chunk(attribute: u32) -> Self {
        Error::new(ErrorKind::NoCurrentChunk, "iterator is not positioned at a chunk").with_context("attribute", attribute)
    }

    /// Helper for creating an [`ErrorKind::ChunkCorrupted`] error.
    pub fn corrupted(store: impl ToString, offset: u64) -> Self {
        Error::new(ErrorKind::ChunkCorrupted, "invalid chunk header")
            .with_context("store", store)
            .with_context("offset", offset)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::io_error(e)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Error>();
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn test_error_display() {
        let io_error = std::io::Error::other("short write");
        let err = Error::new(ErrorKind::Io, "spill chunk failed")
            .with_source(io_error)
            .with_context("store", 3)
            .with_context("offset", 4096);

        assert_eq!(
            "I/O error, context: { store: 3, offset: 4096 } => spill chunk failed, source: short write",
            err.to_string()
        );
    }

    #[test]
    fn test_error_helpers() {
        let err = Error::out_of_bounds("a", &[100, 2]);
        assert_eq!(err.kind(), ErrorKind::ChunkOutOfBounds);
        assert_eq!(
            "Chunk out of bounds, context: { array: a, coords: [100, 2] } => chunk out of boundaries",
            err.to_string()
        );

        let err: Error = std::io::Error::other("boom").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_error_downcast() {
        let inner = TestError("the chunk is not there".to_string());
        let err = Error::new(ErrorKind::External, "").with_source(inner.clone());

        let downcasted = err.downcast_ref::<TestError>().unwrap();
        assert_eq!(downcasted, &inner);
    }
}
