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

//! A table checks the liveness of its owning query before every pin it performs. Unpin never checks it, so pins can
//! always be released on error paths.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, ErrorKind, Result};

/// Liveness of the query or session that owns an array.
pub trait Session: Send + Sync + 'static {
    /// Return [`ErrorKind::InvalidSession`] if the owner is gone.
    fn validate(&self) -> Result<()>;
}

/// A session that is always valid.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSession;

impl Session for NoSession {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// A session that can be cancelled from any thread.
#[derive(Debug)]
pub struct SessionFlag {
    id: u64,
    cancelled: AtomicBool,
}

impl SessionFlag {
    /// Create a live session with the given id.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Mark the session as gone. Later pins through tables owned by this session fail.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if the session has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Session for SessionFlag {
    fn validate(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::new(ErrorKind::InvalidSession, "session has been cancelled").with_context("session", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_session_flag() {
        let session = Arc::new(SessionFlag::new(42));
        session.validate().unwrap();

        let s = session.clone();
        std::thread::spawn(move || s.cancel()).join().unwrap();

        let err = session.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSession);
        assert!(NoSession.validate().is_ok());
    }
}
