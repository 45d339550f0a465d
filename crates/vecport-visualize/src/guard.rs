//! Scoped ownership of a [`VectorSource`]: closed on every exit path.

use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::source::VectorSource;

/// Owns a source and closes it when dropped.
pub struct ConnectionGuard<S: VectorSource> {
    source: S,
}

impl<S: VectorSource> ConnectionGuard<S> {
    /// Take ownership of `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: VectorSource> Deref for ConnectionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.source
    }
}

impl<S: VectorSource> DerefMut for ConnectionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: VectorSource> Drop for ConnectionGuard<S> {
    fn drop(&mut self) {
        match self.source.close() {
            Ok(()) => debug!("database connection closed"),
            Err(e) => warn!(error = %e, "closing database connection failed"),
        }
    }
}
