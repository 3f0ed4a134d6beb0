//! Shared in-process "server" state behind the memory backends.
//!
//! A [`MemoryServer`] plays the role of a remote storage engine: it holds
//! named databases and hands out [`Session`]s. Clones share the same data, so
//! a server can outlive the coordinators connected to it and be inspected
//! from tests.

use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use storelayer_core::error::{StoreError, StoreResult};

/// Named databases of type `T`, shared between clones.
pub struct MemoryServer<T> {
    databases: Arc<RwLock<HashMap<String, T>>>,
    available: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
}

impl<T: Default + Send + Sync> MemoryServer<T> {
    pub fn new() -> Self {
        Self {
            databases: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes the server refuse (or accept again) new sessions.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of sessions opened so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Opens a session on `database`, creating the database if needed.
    pub async fn open(&self, database: &str) -> StoreResult<Session<T>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("Server is unreachable".to_string()));
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        self.databases
            .write()
            .await
            .entry(database.to_string())
            .or_default();

        Ok(Session {
            server: self.clone(),
            database: database.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    /// Names of the databases currently held.
    pub async fn databases(&self) -> Vec<String> {
        let mut names = self.databases.read().await.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl<T: Default + Send + Sync> Default for MemoryServer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MemoryServer<T> {
    fn clone(&self) -> Self {
        Self {
            databases: self.databases.clone(),
            available: self.available.clone(),
            connects: self.connects.clone(),
        }
    }
}

impl<T> fmt::Debug for MemoryServer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryServer")
            .field("available", &self.available.load(Ordering::SeqCst))
            .field("connects", &self.connects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// A live link to one database of a [`MemoryServer`].
///
/// Every operation on a closed session fails with [`StoreError::Connection`].
pub struct Session<T> {
    server: MemoryServer<T>,
    database: String,
    closed: AtomicBool,
}

impl<T: Default + Send + Sync> Session<T> {
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Connection(format!(
                "Session on {} is closed",
                self.database
            )));
        }

        Ok(())
    }

    /// Runs `f` against a shared view of the database.
    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> StoreResult<R> {
        self.ensure_open()?;

        let databases = self.server.databases.read().await;

        Ok(match databases.get(&self.database) {
            Some(database) => f(database),
            None => f(&T::default()),
        })
    }

    /// Runs `f` against an exclusive view of the database.
    pub async fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> StoreResult<R> {
        self.ensure_open()?;

        let mut databases = self.server.databases.write().await;

        Ok(f(databases.entry(self.database.clone()).or_default()))
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
