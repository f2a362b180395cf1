use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::attempts::AttemptLifecycleService;
use crate::config::EngineConfig;
use crate::error::EngineInitError;
use crate::progress::ProgressService;

/// Assembles the lifecycle and progress services over one `Storage`.
#[derive(Clone)]
pub struct ProgressEngine {
    attempts: Arc<AttemptLifecycleService>,
    progress: Arc<ProgressService>,
}

impl ProgressEngine {
    /// # Errors
    ///
    /// Returns `EngineInitError::Config` if `config` fails validation.
    pub fn new(
        storage: &Storage,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, EngineInitError> {
        let attempts = AttemptLifecycleService::new(clock, Arc::clone(&storage.attempts));
        let progress = ProgressService::new(
            clock,
            config,
            attempts.clone(),
            Arc::clone(&storage.mastery),
            Arc::clone(&storage.difficulty),
        )?;
        Ok(Self {
            attempts: Arc::new(attempts),
            progress: Arc::new(progress),
        })
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `EngineInitError` if storage initialization or config
    /// validation fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, EngineInitError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::new(&storage, clock, config)
    }

    /// # Errors
    ///
    /// Returns `EngineInitError::Config` if `config` fails validation.
    pub fn in_memory(clock: Clock, config: EngineConfig) -> Result<Self, EngineInitError> {
        Self::new(&Storage::in_memory(), clock, config)
    }

    #[must_use]
    pub fn attempts(&self) -> Arc<AttemptLifecycleService> {
        Arc::clone(&self.attempts)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }
}
