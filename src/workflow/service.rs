//! Turn-level service
//!
//! Loads a thread's checkpoint, runs one turn, and saves the result. Turns
//! for the same thread id are serialised through a per-thread async mutex;
//! distinct threads run independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::engine::Engine;
use super::state::{TurnOutcome, WorkflowState};
use crate::checkpoint::{is_valid_thread_id, CheckpointStore};
use crate::error::WorkflowError;

type ThreadLock = Arc<tokio::sync::Mutex<()>>;

pub struct QueryAssistant {
    engine: Arc<Engine>,
    store: Arc<dyn CheckpointStore>,
    locks: Mutex<HashMap<String, ThreadLock>>,
}

impl QueryAssistant {
    pub fn new(engine: Engine, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            engine: Arc::new(engine),
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn lock_for(&self, thread_id: &str) -> ThreadLock {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the map entry for `thread_id` unless another caller still holds it
    fn release(&self, thread_id: &str, lock: ThreadLock) {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // The map's copy plus ours
        if Arc::strong_count(&lock) == 2 {
            locks.remove(thread_id);
        }
    }

    /// Number of threads with a live lock entry
    pub fn tracked_threads(&self) -> usize {
        match self.locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn check_thread_id(thread_id: &str) -> Result<(), WorkflowError> {
        if is_valid_thread_id(thread_id) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidThreadId(thread_id.to_string()))
        }
    }

    /// Process one user utterance for `thread_id`
    ///
    /// A suspended thread resumes here: the utterance is treated as the
    /// answer to the pending question.
    pub async fn handle_turn(
        &self,
        thread_id: &str,
        utterance: &str,
    ) -> Result<TurnOutcome, WorkflowError> {
        Self::check_thread_id(thread_id)?;
        let lock = self.lock_for(thread_id);
        let guard = lock.lock().await;
        let result = self.run_locked(thread_id, utterance).await;
        drop(guard);
        self.release(thread_id, lock);
        result
    }

    async fn run_locked(
        &self,
        thread_id: &str,
        utterance: &str,
    ) -> Result<TurnOutcome, WorkflowError> {
        let mut state = match self.store.load(thread_id).await? {
            Some(state) => {
                debug!(thread_id, resumed = state.needs_human_input, "Loaded thread state");
                state
            }
            None => {
                info!(thread_id, "Starting new thread");
                WorkflowState::new(thread_id)
            }
        };

        self.engine.run_turn(&mut state, utterance).await?;
        self.store.save(&state).await?;
        Ok(state.outcome())
    }

    /// Current state of a thread, if it exists
    pub async fn snapshot(&self, thread_id: &str) -> Result<Option<WorkflowState>, WorkflowError> {
        Self::check_thread_id(thread_id)?;
        let lock = self.lock_for(thread_id);
        let guard = lock.lock().await;
        let loaded = self.store.load(thread_id).await;
        drop(guard);
        self.release(thread_id, lock);
        Ok(loaded?)
    }

    /// Forget a thread entirely
    pub async fn reset(&self, thread_id: &str) -> Result<(), WorkflowError> {
        Self::check_thread_id(thread_id)?;
        let lock = self.lock_for(thread_id);
        let guard = lock.lock().await;
        let deleted = self.store.delete(thread_id).await;
        drop(guard);
        self.release(thread_id, lock);
        deleted?;
        info!(thread_id, "Thread reset");
        Ok(())
    }
}
