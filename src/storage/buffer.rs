// Bulk buffer - accumulates documents and flushes at capacity
//
// The buffer and the known-index cache share one async mutex. The caller
// that fills the buffer performs the flush while holding it, so concurrent
// producers wait for the write to complete.

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::bulk::{BulkExecutor, BulkOutcome, FlushError};
use super::document::IndexDocument;
use super::indices::IndexManager;
use super::StorageError;

struct BufferState {
    documents: Vec<IndexDocument>,
    indices: IndexManager,
    closed: bool,
}

/// Fixed-capacity buffer in front of a [`BulkExecutor`]
pub struct BulkBuffer {
    state: Mutex<BufferState>,
    executor: BulkExecutor,
    capacity: usize,
}

impl BulkBuffer {
    pub fn new(executor: BulkExecutor, indices: IndexManager, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BulkBuffer {
            state: Mutex::new(BufferState {
                documents: Vec::with_capacity(capacity),
                indices,
                closed: false,
            }),
            executor,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn executor(&self) -> &BulkExecutor {
        &self.executor
    }

    /// Appends a document, flushing synchronously once the buffer is full
    ///
    /// The buffer is emptied after a flush whatever its outcome; flush errors
    /// are returned as [`StorageError::Flush`].
    pub async fn add(&self, document: IndexDocument) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(StorageError::Closed);
        }

        state.documents.push(document);
        if state.documents.len() >= self.capacity {
            self.flush_locked(&mut state).await?;
        }
        Ok(())
    }

    /// Flushes whatever is buffered, even below capacity
    pub async fn flush(&self) -> Result<BulkOutcome, FlushError> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }

    /// Flushes the remaining documents and refuses any further `add`
    pub async fn close(&self) -> Result<BulkOutcome, FlushError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(BulkOutcome::default());
        }
        state.closed = true;
        info!("Closing bulk buffer with {} pending document(s)", state.documents.len());
        self.flush_locked(&mut state).await
    }

    /// Resolves today's indices without writing anything
    pub async fn resolve_indices(&self) -> Result<(), FlushError> {
        let mut state = self.state.lock().await;
        state
            .indices
            .current_indices(self.executor.client())
            .await?;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of indices confirmed to exist
    pub async fn known_indices(&self) -> usize {
        self.state.lock().await.indices.known_count()
    }

    async fn flush_locked(&self, state: &mut BufferState) -> Result<BulkOutcome, FlushError> {
        if state.documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let batch = std::mem::replace(&mut state.documents, Vec::with_capacity(self.capacity));
        debug!("Flushing {} document(s)", batch.len());
        self.executor.flush(&batch, &mut state.indices).await
    }
}
