// Grouping stage - turns a stream of elements into fixed-size groups
//
// A single task owns the pending group, so it needs no synchronization of
// its own. Groups are emitted in arrival order; when the input closes the
// remaining partial group is emitted and the output is closed.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Regroups elements received on `input` into groups of `size`
pub struct GroupingChannel<T> {
    grouped: mpsc::Receiver<Vec<T>>,
    handle: JoinHandle<()>,
}

impl<T: Send + 'static> GroupingChannel<T> {
    /// Spawns the grouping task
    ///
    /// # Arguments
    /// * `size` - Number of elements per group, must be non-zero
    /// * `input` - Element stream; closing every sender ends the stage
    pub fn new(size: usize, input: mpsc::Receiver<T>) -> Self {
        let size = size.max(1);
        let (output, grouped) = mpsc::channel(size);
        let handle = tokio::spawn(Self::run(size, input, output));

        GroupingChannel { grouped, handle }
    }

    async fn run(size: usize, mut input: mpsc::Receiver<T>, output: mpsc::Sender<Vec<T>>) {
        let mut pending = Vec::with_capacity(size);

        while let Some(element) = input.recv().await {
            pending.push(element);
            if pending.len() == size {
                let group = std::mem::replace(&mut pending, Vec::with_capacity(size));
                if output.send(group).await.is_err() {
                    debug!("Grouped output dropped, stopping grouping stage");
                    return;
                }
            }
        }

        if !pending.is_empty() {
            debug!("Input closed, emitting final group of {} element(s)", pending.len());
            let _ = output.send(pending).await;
        }
    }

    /// Receives the next group, `None` once the input is exhausted and every
    /// group has been delivered
    pub async fn recv(&mut self) -> Option<Vec<T>> {
        self.grouped.recv().await
    }

    /// Waits for the grouping task to terminate
    ///
    /// The task only ends after its output is closed, so callers must have
    /// drained (or dropped interest in) the groups first.
    pub async fn finished(self) -> Result<(), tokio::task::JoinError> {
        drop(self.grouped);
        self.handle.await
    }
}
