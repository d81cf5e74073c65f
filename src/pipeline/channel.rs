use crate::storage::Checkpoint;
use tokio::sync::mpsc;

/// Carries advanced checkpoints from object tasks to the run's drain task.
pub type ResultsSender = mpsc::Sender<Checkpoint>;
pub type ResultsReceiver = mpsc::Receiver<Checkpoint>;

/// Bounded results channel sized for `concurrency` tasks in flight.
pub fn results_channel(concurrency: usize) -> (ResultsSender, ResultsReceiver) {
    mpsc::channel(concurrency.max(1) * 2)
}
