use tokio::sync::oneshot;

#[derive(Debug)]
pub enum JanitorMessage {
    /// Run a sweep now and report how many entries were deleted.
    SweepNow { response: oneshot::Sender<usize> },
}
