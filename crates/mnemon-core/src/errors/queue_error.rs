/// Errors raised by the job queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job {id} is not leased (status: {status})")]
    NotLeased { id: String, status: String },

    #[error("job {id} missing its {field} key")]
    MissingKey { id: String, field: &'static str },
}
