use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("reactor is not configured")]
    ReactorMissing,
    #[error("reactor has been shut down")]
    ReactorGone,
    #[error("ticket pool exhausted ({0} tickets in use)")]
    TicketsExhausted(usize),
    #[error("invalid: {0}")]
    Invalid(String),
}
