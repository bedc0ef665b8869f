use actor_protocol::CalibrationError;
use core_types::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("MAVLink encode failed: {0}")]
    Encode(String),

    #[error("Command {0} has no MAVLink encoding")]
    UnsupportedCommand(u32),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<LinkError> for CalibrationError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Transport(inner) => inner.into(),
            other => CalibrationError::Transport(other.to_string()),
        }
    }
}
