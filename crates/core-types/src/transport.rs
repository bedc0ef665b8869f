use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Other: {0}")]
    Other(String),
}

/// A generic async byte transport to the vehicle (serial, UDP, TCP, Bluetooth).
///
/// Opening and tearing down the physical link is the implementor's business;
/// the engine only reads chunks and writes encoded commands.
///
/// Methods take `&self` so a single transport can be shared between the
/// inbound pump and the outbound link actor.
#[allow(async_fn_in_trait)]
pub trait Transport: Send + Sync {
    /// Read a chunk of bytes.
    /// Returns (data, timestamp in microseconds).
    async fn read_chunk(&self) -> Result<(Vec<u8>, u64), TransportError>;

    /// Write bytes to the transport.
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;
}
