//! Byte transport abstraction used by the master.
//!
//! A transport moves raw bytes; it knows nothing about frames. Serial ports,
//! TCP gateways and in-memory pipes all fit behind [`Transport`], and
//! [`StreamTransport`] adapts anything implementing tokio's `AsyncRead` and
//! `AsyncWrite`.

use crate::error::MBusError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;

/// Default line speed used when the transport does not report one.
pub const DEFAULT_BAUD_RATE: u32 = 2400;

#[async_trait::async_trait]
pub trait Transport: Send {
    /// Writes all bytes and flushes them to the line.
    async fn write(&mut self, data: &[u8]) -> Result<(), MBusError>;

    /// Reads whatever is available, waiting until at least one byte arrives.
    /// Returns the number of bytes stored in `buf`.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MBusError>;

    /// Line speed in bits per second, used for response timeouts.
    fn baud_rate(&self) -> u32 {
        DEFAULT_BAUD_RATE
    }
}

/// A [`Transport`] over any async byte stream, e.g. a serial port device
/// opened with tokio or a TCP connection to a level converter.
#[derive(Debug)]
pub struct StreamTransport<T> {
    stream: T,
    baud_rate: u32,
}

impl<T> StreamTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: T, baud_rate: u32) -> Self {
        Self { stream, baud_rate }
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

#[async_trait::async_trait]
impl<T> Transport for StreamTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, data: &[u8]) -> Result<(), MBusError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MBusError> {
        match self.stream.read(buf).await? {
            0 if !buf.is_empty() => Err(MBusError::Transport("connection closed".into())),
            n => Ok(n),
        }
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

/// Opens a serial port with the M-Bus character format (8 data bits, even
/// parity, one stop bit).
pub fn open_serial(
    port_name: &str,
    baud_rate: u32,
) -> Result<StreamTransport<tokio_serial::SerialStream>, MBusError> {
    let port = tokio_serial::new(port_name, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::Even)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| MBusError::Transport(format!("{port_name}: {e}")))?;
    Ok(StreamTransport::new(port, baud_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_round_trip() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(a, 9600);
        assert_eq!(transport.baud_rate(), 9600);

        transport.write(&[0x10, 0x40, 0x01, 0x41, 0x16]).await.unwrap();
        let mut received = [0u8; 5];
        b.read_exact(&mut received).await.unwrap();
        assert_eq!(received, [0x10, 0x40, 0x01, 0x41, 0x16]);

        b.write_all(&[0xE5]).await.unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).await.unwrap(), 1);
        assert_eq!(buf[0], 0xE5);
    }

    #[tokio::test]
    async fn closed_peer_is_a_transport_error() {
        let (a, b) = tokio::io::duplex(8);
        drop(b);
        let mut transport = StreamTransport::new(a, 2400);
        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.read(&mut buf).await,
            Err(MBusError::Transport(_))
        ));
    }
}
