//! Scripted in-memory transport for tests and simulations.
//!
//! Every write made by the master consumes one scripted reply. A reply is a
//! byte sequence that becomes readable right away, or silence. Bytes can also
//! be pushed at any time with [`MockTransport::push_rx`].

use crate::error::MBusError;
use crate::mbus::frame::MBusFrame;
use crate::mbus::transport::{Transport, DEFAULT_BAUD_RATE};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct MockState {
    writes: Vec<Vec<u8>>,
    replies: VecDeque<Option<Vec<u8>>>,
    rx: VecDeque<u8>,
    write_error: Option<String>,
}

/// Cloneable handle; clones share the same line.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    readable: Arc<Notify>,
    baud_rate: u32,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_baud_rate(DEFAULT_BAUD_RATE)
    }

    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            readable: Arc::new(Notify::new()),
            baud_rate,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answers the next unanswered write with `bytes`.
    pub fn queue_reply(&self, bytes: &[u8]) {
        self.state().replies.push_back(Some(bytes.to_vec()));
    }

    /// Leaves the next unanswered write without an answer.
    pub fn queue_silence(&self) {
        self.state().replies.push_back(None);
    }

    /// Answers the next unanswered write with an encoded frame.
    pub fn queue_frame_response(&self, frame: &MBusFrame) -> Result<(), MBusError> {
        let bytes = frame.to_bytes()?;
        self.queue_reply(&bytes);
        Ok(())
    }

    /// Makes bytes readable immediately, independent of any write.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state().rx.extend(bytes.iter().copied());
        self.readable.notify_one();
    }

    /// The next write fails with a transport error.
    pub fn fail_next_write(&self, reason: &str) {
        self.state().write_error = Some(reason.to_string());
    }

    /// Everything written so far, one entry per write call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state().writes.len()
    }

    pub fn pending_replies(&self) -> usize {
        self.state().replies.len()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), MBusError> {
        let mut state = self.state();
        if let Some(reason) = state.write_error.take() {
            return Err(MBusError::Transport(reason));
        }
        state.writes.push(data.to_vec());
        if let Some(Some(reply)) = state.replies.pop_front() {
            state.rx.extend(reply);
            drop(state);
            self.readable.notify_one();
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MBusError> {
        loop {
            {
                let mut state = self.state();
                if !state.rx.is_empty() {
                    let n = buf.len().min(state.rx.len());
                    for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
            self.readable.notified().await;
        }
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}
