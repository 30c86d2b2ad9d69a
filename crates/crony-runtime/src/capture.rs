//! Bounded stdout/stderr capture.
//!
//! Workload output can be arbitrarily large, so each stream is kept in a
//! fixed-capacity ring buffer that drops the oldest bytes on overflow. Capture
//! never fails or blocks because of size; it only degrades by truncation.

use std::collections::VecDeque;

use crony_core::CapturedOutput;
use futures_util::StreamExt;

use crate::{
    error::Result,
    types::{LogFrame, LogStream, StreamKind},
};

/// Default per-stream capacity (1 MiB).
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// Fixed-capacity byte buffer retaining the most recent `capacity` bytes.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buf: VecDeque<u8>,
    capacity: usize,
    total_written: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
            total_written: 0,
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        self.total_written += data.len() as u64;
        if self.capacity == 0 {
            return;
        }

        // Only the tail of an oversized write can survive.
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };

        let overflow = (self.buf.len() + data.len()).saturating_sub(self.capacity);
        self.buf.drain(..overflow);
        self.buf.extend(data);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes ever written, including the ones already discarded.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn truncated(&self) -> bool {
        self.total_written > self.buf.len() as u64
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let (front, back) = self.buf.as_slices();
        let mut out = Vec::with_capacity(self.buf.len());
        out.extend_from_slice(front);
        out.extend_from_slice(back);
        out
    }

    /// Contents as text; invalid UTF-8 (including a code point cut by
    /// truncation) is replaced.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.to_vec()).into_owned()
    }
}

/// Routes tagged log frames into one ring buffer per stream.
#[derive(Debug, Clone)]
pub struct OutputCapture {
    stdout: RingBuffer,
    stderr: RingBuffer,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stdout: RingBuffer::new(capacity),
            stderr: RingBuffer::new(capacity),
        }
    }

    pub fn write(&mut self, frame: &LogFrame) {
        match frame.stream {
            StreamKind::Stdout => self.stdout.write(&frame.data),
            StreamKind::Stderr => self.stderr.write(&frame.data),
        }
    }

    /// Consume `stream` until it ends.
    ///
    /// A stream error stops the drain and is returned; whatever was captured
    /// before it stays in the buffers.
    pub async fn drain(&mut self, mut stream: LogStream) -> Result<()> {
        while let Some(frame) = stream.next().await {
            self.write(&frame?);
        }
        Ok(())
    }

    pub fn stdout(&self) -> &RingBuffer {
        &self.stdout
    }

    pub fn stderr(&self) -> &RingBuffer {
        &self.stderr
    }

    pub fn into_output(self) -> CapturedOutput {
        CapturedOutput {
            stdout: self.stdout.to_string_lossy(),
            stderr: self.stderr.to_string_lossy(),
        }
    }
}

impl Default for OutputCapture {
    fn default() -> Self {
        Self::new()
    }
}
