use crate::prelude::{ProcessingError, ProcessingResult, Sample};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Instant;

/// Creates a bounded chunk channel between a capture source and the framer.
pub fn sample_channel(capacity: usize) -> (SampleWriter, SampleStream) {
    let (sender, receiver) = bounded(capacity.max(1));
    (SampleWriter { sender }, SampleStream { receiver })
}

/// Producer half, owned by the capture source.
#[derive(Clone)]
pub struct SampleWriter {
    sender: Sender<Vec<Sample>>,
}

impl SampleWriter {
    /// Appends a chunk, blocking while the channel is full.
    pub fn push(&self, chunk: Vec<Sample>) -> ProcessingResult<()> {
        self.sender
            .send(chunk)
            .map_err(|_| ProcessingError::InvalidInput("sample stream closed".into()))
    }

    /// Appends without blocking; returns `false` when the chunk was not accepted.
    pub fn try_push(&self, chunk: Vec<Sample>) -> bool {
        match self.sender.try_send(chunk) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer half: an ordered, append-only sequence of sample chunks.
pub struct SampleStream {
    receiver: Receiver<Vec<Sample>>,
}

impl SampleStream {
    /// A finite stream holding exactly `samples`, already closed for writing.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        let (writer, stream) = sample_channel(1);
        // Capacity one guarantees the single send succeeds without a reader.
        let _ = writer.try_push(samples);
        stream
    }

    /// Waits for the next chunk until `deadline`. `None` means the deadline
    /// passed or every writer has gone away.
    pub fn next_chunk(&self, deadline: Instant) -> Option<Vec<Sample>> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.receiver.recv_timeout(timeout) {
            Ok(chunk) => Some(chunk),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn finite_stream_yields_once_then_ends() {
        let stream = SampleStream::from_samples(vec![Sample::new(1.0, 0.0); 4]);
        let deadline = Instant::now() + Duration::from_millis(10);
        assert_eq!(stream.next_chunk(deadline).map(|c| c.len()), Some(4));
        assert!(stream.next_chunk(deadline).is_none());
    }

    #[test]
    fn try_push_reports_full_channel() {
        let (writer, _stream) = sample_channel(1);
        assert!(writer.try_push(vec![Sample::new(0.0, 0.0)]));
        assert!(!writer.try_push(vec![Sample::new(0.0, 0.0)]));
    }
}
