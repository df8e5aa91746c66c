//! Bounded PCM ring between the relay and the audio callback
//!
//! The writer blocks while the ring is full, which is how device
//! backpressure reaches the engine threads. The reader never blocks; it is
//! called from the audio callback and pads with silence on underrun.

use crate::playback::SinkError;
use std::sync::{Condvar, Mutex};

struct RingState {
    buffer: Vec<i16>,
    write_pos: usize,
    read_pos: usize,
    len: usize,
    closed: bool,
}

/// Blocking bounded ring buffer for i16 samples.
pub struct PcmRing {
    state: Mutex<RingState>,
    space_available: Condvar,
}

impl PcmRing {
    /// Create a ring holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                buffer: vec![0; capacity.max(1)],
                write_pos: 0,
                read_pos: 0,
                len: 0,
                closed: false,
            }),
            space_available: Condvar::new(),
        }
    }

    /// Write all of `samples`, blocking whenever the ring is full.
    ///
    /// Returns [`SinkError::Closed`] as soon as the ring is closed, also
    /// when that happens mid-write.
    pub fn write_blocking(&self, samples: &[i16]) -> Result<(), SinkError> {
        let mut remaining = samples;
        let mut state = self.state.lock().unwrap();

        loop {
            if state.closed {
                return Err(SinkError::Closed);
            }
            if remaining.is_empty() {
                return Ok(());
            }

            let free = state.buffer.len() - state.len;
            if free == 0 {
                state = self.space_available.wait(state).unwrap();
                continue;
            }

            let count = remaining.len().min(free);
            for &sample in &remaining[..count] {
                let pos = state.write_pos;
                state.buffer[pos] = sample;
                state.write_pos = (pos + 1) % state.buffer.len();
            }
            state.len += count;
            remaining = &remaining[count..];
        }
    }

    /// Fill `output` from the ring, padding with silence on underrun.
    /// Returns the number of real samples copied.
    pub fn read(&self, output: &mut [i16]) -> usize {
        let mut state = self.state.lock().unwrap();

        let count = output.len().min(state.len);
        for sample in output.iter_mut().take(count) {
            let pos = state.read_pos;
            *sample = state.buffer[pos];
            state.read_pos = (pos + 1) % state.buffer.len();
        }
        state.len -= count;

        for sample in output[count..].iter_mut() {
            *sample = 0;
        }
        drop(state);

        if count > 0 {
            self.space_available.notify_all();
        }
        count
    }

    /// Close the ring and wake every blocked writer. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.space_available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Number of samples currently buffered.
    pub fn available(&self) -> usize {
        self.state.lock().unwrap().len
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().unwrap().buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_basic_write_read() {
        let ring = PcmRing::new(1024);

        ring.write_blocking(&[1, 2, 3, 4]).unwrap();
        assert_eq!(ring.available(), 4);

        let mut output = [0i16; 4];
        assert_eq!(ring.read(&mut output), 4);
        assert_eq!(output, [1, 2, 3, 4]);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_underrun_silence() {
        let ring = PcmRing::new(1024);
        ring.write_blocking(&[5, 6]).unwrap();

        let mut output = [9i16; 4];
        assert_eq!(ring.read(&mut output), 2);
        assert_eq!(output, [5, 6, 0, 0]); // Last two are silence
    }

    #[test]
    fn test_wrap_around_preserves_order() {
        let ring = PcmRing::new(8);

        ring.write_blocking(&[1, 2, 3, 4, 5]).unwrap();
        let mut out = [0i16; 3];
        ring.read(&mut out);
        assert_eq!(out, [1, 2, 3]);

        ring.write_blocking(&[6, 7, 8, 9]).unwrap();

        let mut out2 = [0i16; 6];
        assert_eq!(ring.read(&mut out2), 6);
        assert_eq!(out2, [4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_full_ring_blocks_until_read() {
        let ring = Arc::new(PcmRing::new(4));
        ring.write_blocking(&[1, 2, 3, 4]).unwrap();

        let writer_ring = ring.clone();
        let writer = thread::spawn(move || writer_ring.write_blocking(&[5, 6, 7, 8]));

        // Give the writer time to block on the full ring
        thread::sleep(Duration::from_millis(50));
        assert!(!writer.is_finished());

        let mut drained = Vec::new();
        while drained.len() < 8 {
            let mut out = [0i16; 2];
            let count = ring.read(&mut out);
            drained.extend_from_slice(&out[..count]);
            thread::sleep(Duration::from_millis(1));
        }

        writer.join().unwrap().unwrap();
        assert_eq!(drained, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_close_unblocks_writer() {
        let ring = Arc::new(PcmRing::new(4));
        ring.write_blocking(&[1, 2, 3, 4]).unwrap();

        let writer_ring = ring.clone();
        let writer = thread::spawn(move || writer_ring.write_blocking(&[5, 6, 7, 8]));

        thread::sleep(Duration::from_millis(50));
        ring.close();

        let result = writer.join().unwrap();
        assert!(matches!(result, Err(SinkError::Closed)));

        // Closed stays closed, writes keep failing
        ring.close();
        assert!(matches!(
            ring.write_blocking(&[1]),
            Err(SinkError::Closed)
        ));
    }

    #[test]
    fn test_read_still_drains_after_close() {
        let ring = PcmRing::new(16);
        ring.write_blocking(&[1, 2, 3]).unwrap();
        ring.close();

        let mut output = [0i16; 3];
        assert_eq!(ring.read(&mut output), 3);
        assert_eq!(output, [1, 2, 3]);
    }

    #[test]
    fn test_concurrent_writer_reader() {
        let ring = Arc::new(PcmRing::new(480));
        let writer_ring = ring.clone();

        let writer = thread::spawn(move || {
            let samples: Vec<i16> = (0..4800).map(|i| i as i16).collect();
            for chunk in samples.chunks(96) {
                writer_ring.write_blocking(chunk).unwrap();
            }
        });

        let mut collected = Vec::new();
        while collected.len() < 4800 {
            let mut out = [0i16; 120];
            let count = ring.read(&mut out);
            collected.extend_from_slice(&out[..count]);
            if count == 0 {
                thread::sleep(Duration::from_micros(200));
            }
        }

        writer.join().unwrap();
        let expected: Vec<i16> = (0..4800).map(|i| i as i16).collect();
        assert_eq!(collected, expected);
    }
}
