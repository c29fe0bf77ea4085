//! Audio fifo: bounded SPSC ring of stereo frames
//!
//! Built on `rtrb`, so the producer (a demodulator on its sink thread) and
//! the consumer (the output mixer on the render thread) each own one cursor
//! and never contend on a lock.
//!
//! # Overflow policy: truncate
//!
//! When a write does not fit, as many frames as fit are written and the
//! remaining tail of that write is dropped. Frames already queued are never
//! touched, so the consumer always sees a gap-free prefix of what was
//! produced. The dropped count is returned as [`FifoError::Overflow`] and
//! accumulated in [`FifoStats`].
//!
//! # Underflow
//!
//! A read asking for more frames than queued gets the queued frames followed
//! by silence. The zero-filled count is returned as [`FifoError::Underflow`]
//! and accumulated in [`FifoStats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::FifoError;
use crate::types::StereoSample;

/// Counters shared by both halves of a fifo, readable from any thread
#[derive(Debug, Default)]
pub struct FifoStats {
    written: AtomicU64,
    read: AtomicU64,
    dropped: AtomicU64,
    zero_filled: AtomicU64,
    overflows: AtomicU64,
    underflows: AtomicU64,
}

impl FifoStats {
    /// Frames accepted by the fifo
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Real (not zero-filled) frames delivered to the consumer
    pub fn read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    /// Frames dropped by overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frames replaced by silence on underflow
    pub fn zero_filled(&self) -> u64 {
        self.zero_filled.load(Ordering::Relaxed)
    }

    /// Number of writes that overflowed
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Number of reads that underflowed
    pub fn underflows(&self) -> u64 {
        self.underflows.load(Ordering::Relaxed)
    }
}

/// Create a fifo holding up to `capacity` frames
pub fn audio_fifo(capacity: usize) -> (AudioFifoWriter, AudioFifoReader) {
    let capacity = capacity.max(1);
    let (producer, consumer) = rtrb::RingBuffer::<StereoSample>::new(capacity);
    let stats = Arc::new(FifoStats::default());
    (
        AudioFifoWriter {
            producer,
            stats: Arc::clone(&stats),
            capacity,
        },
        AudioFifoReader {
            consumer,
            stats,
            capacity,
        },
    )
}

/// Producer half, owned by exactly one thread
#[derive(Debug)]
pub struct AudioFifoWriter {
    producer: rtrb::Producer<StereoSample>,
    stats: Arc<FifoStats>,
    capacity: usize,
}

impl AudioFifoWriter {
    /// Write frames, truncating on overflow
    ///
    /// Returns `Err(FifoError::Overflow)` with the number of frames that did
    /// not fit; everything before them was written.
    pub fn write(&mut self, frames: &[StereoSample]) -> Result<(), FifoError> {
        let n = frames.len().min(self.producer.slots());
        if n > 0 {
            if let Ok(mut chunk) = self.producer.write_chunk(n) {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&frames[..split]);
                second.copy_from_slice(&frames[split..n]);
                chunk.commit_all();
            }
            self.stats.written.fetch_add(n as u64, Ordering::Relaxed);
        }

        let dropped = frames.len() - n;
        if dropped > 0 {
            self.stats.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
            self.stats.overflows.fetch_add(1, Ordering::Relaxed);
            return Err(FifoError::Overflow { dropped });
        }
        Ok(())
    }

    /// Free space in frames
    pub fn free(&self) -> usize {
        self.producer.slots()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> Arc<FifoStats> {
        Arc::clone(&self.stats)
    }

    /// True once the reader half has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

/// Consumer half, owned by exactly one thread
#[derive(Debug)]
pub struct AudioFifoReader {
    consumer: rtrb::Consumer<StereoSample>,
    stats: Arc<FifoStats>,
    capacity: usize,
}

impl AudioFifoReader {
    /// Fill `out` completely, zero-filling whatever is not queued
    pub fn read(&mut self, out: &mut [StereoSample]) -> Result<(), FifoError> {
        let got = self.read_available(out);
        out[got..].fill(StereoSample::silence());
        self.note_missing(out.len() - got)
    }

    /// Add the queued frames onto `out` (mixer path); missing frames add nothing
    pub fn mix_into(&mut self, out: &mut [StereoSample]) -> Result<(), FifoError> {
        let n = out.len().min(self.consumer.slots());
        if n > 0 {
            if let Ok(chunk) = self.consumer.read_chunk(n) {
                let (first, second) = chunk.as_slices();
                for (dst, src) in out.iter_mut().zip(first.iter().chain(second.iter())) {
                    *dst += *src;
                }
                chunk.commit_all();
            }
            self.stats.read.fetch_add(n as u64, Ordering::Relaxed);
        }
        self.note_missing(out.len() - n)
    }

    /// Copy up to `out.len()` queued frames without zero-filling
    ///
    /// Returns the number of frames copied. Never counts as underflow.
    pub fn read_available(&mut self, out: &mut [StereoSample]) -> usize {
        let n = out.len().min(self.consumer.slots());
        if n == 0 {
            return 0;
        }
        if let Ok(chunk) = self.consumer.read_chunk(n) {
            let (first, second) = chunk.as_slices();
            out[..first.len()].copy_from_slice(first);
            out[first.len()..n].copy_from_slice(second);
            chunk.commit_all();
        }
        self.stats.read.fetch_add(n as u64, Ordering::Relaxed);
        n
    }

    fn note_missing(&self, missing: usize) -> Result<(), FifoError> {
        if missing > 0 {
            self.stats.zero_filled.fetch_add(missing as u64, Ordering::Relaxed);
            self.stats.underflows.fetch_add(1, Ordering::Relaxed);
            return Err(FifoError::Underflow { missing });
        }
        Ok(())
    }

    /// Frames queued and ready to read
    pub fn available(&self) -> usize {
        self.consumer.slots()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> Arc<FifoStats> {
        Arc::clone(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, n: usize) -> Vec<StereoSample> {
        (start..start + n).map(|i| StereoSample::mono(i as f32)).collect()
    }

    #[test]
    fn test_overflow_truncates_newest_frames() {
        let (mut w, mut r) = audio_fifo(8);
        assert!(w.write(&ramp(0, 5)).is_ok());

        // Only 3 of these 6 fit; frames 5, 6, 7 land, 8..10 are dropped
        assert_eq!(w.write(&ramp(5, 6)), Err(FifoError::Overflow { dropped: 3 }));
        assert_eq!(w.free(), 0);

        let mut out = vec![StereoSample::silence(); 8];
        assert!(r.read(&mut out).is_ok());
        assert_eq!(out, ramp(0, 8));

        let stats = w.stats();
        assert_eq!(stats.written(), 8);
        assert_eq!(stats.dropped(), 3);
        assert_eq!(stats.overflows(), 1);
    }

    #[test]
    fn test_underflow_zero_fills_tail() {
        let (mut w, mut r) = audio_fifo(16);
        w.write(&ramp(1, 3)).unwrap();

        let mut out = vec![StereoSample::mono(9.0); 6];
        assert_eq!(r.read(&mut out), Err(FifoError::Underflow { missing: 3 }));
        assert_eq!(&out[..3], &ramp(1, 3)[..]);
        assert!(out[3..].iter().all(|s| *s == StereoSample::silence()));

        let stats = r.stats();
        assert_eq!(stats.read(), 3);
        assert_eq!(stats.zero_filled(), 3);
        assert_eq!(stats.underflows(), 1);
    }

    #[test]
    fn test_mix_into_adds_onto_existing_frames() {
        let (mut w, mut r) = audio_fifo(4);
        w.write(&[StereoSample::new(0.25, -0.25); 2]).unwrap();

        let mut out = vec![StereoSample::new(0.5, 0.5); 3];
        assert_eq!(r.mix_into(&mut out), Err(FifoError::Underflow { missing: 1 }));
        assert_eq!(out[0], StereoSample::new(0.75, 0.25));
        assert_eq!(out[1], StereoSample::new(0.75, 0.25));
        assert_eq!(out[2], StereoSample::new(0.5, 0.5));
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let (mut w, mut r) = audio_fifo(5);
        let mut out = vec![StereoSample::silence(); 3];
        let mut next = 0;
        for _ in 0..10 {
            w.write(&ramp(next, 3)).unwrap();
            assert_eq!(r.read_available(&mut out), 3);
            assert_eq!(out, ramp(next, 3));
            next += 3;
        }
        assert_eq!(r.available(), 0);
        assert_eq!(r.stats().underflows(), 0);
    }

    #[test]
    fn test_producer_and_consumer_threads() {
        let (mut w, mut r) = audio_fifo(64);
        let total = 10_000usize;
        let producer = std::thread::spawn(move || {
            let mut sent = 0;
            while sent < total {
                let n = w.free().min(total - sent).min(32);
                if n == 0 {
                    std::thread::yield_now();
                    continue;
                }
                w.write(&ramp(sent, n)).unwrap();
                sent += n;
            }
        });

        let mut received = Vec::with_capacity(total);
        let mut buf = vec![StereoSample::silence(); 17];
        while received.len() < total {
            let n = r.read_available(&mut buf);
            received.extend_from_slice(&buf[..n]);
        }
        producer.join().unwrap();
        assert_eq!(received, ramp(0, total));
    }
}
