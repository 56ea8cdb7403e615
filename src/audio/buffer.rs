use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Bounded queue of interleaved stereo samples between the render thread and
/// the device callback.
///
/// Writers wait for space with a timeout so they can notice cancellation;
/// the reader never blocks and pads with silence on underrun.
#[derive(Debug)]
pub struct SampleQueue {
    samples: Mutex<VecDeque<i16>>,
    space: Condvar,
    capacity: usize,
    underrun_count: AtomicUsize,
}

impl SampleQueue {
    /// Create a queue holding up to `capacity_frames` stereo frames
    pub fn new(capacity_frames: usize) -> Self {
        let capacity = capacity_frames.max(1) * 2;
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            space: Condvar::new(),
            capacity,
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Capacity in samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Queue as many of `data` as fit, waiting up to `timeout` for room.
    /// Returns the number of samples accepted.
    pub fn push(&self, data: &[i16], timeout: Duration) -> usize {
        let mut samples = self.samples.lock();
        if samples.len() >= self.capacity {
            self.space.wait_for(&mut samples, timeout);
        }

        let room = self.capacity.saturating_sub(samples.len());
        let count = room.min(data.len());
        samples.extend(&data[..count]);
        count
    }

    /// Fill `out` from the queue, padding with silence.
    /// Returns the number of real samples copied.
    pub fn pop_into(&self, out: &mut [i16]) -> usize {
        let mut samples = self.samples.lock();
        let count = samples.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(samples.drain(..count)) {
            *slot = sample;
        }
        drop(samples);

        out[count..].fill(0);
        if count < out.len() && count > 0 {
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
        }
        self.space.notify_all();
        count
    }

    /// Drop everything queued and wake waiting writers
    pub fn clear(&self) {
        self.samples.lock().clear();
        self.space.notify_all();
    }

    /// Fill level from 0.0 to 1.0
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_push_respects_capacity() {
        let queue = SampleQueue::new(4);
        assert_eq!(queue.capacity(), 8);

        let accepted = queue.push(&[1; 12], Duration::from_millis(1));
        assert_eq!(accepted, 8);
        assert_eq!(queue.fill_level(), 1.0);
    }

    #[test]
    fn test_pop_pads_with_silence() {
        let queue = SampleQueue::new(8);
        queue.push(&[5, 6, 7, 8], Duration::ZERO);

        let mut out = [9i16; 6];
        assert_eq!(queue.pop_into(&mut out), 4);
        assert_eq!(out, [5, 6, 7, 8, 0, 0]);
        assert_eq!(queue.underrun_count(), 1);

        // An empty queue is silence, not an underrun
        assert_eq!(queue.pop_into(&mut out), 0);
        assert_eq!(queue.underrun_count(), 1);
    }

    #[test]
    fn test_reader_unblocks_writer() {
        let queue = Arc::new(SampleQueue::new(2));
        queue.push(&[1, 1, 1, 1], Duration::ZERO);

        let reader = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let mut out = [0i16; 4];
            reader.pop_into(&mut out);
        });

        let start = Instant::now();
        let accepted = queue.push(&[2, 2], Duration::from_secs(2));
        handle.join().unwrap();

        assert_eq!(accepted, 2);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_clear() {
        let queue = SampleQueue::new(4);
        queue.push(&[3; 8], Duration::ZERO);
        queue.clear();
        assert!(queue.is_empty());
    }
}
