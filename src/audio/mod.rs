pub mod buffer;
pub mod device;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub use buffer::SampleQueue;
pub use device::CpalSink;

/// Longest a single [`AudioSink::write`] waits for room
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// Destination for rendered interleaved stereo 16-bit PCM.
///
/// Implementations are internally synchronized; the render thread writes
/// while control operations pause or clear.
pub trait AudioSink: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Queue samples, waiting at most [`WRITE_TIMEOUT`] for room.
    /// Returns how many samples were accepted.
    fn write(&self, samples: &[i16]) -> usize;

    fn pause(&self);

    fn resume(&self);

    /// Discard queued audio
    fn clear(&self);
}

/// Sink that discards audio, optionally at real-time speed
#[derive(Debug)]
pub struct NullSink {
    sample_rate: u32,
    realtime: bool,
    paused: AtomicBool,
    frames: AtomicU64,
    paced: AtomicU64,
    peak: Mutex<i16>,
    started: Mutex<Option<Instant>>,
}

impl NullSink {
    /// Accepts everything immediately
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            realtime: false,
            paused: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            paced: AtomicU64::new(0),
            peak: Mutex::new(0),
            started: Mutex::new(None),
        }
    }

    /// Accepts audio no faster than it would play
    pub fn realtime(sample_rate: u32) -> Self {
        Self {
            realtime: true,
            ..Self::new(sample_rate)
        }
    }

    /// Frames written so far
    pub fn frames_written(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Largest absolute sample seen since the last [`NullSink::take_peak`]
    pub fn take_peak(&self) -> i16 {
        std::mem::take(&mut *self.peak.lock())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

impl AudioSink for NullSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&self, samples: &[i16]) -> usize {
        let frames = (samples.len() / 2) as u64;
        self.frames.fetch_add(frames, Ordering::Relaxed);
        let paced = self.paced.fetch_add(frames, Ordering::Relaxed) + frames;

        if let Some(max) = samples.iter().map(|s| s.saturating_abs()).max() {
            let mut peak = self.peak.lock();
            *peak = (*peak).max(max);
        }

        if self.realtime && self.sample_rate > 0 {
            let started = *self.started.lock().get_or_insert_with(Instant::now);
            let due = Duration::from_secs_f64(paced as f64 / self.sample_rate as f64);
            if let Some(wait) = due.checked_sub(started.elapsed()) {
                std::thread::sleep(wait.min(WRITE_TIMEOUT));
            }
        }
        samples.len()
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        if self.realtime {
            // Pacing restarts from here
            *self.started.lock() = None;
            self.paced.store(0, Ordering::Relaxed);
        }
    }

    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_counts_frames_and_peak() {
        let sink = NullSink::new(44100);

        assert_eq!(sink.write(&[100, -300, 50, 20]), 4);
        assert_eq!(sink.frames_written(), 2);
        assert_eq!(sink.take_peak(), 300);
        assert_eq!(sink.take_peak(), 0);

        sink.pause();
        assert!(sink.is_paused());
        sink.resume();
        assert!(!sink.is_paused());
    }

    #[test]
    fn test_realtime_sink_paces_writes() {
        let sink = NullSink::realtime(1000);
        let start = Instant::now();

        // 20 frames at 1 kHz is 20 ms of audio
        for _ in 0..2 {
            sink.write(&[0; 20]);
        }
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
