/// Linear fade to silence, positioned in rendered sample frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeEnvelope {
    start: u64,
    length: u64,
}

impl FadeEnvelope {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// End-of-track fade ending exactly at `duration`; `None` when the length is unknown
    pub fn for_track_end(duration: i64, window: u64) -> Option<Self> {
        if duration <= 0 {
            return None;
        }
        let duration = duration as u64;
        let start = duration.saturating_sub(window);
        Some(Self::new(start, duration - start))
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    pub fn has_started(&self, position: u64) -> bool {
        position >= self.start
    }

    pub fn is_complete(&self, position: u64) -> bool {
        position >= self.end()
    }

    /// Gain at `position`: 1.0 before the fade, 0.0 from its end on
    pub fn gain_at(&self, position: u64) -> f32 {
        if position <= self.start {
            1.0
        } else if position >= self.end() || self.length == 0 {
            0.0
        } else {
            1.0 - (position - self.start) as f32 / self.length as f32
        }
    }

    /// Scale interleaved stereo `pcm` whose first frame sits at `first_frame`
    pub fn apply(&self, pcm: &mut [i16], first_frame: u64) {
        if first_frame + (pcm.len() / 2) as u64 <= self.start {
            return;
        }
        for (i, frame) in pcm.chunks_exact_mut(2).enumerate() {
            let gain = self.gain_at(first_frame + i as u64);
            for sample in frame {
                *sample = (*sample as f32 * gain) as i16;
            }
        }
    }
}
