//! Magnitude spectrum of the most recent output, for visualizers.

use parking_lot::Mutex;
use std::f32::consts::PI;

/// Rolling window of mono samples taken from the render thread
#[derive(Debug)]
pub struct SpectrumAnalyzer {
    size: usize,
    window: Vec<f32>,
    ring: Mutex<Ring>,
}

#[derive(Debug)]
struct Ring {
    samples: Vec<f32>,
    write: usize,
}

impl SpectrumAnalyzer {
    /// `size` is rounded up to a power of two (minimum 2)
    pub fn new(size: usize) -> Self {
        let size = size.max(2).next_power_of_two();
        let window = (0..size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / (size - 1) as f32).cos())
            .collect();

        Self {
            size,
            window,
            ring: Mutex::new(Ring {
                samples: vec![0.0; size],
                write: 0,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Feed interleaved stereo PCM, downmixed to mono in -1.0..1.0
    pub fn push_stereo(&self, pcm: &[i16]) {
        let mut ring = self.ring.lock();
        for frame in pcm.chunks_exact(2) {
            let mono = (frame[0] as f32 + frame[1] as f32) / 65536.0;
            let write = ring.write;
            ring.samples[write] = mono;
            ring.write = (write + 1) % self.size;
        }
    }

    /// Forget previous audio, e.g. after a track change
    pub fn reset(&self) {
        let mut ring = self.ring.lock();
        ring.samples.fill(0.0);
        ring.write = 0;
    }

    /// `size / 2` magnitude bins normalized to 0.0..=1.0
    pub fn spectrum(&self) -> Vec<f32> {
        let mut re: Vec<f32> = {
            let ring = self.ring.lock();
            // Oldest sample first
            ring.samples[ring.write..]
                .iter()
                .chain(ring.samples[..ring.write].iter())
                .zip(self.window.iter())
                .map(|(s, w)| s * w)
                .collect()
        };
        let mut im = vec![0.0f32; self.size];

        fft(&mut re, &mut im);

        let mut bins: Vec<f32> = re
            .iter()
            .zip(im.iter())
            .take(self.size / 2)
            .map(|(r, i)| (r * r + i * i).sqrt())
            .collect();

        let peak = bins.iter().cloned().fold(0.0f32, f32::max);
        if peak > 0.0 {
            for bin in &mut bins {
                *bin /= peak;
            }
        }
        bins
    }
}

/// In-place iterative radix-2 FFT; lengths must be a power of two
fn fft(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    if n < 2 {
        return;
    }

    // Bit reversal
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f32;
        let (w_im, w_re) = angle.sin_cos();
        for start in (0..n).step_by(len) {
            let (mut cur_re, mut cur_im) = (1.0f32, 0.0f32);
            for k in 0..len / 2 {
                let a = start + k;
                let b = a + len / 2;
                let t_re = re[b] * cur_re - im[b] * cur_im;
                let t_im = re[b] * cur_im + im[b] * cur_re;
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;

                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len <<= 1;
    }
}
