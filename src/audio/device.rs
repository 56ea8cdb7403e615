use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::buffer::SampleQueue;
use super::{AudioSink, WRITE_TIMEOUT};
use crate::error::AudioError;

/// Frames of audio kept queued ahead of the device
const QUEUE_FRAMES: usize = 8192;

/// Speaker output through the default cpal device.
///
/// The stream lives on its own thread because cpal streams are not `Send`
/// on every host.
pub struct CpalSink {
    queue: Arc<SampleQueue>,
    paused: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    sample_rate: u32,
    device_name: String,
    thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Open the default output device at `sample_rate`
    pub fn open(sample_rate: u32) -> Result<Self, AudioError> {
        let queue = Arc::new(SampleQueue::new(QUEUE_FRAMES));
        let paused = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, AudioError>>();

        let thread = {
            let queue = Arc::clone(&queue);
            let paused = Arc::clone(&paused);
            let running = Arc::clone(&running);

            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || {
                    let stream = match Self::start_stream(sample_rate, queue, paused) {
                        Ok((stream, name)) => {
                            let _ = ready_tx.send(Ok(name));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    while running.load(Ordering::Relaxed) {
                        thread::sleep(Duration::from_millis(10));
                    }
                    let _ = stream.pause();
                })
                .map_err(|e| {
                    AudioError::InitializationFailed(format!("Failed to create audio thread: {}", e))
                })?
        };

        let device_name = ready_rx
            .recv()
            .map_err(|_| AudioError::InitializationFailed("Audio thread exited early".to_string()))??;
        log::info!("Audio output on {} at {} Hz", device_name, sample_rate);

        Ok(Self {
            queue,
            paused,
            running,
            sample_rate,
            device_name,
            thread: Some(thread),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn start_stream(
        sample_rate: u32,
        queue: Arc<SampleQueue>,
        paused: Arc<AtomicBool>,
    ) -> Result<(Stream, String), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let name = device.name().unwrap_or_else(|_| "unknown device".to_string());

        let default_config = device.default_output_config().map_err(|e| {
            AudioError::InitializationFailed(format!("Failed to get default config: {}", e))
        })?;

        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, queue, paused)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, queue, paused)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, queue, paused)?,
            other => {
                return Err(AudioError::UnsupportedSampleFormat {
                    format: format!("{:?}", other),
                })
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start audio stream: {}", e)))?;
        Ok((stream, name))
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        queue: Arc<SampleQueue>,
        paused: Arc<AtomicBool>,
    ) -> Result<Stream, AudioError>
    where
        T: cpal::SizedSample + cpal::FromSample<i16> + Send + 'static,
    {
        let mut scratch: Vec<i16> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0);
                    if paused.load(Ordering::Relaxed) {
                        scratch.fill(0);
                    } else {
                        queue.pop_into(&mut scratch);
                    }
                    for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(sample);
                    }
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&self, samples: &[i16]) -> usize {
        self.queue.push(samples, WRITE_TIMEOUT)
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.queue.clear();
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.queue.clear();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Audio output thread panicked");
            }
        }
    }
}
