// CpalSource - live microphone capture
//
// The cpal input callback copies the first channel of each callback buffer
// into the CaptureRing. `next_frame` drains the ring into an accumulator
// until one full frame is available.
//
// cpal::Stream is not Send on every platform, so a CpalSource must be built
// on the thread that reads from it (the detection worker).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::ring::{CaptureRing, WorkerChannels};
use super::{frame_duration, AudioFrame, FrameSource};
use crate::error::AudioError;

/// Number of callback buffers kept in flight
const RING_BUFFERS: usize = 32;

/// Poll interval while waiting for the callback
const POLL_INTERVAL: Duration = Duration::from_millis(2);

pub struct CpalSource {
    // Held to keep the device running; dropped with the source
    _stream: cpal::Stream,
    channels: WorkerChannels,
    accumulator: Vec<f32>,
    sample_rate: u32,
    frame_len: usize,
    timeout: Duration,
    stream_failed: Arc<AtomicBool>,
}

impl CpalSource {
    /// Open the default input device at `sample_rate`.
    pub fn open(sample_rate: u32, frame_len: usize) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::DeviceUnavailable)?;

        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to get default input config: {:?}", e),
            })?;

        let device_channels = supported.channels().max(1) as usize;
        let stream_config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (mut callback, worker) = CaptureRing::new(RING_BUFFERS, frame_len).split();
        let stream_failed = Arc::new(AtomicBool::new(false));
        let failed = Arc::clone(&stream_failed);
        let err_fn = move |err| {
            tracing::error!("[CpalSource] Input stream error: {}", err);
            failed.store(true, Ordering::Release);
        };

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    callback.push_interleaved(data, device_channels, |s| s);
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    callback.push_interleaved(data, device_channels, |s| {
                        s as f32 / i16::MAX as f32
                    });
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    callback.push_interleaved(data, device_channels, |s| {
                        (s as f32 - 32768.0) / 32768.0
                    });
                },
                err_fn,
                None,
            ),
            other => {
                return Err(AudioError::UnsupportedFormat {
                    details: format!("{:?}", other),
                })
            }
        }
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

        stream.play().map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to start input stream: {:?}", e),
        })?;

        tracing::info!(
            "[CpalSource] Capturing from {:?} at {} Hz, {} channel(s), frame {}",
            device.name().unwrap_or_else(|_| "<unknown>".to_string()),
            sample_rate,
            device_channels,
            frame_len
        );

        Ok(Self {
            _stream: stream,
            channels: worker,
            accumulator: Vec::with_capacity(frame_len * 2),
            sample_rate,
            frame_len,
            timeout: frame_duration(frame_len, sample_rate) * 2,
            stream_failed,
        })
    }

    fn drain_ring(&mut self) {
        while let Ok(mut buffer) = self.channels.filled_consumer.pop() {
            self.accumulator.extend_from_slice(&buffer);
            buffer.clear();
            let _ = self.channels.free_producer.push(buffer);
        }
    }
}

impl FrameSource for CpalSource {
    fn next_frame(&mut self) -> Result<AudioFrame, AudioError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            if self.stream_failed.swap(false, Ordering::AcqRel) {
                return Err(AudioError::StreamFailure {
                    reason: "input stream reported an error".to_string(),
                });
            }

            self.drain_ring();
            if self.accumulator.len() >= self.frame_len {
                let samples: Vec<f32> = self.accumulator.drain(..self.frame_len).collect();
                return Ok(AudioFrame::new(samples, self.sample_rate));
            }

            if Instant::now() >= deadline {
                return Err(AudioError::Timeout {
                    waited_ms: self.timeout.as_millis() as u64,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_len(&self) -> usize {
        self.frame_len
    }
}
