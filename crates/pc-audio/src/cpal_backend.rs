//! Default-device output through cpal.
//!
//! The render thread pushes [`Frame`]s into a heap ring buffer; the device
//! callback pops one frame per device frame and counts callbacks that ran dry.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use pc_engine::Frame;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::traits::{AudioError, AudioOutput};

const MIN_QUEUE_FRAMES: usize = 256;

pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    queue: HeapProd<Frame>,
    running: Arc<AtomicBool>,
    underruns: Arc<AtomicU64>,
}

/// Frames needed to hold `buffer_ms` of audio at `rate`.
pub fn queue_frames(rate: u32, buffer_ms: u32) -> usize {
    (rate as usize * buffer_ms.max(10) as usize / 1000).max(MIN_QUEUE_FRAMES)
}

/// Fill an interleaved device buffer from the queue. Channels past the
/// second get silence. Returns false if the queue ran out.
pub fn fill_device_buffer(data: &mut [f32], channels: usize, queue: &mut HeapCons<Frame>) -> bool {
    let mut complete = true;
    for slot in data.chunks_mut(channels.max(1)) {
        let (l, r) = match queue.try_pop() {
            Some(frame) => frame.to_f32(),
            None => {
                complete = false;
                (0.0, 0.0)
            }
        };
        slot.fill(0.0);
        slot[0] = l;
        if let Some(right) = slot.get_mut(1) {
            *right = r;
        }
    }
    complete
}

impl CpalOutput {
    /// Open the default output device, forced to stereo.
    pub fn new(buffer_ms: u32) -> Result<(Self, HeapCons<Frame>), AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioError::NoDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
        let mut config: StreamConfig = supported.into();
        config.channels = 2;

        let frames = queue_frames(config.sample_rate.0, buffer_ms);
        let (queue, consumer) = HeapRb::<Frame>::new(frames).split();
        log::info!(
            "output '{}': {} Hz, {frames} queued frames",
            device.name().unwrap_or_default(),
            config.sample_rate.0
        );

        Ok((
            Self {
                device,
                config,
                stream: None,
                queue,
                running: Arc::new(AtomicBool::new(false)),
                underruns: Arc::new(AtomicU64::new(0)),
            },
            consumer,
        ))
    }

    /// Create the device stream. It outputs silence until [`AudioOutput::start`].
    pub fn build_stream(&mut self, mut consumer: HeapCons<Frame>) -> Result<(), AudioError> {
        let running = Arc::clone(&self.running);
        let underruns = Arc::clone(&self.underruns);
        let channels = self.config.channels as usize;

        let callback = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if !running.load(Ordering::Relaxed) {
                data.fill(0.0);
            } else if !fill_device_buffer(data, channels, &mut consumer) {
                underruns.fetch_add(1, Ordering::Relaxed);
            }
        };
        let stream = self
            .device
            .build_output_stream(&self.config, callback, |err| log::error!("output stream: {err}"), None)
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Queue `frames` of silence, waiting for room as the device drains.
    pub fn write_silence(&mut self, mut frames: usize) {
        while frames > 0 {
            if self.queue.try_push(Frame::silence()).is_ok() {
                frames -= 1;
            } else {
                std::hint::spin_loop();
            }
        }
    }

    pub fn vacant(&self) -> usize {
        self.queue.vacant_len()
    }

    /// Device callbacks that found the queue empty.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    fn set_running(&mut self, running: bool) -> Result<(), AudioError> {
        self.running.store(running, Ordering::Relaxed);
        let Some(stream) = &self.stream else {
            return Ok(());
        };
        if running {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))
        } else {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))
        }
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn write(&mut self, frames: &[Frame]) -> usize {
        self.queue.push_slice(frames)
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.set_running(true)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.set_running(false)
    }
}
