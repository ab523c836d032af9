//! Headless controller for the polychip sequencer.
//!
//! Owns a song and its settings, runs live playback on a device thread and
//! provides offline rendering and register-log export for the CLI.

mod config;
mod error;
mod midi_log;

use std::io::{Seek, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use pc_audio::{AudioOutput, CpalOutput};
use pc_engine::{BackendRegistry, Engine, EngineError, MidiSink, PlaybackState, SharedEngine, SongWalk};
use pc_formats::WavWriter;

pub use config::Config;
pub use error::{MasterError, Result};
pub use midi_log::LogSink;

// Re-export common types so callers don't need pc-ir/pc-engine directly.
pub use pc_engine::Frame;
pub use pc_formats::{FormatError, RegisterLog};
pub use pc_ir::{ChipFamily, PlaybackTime, Song};

/// Headless tracker controller: owns a song and manages playback.
pub struct Controller {
    song: Song,
    config: Config,
    registry: Arc<BackendRegistry>,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    engine: SharedEngine,
    stop_signal: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, BackendRegistry::with_builtin())
    }

    /// A controller that builds chips from `registry` instead of the
    /// reference backends.
    pub fn with_registry(config: Config, registry: BackendRegistry) -> Self {
        Self {
            song: Song::with_systems("Untitled", &[ChipFamily::Sms]),
            config,
            registry: Arc::new(registry),
            playback: None,
        }
    }

    // --- Song and settings ---

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn set_song(&mut self, song: Song) {
        self.stop();
        self.song = song;
    }

    pub fn load_song(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let song = pc_formats::load_song(path)?;
        self.set_song(song);
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the settings. Takes effect on the next `play`, render or export.
    pub fn set_config(&mut self, config: Config) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Rows, ticks and loop point of one pass through `subsong`.
    pub fn walk(&self, subsong: usize) -> Result<SongWalk> {
        Ok(pc_engine::walk(&self.song, subsong)?)
    }

    // --- Real-time playback ---

    /// Start `subsong` on the default output device.
    ///
    /// Device and engine setup happen on the playback thread; their errors
    /// are returned here and nothing keeps running.
    pub fn play(&mut self, subsong: usize) -> Result<()> {
        self.stop();

        let song = self.song.clone();
        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        let stop_signal = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let stop = stop_signal.clone();
        let done = finished.clone();
        let thread = std::thread::Builder::new()
            .name("pc-playback".into())
            .spawn(move || audio_thread(song, subsong, config, registry, stop, done, ready_tx))?;

        let engine = match ready_rx.recv() {
            Ok(Ok(engine)) => engine,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(MasterError::ThreadStart);
            }
        };

        self.playback = Some(PlaybackHandle {
            engine,
            stop_signal,
            finished,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Stop playback and join the device thread. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.engine.with(|e| e.stop());
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    /// The live engine, for transport and note control while playing.
    pub fn engine(&self) -> Option<&SharedEngine> {
        self.playback.as_ref().map(|p| &p.engine)
    }

    /// Current `(order, row)` of live playback.
    pub fn position(&self) -> Option<(usize, usize)> {
        self.engine().map(|e| e.with(|e| e.position()))
    }

    pub fn elapsed(&self) -> Option<PlaybackTime> {
        self.engine().map(|e| e.with(|e| e.elapsed()))
    }

    /// The error that ended live playback, if any.
    pub fn last_error(&self) -> Option<EngineError> {
        self.engine().and_then(|e| e.with(|e| e.last_error().cloned()))
    }

    // --- Offline rendering ---

    /// Render up to `max_frames` of `subsong` at the configured rate.
    ///
    /// Stops early when the song ends. A hang is reported as an error.
    pub fn render_frames(&self, subsong: usize, max_frames: usize) -> Result<Vec<Frame>> {
        let mut engine = build_engine(self.song.clone(), subsong, self.config.sample_rate, &self.config, &self.registry)?;
        engine.play();

        let mut frames = Vec::with_capacity(max_frames.min(self.config.sample_rate as usize * 60));
        let mut block = vec![Frame::silence(); self.config.block_size];
        while engine.is_playing() && frames.len() < max_frames {
            let n = block.len().min(max_frames - frames.len());
            engine.render_frames(&mut block[..n]);
            frames.extend_from_slice(&block[..n]);
        }
        if let Some(err) = engine.take_error() {
            return Err(err.into());
        }
        Ok(frames)
    }

    /// Render `subsong` to a 16-bit stereo WAV stream, at most `max_seconds`
    /// long. Returns the number of frames written.
    pub fn render_to_wav<W: Write + Seek>(&self, subsong: usize, writer: W, max_seconds: u32) -> Result<u32> {
        let rate = self.config.sample_rate;
        let max_frames = rate as u64 * max_seconds as u64;
        let mut engine = build_engine(self.song.clone(), subsong, rate, &self.config, &self.registry)?;
        engine.play();

        let mut wav = WavWriter::new(writer, rate)?;
        let mut block = vec![Frame::silence(); self.config.block_size];
        while engine.is_playing() && (wav.frames() as u64) < max_frames {
            let n = (block.len() as u64).min(max_frames - wav.frames() as u64) as usize;
            engine.render_frames(&mut block[..n]);
            wav.write(&block[..n])?;
        }
        let frames = wav.frames();
        wav.finish()?;
        if let Some(err) = engine.take_error() {
            return Err(err.into());
        }
        log::info!("rendered {frames} frames at {rate} Hz");
        Ok(frames)
    }

    /// Play `subsong` once through and log every chip register write.
    pub fn export(&self, subsong: usize) -> Result<RegisterLog> {
        let log = pc_formats::export_register_log(&self.song, subsong, &self.registry, &self.config.export_options())?;
        Ok(log)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Engine for `subsong` with the settings in `config` applied.
fn build_engine(
    song: Song,
    subsong: usize,
    rate: u32,
    config: &Config,
    registry: &BackendRegistry,
) -> Result<Engine> {
    let mut engine = Engine::new(song, subsong, rate, registry)?;
    engine.set_options(config.mix_options());
    engine.set_loops(config.loops);
    engine.set_low_latency(config.low_latency);
    engine.dispatcher_mut().set_capture(config.capture);
    if config.midi_log {
        let mut sink = LogSink::default();
        sink.open("log").map_err(EngineError::from)?;
        engine.dispatcher_mut().set_midi(Some(Box::new(sink) as Box<dyn MidiSink>));
    }
    Ok(engine)
}

fn start_output(
    song: Song,
    subsong: usize,
    config: &Config,
    registry: &BackendRegistry,
) -> Result<(CpalOutput, SharedEngine)> {
    let (mut output, consumer) = CpalOutput::new(config.buffer_ms)?;
    let rate = output.sample_rate();
    let mut engine = build_engine(song, subsong, rate, config, registry)?;
    engine.play();

    let shared = SharedEngine::new(engine);
    shared.set_soft_lock(config.soft_lock);
    output.build_stream(consumer)?;
    output.start()?;
    log::info!("playing subsong {subsong} at {rate} Hz, {} frame blocks", config.block_size);
    Ok((output, shared))
}

fn render_block(engine: &SharedEngine, left: &mut [f32], right: &mut [f32]) {
    #[cfg(feature = "alloc_check")]
    assert_no_alloc::assert_no_alloc(|| engine.render(left, right));
    #[cfg(not(feature = "alloc_check"))]
    engine.render(left, right);
}

fn audio_thread(
    song: Song,
    subsong: usize,
    config: Config,
    registry: Arc<BackendRegistry>,
    stop_signal: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<SharedEngine>>,
) {
    let (mut output, engine) = match start_output(song, subsong, &config, &registry) {
        Ok(started) => started,
        Err(e) => {
            log::error!("playback failed to start: {e}");
            finished.store(true, Ordering::Relaxed);
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(engine.clone())).is_err() {
        finished.store(true, Ordering::Relaxed);
        return;
    }

    let block = config.block_size;
    let mut left = vec![0.0f32; block];
    let mut right = vec![0.0f32; block];
    let mut frames = vec![Frame::silence(); block];
    let mut ended = false;

    while !stop_signal.load(Ordering::Relaxed) {
        if output.vacant() < block {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        render_block(&engine, &mut left, &mut right);
        for (frame, (&l, &r)) in frames.iter_mut().zip(left.iter().zip(&right)) {
            *frame = Frame::from_f32(l, r);
        }
        output.write(&frames);
        if engine.with(|e| e.state() == PlaybackState::Stopped) {
            ended = true;
            break;
        }
    }

    if ended {
        // Let the device play out what is queued.
        let tail = output.sample_rate() as usize * config.buffer_ms as usize / 1000;
        output.write_silence(tail);
        if let Some(err) = engine.with(|e| e.last_error().cloned()) {
            log::error!("playback ended: {err}");
        }
    }
    let underruns = output.underruns();
    if underruns > 0 {
        log::warn!("{underruns} device underruns");
    }
    let _ = output.stop();
    finished.store(true, Ordering::Relaxed);
}
