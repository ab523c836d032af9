//! Command routing, MIDI mirroring and command capture.

use heapless::Vec as FixedVec;
use pc_ir::{Command, Opcode, Song, SystemConfig, DISPATCH_IGNORED, NOTE_NULL};

use crate::backend::{BackendRegistry, ChipBackend, RegisterWrite};
use crate::channel::ChannelRuntimeState;
use crate::error::{EngineError, Result};
use crate::midi::{self, MidiMessage, MidiSink};

/// Commands kept by the capture buffer before it starts dropping.
pub const CAPTURE_CAPACITY: usize = 2000;

/// A dispatched command and the tick it was sent on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapturedCommand {
    pub tick: u64,
    pub command: Command,
}

/// One chip instance and the song channel its local channel 0 maps to.
struct BackendSlot {
    backend: Box<dyn ChipBackend>,
    system: SystemConfig,
    first_channel: usize,
}

#[derive(Clone, Copy, Debug)]
struct ChannelRoute {
    backend: usize,
    local: usize,
}

/// Routes song-channel commands to backends.
///
/// Owns the backends, built once per song from a [`BackendRegistry`]. Every
/// command passes through [`CommandDispatcher::dispatch`], which counts it,
/// optionally records it, mirrors it to MIDI and forwards it with the channel
/// rewritten to the backend's local numbering.
pub struct CommandDispatcher {
    slots: Vec<BackendSlot>,
    routes: Vec<ChannelRoute>,
    midi: Option<Box<dyn MidiSink>>,
    capture: Box<FixedVec<CapturedCommand, CAPTURE_CAPACITY>>,
    capture_enabled: bool,
    dropped: u64,
    total: u64,
    tick: u64,
}

impl CommandDispatcher {
    /// Build one backend per configured system.
    pub fn new(song: &Song, registry: &BackendRegistry) -> Result<Self> {
        if song.systems.is_empty() {
            return Err(EngineError::NoSystems);
        }
        let mut slots = Vec::with_capacity(song.systems.len());
        let mut routes = Vec::with_capacity(song.channel_count());
        for (index, system) in song.systems.iter().enumerate() {
            let backend = registry.create(system)?;
            let first_channel = routes.len();
            for local in 0..system.family.channel_count() {
                routes.push(ChannelRoute { backend: index, local });
            }
            slots.push(BackendSlot { backend, system: *system, first_channel });
        }
        Ok(Self {
            slots,
            routes,
            midi: None,
            capture: Box::new(FixedVec::new()),
            capture_enabled: false,
            dropped: 0,
            total: 0,
            tick: 0,
        })
    }

    /// Send a command for song channel `cmd.channel` and return the
    /// backend's result code.
    pub fn dispatch(&mut self, chan: &mut ChannelRuntimeState, cmd: Command) -> i32 {
        self.total += 1;
        if self.capture_enabled {
            let entry = CapturedCommand { tick: self.tick, command: cmd };
            if self.capture.push(entry).is_err() {
                if self.dropped == 0 {
                    log::warn!("command capture full, dropping further commands");
                }
                self.dropped += 1;
            }
        }
        self.mirror(chan, &cmd);
        self.forward(cmd)
    }

    /// Ask a backend something without counting, capturing or mirroring.
    pub fn query(&mut self, cmd: Command) -> i32 {
        self.forward(cmd)
    }

    fn forward(&mut self, cmd: Command) -> i32 {
        let Some(route) = self.routes.get(cmd.channel).copied() else {
            return DISPATCH_IGNORED;
        };
        self.slots[route.backend]
            .backend
            .dispatch(cmd.on_channel(route.local))
    }

    fn mirror(&mut self, chan: &mut ChannelRuntimeState, cmd: &Command) {
        let Some(sink) = self.midi.as_deref_mut() else {
            return;
        };
        if !sink.is_device_open() || cmd.opcode.is_query() {
            return;
        }
        let ch = cmd.channel;
        let scaled = (chan.chip_volume() * 127 / (chan.vol_max >> 8).max(1)).clamp(0, 127) as u8;
        match cmd.opcode {
            Opcode::NoteOn | Opcode::Legato => {
                if cmd.opcode == Opcode::Legato && (chan.cur_midi_note < 0 || cmd.value == NOTE_NULL) {
                    return;
                }
                if chan.cur_midi_note >= 0 {
                    sink.send(MidiMessage::channel_voice(midi::NOTE_OFF, ch, chan.cur_midi_note as u8, scaled));
                }
                if cmd.value != NOTE_NULL {
                    chan.cur_midi_note = (cmd.value + 12).clamp(-1, 127);
                }
                if chan.cur_midi_note >= 0 {
                    sink.send(MidiMessage::channel_voice(midi::NOTE_ON, ch, chan.cur_midi_note as u8, scaled));
                }
            }
            Opcode::NoteOff | Opcode::NoteOffEnv => {
                if chan.cur_midi_note >= 0 {
                    sink.send(MidiMessage::channel_voice(midi::NOTE_OFF, ch, chan.cur_midi_note as u8, scaled));
                }
                chan.cur_midi_note = -1;
            }
            Opcode::Instrument => {
                if chan.last_ins != cmd.value && cmd.value >= 0 {
                    sink.send(MidiMessage::channel_voice(midi::PROGRAM_CHANGE, ch, cmd.value as u8, 0));
                }
            }
            Opcode::Volume => {
                if chan.cur_midi_note >= 0 && chan.midi_aftertouch {
                    chan.midi_aftertouch = false;
                    let pressure = (cmd.value * 127 / (chan.vol_max >> 8).max(1)).clamp(0, 127) as u8;
                    sink.send(MidiMessage::channel_voice(midi::AFTERTOUCH, ch, pressure, 0));
                }
            }
            Opcode::Pitch => {
                let bend = (8192 + (cmd.value << 5)).clamp(0, 16383);
                if bend != chan.midi_pitch {
                    chan.midi_pitch = bend;
                    sink.send(MidiMessage::channel_voice(
                        midi::PITCH_BEND,
                        ch,
                        (bend & 0x7f) as u8,
                        (bend >> 7) as u8,
                    ));
                }
            }
            _ => {}
        }
    }

    /// Mark the start of a tick: stamps later captures and sends a MIDI clock.
    pub fn begin_tick(&mut self, tick: u64) {
        self.tick = tick;
        if let Some(sink) = self.midi.as_deref_mut() {
            if sink.is_device_open() {
                sink.send(MidiMessage::clock());
            }
        }
    }

    /// Install (or remove) the MIDI mirror, returning the previous sink.
    pub fn set_midi(&mut self, sink: Option<Box<dyn MidiSink>>) -> Option<Box<dyn MidiSink>> {
        core::mem::replace(&mut self.midi, sink)
    }

    pub fn midi(&self) -> Option<&dyn MidiSink> {
        self.midi.as_deref()
    }

    pub fn midi_mut(&mut self) -> Option<&mut (dyn MidiSink + 'static)> {
        self.midi.as_deref_mut()
    }

    /// Commands dispatched since construction.
    pub fn total_commands(&self) -> u64 {
        self.total
    }

    pub fn set_capture(&mut self, enabled: bool) {
        self.capture_enabled = enabled;
    }

    pub fn is_capturing(&self) -> bool {
        self.capture_enabled
    }

    pub fn captured(&self) -> &[CapturedCommand] {
        &self.capture
    }

    /// Commands lost because the capture buffer was full.
    pub fn dropped_captures(&self) -> u64 {
        self.dropped
    }

    pub fn clear_capture(&mut self) {
        self.capture.clear();
        self.dropped = 0;
    }

    pub fn backend_count(&self) -> usize {
        self.slots.len()
    }

    pub fn backend(&self, index: usize) -> Option<&dyn ChipBackend> {
        self.slots.get(index).map(|s| s.backend.as_ref())
    }

    pub fn backend_mut(&mut self, index: usize) -> Option<&mut (dyn ChipBackend + 'static)> {
        self.slots.get_mut(index).map(|s| s.backend.as_mut())
    }

    /// Mix settings of the system behind backend `index`.
    pub fn system(&self, index: usize) -> Option<&SystemConfig> {
        self.slots.get(index).map(|s| &s.system)
    }

    /// First song channel owned by backend `index`.
    pub fn first_channel(&self, index: usize) -> Option<usize> {
        self.slots.get(index).map(|s| s.first_channel)
    }

    /// `(backend index, local channel)` for a song channel.
    pub fn route(&self, channel: usize) -> Option<(usize, usize)> {
        self.routes.get(channel).map(|r| (r.backend, r.local))
    }

    pub fn channel_count(&self) -> usize {
        self.routes.len()
    }

    pub fn key_off_affects_arpeggio(&self, channel: usize) -> bool {
        self.routes
            .get(channel)
            .is_some_and(|r| self.slots[r.backend].backend.key_off_affects_arpeggio(r.local))
    }

    pub fn key_off_affects_portamento(&self, channel: usize) -> bool {
        self.routes
            .get(channel)
            .is_some_and(|r| self.slots[r.backend].backend.key_off_affects_portamento(r.local))
    }

    pub fn portamento_floor(&self, channel: usize) -> i32 {
        self.routes
            .get(channel)
            .map_or(0, |r| self.slots[r.backend].backend.portamento_floor(r.local))
    }

    /// Run every backend's per-tick bookkeeping, in system order.
    pub fn tick_backends(&mut self, full_tick: bool) {
        for slot in &mut self.slots {
            slot.backend.tick(full_tick);
        }
    }

    pub fn reset_backends(&mut self) {
        for slot in &mut self.slots {
            slot.backend.reset();
        }
    }

    pub fn notify_instrument_change(&mut self, instrument: usize) {
        for slot in &mut self.slots {
            slot.backend.notify_instrument_change(instrument);
        }
    }

    pub fn notify_instrument_deletion(&mut self, instrument: usize) {
        for slot in &mut self.slots {
            slot.backend.notify_instrument_deletion(instrument);
        }
    }

    pub fn notify_wave_change(&mut self, wave: usize) {
        for slot in &mut self.slots {
            slot.backend.notify_wave_change(wave);
        }
    }

    pub fn set_register_logging(&mut self, enabled: bool) {
        for slot in &mut self.slots {
            slot.backend.set_register_logging(enabled);
        }
    }

    /// Move backend `index`'s recorded register writes into `out`.
    pub fn drain_register_writes(&mut self, index: usize, out: &mut Vec<RegisterWrite>) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.backend.drain_register_writes(out);
        }
    }

    /// Mute or unmute a song channel on its backend.
    pub fn mute(&mut self, channel: usize, muted: bool) {
        if let Some(route) = self.routes.get(channel).copied() {
            self.slots[route.backend].backend.mute(route.local, muted);
        }
    }

    /// Raw register write on backend `index`.
    pub fn poke(&mut self, index: usize, addr: u32, value: u16) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.backend.poke(addr, value);
        }
    }
}

impl core::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("backends", &self.slots.iter().map(|s| s.system.family).collect::<Vec<_>>())
            .field("channels", &self.routes.len())
            .field("total", &self.total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::RecordingSink;
    use pc_ir::{ChipFamily, DISPATCH_ACK};
    use std::sync::{Arc, Mutex};

    /// A sink whose messages stay readable after it is handed to the dispatcher.
    struct SharedSink(Arc<Mutex<RecordingSink>>);

    impl MidiSink for SharedSink {
        fn open(&mut self, name: &str) -> core::result::Result<(), crate::DeviceError> {
            self.0.lock().unwrap().open(name)
        }
        fn close(&mut self) -> core::result::Result<(), crate::DeviceError> {
            self.0.lock().unwrap().close()
        }
        fn is_device_open(&self) -> bool {
            self.0.lock().unwrap().is_device_open()
        }
        fn send(&mut self, message: MidiMessage) {
            self.0.lock().unwrap().send(message)
        }
    }

    fn dispatcher() -> CommandDispatcher {
        let song = Song::with_systems("t", &[ChipFamily::Ay8910, ChipFamily::Sms]);
        CommandDispatcher::new(&song, &BackendRegistry::with_builtin()).unwrap()
    }

    #[test]
    fn routes_follow_system_order() {
        let d = dispatcher();
        assert_eq!(d.backend_count(), 2);
        assert_eq!(d.route(2), Some((0, 2)));
        assert_eq!(d.route(3), Some((1, 0)));
        assert_eq!(d.route(7), None);
        assert_eq!(d.first_channel(1), Some(3));
    }

    #[test]
    fn unmapped_channel_is_ignored() {
        let mut d = dispatcher();
        let mut chan = ChannelRuntimeState::new(15);
        let code = d.dispatch(&mut chan, Command::with_value(Opcode::NoteOn, 40, 48));
        assert_eq!(code, DISPATCH_IGNORED);
        assert_eq!(d.total_commands(), 1);
    }

    #[test]
    fn empty_song_is_rejected() {
        let song = Song::default();
        let err = CommandDispatcher::new(&song, &BackendRegistry::with_builtin()).err();
        assert_eq!(err, Some(EngineError::NoSystems));
    }

    #[test]
    fn capture_drops_when_full() {
        let mut d = dispatcher();
        let mut chan = ChannelRuntimeState::new(15);
        d.set_capture(true);
        for _ in 0..CAPTURE_CAPACITY + 5 {
            d.dispatch(&mut chan, Command::with_value(Opcode::Volume, 0, 3));
        }
        assert_eq!(d.captured().len(), CAPTURE_CAPACITY);
        assert_eq!(d.dropped_captures(), 5);
        d.clear_capture();
        assert!(d.captured().is_empty());
    }

    #[test]
    fn queries_are_not_counted() {
        let mut d = dispatcher();
        assert_eq!(d.query(Command::bare(Opcode::GetVolMax, 3)), 15);
        assert_eq!(d.total_commands(), 0);
    }

    #[test]
    fn note_mirroring() {
        let log = Arc::new(Mutex::new(RecordingSink::opened()));
        let mut d = dispatcher();
        d.set_midi(Some(Box::new(SharedSink(log.clone()))));
        let mut chan = ChannelRuntimeState::new(15);

        assert_eq!(d.dispatch(&mut chan, Command::with_value(Opcode::NoteOn, 1, 48)), DISPATCH_ACK);
        d.dispatch(&mut chan, Command::with_value(Opcode::Legato, 1, 50));
        d.dispatch(&mut chan, Command::bare(Opcode::NoteOff, 1));

        let messages = log.lock().unwrap().messages.clone();
        assert_eq!(
            messages,
            vec![
                MidiMessage::new(0x91, 60, 127),
                MidiMessage::new(0x81, 60, 127),
                MidiMessage::new(0x91, 62, 127),
                MidiMessage::new(0x81, 62, 127),
            ]
        );
        assert_eq!(chan.cur_midi_note, -1);
    }

    #[test]
    fn pitch_bend_is_clamped_and_deduplicated() {
        let log = Arc::new(Mutex::new(RecordingSink::opened()));
        let mut d = dispatcher();
        d.set_midi(Some(Box::new(SharedSink(log.clone()))));
        let mut chan = ChannelRuntimeState::new(15);

        d.dispatch(&mut chan, Command::with_value(Opcode::Pitch, 0, 1000));
        d.dispatch(&mut chan, Command::with_value(Opcode::Pitch, 0, 1000));
        d.dispatch(&mut chan, Command::with_value(Opcode::Pitch, 0, 0));

        let messages = log.lock().unwrap().messages.clone();
        assert_eq!(
            messages,
            vec![MidiMessage::new(0xE0, 0x7f, 0x7f), MidiMessage::new(0xE0, 0, 64)]
        );
    }

    #[test]
    fn program_change_only_on_new_instrument() {
        let log = Arc::new(Mutex::new(RecordingSink::opened()));
        let mut d = dispatcher();
        d.set_midi(Some(Box::new(SharedSink(log.clone()))));
        let mut chan = ChannelRuntimeState::new(15);
        chan.last_ins = 2;

        d.dispatch(&mut chan, Command::with_value(Opcode::Instrument, 0, 2));
        d.dispatch(&mut chan, Command::with_value(Opcode::Instrument, 0, 5));
        let messages = log.lock().unwrap().messages.clone();
        assert_eq!(messages, vec![MidiMessage::new(0xC0, 5, 0)]);
    }

    #[test]
    fn closed_sink_receives_nothing() {
        let log = Arc::new(Mutex::new(RecordingSink::default()));
        let mut d = dispatcher();
        d.set_midi(Some(Box::new(SharedSink(log.clone()))));
        let mut chan = ChannelRuntimeState::new(15);
        d.begin_tick(1);
        d.dispatch(&mut chan, Command::with_value(Opcode::NoteOn, 0, 48));
        assert!(log.lock().unwrap().messages.is_empty());
    }

    #[test]
    fn policy_queries_resolve_local_channel() {
        let d = dispatcher();
        // SN76489 noise is local channel 3, song channel 6
        assert!(d.key_off_affects_arpeggio(6));
        assert!(!d.key_off_affects_arpeggio(2));
        assert_eq!(d.portamento_floor(3), 0x0c);
    }
}
