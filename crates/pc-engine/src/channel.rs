//! Per-channel sequencer state.

/// Pitch the sequencer treats as "no note yet".
pub const NO_NOTE: i32 = -1;

/// Runtime state for one song channel.
///
/// Mutated only by the sequencer while processing rows and ticks. The MIDI
/// mirror fields are read and written by the dispatcher when it forwards a
/// command for this channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelRuntimeState {
    /// Current note (absolute pitch, C-0 = 0)
    pub note: i32,
    /// Note before the last note change
    pub old_note: i32,
    /// Fine pitch offset from `E5xx`, in backend pitch units
    pub pitch: i32,
    /// 8.8 fixed point; `volume >> 8` is what the chip sees
    pub volume: i32,
    /// Backend maximum in the same 8.8 format, low byte filled
    pub vol_max: i32,
    /// Added to `volume` every tick while nonzero
    pub vol_speed: i32,

    /// Glide target, `None` when no portamento is set up
    pub porta_note: Option<i32>,
    /// Glide speed; `<= 0` means idle
    pub porta_speed: i32,

    pub vibrato_depth: i32,
    pub vibrato_rate: i32,
    /// Phase into the 64-step vibrato table
    pub vibrato_pos: i32,
    /// 0 both ways, 1 up only, 2 down only
    pub vibrato_dir: i32,
    pub vibrato_fine: i32,

    /// Arpeggio intervals as `0xXY`
    pub arp: u8,
    /// -1 before the first step of a note
    pub arp_stage: i32,
    pub arp_ticks: i32,

    /// Ticks until a note cut, 0 when none pending
    pub cut: i32,
    /// Ticks until a delayed row replays, 0 when none pending
    pub row_delay: i32,
    pub delay_order: usize,
    pub delay_row: usize,
    pub retrig_speed: i32,
    pub retrig_tick: i32,

    /// Last instrument dispatched, -1 before the first
    pub last_ins: i32,

    pub key_on: bool,
    pub key_off: bool,
    pub in_porta: bool,
    pub legato: bool,
    /// Set when a note delay equals the next row's speed
    pub delay_locked: bool,
    pub porta_stop: bool,
    pub stop_on_off: bool,
    /// Hold the base note for one tick before arpeggio resumes
    pub arp_yield: bool,
    pub do_note: bool,
    pub now_you_can_stop: bool,
    pub scheduled_slide_reset: bool,
    /// `E1xy`/`E2xy` short portamento set up on this row
    pub shorthand_porta: bool,
    /// Suppress the next note-on (live input already sent one)
    pub note_on_inhibit: bool,
    pub reset_arp: bool,

    /// MIDI note currently sounding on the mirror, -1 when none
    pub cur_midi_note: i32,
    /// Last pitch bend sent to the mirror
    pub midi_pitch: i32,
    /// A volume-only row asked for one aftertouch message
    pub midi_aftertouch: bool,
}

impl ChannelRuntimeState {
    /// Fresh state for a channel whose backend reports `vol_max`.
    pub fn new(vol_max: i32) -> Self {
        let vol_max = (vol_max.max(0) << 8) | 0xff;
        Self {
            note: NO_NOTE,
            old_note: NO_NOTE,
            pitch: 0,
            volume: vol_max,
            vol_max,
            vol_speed: 0,
            porta_note: None,
            porta_speed: -1,
            vibrato_depth: 0,
            vibrato_rate: 0,
            vibrato_pos: 0,
            vibrato_dir: 0,
            vibrato_fine: 15,
            arp: 0,
            arp_stage: -1,
            arp_ticks: 1,
            cut: 0,
            row_delay: 0,
            delay_order: 0,
            delay_row: 0,
            retrig_speed: 0,
            retrig_tick: 0,
            last_ins: -1,
            key_on: false,
            key_off: false,
            in_porta: false,
            legato: false,
            delay_locked: false,
            porta_stop: false,
            stop_on_off: false,
            arp_yield: false,
            do_note: false,
            now_you_can_stop: true,
            scheduled_slide_reset: false,
            shorthand_porta: false,
            note_on_inhibit: false,
            reset_arp: false,
            cur_midi_note: -1,
            midi_pitch: -1,
            midi_aftertouch: false,
        }
    }

    /// Return to the power-on state.
    pub fn reset(&mut self, vol_max: i32) {
        *self = Self::new(vol_max);
    }

    /// Chip-visible volume.
    pub fn chip_volume(&self) -> i32 {
        self.volume >> 8
    }

    /// Forget any glide in progress.
    pub fn clear_porta(&mut self) {
        self.porta_note = None;
        self.porta_speed = -1;
    }

    pub fn is_sliding(&self) -> bool {
        self.porta_speed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_at_full_volume() {
        let chan = ChannelRuntimeState::new(15);
        assert_eq!(chan.vol_max, (15 << 8) | 0xff);
        assert_eq!(chan.chip_volume(), 15);
        assert_eq!(chan.note, NO_NOTE);
        assert!(!chan.is_sliding());
    }

    #[test]
    fn reset_discards_everything() {
        let mut chan = ChannelRuntimeState::new(127);
        chan.in_porta = true;
        chan.porta_speed = 4;
        chan.volume = 3;
        chan.cur_midi_note = 60;
        chan.reset(127);
        assert_eq!(chan, ChannelRuntimeState::new(127));
    }
}
