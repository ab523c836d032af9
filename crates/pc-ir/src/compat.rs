//! Compatibility flags that select between historical playback quirks.

/// How several slide effects on one channel row interact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum DuplicateSlides {
    /// Every slide effect applies; the last one in the row decides speed and target.
    #[default]
    LastWins,
    /// Only the first slide or portamento in the row applies.
    FirstWins,
    /// A slide is skipped if the previous one had the same direction or was a portamento.
    IgnoreRepeated,
}

/// Per-song playback quirks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompatFlags {
    /// Clamp pitch slides to the backend's range instead of running off.
    pub limit_slides: bool,
    pub duplicate_slides: DuplicateSlides,
    /// A note-off during portamento cancels the glide.
    pub note_off_resets_slides: bool,
    /// Reaching the portamento target stops the slide and snaps to the note.
    pub target_resets_slides: bool,
    /// Slides do not notify the backend with `PrePorta`.
    pub arp_non_porta: bool,
    pub buggy_porta_after_slide: bool,
    pub stop_porta_on_note_off: bool,
    /// A new instrument during portamento retriggers the note.
    pub new_ins_triggers_in_porta: bool,
    /// Vibrato phase is not reset by new notes.
    pub continuous_vibrato: bool,
    /// New notes hold the base note for one tick before arpeggio resumes.
    pub compatible_arpeggio: bool,
    /// `0000` resets the arpeggio to the base note.
    pub arp0_reset: bool,
    pub no_slides_on_first_tick: bool,
    pub row_resets_arp_pos: bool,
    /// Volume slides below zero wrap to the maximum.
    pub legacy_volume_slides: bool,
    /// Speed alternation follows pattern length and order parity.
    pub broken_speed_sel: bool,
    /// `E1xy`/`E2xy` do not send `PrePorta`.
    pub broken_shortcut_slides: bool,
    pub e1e2_also_take_priority: bool,
    /// `0Dxx` on the last order does nothing.
    pub ignore_jump_at_end: bool,
    /// Every note is cut one tick before the next row.
    pub one_tick_cut: bool,
    /// Keep channel state when the song loops.
    pub continue_on_loop: bool,
}

impl Default for CompatFlags {
    fn default() -> Self {
        Self {
            limit_slides: false,
            duplicate_slides: DuplicateSlides::LastWins,
            note_off_resets_slides: true,
            target_resets_slides: true,
            arp_non_porta: false,
            buggy_porta_after_slide: false,
            stop_porta_on_note_off: false,
            new_ins_triggers_in_porta: true,
            continuous_vibrato: false,
            compatible_arpeggio: false,
            arp0_reset: true,
            no_slides_on_first_tick: false,
            row_resets_arp_pos: false,
            legacy_volume_slides: false,
            broken_speed_sel: false,
            broken_shortcut_slides: false,
            e1e2_also_take_priority: false,
            ignore_jump_at_end: false,
            one_tick_cut: false,
            continue_on_loop: false,
        }
    }
}
