//! Note track data model: bit-packed steps, the note sequence and the
//! track-level settings.
//!
//! Step data packs into a single `u64` word per step so a 64-step sequence
//! is 512 bytes; the raw word is what the (external) project serializer
//! stores. Every field clamps to its declared range on write.

use crate::{
    routing::{Routable, Target},
    scale::Scale,
    types::{
        step_field, Condition, CvUpdateMode, FillMode, LayerRange, PatternFollow, PlayMode,
        RunMode, SignedValue, StageRepeatMode, UnsignedValue,
    },
    PATTERN_COUNT, SNAPSHOT_COUNT, STEP_COUNT,
};

pub type GateProbability = UnsignedValue<4>;
pub type GateOffset = SignedValue<4>;
pub type Retrigger = UnsignedValue<3>;
pub type RetriggerProbability = UnsignedValue<4>;
pub type Length = UnsignedValue<4>;
pub type LengthVariationRange = SignedValue<4>;
pub type LengthVariationProbability = UnsignedValue<4>;
pub type Note = SignedValue<7>;
pub type NoteVariationRange = SignedValue<7>;
pub type NoteVariationProbability = UnsignedValue<4>;
pub type StageRepeats = UnsignedValue<3>;

/// One step of a note sequence.
///
/// Bit layout of the raw word:
///
/// ```text
///  0        gate
///  1        slide
///  2        bypass scale
///  3..=6    length
///  7..=10   length variation range
/// 11..=14   length variation probability
/// 15..=21   note
/// 22..=28   note variation range
/// 29..=32   note variation probability
/// 33..=36   gate probability
/// 37..=40   gate offset
/// 41..=43   retrigger
/// 44..=47   retrigger probability
/// 48..=54   condition
/// 55..=57   stage repeats
/// 58..=60   stage repeat mode
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteStep {
    raw: u64,
}

impl NoteStep {
    step_field!(bool, gate, set_gate, 0);
    step_field!(bool, slide, set_slide, 1);
    step_field!(bool, bypass_scale, set_bypass_scale, 2);
    step_field!(Length, length, set_length, 3);
    step_field!(LengthVariationRange, length_variation_range, set_length_variation_range, 7);
    step_field!(
        LengthVariationProbability,
        length_variation_probability,
        set_length_variation_probability,
        11
    );
    step_field!(Note, note, set_note, 15);
    step_field!(NoteVariationRange, note_variation_range, set_note_variation_range, 22);
    step_field!(
        NoteVariationProbability,
        note_variation_probability,
        set_note_variation_probability,
        29
    );
    step_field!(GateProbability, gate_probability, set_gate_probability, 33);
    step_field!(GateOffset, gate_offset, set_gate_offset, 37);
    step_field!(Retrigger, retrigger, set_retrigger, 41);
    step_field!(RetriggerProbability, retrigger_probability, set_retrigger_probability, 44);
    step_field!(StageRepeats, stage_repeats, set_stage_repeats, 55);

    pub fn new() -> NoteStep {
        let mut step = NoteStep { raw: 0 };
        step.clear();
        step
    }

    pub fn clear(&mut self) {
        self.raw = 0;
        self.set_gate_probability(GateProbability::MAX);
        self.set_retrigger_probability(RetriggerProbability::MAX);
        self.set_length(Length::MAX / 2);
        self.set_length_variation_probability(LengthVariationProbability::MAX);
        self.set_note(0);
        self.set_note_variation_range(0);
        self.set_note_variation_probability(NoteVariationProbability::MAX);
        self.set_gate_offset(0);
        self.set_condition(Condition::Off);
    }

    pub fn toggle_gate(&mut self) {
        self.set_gate(!self.gate());
    }

    pub fn toggle_slide(&mut self) {
        self.set_slide(!self.slide());
    }

    pub fn condition(&self) -> Condition {
        Condition::from_index(self.condition_index() as usize)
    }

    pub fn set_condition(&mut self, condition: Condition) {
        self.set_condition_index(condition.index() as i32);
    }

    fn condition_index(&self) -> i32 {
        ((self.raw >> 48) & 0x7f) as i32
    }

    fn set_condition_index(&mut self, index: i32) {
        let index = index.clamp(0, Condition::COUNT as i32 - 1) as u64;
        self.raw = (self.raw & !(0x7fu64 << 48)) | (index << 48);
    }

    pub fn stage_repeat_mode(&self) -> StageRepeatMode {
        StageRepeatMode::try_from(((self.raw >> 58) & 0x7) as u8).unwrap_or_default()
    }

    pub fn set_stage_repeat_mode(&mut self, mode: StageRepeatMode) {
        self.raw = (self.raw & !(0x7u64 << 58)) | ((mode.index() as u64) << 58);
    }

    /// Raw word, for the external serializer.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn set_raw(&mut self, raw: u64) {
        self.raw = raw;
    }

    pub fn layer_value(&self, layer: NoteLayer) -> i32 {
        match layer {
            NoteLayer::Gate => self.gate() as i32,
            NoteLayer::GateProbability => self.gate_probability(),
            NoteLayer::GateOffset => self.gate_offset(),
            NoteLayer::Retrigger => self.retrigger(),
            NoteLayer::RetriggerProbability => self.retrigger_probability(),
            NoteLayer::StageRepeats => self.stage_repeats(),
            NoteLayer::StageRepeatsMode => self.stage_repeat_mode().index() as i32,
            NoteLayer::Length => self.length(),
            NoteLayer::LengthVariationRange => self.length_variation_range(),
            NoteLayer::LengthVariationProbability => self.length_variation_probability(),
            NoteLayer::Note => self.note(),
            NoteLayer::NoteVariationRange => self.note_variation_range(),
            NoteLayer::NoteVariationProbability => self.note_variation_probability(),
            NoteLayer::Slide => self.slide() as i32,
            NoteLayer::BypassScale => self.bypass_scale() as i32,
            NoteLayer::Condition => self.condition_index(),
        }
    }

    pub fn set_layer_value(&mut self, layer: NoteLayer, value: i32) {
        match layer {
            NoteLayer::Gate => self.set_gate(value != 0),
            NoteLayer::GateProbability => self.set_gate_probability(value),
            NoteLayer::GateOffset => self.set_gate_offset(value),
            NoteLayer::Retrigger => self.set_retrigger(value),
            NoteLayer::RetriggerProbability => self.set_retrigger_probability(value),
            NoteLayer::StageRepeats => self.set_stage_repeats(value),
            NoteLayer::StageRepeatsMode => {
                self.set_stage_repeat_mode(
                    StageRepeatMode::try_from(value.clamp(0, 7) as u8).unwrap_or_default(),
                );
            }
            NoteLayer::Length => self.set_length(value),
            NoteLayer::LengthVariationRange => self.set_length_variation_range(value),
            NoteLayer::LengthVariationProbability => {
                self.set_length_variation_probability(value)
            }
            NoteLayer::Note => self.set_note(value),
            NoteLayer::NoteVariationRange => self.set_note_variation_range(value),
            NoteLayer::NoteVariationProbability => self.set_note_variation_probability(value),
            NoteLayer::Slide => self.set_slide(value != 0),
            NoteLayer::BypassScale => self.set_bypass_scale(value != 0),
            NoteLayer::Condition => self.set_condition_index(value),
        }
    }
}

impl Default for NoteStep {
    fn default() -> Self {
        NoteStep::new()
    }
}

/// Editable layers of a note sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteLayer {
    Gate,
    GateProbability,
    GateOffset,
    Retrigger,
    RetriggerProbability,
    StageRepeats,
    StageRepeatsMode,
    Length,
    LengthVariationRange,
    LengthVariationProbability,
    Note,
    NoteVariationRange,
    NoteVariationProbability,
    Slide,
    BypassScale,
    Condition,
}

impl NoteLayer {
    pub fn name(self) -> &'static str {
        match self {
            NoteLayer::Gate => "GATE",
            NoteLayer::GateProbability => "GATE PROB",
            NoteLayer::GateOffset => "GATE OFFSET",
            NoteLayer::Retrigger => "RETRIG",
            NoteLayer::RetriggerProbability => "RETRIG PROB",
            NoteLayer::StageRepeats => "REPEAT",
            NoteLayer::StageRepeatsMode => "REPEAT MODE",
            NoteLayer::Length => "LENGTH",
            NoteLayer::LengthVariationRange => "LENGTH RANGE",
            NoteLayer::LengthVariationProbability => "LENGTH PROB",
            NoteLayer::Note => "NOTE",
            NoteLayer::NoteVariationRange => "NOTE RANGE",
            NoteLayer::NoteVariationProbability => "NOTE PROB",
            NoteLayer::Slide => "SLIDE",
            NoteLayer::BypassScale => "BYPASS SCALE",
            NoteLayer::Condition => "CONDITION",
        }
    }

    pub fn range(self) -> LayerRange {
        match self {
            NoteLayer::Gate | NoteLayer::Slide | NoteLayer::BypassScale => {
                LayerRange { min: 0, max: 1 }
            }
            NoteLayer::GateProbability => LayerRange {
                min: GateProbability::MIN,
                max: GateProbability::MAX,
            },
            NoteLayer::GateOffset => LayerRange {
                min: GateOffset::MIN,
                max: GateOffset::MAX,
            },
            NoteLayer::Retrigger => LayerRange {
                min: Retrigger::MIN,
                max: Retrigger::MAX,
            },
            NoteLayer::RetriggerProbability => LayerRange {
                min: RetriggerProbability::MIN,
                max: RetriggerProbability::MAX,
            },
            NoteLayer::StageRepeats => LayerRange {
                min: StageRepeats::MIN,
                max: StageRepeats::MAX,
            },
            NoteLayer::StageRepeatsMode => LayerRange {
                min: 0,
                max: StageRepeatMode::COUNT as i32 - 1,
            },
            NoteLayer::Length => LayerRange {
                min: Length::MIN,
                max: Length::MAX,
            },
            NoteLayer::LengthVariationRange => LayerRange {
                min: LengthVariationRange::MIN,
                max: LengthVariationRange::MAX,
            },
            NoteLayer::LengthVariationProbability => LayerRange {
                min: LengthVariationProbability::MIN,
                max: LengthVariationProbability::MAX,
            },
            NoteLayer::Note => LayerRange {
                min: Note::MIN,
                max: Note::MAX,
            },
            NoteLayer::NoteVariationRange => LayerRange {
                min: NoteVariationRange::MIN,
                max: NoteVariationRange::MAX,
            },
            NoteLayer::NoteVariationProbability => LayerRange {
                min: NoteVariationProbability::MIN,
                max: NoteVariationProbability::MAX,
            },
            NoteLayer::Condition => LayerRange {
                min: 0,
                max: Condition::COUNT as i32 - 1,
            },
        }
    }

    pub fn default_value(self) -> i32 {
        NoteStep::new().layer_value(self)
    }
}

/// A 64-step note sequence with its sequence-level parameters.
#[derive(Clone, Debug)]
pub struct NoteSequence {
    scale: Routable<i8>,
    root_note: Routable<i8>,
    divisor: Routable<u16>,
    reset_measure: u8,
    run_mode: Routable<RunMode>,
    first_step: Routable<u8>,
    last_step: Routable<u8>,
    steps: [NoteStep; STEP_COUNT],
}

impl Default for NoteSequence {
    fn default() -> Self {
        let mut sequence = NoteSequence {
            scale: Routable::new(-1),
            root_note: Routable::new(-1),
            divisor: Routable::new(12),
            reset_measure: 0,
            run_mode: Routable::new(RunMode::Forward),
            first_step: Routable::new(0),
            last_step: Routable::new(15),
            steps: [NoteStep::new(); STEP_COUNT],
        };
        sequence.clear();
        sequence
    }
}

impl NoteSequence {
    pub fn new() -> NoteSequence {
        NoteSequence::default()
    }

    pub fn clear(&mut self) {
        self.scale = Routable::new(-1);
        self.root_note = Routable::new(-1);
        self.divisor = Routable::new(12);
        self.reset_measure = 0;
        self.run_mode = Routable::new(RunMode::Forward);
        self.first_step = Routable::new(0);
        self.last_step = Routable::new(15);
        self.clear_steps();
    }

    pub fn clear_steps(&mut self) {
        for step in self.steps.iter_mut() {
            step.clear();
        }
    }

    // scale

    /// Sequence scale index, -1 meaning the project default.
    pub fn scale(&self) -> i32 {
        self.scale.get() as i32
    }

    pub fn set_scale(&mut self, scale: i32, routed: bool) {
        self.scale
            .set(scale.clamp(-1, Scale::COUNT as i32 - 1) as i8, routed);
    }

    pub fn selected_scale(&self, default_scale: i32) -> &'static Scale {
        let scale = self.scale();
        Scale::get(if scale < 0 { default_scale } else { scale })
    }

    // root note

    /// Root note, -1 meaning the project default.
    pub fn root_note(&self) -> i32 {
        self.root_note.get() as i32
    }

    pub fn set_root_note(&mut self, root_note: i32, routed: bool) {
        self.root_note.set(root_note.clamp(-1, 11) as i8, routed);
    }

    pub fn selected_root_note(&self, default_root_note: i32) -> i32 {
        let root_note = self.root_note();
        if root_note < 0 {
            default_root_note
        } else {
            root_note
        }
    }

    // divisor

    pub fn divisor(&self) -> u32 {
        self.divisor.get() as u32
    }

    pub fn set_divisor(&mut self, divisor: i32, routed: bool) {
        self.divisor.set(divisor.clamp(1, 768) as u16, routed);
    }

    // reset measure

    pub fn reset_measure(&self) -> u32 {
        self.reset_measure as u32
    }

    pub fn set_reset_measure(&mut self, reset_measure: i32) {
        self.reset_measure = reset_measure.clamp(0, 128) as u8;
    }

    // run mode

    pub fn run_mode(&self) -> RunMode {
        self.run_mode.get()
    }

    pub fn set_run_mode(&mut self, run_mode: RunMode, routed: bool) {
        self.run_mode.set(run_mode, routed);
    }

    // step window

    pub fn first_step(&self) -> i32 {
        self.first_step.get() as i32
    }

    pub fn set_first_step(&mut self, first_step: i32, routed: bool) {
        self.first_step
            .set(first_step.clamp(0, self.last_step()) as u8, routed);
    }

    /// Last step of the window. Read-side clamp keeps the invariant
    /// `first_step <= last_step` even when routing drives the stored value
    /// below the first step.
    pub fn last_step(&self) -> i32 {
        (self.last_step.get() as i32).max(self.first_step())
    }

    pub fn set_last_step(&mut self, last_step: i32, routed: bool) {
        self.last_step.set(
            last_step.clamp(self.first_step(), STEP_COUNT as i32 - 1) as u8,
            routed,
        );
    }

    // steps

    pub fn step(&self, index: usize) -> &NoteStep {
        &self.steps[index]
    }

    pub fn step_mut(&mut self, index: usize) -> &mut NoteStep {
        &mut self.steps[index]
    }

    pub fn steps(&self) -> &[NoteStep; STEP_COUNT] {
        &self.steps
    }

    /// Seed the gates of the first steps, mostly for tests and demos.
    pub fn set_gates(&mut self, gates: &[bool]) {
        for (step, &gate) in self.steps.iter_mut().zip(gates) {
            step.set_gate(gate);
        }
    }

    pub fn set_notes(&mut self, notes: &[i32]) {
        for (step, &note) in self.steps.iter_mut().zip(notes) {
            step.set_note(note);
        }
    }

    /// Rotate the steps of the active window by one position.
    pub fn shift_steps(&mut self, direction: i32) {
        let first = self.first_step() as usize;
        let last = self.last_step() as usize;
        let window = &mut self.steps[first..=last];
        if direction > 0 {
            window.rotate_right(1);
        } else if direction < 0 {
            window.rotate_left(1);
        }
    }

    /// Copy the active window after itself and extend the window over the
    /// copy, as far as the step array allows.
    pub fn duplicate_steps(&mut self) {
        let first = self.first_step() as usize;
        let last = self.last_step() as usize;
        let length = last - first + 1;
        for source in first..=last {
            let destination = source + length;
            if destination < STEP_COUNT {
                self.steps[destination] = self.steps[source];
            }
        }
        self.set_last_step(self.last_step() + length as i32, false);
    }

    pub fn is_edited(&self) -> bool {
        let clear_step = NoteStep::new();
        self.steps.iter().any(|step| *step != clear_step)
    }

    // routing

    pub fn write_routed(&mut self, target: Target, int_value: i32) {
        match target {
            Target::Scale => self.set_scale(int_value, true),
            Target::RootNote => self.set_root_note(int_value, true),
            Target::Divisor => self.set_divisor(int_value, true),
            Target::RunMode => {
                let run_mode = RunMode::try_from(
                    int_value.clamp(0, RunMode::COUNT as i32 - 1) as u8,
                )
                .unwrap_or_default();
                self.set_run_mode(run_mode, true);
            }
            Target::FirstStep => self.set_first_step(int_value, true),
            Target::LastStep => self.set_last_step(int_value, true),
            _ => {}
        }
    }

    pub fn clear_routed(&mut self, target: Target) {
        match target {
            Target::Scale => self.scale.clear_routed(),
            Target::RootNote => self.root_note.clear_routed(),
            Target::Divisor => self.divisor.clear_routed(),
            Target::RunMode => self.run_mode.clear_routed(),
            Target::FirstStep => self.first_step.clear_routed(),
            Target::LastStep => self.last_step.clear_routed(),
            _ => {}
        }
    }
}

/// Track-level settings of a note track, owning one sequence per pattern
/// plus the snapshot slot.
#[derive(Clone, Debug)]
pub struct NoteTrack {
    play_mode: PlayMode,
    fill_mode: FillMode,
    fill_muted: bool,
    cv_update_mode: CvUpdateMode,
    pattern_follow: PatternFollow,
    slide_time: Routable<u8>,
    octave: Routable<i8>,
    transpose: Routable<i8>,
    rotate: i8,
    gate_probability_bias: Routable<i8>,
    retrigger_probability_bias: Routable<i8>,
    length_bias: Routable<i8>,
    note_probability_bias: Routable<i8>,
    sequences: [NoteSequence; PATTERN_COUNT + SNAPSHOT_COUNT],
}

impl Default for NoteTrack {
    fn default() -> Self {
        NoteTrack {
            play_mode: PlayMode::Aligned,
            fill_mode: FillMode::None,
            fill_muted: false,
            cv_update_mode: CvUpdateMode::Gate,
            pattern_follow: PatternFollow::Off,
            slide_time: Routable::new(50),
            octave: Routable::new(0),
            transpose: Routable::new(0),
            rotate: 0,
            gate_probability_bias: Routable::new(0),
            retrigger_probability_bias: Routable::new(0),
            length_bias: Routable::new(0),
            note_probability_bias: Routable::new(0),
            sequences: core::array::from_fn(|_| NoteSequence::default()),
        }
    }
}

impl NoteTrack {
    pub fn new() -> NoteTrack {
        NoteTrack::default()
    }

    pub fn play_mode(&self) -> PlayMode {
        self.play_mode
    }

    pub fn set_play_mode(&mut self, play_mode: PlayMode) {
        self.play_mode = play_mode;
    }

    pub fn fill_mode(&self) -> FillMode {
        self.fill_mode
    }

    pub fn set_fill_mode(&mut self, fill_mode: FillMode) {
        self.fill_mode = fill_mode;
    }

    /// Whether fills keep playing while the track is muted.
    pub fn fill_muted(&self) -> bool {
        self.fill_muted
    }

    pub fn set_fill_muted(&mut self, fill_muted: bool) {
        self.fill_muted = fill_muted;
    }

    pub fn cv_update_mode(&self) -> CvUpdateMode {
        self.cv_update_mode
    }

    pub fn set_cv_update_mode(&mut self, cv_update_mode: CvUpdateMode) {
        self.cv_update_mode = cv_update_mode;
    }

    pub fn pattern_follow(&self) -> PatternFollow {
        self.pattern_follow
    }

    pub fn set_pattern_follow(&mut self, pattern_follow: PatternFollow) {
        self.pattern_follow = pattern_follow;
    }

    /// Slide time in percent, 0..=100.
    pub fn slide_time(&self) -> i32 {
        self.slide_time.get() as i32
    }

    pub fn set_slide_time(&mut self, slide_time: i32, routed: bool) {
        self.slide_time.set(slide_time.clamp(0, 100) as u8, routed);
    }

    pub fn octave(&self) -> i32 {
        self.octave.get() as i32
    }

    pub fn set_octave(&mut self, octave: i32, routed: bool) {
        self.octave.set(octave.clamp(-10, 10) as i8, routed);
    }

    pub fn transpose(&self) -> i32 {
        self.transpose.get() as i32
    }

    pub fn set_transpose(&mut self, transpose: i32, routed: bool) {
        self.transpose.set(transpose.clamp(-100, 100) as i8, routed);
    }

    pub fn rotate(&self) -> i32 {
        self.rotate as i32
    }

    pub fn set_rotate(&mut self, rotate: i32) {
        self.rotate = rotate.clamp(-(STEP_COUNT as i32 - 1), STEP_COUNT as i32 - 1) as i8;
    }

    pub fn gate_probability_bias(&self) -> i32 {
        self.gate_probability_bias.get() as i32
    }

    pub fn set_gate_probability_bias(&mut self, bias: i32, routed: bool) {
        self.gate_probability_bias.set(
            bias.clamp(-GateProbability::RANGE, GateProbability::RANGE) as i8,
            routed,
        );
    }

    pub fn retrigger_probability_bias(&self) -> i32 {
        self.retrigger_probability_bias.get() as i32
    }

    pub fn set_retrigger_probability_bias(&mut self, bias: i32, routed: bool) {
        self.retrigger_probability_bias.set(
            bias.clamp(-RetriggerProbability::RANGE, RetriggerProbability::RANGE) as i8,
            routed,
        );
    }

    pub fn length_bias(&self) -> i32 {
        self.length_bias.get() as i32
    }

    pub fn set_length_bias(&mut self, bias: i32, routed: bool) {
        self.length_bias
            .set(bias.clamp(-Length::RANGE, Length::RANGE) as i8, routed);
    }

    pub fn note_probability_bias(&self) -> i32 {
        self.note_probability_bias.get() as i32
    }

    pub fn set_note_probability_bias(&mut self, bias: i32, routed: bool) {
        self.note_probability_bias.set(
            bias.clamp(-NoteVariationProbability::RANGE, NoteVariationProbability::RANGE) as i8,
            routed,
        );
    }

    pub fn sequence(&self, pattern: usize) -> &NoteSequence {
        &self.sequences[pattern.min(PATTERN_COUNT + SNAPSHOT_COUNT - 1)]
    }

    pub fn sequence_mut(&mut self, pattern: usize) -> &mut NoteSequence {
        &mut self.sequences[pattern.min(PATTERN_COUNT + SNAPSHOT_COUNT - 1)]
    }

    pub fn write_routed(&mut self, target: Target, int_value: i32) {
        match target {
            Target::SlideTime => self.set_slide_time(int_value, true),
            Target::Octave => self.set_octave(int_value, true),
            Target::Transpose => self.set_transpose(int_value, true),
            Target::GateProbabilityBias => self.set_gate_probability_bias(int_value, true),
            Target::RetriggerProbabilityBias => {
                self.set_retrigger_probability_bias(int_value, true)
            }
            Target::LengthBias => self.set_length_bias(int_value, true),
            Target::NoteProbabilityBias => self.set_note_probability_bias(int_value, true),
            _ => {}
        }
    }

    pub fn clear_routed(&mut self, target: Target) {
        match target {
            Target::SlideTime => self.slide_time.clear_routed(),
            Target::Octave => self.octave.clear_routed(),
            Target::Transpose => self.transpose.clear_routed(),
            Target::GateProbabilityBias => self.gate_probability_bias.clear_routed(),
            Target::RetriggerProbabilityBias => self.retrigger_probability_bias.clear_routed(),
            Target::LengthBias => self.length_bias.clear_routed(),
            Target::NoteProbabilityBias => self.note_probability_bias.clear_routed(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_fields_round_trip_their_ranges() {
        let mut step = NoteStep::new();
        for value in Note::MIN..=Note::MAX {
            step.set_note(value);
            assert_eq!(value, step.note());
        }
        for value in GateOffset::MIN..=GateOffset::MAX {
            step.set_gate_offset(value);
            assert_eq!(value, step.gate_offset());
        }
        for value in 0..=Retrigger::MAX {
            step.set_retrigger(value);
            assert_eq!(value, step.retrigger());
        }
    }

    #[test]
    fn step_fields_clamp_out_of_range_writes() {
        let mut step = NoteStep::new();
        step.set_note(1000);
        assert_eq!(Note::MAX, step.note());
        step.set_note(-1000);
        assert_eq!(Note::MIN, step.note());
        step.set_gate_probability(99);
        assert_eq!(GateProbability::MAX, step.gate_probability());
    }

    #[test]
    fn step_fields_do_not_disturb_neighbours() {
        let mut step = NoteStep::new();
        step.set_note(-31);
        step.set_gate(true);
        step.set_gate_offset(-5);
        step.set_condition(Condition::First);
        assert_eq!(-31, step.note());
        assert!(step.gate());
        assert_eq!(-5, step.gate_offset());
        assert_eq!(Condition::First, step.condition());
    }

    #[test]
    fn clear_sets_documented_defaults() {
        let step = NoteStep::new();
        assert!(!step.gate());
        assert!(!step.slide());
        assert_eq!(GateProbability::MAX, step.gate_probability());
        assert_eq!(Length::MAX / 2, step.length());
        assert_eq!(0, step.note());
        assert_eq!(Condition::Off, step.condition());
        assert_eq!(StageRepeatMode::Each, step.stage_repeat_mode());
        assert_eq!(0, step.stage_repeats());
    }

    #[test]
    fn condition_round_trips_through_step() {
        let mut step = NoteStep::new();
        for index in 0..Condition::COUNT {
            let condition = Condition::from_index(index);
            step.set_condition(condition);
            assert_eq!(condition, step.condition());
        }
    }

    #[test]
    fn layer_values_round_trip() {
        let mut step = NoteStep::new();
        for layer in [
            NoteLayer::Gate,
            NoteLayer::GateProbability,
            NoteLayer::GateOffset,
            NoteLayer::Retrigger,
            NoteLayer::RetriggerProbability,
            NoteLayer::StageRepeats,
            NoteLayer::StageRepeatsMode,
            NoteLayer::Length,
            NoteLayer::LengthVariationRange,
            NoteLayer::LengthVariationProbability,
            NoteLayer::Note,
            NoteLayer::NoteVariationRange,
            NoteLayer::NoteVariationProbability,
            NoteLayer::Slide,
            NoteLayer::BypassScale,
            NoteLayer::Condition,
        ] {
            let range = layer.range();
            step.set_layer_value(layer, range.min);
            assert_eq!(range.min, step.layer_value(layer), "{:?}", layer);
            step.set_layer_value(layer, range.max);
            assert_eq!(range.max, step.layer_value(layer), "{:?}", layer);
        }
    }

    #[test]
    fn last_step_read_clamps_to_first_step() {
        let mut sequence = NoteSequence::new();
        sequence.set_last_step(10, false);
        sequence.set_first_step(5, false);
        // drive the stored last step below the first step through routing
        sequence.write_routed(Target::LastStep, 2);
        assert_eq!(5, sequence.last_step());
        sequence.clear_routed(Target::LastStep);
        assert_eq!(10, sequence.last_step());
    }

    #[test]
    fn first_step_write_clamps_to_last_step() {
        let mut sequence = NoteSequence::new();
        sequence.set_last_step(7, false);
        sequence.set_first_step(20, false);
        assert_eq!(7, sequence.first_step());
    }

    #[test]
    fn routed_divisor_shadows_base() {
        let mut sequence = NoteSequence::new();
        sequence.set_divisor(12, false);
        sequence.write_routed(Target::Divisor, 24);
        assert_eq!(24, sequence.divisor());
        sequence.clear_routed(Target::Divisor);
        assert_eq!(12, sequence.divisor());
    }

    #[test]
    fn shift_steps_rotates_active_window_only() {
        let mut sequence = NoteSequence::new();
        sequence.set_last_step(3, false);
        sequence.set_notes(&[1, 2, 3, 4, 5]);
        sequence.shift_steps(1);
        let notes: Vec<i32> = (0..5).map(|i| sequence.step(i).note()).collect();
        assert_eq!(vec![4, 1, 2, 3, 5], notes);
        sequence.shift_steps(-1);
        let notes: Vec<i32> = (0..5).map(|i| sequence.step(i).note()).collect();
        assert_eq!(vec![1, 2, 3, 4, 5], notes);
    }

    #[test]
    fn duplicate_steps_copies_window_and_extends_it() {
        let mut sequence = NoteSequence::new();
        sequence.set_last_step(3, false);
        sequence.set_notes(&[1, 2, 3, 4]);
        sequence.duplicate_steps();
        assert_eq!(7, sequence.last_step());
        let notes: Vec<i32> = (0..8).map(|i| sequence.step(i).note()).collect();
        assert_eq!(vec![1, 2, 3, 4, 1, 2, 3, 4], notes);
    }

    #[test]
    fn is_edited_detects_any_step_change() {
        let mut sequence = NoteSequence::new();
        assert!(!sequence.is_edited());
        sequence.step_mut(5).set_gate(true);
        assert!(sequence.is_edited());
    }

    #[test]
    fn track_bias_clamps() {
        let mut track = NoteTrack::new();
        track.set_gate_probability_bias(100, false);
        assert_eq!(GateProbability::RANGE, track.gate_probability_bias());
        track.set_gate_probability_bias(-100, false);
        assert_eq!(-GateProbability::RANGE, track.gate_probability_bias());
    }

    #[test]
    fn track_owns_pattern_and_snapshot_sequences() {
        let track = NoteTrack::new();
        // the snapshot slot sits one past the patterns
        assert_eq!(15, track.sequence(PATTERN_COUNT).last_step());
    }
}
