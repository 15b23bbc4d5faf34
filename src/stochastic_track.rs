//! Stochastic track data model.
//!
//! A stochastic sequence is a 12-entry pitch table rather than a timeline:
//! each gated entry's note-variation probability is its weight in the
//! per-step pitch draw. Sequence-level rest probabilities, octave bounds and
//! the locked-loop flags shape the draw; the engine owns the loop buffers.

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
pub type NoteOctave = SignedValue<3>;
pub type NoteVariationProbability = UnsignedValue<4>;
pub type NoteOctaveProbability = UnsignedValue<4>;
pub type StageRepeats = UnsignedValue<3>;

/// Entries of the pitch table that take part in the weighted draw.
pub const PITCH_TABLE_SIZE: usize = 12;

/// One entry of a stochastic sequence.
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
/// 22..=24   note octave
/// 25..=28   note variation probability (draw weight)
/// 29..=32   note octave probability
/// 33..=36   gate probability
/// 37..=40   gate offset
/// 41..=43   retrigger
/// 44..=47   retrigger probability
/// 48..=54   condition
/// 55..=57   stage repeats
/// 58..=60   stage repeat mode
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StochasticStep {
    raw: u64,
}

impl StochasticStep {
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
    step_field!(NoteOctave, note_octave, set_note_octave, 22);
    step_field!(
        NoteVariationProbability,
        note_variation_probability,
        set_note_variation_probability,
        25
    );
    step_field!(
        NoteOctaveProbability,
        note_octave_probability,
        set_note_octave_probability,
        29
    );
    step_field!(GateProbability, gate_probability, set_gate_probability, 33);
    step_field!(GateOffset, gate_offset, set_gate_offset, 37);
    step_field!(Retrigger, retrigger, set_retrigger, 41);
    step_field!(RetriggerProbability, retrigger_probability, set_retrigger_probability, 44);
    step_field!(StageRepeats, stage_repeats, set_stage_repeats, 55);

    pub fn new() -> StochasticStep {
        let mut step = StochasticStep { raw: 0 };
        step.clear();
        step
    }

    pub fn clear(&mut self) {
        self.raw = 0;
        self.set_gate_probability(GateProbability::MAX);
        self.set_bypass_scale(true);
        self.set_retrigger_probability(RetriggerProbability::MAX);
        self.set_length(Length::MAX / 2);
        self.set_length_variation_probability(LengthVariationProbability::MAX);
        self.set_note(0);
        self.set_note_octave(0);
        self.set_note_octave_probability(NoteOctaveProbability::MIN);
        self.set_note_variation_probability(NoteVariationProbability::MAX);
        self.set_condition(Condition::Off);
    }

    pub fn toggle_gate(&mut self) {
        self.set_gate(!self.gate());
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

    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn set_raw(&mut self, raw: u64) {
        self.raw = raw;
    }

    pub fn layer_value(&self, layer: StochasticLayer) -> i32 {
        match layer {
            StochasticLayer::Gate => self.gate() as i32,
            StochasticLayer::GateProbability => self.gate_probability(),
            StochasticLayer::GateOffset => self.gate_offset(),
            StochasticLayer::Retrigger => self.retrigger(),
            StochasticLayer::RetriggerProbability => self.retrigger_probability(),
            StochasticLayer::StageRepeats => self.stage_repeats(),
            StochasticLayer::StageRepeatsMode => self.stage_repeat_mode().index() as i32,
            StochasticLayer::Length => self.length(),
            StochasticLayer::LengthVariationRange => self.length_variation_range(),
            StochasticLayer::LengthVariationProbability => self.length_variation_probability(),
            StochasticLayer::NoteVariationProbability => self.note_variation_probability(),
            StochasticLayer::NoteOctave => self.note_octave(),
            StochasticLayer::NoteOctaveProbability => self.note_octave_probability(),
            StochasticLayer::Slide => self.slide() as i32,
            StochasticLayer::Condition => self.condition_index(),
        }
    }

    pub fn set_layer_value(&mut self, layer: StochasticLayer, value: i32) {
        match layer {
            StochasticLayer::Gate => self.set_gate(value != 0),
            StochasticLayer::GateProbability => self.set_gate_probability(value),
            StochasticLayer::GateOffset => self.set_gate_offset(value),
            StochasticLayer::Retrigger => self.set_retrigger(value),
            StochasticLayer::RetriggerProbability => self.set_retrigger_probability(value),
            StochasticLayer::StageRepeats => self.set_stage_repeats(value),
            StochasticLayer::StageRepeatsMode => {
                self.set_stage_repeat_mode(
                    StageRepeatMode::try_from(value.clamp(0, 7) as u8).unwrap_or_default(),
                );
            }
            StochasticLayer::Length => self.set_length(value),
            StochasticLayer::LengthVariationRange => self.set_length_variation_range(value),
            StochasticLayer::LengthVariationProbability => {
                self.set_length_variation_probability(value)
            }
            StochasticLayer::NoteVariationProbability => {
                self.set_note_variation_probability(value)
            }
            StochasticLayer::NoteOctave => self.set_note_octave(value),
            StochasticLayer::NoteOctaveProbability => self.set_note_octave_probability(value),
            StochasticLayer::Slide => self.set_slide(value != 0),
            StochasticLayer::Condition => self.set_condition_index(value),
        }
    }
}

impl Default for StochasticStep {
    fn default() -> Self {
        StochasticStep::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StochasticLayer {
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
    NoteVariationProbability,
    NoteOctave,
    NoteOctaveProbability,
    Slide,
    Condition,
}

impl StochasticLayer {
    pub fn name(self) -> &'static str {
        match self {
            StochasticLayer::Gate => "GATE",
            StochasticLayer::GateProbability => "GATE PROB",
            StochasticLayer::GateOffset => "GATE OFFSET",
            StochasticLayer::Retrigger => "RETRIG",
            StochasticLayer::RetriggerProbability => "RETRIG PROB",
            StochasticLayer::StageRepeats => "REPEAT",
            StochasticLayer::StageRepeatsMode => "REPEAT MODE",
            StochasticLayer::Length => "LENGTH",
            StochasticLayer::LengthVariationRange => "LENGTH RANGE",
            StochasticLayer::LengthVariationProbability => "LENGTH PROB",
            StochasticLayer::NoteVariationProbability => "NOTE PROB",
            StochasticLayer::NoteOctave => "OCTAVE",
            StochasticLayer::NoteOctaveProbability => "OCTAVE PROB",
            StochasticLayer::Slide => "SLIDE",
            StochasticLayer::Condition => "CONDITION",
        }
    }

    pub fn range(self) -> LayerRange {
        match self {
            StochasticLayer::Gate | StochasticLayer::Slide => LayerRange { min: 0, max: 1 },
            StochasticLayer::GateProbability => LayerRange {
                min: GateProbability::MIN,
                max: GateProbability::MAX,
            },
            StochasticLayer::GateOffset => LayerRange {
                min: GateOffset::MIN,
                max: GateOffset::MAX,
            },
            StochasticLayer::Retrigger => LayerRange {
                min: Retrigger::MIN,
                max: Retrigger::MAX,
            },
            StochasticLayer::RetriggerProbability => LayerRange {
                min: RetriggerProbability::MIN,
                max: RetriggerProbability::MAX,
            },
            StochasticLayer::StageRepeats => LayerRange {
                min: StageRepeats::MIN,
                max: StageRepeats::MAX,
            },
            StochasticLayer::StageRepeatsMode => LayerRange {
                min: 0,
                max: StageRepeatMode::COUNT as i32 - 1,
            },
            StochasticLayer::Length => LayerRange {
                min: Length::MIN,
                max: Length::MAX,
            },
            StochasticLayer::LengthVariationRange => LayerRange {
                min: LengthVariationRange::MIN,
                max: LengthVariationRange::MAX,
            },
            StochasticLayer::LengthVariationProbability => LayerRange {
                min: LengthVariationProbability::MIN,
                max: LengthVariationProbability::MAX,
            },
            StochasticLayer::NoteVariationProbability => LayerRange {
                min: NoteVariationProbability::MIN,
                max: NoteVariationProbability::MAX,
            },
            StochasticLayer::NoteOctave => LayerRange {
                min: NoteOctave::MIN,
                max: NoteOctave::MAX,
            },
            StochasticLayer::NoteOctaveProbability => LayerRange {
                min: NoteOctaveProbability::MIN,
                max: NoteOctaveProbability::MAX,
            },
            StochasticLayer::Condition => LayerRange {
                min: 0,
                max: Condition::COUNT as i32 - 1,
            },
        }
    }

    pub fn default_value(self) -> i32 {
        StochasticStep::new().layer_value(self)
    }
}

/// A stochastic sequence: the pitch table plus the parameters steering the
/// draw and the locked loop.
#[derive(Clone, Debug)]
pub struct StochasticSequence {
    scale: Routable<i8>,
    root_note: Routable<i8>,
    divisor: Routable<u16>,
    reset_measure: u8,
    run_mode: Routable<RunMode>,
    first_step: Routable<u8>,
    last_step: Routable<u8>,
    sequence_first_step: Routable<u8>,
    sequence_last_step: Routable<u8>,
    rest_probability: Routable<i8>,
    rest_probability2: Routable<i8>,
    rest_probability4: Routable<i8>,
    rest_probability8: Routable<i8>,
    low_octave_range: Routable<i8>,
    high_octave_range: Routable<i8>,
    length_modifier: Routable<i8>,
    reseed: Routable<u8>,
    use_loop: bool,
    clear_loop: bool,
    steps: [StochasticStep; STEP_COUNT],
}

impl Default for StochasticSequence {
    fn default() -> Self {
        let mut sequence = StochasticSequence {
            scale: Routable::new(-1),
            root_note: Routable::new(-1),
            divisor: Routable::new(12),
            reset_measure: 0,
            run_mode: Routable::new(RunMode::Forward),
            first_step: Routable::new(0),
            last_step: Routable::new(0),
            sequence_first_step: Routable::new(0),
            sequence_last_step: Routable::new(15),
            rest_probability: Routable::new(0),
            rest_probability2: Routable::new(0),
            rest_probability4: Routable::new(0),
            rest_probability8: Routable::new(0),
            low_octave_range: Routable::new(0),
            high_octave_range: Routable::new(0),
            length_modifier: Routable::new(0),
            reseed: Routable::new(0),
            use_loop: false,
            clear_loop: false,
            steps: [StochasticStep::new(); STEP_COUNT],
        };
        sequence.clear();
        sequence
    }
}

impl StochasticSequence {
    pub fn new() -> StochasticSequence {
        StochasticSequence::default()
    }

    pub fn clear(&mut self) {
        self.scale = Routable::new(-1);
        self.root_note = Routable::new(-1);
        self.divisor = Routable::new(12);
        self.reset_measure = 0;
        self.run_mode = Routable::new(RunMode::Forward);
        self.first_step = Routable::new(0);
        self.last_step = Routable::new(0);
        self.sequence_first_step = Routable::new(0);
        self.sequence_last_step = Routable::new(15);
        self.rest_probability = Routable::new(0);
        self.rest_probability2 = Routable::new(0);
        self.rest_probability4 = Routable::new(0);
        self.rest_probability8 = Routable::new(0);
        self.low_octave_range = Routable::new(0);
        self.high_octave_range = Routable::new(0);
        self.length_modifier = Routable::new(0);
        self.reseed = Routable::new(0);
        self.use_loop = false;
        self.clear_loop = false;
        self.clear_steps();
    }

    /// Reset the pitch table: one chromatic entry per step, all gates off
    /// and all weights zero.
    pub fn clear_steps(&mut self) {
        for (index, step) in self.steps.iter_mut().enumerate() {
            step.clear();
            step.set_gate(false);
            step.set_note_variation_probability(0);
            step.set_note(index as i32);
        }
    }

    // scale / root note

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

    // divisor / reset measure / run mode

    pub fn divisor(&self) -> u32 {
        self.divisor.get() as u32
    }

    pub fn set_divisor(&mut self, divisor: i32, routed: bool) {
        self.divisor.set(divisor.clamp(1, 768) as u16, routed);
    }

    pub fn reset_measure(&self) -> u32 {
        self.reset_measure as u32
    }

    pub fn set_reset_measure(&mut self, reset_measure: i32) {
        self.reset_measure = reset_measure.clamp(0, 128) as u8;
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode.get()
    }

    pub fn set_run_mode(&mut self, run_mode: RunMode, routed: bool) {
        self.run_mode.set(run_mode, routed);
    }

    // highlight window (UI bounds of the currently sounding entry)

    pub fn first_step(&self) -> i32 {
        self.first_step.get() as i32
    }

    pub fn set_first_step(&mut self, first_step: i32, routed: bool) {
        self.first_step
            .set(first_step.clamp(0, self.last_step()) as u8, routed);
    }

    pub fn last_step(&self) -> i32 {
        (self.last_step.get() as i32).max(self.first_step())
    }

    pub fn set_last_step(&mut self, last_step: i32, routed: bool) {
        self.last_step.set(
            last_step.clamp(self.first_step(), STEP_COUNT as i32 - 1) as u8,
            routed,
        );
    }

    /// Pin the highlight window to the step the engine just emitted.
    pub fn set_step_bounds(&mut self, index: i32) {
        let index = index.clamp(0, STEP_COUNT as i32 - 1) as u8;
        self.first_step.set(index, false);
        self.last_step.set(index, false);
    }

    // loop window

    pub fn sequence_first_step(&self) -> i32 {
        self.sequence_first_step.get() as i32
    }

    pub fn set_sequence_first_step(&mut self, first_step: i32, routed: bool) {
        self.sequence_first_step
            .set(first_step.clamp(0, self.sequence_last_step()) as u8, routed);
    }

    pub fn sequence_last_step(&self) -> i32 {
        (self.sequence_last_step.get() as i32).max(self.sequence_first_step())
    }

    pub fn set_sequence_last_step(&mut self, last_step: i32, routed: bool) {
        self.sequence_last_step.set(
            last_step.clamp(self.sequence_first_step(), STEP_COUNT as i32 - 1) as u8,
            routed,
        );
    }

    pub fn sequence_length(&self) -> i32 {
        self.sequence_last_step() - self.sequence_first_step() + 1
    }

    /// Number of outcomes the loop buffers hold before replaying.
    pub fn buffer_loop_length(&self) -> usize {
        (self.sequence_last_step() as usize).max(16)
    }

    // rest probabilities

    pub fn rest_probability(&self) -> i32 {
        self.rest_probability.get() as i32
    }

    pub fn set_rest_probability(&mut self, value: i32, routed: bool) {
        self.rest_probability.set(value.clamp(0, 8) as i8, routed);
    }

    pub fn rest_probability2(&self) -> i32 {
        self.rest_probability2.get() as i32
    }

    pub fn set_rest_probability2(&mut self, value: i32, routed: bool) {
        self.rest_probability2.set(value.clamp(0, 8) as i8, routed);
    }

    pub fn rest_probability4(&self) -> i32 {
        self.rest_probability4.get() as i32
    }

    pub fn set_rest_probability4(&mut self, value: i32, routed: bool) {
        self.rest_probability4.set(value.clamp(0, 8) as i8, routed);
    }

    pub fn rest_probability8(&self) -> i32 {
        self.rest_probability8.get() as i32
    }

    pub fn set_rest_probability8(&mut self, value: i32, routed: bool) {
        self.rest_probability8.set(value.clamp(0, 8) as i8, routed);
    }

    // octave bounds

    pub fn low_octave_range(&self) -> i32 {
        self.low_octave_range.get() as i32
    }

    pub fn set_low_octave_range(&mut self, octave: i32, routed: bool) {
        self.low_octave_range
            .set(octave.clamp(-10, self.high_octave_range()) as i8, routed);
    }

    /// Read-side clamp keeps `low <= high` under routing.
    pub fn high_octave_range(&self) -> i32 {
        (self.high_octave_range.get() as i32).max(self.low_octave_range.get() as i32)
    }

    pub fn set_high_octave_range(&mut self, octave: i32, routed: bool) {
        self.high_octave_range
            .set(octave.clamp(self.low_octave_range(), 10) as i8, routed);
    }

    // length modifier

    pub fn length_modifier(&self) -> i32 {
        self.length_modifier.get() as i32
    }

    pub fn set_length_modifier(&mut self, value: i32, routed: bool) {
        self.length_modifier.set(value.clamp(-16, 16) as i8, routed);
    }

    // reseed / loop flags

    pub fn reseed(&self) -> bool {
        self.reseed.get() != 0
    }

    pub fn set_reseed(&mut self, reseed: bool, routed: bool) {
        self.reseed.set(reseed as u8, routed);
    }

    pub fn use_loop(&self) -> bool {
        self.use_loop
    }

    pub fn set_use_loop(&mut self, use_loop: bool) {
        self.use_loop = use_loop;
    }

    pub fn toggle_use_loop(&mut self) {
        self.use_loop = !self.use_loop;
    }

    pub fn clear_loop(&self) -> bool {
        self.clear_loop
    }

    /// Arm (or disarm) the loop relock; the engine consumes the flag at the
    /// next step boundary, freezing the memory buffer and enabling replay.
    pub fn set_clear_loop(&mut self, clear_loop: bool) {
        self.clear_loop = clear_loop;
    }

    // steps

    pub fn step(&self, index: usize) -> &StochasticStep {
        &self.steps[index]
    }

    pub fn step_mut(&mut self, index: usize) -> &mut StochasticStep {
        &mut self.steps[index]
    }

    pub fn steps(&self) -> &[StochasticStep; STEP_COUNT] {
        &self.steps
    }

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

    pub fn is_edited(&self) -> bool {
        // compare against the table produced by clear_steps
        let mut clear = StochasticSequence::new();
        clear.clear_steps();
        self.steps
            .iter()
            .zip(clear.steps.iter())
            .any(|(step, clear_step)| step != clear_step)
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
            Target::SequenceFirstStep => self.set_sequence_first_step(int_value, true),
            Target::SequenceLastStep => self.set_sequence_last_step(int_value, true),
            Target::RestProbability => self.set_rest_probability(int_value, true),
            Target::RestProbability2 => self.set_rest_probability2(int_value, true),
            Target::RestProbability4 => self.set_rest_probability4(int_value, true),
            Target::RestProbability8 => self.set_rest_probability8(int_value, true),
            Target::LowOctaveRange => self.set_low_octave_range(int_value, true),
            Target::HighOctaveRange => self.set_high_octave_range(int_value, true),
            Target::LengthModifier => self.set_length_modifier(int_value, true),
            Target::Reseed => self.set_reseed(int_value != 0, true),
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
            Target::SequenceFirstStep => self.sequence_first_step.clear_routed(),
            Target::SequenceLastStep => self.sequence_last_step.clear_routed(),
            Target::RestProbability => self.rest_probability.clear_routed(),
            Target::RestProbability2 => self.rest_probability2.clear_routed(),
            Target::RestProbability4 => self.rest_probability4.clear_routed(),
            Target::RestProbability8 => self.rest_probability8.clear_routed(),
            Target::LowOctaveRange => self.low_octave_range.clear_routed(),
            Target::HighOctaveRange => self.high_octave_range.clear_routed(),
            Target::LengthModifier => self.length_modifier.clear_routed(),
            Target::Reseed => self.reseed.clear_routed(),
            _ => {}
        }
    }
}

/// Track-level settings of a stochastic track.
#[derive(Clone, Debug)]
pub struct StochasticTrack {
    play_mode: PlayMode,
    fill_mode: FillMode,
    fill_muted: bool,
    cv_update_mode: CvUpdateMode,
    pattern_follow: PatternFollow,
    slide_time: Routable<u8>,
    octave: Routable<i8>,
    transpose: Routable<i8>,
    gate_probability_bias: Routable<i8>,
    retrigger_probability_bias: Routable<i8>,
    length_bias: Routable<i8>,
    note_probability_bias: Routable<i8>,
    sequences: [StochasticSequence; PATTERN_COUNT + SNAPSHOT_COUNT],
}

impl Default for StochasticTrack {
    fn default() -> Self {
        StochasticTrack {
            play_mode: PlayMode::Aligned,
            fill_mode: FillMode::None,
            fill_muted: false,
            cv_update_mode: CvUpdateMode::Gate,
            pattern_follow: PatternFollow::Off,
            slide_time: Routable::new(50),
            octave: Routable::new(0),
            transpose: Routable::new(0),
            gate_probability_bias: Routable::new(0),
            retrigger_probability_bias: Routable::new(0),
            length_bias: Routable::new(0),
            note_probability_bias: Routable::new(0),
            sequences: core::array::from_fn(|_| StochasticSequence::default()),
        }
    }
}

impl StochasticTrack {
    pub fn new() -> StochasticTrack {
        StochasticTrack::default()
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

    pub fn sequence(&self, pattern: usize) -> &StochasticSequence {
        &self.sequences[pattern.min(PATTERN_COUNT + SNAPSHOT_COUNT - 1)]
    }

    pub fn sequence_mut(&mut self, pattern: usize) -> &mut StochasticSequence {
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
    fn clear_steps_builds_chromatic_pitch_table() {
        let sequence = StochasticSequence::new();
        for index in 0..PITCH_TABLE_SIZE {
            let step = sequence.step(index);
            assert!(!step.gate());
            assert_eq!(index as i32, step.note());
            assert_eq!(0, step.note_variation_probability());
            assert!(step.bypass_scale());
        }
    }

    #[test]
    fn sequence_window_invariant_holds() {
        let mut sequence = StochasticSequence::new();
        sequence.set_sequence_last_step(20, false);
        sequence.set_sequence_first_step(10, false);
        assert_eq!(10, sequence.sequence_first_step());
        // routed write below first step is clamped on read
        sequence.write_routed(Target::SequenceLastStep, 3);
        assert_eq!(10, sequence.sequence_last_step());
        assert_eq!(1, sequence.sequence_length());
    }

    #[test]
    fn buffer_loop_length_has_floor_of_sixteen() {
        let mut sequence = StochasticSequence::new();
        assert_eq!(16, sequence.buffer_loop_length());
        sequence.set_sequence_last_step(40, false);
        assert_eq!(40, sequence.buffer_loop_length());
    }

    #[test]
    fn octave_range_invariant_holds() {
        let mut sequence = StochasticSequence::new();
        sequence.set_high_octave_range(3, false);
        sequence.set_low_octave_range(-2, false);
        assert_eq!(-2, sequence.low_octave_range());
        assert_eq!(3, sequence.high_octave_range());
        // low can not cross above high
        sequence.set_low_octave_range(8, false);
        assert_eq!(3, sequence.low_octave_range());
    }

    #[test]
    fn set_step_bounds_pins_highlight_window() {
        let mut sequence = StochasticSequence::new();
        sequence.set_step_bounds(9);
        assert_eq!(9, sequence.first_step());
        assert_eq!(9, sequence.last_step());
    }

    #[test]
    fn rest_probabilities_clamp() {
        let mut sequence = StochasticSequence::new();
        sequence.set_rest_probability(100, false);
        assert_eq!(8, sequence.rest_probability());
        sequence.set_rest_probability4(-3, false);
        assert_eq!(0, sequence.rest_probability4());
    }

    #[test]
    fn reseed_is_routable() {
        let mut sequence = StochasticSequence::new();
        sequence.write_routed(Target::Reseed, 1);
        assert!(sequence.reseed());
        sequence.clear_routed(Target::Reseed);
        assert!(!sequence.reseed());
    }

    #[test]
    fn note_octave_round_trips_signed_range() {
        let mut step = StochasticStep::new();
        for value in NoteOctave::MIN..=NoteOctave::MAX {
            step.set_note_octave(value);
            assert_eq!(value, step.note_octave());
        }
    }
}
