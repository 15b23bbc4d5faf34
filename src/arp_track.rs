//! Arp track data model.
//!
//! Like the stochastic track, the first twelve steps form a pitch table:
//! held notes reference the step that spawned them, and the arpeggiator
//! walks the held-note set. The one-step rest probability is derived so the
//! four rest weights always sum to at most 8.

use crate::{
    arpeggiator::Arpeggiator,
    routing::{Routable, Target},
    scale::Scale,
    types::{
        step_field, Condition, CvUpdateMode, FillMode, LayerRange, PatternFollow, PlayMode,
        RunMode, SignedValue, UnsignedValue,
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
pub type NoteVariationRange = SignedValue<7>;
pub type NoteVariationProbability = UnsignedValue<4>;
pub type NoteOctaveProbability = UnsignedValue<4>;

pub const PITCH_TABLE_SIZE: usize = 12;

/// One entry of an arp sequence.
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
/// 25..=28   note variation probability
/// 29..=32   note octave probability
/// 33..=36   gate probability
/// 37..=40   gate offset
/// 41..=43   retrigger
/// 44..=47   retrigger probability
/// 48..=54   condition
/// 55..=61   note variation range
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpStep {
    raw: u64,
}

impl ArpStep {
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
    step_field!(NoteVariationRange, note_variation_range, set_note_variation_range, 55);

    pub fn new() -> ArpStep {
        let mut step = ArpStep { raw: 0 };
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
        self.set_note_octave(0);
        self.set_note_octave_probability(NoteOctaveProbability::MAX);
        self.set_note_variation_range(0);
        self.set_note_variation_probability(0);
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

    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn set_raw(&mut self, raw: u64) {
        self.raw = raw;
    }

    pub fn layer_value(&self, layer: ArpLayer) -> i32 {
        match layer {
            ArpLayer::Gate => self.gate() as i32,
            ArpLayer::GateProbability => self.gate_probability(),
            ArpLayer::GateOffset => self.gate_offset(),
            ArpLayer::Retrigger => self.retrigger(),
            ArpLayer::RetriggerProbability => self.retrigger_probability(),
            ArpLayer::Length => self.length(),
            ArpLayer::LengthVariationRange => self.length_variation_range(),
            ArpLayer::LengthVariationProbability => self.length_variation_probability(),
            ArpLayer::Note => self.note(),
            ArpLayer::NoteOctave => self.note_octave(),
            ArpLayer::NoteVariationRange => self.note_variation_range(),
            ArpLayer::NoteVariationProbability => self.note_variation_probability(),
            ArpLayer::NoteOctaveProbability => self.note_octave_probability(),
            ArpLayer::Slide => self.slide() as i32,
            ArpLayer::Condition => self.condition_index(),
        }
    }

    pub fn set_layer_value(&mut self, layer: ArpLayer, value: i32) {
        match layer {
            ArpLayer::Gate => self.set_gate(value != 0),
            ArpLayer::GateProbability => self.set_gate_probability(value),
            ArpLayer::GateOffset => self.set_gate_offset(value),
            ArpLayer::Retrigger => self.set_retrigger(value),
            ArpLayer::RetriggerProbability => self.set_retrigger_probability(value),
            ArpLayer::Length => self.set_length(value),
            ArpLayer::LengthVariationRange => self.set_length_variation_range(value),
            ArpLayer::LengthVariationProbability => {
                self.set_length_variation_probability(value)
            }
            ArpLayer::Note => self.set_note(value),
            ArpLayer::NoteOctave => self.set_note_octave(value),
            ArpLayer::NoteVariationRange => self.set_note_variation_range(value),
            ArpLayer::NoteVariationProbability => self.set_note_variation_probability(value),
            ArpLayer::NoteOctaveProbability => self.set_note_octave_probability(value),
            ArpLayer::Slide => self.set_slide(value != 0),
            ArpLayer::Condition => self.set_condition_index(value),
        }
    }
}

impl Default for ArpStep {
    fn default() -> Self {
        ArpStep::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpLayer {
    Gate,
    GateProbability,
    GateOffset,
    Retrigger,
    RetriggerProbability,
    Length,
    LengthVariationRange,
    LengthVariationProbability,
    Note,
    NoteOctave,
    NoteVariationRange,
    NoteVariationProbability,
    NoteOctaveProbability,
    Slide,
    Condition,
}

impl ArpLayer {
    pub fn name(self) -> &'static str {
        match self {
            ArpLayer::Gate => "GATE",
            ArpLayer::GateProbability => "GATE PROB",
            ArpLayer::GateOffset => "GATE OFFSET",
            ArpLayer::Retrigger => "RETRIG",
            ArpLayer::RetriggerProbability => "RETRIG PROB",
            ArpLayer::Length => "LENGTH",
            ArpLayer::LengthVariationRange => "LENGTH RANGE",
            ArpLayer::LengthVariationProbability => "LENGTH PROB",
            ArpLayer::Note => "NOTE",
            ArpLayer::NoteOctave => "OCTAVE",
            ArpLayer::NoteVariationRange => "NOTE RANGE",
            ArpLayer::NoteVariationProbability => "NOTE PROB",
            ArpLayer::NoteOctaveProbability => "OCTAVE PROB",
            ArpLayer::Slide => "SLIDE",
            ArpLayer::Condition => "CONDITION",
        }
    }

    pub fn range(self) -> LayerRange {
        match self {
            ArpLayer::Gate | ArpLayer::Slide => LayerRange { min: 0, max: 1 },
            ArpLayer::GateProbability => LayerRange {
                min: GateProbability::MIN,
                max: GateProbability::MAX,
            },
            ArpLayer::GateOffset => LayerRange {
                min: GateOffset::MIN,
                max: GateOffset::MAX,
            },
            ArpLayer::Retrigger => LayerRange {
                min: Retrigger::MIN,
                max: Retrigger::MAX,
            },
            ArpLayer::RetriggerProbability => LayerRange {
                min: RetriggerProbability::MIN,
                max: RetriggerProbability::MAX,
            },
            ArpLayer::Length => LayerRange {
                min: Length::MIN,
                max: Length::MAX,
            },
            ArpLayer::LengthVariationRange => LayerRange {
                min: LengthVariationRange::MIN,
                max: LengthVariationRange::MAX,
            },
            ArpLayer::LengthVariationProbability => LayerRange {
                min: LengthVariationProbability::MIN,
                max: LengthVariationProbability::MAX,
            },
            ArpLayer::Note => LayerRange {
                min: Note::MIN,
                max: Note::MAX,
            },
            ArpLayer::NoteOctave => LayerRange {
                min: NoteOctave::MIN,
                max: NoteOctave::MAX,
            },
            ArpLayer::NoteVariationRange => LayerRange {
                min: NoteVariationRange::MIN,
                max: NoteVariationRange::MAX,
            },
            ArpLayer::NoteVariationProbability => LayerRange {
                min: NoteVariationProbability::MIN,
                max: NoteVariationProbability::MAX,
            },
            ArpLayer::NoteOctaveProbability => LayerRange {
                min: NoteOctaveProbability::MIN,
                max: NoteOctaveProbability::MAX,
            },
            ArpLayer::Condition => LayerRange {
                min: 0,
                max: Condition::COUNT as i32 - 1,
            },
        }
    }

    pub fn default_value(self) -> i32 {
        ArpStep::new().layer_value(self)
    }
}

/// An arp sequence: the pitch table plus rest weights, octave bounds and
/// the length modifier.
#[derive(Clone, Debug)]
pub struct ArpSequence {
    scale: Routable<i8>,
    root_note: Routable<i8>,
    divisor: Routable<u16>,
    reset_measure: u8,
    run_mode: Routable<RunMode>,
    first_step: u8,
    last_step: u8,
    rest_probability2: Routable<i8>,
    rest_probability4: Routable<i8>,
    rest_probability8: Routable<i8>,
    low_octave_range: Routable<i8>,
    high_octave_range: Routable<i8>,
    length_modifier: Routable<i8>,
    steps: [ArpStep; STEP_COUNT],
}

impl Default for ArpSequence {
    fn default() -> Self {
        let mut sequence = ArpSequence {
            scale: Routable::new(-1),
            root_note: Routable::new(-1),
            divisor: Routable::new(12),
            reset_measure: 0,
            run_mode: Routable::new(RunMode::Forward),
            first_step: 0,
            last_step: 0,
            rest_probability2: Routable::new(0),
            rest_probability4: Routable::new(0),
            rest_probability8: Routable::new(0),
            low_octave_range: Routable::new(0),
            high_octave_range: Routable::new(0),
            length_modifier: Routable::new(0),
            steps: [ArpStep::new(); STEP_COUNT],
        };
        sequence.clear();
        sequence
    }
}

impl ArpSequence {
    pub fn new() -> ArpSequence {
        ArpSequence::default()
    }

    pub fn clear(&mut self) {
        self.scale = Routable::new(-1);
        self.root_note = Routable::new(-1);
        self.divisor = Routable::new(12);
        self.reset_measure = 0;
        self.run_mode = Routable::new(RunMode::Forward);
        self.first_step = 0;
        self.last_step = 0;
        self.rest_probability2 = Routable::new(0);
        self.rest_probability4 = Routable::new(0);
        self.rest_probability8 = Routable::new(0);
        self.low_octave_range = Routable::new(0);
        self.high_octave_range = Routable::new(0);
        self.length_modifier = Routable::new(0);
        self.clear_steps();
    }

    /// Reset the pitch table: one chromatic entry per table slot.
    pub fn clear_steps(&mut self) {
        for step in self.steps.iter_mut() {
            step.clear();
        }
        for (index, step) in self.steps.iter_mut().take(PITCH_TABLE_SIZE).enumerate() {
            step.set_note(index as i32);
        }
    }

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

    pub fn first_step(&self) -> i32 {
        self.first_step as i32
    }

    pub fn set_first_step(&mut self, first_step: i32) {
        self.first_step = first_step.clamp(0, self.last_step()) as u8;
    }

    pub fn last_step(&self) -> i32 {
        (self.last_step as i32).max(self.first_step as i32)
    }

    pub fn set_last_step(&mut self, last_step: i32) {
        self.last_step = last_step.clamp(self.first_step(), STEP_COUNT as i32 - 1) as u8;
    }

    /// Pin the highlight window to the sounding step.
    pub fn set_step_bounds(&mut self, index: i32) {
        let index = index.clamp(0, STEP_COUNT as i32 - 1) as u8;
        self.first_step = index;
        self.last_step = index;
    }

    /// One-step rest weight, derived so the four weights sum to at most 8.
    pub fn rest_probability(&self) -> i32 {
        (8 - self.rest_probability2() - self.rest_probability4() - self.rest_probability8())
            .max(0)
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

    pub fn low_octave_range(&self) -> i32 {
        self.low_octave_range.get() as i32
    }

    pub fn set_low_octave_range(&mut self, octave: i32, routed: bool) {
        self.low_octave_range
            .set(octave.clamp(-10, self.high_octave_range()) as i8, routed);
    }

    pub fn high_octave_range(&self) -> i32 {
        (self.high_octave_range.get() as i32).max(self.low_octave_range.get() as i32)
    }

    pub fn set_high_octave_range(&mut self, octave: i32, routed: bool) {
        self.high_octave_range
            .set(octave.clamp(self.low_octave_range(), 10) as i8, routed);
    }

    pub fn length_modifier(&self) -> i32 {
        self.length_modifier.get() as i32
    }

    pub fn set_length_modifier(&mut self, value: i32, routed: bool) {
        self.length_modifier.set(value.clamp(-16, 16) as i8, routed);
    }

    pub fn step(&self, index: usize) -> &ArpStep {
        &self.steps[index]
    }

    pub fn step_mut(&mut self, index: usize) -> &mut ArpStep {
        &mut self.steps[index]
    }

    pub fn steps(&self) -> &[ArpStep; STEP_COUNT] {
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
        let mut clear_step = ArpStep::new();
        self.steps
            .iter()
            .take(PITCH_TABLE_SIZE)
            .enumerate()
            .any(|(index, step)| {
                clear_step.set_note(index as i32);
                *step != clear_step
            })
    }

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
            Target::RestProbability2 => self.set_rest_probability2(int_value, true),
            Target::RestProbability4 => self.set_rest_probability4(int_value, true),
            Target::RestProbability8 => self.set_rest_probability8(int_value, true),
            Target::LowOctaveRange => self.set_low_octave_range(int_value, true),
            Target::HighOctaveRange => self.set_high_octave_range(int_value, true),
            Target::LengthModifier => self.set_length_modifier(int_value, true),
            _ => {}
        }
    }

    pub fn clear_routed(&mut self, target: Target) {
        match target {
            Target::Scale => self.scale.clear_routed(),
            Target::RootNote => self.root_note.clear_routed(),
            Target::Divisor => self.divisor.clear_routed(),
            Target::RunMode => self.run_mode.clear_routed(),
            Target::RestProbability2 => self.rest_probability2.clear_routed(),
            Target::RestProbability4 => self.rest_probability4.clear_routed(),
            Target::RestProbability8 => self.rest_probability8.clear_routed(),
            Target::LowOctaveRange => self.low_octave_range.clear_routed(),
            Target::HighOctaveRange => self.high_octave_range.clear_routed(),
            Target::LengthModifier => self.length_modifier.clear_routed(),
            _ => {}
        }
    }
}

/// Track-level settings of an arp track.
#[derive(Clone, Debug)]
pub struct ArpTrack {
    play_mode: PlayMode,
    fill_mode: FillMode,
    fill_muted: bool,
    cv_update_mode: CvUpdateMode,
    pattern_follow: PatternFollow,
    midi_keyboard: bool,
    slide_time: Routable<u8>,
    octave: Routable<i8>,
    transpose: Routable<i8>,
    rotate: i8,
    gate_probability_bias: Routable<i8>,
    retrigger_probability_bias: Routable<i8>,
    length_bias: Routable<i8>,
    note_probability_bias: Routable<i8>,
    sequences: [ArpSequence; PATTERN_COUNT + SNAPSHOT_COUNT],
    arpeggiator: Arpeggiator,
}

impl Default for ArpTrack {
    fn default() -> Self {
        ArpTrack {
            play_mode: PlayMode::Aligned,
            fill_mode: FillMode::None,
            fill_muted: false,
            cv_update_mode: CvUpdateMode::Gate,
            pattern_follow: PatternFollow::Off,
            midi_keyboard: false,
            slide_time: Routable::new(50),
            octave: Routable::new(0),
            transpose: Routable::new(0),
            rotate: 0,
            gate_probability_bias: Routable::new(0),
            retrigger_probability_bias: Routable::new(0),
            length_bias: Routable::new(0),
            note_probability_bias: Routable::new(0),
            sequences: core::array::from_fn(|_| ArpSequence::default()),
            arpeggiator: Arpeggiator::default(),
        }
    }
}

impl ArpTrack {
    pub fn new() -> ArpTrack {
        ArpTrack::default()
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

    /// When set, held notes come from the MIDI keyboard instead of the
    /// pitch-table gates.
    pub fn midi_keyboard(&self) -> bool {
        self.midi_keyboard
    }

    pub fn set_midi_keyboard(&mut self, midi_keyboard: bool) {
        self.midi_keyboard = midi_keyboard;
    }

    pub fn toggle_midi_keyboard(&mut self) {
        self.midi_keyboard = !self.midi_keyboard;
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

    pub fn sequence(&self, pattern: usize) -> &ArpSequence {
        &self.sequences[pattern.min(PATTERN_COUNT + SNAPSHOT_COUNT - 1)]
    }

    pub fn sequence_mut(&mut self, pattern: usize) -> &mut ArpSequence {
        &mut self.sequences[pattern.min(PATTERN_COUNT + SNAPSHOT_COUNT - 1)]
    }

    pub fn arpeggiator(&self) -> &Arpeggiator {
        &self.arpeggiator
    }

    pub fn arpeggiator_mut(&mut self) -> &mut Arpeggiator {
        &mut self.arpeggiator
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
    fn clear_steps_seeds_chromatic_pitch_table() {
        let sequence = ArpSequence::new();
        for index in 0..PITCH_TABLE_SIZE {
            assert_eq!(index as i32, sequence.step(index).note());
            assert!(!sequence.step(index).gate());
        }
        assert_eq!(0, sequence.step(20).note());
    }

    #[test]
    fn rest_probability_is_derived_from_remaining_weight() {
        let mut sequence = ArpSequence::new();
        assert_eq!(8, sequence.rest_probability());
        sequence.set_rest_probability2(3, false);
        sequence.set_rest_probability4(2, false);
        assert_eq!(3, sequence.rest_probability());
        sequence.set_rest_probability8(8, false);
        assert_eq!(0, sequence.rest_probability());
    }

    #[test]
    fn note_variation_range_high_bits_round_trip() {
        let mut step = ArpStep::new();
        step.set_note_variation_range(-64);
        step.set_condition(Condition::NotFirst);
        assert_eq!(-64, step.note_variation_range());
        assert_eq!(Condition::NotFirst, step.condition());
        step.set_note_variation_range(63);
        assert_eq!(63, step.note_variation_range());
    }

    #[test]
    fn is_edited_accounts_for_seeded_notes() {
        let mut sequence = ArpSequence::new();
        assert!(!sequence.is_edited());
        sequence.step_mut(3).set_gate(true);
        assert!(sequence.is_edited());
    }

    #[test]
    fn arp_step_defaults() {
        let step = ArpStep::new();
        assert!(!step.bypass_scale());
        assert_eq!(NoteOctaveProbability::MAX, step.note_octave_probability());
        assert_eq!(0, step.note_variation_probability());
    }
}
