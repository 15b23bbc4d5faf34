//! Logic track data model.
//!
//! A logic track has no notes of its own: each step combines the gates and
//! notes of two referenced note tracks through per-step gate-logic and
//! note-logic modes. The evaluated input gates are mirrored back into the
//! step word for the editor to display.

use crate::{
    routing::{Routable, Target},
    scale::Scale,
    types::{
        step_field, Condition, CvUpdateMode, FillMode, LayerRange, PatternFollow, PlayMode,
        RunMode, SignedValue, StageRepeatMode, UnsignedValue,
    },
    PATTERN_COUNT, SNAPSHOT_COUNT, STEP_COUNT, TRACK_COUNT,
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

/// How a step combines its two input gates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GateLogicMode {
    #[default]
    One,
    Two,
    And,
    Or,
    Xor,
    Nand,
    RandomInput,
    RandomLogic,
}

impl GateLogicMode {
    pub fn index(self) -> u8 {
        match self {
            GateLogicMode::One => 0,
            GateLogicMode::Two => 1,
            GateLogicMode::And => 2,
            GateLogicMode::Or => 3,
            GateLogicMode::Xor => 4,
            GateLogicMode::Nand => 5,
            GateLogicMode::RandomInput => 6,
            GateLogicMode::RandomLogic => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GateLogicMode::One => "IN 1",
            GateLogicMode::Two => "IN 2",
            GateLogicMode::And => "AND",
            GateLogicMode::Or => "OR",
            GateLogicMode::Xor => "XOR",
            GateLogicMode::Nand => "NAND",
            GateLogicMode::RandomInput => "RND IN",
            GateLogicMode::RandomLogic => "RND LOGIC",
        }
    }
}

impl TryFrom<u8> for GateLogicMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GateLogicMode::One),
            1 => Ok(GateLogicMode::Two),
            2 => Ok(GateLogicMode::And),
            3 => Ok(GateLogicMode::Or),
            4 => Ok(GateLogicMode::Xor),
            5 => Ok(GateLogicMode::Nand),
            6 => Ok(GateLogicMode::RandomInput),
            7 => Ok(GateLogicMode::RandomLogic),
            _ => Err(()),
        }
    }
}

/// How a step derives its note from the two input notes. Op1/Op2 are
/// reserved operators and currently evaluate as Max.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoteLogicMode {
    #[default]
    One,
    Two,
    Min,
    Max,
    Op1,
    Op2,
    RandomInput,
    RandomLogic,
}

impl NoteLogicMode {
    pub fn index(self) -> u8 {
        match self {
            NoteLogicMode::One => 0,
            NoteLogicMode::Two => 1,
            NoteLogicMode::Min => 2,
            NoteLogicMode::Max => 3,
            NoteLogicMode::Op1 => 4,
            NoteLogicMode::Op2 => 5,
            NoteLogicMode::RandomInput => 6,
            NoteLogicMode::RandomLogic => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NoteLogicMode::One => "IN 1",
            NoteLogicMode::Two => "IN 2",
            NoteLogicMode::Min => "MIN",
            NoteLogicMode::Max => "MAX",
            NoteLogicMode::Op1 => "OP 1",
            NoteLogicMode::Op2 => "OP 2",
            NoteLogicMode::RandomInput => "RND IN",
            NoteLogicMode::RandomLogic => "RND LOGIC",
        }
    }
}

impl TryFrom<u8> for NoteLogicMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NoteLogicMode::One),
            1 => Ok(NoteLogicMode::Two),
            2 => Ok(NoteLogicMode::Min),
            3 => Ok(NoteLogicMode::Max),
            4 => Ok(NoteLogicMode::Op1),
            5 => Ok(NoteLogicMode::Op2),
            6 => Ok(NoteLogicMode::RandomInput),
            7 => Ok(NoteLogicMode::RandomLogic),
            _ => Err(()),
        }
    }
}

/// One step of a logic sequence.
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
/// 15..=17   gate logic mode
/// 18..=20   note logic mode
/// 21..=27   note variation range
/// 28..=31   note variation probability
/// 32..=35   gate probability
/// 36..=39   gate offset
/// 40..=42   retrigger
/// 43..=46   retrigger probability
/// 47..=53   condition
/// 54..=56   stage repeats
/// 57..=59   stage repeat mode
/// 60        input gate 1 (mirror)
/// 61        input gate 2 (mirror)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogicStep {
    raw: u64,
}

impl LogicStep {
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
    step_field!(NoteVariationRange, note_variation_range, set_note_variation_range, 21);
    step_field!(
        NoteVariationProbability,
        note_variation_probability,
        set_note_variation_probability,
        28
    );
    step_field!(GateProbability, gate_probability, set_gate_probability, 32);
    step_field!(GateOffset, gate_offset, set_gate_offset, 36);
    step_field!(Retrigger, retrigger, set_retrigger, 40);
    step_field!(RetriggerProbability, retrigger_probability, set_retrigger_probability, 43);
    step_field!(StageRepeats, stage_repeats, set_stage_repeats, 54);
    step_field!(bool, input_gate1, set_input_gate1, 60);
    step_field!(bool, input_gate2, set_input_gate2, 61);

    pub fn new() -> LogicStep {
        let mut step = LogicStep { raw: 0 };
        step.clear();
        step
    }

    pub fn clear(&mut self) {
        self.raw = 0;
        self.set_gate_probability(GateProbability::MAX);
        self.set_retrigger_probability(RetriggerProbability::MAX);
        self.set_length(Length::MAX / 2);
        self.set_length_variation_probability(LengthVariationProbability::MAX);
        self.set_note_variation_probability(NoteVariationProbability::MAX);
        self.set_condition(Condition::Off);
    }

    pub fn toggle_gate(&mut self) {
        self.set_gate(!self.gate());
    }

    pub fn gate_logic(&self) -> GateLogicMode {
        GateLogicMode::try_from(((self.raw >> 15) & 0x7) as u8).unwrap_or_default()
    }

    pub fn set_gate_logic(&mut self, mode: GateLogicMode) {
        self.raw = (self.raw & !(0x7u64 << 15)) | ((mode.index() as u64) << 15);
    }

    pub fn note_logic(&self) -> NoteLogicMode {
        NoteLogicMode::try_from(((self.raw >> 18) & 0x7) as u8).unwrap_or_default()
    }

    pub fn set_note_logic(&mut self, mode: NoteLogicMode) {
        self.raw = (self.raw & !(0x7u64 << 18)) | ((mode.index() as u64) << 18);
    }

    pub fn condition(&self) -> Condition {
        Condition::from_index(self.condition_index() as usize)
    }

    pub fn set_condition(&mut self, condition: Condition) {
        self.set_condition_index(condition.index() as i32);
    }

    fn condition_index(&self) -> i32 {
        ((self.raw >> 47) & 0x7f) as i32
    }

    fn set_condition_index(&mut self, index: i32) {
        let index = index.clamp(0, Condition::COUNT as i32 - 1) as u64;
        self.raw = (self.raw & !(0x7fu64 << 47)) | (index << 47);
    }

    pub fn stage_repeat_mode(&self) -> StageRepeatMode {
        StageRepeatMode::try_from(((self.raw >> 57) & 0x7) as u8).unwrap_or_default()
    }

    pub fn set_stage_repeat_mode(&mut self, mode: StageRepeatMode) {
        self.raw = (self.raw & !(0x7u64 << 57)) | ((mode.index() as u64) << 57);
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn set_raw(&mut self, raw: u64) {
        self.raw = raw;
    }

    pub fn layer_value(&self, layer: LogicLayer) -> i32 {
        match layer {
            LogicLayer::Gate => self.gate() as i32,
            LogicLayer::GateLogic => self.gate_logic().index() as i32,
            LogicLayer::GateProbability => self.gate_probability(),
            LogicLayer::GateOffset => self.gate_offset(),
            LogicLayer::Retrigger => self.retrigger(),
            LogicLayer::RetriggerProbability => self.retrigger_probability(),
            LogicLayer::StageRepeats => self.stage_repeats(),
            LogicLayer::StageRepeatsMode => self.stage_repeat_mode().index() as i32,
            LogicLayer::Length => self.length(),
            LogicLayer::LengthVariationRange => self.length_variation_range(),
            LogicLayer::LengthVariationProbability => self.length_variation_probability(),
            LogicLayer::NoteLogic => self.note_logic().index() as i32,
            LogicLayer::NoteVariationRange => self.note_variation_range(),
            LogicLayer::NoteVariationProbability => self.note_variation_probability(),
            LogicLayer::Slide => self.slide() as i32,
            LogicLayer::Condition => self.condition_index(),
        }
    }

    pub fn set_layer_value(&mut self, layer: LogicLayer, value: i32) {
        match layer {
            LogicLayer::Gate => self.set_gate(value != 0),
            LogicLayer::GateLogic => {
                self.set_gate_logic(
                    GateLogicMode::try_from(value.clamp(0, 7) as u8).unwrap_or_default(),
                );
            }
            LogicLayer::GateProbability => self.set_gate_probability(value),
            LogicLayer::GateOffset => self.set_gate_offset(value),
            LogicLayer::Retrigger => self.set_retrigger(value),
            LogicLayer::RetriggerProbability => self.set_retrigger_probability(value),
            LogicLayer::StageRepeats => self.set_stage_repeats(value),
            LogicLayer::StageRepeatsMode => {
                self.set_stage_repeat_mode(
                    StageRepeatMode::try_from(value.clamp(0, 7) as u8).unwrap_or_default(),
                );
            }
            LogicLayer::Length => self.set_length(value),
            LogicLayer::LengthVariationRange => self.set_length_variation_range(value),
            LogicLayer::LengthVariationProbability => {
                self.set_length_variation_probability(value)
            }
            LogicLayer::NoteLogic => {
                self.set_note_logic(
                    NoteLogicMode::try_from(value.clamp(0, 7) as u8).unwrap_or_default(),
                );
            }
            LogicLayer::NoteVariationRange => self.set_note_variation_range(value),
            LogicLayer::NoteVariationProbability => self.set_note_variation_probability(value),
            LogicLayer::Slide => self.set_slide(value != 0),
            LogicLayer::Condition => self.set_condition_index(value),
        }
    }
}

impl Default for LogicStep {
    fn default() -> Self {
        LogicStep::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicLayer {
    Gate,
    GateLogic,
    GateProbability,
    GateOffset,
    Retrigger,
    RetriggerProbability,
    StageRepeats,
    StageRepeatsMode,
    Length,
    LengthVariationRange,
    LengthVariationProbability,
    NoteLogic,
    NoteVariationRange,
    NoteVariationProbability,
    Slide,
    Condition,
}

impl LogicLayer {
    pub fn name(self) -> &'static str {
        match self {
            LogicLayer::Gate => "GATE",
            LogicLayer::GateLogic => "GATE LOGIC",
            LogicLayer::GateProbability => "GATE PROB",
            LogicLayer::GateOffset => "GATE OFFSET",
            LogicLayer::Retrigger => "RETRIG",
            LogicLayer::RetriggerProbability => "RETRIG PROB",
            LogicLayer::StageRepeats => "REPEAT",
            LogicLayer::StageRepeatsMode => "REPEAT MODE",
            LogicLayer::Length => "LENGTH",
            LogicLayer::LengthVariationRange => "LENGTH RANGE",
            LogicLayer::LengthVariationProbability => "LENGTH PROB",
            LogicLayer::NoteLogic => "NOTE LOGIC",
            LogicLayer::NoteVariationRange => "NOTE RANGE",
            LogicLayer::NoteVariationProbability => "NOTE PROB",
            LogicLayer::Slide => "SLIDE",
            LogicLayer::Condition => "CONDITION",
        }
    }

    pub fn range(self) -> LayerRange {
        match self {
            LogicLayer::Gate | LogicLayer::Slide => LayerRange { min: 0, max: 1 },
            LogicLayer::GateLogic | LogicLayer::NoteLogic => LayerRange { min: 0, max: 7 },
            LogicLayer::GateProbability => LayerRange {
                min: GateProbability::MIN,
                max: GateProbability::MAX,
            },
            LogicLayer::GateOffset => LayerRange {
                min: GateOffset::MIN,
                max: GateOffset::MAX,
            },
            LogicLayer::Retrigger => LayerRange {
                min: Retrigger::MIN,
                max: Retrigger::MAX,
            },
            LogicLayer::RetriggerProbability => LayerRange {
                min: RetriggerProbability::MIN,
                max: RetriggerProbability::MAX,
            },
            LogicLayer::StageRepeats => LayerRange {
                min: StageRepeats::MIN,
                max: StageRepeats::MAX,
            },
            LogicLayer::StageRepeatsMode => LayerRange {
                min: 0,
                max: StageRepeatMode::COUNT as i32 - 1,
            },
            LogicLayer::Length => LayerRange {
                min: Length::MIN,
                max: Length::MAX,
            },
            LogicLayer::LengthVariationRange => LayerRange {
                min: LengthVariationRange::MIN,
                max: LengthVariationRange::MAX,
            },
            LogicLayer::LengthVariationProbability => LayerRange {
                min: LengthVariationProbability::MIN,
                max: LengthVariationProbability::MAX,
            },
            LogicLayer::NoteVariationRange => LayerRange {
                min: NoteVariationRange::MIN,
                max: NoteVariationRange::MAX,
            },
            LogicLayer::NoteVariationProbability => LayerRange {
                min: NoteVariationProbability::MIN,
                max: NoteVariationProbability::MAX,
            },
            LogicLayer::Condition => LayerRange {
                min: 0,
                max: Condition::COUNT as i32 - 1,
            },
        }
    }

    pub fn default_value(self) -> i32 {
        LogicStep::new().layer_value(self)
    }
}

/// A 64-step logic sequence.
#[derive(Clone, Debug)]
pub struct LogicSequence {
    scale: Routable<i8>,
    root_note: Routable<i8>,
    divisor: Routable<u16>,
    reset_measure: u8,
    run_mode: Routable<RunMode>,
    first_step: Routable<u8>,
    last_step: Routable<u8>,
    steps: [LogicStep; STEP_COUNT],
}

impl Default for LogicSequence {
    fn default() -> Self {
        let mut sequence = LogicSequence {
            scale: Routable::new(-1),
            root_note: Routable::new(-1),
            divisor: Routable::new(12),
            reset_measure: 0,
            run_mode: Routable::new(RunMode::Forward),
            first_step: Routable::new(0),
            last_step: Routable::new(15),
            steps: [LogicStep::new(); STEP_COUNT],
        };
        sequence.clear();
        sequence
    }
}

impl LogicSequence {
    pub fn new() -> LogicSequence {
        LogicSequence::default()
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

    pub fn step(&self, index: usize) -> &LogicStep {
        &self.steps[index]
    }

    pub fn step_mut(&mut self, index: usize) -> &mut LogicStep {
        &mut self.steps[index]
    }

    pub fn steps(&self) -> &[LogicStep; STEP_COUNT] {
        &self.steps
    }

    pub fn set_gates(&mut self, gates: &[bool]) {
        for (step, &gate) in self.steps.iter_mut().zip(gates) {
            step.set_gate(gate);
        }
    }

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
        let clear_step = LogicStep::new();
        self.steps.iter().any(|step| *step != clear_step)
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

/// Track-level settings of a logic track, including the two input track
/// references.
#[derive(Clone, Debug)]
pub struct LogicTrack {
    play_mode: PlayMode,
    fill_mode: FillMode,
    fill_muted: bool,
    cv_update_mode: CvUpdateMode,
    pattern_follow: PatternFollow,
    input_track1: i8,
    input_track2: i8,
    slide_time: Routable<u8>,
    octave: Routable<i8>,
    transpose: Routable<i8>,
    rotate: i8,
    gate_probability_bias: Routable<i8>,
    retrigger_probability_bias: Routable<i8>,
    length_bias: Routable<i8>,
    note_probability_bias: Routable<i8>,
    sequences: [LogicSequence; PATTERN_COUNT + SNAPSHOT_COUNT],
}

impl Default for LogicTrack {
    fn default() -> Self {
        LogicTrack {
            play_mode: PlayMode::Aligned,
            fill_mode: FillMode::None,
            fill_muted: false,
            cv_update_mode: CvUpdateMode::Gate,
            pattern_follow: PatternFollow::Off,
            input_track1: -1,
            input_track2: -1,
            slide_time: Routable::new(50),
            octave: Routable::new(0),
            transpose: Routable::new(0),
            rotate: 0,
            gate_probability_bias: Routable::new(0),
            retrigger_probability_bias: Routable::new(0),
            length_bias: Routable::new(0),
            note_probability_bias: Routable::new(0),
            sequences: core::array::from_fn(|_| LogicSequence::default()),
        }
    }
}

impl LogicTrack {
    pub fn new() -> LogicTrack {
        LogicTrack::default()
    }

    pub fn input_track1(&self) -> Option<usize> {
        (self.input_track1 >= 0).then_some(self.input_track1 as usize)
    }

    pub fn set_input_track1(&mut self, track: Option<usize>) {
        self.input_track1 = match track {
            Some(index) if index < TRACK_COUNT => index as i8,
            _ => -1,
        };
    }

    pub fn input_track2(&self) -> Option<usize> {
        (self.input_track2 >= 0).then_some(self.input_track2 as usize)
    }

    pub fn set_input_track2(&mut self, track: Option<usize>) {
        self.input_track2 = match track {
            Some(index) if index < TRACK_COUNT => index as i8,
            _ => -1,
        };
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

    pub fn sequence(&self, pattern: usize) -> &LogicSequence {
        &self.sequences[pattern.min(PATTERN_COUNT + SNAPSHOT_COUNT - 1)]
    }

    pub fn sequence_mut(&mut self, pattern: usize) -> &mut LogicSequence {
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
    fn logic_modes_round_trip_through_step() {
        let mut step = LogicStep::new();
        for index in 0..8 {
            let gate_logic = GateLogicMode::try_from(index).unwrap();
            let note_logic = NoteLogicMode::try_from(index).unwrap();
            step.set_gate_logic(gate_logic);
            step.set_note_logic(note_logic);
            assert_eq!(gate_logic, step.gate_logic());
            assert_eq!(note_logic, step.note_logic());
        }
    }

    #[test]
    fn input_gate_mirrors_are_independent() {
        let mut step = LogicStep::new();
        step.set_input_gate1(true);
        assert!(step.input_gate1());
        assert!(!step.input_gate2());
        step.set_input_gate2(true);
        step.set_input_gate1(false);
        assert!(step.input_gate2());
        assert!(!step.input_gate1());
    }

    #[test]
    fn clear_defaults_use_input_one() {
        let step = LogicStep::new();
        assert_eq!(GateLogicMode::One, step.gate_logic());
        assert_eq!(NoteLogicMode::One, step.note_logic());
        assert!(!step.gate());
        assert_eq!(GateProbability::MAX, step.gate_probability());
    }

    #[test]
    fn input_track_references_validate_index() {
        let mut track = LogicTrack::new();
        assert_eq!(None, track.input_track1());
        track.set_input_track1(Some(3));
        assert_eq!(Some(3), track.input_track1());
        track.set_input_track2(Some(99));
        assert_eq!(None, track.input_track2());
    }

    #[test]
    fn note_variation_range_round_trips() {
        let mut step = LogicStep::new();
        for value in [-64, -1, 0, 1, 63] {
            step.set_note_variation_range(value);
            assert_eq!(value, step.note_variation_range());
        }
    }
}
