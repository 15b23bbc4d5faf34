//! Shared playback types: bit-packed field carriers, step conditions,
//! run/play modes and the time signature.

use crate::{rng::TrackRng, PPQN};

/// Carrier for an unsigned bit-packed step field. Exposes the inclusive
/// range and the write-side clamp used by every step accessor.
pub struct UnsignedValue<const BITS: u32>;

impl<const BITS: u32> UnsignedValue<BITS> {
    pub const BITS: u32 = BITS;
    pub const MIN: i32 = 0;
    pub const MAX: i32 = (1 << BITS) - 1;
    pub const RANGE: i32 = 1 << BITS;

    pub fn clamp(value: i32) -> i32 {
        value.clamp(Self::MIN, Self::MAX)
    }
}

/// Carrier for a signed bit-packed step field, stored offset by `MIN`.
pub struct SignedValue<const BITS: u32>;

impl<const BITS: u32> SignedValue<BITS> {
    pub const BITS: u32 = BITS;
    pub const MIN: i32 = -(1 << (BITS - 1));
    pub const MAX: i32 = (1 << (BITS - 1)) - 1;
    pub const RANGE: i32 = 1 << BITS;

    pub fn clamp(value: i32) -> i32 {
        value.clamp(Self::MIN, Self::MAX)
    }
}

/// Generates the shift+mask accessors for one field of a bit-packed step
/// word. Numeric fields go through the carrier type's clamp on write and are
/// de-offset on read, so signed fields round-trip their full range.
macro_rules! step_field {
    (bool, $get:ident, $set:ident, $bit:expr) => {
        pub fn $get(&self) -> bool {
            (self.raw >> $bit) & 1 != 0
        }

        pub fn $set(&mut self, value: bool) {
            self.raw = (self.raw & !(1u64 << $bit)) | ((value as u64) << $bit);
        }
    };
    ($carrier:ty, $get:ident, $set:ident, $offset:expr) => {
        pub fn $get(&self) -> i32 {
            let mask = (<$carrier>::RANGE as u64) - 1;
            <$carrier>::MIN + ((self.raw >> $offset) & mask) as i32
        }

        pub fn $set(&mut self, value: i32) {
            let mask = ((<$carrier>::RANGE as u64) - 1) << $offset;
            let stored = (<$carrier>::clamp(value) - <$carrier>::MIN) as u64;
            self.raw = (self.raw & !mask) | (stored << $offset);
        }
    };
}

pub(crate) use step_field;

/// Inclusive value range of a sequence layer, for editors and routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerRange {
    pub min: i32,
    pub max: i32,
}

// ---------------------------------------------------------------------------
// run / play modes
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Forward,
    Backward,
    PingPong,
    PongPing,
    Random,
    RandomWalk,
}

impl RunMode {
    pub const COUNT: usize = 6;

    pub fn name(self) -> &'static str {
        match self {
            RunMode::Forward => "Forward",
            RunMode::Backward => "Backward",
            RunMode::PingPong => "PingPong",
            RunMode::PongPing => "PongPing",
            RunMode::Random => "Random",
            RunMode::RandomWalk => "Random Walk",
        }
    }
}

impl TryFrom<u8> for RunMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RunMode::Forward),
            1 => Ok(RunMode::Backward),
            2 => Ok(RunMode::PingPong),
            3 => Ok(RunMode::PongPing),
            4 => Ok(RunMode::Random),
            5 => Ok(RunMode::RandomWalk),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayMode {
    /// Step index is derived from the absolute tick; restarting the clock
    /// reproduces the same step for the same tick.
    #[default]
    Aligned,
    /// Step index advances from a free-running relative tick.
    Free,
}

impl PlayMode {
    pub fn name(self) -> &'static str {
        match self {
            PlayMode::Aligned => "Aligned",
            PlayMode::Free => "Free",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FillMode {
    #[default]
    None,
    Gates,
    NextPattern,
    Condition,
}

impl FillMode {
    pub fn name(self) -> &'static str {
        match self {
            FillMode::None => "None",
            FillMode::Gates => "Gates",
            FillMode::NextPattern => "Next Pattern",
            FillMode::Condition => "Condition",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CvUpdateMode {
    #[default]
    Gate,
    Always,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PatternFollow {
    #[default]
    Off,
    Display,
    Launchpad,
    DisplayAndLaunchpad,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordMode {
    #[default]
    Overdub,
    Overwrite,
    StepRecord,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MonitorMode {
    #[default]
    Always,
    Stopped,
    Off,
}

// ---------------------------------------------------------------------------
// step condition
// ---------------------------------------------------------------------------

/// Loop condition parameters: fires on iterations where
/// `iteration % base == offset`, optionally inverted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConditionLoop {
    pub base: u8,
    pub offset: u8,
    pub invert: bool,
}

/// Per-step trigger condition, stored as a dense 7-bit index: the seven
/// fixed conditions followed by the loop conditions for bases 2..=8 and
/// their inverted forms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Condition {
    #[default]
    Off,
    Fill,
    NotFill,
    Pre,
    NotPre,
    First,
    NotFirst,
    Loop(ConditionLoop),
}

const CONDITION_LOOP_FIRST: usize = 7;
const CONDITION_LOOP_COUNT: usize = 35; // bases 2..=8

impl Condition {
    pub const COUNT: usize = CONDITION_LOOP_FIRST + 2 * CONDITION_LOOP_COUNT;

    pub fn from_index(index: usize) -> Condition {
        match index {
            0 => Condition::Off,
            1 => Condition::Fill,
            2 => Condition::NotFill,
            3 => Condition::Pre,
            4 => Condition::NotPre,
            5 => Condition::First,
            6 => Condition::NotFirst,
            _ => {
                let mut i = (index - CONDITION_LOOP_FIRST).min(2 * CONDITION_LOOP_COUNT - 1);
                let invert = i >= CONDITION_LOOP_COUNT;
                if invert {
                    i -= CONDITION_LOOP_COUNT;
                }
                let mut base = 2u8;
                while i >= base as usize {
                    i -= base as usize;
                    base += 1;
                }
                Condition::Loop(ConditionLoop {
                    base,
                    offset: i as u8,
                    invert,
                })
            }
        }
    }

    pub fn index(self) -> usize {
        match self {
            Condition::Off => 0,
            Condition::Fill => 1,
            Condition::NotFill => 2,
            Condition::Pre => 3,
            Condition::NotPre => 4,
            Condition::First => 5,
            Condition::NotFirst => 6,
            Condition::Loop(l) => {
                let base_start: usize = (2..l.base as usize).sum();
                CONDITION_LOOP_FIRST
                    + if l.invert { CONDITION_LOOP_COUNT } else { 0 }
                    + base_start
                    + l.offset as usize
            }
        }
    }

    /// Evaluate the condition against the current iteration and fill state.
    /// `prev` carries the last evaluated result for the Pre/NotPre
    /// conditions and is updated by every condition that produces a result
    /// of its own.
    pub fn evaluate(self, iteration: u32, fill: bool, prev: &mut bool) -> bool {
        match self {
            Condition::Off => true,
            Condition::Fill => {
                *prev = fill;
                *prev
            }
            Condition::NotFill => {
                *prev = !fill;
                *prev
            }
            Condition::Pre => *prev,
            Condition::NotPre => !*prev,
            Condition::First => {
                *prev = iteration == 0;
                *prev
            }
            Condition::NotFirst => {
                *prev = iteration != 0;
                *prev
            }
            Condition::Loop(l) => {
                let mut result = iteration % l.base as u32 == l.offset as u32;
                if l.invert {
                    result = !result;
                }
                *prev = result;
                result
            }
        }
    }
}

// ---------------------------------------------------------------------------
// stage repeats
// ---------------------------------------------------------------------------

/// Filters which repeats of a held stage produce gates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StageRepeatMode {
    #[default]
    Each,
    First,
    Middle,
    Last,
    Odd,
    Even,
    Triplets,
    Random,
}

impl StageRepeatMode {
    pub const COUNT: usize = 8;

    /// Whether repeat number `current_repeat` (1-based) of a stage held for
    /// `stage_repeats + 1` plays fires a gate. Random draws one of the
    /// deterministic modes per evaluation.
    pub fn passes(self, current_repeat: u32, stage_repeats: u32, rng: &mut TrackRng) -> bool {
        let count = stage_repeats + 1;
        match self {
            StageRepeatMode::Each => true,
            StageRepeatMode::First => current_repeat == 1,
            StageRepeatMode::Last => current_repeat == count,
            StageRepeatMode::Middle => current_repeat == count / 2,
            StageRepeatMode::Odd => current_repeat % 2 != 0,
            StageRepeatMode::Even => current_repeat % 2 == 0,
            StageRepeatMode::Triplets => (current_repeat - 1) % 3 == 0,
            StageRepeatMode::Random => {
                let mode = match rng.next_range(7) {
                    0 => StageRepeatMode::Each,
                    1 => StageRepeatMode::First,
                    2 => StageRepeatMode::Last,
                    3 => StageRepeatMode::Middle,
                    4 => StageRepeatMode::Odd,
                    5 => StageRepeatMode::Even,
                    _ => StageRepeatMode::Triplets,
                };
                mode.passes(current_repeat, stage_repeats, rng)
            }
        }
    }
}

impl TryFrom<u8> for StageRepeatMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StageRepeatMode::Each),
            1 => Ok(StageRepeatMode::First),
            2 => Ok(StageRepeatMode::Middle),
            3 => Ok(StageRepeatMode::Last),
            4 => Ok(StageRepeatMode::Odd),
            5 => Ok(StageRepeatMode::Even),
            6 => Ok(StageRepeatMode::Triplets),
            7 => Ok(StageRepeatMode::Random),
            _ => Err(()),
        }
    }
}

impl StageRepeatMode {
    pub fn index(self) -> u8 {
        match self {
            StageRepeatMode::Each => 0,
            StageRepeatMode::First => 1,
            StageRepeatMode::Middle => 2,
            StageRepeatMode::Last => 3,
            StageRepeatMode::Odd => 4,
            StageRepeatMode::Even => 5,
            StageRepeatMode::Triplets => 6,
            StageRepeatMode::Random => 7,
        }
    }
}

// ---------------------------------------------------------------------------
// time signature
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSignature {
    beats: u8,
    /// Note value of one beat: 2, 4, 8 or 16.
    note: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature { beats: 4, note: 4 }
    }
}

impl TimeSignature {
    pub fn new(beats: u8, note: u8) -> TimeSignature {
        TimeSignature {
            beats: beats.clamp(1, 16),
            note: match note {
                0..=2 => 2,
                3..=4 => 4,
                5..=8 => 8,
                _ => 16,
            },
        }
    }

    pub fn beats(&self) -> u32 {
        self.beats as u32
    }

    pub fn note(&self) -> u32 {
        self.note as u32
    }

    /// Ticks in one measure.
    pub fn measure_divisor(&self) -> u32 {
        self.beats as u32 * (PPQN * 4 / self.note as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_value_range_and_clamp() {
        assert_eq!(15, UnsignedValue::<4>::MAX);
        assert_eq!(16, UnsignedValue::<4>::RANGE);
        assert_eq!(15, UnsignedValue::<4>::clamp(100));
        assert_eq!(0, UnsignedValue::<4>::clamp(-3));
    }

    #[test]
    fn signed_value_range_and_clamp() {
        assert_eq!(-8, SignedValue::<4>::MIN);
        assert_eq!(7, SignedValue::<4>::MAX);
        assert_eq!(16, SignedValue::<4>::RANGE);
        assert_eq!(-8, SignedValue::<4>::clamp(-100));
        assert_eq!(-64, SignedValue::<7>::MIN);
        assert_eq!(63, SignedValue::<7>::MAX);
    }

    #[test]
    fn condition_index_round_trips() {
        for index in 0..Condition::COUNT {
            let condition = Condition::from_index(index);
            assert_eq!(index, condition.index());
        }
    }

    #[test]
    fn condition_fits_in_seven_bits() {
        assert!(Condition::COUNT <= UnsignedValue::<7>::RANGE as usize);
    }

    #[test]
    fn condition_loop_fires_on_matching_iterations() {
        let condition = Condition::Loop(ConditionLoop {
            base: 4,
            offset: 1,
            invert: false,
        });
        let mut prev = false;
        let fired: Vec<u32> = (0..12)
            .filter(|&i| condition.evaluate(i, false, &mut prev))
            .collect();
        assert_eq!(vec![1, 5, 9], fired);
    }

    #[test]
    fn condition_pre_reuses_previous_result() {
        let mut prev = false;
        assert!(Condition::First.evaluate(0, false, &mut prev));
        assert!(Condition::Pre.evaluate(7, false, &mut prev));
        assert!(!Condition::NotPre.evaluate(7, false, &mut prev));
        assert!(!Condition::First.evaluate(3, false, &mut prev));
        assert!(!Condition::Pre.evaluate(0, false, &mut prev));
    }

    #[test]
    fn condition_fill_tracks_fill_flag() {
        let mut prev = false;
        assert!(Condition::Fill.evaluate(0, true, &mut prev));
        assert!(!Condition::Fill.evaluate(0, false, &mut prev));
        assert!(Condition::NotFill.evaluate(0, false, &mut prev));
    }

    #[test]
    fn stage_repeat_zero_plays_exactly_once() {
        let mut rng = TrackRng::new(1);
        for mode in [
            StageRepeatMode::Each,
            StageRepeatMode::First,
            StageRepeatMode::Last,
        ] {
            assert!(mode.passes(1, 0, &mut rng));
        }
    }

    #[test]
    fn stage_repeat_modes_filter_repeats() {
        let mut rng = TrackRng::new(1);
        // stage held 4 times
        assert!(StageRepeatMode::First.passes(1, 3, &mut rng));
        assert!(!StageRepeatMode::First.passes(2, 3, &mut rng));
        assert!(StageRepeatMode::Last.passes(4, 3, &mut rng));
        assert!(StageRepeatMode::Middle.passes(2, 3, &mut rng));
        assert!(StageRepeatMode::Odd.passes(3, 3, &mut rng));
        assert!(StageRepeatMode::Even.passes(2, 3, &mut rng));
        assert!(StageRepeatMode::Triplets.passes(4, 3, &mut rng));
        assert!(!StageRepeatMode::Triplets.passes(2, 3, &mut rng));
    }

    #[test]
    fn time_signature_measure_divisor() {
        assert_eq!(4 * PPQN, TimeSignature::default().measure_divisor());
        assert_eq!(3 * PPQN, TimeSignature::new(3, 4).measure_divisor());
        assert_eq!(
            7 * PPQN / 2,
            TimeSignature::new(7, 8).measure_divisor()
        );
    }
}
