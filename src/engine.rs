//! Engine: per-tick fan-out to the track engines, shared evaluation
//! helpers, and the output drain every engine variant uses.
//!
//! The engine owns the project and one track engine per track. Each tick it
//! applies pending play-state requests, samples the routing table, and
//! ticks every track engine in index order; link followers read their
//! parent's link data from the previous statement, which is why only
//! lower-indexed parents are honored.

pub mod arp_engine;
pub mod logic_engine;
pub mod note_engine;
pub mod stochastic_engine;

use core::ops::{BitOr, BitOrAssign};

use embedded_midi::MidiMessage;
use fugit::{ExtU64, MicrosDurationU64};
use heapless::Vec;
use libm::expf;
use log::debug;

use crate::{
    divisor_ticks,
    event_queue::{CvEvent, GateEvent, SortedQueue},
    groove::apply_swing,
    project::Project,
    rng::TrackRng,
    routing::{Route, Source},
    sequence_state::SequenceState,
    track::TrackMode,
    types::{Condition, CvUpdateMode, SignedValue, StageRepeatMode, UnsignedValue},
    CHANNEL_COUNT, TRACK_COUNT,
};

use arp_engine::ArpEngine;
use logic_engine::LogicEngine;
use note_engine::NoteEngine;
use stochastic_engine::StochasticEngine;

pub const CV_INPUT_COUNT: usize = 4;

/// Sink for the MIDI mirror of the gate/CV outputs. No back-pressure: the
/// engine calls it from the tick path and the implementation must accept
/// every call.
pub trait MidiOutput {
    fn send_gate(&mut self, track_index: usize, gate: bool);
    fn send_cv(&mut self, track_index: usize, volts: f32);
    fn send_slide(&mut self, track_index: usize, slide: bool);
}

/// Bitmask of updates a tick performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickResult(u8);

impl TickResult {
    pub const NONE: TickResult = TickResult(0);
    pub const GATE_UPDATE: TickResult = TickResult(1 << 0);
    pub const CV_UPDATE: TickResult = TickResult(1 << 1);

    pub fn gate_updated(self) -> bool {
        self.0 & Self::GATE_UPDATE.0 != 0
    }

    pub fn cv_updated(self) -> bool {
        self.0 & Self::CV_UPDATE.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TickResult {
    type Output = TickResult;

    fn bitor(self, rhs: TickResult) -> TickResult {
        TickResult(self.0 | rhs.0)
    }
}

impl BitOrAssign for TickResult {
    fn bitor_assign(&mut self, rhs: TickResult) {
        self.0 |= rhs.0;
    }
}

/// Timing data a link follower copies from its parent every tick.
#[derive(Clone, Debug)]
pub struct TrackLinkData {
    pub divisor: u32,
    pub relative_tick: u32,
    pub sequence_state: SequenceState,
}

impl Default for TrackLinkData {
    fn default() -> Self {
        TrackLinkData {
            divisor: 1,
            relative_tick: 0,
            sequence_state: SequenceState::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// shared step evaluation
// ---------------------------------------------------------------------------

type GateProbability = UnsignedValue<4>;
type RetriggerProbability = UnsignedValue<4>;
type Length = UnsignedValue<4>;
type LengthVariationProbability = UnsignedValue<4>;
type GateOffsetValue = SignedValue<4>;

/// The step fields every engine variant evaluates the same way. Arp steps
/// carry no stage repeats; the defaults make them single-play.
pub(crate) trait StepProperties {
    fn gate(&self) -> bool;
    fn gate_probability(&self) -> i32;
    fn gate_offset(&self) -> i32;
    fn retrigger(&self) -> i32;
    fn retrigger_probability(&self) -> i32;
    fn length(&self) -> i32;
    fn length_variation_range(&self) -> i32;
    fn length_variation_probability(&self) -> i32;
    fn condition(&self) -> Condition;
    fn slide(&self) -> bool;
    fn stage_repeats(&self) -> i32 {
        0
    }
    fn stage_repeat_mode(&self) -> StageRepeatMode {
        StageRepeatMode::Each
    }
}

macro_rules! impl_step_properties {
    ($step:ty) => {
        impl StepProperties for $step {
            fn gate(&self) -> bool {
                <$step>::gate(self)
            }
            fn gate_probability(&self) -> i32 {
                <$step>::gate_probability(self)
            }
            fn gate_offset(&self) -> i32 {
                <$step>::gate_offset(self)
            }
            fn retrigger(&self) -> i32 {
                <$step>::retrigger(self)
            }
            fn retrigger_probability(&self) -> i32 {
                <$step>::retrigger_probability(self)
            }
            fn length(&self) -> i32 {
                <$step>::length(self)
            }
            fn length_variation_range(&self) -> i32 {
                <$step>::length_variation_range(self)
            }
            fn length_variation_probability(&self) -> i32 {
                <$step>::length_variation_probability(self)
            }
            fn condition(&self) -> Condition {
                <$step>::condition(self)
            }
            fn slide(&self) -> bool {
                <$step>::slide(self)
            }
        }
    };
    ($step:ty, stage_repeats) => {
        impl StepProperties for $step {
            fn gate(&self) -> bool {
                <$step>::gate(self)
            }
            fn gate_probability(&self) -> i32 {
                <$step>::gate_probability(self)
            }
            fn gate_offset(&self) -> i32 {
                <$step>::gate_offset(self)
            }
            fn retrigger(&self) -> i32 {
                <$step>::retrigger(self)
            }
            fn retrigger_probability(&self) -> i32 {
                <$step>::retrigger_probability(self)
            }
            fn length(&self) -> i32 {
                <$step>::length(self)
            }
            fn length_variation_range(&self) -> i32 {
                <$step>::length_variation_range(self)
            }
            fn length_variation_probability(&self) -> i32 {
                <$step>::length_variation_probability(self)
            }
            fn condition(&self) -> Condition {
                <$step>::condition(self)
            }
            fn slide(&self) -> bool {
                <$step>::slide(self)
            }
            fn stage_repeats(&self) -> i32 {
                <$step>::stage_repeats(self)
            }
            fn stage_repeat_mode(&self) -> StageRepeatMode {
                <$step>::stage_repeat_mode(self)
            }
        }
    };
}

impl_step_properties!(crate::note_track::NoteStep, stage_repeats);
impl_step_properties!(crate::stochastic_track::StochasticStep, stage_repeats);
impl_step_properties!(crate::logic_track::LogicStep, stage_repeats);
impl_step_properties!(crate::arp_track::ArpStep);

/// Whether the step's gate fires, given its probability and the track bias.
pub(crate) fn eval_step_gate<S: StepProperties>(
    step: &S,
    probability_bias: i32,
    rng: &mut TrackRng,
) -> bool {
    let probability =
        (step.gate_probability() + probability_bias).clamp(-1, GateProbability::MAX);
    step.gate() && (rng.next_range(GateProbability::RANGE as u32) as i32) <= probability
}

/// Retrigger count for the step: `retrigger + 1` subdivisions when the
/// probability hits, one otherwise.
pub(crate) fn eval_step_retrigger<S: StepProperties>(
    step: &S,
    probability_bias: i32,
    rng: &mut TrackRng,
) -> i32 {
    let probability =
        (step.retrigger_probability() + probability_bias).clamp(-1, RetriggerProbability::MAX);
    if (rng.next_range(RetriggerProbability::RANGE as u32) as i32) <= probability {
        step.retrigger() + 1
    } else {
        1
    }
}

/// Step length in `[0, Length::RANGE]` units of a whole step, including the
/// bias and the probabilistic variation offset.
pub(crate) fn eval_step_length<S: StepProperties>(
    step: &S,
    length_bias: i32,
    rng: &mut TrackRng,
) -> i32 {
    let mut length = Length::clamp(step.length() + length_bias) + 1;
    let probability = step.length_variation_probability();
    if (rng.next_range(LengthVariationProbability::RANGE as u32) as i32) <= probability {
        let range = step.length_variation_range();
        let mut offset = if range == 0 {
            0
        } else {
            rng.next_range(range.unsigned_abs() + 1) as i32
        };
        if range < 0 {
            offset = -offset;
        }
        length = (length + offset).clamp(0, Length::RANGE);
    }
    length
}

/// Whether this stage repeat produces a gate.
pub(crate) fn eval_stage_repeat<S: StepProperties>(
    step: &S,
    current_stage_repeat: u32,
    rng: &mut TrackRng,
) -> bool {
    step.stage_repeat_mode()
        .passes(current_stage_repeat, step.stage_repeats() as u32, rng)
}

/// Event tick for a step with a (possibly negative) gate offset.
pub(crate) fn step_tick_with_offset(tick: u32, divisor: u32, gate_offset: i32) -> u32 {
    let offset = (divisor as i64 * gate_offset as i64) / (GateOffsetValue::MAX as i64 + 1);
    (tick as i64 + offset).max(0) as u32
}

/// Enqueue the gate on/off pairs for one evaluated step. Retriggers divide
/// the step into equal subdivisions; the gate-off of each pair always lands
/// at least one tick after its gate-on.
pub(crate) fn schedule_gates(
    gate_queue: &mut SortedQueue<GateEvent, 16>,
    step_tick: u32,
    divisor: u32,
    step_length: u32,
    retrigger: i32,
    swing: i32,
) {
    if retrigger > 1 {
        let retrigger_length = (divisor / retrigger as u32).max(1);
        let mut offset = 0u32;
        let mut remaining = retrigger;
        while remaining > 0 && offset <= step_length {
            gate_queue.push_replace(GateEvent {
                tick: apply_swing(step_tick + offset, swing),
                gate: true,
            });
            gate_queue.push_replace(GateEvent {
                tick: apply_swing(step_tick + offset + (retrigger_length / 2).max(1), swing),
                gate: false,
            });
            offset += retrigger_length;
            remaining -= 1;
        }
    } else {
        gate_queue.push_replace(GateEvent {
            tick: apply_swing(step_tick, swing),
            gate: true,
        });
        gate_queue.push_replace(GateEvent {
            tick: apply_swing(step_tick + step_length.max(1), swing),
            gate: false,
        });
    }
}

/// Pattern a track engine plays right now: the snapshot slot while a
/// snapshot is active, the play-state pattern otherwise.
pub(crate) fn active_pattern(project: &Project, track_index: usize) -> usize {
    if project.play_state().snapshot_active() {
        crate::play_state::SNAPSHOT_PATTERN_INDEX
    } else {
        project.play_state().track_state(track_index).pattern()
    }
}

/// Convert an incoming MIDI note to the sequence's note space. Chromatic
/// scales compensate the root note so recorded notes play back at pitch.
pub(crate) fn note_from_midi_note(
    scale: &crate::scale::Scale,
    root_note: i32,
    midi_note: u8,
) -> i32 {
    if scale.is_chromatic() {
        scale.note_from_volts((midi_note as i32 - 60 - root_note) as f32 / 12.0)
    } else {
        scale.note_from_volts((midi_note as i32 - 60) as f32 / 12.0)
    }
}

// ---------------------------------------------------------------------------
// shared output state
// ---------------------------------------------------------------------------

/// Exponential approach of the CV output toward its target. The time
/// constant scales with the track's slide time (percent).
pub(crate) fn apply_slide(current: f32, target: f32, slide_time: i32, dt: f32) -> f32 {
    if slide_time <= 0 {
        return target;
    }
    let tau = slide_time as f32 * 0.005;
    current + (target - current) * (1.0 - expf(-dt / tau))
}

/// The gate/CV output state and queue drain shared by all engine variants.
#[derive(Debug, Default)]
pub(crate) struct EngineOutput {
    pub activity: bool,
    pub gate_output: bool,
    pub cv_output: f32,
    pub cv_output_target: f32,
    pub slide_active: bool,
    pub monitor_override_active: bool,
}

impl EngineOutput {
    pub fn new() -> EngineOutput {
        EngineOutput::default()
    }

    /// Reset playback-derived state; the CV output holds its last value.
    pub fn reset_playback(&mut self) {
        self.activity = false;
        self.gate_output = false;
        self.slide_active = false;
    }

    /// Drop the CV output to 0 V immediately (reset-CV-on-stop).
    pub fn reset_cv(&mut self) {
        self.cv_output = 0.0;
        self.cv_output_target = 0.0;
        self.slide_active = false;
    }

    /// Drain all due events, updating the outputs and mirroring them to
    /// MIDI. Gate output is `(!mute || fill) && activity`; CV updates are
    /// suppressed while muted unless the track updates CV always.
    #[allow(clippy::too_many_arguments)]
    pub fn drain<M: MidiOutput>(
        &mut self,
        tick: u32,
        gate_queue: &mut SortedQueue<GateEvent, 16>,
        cv_queue: &mut SortedQueue<CvEvent, 16>,
        mute: bool,
        fill: bool,
        cv_update_mode: CvUpdateMode,
        track_index: usize,
        midi: &mut M,
    ) -> TickResult {
        let mut result = TickResult::NONE;

        while let Some(event) = gate_queue.front().copied() {
            if tick < event.tick {
                break;
            }
            gate_queue.pop();
            if !self.monitor_override_active {
                result |= TickResult::GATE_UPDATE;
                self.activity = event.gate;
                self.gate_output = (!mute || fill) && self.activity;
                midi.send_gate(track_index, self.gate_output);
            }
        }

        while let Some(event) = cv_queue.front().copied() {
            if tick < event.tick {
                break;
            }
            cv_queue.pop();
            if (!mute || cv_update_mode == CvUpdateMode::Always)
                && !self.monitor_override_active
            {
                result |= TickResult::CV_UPDATE;
                self.cv_output_target = event.cv;
                self.slide_active = event.slide;
                midi.send_cv(track_index, self.cv_output_target);
                midi.send_slide(track_index, self.slide_active);
            }
        }

        result
    }

    /// Force the outputs to a monitored voltage (step or live monitoring).
    pub fn set_override<M: MidiOutput>(&mut self, cv: f32, track_index: usize, midi: &mut M) {
        self.cv_output_target = cv;
        self.activity = true;
        self.gate_output = true;
        self.monitor_override_active = true;
        midi.send_gate(track_index, true);
        midi.send_cv(track_index, cv);
        midi.send_slide(track_index, false);
    }

    pub fn clear_override<M: MidiOutput>(&mut self, track_index: usize, midi: &mut M) {
        if self.monitor_override_active {
            self.activity = false;
            self.gate_output = false;
            self.monitor_override_active = false;
            midi.send_gate(track_index, false);
        }
    }

    pub fn update_slide(&mut self, slide_time: i32, dt: f32) {
        if self.slide_active && slide_time > 0 {
            self.cv_output = apply_slide(self.cv_output, self.cv_output_target, slide_time, dt);
        } else {
            self.cv_output = self.cv_output_target;
        }
    }
}

// ---------------------------------------------------------------------------
// track engine dispatch
// ---------------------------------------------------------------------------

/// Tagged per-track engine; dispatch is a match, not virtual calls.
pub enum TrackEngine {
    Note(NoteEngine),
    Stochastic(StochasticEngine),
    Logic(LogicEngine),
    Arp(ArpEngine),
}

impl TrackEngine {
    pub fn for_mode(mode: TrackMode, track_index: usize) -> TrackEngine {
        match mode {
            TrackMode::Note => TrackEngine::Note(NoteEngine::new(track_index)),
            TrackMode::Stochastic => TrackEngine::Stochastic(StochasticEngine::new(track_index)),
            TrackMode::Logic => TrackEngine::Logic(LogicEngine::new(track_index)),
            TrackMode::Arp => TrackEngine::Arp(ArpEngine::new(track_index)),
        }
    }

    pub fn mode(&self) -> TrackMode {
        match self {
            TrackEngine::Note(_) => TrackMode::Note,
            TrackEngine::Stochastic(_) => TrackMode::Stochastic,
            TrackEngine::Logic(_) => TrackMode::Logic,
            TrackEngine::Arp(_) => TrackMode::Arp,
        }
    }

    pub fn reset(&mut self) {
        match self {
            TrackEngine::Note(engine) => engine.reset(),
            TrackEngine::Stochastic(engine) => engine.reset(),
            TrackEngine::Logic(engine) => engine.reset(),
            TrackEngine::Arp(engine) => engine.reset(),
        }
    }

    pub fn restart(&mut self) {
        match self {
            TrackEngine::Note(engine) => engine.restart(),
            TrackEngine::Stochastic(engine) => engine.restart(),
            TrackEngine::Logic(engine) => engine.restart(),
            TrackEngine::Arp(engine) => engine.restart(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn tick<M: MidiOutput>(
        &mut self,
        tick: u32,
        project: &mut Project,
        link: Option<&TrackLinkData>,
        midi: &mut M,
        recording: bool,
        selected: bool,
        stop_requested: &mut bool,
    ) -> TickResult {
        match self {
            TrackEngine::Note(engine) => {
                engine.tick(tick, project, link, midi, recording, selected, stop_requested)
            }
            TrackEngine::Stochastic(engine) => {
                engine.tick(tick, project, link, midi, recording, selected, stop_requested)
            }
            TrackEngine::Logic(engine) => {
                engine.tick(tick, project, link, midi, recording, selected, stop_requested)
            }
            TrackEngine::Arp(engine) => {
                engine.tick(tick, project, link, midi, recording, selected, stop_requested)
            }
        }
    }

    pub fn update<M: MidiOutput>(
        &mut self,
        dt: f32,
        project: &Project,
        running: bool,
        midi: &mut M,
    ) {
        match self {
            TrackEngine::Note(engine) => engine.update(dt, project, running, midi),
            TrackEngine::Stochastic(engine) => engine.update(dt, project, running, midi),
            TrackEngine::Logic(engine) => engine.update(dt, project, running, midi),
            TrackEngine::Arp(engine) => engine.update(dt, project, running, midi),
        }
    }

    pub fn monitor_midi(&mut self, tick: u32, message: &MidiMessage) {
        match self {
            TrackEngine::Note(engine) => engine.monitor_midi(tick, message),
            TrackEngine::Stochastic(engine) => engine.monitor_midi(tick, message),
            TrackEngine::Logic(engine) => engine.monitor_midi(tick, message),
            TrackEngine::Arp(engine) => engine.monitor_midi(tick, message),
        }
    }

    pub fn clear_midi_monitoring(&mut self) {
        match self {
            TrackEngine::Note(engine) => engine.clear_midi_monitoring(),
            TrackEngine::Stochastic(engine) => engine.clear_midi_monitoring(),
            TrackEngine::Logic(engine) => engine.clear_midi_monitoring(),
            TrackEngine::Arp(engine) => engine.clear_midi_monitoring(),
        }
    }

    pub fn link_data(&self) -> &TrackLinkData {
        match self {
            TrackEngine::Note(engine) => engine.link_data(),
            TrackEngine::Stochastic(engine) => engine.link_data(),
            TrackEngine::Logic(engine) => engine.link_data(),
            TrackEngine::Arp(engine) => engine.link_data(),
        }
    }

    pub fn activity(&self) -> bool {
        match self {
            TrackEngine::Note(engine) => engine.activity(),
            TrackEngine::Stochastic(engine) => engine.activity(),
            TrackEngine::Logic(engine) => engine.activity(),
            TrackEngine::Arp(engine) => engine.activity(),
        }
    }

    pub fn gate_output(&self) -> bool {
        match self {
            TrackEngine::Note(engine) => engine.gate_output(),
            TrackEngine::Stochastic(engine) => engine.gate_output(),
            TrackEngine::Logic(engine) => engine.gate_output(),
            TrackEngine::Arp(engine) => engine.gate_output(),
        }
    }

    pub fn cv_output(&self) -> f32 {
        match self {
            TrackEngine::Note(engine) => engine.cv_output(),
            TrackEngine::Stochastic(engine) => engine.cv_output(),
            TrackEngine::Logic(engine) => engine.cv_output(),
            TrackEngine::Arp(engine) => engine.cv_output(),
        }
    }

    pub fn current_step(&self) -> i32 {
        match self {
            TrackEngine::Note(engine) => engine.current_step(),
            TrackEngine::Stochastic(engine) => engine.current_step(),
            TrackEngine::Logic(engine) => engine.current_step(),
            TrackEngine::Arp(engine) => engine.current_step(),
        }
    }

    pub(crate) fn reset_cv(&mut self) {
        match self {
            TrackEngine::Note(engine) => engine.reset_cv(),
            TrackEngine::Stochastic(engine) => engine.reset_cv(),
            TrackEngine::Logic(engine) => engine.reset_cv(),
            TrackEngine::Arp(engine) => engine.reset_cv(),
        }
    }

    /// Select the step whose voltage the engine emits while the clock is
    /// stopped; -1 clears step monitoring.
    pub fn set_monitor_step(&mut self, index: i32) {
        match self {
            TrackEngine::Note(engine) => engine.set_monitor_step(index),
            TrackEngine::Stochastic(engine) => engine.set_monitor_step(index),
            TrackEngine::Logic(engine) => engine.set_monitor_step(index),
            TrackEngine::Arp(engine) => engine.set_monitor_step(index),
        }
    }

    pub fn note_engine_mut(&mut self) -> Option<&mut NoteEngine> {
        match self {
            TrackEngine::Note(engine) => Some(engine),
            _ => None,
        }
    }

    pub fn arp_engine_mut(&mut self) -> Option<&mut ArpEngine> {
        match self {
            TrackEngine::Arp(engine) => Some(engine),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// the engine
// ---------------------------------------------------------------------------

pub struct Engine<M: MidiOutput> {
    project: Project,
    track_engines: [TrackEngine; TRACK_COUNT],
    midi_output: M,
    tick: u32,
    running: bool,
    recording: bool,
    suspended: u8,
    cv_inputs: [f32; CV_INPUT_COUNT],
    midi_cc_values: [u8; 128],
    last_midi_note: Option<u8>,
}

impl<M: MidiOutput> Engine<M> {
    pub fn new(project: Project, midi_output: M) -> Engine<M> {
        let track_engines = core::array::from_fn(|index| {
            TrackEngine::for_mode(project.track(index).mode(), index)
        });
        Engine {
            project,
            track_engines,
            midi_output,
            tick: 0,
            running: false,
            recording: false,
            suspended: 0,
            cv_inputs: [0.0; CV_INPUT_COUNT],
            midi_cc_values: [0; 128],
            last_midi_note: None,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.project
    }

    pub fn midi_output(&self) -> &M {
        &self.midi_output
    }

    pub fn track_engine(&self, track_index: usize) -> &TrackEngine {
        &self.track_engines[track_index]
    }

    pub fn track_engine_mut(&mut self, track_index: usize) -> &mut TrackEngine {
        &mut self.track_engines[track_index]
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn recording(&self) -> bool {
        self.recording
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Change a track's mode in the model and rebuild its engine.
    pub fn set_track_mode(&mut self, track_index: usize, mode: TrackMode) {
        self.project.set_track_mode(track_index, mode);
        self.track_engines[track_index] = TrackEngine::for_mode(mode, track_index);
    }

    /// Bracket slow host operations (file I/O): ticks are no-ops while
    /// suspended, in-flight queue entries drain on the first tick after
    /// resume. Suspensions nest.
    pub fn suspend(&mut self) {
        self.suspended = self.suspended.saturating_add(1);
    }

    pub fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
    }

    pub fn suspended(&self) -> bool {
        self.suspended > 0
    }

    pub fn clock_start(&mut self) {
        self.reset();
        self.running = true;
    }

    pub fn clock_stop(&mut self) {
        self.running = false;
        if self.project.reset_cv_on_stop() {
            for track_index in 0..TRACK_COUNT {
                self.track_engines[track_index].reset_cv();
                self.midi_output.send_cv(track_index, 0.0);
            }
        }
    }

    pub fn reset(&mut self) {
        self.tick = 0;
        for engine in self.track_engines.iter_mut() {
            engine.reset();
        }
    }

    /// One tick of the playback clock. The caller guarantees `tick` is
    /// monotonic.
    pub fn on_tick(&mut self, tick: u32) -> TickResult {
        if !self.running || self.suspended > 0 {
            return TickResult::NONE;
        }
        self.tick = tick;

        // pattern/mute requests: synced at the sync-measure boundary,
        // immediate every tick
        let synced = tick % self.project.sync_divisor() == 0;
        self.project.play_state_mut().execute_requests(synced);

        self.update_routing(tick);

        let mut result = TickResult::NONE;
        let mut stop_requested = false;
        let selected_track = self.project.selected_track_index();

        for track_index in 0..TRACK_COUNT {
            let link = self.link_data_for(track_index);
            let engine = &mut self.track_engines[track_index];
            result |= engine.tick(
                tick,
                &mut self.project,
                link.as_ref(),
                &mut self.midi_output,
                self.recording,
                selected_track == track_index,
                &mut stop_requested,
            );
        }

        if stop_requested {
            debug!("clock stop requested at tick {}", tick);
            self.clock_stop();
        }

        result
    }

    /// Link data of a track's parent, if the link is valid. A link to a
    /// non-existent, higher-indexed or mode-incompatible slot falls back to
    /// independent timing.
    fn link_data_for(&self, track_index: usize) -> Option<TrackLinkData> {
        let parent = self.project.track(track_index).link_track()?;
        if parent >= track_index {
            debug!(
                "track {} links forward to track {}, ignoring",
                track_index, parent
            );
            return None;
        }
        Some(self.track_engines[parent].link_data().clone())
    }

    /// Non-tick-path update: slide smoothing and monitoring, with `dt` in
    /// seconds since the last call.
    pub fn update(&mut self, dt: f32) {
        for engine in self.track_engines.iter_mut() {
            engine.update(dt, &self.project, self.running, &mut self.midi_output);
        }
    }

    // ------------------------------------------------------------------
    // inputs
    // ------------------------------------------------------------------

    pub fn set_cv_input(&mut self, index: usize, volts: f32) {
        if index < CV_INPUT_COUNT {
            self.cv_inputs[index] = volts;
        }
    }

    /// Feed an incoming MIDI message to the routing sources, the selected
    /// track's monitor/record history, and any arp track listening to the
    /// keyboard.
    pub fn monitor_midi(&mut self, tick: u32, message: &MidiMessage) {
        match message {
            MidiMessage::ControlChange(_, control, value) => {
                let control: u8 = (*control).into();
                self.midi_cc_values[control as usize & 0x7f] = (*value).into();
            }
            MidiMessage::NoteOn(_, note, velocity) => {
                let velocity: u8 = (*velocity).into();
                let note: u8 = (*note).into();
                if velocity > 0 {
                    self.last_midi_note = Some(note);
                } else if self.last_midi_note == Some(note) {
                    self.last_midi_note = None;
                }
            }
            MidiMessage::NoteOff(_, note, _) => {
                let note: u8 = (*note).into();
                if self.last_midi_note == Some(note) {
                    self.last_midi_note = None;
                }
            }
            _ => {}
        }

        let selected = self.project.selected_track_index();
        self.track_engines[selected].monitor_midi(tick, message);

        if self.recording && self.project.record_mode() == crate::types::RecordMode::StepRecord {
            let Engine {
                project,
                track_engines,
                ..
            } = self;
            if let Some(note_engine) = track_engines[selected].note_engine_mut() {
                note_engine.step_record_midi(message, project);
            }
        }

        for track_index in 0..TRACK_COUNT {
            let keyboard = self
                .project
                .track(track_index)
                .arp_track()
                .map(|track| track.midi_keyboard())
                .unwrap_or(false);
            if !keyboard {
                continue;
            }
            if let Some(arp) = self.track_engines[track_index].arp_engine_mut() {
                match message {
                    MidiMessage::NoteOn(_, note, velocity) => {
                        let velocity: u8 = (*velocity).into();
                        let note: u8 = (*note).into();
                        if velocity > 0 {
                            arp.add_midi_note(note);
                        } else {
                            arp.remove_midi_note(note);
                        }
                    }
                    MidiMessage::NoteOff(_, note, _) => {
                        arp.remove_midi_note((*note).into());
                    }
                    _ => {}
                }
            }
        }
    }

    pub fn clear_midi_monitoring(&mut self) {
        for engine in self.track_engines.iter_mut() {
            engine.clear_midi_monitoring();
        }
    }

    // ------------------------------------------------------------------
    // routing
    // ------------------------------------------------------------------

    fn update_routing(&mut self, tick: u32) {
        let routes: Vec<Route, { crate::routing::MAX_ROUTES }> =
            self.project.routing().routes().iter().copied().collect();
        for route in routes {
            let normalized = match route.source {
                Source::None => continue,
                Source::CvIn(index) => {
                    let volts = self
                        .cv_inputs
                        .get(index as usize)
                        .copied()
                        .unwrap_or(0.0);
                    (volts + 5.0) / 10.0
                }
                Source::MidiCc(controller) => {
                    self.midi_cc_values[controller as usize & 0x7f] as f32 / 127.0
                }
                Source::MidiNoteRange { low, high } => match self.last_midi_note {
                    Some(note) if note >= low && note <= high && high > low => {
                        (note - low) as f32 / (high - low) as f32
                    }
                    Some(note) if note >= low && note <= high => 1.0,
                    _ => 0.0,
                },
                Source::ClockRamp { divisor } => {
                    let period = divisor_ticks(divisor as u32);
                    (tick % period) as f32 / period as f32
                }
            };
            let (int_value, float_value) = route.target_value(normalized);
            self.project
                .write_routed(route.target, route.tracks, int_value, float_value);
        }
    }

    // ------------------------------------------------------------------
    // outputs
    // ------------------------------------------------------------------

    /// Gate state of a panel channel, through the output assignment table.
    pub fn gate_output(&self, channel: usize) -> bool {
        let track_index = self.project.gate_output_track(channel.min(CHANNEL_COUNT - 1));
        self.track_engines[track_index].gate_output()
    }

    /// CV of a panel channel, through the output assignment table.
    pub fn cv_output(&self, channel: usize) -> f32 {
        let track_index = self.project.cv_output_track(channel.min(CHANNEL_COUNT - 1));
        self.track_engines[track_index].cv_output()
    }

    /// Wall-clock period of one tick at the given tempo, for the host's
    /// clock timer.
    pub fn tick_duration(tempo: f32) -> MicrosDurationU64 {
        let us_per_quarter = 60_000_000.0 / tempo.clamp(1.0, 1000.0);
        ((us_per_quarter / crate::PPQN as f32) as u64).micros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::play_state::ExecuteType;
    use crate::routing::Target;
    use crate::types::{Condition, ConditionLoop};

    #[derive(Default)]
    struct TestMidi {
        gates: std::vec::Vec<(usize, bool)>,
        cvs: std::vec::Vec<(usize, f32)>,
    }

    impl MidiOutput for TestMidi {
        fn send_gate(&mut self, track_index: usize, gate: bool) {
            self.gates.push((track_index, gate));
        }

        fn send_cv(&mut self, track_index: usize, volts: f32) {
            self.cvs.push((track_index, volts));
        }

        fn send_slide(&mut self, _track_index: usize, _slide: bool) {}
    }

    fn note_engine_project() -> Project {
        let mut project = Project::new();
        {
            let track = project.track_mut(0).note_track_mut().unwrap();
            let sequence = track.sequence_mut(0);
            // 12 ticks per step
            sequence.set_divisor(3, false);
        }
        project
    }

    /// Gate transitions of track 0 observed over `ticks` ticks of playback.
    fn run_and_observe(engine: &mut Engine<TestMidi>, ticks: u32) -> std::vec::Vec<(u32, bool)> {
        let mut transitions = std::vec::Vec::new();
        let mut last = engine.track_engine(0).activity();
        engine.clock_start();
        for tick in 0..ticks {
            engine.on_tick(tick);
            let activity = engine.track_engine(0).activity();
            if activity != last {
                transitions.push((tick, activity));
                last = activity;
            }
        }
        transitions
    }

    #[test]
    fn plain_note_step_gates_for_half_a_step() {
        let mut project = note_engine_project();
        {
            let sequence = project.track_mut(0).note_track_mut().unwrap().sequence_mut(0);
            sequence.set_gates(&[true]);
            sequence.set_notes(&[7]);
            sequence.set_last_step(0, false);
        }
        let mut engine = Engine::new(project, TestMidi::default());
        let transitions = run_and_observe(&mut engine, 12);
        // default length is half the range: gate holds for 6 of 12 ticks
        assert_eq!(vec![(0, true), (6, false)], transitions);

        engine.update(0.001);
        let cv = engine.track_engine(0).cv_output();
        assert!((cv - 7.0 / 12.0).abs() < 1e-5);
    }

    #[test]
    fn negative_gate_offset_plays_early_via_look_ahead() {
        let mut project = note_engine_project();
        {
            let sequence = project.track_mut(0).note_track_mut().unwrap().sequence_mut(0);
            sequence.set_gates(&[true, true]);
            sequence.set_last_step(1, false);
            for index in 0..2 {
                let step = sequence.step_mut(index);
                // -2/8 of a 12-tick step is 3 ticks early
                step.set_gate_offset(-2);
                step.set_length(0);
            }
        }
        let mut engine = Engine::new(project, TestMidi::default());
        let transitions = run_and_observe(&mut engine, 24);
        let ons: std::vec::Vec<u32> = transitions
            .iter()
            .filter(|(_, gate)| *gate)
            .map(|(tick, _)| *tick)
            .collect();
        // step 0 clamps to tick 0; step 1 fires 3 ticks before its boundary
        assert_eq!(vec![0, 9, 21], ons);
    }

    #[test]
    fn retrigger_subdivides_the_step() {
        let mut project = note_engine_project();
        {
            let sequence = project.track_mut(0).note_track_mut().unwrap().sequence_mut(0);
            sequence.set_gates(&[true]);
            sequence.set_last_step(0, false);
            let step = sequence.step_mut(0);
            step.set_retrigger(2);
            step.set_length(crate::note_track::Length::MAX);
        }
        let mut engine = Engine::new(project, TestMidi::default());
        let transitions = run_and_observe(&mut engine, 12);
        assert_eq!(
            vec![
                (0, true),
                (2, false),
                (4, true),
                (6, false),
                (8, true),
                (10, false)
            ],
            transitions
        );
    }

    #[test]
    fn loop_condition_fires_on_matching_iterations() {
        let mut project = note_engine_project();
        {
            let sequence = project.track_mut(0).note_track_mut().unwrap().sequence_mut(0);
            sequence.set_gates(&[true]);
            sequence.set_last_step(0, false);
            sequence.step_mut(0).set_condition(Condition::Loop(ConditionLoop {
                base: 4,
                offset: 1,
                invert: false,
            }));
        }
        let mut engine = Engine::new(project, TestMidi::default());
        let transitions = run_and_observe(&mut engine, 96);
        let ons: std::vec::Vec<u32> = transitions
            .iter()
            .filter(|(_, gate)| *gate)
            .map(|(tick, _)| *tick)
            .collect();
        // a single-step window makes the iteration count the step count
        assert_eq!(vec![12, 60], ons);
    }

    fn logic_and_project(gate1: bool, gate2: bool) -> Project {
        let mut project = Project::new();
        project.set_track_mode(2, TrackMode::Logic);
        project
            .track_mut(0)
            .note_track_mut()
            .unwrap()
            .sequence_mut(0)
            .set_gates(&[gate1]);
        project
            .track_mut(1)
            .note_track_mut()
            .unwrap()
            .sequence_mut(0)
            .set_gates(&[gate2]);
        let logic = project.track_mut(2).logic_track_mut().unwrap();
        logic.set_input_track1(Some(0));
        logic.set_input_track2(Some(1));
        logic
            .sequence_mut(0)
            .step_mut(0)
            .set_gate_logic(crate::logic_track::GateLogicMode::And);
        project
    }

    #[test]
    fn logic_and_combines_input_gates() {
        let mut engine = Engine::new(logic_and_project(true, false), TestMidi::default());
        engine.clock_start();
        engine.on_tick(0);
        // input 2 is low, AND stays low
        assert!(!engine.track_engine(2).activity());

        let mut engine = Engine::new(logic_and_project(true, true), TestMidi::default());
        engine.clock_start();
        engine.on_tick(0);
        assert!(engine.track_engine(2).activity());
    }

    #[test]
    fn linked_track_rides_parent_timing() {
        let mut project = note_engine_project();
        {
            let sequence = project.track_mut(0).note_track_mut().unwrap().sequence_mut(0);
            sequence.set_gates(&[true]);
            sequence.set_last_step(0, false);
        }
        {
            project.track_mut(1).set_link_track(Some(0));
            let track = project.track_mut(1).note_track_mut().unwrap();
            let sequence = track.sequence_mut(0);
            sequence.set_gates(&[true]);
            // follower keeps its own (much slower) divisor, timing comes
            // from the parent
            sequence.set_divisor(48, false);
        }
        let mut engine = Engine::new(project, TestMidi::default());
        engine.clock_start();
        engine.on_tick(0);
        assert!(engine.track_engine(1).activity());
    }

    #[test]
    fn mute_suppresses_gate_output_but_not_activity() {
        let mut project = note_engine_project();
        {
            let sequence = project.track_mut(0).note_track_mut().unwrap().sequence_mut(0);
            sequence.set_gates(&[true]);
            sequence.set_last_step(0, false);
        }
        project.play_state_mut().mute_track(0, ExecuteType::Immediate);
        let mut engine = Engine::new(project, TestMidi::default());
        engine.clock_start();
        engine.on_tick(0);
        assert!(engine.track_engine(0).activity());
        assert!(!engine.track_engine(0).gate_output());
        assert!(!engine.gate_output(0));
    }

    #[test]
    fn steps_to_stop_halts_the_clock() {
        let mut project = note_engine_project();
        project.set_steps_to_stop(2);
        {
            let sequence = project.track_mut(0).note_track_mut().unwrap().sequence_mut(0);
            sequence.set_gates(&[true]);
        }
        let mut engine = Engine::new(project, TestMidi::default());
        engine.clock_start();
        for tick in 0..=24 {
            engine.on_tick(tick);
        }
        assert!(!engine.running());
    }

    #[test]
    fn routed_swing_applies_from_cv_input() {
        let mut project = note_engine_project();
        project
            .routing_mut()
            .add_route(Route::new(Target::Swing, 0, Source::CvIn(0)))
            .unwrap();
        let mut engine = Engine::new(project, TestMidi::default());
        engine.set_cv_input(0, 5.0);
        engine.clock_start();
        engine.on_tick(0);
        assert_eq!(75, engine.project().swing());
        // removing the route restores the base value
        let route = engine.project_mut().routing_mut().remove_route(0).unwrap();
        engine.project_mut().clear_routed(route.target, route.tracks);
        assert_eq!(50, engine.project().swing());
    }

    #[test]
    fn synced_pattern_change_waits_for_sync_measure() {
        let mut project = note_engine_project();
        project
            .play_state_mut()
            .select_track_pattern(0, 3, ExecuteType::Synced);
        let mut engine = Engine::new(project, TestMidi::default());
        engine.clock_start();
        engine.on_tick(1);
        assert_eq!(0, engine.project().play_state().track_state(0).pattern());
        let sync = engine.project().sync_divisor();
        engine.on_tick(sync);
        assert_eq!(3, engine.project().play_state().track_state(0).pattern());
    }

    #[test]
    fn tick_duration_matches_tempo() {
        // 120 bpm: 500ms per quarter, PPQN ticks per quarter
        let duration = Engine::<TestMidi>::tick_duration(120.0);
        assert_eq!(500_000 / crate::PPQN as u64, duration.to_micros());
    }

    #[test]
    fn gate_off_never_precedes_gate_on() {
        let mut project = note_engine_project();
        {
            let sequence = project.track_mut(0).note_track_mut().unwrap().sequence_mut(0);
            sequence.set_gates(&[true, true, true, true]);
            sequence.set_last_step(3, false);
            for index in 0..4 {
                sequence.step_mut(index).set_length(0);
            }
        }
        let mut engine = Engine::new(project, TestMidi::default());
        let transitions = run_and_observe(&mut engine, 48);
        for pair in transitions.chunks(2) {
            if let [(on, true), (off, false)] = pair {
                assert!(off > on);
            }
        }
    }
}
