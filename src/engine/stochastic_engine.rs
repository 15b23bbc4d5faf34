//! Stochastic track engine: emits weighted random pitches drawn from the
//! sequence's 12-entry pitch table, with optional rests and a lockable
//! replay loop.
//!
//! The memory and locked loop buffers are per-instance so stochastic
//! tracks are independent and testable.

use embedded_midi::MidiMessage;
use heapless::Vec;
use libm::{cosf, logf, roundf, sqrtf};

use crate::{
    divisor_ticks,
    engine::{
        active_pattern, eval_stage_repeat, eval_step_gate, eval_step_length,
        eval_step_retrigger, note_from_midi_note, schedule_gates, step_tick_with_offset,
        EngineOutput, MidiOutput, TickResult, TrackLinkData,
    },
    event_queue::{CvEvent, GateEvent, SortedQueue},
    groove::apply_swing,
    project::Project,
    record_history::{RecordHistory, RecordKind},
    rng::TrackRng,
    scale::Scale,
    sequence_state::SequenceState,
    step_recorder::StepRecorder,
    stochastic_track::{
        Length, LengthVariationProbability, Note, NoteVariationProbability, RetriggerProbability,
        StochasticStep, PITCH_TABLE_SIZE,
    },
    types::{CvUpdateMode, FillMode, MonitorMode, PlayMode, RecordMode},
    PATTERN_COUNT, STEP_COUNT,
};

/// One remembered outcome of the probabilistic draw, replayed while the
/// loop is locked. An index of -1 marks a rest.
#[derive(Clone, Copy, Debug)]
struct LoopStep {
    index: i8,
    gate: bool,
    step: StochasticStep,
    note_value: f32,
    step_length: u32,
    retrigger: i32,
}

impl LoopStep {
    fn rest() -> LoopStep {
        LoopStep {
            index: -1,
            gate: false,
            step: StochasticStep::new(),
            note_value: 0.0,
            step_length: 0,
            retrigger: 1,
        }
    }
}

/// Normal draw rounded to the nearest integer (Box-Muller).
fn gaussian_offset(rng: &mut TrackRng, mean: f32, sigma: f32) -> i32 {
    let u1 = rng.next_f32().max(1e-7);
    let u2 = rng.next_f32();
    let normal = sqrtf(-2.0 * logf(u1)) * cosf(2.0 * core::f32::consts::PI * u2);
    roundf(mean + sigma * normal) as i32
}

/// Weighted draw over `(index, weight)` pairs sorted by descending weight.
/// Returns the first entry whose weight swallows the remaining draw; None
/// when the total weight is not positive.
fn next_weighted_pitch(distribution: &[(i8, i32)], rng: &mut TrackRng) -> Option<i8> {
    let total: i32 = distribution.iter().map(|(_, weight)| weight).sum();
    if total <= 0 {
        return None;
    }
    let mut draw = 1 + rng.next_range(total as u32) as i32;
    for &(index, weight) in distribution {
        if draw <= weight && weight > 0 {
            return Some(index);
        }
        draw -= weight;
    }
    None
}

/// Note voltage of a pitch-table entry: octave variation picks a uniform
/// octave inside the sequence's octave bounds, on top of the entry's own
/// octave.
#[allow(clippy::too_many_arguments)]
fn eval_step_note(
    step: &StochasticStep,
    probability_bias: i32,
    scale: &Scale,
    root_note: i32,
    octave: i32,
    transpose: i32,
    low_octave_range: i32,
    high_octave_range: i32,
    rng: &mut TrackRng,
    use_variation: bool,
) -> f32 {
    let scale = if step.bypass_scale() {
        Scale::get(0)
    } else {
        scale
    };
    let mut note = step.note() + octave * scale.notes_per_octave() + transpose;
    let mut probability = (step.note_octave_probability() + probability_bias)
        .clamp(-1, crate::stochastic_track::NoteOctaveProbability::MAX);
    if step.note_octave_probability() == 0 {
        probability = 0;
    }
    if use_variation
        && probability != 0
        && (rng.next_range(crate::stochastic_track::NoteOctaveProbability::RANGE as u32) as i32)
            <= probability
    {
        let span = (high_octave_range - low_octave_range + 1).max(1) as u32;
        let octave_offset =
            step.note_octave() + low_octave_range + rng.next_range(span) as i32;
        note = Note::clamp(note + scale.notes_per_octave() * octave_offset);
    }
    scale.note_to_volts(note)
        + if scale.is_chromatic() {
            root_note as f32 / 12.0
        } else {
            0.0
        }
}

pub struct StochasticEngine {
    track_index: usize,
    sequence_state: SequenceState,
    free_relative_tick: u32,
    current_step: i32,
    prev_condition: bool,
    current_stage_repeat: u32,
    monitor_step_index: i32,
    output: EngineOutput,
    gate_queue: SortedQueue<GateEvent, 16>,
    cv_queue: SortedQueue<CvEvent, 16>,
    record_history: RecordHistory,
    step_recorder: StepRecorder,
    link_data: TrackLinkData,
    rng: TrackRng,
    in_mem_steps: Vec<LoopStep, STEP_COUNT>,
    locked_steps: Vec<LoopStep, STEP_COUNT>,
    skips: u32,
}

impl StochasticEngine {
    pub fn new(track_index: usize) -> StochasticEngine {
        StochasticEngine {
            track_index,
            sequence_state: SequenceState::new(),
            free_relative_tick: 0,
            current_step: -1,
            prev_condition: false,
            current_stage_repeat: 1,
            monitor_step_index: -1,
            output: EngineOutput::new(),
            gate_queue: SortedQueue::new(),
            cv_queue: SortedQueue::new(),
            record_history: RecordHistory::new(),
            step_recorder: StepRecorder::new(),
            link_data: TrackLinkData::default(),
            rng: TrackRng::for_track(track_index),
            in_mem_steps: Vec::new(),
            locked_steps: Vec::new(),
            skips: 0,
        }
    }

    pub fn reset(&mut self) {
        self.free_relative_tick = 0;
        self.sequence_state.reset();
        self.current_step = -1;
        self.prev_condition = false;
        self.current_stage_repeat = 1;
        self.output.reset_playback();
        self.gate_queue.clear();
        self.cv_queue.clear();
        self.record_history.clear();
    }

    pub fn restart(&mut self) {
        self.free_relative_tick = 0;
        self.sequence_state.reset();
        self.current_step = -1;
        self.in_mem_steps.clear();
        self.locked_steps.clear();
        self.skips = 0;
    }

    pub(crate) fn reset_cv(&mut self) {
        self.output.reset_cv();
    }

    pub fn activity(&self) -> bool {
        self.output.activity
    }

    pub fn gate_output(&self) -> bool {
        self.output.gate_output
    }

    pub fn cv_output(&self) -> f32 {
        self.output.cv_output
    }

    pub fn current_step(&self) -> i32 {
        self.current_step
    }

    pub fn link_data(&self) -> &TrackLinkData {
        &self.link_data
    }

    pub fn set_monitor_step(&mut self, index: i32) {
        self.monitor_step_index = if (0..STEP_COUNT as i32).contains(&index) {
            index
        } else {
            -1
        };
    }

    pub fn monitor_midi(&mut self, tick: u32, message: &MidiMessage) {
        self.record_history.write(tick, message);
    }

    pub fn clear_midi_monitoring(&mut self) {
        self.record_history.clear();
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
        let track_index = self.track_index;
        let pattern = active_pattern(project, track_index);
        let Some(track) = project.track(track_index).stochastic_track() else {
            return TickResult::NONE;
        };
        let play_mode = track.play_mode();
        let fill_muted = track.fill_muted();
        let cv_update_mode = track.cv_update_mode();
        let sequence = track.sequence(pattern);
        let divisor = divisor_ticks(sequence.divisor());
        let reset_measure = sequence.reset_measure();
        let run_mode = sequence.run_mode();
        let first_step = sequence.first_step();
        let last_step = sequence.last_step();
        let sequence_first_step = sequence.sequence_first_step();
        let sequence_last_step = sequence.sequence_last_step();
        let measure_divisor = project.time_signature().measure_divisor();
        let state = project.play_state().track_state(track_index);
        let mute = state.mute();
        let fill = if fill_muted || !mute { state.fill() } else { false };

        if let Some(link) = link {
            self.link_data = link.clone();
            self.sequence_state = link.sequence_state.clone();

            if link.relative_tick % link.divisor.max(1) == 0 {
                self.record_step(tick, link.divisor.max(1), project, recording, selected);
                self.trigger_step(tick, link.divisor.max(1), project);
            }
        } else {
            let reset_divisor = reset_measure * measure_divisor;
            let relative_tick = if reset_divisor == 0 {
                tick
            } else {
                tick % reset_divisor
            };

            if project.steps_to_stop() != 0
                && relative_tick / divisor == project.steps_to_stop()
            {
                *stop_requested = true;
            }

            if relative_tick == 0 {
                self.reset();
            }

            let mut link_relative_tick = relative_tick;

            match play_mode {
                PlayMode::Aligned => {
                    if relative_tick % divisor == 0 {
                        self.trigger_step(tick, divisor, project);
                        self.sequence_state.calculate_next_step_aligned(
                            (relative_tick + divisor) / divisor,
                            run_mode,
                            sequence_first_step,
                            sequence_last_step,
                            &mut self.rng,
                        );
                    }
                }
                PlayMode::Free => {
                    let relative_tick = self.free_relative_tick;
                    link_relative_tick = relative_tick;
                    self.free_relative_tick += 1;
                    if self.free_relative_tick >= divisor {
                        self.free_relative_tick = 0;
                    }
                    if relative_tick == 0 {
                        if self.current_stage_repeat == 1 {
                            self.sequence_state.advance_free(
                                run_mode,
                                first_step,
                                last_step,
                                &mut self.rng,
                            );
                        }

                        let step_index = self.sequence_state.step().clamp(0, STEP_COUNT as i32 - 1);
                        let stage_repeats = project
                            .track(track_index)
                            .stochastic_track()
                            .map(|track| {
                                track.sequence(pattern).step(step_index as usize).stage_repeats()
                            })
                            .unwrap_or(0);
                        let is_last_stage_step =
                            stage_repeats + 1 - self.current_stage_repeat as i32 <= 0;

                        self.trigger_step(tick + divisor, divisor, project);

                        if is_last_stage_step {
                            self.current_stage_repeat = 1;
                        } else {
                            self.current_stage_repeat += 1;
                        }
                    }
                }
            }

            self.link_data = TrackLinkData {
                divisor,
                relative_tick: link_relative_tick,
                sequence_state: self.sequence_state.clone(),
            };
        }

        self.output.drain(
            tick,
            &mut self.gate_queue,
            &mut self.cv_queue,
            mute,
            fill,
            cv_update_mode,
            track_index,
            midi,
        )
    }

    pub fn update<M: MidiOutput>(
        &mut self,
        dt: f32,
        project: &Project,
        running: bool,
        midi: &mut M,
    ) {
        let track_index = self.track_index;
        let pattern = active_pattern(project, track_index);
        let Some(track) = project.track(track_index).stochastic_track() else {
            return;
        };
        let sequence = track.sequence(pattern);
        let scale = sequence.selected_scale(project.scale());
        let root_note = sequence.selected_root_note(project.root_note());
        let low_octave_range = sequence.low_octave_range();
        let high_octave_range = sequence.high_octave_range();
        let octave = track.octave();
        let transpose = track.transpose();
        let slide_time = track.slide_time();

        let step_monitoring = !running && self.monitor_step_index >= 0;
        let monitor_mode = project.monitor_mode();
        let live_monitoring = monitor_mode == MonitorMode::Always
            || (monitor_mode == MonitorMode::Stopped && !running);

        if step_monitoring {
            let step = *sequence.step(self.monitor_step_index as usize);
            let cv = eval_step_note(
                &step,
                0,
                scale,
                root_note,
                octave,
                transpose,
                low_octave_range,
                high_octave_range,
                &mut self.rng,
                false,
            );
            self.output.set_override(cv, track_index, midi);
        } else if live_monitoring && self.record_history.is_note_active() {
            if let Some(midi_note) = self.record_history.active_note() {
                let note = note_from_midi_note(scale, root_note, midi_note)
                    + octave * scale.notes_per_octave()
                    + transpose;
                let cv = scale.note_to_volts(note)
                    + if scale.is_chromatic() {
                        root_note as f32 / 12.0
                    } else {
                        0.0
                    };
                self.output.set_override(cv, track_index, midi);
            }
        } else {
            self.output.clear_override(track_index, midi);
        }

        self.output.update_slide(slide_time, dt);
    }

    /// Weighted rest draw: picks among the 1/2/4/8-step rest weights and
    /// returns the number of subsequent steps to skip, or None when all
    /// weights are zero.
    fn eval_rest_probability(&mut self, weights: [i32; 4]) -> Option<u32> {
        let mut distribution: [(i8, i32); 4] = [(0, 0); 4];
        for (index, &weight) in weights.iter().enumerate() {
            distribution[index] = (
                index as i8,
                weight.clamp(0, NoteVariationProbability::MAX),
            );
        }
        distribution.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        let pick = next_weighted_pitch(&distribution, &mut self.rng)?;
        Some(match pick {
            0 => 0,
            1 => 1,
            2 => 3,
            _ => 7,
        })
    }

    fn trigger_step(&mut self, tick: u32, divisor: u32, project: &mut Project) {
        let track_index = self.track_index;
        let pattern = active_pattern(project, track_index);
        let state = project.play_state().track_state(track_index);
        let mute = state.mute();
        let state_fill = state.fill();
        let fill_amount = state.fill_amount();

        let Some(track) = project.track(track_index).stochastic_track() else {
            return;
        };
        let fill = if track.fill_muted() || !mute {
            state_fill
        } else {
            false
        };
        let fill_step = fill && self.rng.next_range(100) < fill_amount;
        let use_fill_gates = fill_step && track.fill_mode() == FillMode::Gates;
        let use_fill_sequence = fill_step && track.fill_mode() == FillMode::NextPattern;
        let use_fill_condition = fill_step && track.fill_mode() == FillMode::Condition;

        let octave = track.octave();
        let transpose = track.transpose();
        let gate_probability_bias = track.gate_probability_bias();
        let retrigger_probability_bias = track.retrigger_probability_bias();
        let length_bias = track.length_bias();
        let note_probability_bias = track.note_probability_bias();
        let cv_update_always = track.cv_update_mode() == CvUpdateMode::Always;

        let sequence = track.sequence(pattern);
        let eval_pattern = if use_fill_sequence {
            (pattern + 1).min(PATTERN_COUNT - 1)
        } else {
            pattern
        };
        let eval_sequence = track.sequence(eval_pattern);
        let scale = eval_sequence.selected_scale(project.scale());
        let root_note = eval_sequence.selected_root_note(project.root_note());

        let reseed = sequence.reseed();
        let use_loop = sequence.use_loop();
        let clear_loop = sequence.clear_loop();
        let buffer_loop_length = sequence.buffer_loop_length();
        let sequence_first_step = sequence.sequence_first_step();
        let sequence_last_step = sequence.sequence_last_step();
        let sequence_length = sequence.sequence_length();
        let reset_measure = sequence.reset_measure();
        let low_octave_range = sequence.low_octave_range();
        let high_octave_range = sequence.high_octave_range();
        let length_modifier = sequence.length_modifier();
        let rest_weights = [
            sequence.rest_probability(),
            sequence.rest_probability2(),
            sequence.rest_probability4(),
            sequence.rest_probability8(),
        ];
        let mut pitch_table = [StochasticStep::new(); PITCH_TABLE_SIZE];
        for (index, entry) in pitch_table.iter_mut().enumerate() {
            *entry = *sequence.step(index);
        }
        let measure_divisor = project.time_signature().measure_divisor();
        let swing = project.swing();

        let reset_divisor = reset_measure * measure_divisor;
        let relative_tick = if reset_divisor == 0 {
            tick
        } else {
            tick % reset_divisor
        };
        let absolute_step = (relative_tick + divisor) / divisor - 1;
        let index = (absolute_step % sequence_length.max(1) as u32) as usize;

        if reseed {
            // injected seed: the tick keeps reseeding deterministic for a
            // given transport position
            self.rng.reseed(tick as u64 ^ 0x5bd1_e995);
            let bias = self.rng.next_inclusive(
                -NoteVariationProbability::RANGE,
                NoteVariationProbability::RANGE,
            );
            if let Some(track) = project.track_mut(track_index).stochastic_track_mut() {
                track.set_note_probability_bias(bias, false);
                track.sequence_mut(pattern).set_reseed(false, false);
            }
        }

        let mut chosen: Option<LoopStep> = None;

        // fill the memory buffer while the loop is not locked (or not full)
        if !use_loop || self.in_mem_steps.len() < buffer_loop_length {
            if self.skips != 0 {
                self.skips -= 1;
                if self.in_mem_steps.len() < buffer_loop_length {
                    let _ = self.in_mem_steps.push(LoopStep::rest());
                }
                return;
            }
            if index % 2 == 0 {
                if let Some(rest) = self.eval_rest_probability(rest_weights) {
                    self.skips = rest;
                }
            }

            let mut distribution: [(i8, i32); PITCH_TABLE_SIZE] = [(0, 0); PITCH_TABLE_SIZE];
            for (table_index, entry) in pitch_table.iter().enumerate() {
                let weight = if entry.gate() {
                    (entry.note_variation_probability() + note_probability_bias)
                        .clamp(-1, NoteVariationProbability::MAX)
                } else {
                    0
                };
                distribution[table_index] = (table_index as i8, weight);
            }
            distribution.sort_unstable_by(|a, b| b.1.cmp(&a.1));
            let Some(step_index) = next_weighted_pitch(&distribution, &mut self.rng) else {
                return;
            };

            let step = pitch_table[step_index as usize];
            self.current_step = step_index as i32;

            let mut step_gate = eval_step_gate(&step, gate_probability_bias, &mut self.rng)
                || use_fill_gates;
            if step_gate {
                step_gate = step.condition().evaluate(
                    self.sequence_state.iteration(),
                    use_fill_condition,
                    &mut self.prev_condition,
                );
            }
            step_gate =
                step_gate && eval_stage_repeat(&step, self.current_stage_repeat, &mut self.rng);

            let note_value = eval_step_note(
                &step,
                note_probability_bias,
                scale,
                root_note,
                octave,
                transpose,
                low_octave_range,
                high_octave_range,
                &mut self.rng,
                true,
            );

            let mut step_length = ((divisor
                * eval_step_length(&step, length_bias, &mut self.rng) as u32)
                / Length::RANGE as u32) as i64;
            if length_modifier != 0 {
                step_length += gaussian_offset(&mut self.rng, length_modifier as f32, 2.0) as i64;
            }
            let step_length = step_length.max(0) as u32;

            let retrigger =
                eval_step_retrigger(&step, retrigger_probability_bias, &mut self.rng);

            let loop_step = LoopStep {
                index: step_index,
                gate: step_gate,
                step,
                note_value,
                step_length,
                retrigger,
            };
            if self.in_mem_steps.len() < buffer_loop_length {
                let _ = self.in_mem_steps.push(loop_step);
            }
            chosen = Some(loop_step);
        }

        // the unlocked buffer wraps by starting over
        if !use_loop && self.in_mem_steps.len() >= buffer_loop_length {
            self.in_mem_steps.clear();
        }

        // relock: freeze the memory buffer and start replaying it
        if clear_loop {
            self.locked_steps.clear();
            let _ = self.locked_steps.extend_from_slice(&self.in_mem_steps);
            if let Some(track) = project.track_mut(track_index).stochastic_track_mut() {
                let sequence = track.sequence_mut(pattern);
                sequence.set_clear_loop(false);
                sequence.set_use_loop(true);
            }
        }

        // replay from the locked loop once the buffer is full
        if use_loop && self.in_mem_steps.len() >= buffer_loop_length {
            if self.locked_steps.len() != self.in_mem_steps.len() {
                self.locked_steps.clear();
                let _ = self.locked_steps.extend_from_slice(&self.in_mem_steps);
            }
            let first = sequence_first_step as usize;
            let last = (sequence_last_step as usize).min(self.locked_steps.len().saturating_sub(1));
            let entry = match self
                .locked_steps
                .get(first..=last)
                .and_then(|window| window.get(index))
            {
                Some(entry) => *entry,
                None => return,
            };
            if entry.index < 0 {
                return;
            }
            self.current_step = entry.index as i32;
            chosen = Some(entry);
        }

        let Some(chosen) = chosen else {
            return;
        };

        let step_tick = step_tick_with_offset(tick, divisor, chosen.step.gate_offset());

        if chosen.gate {
            if let Some(track) = project.track_mut(track_index).stochastic_track_mut() {
                track.sequence_mut(pattern).set_step_bounds(self.current_step);
            }
            schedule_gates(
                &mut self.gate_queue,
                step_tick,
                divisor,
                chosen.step_length,
                chosen.retrigger,
                swing,
            );
        }

        if chosen.gate || cv_update_always {
            self.cv_queue.push(CvEvent {
                tick: apply_swing(step_tick, swing),
                cv: chosen.note_value,
                slide: chosen.step.slide(),
            });
        }
    }

    /// Live recording into the pitch table, used when this track follows a
    /// link parent.
    fn record_step(
        &mut self,
        tick: u32,
        divisor: u32,
        project: &mut Project,
        recording: bool,
        selected: bool,
    ) {
        if !recording
            || project.record_mode() == RecordMode::StepRecord
            || self.sequence_state.prev_step() < 0
        {
            return;
        }

        let track_index = self.track_index;
        let pattern = active_pattern(project, track_index);
        let prev_step = self.sequence_state.prev_step() as usize;
        let overwrite = project.record_mode() == RecordMode::Overwrite;

        let (scale, root_note) = {
            let Some(track) = project.track(track_index).stochastic_track() else {
                return;
            };
            let sequence = track.sequence(pattern);
            (
                sequence.selected_scale(project.scale()),
                sequence.selected_root_note(project.root_note()),
            )
        };

        let step_start = tick.saturating_sub(divisor);
        let step_end = tick;
        let margin = divisor / 2;

        let mut recorded: Option<(u8, u32)> = None;
        for index in 0..self.record_history.len() {
            let Some(entry) = self.record_history.get(index) else {
                break;
            };
            if entry.kind != RecordKind::NoteOn {
                continue;
            }
            let note_start = entry.tick;
            let note_end = self
                .record_history
                .get(index + 1)
                .map(|next| next.tick)
                .unwrap_or(tick);

            if note_start >= step_start.saturating_sub(margin) && note_start < step_start + margin
            {
                let length = if note_end >= step_end {
                    note_end.min(step_end) - step_start
                } else {
                    note_end.saturating_sub(note_start)
                };
                recorded = Some((entry.note, length));
            } else if note_start < step_start && note_end > step_start {
                let length = note_end.min(step_end) - step_start;
                recorded = Some((entry.note, length));
            }
        }

        let Some(track) = project.track_mut(track_index).stochastic_track_mut() else {
            return;
        };
        let sequence = track.sequence_mut(pattern);

        if let Some((midi_note, length_ticks)) = recorded {
            let length = ((length_ticks * Length::RANGE as u32) / divisor) as i32;
            let step = sequence.step_mut(prev_step);
            step.set_gate(true);
            step.set_gate_probability(crate::stochastic_track::GateProbability::MAX);
            step.set_retrigger(0);
            step.set_retrigger_probability(RetriggerProbability::MAX);
            step.set_length(length);
            step.set_length_variation_range(0);
            step.set_length_variation_probability(LengthVariationProbability::MAX);
            step.set_note(note_from_midi_note(scale, root_note, midi_note));
            step.set_note_octave(0);
            step.set_note_variation_probability(NoteVariationProbability::MAX);
            step.set_condition(crate::types::Condition::Off);
            step.set_stage_repeats(1);
        } else if selected && overwrite {
            sequence.step_mut(prev_step).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, MidiOutput};
    use crate::track::TrackMode;

    struct NullMidi;

    impl MidiOutput for NullMidi {
        fn send_gate(&mut self, _track_index: usize, _gate: bool) {}
        fn send_cv(&mut self, _track_index: usize, _volts: f32) {}
        fn send_slide(&mut self, _track_index: usize, _slide: bool) {}
    }

    #[test]
    fn weighted_draw_converges_to_weight_ratios() {
        let mut rng = TrackRng::new(123);
        // sorted by descending weight, as the engine presents it
        let distribution = [(9i8, 5), (5, 3), (0, 2)];
        let mut counts = [0u32; 3];
        let samples = 10_000;
        for _ in 0..samples {
            match next_weighted_pitch(&distribution, &mut rng) {
                Some(9) => counts[0] += 1,
                Some(5) => counts[1] += 1,
                Some(0) => counts[2] += 1,
                other => panic!("unexpected draw {:?}", other),
            }
        }
        let ratio = |count: u32| count as f32 / samples as f32;
        assert!((ratio(counts[0]) - 0.5).abs() < 0.03);
        assert!((ratio(counts[1]) - 0.3).abs() < 0.03);
        assert!((ratio(counts[2]) - 0.2).abs() < 0.03);
    }

    #[test]
    fn weighted_draw_with_zero_total_yields_nothing() {
        let mut rng = TrackRng::new(1);
        assert_eq!(None, next_weighted_pitch(&[(0, 0), (1, 0)], &mut rng));
    }

    #[test]
    fn zero_weight_entries_are_never_drawn() {
        let mut rng = TrackRng::new(7);
        let distribution = [(3i8, 4), (7, 0)];
        for _ in 0..500 {
            assert_eq!(Some(3), next_weighted_pitch(&distribution, &mut rng));
        }
    }

    #[test]
    fn single_gated_entry_is_always_selected() {
        let mut project = crate::project::Project::new();
        project.set_track_mode(0, TrackMode::Stochastic);
        {
            let sequence = project
                .track_mut(0)
                .stochastic_track_mut()
                .unwrap()
                .sequence_mut(0);
            let step = sequence.step_mut(5);
            step.set_gate(true);
            step.set_note_variation_probability(10);
        }
        let mut engine = Engine::new(project, NullMidi);
        engine.clock_start();
        engine.on_tick(0);
        assert_eq!(5, engine.track_engine(0).current_step());
        assert!(engine.track_engine(0).activity());
        engine.update(0.001);
        // the pitch table seeds entry n with note n; entry 5 bypasses to
        // chromatic
        assert!((engine.track_engine(0).cv_output() - 5.0 / 12.0).abs() < 1e-5);
    }

    #[test]
    fn all_gates_off_emits_nothing() {
        let mut project = crate::project::Project::new();
        project.set_track_mode(0, TrackMode::Stochastic);
        let mut engine = Engine::new(project, NullMidi);
        engine.clock_start();
        for tick in 0..96 {
            engine.on_tick(tick);
        }
        assert!(!engine.track_engine(0).activity());
    }

    #[test]
    fn gaussian_offset_centers_on_mean() {
        let mut rng = TrackRng::new(11);
        let mut sum = 0i64;
        let samples = 2_000;
        for _ in 0..samples {
            sum += gaussian_offset(&mut rng, 4.0, 2.0) as i64;
        }
        let mean = sum as f32 / samples as f32;
        assert!((mean - 4.0).abs() < 0.3);
    }

    #[test]
    fn rest_weights_map_to_skip_counts() {
        let mut engine = StochasticEngine::new(0);
        // only the 8-step rest has weight, so the draw always lands on it
        assert_eq!(Some(7), engine.eval_rest_probability([0, 0, 0, 8]));
        assert_eq!(Some(0), engine.eval_rest_probability([8, 0, 0, 0]));
        assert_eq!(None, engine.eval_rest_probability([0, 0, 0, 0]));
    }
}
