//! Logic track engine: combines the gates and notes of two referenced
//! note tracks through per-step logic modes, then evaluates the result
//! like a note step.

use embedded_midi::MidiMessage;

use crate::{
    divisor_ticks,
    engine::{
        active_pattern, eval_stage_repeat, eval_step_gate, eval_step_length,
        eval_step_retrigger, note_from_midi_note, schedule_gates, step_tick_with_offset,
        EngineOutput, MidiOutput, TickResult, TrackLinkData,
    },
    event_queue::{CvEvent, GateEvent, SortedQueue},
    groove::apply_swing,
    logic_track::{
        GateLogicMode, Length, LengthVariationProbability, LogicStep, Note, NoteLogicMode,
        NoteVariationProbability, RetriggerProbability,
    },
    project::Project,
    record_history::{RecordHistory, RecordKind},
    rng::TrackRng,
    rotate_step,
    scale::Scale,
    sequence_state::SequenceState,
    step_recorder::StepRecorder,
    types::{Condition, CvUpdateMode, FillMode, MonitorMode, PlayMode, RecordMode},
    PATTERN_COUNT, STEP_COUNT,
};

/// Gate and note of one input track's step at the logic track's position.
#[derive(Clone, Copy, Debug, Default)]
struct InputStep {
    valid: bool,
    gate: bool,
    note: i32,
}

/// Read an input note track's step. An invalid link (unset, out of range
/// or not a note track) reads as no gate, note zero.
fn read_input_step(project: &Project, input: Option<usize>, step_index: i32) -> InputStep {
    let Some(track_index) = input else {
        return InputStep::default();
    };
    let Some(track) = project.track(track_index).note_track() else {
        return InputStep::default();
    };
    if step_index < 0 {
        return InputStep::default();
    }
    let pattern = active_pattern(project, track_index);
    let sequence = track.sequence(pattern);
    let rotated = rotate_step(
        step_index.min(sequence.last_step()),
        sequence.first_step(),
        sequence.last_step(),
        track.rotate(),
    );
    let step = sequence.step(rotated.clamp(0, STEP_COUNT as i32 - 1) as usize);
    InputStep {
        valid: true,
        gate: step.gate(),
        note: step.note(),
    }
}

/// Combine the two input gates. With no valid input the step's own gate is
/// used; RandomLogic draws among And/Or/Xor/Nand.
fn eval_gate_logic(
    mode: GateLogicMode,
    step_gate: bool,
    input1: InputStep,
    input2: InputStep,
    rng: &mut TrackRng,
) -> bool {
    if !input1.valid && !input2.valid {
        return step_gate;
    }
    match mode {
        GateLogicMode::One => input1.gate,
        GateLogicMode::Two => input2.gate,
        GateLogicMode::And => input1.gate && input2.gate,
        GateLogicMode::Or => input1.gate || input2.gate,
        GateLogicMode::Xor => input1.gate != input2.gate,
        GateLogicMode::Nand => !(input1.gate && input2.gate),
        GateLogicMode::RandomInput => {
            if rng.next_range(2) == 0 {
                input1.gate
            } else {
                input2.gate
            }
        }
        GateLogicMode::RandomLogic => {
            let mode = match rng.next_range(4) {
                0 => GateLogicMode::And,
                1 => GateLogicMode::Or,
                2 => GateLogicMode::Xor,
                _ => GateLogicMode::Nand,
            };
            eval_gate_logic(mode, step_gate, input1, input2, rng)
        }
    }
}

/// Derive the effective note from the two input notes. Op1/Op2 are
/// reserved and evaluate as Max.
fn eval_note_logic(
    mode: NoteLogicMode,
    input1: InputStep,
    input2: InputStep,
    rng: &mut TrackRng,
) -> i32 {
    match mode {
        NoteLogicMode::One => input1.note,
        NoteLogicMode::Two => input2.note,
        NoteLogicMode::Min => input1.note.min(input2.note),
        NoteLogicMode::Max | NoteLogicMode::Op1 | NoteLogicMode::Op2 => {
            input1.note.max(input2.note)
        }
        NoteLogicMode::RandomInput => {
            if rng.next_range(2) == 0 {
                input1.note
            } else {
                input2.note
            }
        }
        NoteLogicMode::RandomLogic => {
            let mode = match rng.next_range(2) {
                0 => NoteLogicMode::Min,
                _ => NoteLogicMode::Max,
            };
            eval_note_logic(mode, input1, input2, rng)
        }
    }
}

/// Note voltage of a logic step given the note produced by the note logic.
#[allow(clippy::too_many_arguments)]
fn eval_step_note(
    step: &LogicStep,
    logic_note: i32,
    probability_bias: i32,
    scale: &Scale,
    root_note: i32,
    octave: i32,
    transpose: i32,
    rng: &mut TrackRng,
    use_variation: bool,
) -> f32 {
    let scale = if step.bypass_scale() {
        Scale::get(0)
    } else {
        scale
    };
    let mut note = logic_note + octave * scale.notes_per_octave() + transpose;
    let probability = (step.note_variation_probability() + probability_bias)
        .clamp(-1, NoteVariationProbability::MAX);
    if use_variation
        && (rng.next_range(NoteVariationProbability::RANGE as u32) as i32) <= probability
    {
        let range = step.note_variation_range();
        let mut offset = if range == 0 {
            0
        } else {
            rng.next_range(range.unsigned_abs() + 1) as i32
        };
        if range < 0 {
            offset = -offset;
        }
        note = Note::clamp(note + offset);
    }
    scale.note_to_volts(note)
        + if scale.is_chromatic() {
            root_note as f32 / 12.0
        } else {
            0.0
        }
}

pub struct LogicEngine {
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
}

impl LogicEngine {
    pub fn new(track_index: usize) -> LogicEngine {
        LogicEngine {
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
        let Some(track) = project.track(track_index).logic_track() else {
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
        let measure_divisor = project.time_signature().measure_divisor();
        let state = project.play_state().track_state(track_index);
        let mute = state.mute();
        let fill = if fill_muted || !mute { state.fill() } else { false };

        if let Some(link) = link {
            self.link_data = link.clone();
            self.sequence_state = link.sequence_state.clone();

            if link.relative_tick % link.divisor.max(1) == 0 {
                self.record_step(tick, link.divisor.max(1), project, recording, selected);
                self.trigger_step(tick, link.divisor.max(1), project, false);
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
                        let absolute_step = relative_tick / divisor;
                        self.sequence_state.advance_aligned(
                            absolute_step,
                            run_mode,
                            first_step,
                            last_step,
                            &mut self.rng,
                        );
                        if absolute_step == 0 || absolute_step >= project.record_delay() + 1 {
                            self.record_step(tick, divisor, project, recording, selected);
                        }
                        self.trigger_step(tick, divisor, project, false);

                        // the next step is always pre-scheduled one window
                        // ahead so negative gate offsets can play early;
                        // push-replace collapses the duplicate
                        self.sequence_state.calculate_next_step_aligned(
                            (relative_tick + divisor) / divisor,
                            run_mode,
                            first_step,
                            last_step,
                            &mut self.rng,
                        );
                        self.trigger_step(tick + divisor, divisor, project, true);
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
                            self.sequence_state.calculate_next_step_free(
                                run_mode,
                                first_step,
                                last_step,
                                &mut self.rng,
                            );
                        }
                        self.record_step(tick, divisor, project, recording, selected);

                        let step_index = self.sequence_state.step();
                        if step_index >= 0 {
                            let gate_offset = self.step_gate_offset(project, pattern, step_index);
                            let stage_repeats =
                                self.step_stage_repeats(project, pattern, step_index);
                            let is_last_stage_step =
                                stage_repeats + 1 - self.current_stage_repeat as i32 <= 0;

                            if gate_offset >= 0 {
                                self.trigger_step(tick, divisor, project, false);
                            }
                            if !is_last_stage_step && gate_offset < 0 {
                                self.trigger_step(tick + divisor, divisor, project, false);
                            }
                            if is_last_stage_step
                                && self.step_gate_offset(
                                    project,
                                    pattern,
                                    self.sequence_state.next_step(),
                                ) < 0
                            {
                                self.trigger_step(tick + divisor, divisor, project, true);
                            }

                            if is_last_stage_step {
                                self.current_stage_repeat = 1;
                            } else {
                                self.current_stage_repeat += 1;
                            }
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
        let Some(track) = project.track(track_index).logic_track() else {
            return;
        };
        let sequence = track.sequence(pattern);
        let scale = sequence.selected_scale(project.scale());
        let root_note = sequence.selected_root_note(project.root_note());
        let octave = track.octave();
        let transpose = track.transpose();
        let slide_time = track.slide_time();

        let step_monitoring = !running && self.monitor_step_index >= 0;
        let monitor_mode = project.monitor_mode();
        let live_monitoring = monitor_mode == MonitorMode::Always
            || (monitor_mode == MonitorMode::Stopped && !running);

        if step_monitoring {
            let step = *sequence.step(self.monitor_step_index as usize);
            let input1 = read_input_step(project, track.input_track1(), self.monitor_step_index);
            let input2 = read_input_step(project, track.input_track2(), self.monitor_step_index);
            let note = eval_note_logic(step.note_logic(), input1, input2, &mut self.rng);
            let cv = eval_step_note(
                &step,
                note,
                0,
                scale,
                root_note,
                octave,
                transpose,
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

    fn step_gate_offset(&self, project: &Project, pattern: usize, step_index: i32) -> i32 {
        if step_index < 0 {
            return 0;
        }
        project
            .track(self.track_index)
            .logic_track()
            .map(|track| track.sequence(pattern).step(step_index as usize).gate_offset())
            .unwrap_or(0)
    }

    fn step_stage_repeats(&self, project: &Project, pattern: usize, step_index: i32) -> i32 {
        if step_index < 0 {
            return 0;
        }
        project
            .track(self.track_index)
            .logic_track()
            .map(|track| track.sequence(pattern).step(step_index as usize).stage_repeats())
            .unwrap_or(0)
    }

    fn trigger_step(
        &mut self,
        tick: u32,
        divisor: u32,
        project: &mut Project,
        for_next_step: bool,
    ) {
        let track_index = self.track_index;
        let pattern = active_pattern(project, track_index);
        let state = project.play_state().track_state(track_index);
        let mute = state.mute();
        let state_fill = state.fill();
        let fill_amount = state.fill_amount();

        let Some(track) = project.track(track_index).logic_track() else {
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

        let sequence = track.sequence(pattern);
        let eval_pattern = if use_fill_sequence {
            (pattern + 1).min(PATTERN_COUNT - 1)
        } else {
            pattern
        };
        let eval_sequence = track.sequence(eval_pattern);

        self.current_step = rotate_step(
            self.sequence_state.step(),
            sequence.first_step(),
            sequence.last_step(),
            track.rotate(),
        );
        let step_index = if for_next_step {
            self.sequence_state.next_step()
        } else {
            self.current_step
        };
        if step_index < 0 {
            return;
        }

        let step = *eval_sequence.step(step_index as usize);
        let scale = eval_sequence.selected_scale(project.scale());
        let root_note = eval_sequence.selected_root_note(project.root_note());
        let octave = track.octave();
        let transpose = track.transpose();
        let gate_probability_bias = track.gate_probability_bias();
        let retrigger_probability_bias = track.retrigger_probability_bias();
        let length_bias = track.length_bias();
        let note_probability_bias = track.note_probability_bias();
        let cv_update_always = track.cv_update_mode() == CvUpdateMode::Always;
        let input_track1 = track.input_track1();
        let input_track2 = track.input_track2();
        let swing = project.swing();

        let input1 = read_input_step(project, input_track1, step_index);
        let input2 = read_input_step(project, input_track2, step_index);

        // mirror the evaluated inputs for the editor
        if let Some(track) = project.track_mut(track_index).logic_track_mut() {
            let mirror = track.sequence_mut(eval_pattern).step_mut(step_index as usize);
            mirror.set_input_gate1(input1.gate);
            mirror.set_input_gate2(input2.gate);
        }

        let logic_gate =
            eval_gate_logic(step.gate_logic(), step.gate(), input1, input2, &mut self.rng);

        let step_tick = step_tick_with_offset(tick, divisor, step.gate_offset());

        // the logic result replaces the step's own gate before the
        // probability roll
        let mut gated_step = step;
        gated_step.set_gate(logic_gate);

        let mut step_gate =
            eval_step_gate(&gated_step, gate_probability_bias, &mut self.rng) || use_fill_gates;
        if step_gate {
            step_gate = step.condition().evaluate(
                self.sequence_state.iteration(),
                use_fill_condition,
                &mut self.prev_condition,
            );
        }
        step_gate = step_gate && eval_stage_repeat(&step, self.current_stage_repeat, &mut self.rng);

        if step_gate {
            let step_length = (divisor
                * eval_step_length(&step, length_bias, &mut self.rng) as u32)
                / Length::RANGE as u32;
            let retrigger = eval_step_retrigger(&step, retrigger_probability_bias, &mut self.rng);
            schedule_gates(
                &mut self.gate_queue,
                step_tick,
                divisor,
                step_length,
                retrigger,
                swing,
            );
        }

        if step_gate || cv_update_always {
            let logic_note = eval_note_logic(step.note_logic(), input1, input2, &mut self.rng);
            let cv = eval_step_note(
                &step,
                logic_note,
                note_probability_bias,
                scale,
                root_note,
                octave,
                transpose,
                &mut self.rng,
                true,
            );
            self.cv_queue.push(CvEvent {
                tick: apply_swing(step_tick, swing),
                cv,
                slide: step.slide(),
            });
        }
    }

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

        let step_start = tick.saturating_sub(divisor);
        let step_end = tick;
        let margin = divisor / 2;

        let mut recorded: Option<u32> = None;
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
                recorded = Some(length);
            } else if note_start < step_start && note_end > step_start {
                recorded = Some(note_end.min(step_end) - step_start);
            }
        }

        let Some(track) = project.track_mut(track_index).logic_track_mut() else {
            return;
        };
        let sequence = track.sequence_mut(pattern);

        if let Some(length_ticks) = recorded {
            let length = ((length_ticks * Length::RANGE as u32) / divisor) as i32;
            let step = sequence.step_mut(prev_step);
            step.set_gate(true);
            step.set_gate_probability(crate::logic_track::GateProbability::MAX);
            step.set_retrigger(0);
            step.set_retrigger_probability(RetriggerProbability::MAX);
            step.set_length(length);
            step.set_length_variation_range(0);
            step.set_length_variation_probability(LengthVariationProbability::MAX);
            step.set_note_variation_range(0);
            step.set_note_variation_probability(NoteVariationProbability::MAX);
            step.set_condition(Condition::Off);
        } else if selected && overwrite {
            sequence.step_mut(prev_step).clear();
            sequence.step_mut(prev_step).set_gate(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(valid: bool, gate: bool, note: i32) -> InputStep {
        InputStep { valid, gate, note }
    }

    #[test]
    fn gate_logic_truth_tables() {
        let mut rng = TrackRng::new(5);
        let cases = [
            (GateLogicMode::One, true, false, true),
            (GateLogicMode::Two, true, false, false),
            (GateLogicMode::And, true, false, false),
            (GateLogicMode::And, true, true, true),
            (GateLogicMode::Or, false, true, true),
            (GateLogicMode::Or, false, false, false),
            (GateLogicMode::Xor, true, false, true),
            (GateLogicMode::Xor, true, true, false),
            (GateLogicMode::Nand, true, true, false),
            (GateLogicMode::Nand, false, true, true),
        ];
        for (mode, gate1, gate2, expected) in cases {
            let result = eval_gate_logic(
                mode,
                false,
                input(true, gate1, 0),
                input(true, gate2, 0),
                &mut rng,
            );
            assert_eq!(expected, result, "{:?} {} {}", mode, gate1, gate2);
        }
    }

    #[test]
    fn invalid_inputs_fall_back_to_step_gate() {
        let mut rng = TrackRng::new(5);
        assert!(eval_gate_logic(
            GateLogicMode::And,
            true,
            input(false, false, 0),
            input(false, false, 0),
            &mut rng
        ));
        assert!(!eval_gate_logic(
            GateLogicMode::Or,
            false,
            input(false, false, 0),
            input(false, false, 0),
            &mut rng
        ));
    }

    #[test]
    fn random_input_picks_one_of_the_inputs() {
        let mut rng = TrackRng::new(5);
        for _ in 0..100 {
            // both inputs high, any pick is high
            assert!(eval_gate_logic(
                GateLogicMode::RandomInput,
                false,
                input(true, true, 0),
                input(true, true, 0),
                &mut rng
            ));
        }
    }

    #[test]
    fn note_logic_min_max_and_reserved_ops() {
        let mut rng = TrackRng::new(5);
        let low = input(true, true, -3);
        let high = input(true, true, 9);
        assert_eq!(-3, eval_note_logic(NoteLogicMode::Min, low, high, &mut rng));
        assert_eq!(9, eval_note_logic(NoteLogicMode::Max, low, high, &mut rng));
        assert_eq!(-3, eval_note_logic(NoteLogicMode::One, low, high, &mut rng));
        assert_eq!(9, eval_note_logic(NoteLogicMode::Two, low, high, &mut rng));
        // reserved operators default to Max
        assert_eq!(9, eval_note_logic(NoteLogicMode::Op1, low, high, &mut rng));
        assert_eq!(9, eval_note_logic(NoteLogicMode::Op2, low, high, &mut rng));
    }

    #[test]
    fn random_logic_is_deterministic_for_a_seeded_rng() {
        let mut a = TrackRng::new(42);
        let mut b = TrackRng::new(42);
        for _ in 0..50 {
            let lhs = eval_gate_logic(
                GateLogicMode::RandomLogic,
                false,
                input(true, true, 0),
                input(true, false, 0),
                &mut a,
            );
            let rhs = eval_gate_logic(
                GateLogicMode::RandomLogic,
                false,
                input(true, true, 0),
                input(true, false, 0),
                &mut b,
            );
            assert_eq!(lhs, rhs);
        }
    }
}
