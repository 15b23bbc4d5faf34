//! Note track engine: drives a note sequence through probabilities,
//! conditions, retriggers, slides and live recording.

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
    note_track::{
        Length, LengthVariationProbability, Note, NoteStep, NoteVariationProbability,
        RetriggerProbability,
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

/// Note voltage of a step, including transposition and the probabilistic
/// note variation. A step flagged bypass-scale evaluates against the
/// chromatic scale regardless of the sequence scale.
fn eval_step_note(
    step: &NoteStep,
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
    let mut note = step.note() + octave * scale.notes_per_octave() + transpose;
    let probability =
        (step.note_variation_probability() + probability_bias).clamp(-1, NoteVariationProbability::MAX);
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

pub struct NoteEngine {
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

impl NoteEngine {
    pub fn new(track_index: usize) -> NoteEngine {
        NoteEngine {
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

    pub fn current_record_step(&self) -> i32 {
        self.step_recorder.step_index()
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

    /// Route a message into the step recorder; the engine does this when
    /// the project is in step-record mode.
    pub fn step_record_midi(&mut self, message: &MidiMessage, project: &mut Project) {
        let track_index = self.track_index;
        let pattern = active_pattern(project, track_index);
        let (scale, root_note) = {
            let Some(track) = project.track(track_index).note_track() else {
                return;
            };
            let sequence = track.sequence(pattern);
            (
                sequence.selected_scale(project.scale()),
                sequence.selected_root_note(project.root_note()),
            )
        };
        let Some(track) = project.track_mut(track_index).note_track_mut() else {
            return;
        };
        self.step_recorder
            .process(message, track.sequence_mut(pattern), |midi_note| {
                note_from_midi_note(scale, root_note, midi_note)
            });
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
        let Some(track) = project.track(track_index).note_track() else {
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

                        // a negative gate offset plays early, so the next
                        // step must already be scheduled one window ahead
                        if self.step_gate_offset(project, pattern, self.sequence_state.step()) < 0
                        {
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
                            let gate_offset =
                                self.step_gate_offset(project, pattern, step_index);
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
        let Some(track) = project.track(track_index).note_track() else {
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
            let cv = eval_step_note(
                &step,
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
            .note_track()
            .map(|track| track.sequence(pattern).step(step_index as usize).gate_offset())
            .unwrap_or(0)
    }

    fn step_stage_repeats(&self, project: &Project, pattern: usize, step_index: i32) -> i32 {
        if step_index < 0 {
            return 0;
        }
        project
            .track(self.track_index)
            .note_track()
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

        let Some(track) = project.track(track_index).note_track() else {
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
        let swing = project.swing();

        let step_tick = step_tick_with_offset(tick, divisor, step.gate_offset());

        let mut step_gate = eval_step_gate(&step, gate_probability_bias, &mut self.rng)
            || use_fill_gates;
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
            let cv = eval_step_note(
                &step,
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

    /// Write notes recorded over the previous step window into the
    /// previous step, or clear it in overwrite mode when nothing landed.
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
            let Some(track) = project.track(track_index).note_track() else {
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
            let note = entry.note;
            let note_start = entry.tick;
            let note_end = self
                .record_history
                .get(index + 1)
                .map(|next| next.tick)
                .unwrap_or(tick);

            if note_start >= step_start.saturating_sub(margin) && note_start < step_start + margin
            {
                // note on during the step start phase
                let length = if note_end >= step_end {
                    note_end.min(step_end) - step_start
                } else {
                    note_end.saturating_sub(note_start)
                };
                recorded = Some((note, length));
            } else if note_start < step_start && note_end > step_start {
                // note held over from the previous step
                let length = note_end.min(step_end) - step_start;
                recorded = Some((note, length));
            }
        }

        let Some(track) = project.track_mut(track_index).note_track_mut() else {
            return;
        };
        let sequence = track.sequence_mut(pattern);

        if let Some((midi_note, length_ticks)) = recorded {
            let length = ((length_ticks * Length::RANGE as u32) / divisor) as i32;
            let step = sequence.step_mut(prev_step);
            step.set_gate(true);
            step.set_gate_probability(crate::note_track::GateProbability::MAX);
            step.set_retrigger(0);
            step.set_retrigger_probability(RetriggerProbability::MAX);
            step.set_length(length);
            step.set_length_variation_range(0);
            step.set_length_variation_probability(LengthVariationProbability::MAX);
            step.set_note(note_from_midi_note(scale, root_note, midi_note));
            step.set_note_variation_range(0);
            step.set_note_variation_probability(NoteVariationProbability::MAX);
            step.set_condition(Condition::Off);
        } else if selected && overwrite {
            sequence.step_mut(prev_step).clear();
            sequence.step_mut(prev_step).set_gate(false);
        }
    }
}
