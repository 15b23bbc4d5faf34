//! Arp track engine: walks a sorted held-note set in the configured
//! pattern with octave traversal, evaluating each selected note's owning
//! pitch-table step like a note step.

use embedded_midi::MidiMessage;
use heapless::Vec;

use crate::{
    arp_track::{
        ArpStep, Length, LengthVariationProbability, Note, NoteVariationProbability,
        RetriggerProbability, PITCH_TABLE_SIZE,
    },
    arpeggiator::ArpMode,
    divisor_ticks,
    engine::{
        active_pattern, eval_step_gate, eval_step_length, eval_step_retrigger,
        note_from_midi_note, schedule_gates, step_tick_with_offset, EngineOutput, MidiOutput,
        TickResult, TrackLinkData,
    },
    event_queue::{CvEvent, GateEvent, SortedQueue},
    groove::apply_swing,
    project::Project,
    record_history::{RecordHistory, RecordKind},
    rng::TrackRng,
    scale::Scale,
    sequence_state::SequenceState,
    step_recorder::StepRecorder,
    types::{Condition, CvUpdateMode, FillMode, MonitorMode, PlayMode, RecordMode},
    PATTERN_COUNT, STEP_COUNT,
};

pub const MAX_NOTES: usize = 12;

/// Where a held note came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteOrigin {
    Sequencer,
    Midi,
}

/// One held note: pitch-ordered position in the set, insertion order stamp
/// and the pitch-table step that owns it.
#[derive(Clone, Copy, Debug)]
struct HeldNote {
    note: i32,
    order: u32,
    index: u8,
    octave: i8,
    origin: NoteOrigin,
}

/// Note voltage of an arp step, with the arp's traversal octave folded
/// into the transposition.
#[allow(clippy::too_many_arguments)]
fn eval_step_note(
    step: &ArpStep,
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

pub struct ArpEngine {
    track_index: usize,
    sequence_state: SequenceState,
    free_relative_tick: u32,
    current_step: i32,
    prev_condition: bool,
    monitor_step_index: i32,
    output: EngineOutput,
    gate_queue: SortedQueue<GateEvent, 16>,
    cv_queue: SortedQueue<CvEvent, 16>,
    record_history: RecordHistory,
    step_recorder: StepRecorder,
    link_data: TrackLinkData,
    rng: TrackRng,

    notes: Vec<HeldNote, MAX_NOTES>,
    note_hold_count: usize,
    step_index: i32,
    note_index: usize,
    note_order: u32,
    octave: i32,
    octave_direction: i32,
}

impl ArpEngine {
    pub fn new(track_index: usize) -> ArpEngine {
        ArpEngine {
            track_index,
            sequence_state: SequenceState::new(),
            free_relative_tick: 0,
            current_step: -1,
            prev_condition: false,
            monitor_step_index: -1,
            output: EngineOutput::new(),
            gate_queue: SortedQueue::new(),
            cv_queue: SortedQueue::new(),
            record_history: RecordHistory::new(),
            step_recorder: StepRecorder::new(),
            link_data: TrackLinkData::default(),
            rng: TrackRng::for_track(track_index),
            notes: Vec::new(),
            note_hold_count: 0,
            step_index: -1,
            note_index: 0,
            note_order: 0,
            octave: 0,
            octave_direction: 0,
        }
    }

    pub fn reset(&mut self) {
        self.free_relative_tick = 0;
        self.sequence_state.reset();
        self.current_step = -1;
        self.prev_condition = false;
        self.output.reset_playback();
        self.gate_queue.clear();
        self.cv_queue.clear();
        self.step_index = -1;
        self.note_index = 0;
        self.note_order = 0;
        self.octave = 0;
        self.octave_direction = 0;
        self.note_hold_count = 0;
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

    pub fn current_index(&self) -> i32 {
        self.step_index
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
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

    /// Insert a note into the pitch-ordered held-note set. Duplicate
    /// pitches and a full set are ignored.
    pub fn add_note(&mut self, note: i32, index: usize, origin: NoteOrigin, octave: i32) {
        if self.notes.is_full() {
            return;
        }
        let position = self
            .notes
            .iter()
            .position(|held| note <= held.note)
            .unwrap_or(self.notes.len());
        if self
            .notes
            .get(position)
            .map(|held| held.note == note)
            .unwrap_or(false)
        {
            return;
        }
        let _ = self.notes.insert(
            position,
            HeldNote {
                note,
                order: self.note_order,
                index: index.min(PITCH_TABLE_SIZE - 1) as u8,
                octave: octave.clamp(-10, 10) as i8,
                origin,
            },
        );
        self.note_order = self.note_order.wrapping_add(1);
        self.note_hold_count += 1;
    }

    /// Remove a note from the set. Removal is unconditional; hold mode is
    /// tracked through the hold count for the UI.
    pub fn remove_note(&mut self, note: i32) {
        if let Some(position) = self.notes.iter().position(|held| held.note == note) {
            self.note_hold_count = self.note_hold_count.saturating_sub(1);
            self.notes.remove(position);
        }
    }

    pub fn clear_notes(&mut self) {
        self.notes.clear();
        self.note_hold_count = 0;
    }

    pub fn add_midi_note(&mut self, midi_note: u8) {
        let index = (midi_note % 12) as usize;
        let octave = midi_note as i32 / 12 - 5;
        self.add_note(midi_note as i32, index, NoteOrigin::Midi, octave);
    }

    pub fn remove_midi_note(&mut self, midi_note: u8) {
        self.remove_note(midi_note as i32);
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
        let Some(track) = project.track(track_index).arp_track() else {
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
                let absolute_step = link.relative_tick / link.divisor.max(1);
                if absolute_step == 0 || absolute_step >= project.record_delay() + 1 {
                    self.record_step(tick + 1, link.divisor.max(1), project, recording, selected);
                }
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
                            self.record_step(tick + 1, divisor, project, recording, selected);
                        }
                        self.trigger_step(tick, divisor, project, false);

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
                        self.record_step(tick, divisor, project, recording, selected);

                        let gate_offset =
                            self.step_gate_offset(project, pattern, self.sequence_state.step());
                        if gate_offset >= 0 {
                            self.trigger_step(tick, divisor, project, false);
                        }
                        if self.step_gate_offset(
                            project,
                            pattern,
                            self.sequence_state.next_step(),
                        ) < 0
                        {
                            self.trigger_step(tick + divisor, divisor, project, true);
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
        let Some(track) = project.track(track_index).arp_track() else {
            return;
        };
        let sequence = track.sequence(pattern);
        let scale = sequence.selected_scale(project.scale());
        let root_note = sequence.selected_root_note(project.root_note());
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
                self.octave,
                transpose,
                &mut self.rng,
                false,
            );
            self.output.set_override(cv, track_index, midi);
        } else if live_monitoring && self.record_history.is_note_active() {
            if let Some(midi_note) = self.record_history.active_note() {
                let note = note_from_midi_note(scale, root_note, midi_note)
                    + track.octave() * scale.notes_per_octave()
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
            .arp_track()
            .map(|track| {
                track
                    .sequence(pattern)
                    .step(step_index.clamp(0, STEP_COUNT as i32 - 1) as usize)
                    .gate_offset()
            })
            .unwrap_or(0)
    }

    /// Index of the held note with the given insertion-order rank.
    fn note_index_from_order(&self, order: usize) -> usize {
        for note_index in 0..self.notes.len() {
            let mut current_order = 0;
            for other in 0..self.notes.len() {
                if self.notes[other].order < self.notes[note_index].order {
                    current_order += 1;
                }
            }
            if current_order == order {
                return note_index;
            }
        }
        0
    }

    /// Pick the next held note according to the arp mode.
    fn advance_step(&mut self, mode: ArpMode) {
        let note_count = self.notes.len() as i32;
        if note_count == 0 {
            return;
        }
        self.note_index = 0;

        let mut note_index: i32 = 0;
        match mode {
            ArpMode::PlayOrder => {
                self.step_index = (self.step_index + 1) % note_count;
                note_index = self.note_index_from_order(self.step_index as usize) as i32;
            }
            ArpMode::Up | ArpMode::Down => {
                self.step_index = (self.step_index + 1) % note_count;
                note_index = self.step_index;
            }
            ArpMode::UpDown | ArpMode::DownUp => {
                if note_count >= 2 {
                    let period = (note_count - 1) * 2;
                    self.step_index = (self.step_index + 1) % period;
                    note_index = self.step_index % (note_count - 1);
                    if self.step_index >= note_count - 1 {
                        note_index = note_count - note_index - 1;
                    }
                } else {
                    self.step_index = 0;
                }
            }
            ArpMode::UpAndDown | ArpMode::DownAndUp => {
                self.step_index = (self.step_index + 1) % (note_count * 2);
                note_index = self.step_index % note_count;
                if self.step_index >= note_count {
                    note_index = note_count - note_index - 1;
                }
            }
            ArpMode::Converge => {
                self.step_index = (self.step_index + 1) % note_count;
                note_index = self.step_index / 2;
                if self.step_index % 2 == 1 {
                    note_index = note_count - note_index - 1;
                }
            }
            ArpMode::Diverge => {
                self.step_index = (self.step_index + 1) % note_count;
                let half = self.step_index / 2;
                note_index = note_count / 2
                    + if self.step_index % 2 == 0 {
                        half
                    } else {
                        -half - 1
                    };
            }
            ArpMode::Random => {
                self.step_index = (self.step_index + 1) % note_count;
                note_index = self.rng.next_range(note_count as u32) as i32;
            }
        }

        // descending modes mirror the pick
        match mode {
            ArpMode::Down | ArpMode::DownUp | ArpMode::DownAndUp => {
                note_index = note_count - note_index - 1;
            }
            _ => {}
        }

        self.note_index = note_index.clamp(0, note_count - 1) as usize;
    }

    /// Step the octave offset when the walk wraps. Magnitudes above 5
    /// traverse in both directions over `|octaves| - 5` octaves.
    fn advance_octave(&mut self, octaves: i32) {
        let mut octaves = octaves;
        let mut both_directions = false;
        if octaves > 5 {
            octaves -= 5;
            both_directions = true;
        }
        if octaves < -5 {
            octaves += 5;
            both_directions = true;
        }

        if octaves == 0 {
            self.octave = 0;
            self.octave_direction = 0;
        } else if octaves > 0 {
            if self.octave_direction == 0 {
                self.octave_direction = 1;
            } else {
                self.octave += self.octave_direction;
                if self.octave > octaves {
                    self.octave = if both_directions { octaves } else { 0 };
                    self.octave_direction = if both_directions { -1 } else { 1 };
                } else if self.octave < 0 {
                    self.octave = 0;
                    self.octave_direction = 1;
                }
            }
        } else {
            if self.octave_direction == 0 {
                self.octave_direction = -1;
            } else {
                self.octave += self.octave_direction;
                if self.octave < octaves {
                    self.octave = if both_directions { octaves } else { 0 };
                    self.octave_direction = if both_directions { 1 } else { -1 };
                } else if self.octave > 0 {
                    self.octave = 0;
                    self.octave_direction = -1;
                }
            }
        }
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

        let Some(track) = project.track(track_index).arp_track() else {
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

        let eval_pattern = if use_fill_sequence {
            (pattern + 1).min(PATTERN_COUNT - 1)
        } else {
            pattern
        };

        let arp_mode = track.arpeggiator().mode();
        let arp_octaves = track.arpeggiator().octaves();
        let transpose = track.transpose();
        let gate_probability_bias = track.gate_probability_bias();
        let retrigger_probability_bias = track.retrigger_probability_bias();
        let length_bias = track.length_bias();
        let note_probability_bias = track.note_probability_bias();
        let cv_update_always = track.cv_update_mode() == CvUpdateMode::Always;
        let swing = project.swing();

        let step_index = if for_next_step {
            self.sequence_state.next_step()
        } else {
            self.sequence_state.step()
        };
        if step_index < 0 {
            return;
        }
        if self.notes.is_empty() {
            return;
        }

        self.advance_step(arp_mode);
        if self.step_index == 0 {
            self.advance_octave(arp_octaves);
        }

        let Some(held) = self.notes.get(self.note_index).copied() else {
            return;
        };
        let table_index = held.index as usize;
        self.current_step = table_index as i32;

        let (step, scale, root_note) = {
            let Some(track) = project.track(track_index).arp_track() else {
                return;
            };
            let eval_sequence = track.sequence(eval_pattern);
            (
                *eval_sequence.step(table_index),
                eval_sequence.selected_scale(project.scale()),
                eval_sequence.selected_root_note(project.root_note()),
            )
        };

        let step_tick = step_tick_with_offset(tick, divisor, step.gate_offset());

        let mut step_gate =
            eval_step_gate(&step, gate_probability_bias, &mut self.rng) || use_fill_gates;
        if step_gate {
            step_gate = step.condition().evaluate(
                self.sequence_state.iteration(),
                use_fill_condition,
                &mut self.prev_condition,
            );
        }

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
                self.octave,
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

        let (scale, root_note) = {
            let Some(track) = project.track(track_index).arp_track() else {
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
                recorded = Some((entry.note, note_end.min(step_end) - step_start));
            }
        }

        let Some(track) = project.track_mut(track_index).arp_track_mut() else {
            return;
        };
        let sequence = track.sequence_mut(pattern);

        if let Some((midi_note, length_ticks)) = recorded {
            let length = ((length_ticks * Length::RANGE as u32) / divisor) as i32;
            let step = sequence.step_mut(prev_step.min(STEP_COUNT - 1));
            step.set_gate(true);
            step.set_gate_probability(crate::arp_track::GateProbability::MAX);
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
            sequence.step_mut(prev_step.min(STEP_COUNT - 1)).clear();
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

    fn engine_with_notes(notes: &[i32]) -> ArpEngine {
        let mut engine = ArpEngine::new(0);
        for (position, &note) in notes.iter().enumerate() {
            engine.add_note(note, position, NoteOrigin::Sequencer, 0);
        }
        engine
    }

    fn walk(engine: &mut ArpEngine, mode: ArpMode, count: usize) -> std::vec::Vec<i32> {
        (0..count)
            .map(|_| {
                engine.advance_step(mode);
                engine.notes[engine.note_index].note
            })
            .collect()
    }

    #[test]
    fn held_notes_stay_pitch_ordered() {
        let mut engine = ArpEngine::new(0);
        engine.add_note(64, 4, NoteOrigin::Sequencer, 0);
        engine.add_note(60, 0, NoteOrigin::Sequencer, 0);
        engine.add_note(67, 7, NoteOrigin::Sequencer, 0);
        let pitches: std::vec::Vec<i32> = engine.notes.iter().map(|n| n.note).collect();
        assert_eq!(vec![60, 64, 67], pitches);
        // duplicates are ignored
        engine.add_note(64, 4, NoteOrigin::Midi, 0);
        assert_eq!(3, engine.note_count());
    }

    #[test]
    fn remove_note_keeps_order() {
        let mut engine = engine_with_notes(&[60, 64, 67]);
        engine.remove_note(64);
        let pitches: std::vec::Vec<i32> = engine.notes.iter().map(|n| n.note).collect();
        assert_eq!(vec![60, 67], pitches);
        engine.remove_note(99);
        assert_eq!(2, engine.note_count());
    }

    #[test]
    fn up_mode_ascends_and_wraps() {
        let mut engine = engine_with_notes(&[60, 64, 67]);
        assert_eq!(vec![60, 64, 67, 60, 64, 67], walk(&mut engine, ArpMode::Up, 6));
    }

    #[test]
    fn down_mode_descends() {
        let mut engine = engine_with_notes(&[60, 64, 67]);
        assert_eq!(vec![67, 64, 60, 67], walk(&mut engine, ArpMode::Down, 4));
    }

    #[test]
    fn up_down_does_not_repeat_endpoints() {
        let mut engine = engine_with_notes(&[60, 64, 67]);
        assert_eq!(
            vec![60, 64, 67, 64, 60, 64, 67, 64],
            walk(&mut engine, ArpMode::UpDown, 8)
        );
    }

    #[test]
    fn up_and_down_repeats_endpoints() {
        let mut engine = engine_with_notes(&[60, 64]);
        assert_eq!(
            vec![60, 64, 64, 60, 60, 64],
            walk(&mut engine, ArpMode::UpAndDown, 6)
        );
    }

    #[test]
    fn converge_closes_in_from_the_ends() {
        let mut engine = engine_with_notes(&[60, 62, 64, 67]);
        assert_eq!(
            vec![60, 67, 62, 64],
            walk(&mut engine, ArpMode::Converge, 4)
        );
    }

    #[test]
    fn play_order_follows_insertion_order() {
        let mut engine = ArpEngine::new(0);
        engine.add_note(67, 7, NoteOrigin::Sequencer, 0);
        engine.add_note(60, 0, NoteOrigin::Sequencer, 0);
        engine.add_note(64, 4, NoteOrigin::Sequencer, 0);
        assert_eq!(
            vec![67, 60, 64, 67],
            walk(&mut engine, ArpMode::PlayOrder, 4)
        );
    }

    #[test]
    fn single_direction_octave_traversal() {
        let mut engine = ArpEngine::new(0);
        let mut octaves = std::vec::Vec::new();
        for _ in 0..7 {
            engine.advance_octave(2);
            octaves.push(engine.octave);
        }
        assert_eq!(vec![0, 1, 2, 0, 1, 2, 0], octaves);
    }

    #[test]
    fn both_direction_octave_traversal() {
        let mut engine = ArpEngine::new(0);
        let mut octaves = std::vec::Vec::new();
        // 7 encodes both directions over 2 octaves
        for _ in 0..8 {
            engine.advance_octave(7);
            octaves.push(engine.octave);
        }
        assert_eq!(vec![0, 1, 2, 2, 1, 0, 0, 1], octaves);
    }

    #[test]
    fn zero_octaves_stays_put() {
        let mut engine = ArpEngine::new(0);
        for _ in 0..4 {
            engine.advance_octave(0);
            assert_eq!(0, engine.octave);
        }
    }

    #[test]
    fn arp_track_plays_held_note_through_its_step() {
        let mut project = crate::project::Project::new();
        project.set_track_mode(0, TrackMode::Arp);
        {
            let sequence = project.track_mut(0).arp_track_mut().unwrap().sequence_mut(0);
            let step = sequence.step_mut(0);
            step.set_gate(true);
            step.set_note(4);
        }
        let mut engine = Engine::new(project, NullMidi);
        engine.clock_start();
        if let Some(arp) = engine.track_engine_mut(0).arp_engine_mut() {
            arp.add_note(4, 0, NoteOrigin::Sequencer, 0);
        }
        engine.on_tick(0);
        assert!(engine.track_engine(0).activity());
        assert_eq!(0, engine.track_engine(0).current_step());
        engine.update(0.001);
        assert!((engine.track_engine(0).cv_output() - 4.0 / 12.0).abs() < 1e-5);
    }

    #[test]
    fn no_held_notes_means_silence() {
        let mut project = crate::project::Project::new();
        project.set_track_mode(0, TrackMode::Arp);
        project
            .track_mut(0)
            .arp_track_mut()
            .unwrap()
            .sequence_mut(0)
            .step_mut(0)
            .set_gate(true);
        let mut engine = Engine::new(project, NullMidi);
        engine.clock_start();
        for tick in 0..96 {
            engine.on_tick(tick);
        }
        assert!(!engine.track_engine(0).activity());
    }
}
