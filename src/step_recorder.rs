//! Discrete step-record input handler.
//!
//! In step-record mode each incoming NoteOn writes one step of the note
//! sequence and advances the record cursor through the active window.

use embedded_midi::MidiMessage;

use crate::note_track::{
    LengthVariationProbability, NoteSequence, NoteVariationProbability, RetriggerProbability,
};
use crate::types::Condition;

#[derive(Debug)]
pub struct StepRecorder {
    step_index: i32,
}

impl Default for StepRecorder {
    fn default() -> Self {
        StepRecorder { step_index: 0 }
    }
}

impl StepRecorder {
    pub fn new() -> StepRecorder {
        StepRecorder::default()
    }

    pub fn step_index(&self) -> i32 {
        self.step_index
    }

    pub fn set_step_index(&mut self, step_index: i32) {
        self.step_index = step_index.max(0);
    }

    pub fn start(&mut self, first_step: i32) {
        self.step_index = first_step.max(0);
    }

    /// Record a NoteOn into the cursor step and advance, wrapping inside
    /// the sequence window. `note_from_midi` converts the MIDI note into
    /// the sequence's note space.
    pub fn process(
        &mut self,
        message: &MidiMessage,
        sequence: &mut NoteSequence,
        note_from_midi: impl Fn(u8) -> i32,
    ) {
        let MidiMessage::NoteOn(_, note, velocity) = message else {
            return;
        };
        let velocity: u8 = (*velocity).into();
        if velocity == 0 {
            return;
        }

        let first_step = sequence.first_step();
        let last_step = sequence.last_step();
        if self.step_index < first_step || self.step_index > last_step {
            self.step_index = first_step;
        }

        let midi_note: u8 = (*note).into();
        let step = sequence.step_mut(self.step_index as usize);
        step.set_gate(true);
        step.set_retrigger(0);
        step.set_retrigger_probability(RetriggerProbability::MAX);
        step.set_length_variation_range(0);
        step.set_length_variation_probability(LengthVariationProbability::MAX);
        step.set_note(note_from_midi(midi_note));
        step.set_note_variation_range(0);
        step.set_note_variation_probability(NoteVariationProbability::MAX);
        step.set_condition(Condition::Off);

        self.step_index = if self.step_index >= last_step {
            first_step
        } else {
            self.step_index + 1
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midi_types::{Channel, Note, Value7};

    fn note_on(note: u8) -> MidiMessage {
        let channel: Channel = 0.into();
        let note: Note = note.into();
        let velocity: Value7 = 100.into();
        MidiMessage::NoteOn(channel, note, velocity)
    }

    #[test]
    fn records_note_and_advances_cursor() {
        let mut recorder = StepRecorder::new();
        let mut sequence = NoteSequence::new();
        recorder.process(&note_on(62), &mut sequence, |n| n as i32 - 60);
        assert!(sequence.step(0).gate());
        assert_eq!(2, sequence.step(0).note());
        assert_eq!(1, recorder.step_index());
    }

    #[test]
    fn cursor_wraps_at_window_end() {
        let mut recorder = StepRecorder::new();
        let mut sequence = NoteSequence::new();
        sequence.set_last_step(1, false);
        recorder.process(&note_on(60), &mut sequence, |n| n as i32 - 60);
        recorder.process(&note_on(61), &mut sequence, |n| n as i32 - 60);
        assert_eq!(0, recorder.step_index());
        recorder.process(&note_on(63), &mut sequence, |n| n as i32 - 60);
        assert_eq!(3, sequence.step(0).note());
    }

    #[test]
    fn ignores_non_note_on_messages() {
        let mut recorder = StepRecorder::new();
        let mut sequence = NoteSequence::new();
        let channel: Channel = 0.into();
        let note: Note = 60.into();
        recorder.process(
            &MidiMessage::NoteOff(channel, note, 0.into()),
            &mut sequence,
            |n| n as i32,
        );
        assert!(!sequence.step(0).gate());
        assert_eq!(0, recorder.step_index());
    }
}
