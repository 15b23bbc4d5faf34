//! Ring buffer of recent MIDI note events, used for live recording and
//! monitoring. Each engine owns one and feeds it from `monitor_midi`.

use embedded_midi::MidiMessage;
use heapless::Vec;

pub const RECORD_HISTORY_SIZE: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    NoteOn,
    NoteOff,
}

#[derive(Clone, Copy, Debug)]
pub struct RecordEntry {
    pub tick: u32,
    pub kind: RecordKind,
    pub note: u8,
    pub velocity: u8,
}

#[derive(Debug, Default)]
pub struct RecordHistory {
    entries: Vec<RecordEntry, RECORD_HISTORY_SIZE>,
    active_notes: Vec<u8, RECORD_HISTORY_SIZE>,
}

impl RecordHistory {
    pub fn new() -> RecordHistory {
        RecordHistory::default()
    }

    /// Append the note content of a MIDI message; other messages are
    /// ignored. A NoteOn with velocity zero is a NoteOff.
    pub fn write(&mut self, tick: u32, message: &MidiMessage) {
        match message {
            MidiMessage::NoteOn(_, note, velocity) => {
                let note: u8 = (*note).into();
                let velocity: u8 = (*velocity).into();
                if velocity == 0 {
                    self.write_entry(tick, RecordKind::NoteOff, note, 0);
                } else {
                    self.write_entry(tick, RecordKind::NoteOn, note, velocity);
                }
            }
            MidiMessage::NoteOff(_, note, velocity) => {
                self.write_entry(tick, RecordKind::NoteOff, (*note).into(), (*velocity).into());
            }
            _ => {}
        }
    }

    fn write_entry(&mut self, tick: u32, kind: RecordKind, note: u8, velocity: u8) {
        if self.entries.is_full() {
            self.entries.remove(0);
        }
        let _ = self.entries.push(RecordEntry {
            tick,
            kind,
            note,
            velocity,
        });

        match kind {
            RecordKind::NoteOn => {
                if !self.active_notes.contains(&note) {
                    if self.active_notes.is_full() {
                        self.active_notes.remove(0);
                    }
                    let _ = self.active_notes.push(note);
                }
            }
            RecordKind::NoteOff => {
                if let Some(index) = self.active_notes.iter().position(|&n| n == note) {
                    self.active_notes.remove(index);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RecordEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, RecordEntry> {
        self.entries.iter()
    }

    /// Whether any note is currently held.
    pub fn is_note_active(&self) -> bool {
        !self.active_notes.is_empty()
    }

    /// The most recently pressed note still held.
    pub fn active_note(&self) -> Option<u8> {
        self.active_notes.last().copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.active_notes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midi_types::{Channel, Note, Value7};

    fn note_on(note: u8, velocity: u8) -> MidiMessage {
        let channel: Channel = 0.into();
        let note: Note = note.into();
        let velocity: Value7 = velocity.into();
        MidiMessage::NoteOn(channel, note, velocity)
    }

    fn note_off(note: u8) -> MidiMessage {
        let channel: Channel = 0.into();
        let note: Note = note.into();
        MidiMessage::NoteOff(channel, note, 0.into())
    }

    #[test]
    fn write_appends_note_events() {
        let mut history = RecordHistory::new();
        history.write(10, &note_on(60, 100));
        history.write(20, &note_off(60));
        assert_eq!(2, history.len());
        assert_eq!(RecordKind::NoteOn, history.get(0).unwrap().kind);
        assert_eq!(60, history.get(0).unwrap().note);
        assert_eq!(RecordKind::NoteOff, history.get(1).unwrap().kind);
    }

    #[test]
    fn ring_overwrites_oldest() {
        let mut history = RecordHistory::new();
        for i in 0..6 {
            history.write(i as u32, &note_on(60 + i, 100));
        }
        assert_eq!(RECORD_HISTORY_SIZE, history.len());
        assert_eq!(62, history.get(0).unwrap().note);
    }

    #[test]
    fn active_note_follows_held_notes() {
        let mut history = RecordHistory::new();
        assert!(!history.is_note_active());
        history.write(0, &note_on(60, 100));
        history.write(1, &note_on(64, 100));
        assert!(history.is_note_active());
        assert_eq!(Some(64), history.active_note());
        history.write(2, &note_off(64));
        assert_eq!(Some(60), history.active_note());
        history.write(3, &note_off(60));
        assert!(!history.is_note_active());
    }

    #[test]
    fn note_on_with_zero_velocity_is_note_off() {
        let mut history = RecordHistory::new();
        history.write(0, &note_on(60, 100));
        history.write(1, &note_on(60, 0));
        assert!(!history.is_note_active());
        assert_eq!(RecordKind::NoteOff, history.get(1).unwrap().kind);
    }

    #[test]
    fn non_note_messages_are_ignored() {
        let mut history = RecordHistory::new();
        history.write(0, &MidiMessage::TimingClock);
        assert!(history.is_empty());
    }
}
