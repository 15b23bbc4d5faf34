//! Track container: a tagged variant over the four track types plus the
//! track link.

use crate::{
    arp_track::ArpTrack,
    logic_track::LogicTrack,
    note_track::NoteTrack,
    routing::Target,
    stochastic_track::StochasticTrack,
    types::{CvUpdateMode, FillMode, PlayMode},
    TRACK_COUNT,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrackMode {
    #[default]
    Note,
    Stochastic,
    Logic,
    Arp,
}

impl TrackMode {
    pub fn name(self) -> &'static str {
        match self {
            TrackMode::Note => "Note",
            TrackMode::Stochastic => "Stochastic",
            TrackMode::Logic => "Logic",
            TrackMode::Arp => "Arp",
        }
    }
}

#[derive(Clone, Debug)]
pub enum TrackData {
    Note(NoteTrack),
    Stochastic(StochasticTrack),
    Logic(LogicTrack),
    Arp(ArpTrack),
}

/// One of the eight tracks. Changing the mode recreates the contained
/// data; engines dispatch on the tag rather than through virtual calls.
#[derive(Clone, Debug)]
pub struct Track {
    link_track: i8,
    data: TrackData,
}

impl Default for Track {
    fn default() -> Self {
        Track {
            link_track: -1,
            data: TrackData::Note(NoteTrack::default()),
        }
    }
}

impl Track {
    pub fn new(mode: TrackMode) -> Track {
        let mut track = Track::default();
        track.set_mode(mode);
        track
    }

    pub fn clear(&mut self) {
        self.link_track = -1;
        self.set_mode(self.mode());
    }

    pub fn mode(&self) -> TrackMode {
        match self.data {
            TrackData::Note(_) => TrackMode::Note,
            TrackData::Stochastic(_) => TrackMode::Stochastic,
            TrackData::Logic(_) => TrackMode::Logic,
            TrackData::Arp(_) => TrackMode::Arp,
        }
    }

    /// Replace the track data with a fresh instance of the given mode.
    pub fn set_mode(&mut self, mode: TrackMode) {
        self.data = match mode {
            TrackMode::Note => TrackData::Note(NoteTrack::default()),
            TrackMode::Stochastic => TrackData::Stochastic(StochasticTrack::default()),
            TrackMode::Logic => TrackData::Logic(LogicTrack::default()),
            TrackMode::Arp => TrackData::Arp(ArpTrack::default()),
        };
    }

    /// Parent track this one derives its timing from. Only lower-indexed
    /// parents are honored by the engine.
    pub fn link_track(&self) -> Option<usize> {
        (self.link_track >= 0).then_some(self.link_track as usize)
    }

    pub fn set_link_track(&mut self, link_track: Option<usize>) {
        self.link_track = match link_track {
            Some(index) if index < TRACK_COUNT => index as i8,
            _ => -1,
        };
    }

    pub fn data(&self) -> &TrackData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut TrackData {
        &mut self.data
    }

    pub fn note_track(&self) -> Option<&NoteTrack> {
        match &self.data {
            TrackData::Note(track) => Some(track),
            _ => None,
        }
    }

    pub fn note_track_mut(&mut self) -> Option<&mut NoteTrack> {
        match &mut self.data {
            TrackData::Note(track) => Some(track),
            _ => None,
        }
    }

    pub fn stochastic_track(&self) -> Option<&StochasticTrack> {
        match &self.data {
            TrackData::Stochastic(track) => Some(track),
            _ => None,
        }
    }

    pub fn stochastic_track_mut(&mut self) -> Option<&mut StochasticTrack> {
        match &mut self.data {
            TrackData::Stochastic(track) => Some(track),
            _ => None,
        }
    }

    pub fn logic_track(&self) -> Option<&LogicTrack> {
        match &self.data {
            TrackData::Logic(track) => Some(track),
            _ => None,
        }
    }

    pub fn logic_track_mut(&mut self) -> Option<&mut LogicTrack> {
        match &mut self.data {
            TrackData::Logic(track) => Some(track),
            _ => None,
        }
    }

    pub fn arp_track(&self) -> Option<&ArpTrack> {
        match &self.data {
            TrackData::Arp(track) => Some(track),
            _ => None,
        }
    }

    pub fn arp_track_mut(&mut self) -> Option<&mut ArpTrack> {
        match &mut self.data {
            TrackData::Arp(track) => Some(track),
            _ => None,
        }
    }

    // variant-independent settings, for the engine and UI

    pub fn play_mode(&self) -> PlayMode {
        match &self.data {
            TrackData::Note(track) => track.play_mode(),
            TrackData::Stochastic(track) => track.play_mode(),
            TrackData::Logic(track) => track.play_mode(),
            TrackData::Arp(track) => track.play_mode(),
        }
    }

    pub fn fill_mode(&self) -> FillMode {
        match &self.data {
            TrackData::Note(track) => track.fill_mode(),
            TrackData::Stochastic(track) => track.fill_mode(),
            TrackData::Logic(track) => track.fill_mode(),
            TrackData::Arp(track) => track.fill_mode(),
        }
    }

    pub fn fill_muted(&self) -> bool {
        match &self.data {
            TrackData::Note(track) => track.fill_muted(),
            TrackData::Stochastic(track) => track.fill_muted(),
            TrackData::Logic(track) => track.fill_muted(),
            TrackData::Arp(track) => track.fill_muted(),
        }
    }

    pub fn cv_update_mode(&self) -> CvUpdateMode {
        match &self.data {
            TrackData::Note(track) => track.cv_update_mode(),
            TrackData::Stochastic(track) => track.cv_update_mode(),
            TrackData::Logic(track) => track.cv_update_mode(),
            TrackData::Arp(track) => track.cv_update_mode(),
        }
    }

    pub fn slide_time(&self) -> i32 {
        match &self.data {
            TrackData::Note(track) => track.slide_time(),
            TrackData::Stochastic(track) => track.slide_time(),
            TrackData::Logic(track) => track.slide_time(),
            TrackData::Arp(track) => track.slide_time(),
        }
    }

    pub fn clear_pattern(&mut self, pattern: usize) {
        match &mut self.data {
            TrackData::Note(track) => track.sequence_mut(pattern).clear(),
            TrackData::Stochastic(track) => track.sequence_mut(pattern).clear(),
            TrackData::Logic(track) => track.sequence_mut(pattern).clear(),
            TrackData::Arp(track) => track.sequence_mut(pattern).clear(),
        }
    }

    pub fn copy_pattern(&mut self, source: usize, destination: usize) {
        match &mut self.data {
            TrackData::Note(track) => {
                let sequence = track.sequence(source).clone();
                *track.sequence_mut(destination) = sequence;
            }
            TrackData::Stochastic(track) => {
                let sequence = track.sequence(source).clone();
                *track.sequence_mut(destination) = sequence;
            }
            TrackData::Logic(track) => {
                let sequence = track.sequence(source).clone();
                *track.sequence_mut(destination) = sequence;
            }
            TrackData::Arp(track) => {
                let sequence = track.sequence(source).clone();
                *track.sequence_mut(destination) = sequence;
            }
        }
    }

    /// Route a track-level target into the variant data.
    pub fn write_routed(&mut self, target: Target, int_value: i32) {
        match &mut self.data {
            TrackData::Note(track) => track.write_routed(target, int_value),
            TrackData::Stochastic(track) => track.write_routed(target, int_value),
            TrackData::Logic(track) => track.write_routed(target, int_value),
            TrackData::Arp(track) => track.write_routed(target, int_value),
        }
    }

    pub fn clear_routed(&mut self, target: Target) {
        match &mut self.data {
            TrackData::Note(track) => track.clear_routed(target),
            TrackData::Stochastic(track) => track.clear_routed(target),
            TrackData::Logic(track) => track.clear_routed(target),
            TrackData::Arp(track) => track.clear_routed(target),
        }
    }

    /// Route a sequence-level target into the given pattern's sequence.
    pub fn write_routed_sequence(&mut self, target: Target, pattern: usize, int_value: i32) {
        match &mut self.data {
            TrackData::Note(track) => track.sequence_mut(pattern).write_routed(target, int_value),
            TrackData::Stochastic(track) => {
                track.sequence_mut(pattern).write_routed(target, int_value)
            }
            TrackData::Logic(track) => {
                track.sequence_mut(pattern).write_routed(target, int_value)
            }
            TrackData::Arp(track) => track.sequence_mut(pattern).write_routed(target, int_value),
        }
    }

    pub fn clear_routed_sequence(&mut self, target: Target, pattern: usize) {
        match &mut self.data {
            TrackData::Note(track) => track.sequence_mut(pattern).clear_routed(target),
            TrackData::Stochastic(track) => track.sequence_mut(pattern).clear_routed(target),
            TrackData::Logic(track) => track.sequence_mut(pattern).clear_routed(target),
            TrackData::Arp(track) => track.sequence_mut(pattern).clear_routed(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_mode_replaces_track_data() {
        let mut track = Track::default();
        assert_eq!(TrackMode::Note, track.mode());
        track.set_mode(TrackMode::Logic);
        assert_eq!(TrackMode::Logic, track.mode());
        assert!(track.logic_track().is_some());
        assert!(track.note_track().is_none());
    }

    #[test]
    fn link_track_validates_index() {
        let mut track = Track::default();
        assert_eq!(None, track.link_track());
        track.set_link_track(Some(2));
        assert_eq!(Some(2), track.link_track());
        track.set_link_track(Some(TRACK_COUNT));
        assert_eq!(None, track.link_track());
    }

    #[test]
    fn copy_pattern_duplicates_sequence() {
        let mut track = Track::default();
        track
            .note_track_mut()
            .unwrap()
            .sequence_mut(0)
            .step_mut(3)
            .set_gate(true);
        track.copy_pattern(0, 5);
        assert!(track.note_track().unwrap().sequence(5).step(3).gate());
    }

    #[test]
    fn clear_pattern_resets_sequence() {
        let mut track = Track::default();
        track
            .note_track_mut()
            .unwrap()
            .sequence_mut(1)
            .step_mut(0)
            .set_gate(true);
        track.clear_pattern(1);
        assert!(!track.note_track().unwrap().sequence(1).step(0).gate());
    }
}
