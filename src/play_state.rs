//! Live performance state: per-track mute/fill/pattern with request
//! arbitration.
//!
//! Requests are classified by execute type: immediate requests apply on the
//! next tick, latched requests wait for an explicit commit, synced requests
//! apply at the next sync-measure boundary. The engine calls
//! `execute_requests` from the tick path; everything else is driven by the
//! UI thread.

use crate::{PATTERN_COUNT, TRACK_COUNT};

/// Pattern slot used for snapshots, one past the regular patterns.
pub const SNAPSHOT_PATTERN_INDEX: usize = PATTERN_COUNT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteType {
    Immediate,
    Latched,
    Synced,
}

const MUTE: u8 = 1 << 0;
const REQUESTED_MUTE: u8 = 1 << 1;
const FILL: u8 = 1 << 2;
const IMMEDIATE_MUTE_REQUEST: u8 = 1 << 3;
const LATCHED_MUTE_REQUEST: u8 = 1 << 4;
const SYNCED_MUTE_REQUEST: u8 = 1 << 5;
const IMMEDIATE_PATTERN_REQUEST: u8 = 1 << 6;
const LATCHED_PATTERN_REQUEST: u8 = 1 << 7;

#[derive(Clone, Copy, Debug)]
pub struct TrackState {
    flags: u8,
    synced_pattern_request: bool,
    fill_amount: u8,
    pattern: u8,
    requested_pattern: u8,
}

impl Default for TrackState {
    fn default() -> Self {
        TrackState {
            flags: 0,
            synced_pattern_request: false,
            fill_amount: 100,
            pattern: 0,
            requested_pattern: 0,
        }
    }
}

impl TrackState {
    pub fn mute(&self) -> bool {
        self.flags & MUTE != 0
    }

    pub fn requested_mute(&self) -> bool {
        self.flags & REQUESTED_MUTE != 0
    }

    pub fn fill(&self) -> bool {
        self.flags & FILL != 0
    }

    /// Probability in percent that a fill replaces a given step.
    pub fn fill_amount(&self) -> u32 {
        self.fill_amount as u32
    }

    pub fn pattern(&self) -> usize {
        self.pattern as usize
    }

    pub fn requested_pattern(&self) -> usize {
        self.requested_pattern as usize
    }

    pub fn has_mute_request(&self) -> bool {
        self.flags & (IMMEDIATE_MUTE_REQUEST | LATCHED_MUTE_REQUEST | SYNCED_MUTE_REQUEST) != 0
    }

    pub fn has_pattern_request(&self) -> bool {
        self.flags & (IMMEDIATE_PATTERN_REQUEST | LATCHED_PATTERN_REQUEST) != 0
            || self.synced_pattern_request
    }

    fn request_mute(&mut self, mute: bool, execute_type: ExecuteType) {
        self.flags = (self.flags & !REQUESTED_MUTE) | if mute { REQUESTED_MUTE } else { 0 };
        self.flags |= match execute_type {
            ExecuteType::Immediate => IMMEDIATE_MUTE_REQUEST,
            ExecuteType::Latched => LATCHED_MUTE_REQUEST,
            ExecuteType::Synced => SYNCED_MUTE_REQUEST,
        };
    }

    fn request_pattern(&mut self, pattern: usize, execute_type: ExecuteType) {
        self.requested_pattern = pattern.min(PATTERN_COUNT - 1) as u8;
        match execute_type {
            ExecuteType::Immediate => self.flags |= IMMEDIATE_PATTERN_REQUEST,
            ExecuteType::Latched => self.flags |= LATCHED_PATTERN_REQUEST,
            ExecuteType::Synced => self.synced_pattern_request = true,
        }
    }

    fn execute(&mut self, synced: bool) -> bool {
        let mut changed = false;

        let mute_mask = if synced {
            IMMEDIATE_MUTE_REQUEST | SYNCED_MUTE_REQUEST
        } else {
            IMMEDIATE_MUTE_REQUEST
        };
        if self.flags & mute_mask != 0 {
            let mute = self.requested_mute();
            if mute != self.mute() {
                self.flags = (self.flags & !MUTE) | if mute { MUTE } else { 0 };
                changed = true;
            }
            self.flags &= !mute_mask;
        }

        let pattern_immediate = self.flags & IMMEDIATE_PATTERN_REQUEST != 0;
        let pattern_synced = synced && self.synced_pattern_request;
        if pattern_immediate || pattern_synced {
            if self.pattern != self.requested_pattern {
                self.pattern = self.requested_pattern;
                changed = true;
            }
            self.flags &= !IMMEDIATE_PATTERN_REQUEST;
            if pattern_synced {
                self.synced_pattern_request = false;
            }
        }

        changed
    }

    fn promote_latched(&mut self) {
        if self.flags & LATCHED_MUTE_REQUEST != 0 {
            self.flags = (self.flags & !LATCHED_MUTE_REQUEST) | IMMEDIATE_MUTE_REQUEST;
        }
        if self.flags & LATCHED_PATTERN_REQUEST != 0 {
            self.flags = (self.flags & !LATCHED_PATTERN_REQUEST) | IMMEDIATE_PATTERN_REQUEST;
        }
    }

    fn cancel_latched(&mut self) {
        self.flags &= !(LATCHED_MUTE_REQUEST | LATCHED_PATTERN_REQUEST);
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlayState {
    track_states: [TrackState; TRACK_COUNT],
    snapshot_active: bool,
}

impl PlayState {
    pub fn new() -> PlayState {
        PlayState::default()
    }

    pub fn clear(&mut self) {
        *self = PlayState::default();
    }

    pub fn track_state(&self, track_index: usize) -> &TrackState {
        &self.track_states[track_index]
    }

    pub fn mute_track(&mut self, track_index: usize, execute_type: ExecuteType) {
        self.track_states[track_index].request_mute(true, execute_type);
    }

    pub fn unmute_track(&mut self, track_index: usize, execute_type: ExecuteType) {
        self.track_states[track_index].request_mute(false, execute_type);
    }

    pub fn toggle_mute_track(&mut self, track_index: usize, execute_type: ExecuteType) {
        if self.track_states[track_index].mute() {
            self.unmute_track(track_index, execute_type);
        } else {
            self.mute_track(track_index, execute_type);
        }
    }

    pub fn mute_all(&mut self, execute_type: ExecuteType) {
        for track_index in 0..TRACK_COUNT {
            self.mute_track(track_index, execute_type);
        }
    }

    pub fn unmute_all(&mut self, execute_type: ExecuteType) {
        for track_index in 0..TRACK_COUNT {
            self.unmute_track(track_index, execute_type);
        }
    }

    /// Unmute one track and mute the rest.
    pub fn solo_track(&mut self, track_index: usize, execute_type: ExecuteType) {
        for index in 0..TRACK_COUNT {
            if index == track_index {
                self.unmute_track(index, execute_type);
            } else {
                self.mute_track(index, execute_type);
            }
        }
    }

    pub fn fill_track(&mut self, track_index: usize, fill: bool) {
        let flags = &mut self.track_states[track_index].flags;
        *flags = (*flags & !FILL) | if fill { FILL } else { 0 };
    }

    pub fn fill_all(&mut self, fill: bool) {
        for track_index in 0..TRACK_COUNT {
            self.fill_track(track_index, fill);
        }
    }

    pub fn set_fill_amount(&mut self, track_index: usize, amount: u32) {
        self.track_states[track_index].fill_amount = amount.min(100) as u8;
    }

    pub fn select_track_pattern(
        &mut self,
        track_index: usize,
        pattern: usize,
        execute_type: ExecuteType,
    ) {
        self.track_states[track_index].request_pattern(pattern, execute_type);
    }

    pub fn select_pattern(&mut self, pattern: usize, execute_type: ExecuteType) {
        for track_index in 0..TRACK_COUNT {
            self.select_track_pattern(track_index, pattern, execute_type);
        }
    }

    pub fn commit_latched_requests(&mut self) {
        for state in self.track_states.iter_mut() {
            state.promote_latched();
        }
    }

    pub fn cancel_latched_requests(&mut self) {
        for state in self.track_states.iter_mut() {
            state.cancel_latched();
        }
    }

    pub fn has_synced_requests(&self) -> bool {
        self.track_states
            .iter()
            .any(|state| state.flags & SYNCED_MUTE_REQUEST != 0 || state.synced_pattern_request)
    }

    /// Apply pending requests; called from the tick path. Returns a bitmask
    /// of tracks whose pattern or mute changed.
    pub fn execute_requests(&mut self, synced: bool) -> u8 {
        let mut changed = 0u8;
        for (index, state) in self.track_states.iter_mut().enumerate() {
            if state.execute(synced) {
                changed |= 1 << index;
            }
        }
        changed
    }

    // snapshots

    pub fn snapshot_active(&self) -> bool {
        self.snapshot_active
    }

    pub fn set_snapshot_active(&mut self, active: bool) {
        self.snapshot_active = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_mute_applies_on_execute() {
        let mut play_state = PlayState::new();
        play_state.mute_track(0, ExecuteType::Immediate);
        assert!(!play_state.track_state(0).mute());
        let changed = play_state.execute_requests(false);
        assert_eq!(1, changed);
        assert!(play_state.track_state(0).mute());
    }

    #[test]
    fn synced_mute_waits_for_sync_boundary() {
        let mut play_state = PlayState::new();
        play_state.mute_track(2, ExecuteType::Synced);
        assert!(play_state.has_synced_requests());
        play_state.execute_requests(false);
        assert!(!play_state.track_state(2).mute());
        play_state.execute_requests(true);
        assert!(play_state.track_state(2).mute());
        assert!(!play_state.has_synced_requests());
    }

    #[test]
    fn latched_pattern_applies_after_commit() {
        let mut play_state = PlayState::new();
        play_state.select_track_pattern(1, 5, ExecuteType::Latched);
        play_state.execute_requests(true);
        assert_eq!(0, play_state.track_state(1).pattern());
        play_state.commit_latched_requests();
        play_state.execute_requests(false);
        assert_eq!(5, play_state.track_state(1).pattern());
    }

    #[test]
    fn cancel_latched_drops_requests() {
        let mut play_state = PlayState::new();
        play_state.select_track_pattern(1, 5, ExecuteType::Latched);
        play_state.cancel_latched_requests();
        play_state.commit_latched_requests();
        play_state.execute_requests(true);
        assert_eq!(0, play_state.track_state(1).pattern());
    }

    #[test]
    fn solo_mutes_all_other_tracks() {
        let mut play_state = PlayState::new();
        play_state.solo_track(3, ExecuteType::Immediate);
        play_state.execute_requests(false);
        for track_index in 0..TRACK_COUNT {
            assert_eq!(track_index != 3, play_state.track_state(track_index).mute());
        }
    }

    #[test]
    fn pattern_request_clamps_to_pattern_count() {
        let mut play_state = PlayState::new();
        play_state.select_track_pattern(0, 99, ExecuteType::Immediate);
        play_state.execute_requests(false);
        assert_eq!(PATTERN_COUNT - 1, play_state.track_state(0).pattern());
    }

    #[test]
    fn fill_is_immediate_and_reversible() {
        let mut play_state = PlayState::new();
        play_state.fill_track(4, true);
        assert!(play_state.track_state(4).fill());
        assert_eq!(100, play_state.track_state(4).fill_amount());
        play_state.set_fill_amount(4, 30);
        assert_eq!(30, play_state.track_state(4).fill_amount());
        play_state.fill_track(4, false);
        assert!(!play_state.track_state(4).fill());
    }
}
