//! Project: the top of the data model. Owns the eight tracks, the global
//! playback parameters, the play state and the routing table.

use heapless::{Deque, String};

use crate::{
    play_state::PlayState,
    routing::{Routing, Target},
    scale::Scale,
    track::{Track, TrackMode},
    types::{MonitorMode, RecordMode, TimeSignature},
    CHANNEL_COUNT, PATTERN_COUNT, STEP_COUNT, TRACK_COUNT,
};

/// Model events the UI can subscribe to. Implemented as a bounded
/// drop-oldest queue the UI drains; the core never subscribes upward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectEvent {
    ProjectCleared,
    TrackModeChanged(u8),
    SelectedTrackIndexChanged,
    SelectedPatternIndexChanged,
}

const EVENT_QUEUE_SIZE: usize = 8;

#[derive(Debug, Default)]
struct Observable {
    events: Deque<ProjectEvent, EVENT_QUEUE_SIZE>,
}

impl Observable {
    fn notify(&mut self, event: ProjectEvent) {
        if self.events.is_full() {
            self.events.pop_front();
        }
        let _ = self.events.push_back(event);
    }

    fn poll(&mut self) -> Option<ProjectEvent> {
        self.events.pop_front()
    }
}

pub struct Project {
    name: String<16>,
    tempo: f32,
    routed_tempo: Option<f32>,
    swing: u8,
    routed_swing: Option<u8>,
    time_signature: TimeSignature,
    sync_measure: u8,
    scale: u8,
    root_note: u8,
    record_mode: RecordMode,
    monitor_mode: MonitorMode,
    steps_to_stop: u8,
    record_delay: u8,
    reset_cv_on_stop: bool,
    tracks: [Track; TRACK_COUNT],
    cv_output_tracks: [u8; CHANNEL_COUNT],
    gate_output_tracks: [u8; CHANNEL_COUNT],
    selected_track_index: usize,
    selected_pattern_index: usize,
    play_state: PlayState,
    routing: Routing,
    observable: Observable,
}

impl Default for Project {
    fn default() -> Self {
        let mut project = Project {
            name: String::new(),
            tempo: 120.0,
            routed_tempo: None,
            swing: 50,
            routed_swing: None,
            time_signature: TimeSignature::default(),
            sync_measure: 1,
            scale: 0,
            root_note: 0,
            record_mode: RecordMode::Overdub,
            monitor_mode: MonitorMode::Always,
            steps_to_stop: 0,
            record_delay: 0,
            reset_cv_on_stop: false,
            tracks: core::array::from_fn(|_| Track::default()),
            cv_output_tracks: [0; CHANNEL_COUNT],
            gate_output_tracks: [0; CHANNEL_COUNT],
            selected_track_index: 0,
            selected_pattern_index: 0,
            play_state: PlayState::new(),
            routing: Routing::new(),
            observable: Observable::default(),
        };
        // default patching: channel n carries track n
        for channel in 0..CHANNEL_COUNT {
            project.cv_output_tracks[channel] = channel as u8;
            project.gate_output_tracks[channel] = channel as u8;
        }
        project
    }
}

impl Project {
    pub fn new() -> Project {
        Project::default()
    }

    pub fn clear(&mut self) {
        *self = Project::default();
        self.observable.notify(ProjectEvent::ProjectCleared);
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name.clear();
        for c in name.chars().take(16) {
            let _ = self.name.push(c);
        }
    }

    // tempo

    pub fn tempo(&self) -> f32 {
        self.routed_tempo.unwrap_or(self.tempo)
    }

    pub fn set_tempo(&mut self, tempo: f32, routed: bool) {
        let tempo = tempo.clamp(1.0, 1000.0);
        if routed {
            self.routed_tempo = Some(tempo);
        } else {
            self.tempo = tempo;
        }
    }

    // swing

    pub fn swing(&self) -> i32 {
        self.routed_swing.unwrap_or(self.swing) as i32
    }

    pub fn set_swing(&mut self, swing: i32, routed: bool) {
        let swing = swing.clamp(50, 75) as u8;
        if routed {
            self.routed_swing = Some(swing);
        } else {
            self.swing = swing;
        }
    }

    // time signature / sync measure

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
    }

    pub fn sync_measure(&self) -> u32 {
        self.sync_measure as u32
    }

    pub fn set_sync_measure(&mut self, sync_measure: i32) {
        self.sync_measure = sync_measure.clamp(1, 128) as u8;
    }

    /// Ticks between sync points for synced play-state requests.
    pub fn sync_divisor(&self) -> u32 {
        self.sync_measure as u32 * self.time_signature.measure_divisor()
    }

    // global scale / root note

    pub fn scale(&self) -> i32 {
        self.scale as i32
    }

    pub fn set_scale(&mut self, scale: i32) {
        self.scale = scale.clamp(0, Scale::COUNT as i32 - 1) as u8;
    }

    pub fn selected_scale(&self) -> &'static Scale {
        Scale::get(self.scale())
    }

    pub fn root_note(&self) -> i32 {
        self.root_note as i32
    }

    pub fn set_root_note(&mut self, root_note: i32) {
        self.root_note = root_note.clamp(0, 11) as u8;
    }

    // record / monitor

    pub fn record_mode(&self) -> RecordMode {
        self.record_mode
    }

    pub fn set_record_mode(&mut self, record_mode: RecordMode) {
        self.record_mode = record_mode;
    }

    pub fn monitor_mode(&self) -> MonitorMode {
        self.monitor_mode
    }

    pub fn set_monitor_mode(&mut self, monitor_mode: MonitorMode) {
        self.monitor_mode = monitor_mode;
    }

    /// Stop the clock after this many steps; zero disables.
    pub fn steps_to_stop(&self) -> u32 {
        self.steps_to_stop as u32
    }

    pub fn set_steps_to_stop(&mut self, steps: i32) {
        self.steps_to_stop = steps.clamp(0, STEP_COUNT as i32) as u8;
    }

    /// Suppress live recording for this many steps after a restart.
    pub fn record_delay(&self) -> u32 {
        self.record_delay as u32
    }

    pub fn set_record_delay(&mut self, steps: i32) {
        self.record_delay = steps.clamp(0, STEP_COUNT as i32) as u8;
    }

    pub fn reset_cv_on_stop(&self) -> bool {
        self.reset_cv_on_stop
    }

    pub fn set_reset_cv_on_stop(&mut self, enabled: bool) {
        self.reset_cv_on_stop = enabled;
    }

    // tracks

    pub fn track(&self, index: usize) -> &Track {
        &self.tracks[index]
    }

    pub fn track_mut(&mut self, index: usize) -> &mut Track {
        &mut self.tracks[index]
    }

    pub fn tracks(&self) -> &[Track; TRACK_COUNT] {
        &self.tracks
    }

    /// Switch a track's mode, recreating its data. Requires the engine to
    /// rebuild the corresponding track engine (it observes the event).
    pub fn set_track_mode(&mut self, track_index: usize, mode: TrackMode) {
        if self.tracks[track_index].mode() != mode {
            self.tracks[track_index].set_mode(mode);
            self.observable
                .notify(ProjectEvent::TrackModeChanged(track_index as u8));
        }
    }

    // output routing

    pub fn cv_output_track(&self, channel: usize) -> usize {
        self.cv_output_tracks[channel] as usize
    }

    pub fn set_cv_output_track(&mut self, channel: usize, track_index: usize) {
        self.cv_output_tracks[channel] = track_index.min(TRACK_COUNT - 1) as u8;
    }

    pub fn gate_output_track(&self, channel: usize) -> usize {
        self.gate_output_tracks[channel] as usize
    }

    pub fn set_gate_output_track(&mut self, channel: usize, track_index: usize) {
        self.gate_output_tracks[channel] = track_index.min(TRACK_COUNT - 1) as u8;
    }

    // selection

    pub fn selected_track_index(&self) -> usize {
        self.selected_track_index
    }

    pub fn set_selected_track_index(&mut self, index: usize) {
        let index = index.min(TRACK_COUNT - 1);
        if index != self.selected_track_index {
            self.selected_track_index = index;
            self.observable
                .notify(ProjectEvent::SelectedTrackIndexChanged);
        }
    }

    pub fn selected_pattern_index(&self) -> usize {
        self.selected_pattern_index
    }

    pub fn set_selected_pattern_index(&mut self, index: usize) {
        let index = index.min(PATTERN_COUNT - 1);
        if index != self.selected_pattern_index {
            self.selected_pattern_index = index;
            self.observable
                .notify(ProjectEvent::SelectedPatternIndexChanged);
        }
    }

    // play state / routing

    pub fn play_state(&self) -> &PlayState {
        &self.play_state
    }

    pub fn play_state_mut(&mut self) -> &mut PlayState {
        &mut self.play_state
    }

    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    pub fn routing_mut(&mut self) -> &mut Routing {
        &mut self.routing
    }

    /// Drain the next pending model event.
    pub fn poll_event(&mut self) -> Option<ProjectEvent> {
        self.observable.poll()
    }

    pub fn clear_pattern(&mut self, pattern_index: usize) {
        for track in self.tracks.iter_mut() {
            track.clear_pattern(pattern_index);
        }
    }

    /// Apply a routed value. Project targets ignore the track mask;
    /// sequence targets land in the currently playing pattern of every
    /// masked track.
    pub fn write_routed(&mut self, target: Target, tracks: u8, int_value: i32, float_value: f32) {
        match target {
            Target::Tempo => self.set_tempo(float_value, true),
            Target::Swing => self.set_swing(int_value, true),
            Target::None => {}
            _ => {
                for track_index in 0..TRACK_COUNT {
                    if tracks & (1 << track_index) == 0 {
                        continue;
                    }
                    let pattern = self.play_state.track_state(track_index).pattern();
                    let track = &mut self.tracks[track_index];
                    track.write_routed(target, int_value);
                    track.write_routed_sequence(target, pattern, int_value);
                }
            }
        }
    }

    /// Clear the routed shadow a removed route was writing.
    pub fn clear_routed(&mut self, target: Target, tracks: u8) {
        match target {
            Target::Tempo => self.routed_tempo = None,
            Target::Swing => self.routed_swing = None,
            Target::None => {}
            _ => {
                for track_index in 0..TRACK_COUNT {
                    if tracks & (1 << track_index) == 0 {
                        continue;
                    }
                    let pattern = self.play_state.track_state(track_index).pattern();
                    let track = &mut self.tracks[track_index];
                    track.clear_routed(target);
                    track.clear_routed_sequence(target, pattern);
                }
            }
        }
    }
}

/// Snapshot helpers live on `Project` because they copy whole sequences.
impl Project {
    /// Copy every track's active pattern into its snapshot slot and switch
    /// playback to it.
    pub fn create_snapshot(&mut self) {
        use crate::play_state::SNAPSHOT_PATTERN_INDEX;
        for track_index in 0..TRACK_COUNT {
            let pattern = self.play_state.track_state(track_index).pattern();
            self.tracks[track_index].copy_pattern(pattern, SNAPSHOT_PATTERN_INDEX);
        }
        self.play_state.set_snapshot_active(true);
    }

    /// Discard the snapshot and return to the regular patterns.
    pub fn revert_snapshot(&mut self) {
        self.play_state.set_snapshot_active(false);
    }

    /// Write the snapshot back over the active patterns.
    pub fn commit_snapshot(&mut self) {
        use crate::play_state::SNAPSHOT_PATTERN_INDEX;
        if !self.play_state.snapshot_active() {
            return;
        }
        for track_index in 0..TRACK_COUNT {
            let pattern = self.play_state.track_state(track_index).pattern();
            self.tracks[track_index].copy_pattern(SNAPSHOT_PATTERN_INDEX, pattern);
        }
        self.play_state.set_snapshot_active(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Route, Source};

    #[test]
    fn tempo_and_swing_shadows() {
        let mut project = Project::new();
        project.set_tempo(140.0, false);
        project.set_tempo(99.0, true);
        assert_eq!(99.0, project.tempo());
        project.clear_routed(Target::Tempo, 0);
        assert_eq!(140.0, project.tempo());

        project.set_swing(60, false);
        project.write_routed(Target::Swing, 0, 70, 70.0);
        assert_eq!(70, project.swing());
        project.clear_routed(Target::Swing, 0);
        assert_eq!(60, project.swing());
    }

    #[test]
    fn write_routed_hits_selected_tracks_only() {
        let mut project = Project::new();
        project.write_routed(Target::Divisor, 0b0000_0101, 24, 24.0);
        assert_eq!(24, project.track(0).note_track().unwrap().sequence(0).divisor());
        assert_eq!(12, project.track(1).note_track().unwrap().sequence(0).divisor());
        assert_eq!(24, project.track(2).note_track().unwrap().sequence(0).divisor());
        project.clear_routed(Target::Divisor, 0b0000_0101);
        assert_eq!(12, project.track(0).note_track().unwrap().sequence(0).divisor());
    }

    #[test]
    fn track_mode_change_emits_event() {
        let mut project = Project::new();
        project.set_track_mode(3, TrackMode::Arp);
        assert_eq!(Some(ProjectEvent::TrackModeChanged(3)), project.poll_event());
        assert_eq!(None, project.poll_event());
        // same mode again is a no-op
        project.set_track_mode(3, TrackMode::Arp);
        assert_eq!(None, project.poll_event());
    }

    #[test]
    fn event_queue_drops_oldest_when_full() {
        let mut project = Project::new();
        for index in 0..(EVENT_QUEUE_SIZE + 2) {
            project.set_selected_pattern_index(1 + (index % 2));
        }
        let mut count = 0;
        while project.poll_event().is_some() {
            count += 1;
        }
        assert_eq!(EVENT_QUEUE_SIZE, count);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut project = Project::new();
        project
            .track_mut(0)
            .note_track_mut()
            .unwrap()
            .sequence_mut(0)
            .step_mut(7)
            .set_gate(true);
        project.create_snapshot();
        assert!(project.play_state().snapshot_active());
        // edit the snapshot slot, then commit it back to pattern 0
        project
            .track_mut(0)
            .note_track_mut()
            .unwrap()
            .sequence_mut(crate::play_state::SNAPSHOT_PATTERN_INDEX)
            .step_mut(8)
            .set_gate(true);
        project.commit_snapshot();
        assert!(!project.play_state().snapshot_active());
        let sequence = project.track(0).note_track().unwrap().sequence(0);
        assert!(sequence.step(7).gate() && sequence.step(8).gate());
    }

    #[test]
    fn routing_table_is_reachable_through_project() {
        let mut project = Project::new();
        project
            .routing_mut()
            .add_route(Route::new(Target::Swing, 0, Source::CvIn(0)))
            .unwrap();
        assert_eq!(1, project.routing().len());
    }
}
