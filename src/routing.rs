//! Parameter routing: external sources (CV inputs, MIDI, clock ramps)
//! bound to sequence and track parameters.
//!
//! A routed parameter keeps its base value and a shadow; reads return the
//! shadow while a source is active, and removing the route restores the
//! base. The router samples each source once per tick as a normalized 0..1
//! value and maps it into the target's range.

use heapless::Vec;

use crate::TRACK_COUNT;

/// A routable parameter value: the stored base plus the routed shadow.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Routable<T: Copy> {
    base: T,
    routed: Option<T>,
}

impl<T: Copy> Routable<T> {
    pub fn new(base: T) -> Routable<T> {
        Routable { base, routed: None }
    }

    pub fn get(&self) -> T {
        self.routed.unwrap_or(self.base)
    }

    pub fn base(&self) -> T {
        self.base
    }

    pub fn set(&mut self, value: T, routed: bool) {
        if routed {
            self.routed = Some(value);
        } else {
            self.base = value;
        }
    }

    pub fn clear_routed(&mut self) {
        self.routed = None;
    }

    pub fn is_routed(&self) -> bool {
        self.routed.is_some()
    }
}

/// Everything a route can write to. Project-level targets ignore the
/// route's track mask; sequence/track targets apply to every track selected
/// in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    None,
    // project
    Tempo,
    Swing,
    // sequence
    Scale,
    RootNote,
    Divisor,
    RunMode,
    FirstStep,
    LastStep,
    SequenceFirstStep,
    SequenceLastStep,
    RestProbability,
    RestProbability2,
    RestProbability4,
    RestProbability8,
    LowOctaveRange,
    HighOctaveRange,
    LengthModifier,
    Reseed,
    // track
    SlideTime,
    Octave,
    Transpose,
    GateProbabilityBias,
    RetriggerProbabilityBias,
    LengthBias,
    NoteProbabilityBias,
}

impl Target {
    /// Inclusive integer range the normalized source value maps into.
    pub fn int_range(self) -> (i32, i32) {
        match self {
            Target::None => (0, 0),
            Target::Tempo => (1, 1000),
            Target::Swing => (50, 75),
            Target::Scale => (-1, crate::scale::Scale::COUNT as i32 - 1),
            Target::RootNote => (-1, 11),
            Target::Divisor => (1, 768),
            Target::RunMode => (0, crate::types::RunMode::COUNT as i32 - 1),
            Target::FirstStep
            | Target::LastStep
            | Target::SequenceFirstStep
            | Target::SequenceLastStep => (0, crate::STEP_COUNT as i32 - 1),
            Target::RestProbability
            | Target::RestProbability2
            | Target::RestProbability4
            | Target::RestProbability8 => (0, 8),
            Target::LowOctaveRange | Target::HighOctaveRange => (-10, 10),
            Target::LengthModifier => (-16, 16),
            Target::Reseed => (0, 1),
            Target::SlideTime => (0, 100),
            Target::Octave => (-10, 10),
            Target::Transpose => (-100, 100),
            Target::GateProbabilityBias
            | Target::RetriggerProbabilityBias
            | Target::NoteProbabilityBias
            | Target::LengthBias => (-16, 16),
        }
    }

    pub fn is_project_target(self) -> bool {
        matches!(self, Target::Tempo | Target::Swing)
    }
}

/// Where a route reads its value from. Values are normalized to 0..1 before
/// range mapping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Source {
    None,
    /// A CV input jack, -5..+5 V normalized over its span.
    CvIn(u8),
    /// A MIDI continuous controller, 0..127.
    MidiCc(u8),
    /// A MIDI note number window; the note position inside the window is
    /// the value, note-off releases to 0.
    MidiNoteRange { low: u8, high: u8 },
    /// A ramp over `divisor` ticks of the clock, wrapping at 1.
    ClockRamp { divisor: u16 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Route {
    pub target: Target,
    /// Bitmask of tracks the route applies to (ignored for project
    /// targets).
    pub tracks: u8,
    pub source: Source,
    /// Normalized sub-range the source value is mapped through.
    pub min: f32,
    pub max: f32,
}

impl Route {
    pub fn new(target: Target, tracks: u8, source: Source) -> Route {
        Route {
            target,
            tracks,
            source,
            min: 0.0,
            max: 1.0,
        }
    }

    pub fn applies_to_track(&self, track_index: usize) -> bool {
        self.tracks & (1 << track_index) != 0
    }

    /// Map a normalized source value into the target's value domain.
    pub fn target_value(&self, normalized: f32) -> (i32, f32) {
        let normalized = normalized.clamp(0.0, 1.0);
        let scaled = self.min + (self.max - self.min) * normalized;
        let (min, max) = self.target.int_range();
        let float_value = min as f32 + (max - min) as f32 * scaled;
        let int_value = libm::roundf(float_value) as i32;
        (int_value.clamp(min, max), float_value)
    }
}

pub const MAX_ROUTES: usize = 16;

/// The project's route table. Mutated by the UI thread under the write
/// lock; read every tick by the engine.
#[derive(Debug, Default)]
pub struct Routing {
    routes: Vec<Route, MAX_ROUTES>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RoutingError {
    TableFull,
}

impl Routing {
    pub fn new() -> Routing {
        Routing::default()
    }

    pub fn add_route(&mut self, route: Route) -> Result<usize, RoutingError> {
        self.routes
            .push(route)
            .map_err(|_| RoutingError::TableFull)?;
        Ok(self.routes.len() - 1)
    }

    /// Remove a route. The caller is responsible for clearing the routed
    /// shadow of the target it pointed at.
    pub fn remove_route(&mut self, index: usize) -> Option<Route> {
        if index < self.routes.len() {
            Some(self.routes.remove(index))
        } else {
            None
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }

    pub fn is_routed(&self, target: Target, track_index: usize) -> bool {
        self.routes.iter().any(|r| {
            r.target == target && (target.is_project_target() || r.applies_to_track(track_index))
        })
    }
}

/// Bitmask selecting every track.
pub fn all_tracks() -> u8 {
    ((1u16 << TRACK_COUNT) - 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routable_read_returns_shadow_while_routed() {
        let mut value = Routable::new(10);
        assert_eq!(10, value.get());
        value.set(42, true);
        assert!(value.is_routed());
        assert_eq!(42, value.get());
        assert_eq!(10, value.base());
        value.clear_routed();
        assert_eq!(10, value.get());
    }

    #[test]
    fn base_writes_do_not_disturb_shadow() {
        let mut value = Routable::new(1);
        value.set(5, true);
        value.set(2, false);
        assert_eq!(5, value.get());
        value.clear_routed();
        assert_eq!(2, value.get());
    }

    #[test]
    fn route_maps_normalized_value_into_target_range() {
        let route = Route::new(Target::Swing, 0, Source::CvIn(0));
        assert_eq!(50, route.target_value(0.0).0);
        assert_eq!(75, route.target_value(1.0).0);
        assert_eq!(63, route.target_value(0.5).0);
    }

    #[test]
    fn route_sub_range_narrows_mapping() {
        let mut route = Route::new(Target::Transpose, 0, Source::CvIn(0));
        route.min = 0.5;
        route.max = 0.5;
        assert_eq!(0, route.target_value(0.0).0);
        assert_eq!(0, route.target_value(1.0).0);
    }

    #[test]
    fn routing_table_is_bounded() {
        let mut routing = Routing::new();
        for _ in 0..MAX_ROUTES {
            routing
                .add_route(Route::new(Target::Swing, 0, Source::None))
                .unwrap();
        }
        assert_eq!(
            Err(RoutingError::TableFull),
            routing.add_route(Route::new(Target::Swing, 0, Source::None))
        );
    }

    #[test]
    fn is_routed_honors_track_mask() {
        let mut routing = Routing::new();
        routing
            .add_route(Route::new(Target::Divisor, 0b0000_0010, Source::CvIn(0)))
            .unwrap();
        assert!(routing.is_routed(Target::Divisor, 1));
        assert!(!routing.is_routed(Target::Divisor, 0));
        assert!(!routing.is_routed(Target::Swing, 1));
    }
}
