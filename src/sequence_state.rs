//! Sequence traversal state machine.
//!
//! Tracks the current, previous and predicted next step of a sequence
//! window and the iteration count, advancing per the run mode. Aligned play
//! derives the step from the absolute step count so a clock restart lands on
//! the same step; free play advances relative to wherever it is.

use crate::{rng::TrackRng, types::RunMode};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceState {
    step: i32,
    prev_step: i32,
    next_step: i32,
    direction: i8,
    iteration: u32,
}

impl Default for SequenceState {
    fn default() -> Self {
        SequenceState {
            step: -1,
            prev_step: -1,
            next_step: -1,
            direction: 1,
            iteration: 0,
        }
    }
}

impl SequenceState {
    pub fn new() -> SequenceState {
        SequenceState::default()
    }

    pub fn reset(&mut self) {
        *self = SequenceState::default();
    }

    /// Current step, -1 before the first advance.
    pub fn step(&self) -> i32 {
        self.step
    }

    pub fn prev_step(&self) -> i32 {
        self.prev_step
    }

    /// Predicted next step, -1 until calculated.
    pub fn next_step(&self) -> i32 {
        self.next_step
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Derive the step from the absolute step counter (Aligned play mode).
    pub fn advance_aligned(
        &mut self,
        absolute_step: u32,
        run_mode: RunMode,
        first_step: i32,
        last_step: i32,
        rng: &mut TrackRng,
    ) {
        let (first_step, last_step) = ordered_window(first_step, last_step);
        self.prev_step = self.step;
        let count = (last_step - first_step + 1) as u32;

        match run_mode {
            RunMode::Forward => {
                self.step = first_step + (absolute_step % count) as i32;
                self.iteration = absolute_step / count;
            }
            RunMode::Backward => {
                self.step = last_step - (absolute_step % count) as i32;
                self.iteration = absolute_step / count;
            }
            RunMode::PingPong | RunMode::PongPing => {
                let (position, iteration) = ping_pong_position(absolute_step, count);
                self.iteration = iteration;
                self.step = if run_mode == RunMode::PingPong {
                    first_step + position as i32
                } else {
                    last_step - position as i32
                };
            }
            RunMode::Random => {
                self.step = first_step + rng.next_range(count) as i32;
                self.iteration = absolute_step / count;
            }
            RunMode::RandomWalk => {
                self.advance_random_walk(first_step, last_step, rng);
                self.iteration = absolute_step / count;
            }
        }
    }

    /// Advance one step relative to the current position (Free play mode).
    pub fn advance_free(
        &mut self,
        run_mode: RunMode,
        first_step: i32,
        last_step: i32,
        rng: &mut TrackRng,
    ) {
        let (first_step, last_step) = ordered_window(first_step, last_step);
        self.prev_step = self.step;
        let count = (last_step - first_step + 1) as u32;

        if self.step < first_step || self.step > last_step {
            // entering the window, either initially or after a bounds change
            self.step = match run_mode {
                RunMode::Forward | RunMode::PingPong => first_step,
                RunMode::Backward | RunMode::PongPing => last_step,
                RunMode::Random | RunMode::RandomWalk => {
                    first_step + rng.next_range(count) as i32
                }
            };
            self.direction = match run_mode {
                RunMode::Backward | RunMode::PongPing => -1,
                _ => 1,
            };
            return;
        }

        match run_mode {
            RunMode::Forward => {
                if self.step >= last_step {
                    self.step = first_step;
                    self.iteration += 1;
                } else {
                    self.step += 1;
                }
            }
            RunMode::Backward => {
                if self.step <= first_step {
                    self.step = last_step;
                    self.iteration += 1;
                } else {
                    self.step -= 1;
                }
            }
            RunMode::PingPong | RunMode::PongPing => {
                if first_step == last_step {
                    self.iteration += 1;
                } else {
                    let mut direction = self.direction as i32;
                    // reverse at the endpoints without repeating them
                    if self.step + direction > last_step {
                        direction = -1;
                        if run_mode == RunMode::PongPing {
                            self.iteration += 1;
                        }
                    } else if self.step + direction < first_step {
                        direction = 1;
                        if run_mode == RunMode::PingPong {
                            self.iteration += 1;
                        }
                    }
                    self.step += direction;
                    self.direction = direction as i8;
                }
            }
            RunMode::Random => {
                self.step = first_step + rng.next_range(count) as i32;
            }
            RunMode::RandomWalk => {
                self.advance_random_walk(first_step, last_step, rng);
            }
        }
    }

    /// Predict the step that `advance_aligned` would produce for
    /// `absolute_step`, for look-ahead scheduling of negative gate offsets.
    pub fn calculate_next_step_aligned(
        &mut self,
        absolute_step: u32,
        run_mode: RunMode,
        first_step: i32,
        last_step: i32,
        rng: &mut TrackRng,
    ) {
        let (first_step, last_step) = ordered_window(first_step, last_step);
        let count = (last_step - first_step + 1) as u32;

        self.next_step = match run_mode {
            RunMode::Forward => first_step + (absolute_step % count) as i32,
            RunMode::Backward => last_step - (absolute_step % count) as i32,
            RunMode::PingPong | RunMode::PongPing => {
                let (position, _) = ping_pong_position(absolute_step, count);
                if run_mode == RunMode::PingPong {
                    first_step + position as i32
                } else {
                    last_step - position as i32
                }
            }
            RunMode::Random | RunMode::RandomWalk => {
                first_step + rng.next_range(count) as i32
            }
        };
    }

    /// Predict the step that the next `advance_free` would produce.
    pub fn calculate_next_step_free(
        &mut self,
        run_mode: RunMode,
        first_step: i32,
        last_step: i32,
        rng: &mut TrackRng,
    ) {
        let (first_step, last_step) = ordered_window(first_step, last_step);
        let count = (last_step - first_step + 1) as u32;

        if self.step < first_step || self.step > last_step {
            self.next_step = match run_mode {
                RunMode::Forward | RunMode::PingPong => first_step,
                RunMode::Backward | RunMode::PongPing => last_step,
                RunMode::Random | RunMode::RandomWalk => {
                    first_step + rng.next_range(count) as i32
                }
            };
            return;
        }

        self.next_step = match run_mode {
            RunMode::Forward => {
                if self.step >= last_step {
                    first_step
                } else {
                    self.step + 1
                }
            }
            RunMode::Backward => {
                if self.step <= first_step {
                    last_step
                } else {
                    self.step - 1
                }
            }
            RunMode::PingPong | RunMode::PongPing => {
                if first_step == last_step {
                    first_step
                } else {
                    let mut direction = self.direction as i32;
                    if self.step + direction > last_step {
                        direction = -1;
                    } else if self.step + direction < first_step {
                        direction = 1;
                    }
                    self.step + direction
                }
            }
            RunMode::Random => first_step + rng.next_range(count) as i32,
            RunMode::RandomWalk => {
                let mut next = self.step + if rng.next_range(2) == 0 { -1 } else { 1 };
                if next < first_step {
                    next = last_step;
                } else if next > last_step {
                    next = first_step;
                }
                next
            }
        };
    }

    fn advance_random_walk(&mut self, first_step: i32, last_step: i32, rng: &mut TrackRng) {
        if self.step < first_step || self.step > last_step {
            let count = (last_step - first_step + 1) as u32;
            self.step = first_step + rng.next_range(count) as i32;
            return;
        }
        let delta = if rng.next_range(2) == 0 { -1 } else { 1 };
        let mut step = self.step + delta;
        if step < first_step {
            step = last_step;
        } else if step > last_step {
            step = first_step;
        }
        self.step = step;
    }
}

/// Read-side enforcement of `first <= last`; routing can drive the stored
/// values into conflict.
fn ordered_window(first_step: i32, last_step: i32) -> (i32, i32) {
    (first_step, last_step.max(first_step))
}

/// Mirrored position within a 2*(count-1) period, endpoints not repeated.
fn ping_pong_position(absolute_step: u32, count: u32) -> (u32, u32) {
    let period = (2 * count).saturating_sub(2).max(1);
    let position = absolute_step % period;
    let iteration = absolute_step / period;
    if position >= count {
        (period - position, iteration)
    } else {
        (position, iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> TrackRng {
        TrackRng::new(99)
    }

    #[test]
    fn aligned_forward_wraps_and_counts_iterations() {
        let mut state = SequenceState::new();
        let mut rng = rng();
        let mut steps = Vec::new();
        for absolute in 0..10 {
            state.advance_aligned(absolute, RunMode::Forward, 0, 3, &mut rng);
            steps.push(state.step());
        }
        assert_eq!(vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1], steps);
        assert_eq!(2, state.iteration());
    }

    #[test]
    fn aligned_backward_descends() {
        let mut state = SequenceState::new();
        let mut rng = rng();
        let mut steps = Vec::new();
        for absolute in 0..5 {
            state.advance_aligned(absolute, RunMode::Backward, 2, 5, &mut rng);
            steps.push(state.step());
        }
        assert_eq!(vec![5, 4, 3, 2, 5], steps);
    }

    #[test]
    fn aligned_ping_pong_reverses_without_repeating_endpoints() {
        let mut state = SequenceState::new();
        let mut rng = rng();
        let mut steps = Vec::new();
        for absolute in 0..8 {
            state.advance_aligned(absolute, RunMode::PingPong, 0, 3, &mut rng);
            steps.push(state.step());
        }
        assert_eq!(vec![0, 1, 2, 3, 2, 1, 0, 1], steps);
    }

    #[test]
    fn aligned_pong_ping_starts_backward() {
        let mut state = SequenceState::new();
        let mut rng = rng();
        let mut steps = Vec::new();
        for absolute in 0..8 {
            state.advance_aligned(absolute, RunMode::PongPing, 0, 3, &mut rng);
            steps.push(state.step());
        }
        assert_eq!(vec![3, 2, 1, 0, 1, 2, 3, 2], steps);
    }

    #[test]
    fn single_step_window_is_stationary() {
        let mut state = SequenceState::new();
        let mut rng = rng();
        for absolute in 0..6 {
            state.advance_aligned(absolute, RunMode::PingPong, 5, 5, &mut rng);
            assert_eq!(5, state.step());
        }
        let mut state = SequenceState::new();
        for _ in 0..6 {
            state.advance_free(RunMode::PingPong, 5, 5, &mut rng);
            assert_eq!(5, state.step());
        }
    }

    #[test]
    fn free_forward_wraps_and_counts_iterations() {
        let mut state = SequenceState::new();
        let mut rng = rng();
        let mut steps = Vec::new();
        for _ in 0..9 {
            state.advance_free(RunMode::Forward, 0, 3, &mut rng);
            steps.push(state.step());
        }
        assert_eq!(vec![0, 1, 2, 3, 0, 1, 2, 3, 0], steps);
        assert_eq!(2, state.iteration());
        assert_eq!(3, state.prev_step());
    }

    #[test]
    fn free_ping_pong_oscillates() {
        let mut state = SequenceState::new();
        let mut rng = rng();
        let mut steps = Vec::new();
        for _ in 0..8 {
            state.advance_free(RunMode::PingPong, 0, 2, &mut rng);
            steps.push(state.step());
        }
        assert_eq!(vec![0, 1, 2, 1, 0, 1, 2, 1], steps);
    }

    #[test]
    fn all_run_modes_stay_inside_window() {
        let mut rng = rng();
        for run_mode in [
            RunMode::Forward,
            RunMode::Backward,
            RunMode::PingPong,
            RunMode::PongPing,
            RunMode::Random,
            RunMode::RandomWalk,
        ] {
            let mut state = SequenceState::new();
            for absolute in 0..200 {
                state.advance_aligned(absolute, run_mode, 3, 11, &mut rng);
                assert!(
                    (3..=11).contains(&state.step()),
                    "{:?} escaped window: {}",
                    run_mode,
                    state.step()
                );
            }
            let mut state = SequenceState::new();
            for _ in 0..200 {
                state.advance_free(run_mode, 3, 11, &mut rng);
                assert!((3..=11).contains(&state.step()));
            }
        }
    }

    #[test]
    fn inverted_window_clamps_to_first_step() {
        let mut state = SequenceState::new();
        let mut rng = rng();
        for absolute in 0..4 {
            state.advance_aligned(absolute, RunMode::Forward, 6, 2, &mut rng);
            assert_eq!(6, state.step());
        }
    }

    #[test]
    fn calculate_next_step_aligned_predicts_advance() {
        let mut rng = rng();
        let mut state = SequenceState::new();
        for absolute in 0..20 {
            state.advance_aligned(absolute, RunMode::PingPong, 0, 4, &mut rng);
            state.calculate_next_step_aligned(absolute + 1, RunMode::PingPong, 0, 4, &mut rng);
            let predicted = state.next_step();
            state.advance_aligned(absolute + 1, RunMode::PingPong, 0, 4, &mut rng);
            assert_eq!(predicted, state.step());
        }
    }

    #[test]
    fn calculate_next_step_free_predicts_advance() {
        let mut rng = rng();
        for run_mode in [RunMode::Forward, RunMode::Backward, RunMode::PingPong] {
            let mut state = SequenceState::new();
            for _ in 0..20 {
                state.advance_free(run_mode, 1, 5, &mut rng);
                state.calculate_next_step_free(run_mode, 1, 5, &mut rng);
                let predicted = state.next_step();
                state.advance_free(run_mode, 1, 5, &mut rng);
                assert_eq!(predicted, state.step(), "{:?}", run_mode);
            }
        }
    }
}
