//! Debounced detection trigger.
//!
//! Turns a noisy per-frame "target present" signal into at most one ON and
//! one OFF actuation per presence episode. ON fires when a streak of
//! consecutive present frames reaches the threshold; OFF fires on the first
//! absent frame after that. The machine does no I/O and is stepped exactly
//! once per processed frame, in arrival order.

use std::fmt;

/// Actuation command emitted on a state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Actuation {
    TurnOn,
    TurnOff,
}

impl fmt::Display for Actuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actuation::TurnOn => f.write_str("on"),
            Actuation::TurnOff => f.write_str("off"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerState {
    /// Uninterrupted frames with a qualifying detection.
    pub consecutive_hits: u32,
    /// Eligible to fire ON during the current streak.
    pub armed: bool,
    /// Last command issued. Not the actuator's confirmed state.
    pub actuator_on: bool,
}

impl Default for TriggerState {
    fn default() -> Self {
        Self {
            consecutive_hits: 0,
            armed: true,
            actuator_on: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TriggerStateMachine {
    threshold: u32,
    state: TriggerState,
}

impl TriggerStateMachine {
    /// `threshold` is clamped to at least 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            state: TriggerState::default(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn consecutive_hits(&self) -> u32 {
        self.state.consecutive_hits
    }

    pub fn actuator_on(&self) -> bool {
        self.state.actuator_on
    }

    /// Advance by one frame.
    ///
    /// `actuator_on` flips as soon as a command is emitted, whether or not the
    /// command later reaches the actuator.
    pub fn step(&mut self, present: bool) -> Option<Actuation> {
        let state = &mut self.state;
        if present {
            state.consecutive_hits = state.consecutive_hits.saturating_add(1);
        } else {
            state.consecutive_hits = 0;
            state.armed = true;
        }

        if state.consecutive_hits == self.threshold && state.armed && !state.actuator_on {
            state.actuator_on = true;
            state.armed = false;
            return Some(Actuation::TurnOn);
        }

        if state.actuator_on && state.consecutive_hits == 0 {
            state.actuator_on = false;
            return Some(Actuation::TurnOff);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: bool = true;
    const F: bool = false;

    fn run(threshold: u32, signal: &[bool]) -> Vec<(usize, Actuation)> {
        let mut machine = TriggerStateMachine::new(threshold);
        signal
            .iter()
            .enumerate()
            .filter_map(|(i, &present)| machine.step(present).map(|a| (i, a)))
            .collect()
    }

    #[test]
    fn streak_fires_once() {
        assert_eq!(run(5, &[T, T, T, T, T]), vec![(4, Actuation::TurnOn)]);
        assert_eq!(run(5, &[T; 12]), vec![(4, Actuation::TurnOn)]);
    }

    #[test]
    fn broken_streak_rearms() {
        assert_eq!(
            run(5, &[T, T, T, T, T, F, T, T, T, T, T]),
            vec![
                (4, Actuation::TurnOn),
                (5, Actuation::TurnOff),
                (10, Actuation::TurnOn)
            ]
        );
    }

    #[test]
    fn sub_threshold_streaks_are_silent() {
        assert!(run(5, &[T, T, T, F, T, T, T, F]).is_empty());
    }

    #[test]
    fn off_is_signalled_once() {
        assert_eq!(
            run(5, &[T, T, T, T, T, F, F, F, F]),
            vec![(4, Actuation::TurnOn), (5, Actuation::TurnOff)]
        );
    }

    #[test]
    fn threshold_of_one_follows_the_signal() {
        assert_eq!(
            run(1, &[T, T, F, T]),
            vec![
                (0, Actuation::TurnOn),
                (2, Actuation::TurnOff),
                (3, Actuation::TurnOn)
            ]
        );
    }

    #[test]
    fn state_tracks_streak_and_arming() {
        let mut machine = TriggerStateMachine::new(2);
        assert_eq!(machine.state(), TriggerState::default());
        machine.step(T);
        machine.step(T);
        assert_eq!(
            machine.state(),
            TriggerState {
                consecutive_hits: 2,
                armed: false,
                actuator_on: true
            }
        );
        machine.step(F);
        assert_eq!(machine.state(), TriggerState::default());
    }

    #[test]
    fn zero_threshold_is_clamped() {
        assert_eq!(TriggerStateMachine::new(0).threshold(), 1);
    }
}
