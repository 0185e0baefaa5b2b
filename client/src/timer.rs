//! Turn countdowns for both sides of the board.
//!
//! In local play a one-second tick drives a shared counter. Online, values
//! come straight from server ticks and fall back to empty if the server
//! stops refreshing them. The display is cosmetic: nothing here returns an
//! error, and the authoritative end of an online game is always a server
//! `GameOver`.

use crate::clock::clamp_seconds;
use crate::config::DEFAULT_STALE_TICK_TIMEOUT;
use log::debug;
use shared::{Symbol, TURN_DURATION_SECS};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Mine,
    Opponent,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Mine => Side::Opponent,
            Side::Opponent => Side::Mine,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::Mine => 0,
            Side::Opponent => 1,
        }
    }

    /// Whose clock runs for `current_turn`. Without an assigned symbol
    /// (shared-device play) X is displayed as the local side.
    pub fn for_turn(current_turn: Option<Symbol>, my_symbol: Option<Symbol>) -> Self {
        let local = my_symbol.unwrap_or(Symbol::X);
        match current_turn {
            Some(turn) if turn != local => Side::Opponent,
            _ => Side::Mine,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnCountdowns {
    pub mine: Option<u32>,
    pub opponent: Option<u32>,
}

impl TurnCountdowns {
    pub fn get(&self, side: Side) -> Option<u32> {
        match side {
            Side::Mine => self.mine,
            Side::Opponent => self.opponent,
        }
    }

    fn set(&mut self, side: Side, value: Option<u32>) {
        match side {
            Side::Mine => self.mine = value,
            Side::Opponent => self.opponent = value,
        }
    }

    pub fn both_set(&self) -> bool {
        self.mine.is_some() && self.opponent.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No local countdown is running.
    Idle,
    Running { side: Side, remaining: u32 },
    /// The counter reached zero on `symbol`'s turn; the loop has stopped.
    TimedOut(Symbol),
}

#[derive(Debug)]
pub struct TurnTimer {
    countdowns: TurnCountdowns,
    local_remaining: Option<u32>,
    turn_duration_secs: u32,
    stale_timeout: Duration,
    stale_guards: [Option<Instant>; 2],
    paused: [bool; 2],
}

impl TurnTimer {
    pub fn new(turn_duration_secs: u32, stale_timeout: Duration) -> Self {
        Self {
            countdowns: TurnCountdowns::default(),
            local_remaining: None,
            turn_duration_secs: turn_duration_secs.max(1),
            stale_timeout,
            stale_guards: [None; 2],
            paused: [false; 2],
        }
    }

    pub fn countdowns(&self) -> TurnCountdowns {
        self.countdowns
    }

    pub fn is_local_running(&self) -> bool {
        self.local_remaining.is_some()
    }

    pub fn is_paused(&self, side: Side) -> bool {
        self.paused[side.index()]
    }

    /// Starts (or restarts) the local tick loop for the side whose turn it is.
    pub fn start_local(
        &mut self,
        seconds: u32,
        current_turn: Option<Symbol>,
        my_symbol: Option<Symbol>,
    ) {
        self.clear();
        let active = Side::for_turn(current_turn, my_symbol);
        self.local_remaining = Some(seconds);
        self.countdowns.set(active, Some(seconds));
    }

    /// One local second. The caller ends the game for the other side when
    /// this reports [`TickOutcome::TimedOut`].
    pub fn local_tick(
        &mut self,
        current_turn: Option<Symbol>,
        my_symbol: Option<Symbol>,
    ) -> TickOutcome {
        let Some(remaining) = self.local_remaining else {
            return TickOutcome::Idle;
        };

        let remaining = remaining.saturating_sub(1);
        let active = Side::for_turn(current_turn, my_symbol);
        self.countdowns.set(active, Some(remaining));
        self.keep_single_side(active);

        if remaining == 0 {
            self.local_remaining = None;
            let timed_out = current_turn.unwrap_or_else(|| my_symbol.unwrap_or(Symbol::X));
            debug!("Local turn timer expired for {}", timed_out);
            return TickOutcome::TimedOut(timed_out);
        }

        self.local_remaining = Some(remaining);
        TickOutcome::Running {
            side: active,
            remaining,
        }
    }

    /// Applies a server tick. Returns the applied value; a zero clears the
    /// side's countdown.
    pub fn apply_server_tick(&mut self, side: Side, seconds: u32, now: Instant) -> u32 {
        self.local_remaining = None;
        self.paused[side.index()] = false;

        if seconds == 0 {
            self.countdowns.set(side, None);
            self.stale_guards[side.index()] = None;
        } else {
            self.countdowns.set(side, Some(seconds));
            self.stale_guards[side.index()] = Some(now + self.stale_timeout);
        }
        self.keep_single_side(side);
        seconds
    }

    /// Freezes `side` at `seconds` and suspends its stale guard.
    pub fn pause(&mut self, side: Side, seconds: Option<f64>) {
        let frozen = seconds
            .map(clamp_seconds)
            .or_else(|| self.countdowns.get(side));
        self.countdowns.set(side, frozen);
        self.paused[side.index()] = true;
        self.stale_guards[side.index()] = None;
        self.keep_single_side(side);
    }

    /// Resumes `side`. Non-positive or non-finite values restart the full
    /// turn duration.
    pub fn resume(&mut self, side: Side, seconds: Option<f64>, now: Instant) -> u32 {
        let value = match seconds {
            Some(s) if s.is_finite() && s > 0.0 => clamp_seconds(s),
            _ => self.turn_duration_secs,
        };
        self.paused[side.index()] = false;
        self.countdowns.set(side, Some(value));
        self.stale_guards[side.index()] = Some(now + self.stale_timeout);
        self.keep_single_side(side);
        value
    }

    /// Clears countdowns whose refresh is overdue. Returns true if any changed.
    pub fn expire_stale(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for side in [Side::Mine, Side::Opponent] {
            let index = side.index();
            if self.paused[index] {
                continue;
            }
            if let Some(deadline) = self.stale_guards[index] {
                if deadline <= now {
                    debug!("Countdown for {:?} went stale", side);
                    self.stale_guards[index] = None;
                    self.countdowns.set(side, None);
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.stale_guards.iter().flatten().min().copied()
    }

    pub fn clear(&mut self) {
        self.countdowns = TurnCountdowns::default();
        self.local_remaining = None;
        self.stale_guards = [None; 2];
        self.paused = [false; 2];
    }

    fn keep_single_side(&mut self, active: Side) {
        if self.countdowns.both_set() {
            let inactive = active.other();
            self.countdowns.set(inactive, None);
            self.stale_guards[inactive.index()] = None;
            self.paused[inactive.index()] = false;
        }
    }
}

impl Default for TurnTimer {
    fn default() -> Self {
        Self::new(TURN_DURATION_SECS, DEFAULT_STALE_TICK_TIMEOUT)
    }
}
