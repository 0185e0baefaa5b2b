//! The client's view of one game room.
//!
//! Fields are read freely; every write goes through a named transition so
//! the phase and the data it implies never drift apart.

use crate::game_over::{self, CanonicalOutcome, LocalIdentity, RematchOffer};
use crate::timer::Side;
use log::{debug, info};
use shared::{Board, GameStateDto, Symbol};
use std::fmt;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceCause {
    OpponentLeft,
    ConnectionLost,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    Connecting,
    Creating,
    Joining,
    Active,
    /// Play is suspended while someone is away; the room is still live.
    Grace(GraceCause),
    Terminated,
}

/// Transient, auto-dismissing text for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub phase: SessionPhase,
    pub room_code: Option<String>,
    pub player_id: Option<String>,
    pub symbol: Option<Symbol>,
    pub current_turn: Option<Symbol>,
    pub board: Board,
    pub opponent_present: bool,
    pub outcome: Option<CanonicalOutcome>,
    /// Bumped every time an outcome is applied; lets callers detect re-display.
    pub outcome_revision: u64,
    pub disconnect_countdown: Option<u32>,
    /// Provisional marker set when a turn clock hits zero, until the
    /// authoritative `GameOver` arrives.
    pub turn_expired: Option<Side>,
    pub status: Option<StatusMessage>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> LocalIdentity {
        LocalIdentity {
            symbol: self.symbol,
            player_id: self.player_id.clone(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == SessionPhase::Terminated
    }

    pub fn in_room(&self) -> bool {
        self.room_code.is_some()
    }

    pub fn is_my_turn(&self) -> bool {
        match (self.symbol, self.current_turn) {
            (Some(mine), Some(turn)) => mine == turn,
            _ => false,
        }
    }

    pub fn begin_connecting(&mut self) {
        self.transition(SessionPhase::Connecting);
    }

    pub fn begin_creating(&mut self) {
        self.transition(SessionPhase::Creating);
    }

    pub fn begin_joining(&mut self, code: &str) {
        self.room_code = Some(code.to_string());
        self.transition(SessionPhase::Joining);
    }

    pub fn set_room(&mut self, code: &str) {
        self.room_code = Some(code.to_string());
    }

    pub fn set_player_id(&mut self, player_id: Option<String>) {
        self.player_id = player_id;
    }

    pub fn set_symbol(&mut self, symbol: Option<Symbol>) {
        if symbol.is_some() {
            self.symbol = symbol;
        }
    }

    /// Enters play. A terminated session stays terminated until a rematch.
    pub fn activate(&mut self) {
        if !self.is_terminated() {
            self.transition(SessionPhase::Active);
        }
    }

    /// Replaces the board wholesale.
    pub fn apply_board(&mut self, board: Board, current_turn: Option<Symbol>) {
        self.board = board;
        if current_turn.is_some() {
            self.current_turn = current_turn;
        }
        self.turn_expired = None;
    }

    /// Applies whatever an authoritative state snapshot carries. Returns
    /// true when the snapshot also carried a termination that was applied.
    pub fn apply_game_state(&mut self, state: &GameStateDto) -> bool {
        if let Some(code) = state.room_code.as_deref().filter(|c| !c.trim().is_empty()) {
            self.set_room(code);
        }
        if let Some(player_id) = state.player_id() {
            self.player_id = Some(player_id);
        }
        self.set_symbol(state.symbol.as_ref().and_then(Symbol::from_value));
        if let Some(board) = state.board {
            let turn = state.current_symbol.as_ref().and_then(Symbol::from_value);
            self.apply_board(board, turn);
        }
        if let Some(present) = state.opponent_present(self.player_id.as_deref()) {
            self.opponent_present = present;
        }

        match state.game_over_record() {
            Some(record) => {
                let outcome =
                    game_over::reconcile(&record, &self.identity(), self.outcome.as_ref());
                self.apply_outcome(outcome);
                true
            }
            None => {
                if self.is_terminated() && state.is_full_state() {
                    // A live snapshot after termination means a rematch began.
                    self.clear_outcome_for_rematch();
                }
                self.activate();
                false
            }
        }
    }

    pub fn set_opponent_present(&mut self, present: bool) {
        self.opponent_present = present;
    }

    pub fn enter_grace(&mut self, cause: GraceCause, countdown: Option<u32>) {
        if self.is_terminated() {
            return;
        }
        if cause == GraceCause::OpponentLeft {
            self.opponent_present = false;
        }
        self.disconnect_countdown = countdown;
        self.transition(SessionPhase::Grace(cause));
    }

    pub fn set_disconnect_countdown(&mut self, seconds: Option<u32>) {
        self.disconnect_countdown = seconds;
    }

    pub fn leave_grace(&mut self) {
        self.disconnect_countdown = None;
        if matches!(self.phase, SessionPhase::Grace(_)) {
            self.transition(SessionPhase::Active);
        }
    }

    /// Shows a termination. Clears the disconnect countdown and the
    /// provisional timeout marker and hides the opponent, but keeps the room
    /// code and player id for a rematch.
    pub fn apply_outcome(&mut self, outcome: CanonicalOutcome) {
        if let Some(board) = outcome.board {
            self.board = board;
        }
        info!("Game over: {:?} ({})", outcome.kind, outcome.message);
        self.outcome = Some(outcome);
        self.outcome_revision += 1;
        self.disconnect_countdown = None;
        self.turn_expired = None;
        self.opponent_present = false;
        self.current_turn = None;
        self.transition(SessionPhase::Terminated);
    }

    pub fn set_rematch_offer(&mut self, offer: RematchOffer) {
        if let Some(outcome) = &mut self.outcome {
            outcome.rematch.offer = offer;
        }
    }

    pub fn set_rematch_remaining(&mut self, seconds: Option<u32>) {
        if let Some(outcome) = &mut self.outcome {
            outcome.rematch.remaining_seconds = seconds;
        }
    }

    pub fn clear_rematch(&mut self) {
        if let Some(outcome) = &mut self.outcome {
            outcome.rematch = Default::default();
        }
    }

    /// A new match in the same room.
    pub fn clear_outcome_for_rematch(&mut self) {
        self.outcome = None;
        self.board = Board::empty();
        self.current_turn = Some(Symbol::X);
        self.turn_expired = None;
        self.opponent_present = true;
        self.transition(SessionPhase::Active);
    }

    pub fn mark_turn_expired(&mut self, side: Side) {
        if !self.is_terminated() {
            self.turn_expired = Some(side);
        }
    }

    pub fn set_status(&mut self, text: &str, expires_at: Instant) {
        self.status = Some(StatusMessage {
            text: text.to_string(),
            expires_at,
        });
    }

    /// Drops the status message once it is due. Returns true if one was removed.
    pub fn expire_status(&mut self, now: Instant) -> bool {
        match &self.status {
            Some(status) if status.expires_at <= now => {
                self.status = None;
                true
            }
            _ => false,
        }
    }

    /// Back to a neutral idle session.
    pub fn reset(&mut self) {
        let status = self.status.take();
        let revision = self.outcome_revision;
        *self = Session::default();
        self.status = status;
        self.outcome_revision = revision;
        info!("Session reset");
    }

    fn transition(&mut self, next: SessionPhase) {
        if self.phase != next {
            debug!("Session phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "room {} | player {} | symbol {} | phase {:?}",
            self.room_code.as_deref().unwrap_or("-"),
            self.player_id.as_deref().unwrap_or("-"),
            self.symbol.map(Symbol::as_str).unwrap_or("-"),
            self.phase,
        )?;
        write!(f, "{}", self.board)?;
        if let Some(turn) = self.current_turn {
            writeln!(f, "turn: {}", turn)?;
        }
        if let Some(seconds) = self.disconnect_countdown {
            writeln!(f, "opponent away, {}s left", seconds)?;
        }
        if let Some(outcome) = &self.outcome {
            writeln!(f, "{}", outcome)?;
        }
        if let Some(status) = &self.status {
            writeln!(f, "status: {}", status.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_over::OutcomeKind;
    use serde_json::json;
    use std::time::Duration;

    fn state(value: serde_json::Value) -> GameStateDto {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_apply_game_state_activates() {
        let mut session = Session::new();
        session.begin_joining("ABCD");
        let over = session.apply_game_state(&state(json!({
            "roomCode": "ABCD",
            "board": [1, 0, 0, 0, 2, 0, 0, 0, 0],
            "currentSymbol": "X",
            "symbol": "O",
            "playerId": "p2",
            "opponentPresent": true
        })));

        assert!(!over);
        assert_eq!(session.phase, SessionPhase::Active);
        assert_eq!(session.symbol, Some(Symbol::O));
        assert_eq!(session.player_id.as_deref(), Some("p2"));
        assert_eq!(session.board.get(4), Some(Symbol::O));
        assert!(session.opponent_present);
        assert!(!session.is_my_turn());
    }

    #[test]
    fn test_apply_game_state_with_outcome_terminates() {
        let mut session = Session::new();
        session.set_symbol(Some(Symbol::X));
        let over = session.apply_game_state(&state(json!({
            "board": "XXXOO----",
            "isGameOver": true
        })));

        assert!(over);
        assert!(session.is_terminated());
        assert_eq!(session.outcome.as_ref().map(|o| o.kind), Some(OutcomeKind::Win));
        assert_eq!(session.outcome_revision, 1);
    }

    #[test]
    fn test_apply_outcome_keeps_identifiers() {
        let mut session = Session::new();
        session.set_room("ABCD");
        session.set_player_id(Some("p1".to_string()));
        session.set_opponent_present(true);
        session.enter_grace(GraceCause::OpponentLeft, Some(20));

        let outcome = game_over::normalize(&Default::default(), &session.identity());
        session.apply_outcome(outcome);

        assert!(session.is_terminated());
        assert_eq!(session.room_code.as_deref(), Some("ABCD"));
        assert_eq!(session.player_id.as_deref(), Some("p1"));
        assert_eq!(session.disconnect_countdown, None);
        assert!(!session.opponent_present);
    }

    #[test]
    fn test_grace_round_trip() {
        let mut session = Session::new();
        session.activate();
        session.enter_grace(GraceCause::OpponentLeft, Some(30));
        assert_eq!(session.phase, SessionPhase::Grace(GraceCause::OpponentLeft));

        session.leave_grace();
        assert_eq!(session.phase, SessionPhase::Active);
        assert_eq!(session.disconnect_countdown, None);
    }

    #[test]
    fn test_grace_ignored_after_termination() {
        let mut session = Session::new();
        session.apply_outcome(game_over::normalize(&Default::default(), &Default::default()));
        session.enter_grace(GraceCause::ConnectionLost, Some(5));
        assert!(session.is_terminated());
        assert_eq!(session.disconnect_countdown, None);
    }

    #[test]
    fn test_rematch_clears_outcome() {
        let mut session = Session::new();
        session.apply_outcome(game_over::normalize(&Default::default(), &Default::default()));
        session.set_rematch_offer(RematchOffer::OfferedByOpponent);
        assert_eq!(
            session.outcome.as_ref().map(|o| o.rematch.offer),
            Some(RematchOffer::OfferedByOpponent)
        );

        session.clear_outcome_for_rematch();
        assert!(session.outcome.is_none());
        assert_eq!(session.phase, SessionPhase::Active);
        assert!(session.board.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_expiry() {
        let mut session = Session::new();
        let now = Instant::now();
        session.set_status("Connection problem", now + Duration::from_secs(4));

        assert!(!session.expire_status(now + Duration::from_secs(3)));
        assert!(session.expire_status(now + Duration::from_secs(4)));
        assert!(session.status.is_none());
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut session = Session::new();
        session.begin_joining("ABCD");
        session.set_player_id(Some("p1".to_string()));
        session.reset();
        assert_eq!(session.phase, SessionPhase::Idle);
        assert!(session.room_code.is_none());
        assert!(session.player_id.is_none());
    }
}
