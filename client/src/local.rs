//! Offline hot-seat play on one device.
//!
//! Both players share the board and the turn clock runs in local mode.
//! A turn that runs out ends the game in favor of the other player.

use crate::error::ClientError;
use crate::game_over::{self, CanonicalOutcome, LocalIdentity};
use crate::timer::{TickOutcome, TurnCountdowns, TurnTimer};
use log::{debug, info};
use serde_json::json;
use shared::{Board, GameOverDto, Symbol};

#[derive(Debug)]
pub struct LocalMatch {
    board: Board,
    current: Symbol,
    timer: TurnTimer,
    turn_duration_secs: u32,
    outcome: Option<CanonicalOutcome>,
}

impl LocalMatch {
    pub fn new(turn_duration_secs: u32) -> Self {
        let mut game = Self {
            board: Board::empty(),
            current: Symbol::X,
            timer: TurnTimer::default(),
            turn_duration_secs: turn_duration_secs.max(1),
            outcome: None,
        };
        game.restart_clock();
        game
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current_turn(&self) -> Symbol {
        self.current
    }

    pub fn outcome(&self) -> Option<&CanonicalOutcome> {
        self.outcome.as_ref()
    }

    pub fn countdowns(&self) -> TurnCountdowns {
        self.timer.countdowns()
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Places the current player's symbol. Returns the outcome when the
    /// move ends the game.
    pub fn play(&mut self, cell: usize) -> Result<Option<&CanonicalOutcome>, ClientError> {
        if self.is_over() {
            return Err(ClientError::rejected("MakeMove", Some("GAME_OVER"), None));
        }
        let board = self
            .board
            .with_move(cell, self.current)
            .ok_or(ClientError::InvalidMove(cell))?;
        self.board = board;

        if board.winner().is_some() || board.is_full() {
            self.finish(GameOverDto {
                board: Some(board),
                ..GameOverDto::default()
            });
            return Ok(self.outcome.as_ref());
        }

        self.current = self.current.other();
        self.restart_clock();
        Ok(None)
    }

    /// One local second.
    pub fn tick(&mut self) -> TickOutcome {
        let outcome = self.timer.local_tick(Some(self.current), None);
        if let TickOutcome::TimedOut(loser) = outcome {
            info!("{} ran out of time", loser);
            self.finish(GameOverDto {
                result: Some(json!("forfeit")),
                winner_symbol: Some(json!(loser.other().as_str())),
                board: Some(self.board),
                ..GameOverDto::default()
            });
        }
        outcome
    }

    pub fn restart(&mut self) {
        self.board = Board::empty();
        self.current = Symbol::X;
        self.outcome = None;
        self.restart_clock();
    }

    fn restart_clock(&mut self) {
        self.timer
            .start_local(self.turn_duration_secs, Some(self.current), None);
    }

    fn finish(&mut self, dto: GameOverDto) {
        self.timer.clear();
        let outcome = game_over::normalize(&dto, &LocalIdentity::default());
        debug!("Local game finished: {:?}", outcome.kind);
        self.outcome = Some(outcome);
    }
}
