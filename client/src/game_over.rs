//! Game-over normalization.
//!
//! A termination can reach the client inside a move response or as a
//! `GameOver` broadcast, in several shapes. Both paths go through
//! [`reconcile`] so the displayed result does not depend on which channel
//! arrived first.

use serde_json::Value;
use shared::{id_from, number_from, Board, GameOverDto, Symbol};
use std::fmt;

use crate::clock::clamp_seconds;

const DIAGNOSTIC_MARKERS: [&str; 7] = [
    "internal",
    "debug",
    "won by",
    "exception",
    "stack",
    "undefined",
    "null",
];
const DIAGNOSTIC_MAX_WORDS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultCode {
    Winner,
    Forfeit,
    Draw,
    Cancelled,
    /// Unrecognized codes pass through untouched.
    Other(String),
}

impl ResultCode {
    /// Accepts the server's numeric codes (0 winner, 1 forfeit, 2 draw,
    /// 3 cancelled) or case-insensitive string synonyms. Null or empty
    /// input yields `None`.
    pub fn normalize(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::from_number(n.as_f64()?)),
            Value::String(s) => Self::from_label(s),
            _ => None,
        }
    }

    fn from_number(code: f64) -> Self {
        match code as i64 {
            0 if code == 0.0 => ResultCode::Winner,
            1 if code == 1.0 => ResultCode::Forfeit,
            2 if code == 2.0 => ResultCode::Draw,
            3 if code == 3.0 => ResultCode::Cancelled,
            _ => ResultCode::Other(code.to_string()),
        }
    }

    fn from_label(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(code) = trimmed.parse::<f64>() {
            return Some(Self::from_number(code));
        }

        let code = match trimmed.to_ascii_lowercase().as_str() {
            "winner" | "win" | "won" | "victory" => ResultCode::Winner,
            "draw" | "tie" | "tied" | "stalemate" | "drawn" | "drew" => ResultCode::Draw,
            "forfeit" | "forfeited" | "resigned" | "abandoned" => ResultCode::Forfeit,
            "cancelled" | "canceled" | "expired" | "aborted" => ResultCode::Cancelled,
            _ => ResultCode::Other(trimmed.to_string()),
        };
        Some(code)
    }
}

/// Outcome from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Win,
    Loss,
    Draw,
    Forfeit,
    RoomExpired,
    Info,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RematchOffer {
    #[default]
    NotOffered,
    OfferedByMe,
    OfferedByOpponent,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RematchState {
    pub offer: RematchOffer,
    pub remaining_seconds: Option<u32>,
}

/// Who the local player is, for deciding win versus loss.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalIdentity {
    pub symbol: Option<Symbol>,
    pub player_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalOutcome {
    pub kind: OutcomeKind,
    pub result: Option<ResultCode>,
    pub winner_symbol: Option<Symbol>,
    pub winner_player_id: Option<String>,
    /// `None` when the winner cannot be compared with the local identity.
    pub local_won: Option<bool>,
    pub board: Option<Board>,
    pub message: String,
    pub correlation_id: Option<String>,
    pub rematch: RematchState,
}

impl fmt::Display for CanonicalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Normalizes `dto` and carries rematch negotiation over from the outcome
/// already on screen.
pub fn reconcile(
    dto: &GameOverDto,
    identity: &LocalIdentity,
    previous: Option<&CanonicalOutcome>,
) -> CanonicalOutcome {
    let mut outcome = normalize(dto, identity);
    if let Some(previous) = previous {
        merge_rematch(&mut outcome, previous);
    }
    outcome
}

pub fn normalize(dto: &GameOverDto, identity: &LocalIdentity) -> CanonicalOutcome {
    let board = dto.board;
    let mut result = dto.result.as_ref().and_then(ResultCode::normalize);
    let mut winner_symbol = dto.winner_symbol.as_ref().and_then(Symbol::from_value);
    let winner_player_id = dto.winner_player_id.as_ref().and_then(id_from);

    if winner_symbol.is_none() {
        if let Some(board) = &board {
            winner_symbol = board.winner();
            if winner_symbol.is_none() && board.is_full() && result == Some(ResultCode::Winner) {
                result = Some(ResultCode::Draw);
            }
        }
    }

    if result.is_none() {
        if winner_symbol.is_some() || winner_player_id.is_some() {
            result = Some(ResultCode::Winner);
        } else if board.map(|b| b.is_full()).unwrap_or(false) {
            result = Some(ResultCode::Draw);
        }
    }

    let local_won = match (winner_symbol, identity.symbol) {
        (Some(winner), Some(mine)) => Some(winner == mine),
        _ => match (&winner_player_id, &identity.player_id) {
            (Some(winner), Some(mine)) => Some(ids_equal(winner, mine)),
            _ => None,
        },
    };

    let kind = match &result {
        Some(ResultCode::Winner) => match local_won {
            Some(true) => OutcomeKind::Win,
            Some(false) => OutcomeKind::Loss,
            None => OutcomeKind::Info,
        },
        Some(ResultCode::Draw) => OutcomeKind::Draw,
        Some(ResultCode::Forfeit) => OutcomeKind::Forfeit,
        Some(ResultCode::Cancelled) => OutcomeKind::RoomExpired,
        Some(ResultCode::Other(_)) | None => OutcomeKind::Info,
    };

    let message = match dto.message.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() && !is_internal_diagnostic(raw) => raw.to_string(),
        _ => template(kind, winner_symbol, identity.symbol, local_won),
    };

    let rematch = RematchState {
        offer: match dto.rematch_offered_by.as_ref().and_then(id_from) {
            Some(by) => match &identity.player_id {
                Some(me) if ids_equal(&by, me) => RematchOffer::OfferedByMe,
                _ => RematchOffer::OfferedByOpponent,
            },
            None => RematchOffer::NotOffered,
        },
        remaining_seconds: dto
            .rematch_remaining_seconds
            .as_ref()
            .and_then(number_from)
            .map(clamp_seconds),
    };

    CanonicalOutcome {
        kind,
        result,
        winner_symbol,
        winner_player_id,
        local_won,
        board,
        message,
        correlation_id: dto.correlation_id(),
        rematch,
    }
}

/// Keeps rematch negotiation already visible to the user when a later
/// termination event does not carry it.
pub fn merge_rematch(outcome: &mut CanonicalOutcome, previous: &CanonicalOutcome) {
    if outcome.rematch.offer == RematchOffer::NotOffered {
        outcome.rematch.offer = previous.rematch.offer;
    }
    if outcome.rematch.remaining_seconds.is_none() {
        outcome.rematch.remaining_seconds = previous.rematch.remaining_seconds;
    }
}

/// Heuristic for server text that should never reach the user: short
/// messages containing internal-sounding words, or anything JSON-shaped.
/// It matches against free text and will misfire on unusual phrasing.
pub fn is_internal_diagnostic(message: &str) -> bool {
    let trimmed = message.trim();
    let json_shaped = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if json_shaped {
        return true;
    }

    let lowered = trimmed.to_ascii_lowercase();
    trimmed.split_whitespace().count() <= DIAGNOSTIC_MAX_WORDS
        && DIAGNOSTIC_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Numeric and string forms of the same id compare equal.
pub fn ids_equal(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a == b {
        return true;
    }
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

fn template(
    kind: OutcomeKind,
    winner: Option<Symbol>,
    mine: Option<Symbol>,
    local_won: Option<bool>,
) -> String {
    match kind {
        OutcomeKind::Win => match mine {
            Some(symbol) => format!("You win as {}!", symbol),
            None => "You win!".to_string(),
        },
        OutcomeKind::Loss => match winner {
            Some(symbol) => format!("{} wins. Better luck next time!", symbol),
            None => "You lose. Better luck next time!".to_string(),
        },
        OutcomeKind::Draw => "It's a draw!".to_string(),
        OutcomeKind::Forfeit => match (local_won, winner) {
            (Some(true), _) => "Your opponent forfeited. You win!".to_string(),
            (Some(false), _) => "You forfeited the game.".to_string(),
            (None, Some(symbol)) => format!("{} wins by forfeit.", symbol),
            (None, None) => "The game ended by forfeit.".to_string(),
        },
        OutcomeKind::RoomExpired => "The game was cancelled.".to_string(),
        OutcomeKind::Info => match winner {
            Some(symbol) => format!("{} wins!", symbol),
            None => "Game over.".to_string(),
        },
    }
}
