//! Error taxonomy for the synchronization client.
//!
//! Every operation returns [`ClientError`]; the event loop uses
//! [`ClientError::kind`] to decide between logging, a transient status
//! message, or routing back to the idle screen.

use std::time::Duration;
use thiserror::Error;

const GENERIC_RETRY_MESSAGE: &str = "Connection problem. Please try again.";
const DEFAULT_REJECTION_MESSAGE: &str = "Something went wrong. Please try again.";

/// Structured rejection codes the server places in a response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    ReconnectRequired,
    AlreadyInRoom,
    PlayerIdInUse,
    GameFull,
    NotYourTurn,
    InvalidMove,
    GameOver,
    RematchUnavailable,
    Other(String),
}

impl ErrorCode {
    /// Case, dash and space insensitive.
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();

        match normalized.as_str() {
            "NOT_FOUND" | "GAME_NOT_FOUND" | "ROOM_NOT_FOUND" => ErrorCode::NotFound,
            "RECONNECT_REQUIRED" | "USE_RECONNECT" => ErrorCode::ReconnectRequired,
            "ALREADY_IN_ROOM" | "ALREADY_JOINED" => ErrorCode::AlreadyInRoom,
            "PLAYER_ID_IN_USE" | "PLAYER_ALREADY_CONNECTED" => ErrorCode::PlayerIdInUse,
            "GAME_FULL" | "ROOM_FULL" => ErrorCode::GameFull,
            "NOT_YOUR_TURN" => ErrorCode::NotYourTurn,
            "INVALID_MOVE" | "CELL_OCCUPIED" => ErrorCode::InvalidMove,
            "GAME_OVER" | "GAME_ALREADY_OVER" => ErrorCode::GameOver,
            "REMATCH_UNAVAILABLE" | "REMATCH_EXPIRED" => ErrorCode::RematchUnavailable,
            _ => ErrorCode::Other(raw.trim().to_string()),
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "That game no longer exists. Start a new one.",
            ErrorCode::ReconnectRequired => "Reconnecting to your game...",
            ErrorCode::AlreadyInRoom => "You are already in this game.",
            ErrorCode::PlayerIdInUse => {
                "This game is already open elsewhere. Use a separate browser session to play as another player."
            }
            ErrorCode::GameFull => "This game already has two players.",
            ErrorCode::NotYourTurn => "Wait for your turn.",
            ErrorCode::InvalidMove => "That square is already taken.",
            ErrorCode::GameOver => "This game has already ended.",
            ErrorCode::RematchUnavailable => "The rematch is no longer available.",
            ErrorCode::Other(_) => DEFAULT_REJECTION_MESSAGE,
        }
    }

    /// Conditions after which the session cannot continue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ErrorCode::NotFound | ErrorCode::PlayerIdInUse)
    }
}

/// Taxonomy used by callers to pick a propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Rejected,
    Cosmetic,
    Malformed,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("server rejected {method}: {code:?}")]
    Rejected {
        method: &'static str,
        code: ErrorCode,
        message: Option<String>,
    },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("cell {0} is not playable")]
    InvalidMove(usize),

    #[error("no active session")]
    NoSession,
}

impl ClientError {
    pub fn rejected(method: &'static str, code: Option<&str>, message: Option<String>) -> Self {
        ClientError::Rejected {
            method,
            code: code.map(ErrorCode::parse).unwrap_or_else(|| ErrorCode::Other(String::new())),
            message,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_) | ClientError::Timeout(_) => ErrorKind::Transport,
            ClientError::Rejected { .. } | ClientError::InvalidMove(_) | ClientError::NoSession => {
                ErrorKind::Rejected
            }
            ClientError::Storage(_) => ErrorKind::Cosmetic,
            ClientError::Malformed(_) => ErrorKind::Malformed,
        }
    }

    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            ClientError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.code().map(ErrorCode::is_terminal).unwrap_or(false)
    }

    /// Text safe to show the user. Raw server messages are never echoed.
    pub fn user_message(&self) -> &'static str {
        match self {
            ClientError::Transport(_) | ClientError::Timeout(_) => GENERIC_RETRY_MESSAGE,
            ClientError::Rejected { code, .. } => code.user_message(),
            ClientError::InvalidMove(_) => ErrorCode::InvalidMove.user_message(),
            ClientError::NoSession => "You are not in a game.",
            ClientError::Storage(_) | ClientError::Malformed(_) => DEFAULT_REJECTION_MESSAGE,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_parsing_is_lenient() {
        assert_eq!(ErrorCode::parse("not_found"), ErrorCode::NotFound);
        assert_eq!(ErrorCode::parse("Game-Not-Found"), ErrorCode::NotFound);
        assert_eq!(ErrorCode::parse("reconnect required"), ErrorCode::ReconnectRequired);
        assert_eq!(ErrorCode::parse("ALREADY_IN_ROOM"), ErrorCode::AlreadyInRoom);
        assert_eq!(ErrorCode::parse("PLAYER_ID_IN_USE"), ErrorCode::PlayerIdInUse);
        assert_eq!(
            ErrorCode::parse(" SOMETHING_NEW "),
            ErrorCode::Other("SOMETHING_NEW".to_string())
        );
    }

    #[test]
    fn test_unknown_code_uses_default_message() {
        let code = ErrorCode::parse("WHATEVER");
        assert_eq!(code.user_message(), DEFAULT_REJECTION_MESSAGE);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ClientError::Transport("reset".into()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            ClientError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Transport
        );
        assert_eq!(ClientError::Storage("disk".into()).kind(), ErrorKind::Cosmetic);
        assert_eq!(ClientError::Malformed("x".into()).kind(), ErrorKind::Malformed);
        assert_eq!(
            ClientError::rejected("JoinGame", Some("NOT_FOUND"), None).kind(),
            ErrorKind::Rejected
        );
    }

    #[test]
    fn test_terminal_conditions() {
        assert!(ClientError::rejected("JoinGame", Some("NOT_FOUND"), None).is_terminal());
        assert!(ClientError::rejected("JoinGame", Some("PLAYER_ID_IN_USE"), None).is_terminal());
        assert!(!ClientError::rejected("MakeMove", Some("NOT_YOUR_TURN"), None).is_terminal());
        assert!(!ClientError::Transport("down".into()).is_terminal());
    }

    #[test]
    fn test_user_message_never_echoes_server_text() {
        let error = ClientError::rejected(
            "MakeMove",
            Some("BOOM"),
            Some("NullReferenceException at Hub.MakeMove".to_string()),
        );
        assert!(!error.user_message().contains("NullReference"));
    }
}
