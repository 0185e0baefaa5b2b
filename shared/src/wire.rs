//! Outbound hub calls, the uniform response envelope and the state DTOs
//! carried inside envelopes and push events.

use crate::{flag_from, id_from, lenient, Board};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Every RPC the client issues against the authoritative server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCall {
    CreateGame,
    JoinGame {
        code: String,
        player_id: Option<String>,
    },
    MakeMove {
        code: String,
        cell_index: usize,
        player_id: Option<String>,
    },
    Reconnect {
        code: String,
        player_id: String,
    },
    GetGameState {
        code: String,
        player_id: Option<String>,
    },
    GetRoomState {
        code: String,
        player_id: Option<String>,
    },
    OfferRematch {
        code: String,
    },
    AcceptRematch {
        code: String,
    },
}

impl HubCall {
    /// Hub method name as registered on the server.
    pub fn method(&self) -> &'static str {
        match self {
            HubCall::CreateGame => "CreateGame",
            HubCall::JoinGame { .. } => "JoinGame",
            HubCall::MakeMove { .. } => "MakeMove",
            HubCall::Reconnect { .. } => "Reconnect",
            HubCall::GetGameState { .. } => "GetGameState",
            HubCall::GetRoomState { .. } => "GetRoomState",
            HubCall::OfferRematch { .. } => "OfferRematch",
            HubCall::AcceptRematch { .. } => "AcceptRematch",
        }
    }

    /// Positional arguments in hub invocation order.
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            HubCall::CreateGame => Vec::new(),
            HubCall::JoinGame { code, player_id }
            | HubCall::GetGameState { code, player_id }
            | HubCall::GetRoomState { code, player_id } => vec![json!(code), json!(player_id)],
            HubCall::MakeMove {
                code,
                cell_index,
                player_id,
            } => vec![json!(code), json!(cell_index), json!(player_id)],
            HubCall::Reconnect { code, player_id } => vec![json!(code), json!(player_id)],
            HubCall::OfferRematch { code } | HubCall::AcceptRematch { code } => vec![json!(code)],
        }
    }

    pub fn room_code(&self) -> Option<&str> {
        match self {
            HubCall::CreateGame => None,
            HubCall::JoinGame { code, .. }
            | HubCall::MakeMove { code, .. }
            | HubCall::Reconnect { code, .. }
            | HubCall::GetGameState { code, .. }
            | HubCall::GetRoomState { code, .. }
            | HubCall::OfferRematch { code }
            | HubCall::AcceptRematch { code } => Some(code),
        }
    }
}

/// Uniform envelope returned by every hub call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubResponse {
    #[serde(deserialize_with = "lenient::flag")]
    pub success: bool,
    pub payload: Option<Value>,
    #[serde(deserialize_with = "lenient::id")]
    pub error_code: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub error_message: Option<String>,
    #[serde(deserialize_with = "lenient::id")]
    pub correlation_id: Option<String>,
    pub server_timestamp: Option<Value>,
}

impl HubResponse {
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            ..Self::default()
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn rejected(code: &str, message: &str) -> Self {
        Self {
            success: false,
            error_code: Some(code.to_string()),
            error_message: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_correlation(mut self, id: &str) -> Self {
        self.correlation_id = Some(id.to_string());
        self
    }

    pub fn with_server_timestamp(mut self, timestamp: Value) -> Self {
        self.server_timestamp = Some(timestamp);
        self
    }

    /// Payload parsed as a game state, if it parses at all. The envelope's server
    /// timestamp fills in for a payload without one.
    pub fn state(&self) -> Option<GameStateDto> {
        let payload = self.payload.as_ref()?;
        if !payload.is_object() {
            return None;
        }
        let mut state: GameStateDto = serde_json::from_value(payload.clone()).ok()?;
        if state.server_timestamp.is_none() {
            state.server_timestamp = self.server_timestamp.clone();
        }
        Some(state)
    }

    /// Payload parsed as a game state that carries a board.
    pub fn full_state(&self) -> Option<GameStateDto> {
        self.state().filter(GameStateDto::is_full_state)
    }
}

/// Player entry in a room snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerInfo {
    #[serde(alias = "id")]
    pub player_id: Option<Value>,
    pub symbol: Option<Value>,
    pub connected: Option<Value>,
}

impl PlayerInfo {
    pub fn is_connected(&self) -> bool {
        self.connected.as_ref().map(flag_from).unwrap_or(true)
    }
}

/// Authoritative game or room state, as returned by join/reconnect/state
/// calls and pushed as `SyncedState`. Every field is optional: callers apply
/// whatever is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameStateDto {
    #[serde(alias = "code", deserialize_with = "lenient::id")]
    pub room_code: Option<String>,
    pub board: Option<Board>,
    #[serde(alias = "currentTurn", alias = "currentPlayer")]
    pub current_symbol: Option<Value>,
    #[serde(alias = "yourSymbol", alias = "playerSymbol")]
    pub symbol: Option<Value>,
    pub player_id: Option<Value>,
    #[serde(alias = "isOver")]
    pub is_game_over: Option<Value>,
    #[serde(deserialize_with = "lenient::record")]
    pub game_over: Option<GameOverDto>,
    pub winner_label: Option<Value>,
    pub turn_expiry: Option<Value>,
    pub server_timestamp: Option<Value>,
    pub remaining_seconds: Option<Value>,
    pub opponent_present: Option<Value>,
    pub player_count: Option<Value>,
    #[serde(deserialize_with = "lenient::list")]
    pub players: Vec<PlayerInfo>,
}

impl GameStateDto {
    pub fn is_full_state(&self) -> bool {
        self.board.is_some()
    }

    pub fn is_over(&self) -> bool {
        self.is_game_over.as_ref().map(flag_from).unwrap_or(false) || self.game_over.is_some()
    }

    pub fn player_id(&self) -> Option<String> {
        self.player_id.as_ref().and_then(id_from)
    }

    /// Opponent presence from whichever field the server filled in.
    pub fn opponent_present(&self, my_player_id: Option<&str>) -> Option<bool> {
        if let Some(flag) = &self.opponent_present {
            return Some(flag_from(flag));
        }
        if !self.players.is_empty() {
            let mut connected = self.players.iter().filter(|p| p.is_connected());
            return Some(match my_player_id {
                Some(me) => {
                    connected.any(|p| p.player_id.as_ref().and_then(id_from).as_deref() != Some(me))
                }
                None => connected.count() >= 2,
            });
        }
        self.player_count
            .as_ref()
            .and_then(crate::number_from)
            .map(|count| count >= 2.0)
    }

    /// Game-over record for this state, synthesized from the flat fields
    /// when the server did not attach a nested one.
    pub fn game_over_record(&self) -> Option<GameOverDto> {
        if let Some(nested) = &self.game_over {
            let mut record = nested.clone();
            if record.board.is_none() {
                record.board = self.board;
            }
            return Some(record);
        }
        if !self.is_over() {
            return None;
        }
        Some(GameOverDto {
            winner_symbol: self.winner_label.clone(),
            board: self.board,
            ..GameOverDto::default()
        })
    }
}

/// Termination payload in any of the shapes the server emits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameOverDto {
    #[serde(alias = "resultCode", alias = "outcome")]
    pub result: Option<Value>,
    #[serde(alias = "winner")]
    pub winner_symbol: Option<Value>,
    #[serde(alias = "winnerId")]
    pub winner_player_id: Option<Value>,
    pub board: Option<Board>,
    #[serde(deserialize_with = "lenient::text")]
    pub message: Option<String>,
    pub correlation_id: Option<Value>,
    pub rematch_offered_by: Option<Value>,
    pub rematch_remaining_seconds: Option<Value>,
}

impl GameOverDto {
    pub fn correlation_id(&self) -> Option<String> {
        self.correlation_id.as_ref().and_then(id_from)
    }
}
