//! Inbound push events.
//!
//! The hub delivers events as a method name plus either positional
//! arguments or a single object. Parsing is lenient: every field is optional
//! and a malformed field degrades to `None` for the handler to default.

use crate::{id_from, lenient, Board, GameOverDto, GameStateDto};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EventParseError {
    #[error("unknown push event '{0}'")]
    UnknownEvent(String),
    #[error("malformed '{event}' payload: {reason}")]
    Malformed { event: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardUpdate {
    pub board: Option<Board>,
    pub current_symbol: Option<Value>,
    pub is_over: Option<Value>,
    pub winner_label: Option<Value>,
    pub turn_expiry: Option<Value>,
    pub server_timestamp: Option<Value>,
    pub remaining_seconds: Option<Value>,
    pub correlation_id: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameCreated {
    #[serde(deserialize_with = "lenient::id")]
    pub code: Option<String>,
    pub board: Option<Board>,
    pub player_id: Option<Value>,
    pub correlation_id: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameJoined {
    #[serde(deserialize_with = "lenient::id")]
    pub code: Option<String>,
    pub board: Option<Board>,
    pub symbol: Option<Value>,
    pub current_symbol: Option<Value>,
    pub player_id: Option<Value>,
    pub correlation_id: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameStarted {
    pub board: Option<Board>,
    pub current_symbol: Option<Value>,
}

/// Shared shape of the three turn countdown events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnCountdown {
    pub player_id: Option<Value>,
    pub remaining_seconds: Option<Value>,
    pub turn_expiry: Option<Value>,
    pub server_timestamp: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RematchWindow {
    pub expiry: Option<Value>,
    pub server_timestamp: Option<Value>,
    pub remaining_seconds: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PlayerRef {
    #[serde(alias = "offeredByPlayerId", alias = "offeredBy")]
    player_id: Option<Value>,
    #[serde(alias = "secondsLeft")]
    seconds: Option<Value>,
    #[serde(deserialize_with = "lenient::id")]
    code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    BoardUpdated(BoardUpdate),
    GameCreated(GameCreated),
    GameJoined(GameJoined),
    GameStarted(GameStarted),
    GameFull { code: Option<String> },
    PlayerJoined,
    PlayerLeft { player_id: Option<String> },
    CountdownTick { player_id: Option<String>, seconds_left: Option<Value> },
    TurnCountdownTick(TurnCountdown),
    TurnCountdownResumed(TurnCountdown),
    TurnCountdownPaused(TurnCountdown),
    PlayerReconnected { player_id: Option<String> },
    RematchWindowStarted(RematchWindow),
    RematchOffered { offered_by: Option<String> },
    RematchStarted,
    RematchWindowExpired,
    RematchCancelled,
    GameOver(GameOverDto),
    SyncedState(GameStateDto),
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::BoardUpdated(_) => "BoardUpdated",
            PushEvent::GameCreated(_) => "GameCreated",
            PushEvent::GameJoined(_) => "GameJoined",
            PushEvent::GameStarted(_) => "GameStarted",
            PushEvent::GameFull { .. } => "GameFull",
            PushEvent::PlayerJoined => "PlayerJoined",
            PushEvent::PlayerLeft { .. } => "PlayerLeft",
            PushEvent::CountdownTick { .. } => "CountdownTick",
            PushEvent::TurnCountdownTick(_) => "TurnCountdownTick",
            PushEvent::TurnCountdownResumed(_) => "TurnCountdownResumed",
            PushEvent::TurnCountdownPaused(_) => "TurnCountdownPaused",
            PushEvent::PlayerReconnected { .. } => "PlayerReconnected",
            PushEvent::RematchWindowStarted(_) => "RematchWindowStarted",
            PushEvent::RematchOffered { .. } => "RematchOffered",
            PushEvent::RematchStarted => "RematchStarted",
            PushEvent::RematchWindowExpired => "RematchWindowExpired",
            PushEvent::RematchCancelled => "RematchCancelled",
            PushEvent::GameOver(_) => "GameOver",
            PushEvent::SyncedState(_) => "SyncedState",
        }
    }

    /// Parses a hub push. `payload` may be an array of positional arguments,
    /// a single object, or null for argument-less events.
    pub fn parse(name: &str, payload: Value) -> Result<Self, EventParseError> {
        let event = match name {
            "BoardUpdated" => PushEvent::BoardUpdated(decode(
                name,
                &[
                    "board",
                    "currentSymbol",
                    "isOver",
                    "winnerLabel",
                    "turnExpiry",
                    "serverTimestamp",
                    "remainingSeconds",
                ],
                payload,
            )?),
            "GameCreated" => {
                PushEvent::GameCreated(decode(name, &["code", "board", "playerId"], payload)?)
            }
            "GameJoined" => PushEvent::GameJoined(decode(
                name,
                &["code", "board", "symbol", "currentSymbol", "playerId"],
                payload,
            )?),
            "GameStarted" => {
                PushEvent::GameStarted(decode(name, &["board", "currentSymbol"], payload)?)
            }
            "GameFull" => {
                let r: PlayerRef = decode(name, &["code"], payload)?;
                PushEvent::GameFull { code: r.code }
            }
            "PlayerJoined" => PushEvent::PlayerJoined,
            "PlayerLeft" => PushEvent::PlayerLeft {
                player_id: player_ref(name, payload)?,
            },
            "CountdownTick" => {
                let r: PlayerRef = decode(name, &["playerId", "secondsLeft"], payload)?;
                PushEvent::CountdownTick {
                    player_id: r.player_id.as_ref().and_then(id_from),
                    seconds_left: r.seconds,
                }
            }
            "TurnCountdownTick" => PushEvent::TurnCountdownTick(turn_countdown(name, payload)?),
            "TurnCountdownResumed" => {
                PushEvent::TurnCountdownResumed(turn_countdown(name, payload)?)
            }
            "TurnCountdownPaused" => PushEvent::TurnCountdownPaused(turn_countdown(name, payload)?),
            "PlayerReconnected" => PushEvent::PlayerReconnected {
                player_id: player_ref(name, payload)?,
            },
            "RematchWindowStarted" => PushEvent::RematchWindowStarted(decode(
                name,
                &["expiry", "serverTimestamp", "remainingSeconds"],
                payload,
            )?),
            "RematchOffered" => PushEvent::RematchOffered {
                offered_by: player_ref(name, payload)?,
            },
            "RematchStarted" => PushEvent::RematchStarted,
            "RematchWindowExpired" => PushEvent::RematchWindowExpired,
            "RematchCancelled" => PushEvent::RematchCancelled,
            "GameOver" => PushEvent::GameOver(decode(name, &[], payload)?),
            "SyncedState" => PushEvent::SyncedState(decode(name, &[], payload)?),
            other => return Err(EventParseError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }
}

fn player_ref(name: &str, payload: Value) -> Result<Option<String>, EventParseError> {
    let r: PlayerRef = decode(name, &["playerId"], payload)?;
    Ok(r.player_id.as_ref().and_then(id_from))
}

fn turn_countdown(name: &str, payload: Value) -> Result<TurnCountdown, EventParseError> {
    decode(
        name,
        &["playerId", "remainingSeconds", "turnExpiry", "serverTimestamp"],
        payload,
    )
}

fn decode<T: DeserializeOwned>(
    name: &str,
    keys: &[&str],
    payload: Value,
) -> Result<T, EventParseError> {
    let object = named_arguments(keys, payload);
    serde_json::from_value(Value::Object(object)).map_err(|e| EventParseError::Malformed {
        event: name.to_string(),
        reason: e.to_string(),
    })
}

/// Maps positional hub arguments onto field names. A lone object argument
/// is taken as the named form; scalars fill the first key.
fn named_arguments(keys: &[&str], payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map,
        Value::Array(mut items) => {
            if items.len() == 1 && items[0].is_object() {
                if let Some(Value::Object(map)) = items.pop() {
                    return map;
                }
            }
            keys.iter()
                .zip(items)
                .map(|(key, value)| (key.to_string(), value))
                .collect()
        }
        Value::Null => Map::new(),
        scalar => keys
            .first()
            .map(|key| {
                let mut map = Map::new();
                map.insert(key.to_string(), scalar);
                map
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;
    use serde_json::json;

    #[test]
    fn test_parse_positional_board_update() {
        let event = PushEvent::parse(
            "BoardUpdated",
            json!([["X", "", "", "", "O"], "x", false, null, 1_700_000_030_000i64, 1_700_000_000_000i64]),
        )
        .unwrap();

        match event {
            PushEvent::BoardUpdated(update) => {
                assert_eq!(update.board.unwrap().get(4), Some(Symbol::O));
                assert_eq!(update.current_symbol, Some(json!("x")));
                assert!(update.turn_expiry.is_some());
                assert!(update.remaining_seconds.is_none());
            }
            other => panic!("Wrong event parsed: {:?}", other),
        }
    }

    #[test]
    fn test_parse_named_game_joined() {
        let event = PushEvent::parse(
            "GameJoined",
            json!({"code": "ABCD", "board": [0,0,0,0,0,0,0,0,0], "symbol": "O", "playerId": 7}),
        )
        .unwrap();

        match event {
            PushEvent::GameJoined(joined) => {
                assert_eq!(joined.code.as_deref(), Some("ABCD"));
                assert_eq!(joined.player_id, Some(json!(7)));
                assert!(joined.board.unwrap().is_empty());
            }
            other => panic!("Wrong event parsed: {:?}", other),
        }
    }

    #[test]
    fn test_parse_single_object_argument() {
        let event = PushEvent::parse(
            "GameOver",
            json!([{"result": 2, "correlationId": "c1"}]),
        )
        .unwrap();
        match event {
            PushEvent::GameOver(dto) => {
                assert_eq!(dto.result, Some(json!(2)));
                assert_eq!(dto.correlation_id().as_deref(), Some("c1"));
            }
            other => panic!("Wrong event parsed: {:?}", other),
        }
    }

    #[test]
    fn test_parse_scalar_and_empty_payloads() {
        assert_eq!(
            PushEvent::parse("PlayerLeft", json!("p2")).unwrap(),
            PushEvent::PlayerLeft {
                player_id: Some("p2".to_string())
            }
        );
        assert_eq!(
            PushEvent::parse("PlayerJoined", Value::Null).unwrap(),
            PushEvent::PlayerJoined
        );
        assert_eq!(
            PushEvent::parse("RematchOffered", json!({"offeredByPlayerId": 3})).unwrap(),
            PushEvent::RematchOffered {
                offered_by: Some("3".to_string())
            }
        );
    }

    #[test]
    fn test_parse_missing_fields_default() {
        let event = PushEvent::parse("TurnCountdownTick", json!({})).unwrap();
        assert_eq!(event, PushEvent::TurnCountdownTick(TurnCountdown::default()));
    }

    #[test]
    fn test_parse_unknown_event() {
        let result = PushEvent::parse("Bogus", json!([]));
        assert_eq!(result, Err(EventParseError::UnknownEvent("Bogus".to_string())));
    }

    #[test]
    fn test_parse_wrong_field_types_keep_the_event() {
        let event = PushEvent::parse("GameCreated", json!({"code": 12, "board": {"x": 1}})).unwrap();
        match event {
            PushEvent::GameCreated(created) => {
                assert_eq!(created.code.as_deref(), Some("12"));
                assert!(created.board.unwrap().is_empty());
            }
            other => panic!("Wrong event parsed: {:?}", other),
        }

        let event = PushEvent::parse(
            "GameOver",
            json!({"result": 0, "winner": "X", "message": 42, "board": true}),
        )
        .unwrap();
        match event {
            PushEvent::GameOver(dto) => {
                assert_eq!(dto.message, None);
                assert_eq!(dto.winner_symbol, Some(json!("X")));
            }
            other => panic!("Wrong event parsed: {:?}", other),
        }

        let event = PushEvent::parse(
            "SyncedState",
            json!({"code": ["A"], "players": 3, "gameOver": "yes", "board": "X--------"}),
        )
        .unwrap();
        match event {
            PushEvent::SyncedState(state) => {
                assert_eq!(state.room_code, None);
                assert!(state.players.is_empty());
                assert!(state.game_over.is_none());
                assert!(state.is_full_state());
            }
            other => panic!("Wrong event parsed: {:?}", other),
        }
    }

    #[test]
    fn test_event_names_roundtrip() {
        let names = [
            "BoardUpdated",
            "GameCreated",
            "GameJoined",
            "GameStarted",
            "GameFull",
            "PlayerJoined",
            "PlayerLeft",
            "CountdownTick",
            "TurnCountdownTick",
            "TurnCountdownResumed",
            "TurnCountdownPaused",
            "PlayerReconnected",
            "RematchWindowStarted",
            "RematchOffered",
            "RematchStarted",
            "RematchWindowExpired",
            "RematchCancelled",
            "GameOver",
            "SyncedState",
        ];
        for name in names {
            let event = PushEvent::parse(name, Value::Null).unwrap();
            assert_eq!(event.name(), name);
        }
    }
}
