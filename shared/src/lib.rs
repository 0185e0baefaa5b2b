//! Wire contract shared by the synchronization client and its test harnesses.
//!
//! The board model lives here together with the win-line evaluation, so the
//! client never has to trust a server-supplied winner it can check itself.
//! Outbound calls and the response envelope are in [`wire`], inbound push
//! events in [`events`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

pub mod events;
pub mod lenient;
pub mod wire;

pub use events::*;
pub use wire::*;

pub const BOARD_SIZE: usize = 9;
pub const TURN_DURATION_SECS: u32 = 30;

/// Three rows, three columns, two diagonals.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    pub fn other(self) -> Self {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Symbol::X => "X",
            Symbol::O => "O",
        }
    }

    /// Accepts numeric codes (1 = X, 2 = O) and any casing of the symbol
    /// letter, including labels such as `"x wins"` or `"Player O"`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(Symbol::X),
                Some(2) => Some(Symbol::O),
                _ => None,
            },
            Value::String(s) => Self::from_label(s),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        match trimmed {
            "1" => return Some(Symbol::X),
            "2" => return Some(Symbol::O),
            _ => {}
        }

        trimmed
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|token| match token {
                "X" | "x" => Some(Symbol::X),
                "O" | "o" => Some(Symbol::O),
                _ => None,
            })
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical board: always exactly nine cells.
///
/// Every raw encoding the server has used goes through [`Board::normalize`]
/// and the result is replaced wholesale on each authoritative update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Board {
    cells: [Option<Symbol>; BOARD_SIZE],
}

impl Board {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalizes any raw board encoding into the canonical form.
    ///
    /// Arrays are truncated or padded to nine cells; cells may be numeric
    /// codes (0 empty, 1 X, 2 O), symbol strings in any case, or null.
    /// Flat strings such as `"XO-X--O--"`, JSON-encoded arrays and objects
    /// wrapping a `cells`/`board` field are also accepted. Anything else is
    /// an empty board.
    pub fn normalize(raw: &Value) -> Self {
        match raw {
            Value::Array(items) => {
                let mut cells = [None; BOARD_SIZE];
                for (slot, item) in cells.iter_mut().zip(items.iter()) {
                    *slot = cell_from_value(item);
                }
                Self { cells }
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.starts_with('[') {
                    return serde_json::from_str::<Value>(trimmed)
                        .map(|v| Self::normalize(&v))
                        .unwrap_or_default();
                }
                let mut cells = [None; BOARD_SIZE];
                for (slot, c) in cells.iter_mut().zip(trimmed.chars()) {
                    *slot = cell_from_char(c);
                }
                Self { cells }
            }
            Value::Object(map) => map
                .get("cells")
                .or_else(|| map.get("board"))
                .map(Self::normalize)
                .unwrap_or_default(),
            _ => Self::empty(),
        }
    }

    pub fn cells(&self) -> &[Option<Symbol>; BOARD_SIZE] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<Symbol> {
        self.cells.get(index).copied().flatten()
    }

    /// False for occupied cells and for indices off the board.
    pub fn is_cell_open(&self, index: usize) -> bool {
        matches!(self.cells.get(index), Some(None))
    }

    /// Returns a new board with the move applied, or `None` if the cell is
    /// taken or out of range.
    pub fn with_move(&self, index: usize, symbol: Symbol) -> Option<Self> {
        if !self.is_cell_open(index) {
            return None;
        }
        let mut next = *self;
        next.cells[index] = Some(symbol);
        Some(next)
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    pub fn winner(&self) -> Option<Symbol> {
        check_winner(self)
    }

    pub fn to_value(&self) -> Value {
        Value::Array(
            self.cells
                .iter()
                .map(|cell| Value::String(cell.map(Symbol::as_str).unwrap_or("").to_string()))
                .collect(),
        )
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            let line: Vec<String> = (0..3)
                .map(|col| {
                    let index = row * 3 + col;
                    match self.cells[index] {
                        Some(symbol) => symbol.to_string(),
                        None => index.to_string(),
                    }
                })
                .collect();
            writeln!(f, " {} ", line.join(" | "))?;
            if row < 2 {
                writeln!(f, "---+---+---")?;
            }
        }
        Ok(())
    }
}

impl Serialize for Board {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Board {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Board::normalize(&raw))
    }
}

fn cell_from_value(value: &Value) -> Option<Symbol> {
    match value {
        Value::String(s) => {
            let mut chars = s.trim().chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => cell_from_char(c),
                _ => None,
            }
        }
        other => Symbol::from_value(other),
    }
}

fn cell_from_char(c: char) -> Option<Symbol> {
    match c {
        'X' | 'x' | '1' => Some(Symbol::X),
        'O' | 'o' | '2' => Some(Symbol::O),
        _ => None,
    }
}

/// Returns the symbol owning one of the eight winning lines, if any.
pub fn check_winner(board: &Board) -> Option<Symbol> {
    WINNING_LINES.iter().find_map(|[a, b, c]| {
        let first = board.cells[*a]?;
        (board.cells[*b] == Some(first) && board.cells[*c] == Some(first)).then_some(first)
    })
}

/// Reads a number that may have been sent as a JSON number or numeric string.
pub fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Reads an identifier that may have been sent as a string or a number.
pub fn id_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Some(i.to_string()),
            (_, Some(u), _) => Some(u.to_string()),
            (_, _, Some(f)) if f.fract() == 0.0 => Some(format!("{}", f as i64)),
            (_, _, Some(f)) => Some(f.to_string()),
            _ => None,
        },
        _ => None,
    }
}

/// Truthiness for flags that arrive as booleans, numbers or strings.
pub fn flag_from(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn board(layout: &str) -> Board {
        Board::normalize(&Value::String(layout.to_string()))
    }

    #[test]
    fn test_symbol_parsing() {
        assert_eq!(Symbol::from_value(&json!("x")), Some(Symbol::X));
        assert_eq!(Symbol::from_value(&json!(" O ")), Some(Symbol::O));
        assert_eq!(Symbol::from_value(&json!(1)), Some(Symbol::X));
        assert_eq!(Symbol::from_value(&json!(2)), Some(Symbol::O));
        assert_eq!(Symbol::from_value(&json!(0)), None);
        assert_eq!(Symbol::from_value(&json!("Player O")), Some(Symbol::O));
        assert_eq!(Symbol::from_value(&json!("draw")), None);
        assert_eq!(Symbol::from_value(&json!(null)), None);
        assert_eq!(Symbol::X.other(), Symbol::O);
    }

    #[test]
    fn test_board_normalize_mixed_encodings() {
        let raw = json!([1, "o", null, "X", 0, "", 2, "-", "x"]);
        let board = Board::normalize(&raw);
        assert_eq!(board.get(0), Some(Symbol::X));
        assert_eq!(board.get(1), Some(Symbol::O));
        assert_eq!(board.get(2), None);
        assert_eq!(board.get(3), Some(Symbol::X));
        assert_eq!(board.get(6), Some(Symbol::O));
        assert_eq!(board.get(7), None);
        assert_eq!(board.get(8), Some(Symbol::X));
    }

    #[test]
    fn test_board_normalize_wrong_length() {
        let short = Board::normalize(&json!(["X", "O"]));
        assert_eq!(short.cells().len(), BOARD_SIZE);
        assert_eq!(short.get(1), Some(Symbol::O));
        assert_eq!(short.get(8), None);

        let long = Board::normalize(&json!(vec!["X"; 12]));
        assert_eq!(long.cells().len(), BOARD_SIZE);
        assert!(long.is_full());
    }

    #[test]
    fn test_board_normalize_is_idempotent() {
        let inputs = vec![
            json!([1, 2, 0, "x", "O", null, "", "-", 2]),
            json!("XO-X--O--"),
            json!({"cells": ["o", "x"]}),
            json!("[1,2,1]"),
            json!(42),
            json!(vec!["X"; 15]),
        ];

        for raw in inputs {
            let once = Board::normalize(&raw);
            let twice = Board::normalize(&once.to_value());
            assert_eq!(once, twice);
            assert_eq!(twice.cells().len(), BOARD_SIZE);
        }
    }

    #[test]
    fn test_board_serde_roundtrip() {
        let original = board("XOXOXO---");
        let encoded = serde_json::to_value(original).unwrap();
        let decoded: Board = serde_json::from_value(encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_check_winner_rows_columns_diagonals() {
        assert_eq!(check_winner(&board("XXX------")), Some(Symbol::X));
        assert_eq!(check_winner(&board("O--O--O--")), Some(Symbol::O));
        assert_eq!(check_winner(&board("X---X---X")), Some(Symbol::X));
        assert_eq!(check_winner(&board("--O-O-O--")), Some(Symbol::O));
        assert_eq!(check_winner(&board("XX-------")), None);
    }

    #[test]
    fn test_check_winner_draw_board() {
        let draw = board("XOXXOOOXX");
        assert!(draw.is_full());
        assert_eq!(check_winner(&draw), None);
    }

    #[test]
    fn test_with_move() {
        let start = Board::empty();
        let next = start.with_move(4, Symbol::X).unwrap();
        assert_eq!(next.get(4), Some(Symbol::X));
        assert!(start.is_empty());
        assert!(next.with_move(4, Symbol::O).is_none());
        assert!(next.with_move(9, Symbol::O).is_none());
    }

    #[test]
    fn test_lenient_scalars() {
        assert_eq!(number_from(&json!("12.5")), Some(12.5));
        assert_eq!(number_from(&json!(3)), Some(3.0));
        assert_eq!(number_from(&json!("abc")), None);
        assert_eq!(id_from(&json!(42)), Some("42".to_string()));
        assert_eq!(id_from(&json!(" p1 ")), Some("p1".to_string()));
        assert_eq!(id_from(&json!("")), None);
        assert!(flag_from(&json!(true)));
        assert!(flag_from(&json!("TRUE")));
        assert!(!flag_from(&json!(null)));
    }
}
