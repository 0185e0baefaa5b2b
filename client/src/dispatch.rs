//! Push event handlers.
//!
//! Every handler runs to completion, tolerates missing or mistyped fields
//! and never fails: one bad event must not stop the ones behind it.

use crate::clock::{clamp_seconds, now_ms, parse_timestamp, remaining_from_event, Deadline};
use crate::error::ErrorCode;
use crate::game_over::{self, ids_equal, RematchOffer};
use crate::hub::Hub;
use crate::protocol::SyncClient;
use crate::session::{GraceCause, SessionPhase};
use crate::store::KeyValueStore;
use crate::timer::Side;
use log::{debug, info, warn};
use serde_json::Value;
use shared::{
    id_from, number_from, Board, BoardUpdate, GameCreated, GameJoined, GameOverDto, GameStarted,
    GameStateDto, PushEvent, RematchWindow, Symbol, TurnCountdown,
};
use tokio::time::Instant;

impl<H: Hub, S: KeyValueStore> SyncClient<H, S> {
    /// Parses and dispatches a raw hub push. Unknown or unparseable events
    /// are logged and dropped.
    pub fn handle_raw_push(&mut self, name: &str, payload: Value) {
        match PushEvent::parse(name, payload) {
            Ok(event) => self.handle_push(event),
            Err(e) => warn!("Dropping push: {}", e),
        }
    }

    pub fn handle_push(&mut self, event: PushEvent) {
        debug!("Push {}", event.name());
        match event {
            PushEvent::BoardUpdated(update) => self.on_board_updated(update),
            PushEvent::GameCreated(created) => self.on_game_created(created),
            PushEvent::GameJoined(joined) => self.on_game_joined(joined),
            PushEvent::GameStarted(started) => self.on_game_started(started),
            PushEvent::GameFull { code } => self.on_game_full(code),
            PushEvent::PlayerJoined => self.on_player_joined(),
            PushEvent::PlayerLeft { player_id } => self.on_player_left(player_id),
            PushEvent::CountdownTick {
                player_id,
                seconds_left,
            } => self.on_countdown_tick(player_id, seconds_left),
            PushEvent::TurnCountdownTick(tick) => self.on_turn_tick(tick),
            PushEvent::TurnCountdownResumed(tick) => self.on_turn_resumed(tick),
            PushEvent::TurnCountdownPaused(tick) => self.on_turn_paused(tick),
            PushEvent::PlayerReconnected { player_id } => self.on_player_reconnected(player_id),
            PushEvent::RematchWindowStarted(window) => self.on_rematch_window(window),
            PushEvent::RematchOffered { offered_by } => self.on_rematch_offered(offered_by),
            PushEvent::RematchStarted => {
                info!("Rematch started");
                self.start_rematch();
            }
            PushEvent::RematchWindowExpired => {
                self.rematch_deadline = None;
                self.session.clear_rematch();
            }
            PushEvent::RematchCancelled => {
                self.rematch_deadline = None;
                self.session.set_rematch_offer(RematchOffer::Cancelled);
                self.session.set_rematch_remaining(None);
            }
            PushEvent::GameOver(dto) => self.on_game_over(dto),
            PushEvent::SyncedState(state) => self.on_synced_state(state),
        }
    }

    /// Records a broadcast's correlation id and reports whether the same
    /// event was already applied from a direct response.
    fn is_duplicate(&mut self, event: &str, correlation_id: Option<String>) -> bool {
        let Some(id) = correlation_id else {
            return false;
        };
        self.correlation.record_observed(&id);
        if self.correlation.was_issued(&id) {
            debug!("Skipping {} already applied from response {}", event, id);
            return true;
        }
        false
    }

    fn is_me(&self, player_id: Option<&str>) -> bool {
        match (player_id, self.session.player_id.as_deref()) {
            (Some(theirs), Some(mine)) => ids_equal(theirs, mine),
            _ => false,
        }
    }

    /// Whose clock a countdown event refers to. Without a player id the
    /// side follows the current turn.
    fn side_for(&self, player_id: Option<&Value>) -> Side {
        match player_id.and_then(id_from) {
            Some(id) if self.is_me(Some(&id)) => Side::Mine,
            Some(_) if self.session.player_id.is_some() => Side::Opponent,
            _ => Side::for_turn(self.session.current_turn, self.session.symbol),
        }
    }

    fn on_board_updated(&mut self, update: BoardUpdate) {
        if self.is_duplicate("BoardUpdated", update.correlation_id.as_ref().and_then(id_from)) {
            return;
        }

        let turn = update.current_symbol.as_ref().and_then(Symbol::from_value);
        if let Some(board) = update.board {
            self.session.apply_board(board, turn);
        }

        let over = update
            .is_over
            .as_ref()
            .map(shared::flag_from)
            .unwrap_or(false);
        if over {
            let dto = GameOverDto {
                winner_symbol: update.winner_label,
                board: update.board,
                ..GameOverDto::default()
            };
            self.apply_game_over(&dto);
            return;
        }

        self.session.activate();
        let remaining = remaining_from_event(
            update.turn_expiry.as_ref(),
            update.server_timestamp.as_ref(),
            update.remaining_seconds.as_ref(),
            now_ms(),
        );
        if let Some(seconds) = remaining {
            let side = Side::for_turn(self.session.current_turn, self.session.symbol);
            self.timer.apply_server_tick(side, seconds, Instant::now());
        }
    }

    fn on_game_created(&mut self, created: GameCreated) {
        if self.is_duplicate("GameCreated", created.correlation_id.as_ref().and_then(id_from)) {
            return;
        }

        if let Some(code) = created.code.as_deref().filter(|c| !c.trim().is_empty()) {
            self.session.set_room(code);
        }
        if let Some(player_id) = created.player_id.as_ref().and_then(id_from) {
            self.session.set_player_id(Some(player_id));
        }
        if let Some(board) = created.board {
            self.session.apply_board(board, None);
        }
        self.session.activate();
        self.persist_identity();
    }

    fn on_game_joined(&mut self, joined: GameJoined) {
        if self.is_duplicate("GameJoined", joined.correlation_id.as_ref().and_then(id_from)) {
            return;
        }

        if let Some(code) = joined.code.as_deref().filter(|c| !c.trim().is_empty()) {
            self.session.set_room(code);
        }
        if let Some(player_id) = joined.player_id.as_ref().and_then(id_from) {
            self.session.set_player_id(Some(player_id));
        }
        self.session
            .set_symbol(joined.symbol.as_ref().and_then(Symbol::from_value));
        if let Some(board) = joined.board {
            let turn = joined.current_symbol.as_ref().and_then(Symbol::from_value);
            self.session.apply_board(board, turn);
        }
        self.session.set_opponent_present(true);
        self.session.activate();
        self.persist_identity();
    }

    fn on_game_started(&mut self, started: GameStarted) {
        if self.session.is_terminated() {
            self.start_rematch();
        }
        self.timer.clear();

        let turn = started
            .current_symbol
            .as_ref()
            .and_then(Symbol::from_value)
            .or(Some(Symbol::X));
        self.session
            .apply_board(started.board.unwrap_or_else(Board::empty), turn);
        self.session.set_opponent_present(true);
        self.session.leave_grace();
        self.session.activate();
        info!("Game started in {:?}", self.session.room_code);
    }

    fn on_game_full(&mut self, code: Option<String>) {
        warn!("Room {:?} is full", code);
        let joining_elsewhere = match (&code, &self.session.room_code) {
            (Some(full), Some(mine)) => full.eq_ignore_ascii_case(mine),
            _ => true,
        };
        if joining_elsewhere && !self.session.opponent_present {
            self.session.reset();
        }
        self.show_status(ErrorCode::GameFull.user_message());
    }

    fn on_player_joined(&mut self) {
        self.session.set_opponent_present(true);
        self.session.leave_grace();
        self.session.activate();
    }

    fn on_player_left(&mut self, player_id: Option<String>) {
        if self.is_me(player_id.as_deref()) {
            return;
        }
        info!("Opponent left");
        self.session.enter_grace(GraceCause::OpponentLeft, None);
    }

    fn on_countdown_tick(&mut self, player_id: Option<String>, seconds_left: Option<Value>) {
        if self.is_me(player_id.as_deref()) || self.session.is_terminated() {
            return;
        }
        let seconds = seconds_left
            .as_ref()
            .and_then(number_from)
            .map(clamp_seconds)
            .unwrap_or(0);

        if seconds == 0 {
            self.session.set_disconnect_countdown(None);
        } else if self.session.phase == SessionPhase::Grace(GraceCause::OpponentLeft) {
            self.session.set_disconnect_countdown(Some(seconds));
        } else {
            self.session.enter_grace(GraceCause::OpponentLeft, Some(seconds));
        }
    }

    fn countdown_seconds(tick: &TurnCountdown) -> Option<u32> {
        remaining_from_event(
            tick.turn_expiry.as_ref(),
            tick.server_timestamp.as_ref(),
            tick.remaining_seconds.as_ref(),
            now_ms(),
        )
    }

    fn on_turn_tick(&mut self, tick: TurnCountdown) {
        if self.session.is_terminated() {
            return;
        }
        let side = self.side_for(tick.player_id.as_ref());
        let Some(seconds) = Self::countdown_seconds(&tick) else {
            debug!("TurnCountdownTick without a usable value");
            return;
        };

        self.timer.apply_server_tick(side, seconds, Instant::now());
        if seconds == 0 {
            // Provisional until the server's GameOver arrives.
            self.session.mark_turn_expired(side);
        }
    }

    fn on_turn_resumed(&mut self, tick: TurnCountdown) {
        if self.session.is_terminated() {
            return;
        }
        let side = self.side_for(tick.player_id.as_ref());
        let seconds = Self::countdown_seconds(&tick).map(f64::from);
        self.timer.resume(side, seconds, Instant::now());
        if side == Side::Opponent {
            self.session.set_opponent_present(true);
        }
        self.session.leave_grace();
    }

    fn on_turn_paused(&mut self, tick: TurnCountdown) {
        if self.session.is_terminated() {
            return;
        }
        let side = self.side_for(tick.player_id.as_ref());
        let seconds = tick
            .remaining_seconds
            .as_ref()
            .and_then(number_from)
            .or_else(|| Self::countdown_seconds(&tick).map(f64::from));
        self.timer.pause(side, seconds);
    }

    fn on_player_reconnected(&mut self, player_id: Option<String>) {
        if self.is_me(player_id.as_deref()) {
            return;
        }
        info!("Opponent reconnected");
        self.session.set_opponent_present(true);
        self.session.leave_grace();
    }

    fn on_rematch_window(&mut self, window: RematchWindow) {
        let local_now = now_ms();
        let deadline = match (
            window.expiry.as_ref().and_then(parse_timestamp),
            window.server_timestamp.as_ref().and_then(parse_timestamp),
        ) {
            (Some(expiry), Some(server_now)) => {
                Some(Deadline::from_server(expiry, server_now, local_now))
            }
            _ => window
                .remaining_seconds
                .as_ref()
                .and_then(number_from)
                .map(|secs| Deadline::after_seconds(clamp_seconds(secs), local_now)),
        };

        self.rematch_deadline = deadline;
        self.session
            .set_rematch_remaining(deadline.map(|d| d.remaining_at(local_now)));
    }

    fn on_rematch_offered(&mut self, offered_by: Option<String>) {
        let offer = if self.is_me(offered_by.as_deref()) {
            RematchOffer::OfferedByMe
        } else {
            RematchOffer::OfferedByOpponent
        };
        self.session.set_rematch_offer(offer);
    }

    fn on_game_over(&mut self, dto: GameOverDto) {
        if self.is_duplicate("GameOver", dto.correlation_id()) {
            return;
        }
        self.apply_game_over(&dto);
    }

    fn on_synced_state(&mut self, state: GameStateDto) {
        self.apply_state(&state);
        if let Some(waiter) = self.synced_waiter.take() {
            let _ = waiter.send(state);
        }
    }

    fn apply_game_over(&mut self, dto: &GameOverDto) {
        let outcome =
            game_over::reconcile(dto, &self.session.identity(), self.session.outcome.as_ref());
        self.timer.clear();
        self.session.apply_outcome(outcome);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ClientConfig;
    use crate::game_over::{OutcomeKind, RematchOffer};
    use crate::hub::OfflineHub;
    use crate::protocol::{ClientInput, SyncClient};
    use crate::session::{GraceCause, SessionPhase};
    use crate::store::MemoryStore;
    use crate::timer::Side;
    use serde_json::json;
    use shared::Symbol;
    use tokio::sync::mpsc;

    fn client() -> SyncClient<OfflineHub, MemoryStore> {
        let (_tx, rx) = mpsc::channel::<ClientInput>(4);
        let mut client = SyncClient::new(OfflineHub, MemoryStore::new(), rx, ClientConfig::default());
        client.session.set_room("ABCD");
        client.session.set_player_id(Some("p1".to_string()));
        client.session.set_symbol(Some(Symbol::X));
        client.session.activate();
        client
    }

    #[tokio::test(start_paused = true)]
    async fn test_board_update_applies_and_ticks() {
        let mut client = client();
        client.handle_raw_push(
            "BoardUpdated",
            json!([[1, 0, 0, 0, 0, 0, 0, 0, 0], "O", false, null, null, null, 28]),
        );
        assert_eq!(client.session().board.get(0), Some(Symbol::X));
        assert_eq!(client.session().current_turn, Some(Symbol::O));
        assert_eq!(client.timer().countdowns().opponent, Some(28));
        assert_eq!(client.timer().countdowns().mine, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_board_update_with_game_over() {
        let mut client = client();
        client.handle_raw_push(
            "BoardUpdated",
            json!({"board": "XXXOO----", "currentSymbol": "O", "isOver": true, "winnerLabel": "X"}),
        );
        let outcome = client.session().outcome.clone().unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Win);
        assert!(client.session().is_terminated());
    }

    #[tokio::test]
    async fn test_duplicate_broadcast_skipped_but_observed() {
        let mut client = client();
        client.correlation.record_issued("c7");
        client.handle_raw_push("BoardUpdated", json!({"board": "X--------", "correlationId": "c7"}));

        assert!(client.session().board.is_empty());
        assert!(client.correlation().was_observed("c7"));
    }

    #[tokio::test]
    async fn test_unknown_push_is_dropped() {
        let mut client = client();
        client.handle_raw_push("Teleported", json!({}));
        assert_eq!(client.session().phase, SessionPhase::Active);
    }

    #[tokio::test]
    async fn test_wrong_typed_field_still_terminates() {
        let mut client = client();
        client.handle_raw_push("GameOver", json!({"result": 0, "winner": "X", "message": 42}));

        assert!(client.session().is_terminated());
        let outcome = client.session().outcome.clone().unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Win);
        assert_eq!(outcome.message, "You win as X!");
    }

    #[tokio::test]
    async fn test_opponent_leave_and_return() {
        let mut client = client();
        client.handle_raw_push("PlayerLeft", json!(["p2"]));
        assert_eq!(
            client.session().phase,
            SessionPhase::Grace(GraceCause::OpponentLeft)
        );

        client.handle_raw_push("CountdownTick", json!(["p2", 25]));
        assert_eq!(client.session().disconnect_countdown, Some(25));

        client.handle_raw_push("PlayerReconnected", json!(["p2"]));
        assert_eq!(client.session().phase, SessionPhase::Active);
        assert_eq!(client.session().disconnect_countdown, None);
        assert!(client.session().opponent_present);
    }

    #[tokio::test]
    async fn test_own_leave_event_is_ignored() {
        let mut client = client();
        client.handle_raw_push("PlayerLeft", json!({"playerId": "p1"}));
        assert_eq!(client.session().phase, SessionPhase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_tick_zero_marks_provisional_expiry() {
        let mut client = client();
        client.handle_raw_push("TurnCountdownTick", json!(["p1", 3]));
        assert_eq!(client.timer().countdowns().mine, Some(3));

        client.handle_raw_push("TurnCountdownTick", json!(["p1", 0]));
        assert_eq!(client.timer().countdowns().mine, None);
        assert_eq!(client.session().turn_expired, Some(Side::Mine));
        assert!(!client.session().is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_opponent_clock() {
        let mut client = client();
        client.handle_raw_push("TurnCountdownTick", json!(["p2", 17]));
        client.handle_raw_push("TurnCountdownPaused", json!(["p2", 16]));
        assert!(client.timer().is_paused(Side::Opponent));
        assert_eq!(client.timer().countdowns().opponent, Some(16));

        client.handle_raw_push("TurnCountdownResumed", json!(["p2", 0]));
        assert!(!client.timer().is_paused(Side::Opponent));
        assert_eq!(client.timer().countdowns().opponent, Some(30));
    }

    #[tokio::test]
    async fn test_rematch_lifecycle() {
        let mut client = client();
        client.handle_raw_push("GameOver", json!({"result": 2}));
        client.handle_raw_push("RematchWindowStarted", json!({"remainingSeconds": 15}));
        client.handle_raw_push("RematchOffered", json!(["p2"]));

        let rematch = client.session().outcome.as_ref().unwrap().rematch;
        assert_eq!(rematch.offer, RematchOffer::OfferedByOpponent);
        assert_eq!(rematch.remaining_seconds, Some(15));

        // A second termination must not wipe the visible offer.
        client.handle_raw_push("GameOver", json!({"result": "draw"}));
        let rematch = client.session().outcome.as_ref().unwrap().rematch;
        assert_eq!(rematch.offer, RematchOffer::OfferedByOpponent);
        assert_eq!(client.session().outcome_revision, 2);

        client.handle_raw_push("RematchStarted", json!(null));
        assert!(client.session().outcome.is_none());
        assert_eq!(client.session().phase, SessionPhase::Active);
    }

    #[tokio::test]
    async fn test_rematch_cancelled() {
        let mut client = client();
        client.handle_raw_push("GameOver", json!({"result": 0, "winner": "O"}));
        client.handle_raw_push("RematchOffered", json!({"offeredByPlayerId": "p1"}));
        assert_eq!(
            client.session().outcome.as_ref().unwrap().rematch.offer,
            RematchOffer::OfferedByMe
        );

        client.handle_raw_push("RematchCancelled", json!([]));
        let rematch = client.session().outcome.as_ref().unwrap().rematch;
        assert_eq!(rematch.offer, RematchOffer::Cancelled);
        assert_eq!(rematch.remaining_seconds, None);
    }

    #[tokio::test]
    async fn test_game_joined_sets_identity() {
        let (_tx, rx) = mpsc::channel::<ClientInput>(4);
        let mut client = SyncClient::new(OfflineHub, MemoryStore::new(), rx, ClientConfig::default());
        client.handle_raw_push(
            "GameJoined",
            json!(["WXYZ", "---------", "O", "X", "p2"]),
        );
        assert_eq!(client.session().room_code.as_deref(), Some("WXYZ"));
        assert_eq!(client.session().symbol, Some(Symbol::O));
        assert_eq!(client.storage().player_id().unwrap().as_deref(), Some("p2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_synced_state_applies_without_waiter() {
        let mut client = client();
        client.handle_raw_push(
            "SyncedState",
            json!({"board": "X---O----", "currentSymbol": "X", "opponentPresent": true}),
        );
        assert_eq!(client.session().board.get(4), Some(Symbol::O));
        assert!(client.session().is_my_turn());
    }
}
