//! Session and reconnection protocol.
//!
//! [`SyncClient`] owns every piece of client state and is driven from a
//! single task: calls are awaited inline, and inbound pushes are handled to
//! completion one at a time. The only other suspension point is the bounded
//! wait for a `SyncedState` push during reconnection, which keeps pumping
//! the inbound channel so events stay in order.

use crate::clock::{now_ms, remaining_from_event, Deadline};
use crate::config::ClientConfig;
use crate::correlation::CorrelationTracker;
use crate::error::{ClientError, ErrorCode, ErrorKind};
use crate::game_over::RematchOffer;
use crate::hub::{ConnectionState, Hub};
use crate::session::{GraceCause, Session};
use crate::store::{KeyValueStore, SessionStorage};
use crate::timer::{Side, TurnTimer};
use log::{debug, error, info, warn};
use shared::{GameStateDto, HubCall, HubResponse, PushEvent};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};

/// Far enough out that an idle housekeeping branch never fires.
const IDLE_HOUSEKEEPING: Duration = Duration::from_secs(3600);

/// Everything the event loop reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientInput {
    Push(PushEvent),
    Connection(ConnectionState),
    Command(Command),
}

/// User intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create,
    Join(String),
    Move(usize),
    OfferRematch,
    AcceptRematch,
    Refresh,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupAction {
    Reconnected,
    /// The current path is this room's own invite link; the creator has not
    /// joined yet and must not be treated as returning.
    SkippedInviteLink,
    SkippedNoPlayerId,
    NoStoredRoom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinOutcome {
    Joined,
    AlreadyInRoom,
    ReconnectRequired,
}

pub struct SyncClient<H: Hub, S: KeyValueStore> {
    pub(crate) config: ClientConfig,
    pub(crate) correlation: CorrelationTracker,
    pub(crate) timer: TurnTimer,
    pub(crate) session: Session,
    pub(crate) storage: SessionStorage<S>,
    hub: H,
    inbound: mpsc::Receiver<ClientInput>,
    inbound_open: bool,
    pub(crate) synced_waiter: Option<oneshot::Sender<GameStateDto>>,
    connection: ConnectionState,
    ever_connected: bool,
    reconnect_pending: bool,
    deferred: VecDeque<Command>,
    pub(crate) rematch_deadline: Option<Deadline>,
}

impl<H: Hub, S: KeyValueStore> SyncClient<H, S> {
    pub fn new(
        hub: H,
        store: S,
        inbound: mpsc::Receiver<ClientInput>,
        config: ClientConfig,
    ) -> Self {
        let correlation =
            CorrelationTracker::new(config.correlation_capacity, config.correlation_retention);
        let timer = TurnTimer::new(config.turn_duration_secs, config.stale_tick_timeout);

        Self {
            config,
            correlation,
            timer,
            session: Session::new(),
            storage: SessionStorage::new(store),
            hub,
            inbound,
            inbound_open: true,
            synced_waiter: None,
            connection: ConnectionState::Disconnected,
            ever_connected: false,
            reconnect_pending: false,
            deferred: VecDeque::new(),
            rematch_deadline: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn timer(&self) -> &TurnTimer {
        &self.timer
    }

    pub fn correlation(&self) -> &CorrelationTracker {
        &self.correlation
    }

    pub fn storage(&self) -> &SessionStorage<S> {
        &self.storage
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Creates a room. The creator holds no player id until an opponent
    /// joins, so any stale one is cleared.
    pub async fn create_game(&mut self) -> Result<String, ClientError> {
        let result = self.create_flow().await;
        self.settle(result)
    }

    pub async fn join_game(&mut self, code: &str) -> Result<(), ClientError> {
        let result = self.join_flow(code).await;
        self.settle(result)
    }

    /// Rejoins the stored room with the stored player id.
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        let result = self.reconnect_flow().await;
        self.settle(result)
    }

    pub async fn make_move(&mut self, cell: usize) -> Result<(), ClientError> {
        let result = self.move_flow(cell).await;
        self.settle(result)
    }

    pub async fn offer_rematch(&mut self) -> Result<(), ClientError> {
        let result = self.offer_rematch_flow().await;
        self.settle(result)
    }

    pub async fn accept_rematch(&mut self) -> Result<(), ClientError> {
        let result = self.accept_rematch_flow().await;
        self.settle(result)
    }

    /// Pulls a fresh authoritative snapshot of the current room.
    pub async fn refresh_state(&mut self) -> Result<(), ClientError> {
        let result = self.refresh_flow().await;
        self.settle(result)
    }

    /// Forgets the room entirely, including persisted identifiers.
    pub fn leave(&mut self) {
        info!("Leaving room {:?}", self.session.room_code);
        self.session.reset();
        self.timer.clear();
        self.correlation.clear();
        self.rematch_deadline = None;
        self.synced_waiter = None;
        if let Err(e) = self.storage.clear_all() {
            debug!("Could not clear stored session: {}", e);
        }
    }

    /// Initial load. Reconnects only when both a room code and a player id
    /// are stored, and never from the room's own invite link.
    pub async fn startup(
        &mut self,
        current_path: Option<&str>,
    ) -> Result<StartupAction, ClientError> {
        let Some(code) = self.stored_room_code() else {
            return Ok(StartupAction::NoStoredRoom);
        };

        if let Some(path) = current_path {
            if is_invite_path(path, &code, &self.config.invite_path_prefix) {
                info!("Opened own invite link for {}, not reconnecting", code);
                return Ok(StartupAction::SkippedInviteLink);
            }
        }

        let Some(player_id) = self.stored_player_id() else {
            debug!("Stored room {} has no player id, not reconnecting", code);
            return Ok(StartupAction::SkippedNoPlayerId);
        };

        self.session.set_room(&code);
        self.session.set_player_id(Some(player_id));
        self.reconnect().await?;
        Ok(StartupAction::Reconnected)
    }

    /// Adopts the stored room code and player id without contacting the
    /// server. Returns false when no room is stored.
    pub fn load_stored_identity(&mut self) -> bool {
        let Some(code) = self.stored_room_code() else {
            return false;
        };
        self.session.set_room(&code);
        self.session.set_player_id(self.stored_player_id());
        self.session.activate();
        true
    }

    /// Transport connection changes. A restored connection with a stored
    /// session triggers a reconnect.
    pub async fn on_connection_state(&mut self, state: ConnectionState) {
        if self.note_connection(state) {
            let _ = self.reconnect().await;
        }
    }

    /// Runs until the inbound channel closes.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut ticker = interval(self.config.local_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            while let Some(command) = self.deferred.pop_front() {
                self.handle_command(command).await;
            }
            if self.reconnect_pending {
                self.reconnect_pending = false;
                let _ = self.reconnect().await;
                continue;
            }
            if !self.inbound_open {
                break;
            }

            let housekeeping = self
                .next_housekeeping()
                .unwrap_or_else(|| Instant::now() + IDLE_HOUSEKEEPING);

            tokio::select! {
                input = self.inbound.recv() => {
                    match input {
                        Some(input) => self.handle_input(input).await,
                        None => {
                            info!("Inbound channel closed, stopping client");
                            self.inbound_open = false;
                        }
                    }
                },

                _ = ticker.tick() => {
                    self.on_second();
                },

                _ = sleep_until(housekeeping) => {
                    self.housekeeping(Instant::now());
                },
            }
        }

        Ok(())
    }

    async fn handle_input(&mut self, input: ClientInput) {
        match input {
            ClientInput::Push(event) => self.handle_push(event),
            ClientInput::Connection(state) => self.on_connection_state(state).await,
            ClientInput::Command(command) => self.handle_command(command).await,
        }
    }

    // Failures are already surfaced through `settle`.
    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Create => {
                let _ = self.create_game().await;
            }
            Command::Join(code) => {
                let _ = self.join_game(&code).await;
            }
            Command::Move(cell) => {
                let _ = self.make_move(cell).await;
            }
            Command::OfferRematch => {
                let _ = self.offer_rematch().await;
            }
            Command::AcceptRematch => {
                let _ = self.accept_rematch().await;
            }
            Command::Refresh => {
                let _ = self.refresh_state().await;
            }
            Command::Leave => self.leave(),
        }
    }

    async fn create_flow(&mut self) -> Result<String, ClientError> {
        self.session.reset();
        self.timer.clear();
        self.session.begin_creating();

        let response = match self.call(HubCall::CreateGame).await {
            Ok(response) => response,
            Err(e) => {
                self.session.reset();
                return Err(e);
            }
        };
        if !response.success {
            self.session.reset();
            return Err(rejection("CreateGame", &response));
        }

        let state = response.state();
        let code = state
            .as_ref()
            .and_then(|s| s.room_code.clone())
            .or_else(|| response.payload.as_ref().and_then(|p| p.as_str().map(str::to_string)))
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                self.session.reset();
                ClientError::Malformed("CreateGame returned no room code".to_string())
            })?;

        self.session.set_room(&code);
        self.session.set_player_id(None);
        if let Some(board) = state.and_then(|s| s.board) {
            self.session.apply_board(board, None);
        }
        self.session.activate();

        self.record_applied(&response);

        self.persist(|storage| storage.set_room_code(&code));
        self.persist(|storage| storage.clear_player_id());
        info!("Created room {}", code);
        Ok(code)
    }

    async fn join_flow(&mut self, code: &str) -> Result<(), ClientError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ClientError::rejected("JoinGame", Some("NOT_FOUND"), None));
        }

        match self.join_room(code).await? {
            JoinOutcome::Joined | JoinOutcome::AlreadyInRoom => Ok(()),
            JoinOutcome::ReconnectRequired => {
                info!("Server asked for reconnect to {}", code);
                self.reconnect_flow().await
            }
        }
    }

    /// One join call with whatever player id is already known.
    async fn join_room(&mut self, code: &str) -> Result<JoinOutcome, ClientError> {
        let player_id = self.known_player_id();
        self.session.begin_joining(code);

        let response = self
            .call(HubCall::JoinGame {
                code: code.to_string(),
                player_id: player_id.clone(),
            })
            .await
            .map_err(|e| {
                self.session.reset();
                e
            })?;

        if response.success {
            if let Some(state) = response.state() {
                self.apply_state(&state);
                if carries_update(&state) {
                    self.record_applied(&response);
                }
            }
            self.session.set_room(code);
            self.session.activate();
            self.persist_identity();
            info!("Joined room {}", code);
            return Ok(JoinOutcome::Joined);
        }

        let error = rejection("JoinGame", &response);
        match error.code() {
            Some(ErrorCode::ReconnectRequired) if player_id.is_some() => {
                Ok(JoinOutcome::ReconnectRequired)
            }
            Some(ErrorCode::AlreadyInRoom) => {
                self.session.set_room(code);
                self.session.activate();
                self.persist(|storage| storage.set_room_code(code));
                Ok(JoinOutcome::AlreadyInRoom)
            }
            _ => {
                self.session.reset();
                Err(error)
            }
        }
    }

    async fn reconnect_flow(&mut self) -> Result<(), ClientError> {
        let code = self.known_room_code().ok_or(ClientError::NoSession)?;
        let player_id = self.known_player_id().ok_or(ClientError::NoSession)?;

        self.session.set_room(&code);
        self.session.set_player_id(Some(player_id.clone()));
        self.session.begin_connecting();
        info!("Reconnecting to {} as {}", code, player_id);

        let call = HubCall::Reconnect {
            code: code.clone(),
            player_id: player_id.clone(),
        };
        let response = match self.call(call).await {
            Ok(response) if response.success => response,
            Ok(response) => {
                warn!(
                    "Reconnect to {} rejected ({:?}), falling back to join",
                    code, response.error_code
                );
                return self.join_after_failed_reconnect(&code).await;
            }
            Err(e) => {
                warn!("Reconnect to {} failed ({}), falling back to join", code, e);
                return self.join_after_failed_reconnect(&code).await;
            }
        };

        if let Some(state) = response.full_state() {
            debug!("Reconnect carried full state");
            self.apply_state(&state);
            self.session.activate();
            self.persist_identity();
            return Ok(());
        }

        if self.wait_for_synced_state().await.is_some() {
            debug!("Reconnect resolved by synced state push");
            self.session.activate();
            self.persist_identity();
            return Ok(());
        }

        if let Err(e) = self.fetch_snapshot(&code, &player_id).await {
            // The room may still be live; a refresh or the next restore retries.
            self.session.enter_grace(GraceCause::ConnectionLost, None);
            return Err(e);
        }
        self.session.activate();
        self.persist_identity();
        Ok(())
    }

    async fn join_after_failed_reconnect(&mut self, code: &str) -> Result<(), ClientError> {
        match self.join_room(code).await? {
            JoinOutcome::ReconnectRequired => {
                self.session.reset();
                Err(ClientError::rejected("JoinGame", Some("RECONNECT_REQUIRED"), None))
            }
            JoinOutcome::Joined | JoinOutcome::AlreadyInRoom => Ok(()),
        }
    }

    /// Registers for the next `SyncedState` push and waits at most
    /// `sync_wait` for it, dispatching inbound events in the meantime. A new
    /// registration replaces any earlier one.
    async fn wait_for_synced_state(&mut self) -> Option<GameStateDto> {
        let (tx, mut rx) = oneshot::channel();
        if self.synced_waiter.replace(tx).is_some() {
            debug!("Superseded an earlier synced state wait");
        }

        let deadline = sleep(self.config.sync_wait);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = &mut rx => {
                    return result.ok();
                },

                _ = &mut deadline => {
                    debug!("No synced state within {:?}", self.config.sync_wait);
                    self.synced_waiter = None;
                    return None;
                },

                input = self.inbound.recv(), if self.inbound_open => {
                    match input {
                        Some(ClientInput::Push(event)) => self.handle_push(event),
                        Some(ClientInput::Connection(state)) => {
                            if self.note_connection(state) {
                                self.reconnect_pending = true;
                            }
                        }
                        Some(ClientInput::Command(command)) => self.deferred.push_back(command),
                        None => self.inbound_open = false,
                    }
                },
            }
        }
    }

    /// Room snapshot first, then the plain game state.
    async fn fetch_snapshot(&mut self, code: &str, player_id: &str) -> Result<(), ClientError> {
        let room_call = HubCall::GetRoomState {
            code: code.to_string(),
            player_id: Some(player_id.to_string()),
        };
        match self.call(room_call).await {
            Ok(response) if response.success => {
                if let Some(state) = response.state() {
                    self.apply_state(&state);
                    return Ok(());
                }
                debug!("GetRoomState returned no state");
            }
            Ok(response) => debug!("GetRoomState rejected: {:?}", response.error_code),
            Err(e) => debug!("GetRoomState failed: {}", e),
        }

        let response = self
            .call(HubCall::GetGameState {
                code: code.to_string(),
                player_id: Some(player_id.to_string()),
            })
            .await?;
        if !response.success {
            return Err(rejection("GetGameState", &response));
        }
        let state = response
            .state()
            .ok_or_else(|| ClientError::Malformed("GetGameState returned no state".to_string()))?;
        self.apply_state(&state);
        Ok(())
    }

    async fn move_flow(&mut self, cell: usize) -> Result<(), ClientError> {
        let code = self.session.room_code.clone().ok_or(ClientError::NoSession)?;
        if self.session.is_terminated() {
            return Err(ClientError::rejected("MakeMove", Some("GAME_OVER"), None));
        }
        if !self.session.board.is_cell_open(cell) {
            return Err(ClientError::InvalidMove(cell));
        }

        let response = self
            .call(HubCall::MakeMove {
                code,
                cell_index: cell,
                player_id: self.session.player_id.clone(),
            })
            .await?;
        if !response.success {
            return Err(rejection("MakeMove", &response));
        }

        if let Some(state) = response.state() {
            self.apply_state(&state);
            if carries_update(&state) {
                self.record_applied(&response);
            }
        }
        Ok(())
    }

    async fn offer_rematch_flow(&mut self) -> Result<(), ClientError> {
        let code = self.session.room_code.clone().ok_or(ClientError::NoSession)?;
        let response = self.call(HubCall::OfferRematch { code }).await?;
        if !response.success {
            return Err(rejection("OfferRematch", &response));
        }
        self.session.set_rematch_offer(RematchOffer::OfferedByMe);
        Ok(())
    }

    async fn accept_rematch_flow(&mut self) -> Result<(), ClientError> {
        let code = self.session.room_code.clone().ok_or(ClientError::NoSession)?;
        let response = self.call(HubCall::AcceptRematch { code }).await?;
        if !response.success {
            return Err(rejection("AcceptRematch", &response));
        }
        // Otherwise the new match arrives as a RematchStarted push.
        if let Some(state) = response.full_state() {
            self.start_rematch();
            self.apply_state(&state);
        }
        Ok(())
    }

    async fn refresh_flow(&mut self) -> Result<(), ClientError> {
        let code = self.session.room_code.clone().ok_or(ClientError::NoSession)?;
        let response = self
            .call(HubCall::GetGameState {
                code,
                player_id: self.session.player_id.clone(),
            })
            .await?;
        if !response.success {
            return Err(rejection("GetGameState", &response));
        }
        if let Some(state) = response.state() {
            self.apply_state(&state);
        }
        Ok(())
    }

    async fn call(&mut self, call: HubCall) -> Result<HubResponse, ClientError> {
        debug!("Invoking {} {:?}", call.method(), call.arguments());
        self.hub.invoke(call).await
    }

    /// Marks the response's correlation id as issued. Only called once the
    /// response content has been applied, so skipping the broadcast copy
    /// never loses state.
    fn record_applied(&mut self, response: &HubResponse) {
        if let Some(id) = response.correlation_id.as_deref() {
            self.correlation.record_issued(id);
        }
    }

    /// Applies an authoritative snapshot to the session and the turn clock.
    pub(crate) fn apply_state(&mut self, state: &GameStateDto) {
        if self.session.apply_game_state(state) {
            self.timer.clear();
            return;
        }

        let remaining = remaining_from_event(
            state.turn_expiry.as_ref(),
            state.server_timestamp.as_ref(),
            state.remaining_seconds.as_ref(),
            now_ms(),
        );
        if let Some(seconds) = remaining {
            let side = Side::for_turn(self.session.current_turn, self.session.symbol);
            self.timer.apply_server_tick(side, seconds, Instant::now());
        }
        self.persist_identity();
    }

    pub(crate) fn start_rematch(&mut self) {
        self.rematch_deadline = None;
        self.timer.clear();
        self.session.clear_outcome_for_rematch();
    }

    pub(crate) fn show_status(&mut self, text: &str) {
        let expires_at = Instant::now() + self.config.status_ttl;
        self.session.set_status(text, expires_at);
    }

    /// Routes a failed operation per error kind, then hands it back.
    fn settle<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result {
            self.surface(e);
        }
        result
    }

    fn surface(&mut self, error: &ClientError) {
        match error.kind() {
            ErrorKind::Transport => {
                error!("{}", error);
                self.show_status(error.user_message());
            }
            ErrorKind::Rejected => {
                warn!("{}", error);
                if error.is_terminal() {
                    self.session.reset();
                    self.timer.clear();
                    self.rematch_deadline = None;
                    if error.code() == Some(&ErrorCode::NotFound) {
                        self.persist(|storage| storage.clear_all());
                    }
                }
                self.show_status(error.user_message());
            }
            ErrorKind::Malformed => {
                warn!("{}", error);
                self.show_status(error.user_message());
            }
            ErrorKind::Cosmetic => debug!("{}", error),
        }
    }

    /// Records a connection state. Returns true when a lost connection came
    /// back and there is a stored session to resume.
    fn note_connection(&mut self, state: ConnectionState) -> bool {
        let previous = self.connection;
        self.connection = state;
        if previous != state {
            info!("Connection {:?} -> {:?}", previous, state);
        }

        match state {
            ConnectionState::Connected => {
                let restored = self.ever_connected && previous != ConnectionState::Connected;
                self.ever_connected = true;
                if restored && self.session.in_room() && !self.session.is_terminated() {
                    self.timer.clear();
                    self.session.leave_grace();
                }
                restored && self.known_room_code().is_some() && self.known_player_id().is_some()
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                if self.session.in_room() {
                    self.session.enter_grace(GraceCause::ConnectionLost, None);
                }
                false
            }
            ConnectionState::Connecting => false,
        }
    }

    /// Once per local tick: refresh the rematch window countdown.
    fn on_second(&mut self) {
        if let Some(deadline) = self.rematch_deadline {
            let remaining = deadline.remaining_at(now_ms());
            self.session.set_rematch_remaining(Some(remaining));
            if remaining == 0 {
                self.rematch_deadline = None;
            }
        }
    }

    fn housekeeping(&mut self, now: Instant) {
        self.timer.expire_stale(now);
        self.session.expire_status(now);
    }

    fn next_housekeeping(&self) -> Option<Instant> {
        let status = self.session.status.as_ref().map(|s| s.expires_at);
        match (self.timer.next_deadline(), status) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn known_room_code(&self) -> Option<String> {
        self.session.room_code.clone().or_else(|| self.stored_room_code())
    }

    fn known_player_id(&self) -> Option<String> {
        self.session.player_id.clone().or_else(|| self.stored_player_id())
    }

    fn stored_room_code(&self) -> Option<String> {
        self.storage.room_code().unwrap_or_else(|e| {
            debug!("Could not read stored room code: {}", e);
            None
        })
    }

    fn stored_player_id(&self) -> Option<String> {
        self.storage.player_id().unwrap_or_else(|e| {
            debug!("Could not read stored player id: {}", e);
            None
        })
    }

    pub(crate) fn persist_identity(&self) {
        if let Some(code) = &self.session.room_code {
            self.persist(|storage| storage.set_room_code(code));
        }
        if let Some(player_id) = &self.session.player_id {
            self.persist(|storage| storage.set_player_id(player_id));
        }
    }

    // Storage failures are cosmetic.
    fn persist<F>(&self, write: F)
    where
        F: FnOnce(&SessionStorage<S>) -> Result<(), ClientError>,
    {
        if let Err(e) = write(&self.storage) {
            debug!("Could not persist session: {}", e);
        }
    }
}

/// True when a response state carries a board or a termination, i.e.
/// the same content its broadcast copy would deliver.
fn carries_update(state: &GameStateDto) -> bool {
    state.is_full_state() || state.is_over()
}

fn rejection(method: &'static str, response: &HubResponse) -> ClientError {
    ClientError::rejected(
        method,
        response.error_code.as_deref(),
        response.error_message.clone(),
    )
}

/// True when `path` is the share link for `code`, e.g. `/join/ABCD`.
pub fn is_invite_path(path: &str, code: &str, prefix: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    match path.strip_prefix(prefix.trim_end_matches('/')) {
        Some(rest) => {
            let rest = rest.trim_start_matches('/');
            !rest.is_empty() && rest.eq_ignore_ascii_case(code.trim())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::OfflineHub;
    use crate::session::SessionPhase;
    use crate::store::MemoryStore;
    use tokio_test::{assert_err, assert_ok};

    fn offline_client(
        store: MemoryStore,
    ) -> (SyncClient<OfflineHub, MemoryStore>, mpsc::Sender<ClientInput>) {
        let (tx, rx) = mpsc::channel(16);
        (SyncClient::new(OfflineHub, store, rx, ClientConfig::default()), tx)
    }

    #[test]
    fn test_invite_path_matching() {
        assert!(is_invite_path("/join/ABCD", "ABCD", "/join/"));
        assert!(is_invite_path("/join/abcd/", "ABCD", "/join/"));
        assert!(is_invite_path("/join/ABCD?ref=share", "ABCD", "/join/"));
        assert!(!is_invite_path("/join/WXYZ", "ABCD", "/join/"));
        assert!(!is_invite_path("/join/", "ABCD", "/join/"));
        assert!(!is_invite_path("/game/ABCD", "ABCD", "/join/"));
    }

    #[tokio::test]
    async fn test_startup_without_stored_room() {
        let (mut client, _tx) = offline_client(MemoryStore::new());
        let action = assert_ok!(client.startup(None).await);
        assert_eq!(action, StartupAction::NoStoredRoom);
    }

    #[tokio::test]
    async fn test_transport_failure_sets_status() {
        let (mut client, _tx) = offline_client(MemoryStore::new());
        let error = assert_err!(client.create_game().await);
        assert_eq!(error.kind(), ErrorKind::Transport);
        assert_eq!(client.session().phase, SessionPhase::Idle);
        assert!(client.session().status.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_message_expires_in_event_loop() {
        let (tx, rx) = mpsc::channel(4);
        let config = ClientConfig::default().with_status_ttl(Duration::from_secs(2));
        let mut client = SyncClient::new(OfflineHub, MemoryStore::new(), rx, config);
        assert_err!(client.create_game().await);
        assert!(client.session().status.is_some());

        let feeder = tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            drop(tx);
        });
        client.run().await.unwrap();
        feeder.await.unwrap();
        assert!(client.session().status.is_none());
    }

    #[tokio::test]
    async fn test_move_without_room_is_rejected_locally() {
        let (mut client, _tx) = offline_client(MemoryStore::new());
        let error = assert_err!(client.make_move(0).await);
        assert!(matches!(error, ClientError::NoSession));
    }

    #[tokio::test]
    async fn test_leave_clears_storage() {
        let (mut client, _tx) = offline_client(MemoryStore::with_session("ABCD", "p1"));
        client.leave();
        assert_eq!(client.storage().room_code().unwrap(), None);
        assert_eq!(client.storage().player_id().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_inbound_closes() {
        let (mut client, tx) = offline_client(MemoryStore::new());
        tx.send(ClientInput::Push(PushEvent::PlayerJoined)).await.unwrap();
        drop(tx);
        assert_ok!(client.run().await);
        assert!(client.session().opponent_present);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_loss_enters_grace() {
        let (mut client, _tx) = offline_client(MemoryStore::new());
        client.session.set_room("ABCD");
        client.session.activate();
        client.on_connection_state(ConnectionState::Connected).await;
        client.on_connection_state(ConnectionState::Disconnected).await;
        assert_eq!(
            client.session().phase,
            SessionPhase::Grace(GraceCause::ConnectionLost)
        );
    }
}
