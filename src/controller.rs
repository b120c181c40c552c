//! Game controller
//!
//! Drives one player's client through the game modes:
//!
//! ```text
//! Home -> { Single, Create, Join } -> { Single, Multiplayer } -> Home
//! ```
//!
//! Single-player games keep their secret locally. Multiplayer games go
//! through a `RoomStore`: a guess is validated, checked against the derived
//! turn, scored, applied optimistically and then persisted. Other clients
//! learn about it from the change feed and derive the same turn from the
//! same replicated counts.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::code::{Guess, SecretCode};
use crate::error::AppError;
use crate::room::{self, Player, Room};
use crate::scoring::{score, GuessResult};
use crate::store::{ChangeEvent, RoomStore, Subscription};
use crate::turn;
use crate::types::{PlayerId, RoomCode};

/// Which screen the client is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Home,
    /// Single-player game in progress
    Single,
    /// Room creation form
    Create,
    /// Room join form
    Join,
    /// Seated in a multiplayer room
    Multiplayer,
}

/// Persistence state of a guess made by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessSync {
    /// Applied locally, store has not acknowledged it yet
    Pending,
    /// Acknowledged by the store or seen in an authoritative update
    Confirmed,
    /// Store rejected it; the local entry was rolled back
    Failed,
}

/// Local single-player game
#[derive(Debug, Clone)]
pub struct SingleGame {
    secret: SecretCode,
    guesses: Vec<GuessResult>,
    won: bool,
}

impl SingleGame {
    pub fn new(secret: SecretCode) -> Self {
        Self {
            secret,
            guesses: Vec::new(),
            won: false,
        }
    }

    /// Validate, score and record a guess
    pub fn submit(&mut self, input: &str) -> Result<GuessResult, AppError> {
        let guess = Guess::parse(input)?;
        if self.won {
            return Err(AppError::GameFinished);
        }

        let result = score(&guess, &self.secret, self.guesses.len() as u32 + 1);
        if result.is_win() {
            self.won = true;
        }
        self.guesses.push(result.clone());
        Ok(result)
    }

    pub fn history(&self) -> &[GuessResult] {
        &self.guesses
    }

    pub fn has_won(&self) -> bool {
        self.won
    }

    pub fn secret(&self) -> &SecretCode {
        &self.secret
    }
}

/// Local view of a multiplayer room
#[derive(Debug)]
struct Session {
    room: Room,
    me: PlayerId,
    /// Ordered by join time
    players: Vec<Player>,
    subscription: Subscription,
    /// Sync state of this client's own guesses, by sequence number
    sync: BTreeMap<u32, GuessSync>,
    spectating: Option<PlayerId>,
}

impl Session {
    fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Insert a player keeping join-time order; duplicates are ignored
    fn insert_player(&mut self, player: Player) {
        if self.player(player.id).is_some() {
            return;
        }
        self.players.push(player);
        // Stable, so equal timestamps keep arrival order
        self.players.sort_by_key(|p| p.joined_at);
    }

    /// Replace a player's record with the store's version
    fn update_player(&mut self, player: Player) {
        if player.id != self.me {
            match self.player_mut(player.id) {
                Some(existing) => *existing = player,
                None => self.insert_player(player),
            }
            return;
        }

        let confirmed = player.guesses.len() as u32;
        let mut merged = player;

        // Keep local guesses a stale echo has not caught up with yet
        if let Some(local) = self.player(self.me) {
            merged.guesses.extend(
                local
                    .guesses
                    .iter()
                    .filter(|g| g.sequence > confirmed)
                    .filter(|g| {
                        matches!(
                            self.sync.get(&g.sequence),
                            Some(GuessSync::Pending | GuessSync::Confirmed)
                        )
                    })
                    .cloned(),
            );
        }

        // Whatever the store holds is saved, even if our write looked failed
        for (_, state) in self.sync.range_mut(..=confirmed) {
            *state = GuessSync::Confirmed;
        }

        match self.player_mut(merged.id) {
            Some(existing) => *existing = merged,
            None => self.insert_player(merged),
        }
    }

    fn remove_player(&mut self, player_id: PlayerId) {
        self.players.retain(|p| p.id != player_id);
        if self.spectating == Some(player_id) {
            self.spectating = None;
        }
    }

    /// Take the store's room record, never giving up a known winner
    fn update_room(&mut self, room: Room) {
        if self.room.winner_id.is_some() && room.winner_id != self.room.winner_id {
            warn!(
                "Ignoring winner change in room {} ({:?} -> {:?})",
                room.code, self.room.winner_id, room.winner_id
            );
            return;
        }
        self.room = room;
    }
}

#[derive(Debug)]
enum State {
    Home,
    Single(SingleGame),
    Create,
    Join,
    Multiplayer(Box<Session>),
}

/// One player's game client
pub struct GameController<S> {
    store: S,
    state: State,
}

impl<S: RoomStore> GameController<S> {
    /// Create a controller on the home screen
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: State::Home,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn mode(&self) -> Mode {
        match self.state {
            State::Home => Mode::Home,
            State::Single(_) => Mode::Single,
            State::Create => Mode::Create,
            State::Join => Mode::Join,
            State::Multiplayer(_) => Mode::Multiplayer,
        }
    }

    /// Start a single-player game with a fresh secret
    pub fn start_single(&mut self) -> Result<(), AppError> {
        self.require_home("start a single-player game")?;
        self.state = State::Single(SingleGame::new(SecretCode::generate()));
        Ok(())
    }

    /// Restart the single-player game with a new secret
    pub fn play_again(&mut self) -> Result<(), AppError> {
        match &mut self.state {
            State::Single(game) => {
                *game = SingleGame::new(SecretCode::generate());
                Ok(())
            }
            _ => Err(AppError::InvalidAction("play again outside a single-player game")),
        }
    }

    pub fn open_create_form(&mut self) -> Result<(), AppError> {
        self.require_home("open the create form")?;
        self.state = State::Create;
        Ok(())
    }

    pub fn open_join_form(&mut self) -> Result<(), AppError> {
        self.require_home("open the join form")?;
        self.state = State::Join;
        Ok(())
    }

    /// Return home from a single-player game or a form
    ///
    /// A multiplayer room must be left with `leave`.
    pub fn go_home(&mut self) -> Result<(), AppError> {
        if let State::Multiplayer(_) = self.state {
            return Err(AppError::InvalidAction("go home without leaving the room"));
        }
        self.state = State::Home;
        Ok(())
    }

    fn require_home(&self, action: &'static str) -> Result<(), AppError> {
        match self.state {
            State::Home => Ok(()),
            _ => Err(AppError::InvalidAction(action)),
        }
    }

    /// Create a room and take the first seat
    ///
    /// On failure the controller stays on the create form.
    pub async fn create_room(&mut self, name: &str) -> Result<(), AppError> {
        if !matches!(self.state, State::Create) {
            return Err(AppError::InvalidAction("create a room outside the create form"));
        }
        let name = room::normalize_display_name(name).ok_or(AppError::InvalidName)?;

        let (code, secret, room_name, avatar) = {
            let mut rng = rand::thread_rng();
            (
                RoomCode::generate_with(&mut rng),
                SecretCode::generate_with(&mut rng),
                room::random_room_name(&mut rng),
                room::random_avatar(&mut rng),
            )
        };

        let room = self.store.create_room(code, secret, room_name).await?;
        let me = self
            .store
            .create_player(room.code.clone(), name, avatar)
            .await?;

        info!("Created room {} as {}", room.code, me.id);
        self.enter_room(room, me).await
    }

    /// Join an existing room by its code
    ///
    /// On failure the controller stays on the join form.
    pub async fn join_room(&mut self, code: &str, name: &str) -> Result<(), AppError> {
        if !matches!(self.state, State::Join) {
            return Err(AppError::InvalidAction("join a room outside the join form"));
        }
        let name = room::normalize_display_name(name).ok_or(AppError::InvalidName)?;
        let code = RoomCode::parse(code).ok_or(AppError::InvalidRoomCode)?;
        let avatar = room::random_avatar(&mut rand::thread_rng());

        let room = self.store.get_room(code).await?;
        let me = self
            .store
            .create_player(room.code.clone(), name, avatar)
            .await?;

        info!("Joined room {} as {}", room.code, me.id);
        self.enter_room(room, me).await
    }

    /// Subscribe, load the player list and switch to multiplayer
    ///
    /// Subscribing first means no change can fall between the list and the
    /// feed; duplicates are absorbed by `apply_event`.
    async fn enter_room(&mut self, room: Room, me: Player) -> Result<(), AppError> {
        let subscription = match self.store.subscribe_room_changes(room.code.clone()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.abandon_seat(me.id).await;
                return Err(e.into());
            }
        };
        let players = match self.store.list_players(room.code.clone()).await {
            Ok(players) => players,
            Err(e) => {
                if let Err(e) = self.store.unsubscribe(subscription.id).await {
                    warn!("Failed to unsubscribe {} after join error: {}", subscription.id, e);
                }
                self.abandon_seat(me.id).await;
                return Err(e.into());
            }
        };

        let mut session = Session {
            room,
            me: me.id,
            players,
            subscription,
            sync: BTreeMap::new(),
            spectating: None,
        };
        session.insert_player(me);

        self.state = State::Multiplayer(Box::new(session));
        Ok(())
    }

    /// Remove a player record created by a join that did not complete
    async fn abandon_seat(&self, player_id: PlayerId) {
        if let Err(e) = self.store.delete_player(player_id).await {
            warn!("Failed to remove player {} after join error: {}", player_id, e);
        }
    }

    /// Submit a guess in the current game
    pub async fn submit_guess(&mut self, input: &str) -> Result<GuessResult, AppError> {
        match &mut self.state {
            State::Single(game) => game.submit(input),
            State::Multiplayer(session) => submit_multiplayer(&self.store, session, input).await,
            _ => Err(AppError::InvalidAction("guess outside a game")),
        }
    }

    /// Apply one change event from the room feed
    ///
    /// Events for other rooms, or outside multiplayer, are ignored. If the
    /// event removes this client's own player, the controller returns home.
    pub fn apply_event(&mut self, event: ChangeEvent) {
        let State::Multiplayer(session) = &mut self.state else {
            return;
        };
        if event.room_code() != &session.room.code {
            debug!("Ignoring event for room {}", event.room_code());
            return;
        }

        match event {
            ChangeEvent::PlayerInserted { player } => session.insert_player(player),
            ChangeEvent::PlayerUpdated { player } => session.update_player(player),
            ChangeEvent::PlayerDeleted { player_id, .. } => {
                if player_id == session.me {
                    info!("Removed from room {}", session.room.code);
                    self.state = State::Home;
                    return;
                }
                session.remove_player(player_id);
            }
            ChangeEvent::RoomUpdated { room } => session.update_room(room),
        }
    }

    /// Wait for the next change event of the current room
    ///
    /// Returns None outside multiplayer or once the feed has closed.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        match &mut self.state {
            State::Multiplayer(session) => session.subscription.recv().await,
            _ => None,
        }
    }

    /// Apply every change event already delivered, without waiting
    ///
    /// Returns the number of events applied.
    pub fn drain_events(&mut self) -> usize {
        let mut queued = Vec::new();
        if let State::Multiplayer(session) = &mut self.state {
            while let Ok(event) = session.subscription.events.try_recv() {
                queued.push(event);
            }
        }

        let count = queued.len();
        for event in queued {
            self.apply_event(event);
        }
        count
    }

    /// Leave the current room or game and return home
    ///
    /// In multiplayer this cancels the change feed and removes the player
    /// record. Store failures are logged, not returned.
    pub async fn leave(&mut self) {
        let State::Multiplayer(session) = std::mem::replace(&mut self.state, State::Home) else {
            return;
        };

        if let Err(e) = self.store.unsubscribe(session.subscription.id).await {
            warn!("Failed to unsubscribe from room {}: {}", session.room.code, e);
        }
        if let Err(e) = self.store.delete_player(session.me).await {
            warn!("Failed to remove player {}: {}", session.me, e);
        }
        info!("Left room {}", session.room.code);
    }

    /// Current single-player game
    pub fn single(&self) -> Option<&SingleGame> {
        match &self.state {
            State::Single(game) => Some(game),
            _ => None,
        }
    }

    fn session(&self) -> Option<&Session> {
        match &self.state {
            State::Multiplayer(session) => Some(session),
            _ => None,
        }
    }

    pub fn room(&self) -> Option<&Room> {
        self.session().map(|s| &s.room)
    }

    /// This client's own player record
    pub fn me(&self) -> Option<&Player> {
        self.session().and_then(|s| s.player(s.me))
    }

    /// Players in the room, ordered by join time
    pub fn players(&self) -> &[Player] {
        self.session().map(|s| s.players.as_slice()).unwrap_or(&[])
    }

    pub fn current_turn_player(&self) -> Option<&Player> {
        turn::current_turn_player(self.players())
    }

    pub fn is_my_turn(&self) -> bool {
        self.session()
            .is_some_and(|s| turn::can_submit(&s.room, &s.players, s.me))
    }

    /// Winning player, if the room is won and the winner is still present
    pub fn winner(&self) -> Option<&Player> {
        let session = self.session()?;
        session.player(session.room.winner_id?)
    }

    /// Sync state of this client's guess with the given sequence number
    pub fn guess_status(&self, sequence: u32) -> Option<GuessSync> {
        self.session()?.sync.get(&sequence).copied()
    }

    /// Watch another player's guess history
    pub fn spectate(&mut self, player_id: PlayerId) -> Result<(), AppError> {
        let State::Multiplayer(session) = &mut self.state else {
            return Err(AppError::InvalidAction("spectate outside a room"));
        };
        if session.player(player_id).is_none() {
            return Err(AppError::InvalidAction("spectate a player not in the room"));
        }
        session.spectating = (player_id != session.me).then_some(player_id);
        Ok(())
    }

    pub fn stop_spectating(&mut self) {
        if let State::Multiplayer(session) = &mut self.state {
            session.spectating = None;
        }
    }

    /// Player being watched, if any
    pub fn spectating(&self) -> Option<&Player> {
        let session = self.session()?;
        session.player(session.spectating?)
    }

    /// Guess history on screen: the watched player's, else this client's
    pub fn displayed_history(&self) -> &[GuessResult] {
        match &self.state {
            State::Single(game) => game.history(),
            State::Multiplayer(session) => session
                .spectating
                .and_then(|id| session.player(id))
                .or_else(|| session.player(session.me))
                .map(|p| p.guesses.as_slice())
                .unwrap_or(&[]),
            _ => &[],
        }
    }
}

/// Validate, check turn, score, apply optimistically, then persist
async fn submit_multiplayer<S: RoomStore>(
    store: &S,
    session: &mut Session,
    input: &str,
) -> Result<GuessResult, AppError> {
    let guess = Guess::parse(input)?;

    if session.room.has_winner() {
        return Err(AppError::GameFinished);
    }
    if !turn::can_submit(&session.room, &session.players, session.me) {
        return Err(AppError::NotYourTurn);
    }

    let me = session.me;
    let secret = session.room.secret_code;
    let Some(player) = session.player_mut(me) else {
        return Err(AppError::InvalidAction("guess without a seat in the room"));
    };

    let result = score(&guess, &secret, player.next_sequence());
    let sequence = result.sequence;
    player.guesses.push(result.clone());
    let history = player.guesses.clone();
    session.sync.insert(sequence, GuessSync::Pending);

    debug!("Guess {} from {}: {:?}", sequence, me, result);

    if let Err(e) = store.update_player_guesses(me, history).await {
        warn!("Failed to save guess {} for {}: {}", sequence, me, e);
        if let Some(player) = session.player_mut(me) {
            player.guesses.retain(|g| g.sequence != sequence);
        }
        session.sync.insert(sequence, GuessSync::Failed);
        return Err(e.into());
    }
    if let Some(state) = session.sync.get_mut(&sequence) {
        if *state == GuessSync::Pending {
            *state = GuessSync::Confirmed;
        }
    }

    if result.is_win() {
        let room = store
            .set_room_winner(session.room.code.clone(), me)
            .await
            .inspect_err(|e| warn!("Failed to record win for {}: {}", me, e))?;
        if room.winner_id != Some(me) {
            info!("Cracked room {} but another player won first", room.code);
        }
        session.update_room(room);
    }

    Ok(result)
}
