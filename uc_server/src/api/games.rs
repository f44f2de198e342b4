//! Game API handlers.
//!
//! Every state-changing endpoint turns its request into a single
//! [`GameCommand`] for the game's actor and maps the actor's answer onto an
//! HTTP response. Rules violations come back as `400`/`404`/`409`, a snapshot
//! store outage as `503`.
//!
//! # Examples
//!
//! Create a game with a bigger treasury:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/games \
//!   -H "Content-Type: application/json" \
//!   -d '{"starting_treasury": 60000000}'
//! ```
//!
//! Submit an extraction:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/games/$GAME/players/$PLAYER/extraction \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": 1500000}'
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uncooperative::{
    ConfigChange, GameCommand, GameConfig, GameEvent, GameId, GameView, PlayerId, Standing,
    UserError, Usd,
    room::{GameMetadata, GameResponse, RoomError},
    solver::OptimalExtraction,
};

use super::{AppState, watch_game};
use crate::{logging, metrics};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<UserError> for ApiError {
    fn from(error: UserError) -> Self {
        let message = error.to_string();
        match error {
            UserError::NotEnoughPlayers => Self::BadRequest(message),
            UserError::UserDoesNotExist | UserError::UserNotRegistered => Self::NotFound(message),
            UserError::GameAlreadyInProgress
            | UserError::GameNotInProgress
            | UserError::CapacityReached
            | UserError::AlreadySubmitted
            | UserError::NotExtracting
            | UserError::MissingSubmissions => Self::Conflict(message),
        }
    }
}

impl From<RoomError> for ApiError {
    fn from(error: RoomError) -> Self {
        match error {
            RoomError::GameNotFound(_) | RoomError::Closed => Self::NotFound(error.to_string()),
            RoomError::InvalidConfig(reason) => Self::BadRequest(reason),
            RoomError::Store(e) => {
                logging::log_storage_failure(None, &e.to_string());
                metrics::storage_failures_total();
                Self::Unavailable(format!("storage unavailable: {e}"))
            }
            RoomError::Rules(e) => e.into(),
            RoomError::ResponseDropped | RoomError::Task(_) => Self::Internal(error.to_string()),
        }
    }
}

/// What an applied command did.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CommandResponse {
    pub changed: bool,
    pub version: Option<u64>,
    pub events: Vec<String>,
}

impl CommandResponse {
    fn unchanged() -> Self {
        Self {
            changed: false,
            version: None,
            events: Vec::new(),
        }
    }
}

/// Send one command to a game and translate the actor's answer.
pub(super) async fn run_command(
    state: &AppState,
    game_id: GameId,
    command: GameCommand,
) -> Result<CommandResponse, ApiError> {
    let name = command_name(&command);
    let response = state.game_manager.send_command(game_id, command).await?;
    let outcome = match &response {
        GameResponse::Success { .. } => "success",
        GameResponse::Unchanged => "unchanged",
        GameResponse::Stale => "stale",
        GameResponse::Rejected(_) => "rejected",
        GameResponse::StorageUnavailable(_) => "storage_unavailable",
    };
    logging::log_game_command(game_id, name, outcome);

    match response {
        GameResponse::Success { version, events } => {
            if events.iter().any(|e| matches!(e, GameEvent::Submitted(_))) {
                metrics::extractions_submitted_total();
            }
            Ok(CommandResponse {
                changed: true,
                version: Some(version),
                events: events.iter().map(ToString::to_string).collect(),
            })
        }
        GameResponse::Unchanged => Ok(CommandResponse::unchanged()),
        GameResponse::Stale => Err(ApiError::Conflict(
            "game has moved on, reload and retry".to_string(),
        )),
        GameResponse::Rejected(e) => Err(e.into()),
        GameResponse::StorageUnavailable(message) => {
            logging::log_storage_failure(Some(game_id), &message);
            metrics::storage_failures_total();
            Err(ApiError::Unavailable(format!(
                "storage unavailable: {message}"
            )))
        }
    }
}

fn command_name(command: &GameCommand) -> &'static str {
    match command {
        GameCommand::Join { .. } => "join",
        GameCommand::SetName { .. } => "set_name",
        GameCommand::SubmitExtraction { .. } => "submit_extraction",
        GameCommand::Leave { .. } => "leave",
        GameCommand::RemovePlayer { .. } => "remove_player",
        GameCommand::ClearPlayers => "clear_players",
        GameCommand::Configure { .. } => "configure",
        GameCommand::ToggleWealthVisibility => "toggle_wealth_visibility",
        GameCommand::Start => "start",
        GameCommand::AdvanceSummary { .. } => "advance_summary",
        GameCommand::Reset => "reset",
    }
}

/// Overrides for a new game. Missing fields use the server defaults.
#[derive(Debug, Default, Deserialize)]
pub struct CreateGameRequest {
    pub max_turns: Option<u32>,
    pub interest_rate: Option<f64>,
    pub max_extraction_per_player: Option<Usd>,
    pub starting_treasury: Option<Usd>,
    pub max_players: Option<usize>,
}

impl CreateGameRequest {
    fn into_config(self, defaults: &GameConfig) -> GameConfig {
        GameConfig {
            max_turns: self.max_turns.unwrap_or(defaults.max_turns),
            interest_rate: self.interest_rate.unwrap_or(defaults.interest_rate),
            max_extraction_per_player: self
                .max_extraction_per_player
                .unwrap_or(defaults.max_extraction_per_player),
            starting_treasury: self.starting_treasury.unwrap_or(defaults.starting_treasury),
            max_players: self.max_players.unwrap_or(defaults.max_players),
        }
        .sanitized()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGameResponse {
    pub game_id: GameId,
    pub config: GameConfig,
}

/// Create a game.
///
/// Returns `201 Created` with the new game's id and effective config.
pub async fn create_game(
    State(state): State<AppState>,
    request: Option<Json<CreateGameRequest>>,
) -> Result<(StatusCode, Json<CreateGameResponse>), ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let config = request.into_config(state.game_manager.default_config());
    let game_id = state
        .game_manager
        .create_game(Some(config.clone()))
        .await?;

    watch_game(&state.game_manager, game_id).await;
    metrics::games_created_total();
    metrics::active_games(state.game_manager.active_game_count().await);

    Ok((
        StatusCode::CREATED,
        Json(CreateGameResponse { game_id, config }),
    ))
}

/// List all running games, oldest first.
pub async fn list_games(State(state): State<AppState>) -> Json<Vec<GameMetadata>> {
    Json(state.game_manager.list_games().await)
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewerQuery {
    pub player_id: Option<String>,
}

/// Game as seen by `player_id`, or by an outsider when absent.
pub async fn get_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<GameView>, ApiError> {
    let viewer = query
        .player_id
        .map(|id| PlayerId::new(&id))
        .filter(|id| !id.is_empty());
    Ok(Json(state.game_manager.get_view(game_id, viewer).await?))
}

/// Close a game and delete it from the store.
pub async fn close_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<StatusCode, ApiError> {
    state.game_manager.close_game(game_id).await?;
    metrics::active_games(state.game_manager.active_game_count().await);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn standings(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<Vec<Standing>>, ApiError> {
    Ok(Json(state.game_manager.standings(game_id).await?))
}

/// The uniform per-player rate that extracts the most over the whole game.
///
/// Returns `400 Bad Request` while fewer than three players are named.
pub async fn optimal_extraction(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<OptimalExtraction>, ApiError> {
    Ok(Json(state.game_manager.optimal_extraction(game_id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinRequest {
    pub player_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub result: CommandResponse,
}

/// Join a game, with a fresh player id unless the client brings one.
pub async fn join_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    request: Option<Json<JoinRequest>>,
) -> Result<Json<JoinResponse>, ApiError> {
    let player_id = request
        .and_then(|Json(r)| r.player_id)
        .map(|id| PlayerId::new(&id))
        .filter(|id| !id.is_empty())
        .unwrap_or_else(PlayerId::generate);

    let result = run_command(
        &state,
        game_id,
        GameCommand::Join {
            id: player_id.clone(),
        },
    )
    .await?;
    Ok(Json(JoinResponse { player_id, result }))
}

pub async fn clear_players(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(
        run_command(&state, game_id, GameCommand::ClearPlayers).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaveQuery {
    /// Removed by the host rather than leaving on their own
    #[serde(default)]
    pub host: bool,
}

pub async fn leave_game(
    State(state): State<AppState>,
    Path((game_id, player_id)): Path<(GameId, String)>,
    Query(query): Query<LeaveQuery>,
) -> Result<Json<CommandResponse>, ApiError> {
    let id = PlayerId::new(&player_id);
    let command = if query.host {
        GameCommand::RemovePlayer { id }
    } else {
        GameCommand::Leave { id }
    };
    Ok(Json(run_command(&state, game_id, command).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetNameRequest {
    pub name: String,
}

pub async fn set_name(
    State(state): State<AppState>,
    Path((game_id, player_id)): Path<(GameId, String)>,
    Json(request): Json<SetNameRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = GameCommand::SetName {
        id: PlayerId::new(&player_id),
        name: request.name,
    };
    Ok(Json(run_command(&state, game_id, command).await?))
}

#[derive(Debug, Deserialize)]
pub struct ExtractionRequest {
    pub amount: Usd,
}

/// Submit this turn's extraction. Amounts outside `[0, max]` are clamped.
pub async fn submit_extraction(
    State(state): State<AppState>,
    Path((game_id, player_id)): Path<(GameId, String)>,
    Json(request): Json<ExtractionRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = GameCommand::SubmitExtraction {
        id: PlayerId::new(&player_id),
        amount: request.amount,
    };
    Ok(Json(run_command(&state, game_id, command).await?))
}

pub async fn start_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(run_command(&state, game_id, GameCommand::Start).await?))
}

pub async fn reset_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(run_command(&state, game_id, GameCommand::Reset).await?))
}

pub async fn toggle_wealth_visibility(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(
        run_command(&state, game_id, GameCommand::ToggleWealthVisibility).await?,
    ))
}

/// Adjust one config field while the game is waiting, e.g.
/// `{"change": "increase", "value": "max_turns"}` or
/// `{"change": "interest_rate", "value": 0.15}`.
pub async fn configure_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(change): Json<ConfigChange>,
) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(
        run_command(&state, game_id, GameCommand::Configure { change }).await?,
    ))
}
