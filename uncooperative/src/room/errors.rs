use thiserror::Error;

use crate::{
    db::StoreError,
    game::{UserError, entities::GameId},
};

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("game {0} not found")]
    GameNotFound(GameId),

    #[error("game is closed")]
    Closed,

    #[error("game did not respond")]
    ResponseDropped,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid room config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rules(#[from] UserError),
}

pub type RoomResult<T> = Result<T, RoomError>;
