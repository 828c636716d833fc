//! The rejection reasons the engine hands back to callers. Every reason has a stable
//! snake_case code that travels to clients unchanged.

use thiserror::Error;

/// A rejected request. Rejections never mutate engine state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("the current role has no ability")]
    NoAbility,
    #[error("no charges left")]
    NoCharges,
    #[error("the ability could not be used")]
    AbilityFailed,
    #[error("only allowed while a round is active")]
    NotActive,
    #[error("ready input is briefly disabled")]
    ReadyDelay,
    #[error("unknown base")]
    UnknownBase,
    #[error("unknown session token")]
    UnknownToken,
    #[error("unknown game mode")]
    UnknownMode,
    #[error("unknown player")]
    UnknownPlayer,
    #[error("need at least {0} players to start")]
    NeedPlayers(usize),
    #[error("not allowed in the current game state")]
    WrongPhase,
    #[error("the lobby is not accepting joins right now")]
    JoinRefused,
    #[error("all base slots are taken")]
    BasesFull,
}

impl Rejection {
    /// The wire code for targeted failure messages.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NoAbility => "no_ability",
            Rejection::NoCharges => "no_charges",
            Rejection::AbilityFailed => "ability_failed",
            Rejection::NotActive => "not_active",
            Rejection::ReadyDelay => "ready_delay",
            Rejection::UnknownBase => "unknown_base",
            Rejection::UnknownToken => "unknown_token",
            Rejection::UnknownMode => "unknown_mode",
            Rejection::UnknownPlayer => "unknown_player",
            Rejection::NeedPlayers(_) => "need_players",
            Rejection::WrongPhase => "wrong_phase",
            Rejection::JoinRefused => "join_refused",
            Rejection::BasesFull => "bases_full",
        }
    }
}
