//! The deterministic game core: clock, movement, players, status effects, roles,
//! game events, modes, registries and the lifecycle engine. Everything here is
//! transport-free and synchronous; the hosting server owns the engine in a single
//! task, feeds it inbound messages and ticks, and fans out the drained queue.

pub mod bases;
pub mod clock;
pub mod connection;
pub mod effects;
pub mod engine;
pub mod error;
pub mod events;
pub mod modes;
pub mod movement;
pub mod outbound;
pub mod player;
pub mod respawn;
pub mod roles;
pub mod settings;
pub mod teams;

pub use engine::{BaseAck, Engine, JoinAck, ReconnectAck};
pub use error::Rejection;
pub use movement::AccelSample;
pub use outbound::Outbound;
pub use settings::GameSettings;
