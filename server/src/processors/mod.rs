//! Concrete packet processors, one module per domain.

pub mod actor;
pub mod player;
pub mod world;

pub use actor::actor_controller;
pub use player::player_controller;
pub use world::{world_controller, MpNumCounter};
