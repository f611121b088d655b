//! Continuous-playback queue and session controller.
//!
//! A host application builds a [`server::SessionManager`] from a
//! [`configs::Config`] and its collaborators (source resolver, voice
//! transport factory, optional recommender and persistence store), then
//! drives sessions through [`player::PlayerHandle`].

pub mod common;
pub mod configs;
pub mod persistence;
pub mod player;
pub mod protocol;
pub mod recommend;
pub mod server;
pub mod sources;
pub mod voice;

pub use common::{PlayerError, StreamError};
pub use configs::Config;
pub use player::{PlayerHandle, PlayerServices};
pub use server::SessionManager;
