pub mod clock;
pub mod context;
pub mod fingerprint;
pub mod handle;
pub mod history;
pub mod manager;
pub mod prefetch;
pub mod queue;
pub mod recovery;
pub mod state;
pub mod timers;


pub use context::PlayerContext;
pub use handle::{PlayerHandle, PlayerServices};
pub use queue::Queue;
pub use recovery::{RecoveryAction, RecoveryDecision, RecoveryPolicy};
pub use state::*;
