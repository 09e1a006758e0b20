mod engine;
mod state;

pub use engine::SessionMachine;
pub use state::{PausedPhase, Phase, SessionState};
