mod session;

pub use session::{Session, SessionData, SessionId, SessionState, Transition, TurnOutcome};
