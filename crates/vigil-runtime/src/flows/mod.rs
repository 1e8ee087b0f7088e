//! State-mutating operation flows.

mod attempt;
mod session;

pub use attempt::{AttemptFlows, NewHighlight};
pub use session::{NewSession, SessionFilter, SessionFlows};
