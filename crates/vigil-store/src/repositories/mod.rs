//! Stateless repository structs.
//!
//! Each method takes `&Connection` and executes SQL directly. Updates use
//! the `version` column: a write only lands when the caller read the row
//! it is replacing.

pub mod attempt;
pub mod session;

pub use attempt::AttemptRepo;
pub use session::SessionRepo;
