//! Implementations that do not depend on any particular I/O
//!
//! Money, time windows, the statement walker and the raffle itself

pub mod amount;
pub mod fetch;
pub mod mask;
pub mod raffle;
pub mod record;
pub mod retry;
pub mod window;
