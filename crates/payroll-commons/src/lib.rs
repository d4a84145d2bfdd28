//! Types shared between the payroll engine and its API clients.

mod channel;
mod session;
mod sync;
mod wallet;

pub use channel::*;
pub use session::*;
pub use sync::*;
pub use wallet::*;
