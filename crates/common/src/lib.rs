//! Types shared by the account pool crates and service

mod clock;
mod error;
mod secret;

pub use clock::unix_millis;
pub use error::{Error, Result};
pub use secret::Secret;
