//! Security utilities.
//!
//! Currently this is credential scrubbing for error text written to the
//! running log and the console.

pub mod credential_scrubber;

pub use credential_scrubber::{safe_error_message, scrub_credentials};
