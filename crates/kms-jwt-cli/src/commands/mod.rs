//! Command implementations for the kms-jwt CLI.

pub mod generate;
pub mod validate;

/// Printed before the machine-readable lines of every command.
pub const OUTPUT_SEPARATOR: &str = "~~~~~~~~~~~~~~~~~~~~~~~";

/// Claim carrying the username.
pub const USERNAME_CLAIM: &str = "usr";

/// Claim carrying the warm-up challenges of a journey.
pub const WARMUP_CHALLENGES_CLAIM: &str = "tdl_wrm";

/// Claim carrying the official (last) challenge of a journey.
pub const OFFICIAL_CHALLENGE_CLAIM: &str = "tdl_chx";
