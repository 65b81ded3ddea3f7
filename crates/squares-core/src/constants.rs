//! Package-level constants.

/// Current version of the squares backend (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "squares";

/// `updatedBy` value for envelopes the server emits on its own behalf.
pub const SYSTEM_ACTOR: &str = "system";

/// Prefix of every contest bus topic.
pub const CONTEST_TOPIC_PREFIX: &str = "contest:";
