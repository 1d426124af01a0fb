//! User types.

use serde::{Deserialize, Serialize};

/// Public view of a registered user. Never carries the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable identifier.
    pub id: String,

    /// Unique login name, also the identity shown on messages.
    pub username: String,

    /// Contact email.
    pub email: String,
}
