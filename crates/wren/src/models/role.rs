use serde::{Deserialize, Serialize};

/// The speaker of a chat message. Unknown role strings fail deserialization,
/// so invalid roles never get past the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}
