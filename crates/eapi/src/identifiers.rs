//! Newtype identifiers.
//!
//! Values with an identity on the wire or on the device are wrapped in
//! distinct newtypes so that, for example, a [`SessionName`] can never be
//! passed where a [`RequestId`] is expected even though both are strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// The JSON-RPC `id` of a single `runCmds` request.
    ///
    /// A fresh identifier is generated for every call unless the caller pins
    /// one through [`crate::RequestOptions::request_id`]. The device echoes it
    /// back in the response.
    RequestId
}

impl RequestId {
    /// Generates a new random request identifier (UUID v4).
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Names an EOS configuration session (`configure session <name>`).
///
/// The name is spliced into CLI commands, so it must be a single token: no
/// whitespace and no control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    /// Creates a session name, returning `None` if the value is empty or is
    /// not a single CLI token.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        let single_token =
            !v.is_empty() && !v.chars().any(|c| c.is_whitespace() || c.is_control());
        single_token.then_some(Self(v))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value.clone())
            .ok_or_else(|| format!("invalid configuration session name: {value:?}"))
    }
}

impl From<SessionName> for String {
    fn from(name: SessionName) -> Self {
        name.0
    }
}

impl std::fmt::Display for SessionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
