use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identifier for a price history source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Structured JSON chart API; fast but occasionally empty or blocked.
    Fast,
    /// Rendered history page fetched with a browser session; slow but thorough.
    Browser,
}

impl SourceId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Browser => "browser",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
