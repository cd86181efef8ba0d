//! Tokens for out-of-band data transfers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque single-use handle for one pending file transfer.
///
/// The uploading side creates a token when it registers a file, hands the
/// token to its peer (usually as a command argument or return value), and the
/// peer presents it in a `DataDownloadRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadToken(Uuid);

impl UploadToken {
    /// Create a fresh token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UploadToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_roundtrip() {
        let token = UploadToken::new();
        let back: UploadToken = token.to_string().parse().unwrap();
        assert_eq!(token, back);
        assert!("not-a-token".parse::<UploadToken>().is_err());
    }
}
