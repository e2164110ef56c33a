use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Token payload. `exp`, `iss` and `aud` are checked by the decoder,
/// `kind` by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

#[cfg(test)]
mod claims_tests {
    use super::*;

    #[test]
    fn kind_is_lowercase_on_the_wire() {
        assert_eq!(serde_json::to_string(&TokenKind::Refresh).unwrap(), r#""refresh""#);
        let kind: TokenKind = serde_json::from_str(r#""access""#).unwrap();
        assert_eq!(kind, TokenKind::Access);
    }
}
