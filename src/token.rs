use anyhow::{Context, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

pub const TOKEN_TTL_HOURS: i64 = 24;

/// Claims carried by every bearer token. Tokens are compact JWTs signed
/// with HMAC-SHA-256 over the shared `JWT_SECRET`; verification is
/// stateless so the gateway never calls identity on the hot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub status: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub iat: usize,
    pub exp: usize,
}

impl Claims {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

pub fn issue(
    user_id: &str,
    email: &str,
    status: &str,
    roles: Vec<String>,
    permissions: Vec<String>,
    secret: &str,
) -> Result<String> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        status: status.to_string(),
        roles,
        permissions,
        iat: now.timestamp() as usize,
        exp: (now + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("signing token")
}

/// Rejects malformed, non-HMAC, badly signed, and expired tokens.
pub fn verify(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("invalid token")?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_claims() {
        let token = issue(
            "u-1",
            "a@example.com",
            "active",
            vec!["user".into()],
            vec!["transactions:reverse".into()],
            "secret",
        )
        .unwrap();
        let claims = verify(&token, "secret").unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.email, "a@example.com");
        assert!(claims.has_permission("transactions:reverse"));
        assert!(!claims.has_permission("users:verify"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue("u-1", "a@example.com", "active", vec![], vec![], "secret").unwrap();
        assert!(verify(&token, "other").is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify("not-a-token", "secret").is_err());
    }
}
