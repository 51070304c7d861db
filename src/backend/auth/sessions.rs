/**
 * Session Tokens
 *
 * JWT generation and verification for socket sessions. The token is
 * handed out by the auth endpoint and presented as a query parameter at
 * connection establishment; the socket layer treats it as an opaque
 * user-identity extractor.
 */
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Token lifetime: 30 days.
const TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Email
    pub email: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Create a token for a user.
pub fn create_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    name: Option<&str>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = unix_now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.map(|n| n.to_string()),
        exp: now + TOKEN_TTL_SECS,
        iat: now,
    };
    let key = EncodingKey::from_secret(secret.as_ref());
    encode(&Header::default(), &claims, &key)
}

/// Verify a token and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_ref());
    let token_data = decode::<Claims>(token, &key, &Validation::default())?;
    Ok(token_data.claims)
}

/// Verify a token and extract the user id it names.
pub fn user_id_from_token(secret: &str, token: &str) -> Result<Uuid, String> {
    let claims =
        verify_token(secret, token).map_err(|e| format!("token verification failed: {e}"))?;
    Uuid::parse_str(&claims.sub).map_err(|e| format!("invalid user id in token: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn test_create_and_verify_token() {
        let user_id = Uuid::new_v4();
        let token = create_token(SECRET, user_id, "a@example.com", Some("Ada")).unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.name.as_deref(), Some("Ada"));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_user_id_from_token() {
        let user_id = Uuid::new_v4();
        let token = create_token(SECRET, user_id, "a@example.com", None).unwrap();
        assert_eq!(user_id_from_token(SECRET, &token).unwrap(), user_id);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let token = create_token(SECRET, Uuid::new_v4(), "a@example.com", None).unwrap();
        assert!(verify_token("other-secret", &token).is_err());
    }

    #[test]
    fn test_garbage_token_fails() {
        assert!(verify_token(SECRET, "not.a.token").is_err());
        assert!(user_id_from_token(SECRET, "").is_err());
    }
}
