use chrono::Utc;
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error as JwtError,
};
use uuid::Uuid;

use crate::models::{Claims, TokenType};

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

fn build_claims(
    employee_id: u64,
    employee_code: String,
    role: u8,
    token_type: TokenType,
    ttl: usize,
) -> Claims {
    Claims {
        sub: employee_code,
        employee_id,
        role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
    }
}

fn sign(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn generate_access_token(
    employee_id: u64,
    employee_code: String,
    role: u8,
    secret: &str,
    ttl: usize,
) -> Result<String, JwtError> {
    let claims = build_claims(employee_id, employee_code, role, TokenType::Access, ttl);
    sign(&claims, secret)
}

/// Returns the claims too; the `jti` and `exp` are persisted for rotation.
pub fn generate_refresh_token(
    employee_id: u64,
    employee_code: String,
    role: u8,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), JwtError> {
    let claims = build_claims(employee_id, employee_code, role, TokenType::Refresh, ttl);
    let token = sign(&claims, secret)?;
    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_type_is_carried_in_claims() {
        let access = generate_access_token(4, "EMP004".into(), 3, "secret", 60).unwrap();
        let claims = verify_token(&access, "secret").unwrap();
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.employee_id, 4);
        assert_eq!(claims.sub, "EMP004");

        let (refresh, issued) = generate_refresh_token(4, "EMP004".into(), 3, "secret", 60).unwrap();
        let claims = verify_token(&refresh, "secret").unwrap();
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.jti, issued.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_access_token(4, "EMP004".into(), 3, "secret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }
}
