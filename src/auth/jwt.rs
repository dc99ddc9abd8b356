use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

/// Who a token is issued for.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: u64,
    pub username: String,
    pub role: u8,
    pub employee_id: Option<u64>,
}

impl From<&Claims> for TokenSubject {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.sub.clone(),
            role: claims.role,
            employee_id: claims.employee_id,
        }
    }
}

fn now() -> usize {
    chrono::Utc::now().timestamp().max(0) as usize
}

pub fn generate_token(
    subject: &TokenSubject,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = Claims {
        user_id: subject.user_id,
        sub: subject.username.clone(),
        role: subject.role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        employee_id: subject.employee_id,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: 7,
            username: "hr.lead".into(),
            role: 2,
            employee_id: Some(42),
        }
    }

    #[test]
    fn token_round_trips() {
        let (token, issued) = generate_token(&subject(), TokenType::Access, "s3cret", 60).unwrap();
        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.employee_id, Some(42));
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.jti, issued.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) = generate_token(&subject(), TokenType::Refresh, "s3cret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn refresh_tokens_get_unique_ids() {
        let (_, a) = generate_token(&subject(), TokenType::Refresh, "s3cret", 60).unwrap();
        let (_, b) = generate_token(&subject(), TokenType::Refresh, "s3cret", 60).unwrap();
        assert_ne!(a.jti, b.jti);
    }
}
