use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, Validation, decode};

/// Tokens are issued by the identity service; this side only verifies them.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("refresh tokens cannot be used for API access".to_string());
    }
    Ok(claims)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;
    use crate::model::role::Role;

    pub const SECRET: &str = "test-secret";

    pub fn mint(role: Role, member_id: Option<u64>, client_id: Option<u64>, token_type: TokenType) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize
            + 600;
        let claims = Claims {
            user_id: 1,
            sub: "tester".to_string(),
            role: role as u8,
            exp,
            jti: "test-jti".to_string(),
            token_type,
            member_id,
            client_id,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn access_tokens_verify() {
        let token = mint(Role::Member, Some(10), None, TokenType::Access);
        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.member_id, Some(10));
        assert_eq!(claims.role, 3);
    }

    #[test]
    fn refresh_tokens_and_bad_secrets_are_rejected() {
        let refresh = mint(Role::Admin, None, None, TokenType::Refresh);
        assert!(verify_token(&refresh, SECRET).is_err());

        let access = mint(Role::Admin, None, None, TokenType::Access);
        assert!(verify_token(&access, "other-secret").is_err());
    }
}
