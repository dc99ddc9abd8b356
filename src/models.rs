use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::error::invalid;

#[derive(Deserialize, Validate, ToSchema)]
pub struct UserReq {
    #[validate(length(min = 3, max = 64, message = "username must be 3 to 64 characters"))]
    #[schema(example = "jdoe")]
    pub username: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[validate(range(min = 1, max = 5, message = "unknown role"))]
    #[schema(example = 3)]
    pub role_id: u8,
    /// Links the account to an employee record for self-service access.
    pub employee_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    pub username: String,
    pub password: String,
}

#[derive(FromRow)]
pub struct UserSql {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role_id: u8,
    pub employee_id: Option<u64>,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Pagination shared by every list endpoint: page starts at 1,
/// per_page is clamped to 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_per_page).clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

/// Display names are stored trimmed, so the length limit applies to the
/// trimmed value.
pub fn display_name(value: &str) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if !(1..=120).contains(&len) {
        return Err(invalid("length", "name must be 1 to 120 characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_ignores_surrounding_spaces() {
        assert!(display_name("  Finance ").is_ok());
        assert!(display_name("   ").is_err());
        assert!(display_name(&format!(" {} ", "a".repeat(120))).is_ok());
        assert!(display_name(&"a".repeat(121)).is_err());
    }

    #[test]
    fn page_is_clamped() {
        let p = Page::new(Some(0), Some(500), 20);
        assert_eq!(p, Page { page: 1, per_page: 100 });
        assert_eq!(p.offset(), 0);

        let p = Page::new(Some(3), None, 20);
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);
    }

    #[test]
    fn register_request_is_validated() {
        let req = UserReq {
            username: "ab".into(),
            password: "short".into(),
            role_id: 9,
            employee_id: None,
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("role_id"));
    }
}
