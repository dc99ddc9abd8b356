use crate::{error::AppError, model::role::Role};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// Authenticated caller, placed in request extensions by
/// [`auth_middleware`](crate::auth::middleware::auth_middleware).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("Missing token".to_string())),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin only".to_string()))
        }
    }

    pub fn require_hr_or_admin(&self) -> Result<(), AppError> {
        if self.role.is_hr_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden("HR/Admin only".to_string()))
        }
    }

    /// Employee record of the caller, required for self-service endpoints.
    pub fn own_employee_id(&self) -> Result<u64, AppError> {
        self.employee_id
            .ok_or_else(|| AppError::Forbidden("No employee profile".to_string()))
    }

    /// HR staff may read any employee's data; everyone else only their own.
    pub fn require_self_or_hr(&self, employee_id: u64) -> Result<(), AppError> {
        if self.role.is_hr_staff() || self.employee_id == Some(employee_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not allowed to view another employee's records".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            employee_id,
        }
    }

    #[test]
    fn role_guards() {
        assert!(user(Role::Admin, None).require_admin().is_ok());
        assert!(user(Role::Hr, None).require_admin().is_err());
        assert!(user(Role::Hr, None).require_hr_or_admin().is_ok());
        assert!(user(Role::Employee, Some(3)).require_hr_or_admin().is_err());
    }

    #[test]
    fn employees_only_see_their_own_records() {
        let me = user(Role::Employee, Some(3));
        assert!(me.require_self_or_hr(3).is_ok());
        assert!(me.require_self_or_hr(4).is_err());
        assert!(user(Role::Hr, None).require_self_or_hr(4).is_ok());
        assert!(user(Role::Employee, None).own_employee_id().is_err());
    }
}
