use crate::{
    model::{employee::AccountStatus, role::Role},
    models::{Claims, TokenType},
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub employee_id: u64,
    pub employee_code: String,
    pub role: Role,
}

impl TryFrom<Claims> for AuthUser {
    type Error = &'static str;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        if claims.token_type != TokenType::Access {
            return Err("Access token required");
        }
        let role = Role::from_id(claims.role).ok_or("Invalid role")?;

        Ok(AuthUser {
            employee_id: claims.employee_id,
            employee_code: claims.sub,
            role,
        })
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Set by the auth middleware once the account has been checked.
        let user = req.extensions().get::<AuthUser>().cloned();
        ready(user.ok_or_else(|| ErrorUnauthorized("Missing token")))
    }
}

impl AuthUser {
    /// Identity as stored now; refuses deactivated accounts.
    pub fn from_account(account: &AccountStatus) -> Result<Self, &'static str> {
        if !account.is_active {
            return Err("Your account has been deactivated");
        }
        let role = Role::from_id(account.role_id).ok_or("Invalid role")?;

        Ok(AuthUser {
            employee_id: account.id,
            employee_code: account.employee_code.clone(),
            role,
        })
    }

    pub fn require_admin(&self) -> actix_web::Result<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Admin only"))
        }
    }

    pub fn require_hr_or_admin(&self) -> actix_web::Result<()> {
        if matches!(self.role, Role::Admin | Role::Hr) {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("HR/Admin only"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: u8, token_type: TokenType) -> Claims {
        Claims {
            sub: "EMP002".into(),
            employee_id: 2,
            role,
            exp: 0,
            jti: "j".into(),
            token_type,
        }
    }

    #[test]
    fn refresh_tokens_do_not_authenticate() {
        assert!(AuthUser::try_from(claims(3, TokenType::Refresh)).is_err());
        assert!(AuthUser::try_from(claims(9, TokenType::Access)).is_err());

        let user = AuthUser::try_from(claims(2, TokenType::Access)).unwrap();
        assert_eq!(user.role, Role::Hr);
        assert!(user.require_hr_or_admin().is_ok());
        assert!(user.require_admin().is_err());
    }

    #[test]
    fn stored_account_decides_role_and_standing() {
        let mut account = AccountStatus {
            id: 4,
            employee_code: "EMP004".into(),
            role_id: 3,
            is_active: true,
        };
        let user = AuthUser::from_account(&account).unwrap();
        assert_eq!(user.role, Role::Employee);
        assert_eq!(user.employee_code, "EMP004");

        account.is_active = false;
        assert_eq!(
            AuthUser::from_account(&account).unwrap_err(),
            "Your account has been deactivated"
        );

        account.is_active = true;
        account.role_id = 9;
        assert!(AuthUser::from_account(&account).is_err());
    }
}
