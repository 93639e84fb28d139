//! Input checks run at the handler boundary before the store is touched.
//! Each function returns the first violated constraint.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::auth::{
    dto::{ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest},
    repo_types::{NewUser, UserUpdate},
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^\S+@\S+\.\S+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.trim().is_empty())
}

/// Passwords are taken verbatim, so only the empty string counts as missing.
fn present_secret(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}

pub fn check_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    let len = name.chars().count();
    if len < MIN_NAME_LEN {
        return Err(ValidationError::new(format!(
            "Name must be at least {MIN_NAME_LEN} characters"
        )));
    }
    if len > MAX_NAME_LEN {
        return Err(ValidationError::new(format!(
            "Name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

pub fn check_email(email: &str) -> Result<String, ValidationError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(ValidationError::new("Invalid email address"));
    }
    Ok(email)
}

pub fn check_password(password: &str, label: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(format!(
            "{label} must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Presence and password length only. Name and email format are checked by
/// `UserStore::create`, after the handler's uniqueness pre-check.
pub fn validate_register(req: RegisterRequest) -> Result<NewUser, ValidationError> {
    let (Some(name), Some(email), Some(password)) = (
        present(&req.name),
        present(&req.email),
        present_secret(&req.password),
    ) else {
        return Err(ValidationError::new(
            "Please provide name, email and password",
        ));
    };
    check_password(password, "Password")?;
    Ok(NewUser {
        name: name.trim().to_string(),
        email: normalize_email(email),
        password: password.to_string(),
    })
}

/// Returns the normalised email and the password.
pub fn validate_login(req: LoginRequest) -> Result<(String, String), ValidationError> {
    let (Some(email), Some(password)) = (present(&req.email), present_secret(&req.password))
    else {
        return Err(ValidationError::new("Please provide email and password"));
    };
    Ok((normalize_email(email), password.to_string()))
}

/// Empty strings count as "not provided" and leave the field untouched.
pub fn validate_profile_update(req: UpdateProfileRequest) -> Result<UserUpdate, ValidationError> {
    let name = present(&req.name).map(check_name).transpose()?;
    let avatar = present(&req.avatar).map(|a| a.trim().to_string());
    Ok(UserUpdate {
        name,
        avatar,
        password: None,
    })
}

/// Returns `(current, new)`.
pub fn validate_change_password(
    req: ChangePasswordRequest,
) -> Result<(String, String), ValidationError> {
    let (Some(current), Some(new)) = (
        present_secret(&req.current_password),
        present_secret(&req.new_password),
    ) else {
        return Err(ValidationError::new(
            "Please provide current password and new password",
        ));
    };
    check_password(new, "New password")?;
    Ok((current.to_string(), new.to_string()))
}
