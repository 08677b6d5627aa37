use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::repo_types::User;
use crate::error::{AppError, AppResult, FieldErrors};

const BLANK: &str = "This field may not be blank.";

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(invalid("blank", BLANK));
    }
    if username.chars().count() > 150 {
        return Err(invalid(
            "max_length",
            "Ensure this field has no more than 150 characters.",
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(invalid(
            "invalid",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(invalid("blank", BLANK));
    }
    let len = password.chars().count();
    if len < 8 {
        return Err(invalid(
            "password_too_short",
            "This password is too short. It must contain at least 8 characters.",
        ));
    }
    if len > 128 {
        return Err(invalid(
            "password_too_long",
            "Ensure this field has no more than 128 characters.",
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(
            "password_entirely_numeric",
            "This password is entirely numeric.",
        ));
    }
    Ok(())
}

/// Request body for `POST /signup/`.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_password"))]
    pub password: String,
}

impl SignupRequest {
    /// Trims the username, drops a blank email and lower-cases the email domain.
    pub fn normalized(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self.email = self
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .map(|e| match e.rsplit_once('@') {
                Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
                None => e,
            });
        self
    }
}

/// Request body for `POST /signin/`.
#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl SigninRequest {
    pub fn check_present(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        if self.username.trim().is_empty() {
            errors.insert("username".into(), vec![BLANK.into()]);
        }
        if self.password.is_empty() {
            errors.insert("password".into(), vec![BLANK.into()]);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

/// Request body for `POST /token/refresh/`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: String,
}

/// Returned by `POST /signup/`.
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<User> for SignupResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

/// Returned by `POST /signin/`.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

/// Returned by `POST /token/refresh/`.
#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub access: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(username: &str, email: Option<&str>, password: &str) -> SignupRequest {
        SignupRequest {
            username: username.into(),
            email: email.map(Into::into),
            password: password.into(),
        }
        .normalized()
    }

    fn failing_fields(req: &SignupRequest) -> Vec<String> {
        match req.validate() {
            Ok(()) => vec![],
            Err(e) => match AppError::from(e) {
                AppError::Validation(f) => f.into_keys().collect(),
                other => panic!("unexpected error {other:?}"),
            },
        }
    }

    #[test]
    fn accepts_well_formed_signup() {
        let req = signup("farmer.joe+1", Some("joe@Example.COM"), "wheat-harvest-42");
        assert!(req.validate().is_ok());
        assert_eq!(req.email.as_deref(), Some("joe@example.com"));
    }

    #[test]
    fn blank_email_is_treated_as_absent() {
        let req = signup("joe", Some("   "), "wheat-harvest-42");
        assert!(req.email.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn username_is_trimmed_before_validation() {
        let req = signup("  joe  ", None, "wheat-harvest-42");
        assert_eq!(req.username, "joe");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_bad_usernames() {
        assert_eq!(failing_fields(&signup("", None, "wheat-harvest-42")), ["username"]);
        assert_eq!(failing_fields(&signup("has space", None, "wheat-harvest-42")), ["username"]);
        assert_eq!(
            failing_fields(&signup(&"x".repeat(151), None, "wheat-harvest-42")),
            ["username"]
        );
    }

    #[test]
    fn length_limits_are_inclusive() {
        assert!(failing_fields(&signup(&"x".repeat(150), None, "wheat-harvest-42")).is_empty());
        assert!(failing_fields(&signup("joe", None, "abcdefg8")).is_empty());
        assert!(failing_fields(&signup("joe", None, &"p".repeat(128))).is_empty());
        assert_eq!(failing_fields(&signup("joe", None, "abcdef7")), ["password"]);
        assert_eq!(failing_fields(&signup("joe", None, &"p".repeat(129))), ["password"]);
    }

    #[test]
    fn rejects_weak_passwords() {
        assert_eq!(failing_fields(&signup("joe", None, "short")), ["password"]);
        assert_eq!(failing_fields(&signup("joe", None, "1234567890")), ["password"]);
        assert_eq!(failing_fields(&signup("joe", None, "")), ["password"]);
    }

    #[test]
    fn rejects_malformed_email() {
        assert_eq!(
            failing_fields(&signup("joe", Some("not-an-email"), "wheat-harvest-42")),
            ["email"]
        );
    }

    #[test]
    fn reports_every_failing_field() {
        let fields = failing_fields(&signup("", Some("nope"), "123"));
        assert_eq!(fields, ["email", "password", "username"]);
    }

    #[test]
    fn signin_requires_both_fields() {
        let req = SigninRequest {
            username: " ".into(),
            password: String::new(),
        };
        match req.check_present() {
            Err(AppError::Validation(f)) => {
                assert!(f.contains_key("username"));
                assert!(f.contains_key("password"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn signup_response_omits_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            username: "joe".into(),
            email: String::new(),
            password_hash: "$argon2id$secret".into(),
            is_active: true,
            date_joined: time::OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&SignupResponse::from(user)).unwrap();
        assert!(json.contains("\"username\":\"joe\""));
        assert!(!json.contains("argon2"));
    }
}
