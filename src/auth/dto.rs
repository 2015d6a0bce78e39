use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::error::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    /// Trims names, lowercases the email and enforces the input policy.
    pub fn normalized(mut self) -> Result<Self, AuthError> {
        self.firstname = self.firstname.trim().to_string();
        self.lastname = self.lastname.trim().to_string();
        self.email = normalize_email(&self.email);

        if self.firstname.is_empty() || self.lastname.is_empty() {
            return Err(AuthError::MalformedInput(
                "First and last name are required.".into(),
            ));
        }
        if !is_valid_email(&self.email) {
            return Err(AuthError::MalformedInput("Invalid email.".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::MalformedInput(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters."
            )));
        }
        Ok(self)
    }
}

/// Request body for login. Length rules don't apply here.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn normalized(mut self) -> Result<Self, AuthError> {
        self.email = normalize_email(&self.email);
        if !is_valid_email(&self.email) {
            return Err(AuthError::MalformedInput("Invalid email.".into()));
        }
        Ok(self)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".into(),
        }
    }
}
