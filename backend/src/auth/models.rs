use serde::{Deserialize, Serialize};
use shared::Role;
use uuid::Uuid;

/// Identity attached to a request. The guest is the nil UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}

impl SessionUser {
    pub fn guest() -> Self {
        Self {
            id: Uuid::nil(),
            email: None,
            role: Role::User,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.id.is_nil()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub email: String,
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub role: Role,
    pub company_name: Option<String>,
}

/// OAuth2 password-style login form.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}
