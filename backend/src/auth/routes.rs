use actix_web::{web, HttpResponse, Result};
use log::{error, info, warn};
use shared::TokenResponse;

use crate::db::models::User;
use crate::db::user_repository::UserRepository;
use crate::db::RepositoryError;

use super::jwt::JwtService;
use super::middleware::AuthenticatedUser;
use super::models::{LoginForm, RegisterRequest};
use super::password::{hash_password, verify_password};

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_json(message: &str) -> ErrorResponse {
    ErrorResponse {
        error: message.to_string(),
    }
}

fn token_response(user: &User, jwt_service: &JwtService) -> Result<HttpResponse> {
    match jwt_service.generate_token(user) {
        Ok(access_token) => Ok(HttpResponse::Ok().json(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            user: user.to_response(),
        })),
        Err(e) => {
            error!("Failed to issue token for {}: {:?}", user.id, e);
            Ok(HttpResponse::InternalServerError().json(error_json("Failed to issue token")))
        }
    }
}

pub async fn register(
    body: web::Json<RegisterRequest>,
    users: web::Data<UserRepository>,
    jwt_service: web::Data<JwtService>,
) -> Result<HttpResponse> {
    let request = body.into_inner();
    let email = request.email.trim().to_string();

    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Ok(HttpResponse::BadRequest().json(error_json("Invalid email address")));
    }
    if request.password.is_empty() {
        return Ok(HttpResponse::BadRequest().json(error_json("Password must not be empty")));
    }
    if request.full_name.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(error_json("Full name is required")));
    }

    let password = request.password;
    let hashed_password = match web::block(move || hash_password(&password)).await {
        Ok(Ok(hashed)) => hashed,
        Ok(Err(e)) => {
            error!("Failed to hash password: {}", e);
            return Ok(HttpResponse::InternalServerError().json(error_json("Failed to create user")));
        }
        Err(e) => {
            error!("Password hashing task failed: {}", e);
            return Ok(HttpResponse::InternalServerError().json(error_json("Failed to create user")));
        }
    };

    let user = User::new(
        email,
        hashed_password,
        request.full_name.trim().to_string(),
        request.role,
        request.company_name,
    );

    match users.create_user(&user).await {
        Ok(()) => {
            info!("Registered user {} ({})", user.email, user.role);
            token_response(&user, &jwt_service)
        }
        Err(RepositoryError::DuplicateEmail(email)) => {
            warn!("Registration rejected, email already registered: {}", email);
            Ok(HttpResponse::BadRequest().json(error_json("Email already registered")))
        }
        Err(e) => {
            error!("Failed to create user: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(error_json("Failed to create user")))
        }
    }
}

pub async fn login(
    form: web::Form<LoginForm>,
    users: web::Data<UserRepository>,
    jwt_service: web::Data<JwtService>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let user = users.get_user_by_email(form.username.trim()).await;
    let verified = match &user {
        Some(user) => {
            let password = form.password;
            let stored = user.hashed_password.clone();
            web::block(move || verify_password(&password, &stored))
                .await
                .unwrap_or(false)
        }
        None => false,
    };

    let user = match user {
        Some(user) if verified => user,
        _ => {
            warn!("Failed login attempt for {}", form.username);
            return Ok(HttpResponse::Unauthorized().json(error_json("Incorrect email or password")));
        }
    };

    if user.disabled {
        return Ok(HttpResponse::BadRequest().json(error_json("Account disabled")));
    }

    info!("User {} logged in", user.id);
    token_response(&user, &jwt_service)
}

pub async fn me(
    user: AuthenticatedUser,
    users: web::Data<UserRepository>,
) -> Result<HttpResponse> {
    match users.get_user_by_id(user.0.id).await {
        Some(user_data) => Ok(HttpResponse::Ok().json(user_data.to_response())),
        None => {
            warn!("Token refers to unknown user {}", user.0.id);
            Ok(HttpResponse::Unauthorized().json(error_json("Could not validate credentials")))
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/me", web::get().to(me)),
    );
}
