use super::jwt::JwtService;
use super::models::SessionUser;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ok, ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Paths that never need a token.
const PUBLIC_PATHS: [&str; 3] = ["/", "/api/auth/register", "/api/auth/login"];

/// Resolves the bearer token of every request into a `SessionUser`.
///
/// Requests without a valid token continue as the guest unless
/// `require_login` is set, in which case they are answered with 401.
#[derive(Clone)]
pub struct AuthMiddleware {
    jwt_service: Arc<JwtService>,
    require_login: bool,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService, require_login: bool) -> Self {
        Self {
            jwt_service: Arc::new(jwt_service),
            require_login,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            jwt_service: self.jwt_service.clone(),
            require_login: self.require_login,
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    jwt_service: Arc<JwtService>,
    require_login: bool,
}

#[derive(Debug)]
enum AuthError {
    NoAuthHeader,
    InvalidHeaderFormat,
    NotBearerToken,
    VerificationFailed(String),
}

impl AuthError {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthError::NoAuthHeader => format!("No Authorization header found for path: {}", path),
            AuthError::InvalidHeaderFormat => format!("Invalid Authorization header format (non-UTF-8) for path: {}", path),
            AuthError::NotBearerToken => format!("Authorization header for path {} doesn't start with 'Bearer '", path),
            AuthError::VerificationFailed(e) => format!("JWT token verification failed for path {}: {}", path, e),
        }
    }

    fn client_error_json(&self) -> serde_json::Value {
        let error_message = match self {
            AuthError::VerificationFailed(_) => "Could not validate credentials",
            _ => "Missing or invalid authorization token",
        };
        serde_json::json!({"error": error_message})
    }
}

fn validate_request_token(
    req: &ServiceRequest,
    jwt_service: &JwtService,
) -> Result<SessionUser, AuthError> {
    let auth_header = req.headers().get("Authorization").ok_or(AuthError::NoAuthHeader)?;
    let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidHeaderFormat)?;
    let token = auth_str.strip_prefix("Bearer ").ok_or(AuthError::NotBearerToken)?;

    jwt_service
        .session_user(token)
        .map_err(|e| AuthError::VerificationFailed(e.to_string()))
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt_service = self.jwt_service.clone();
        let require_login = self.require_login;

        Box::pin(async move {
            let path_str = req.path().to_string();

            if PUBLIC_PATHS.contains(&path_str.as_str()) {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            match validate_request_token(&req, &jwt_service) {
                Ok(user) => {
                    log::debug!("Request to {} authenticated as {}", path_str, user.id);
                    req.extensions_mut().insert(user);
                }
                Err(auth_error) if require_login => {
                    log::warn!("{}", auth_error.log_message(&path_str));
                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Unauthorized()
                        .json(auth_error.client_error_json())
                        .map_into_right_body();
                    return Ok(ServiceResponse::new(http_req, response));
                }
                Err(auth_error) => {
                    log::debug!("{}; continuing as guest", auth_error.log_message(&path_str));
                    req.extensions_mut().insert(SessionUser::guest());
                }
            }

            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

/// The caller's identity, falling back to the guest.
pub struct CurrentUser(pub SessionUser);

impl FromRequest for CurrentUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let user = req
            .extensions()
            .get::<SessionUser>()
            .cloned()
            .unwrap_or_else(SessionUser::guest);
        ok(CurrentUser(user))
    }
}

/// A signed-in caller. Guests are rejected with 401.
pub struct AuthenticatedUser(pub SessionUser);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<SessionUser>() {
            Some(user) if !user.is_guest() => ready(Ok(AuthenticatedUser(user.clone()))),
            _ => {
                log::warn!("No authenticated user for path: {}", req.path());
                let response = HttpResponse::Unauthorized()
                    .json(serde_json::json!({"error": "Could not validate credentials"}));
                ready(Err(
                    actix_web::error::InternalError::from_response("unauthorized", response).into(),
                ))
            }
        }
    }
}
