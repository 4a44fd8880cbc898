pub mod analysis_repository;
pub mod models;
pub mod user_repository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),
    #[error("Record already exists: {0}")]
    Conflict(String),
}
