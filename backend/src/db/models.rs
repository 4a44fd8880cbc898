use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{AnalysisListItem, AnalysisReport, AnalysisSummary, Role, TileResult, UserResponse};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub full_name: String,
    pub role: Role,
    pub company_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub disabled: bool,
}

impl User {
    pub fn new(
        email: String,
        hashed_password: String,
        full_name: String,
        role: Role,
        company_name: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            hashed_password,
            full_name,
            role,
            // Only company accounts carry a company name
            company_name: company_name.filter(|_| role == Role::Company),
            created_at: Utc::now(),
            disabled: false,
        }
    }

    pub fn to_response(&self) -> UserResponse {
        UserResponse {
            id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role,
            company_name: self.company_name.clone(),
            created_at: self.created_at,
        }
    }
}

/// Stored outcome of one upload. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_id: Uuid,
    pub user_id: Uuid,
    pub original_filename: String,
    pub stored_filename: String,
    pub image_size_mb: f64,
    #[serde(flatten)]
    pub summary: AnalysisSummary,
    pub chunk_results: Vec<TileResult>,
    pub processing_time_seconds: f64,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn to_list_item(&self) -> AnalysisListItem {
        AnalysisListItem {
            id: self.analysis_id,
            original_filename: self.original_filename.clone(),
            overall_health_score: self.summary.overall_health_score,
            dominant_class: self.summary.dominant_class,
            created_at: self.created_at,
        }
    }

    pub fn to_report(&self) -> AnalysisReport {
        AnalysisReport {
            analysis_id: self.analysis_id,
            original_filename: self.original_filename.clone(),
            created_at: self.created_at,
            image_size_mb: self.image_size_mb,
            summary: self.summary.clone(),
            processing_time_seconds: self.processing_time_seconds,
            chunk_results: self.chunk_results.clone(),
        }
    }
}
