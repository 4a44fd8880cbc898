use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// Disease taxonomy a tile can be assigned to. Closed set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClassificationLabel {
    Healthy,
    MildInfection,
    SevereInfection,
}

impl ClassificationLabel {
    pub const ALL: [ClassificationLabel; 3] = [
        ClassificationLabel::Healthy,
        ClassificationLabel::MildInfection,
        ClassificationLabel::SevereInfection,
    ];

    pub fn is_healthy(&self) -> bool {
        matches!(self, ClassificationLabel::Healthy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A rectangular region of the source image. `chunk_id` follows raster order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub chunk_id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Classification of a single tile. `severity_score` is `None` for healthy tiles
/// and serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileResult {
    #[serde(flatten)]
    pub tile: TileRect,
    pub predicted_class: ClassificationLabel,
    pub confidence: f64,
    pub severity_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub chunks_total: u32,
    pub chunks_healthy: u32,
    pub chunks_mild: u32,
    pub chunks_severe: u32,
    pub overall_health_score: f64,
    pub dominant_class: ClassificationLabel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub analysis_id: Uuid,
    pub original_filename: String,
    pub image_size_mb: f64,
    #[serde(flatten)]
    pub summary: AnalysisSummary,
    pub processing_time_seconds: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisListItem {
    pub id: Uuid,
    pub original_filename: String,
    pub overall_health_score: f64,
    pub dominant_class: ClassificationLabel,
    pub created_at: DateTime<Utc>,
}

/// Flat export document offered for download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analysis_id: Uuid,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub image_size_mb: f64,
    #[serde(flatten)]
    pub summary: AnalysisSummary,
    pub processing_time_seconds: f64,
    pub chunk_results: Vec<TileResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Company,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub company_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}
