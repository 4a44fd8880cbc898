use image::DynamicImage;
use rand::Rng;
use shared::{ClassificationLabel, TileRect, TileResult};

use super::round_to;

/// Output of a classifier for one tile.
///
/// Fields are private so a healthy tile can never carry a severity score.
#[derive(Debug, Clone, PartialEq)]
pub struct TileClassification {
    label: ClassificationLabel,
    confidence: f64,
    severity_score: Option<f64>,
}

impl TileClassification {
    pub fn healthy(confidence: f64) -> Self {
        Self {
            label: ClassificationLabel::Healthy,
            confidence: confidence.clamp(0.0, 1.0),
            severity_score: None,
        }
    }

    /// Builds a classification for any label. The severity is dropped for
    /// healthy tiles and clamped to [0, 1] otherwise.
    pub fn new(label: ClassificationLabel, confidence: f64, severity: f64) -> Self {
        if label.is_healthy() {
            return Self::healthy(confidence);
        }
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            severity_score: Some(severity.clamp(0.0, 1.0)),
        }
    }

    pub fn label(&self) -> ClassificationLabel {
        self.label
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn severity_score(&self) -> Option<f64> {
        self.severity_score
    }

    pub fn into_result(self, tile: TileRect) -> TileResult {
        TileResult {
            tile,
            predicted_class: self.label,
            confidence: self.confidence,
            severity_score: self.severity_score,
        }
    }
}

/// Assigns a disease label to a single tile of a decoded image.
///
/// Implementations must be pure with respect to the pipeline: the result may
/// only depend on the tile and its pixels. Tiles are classified concurrently.
pub trait TileClassifier: Send + Sync {
    fn classify(&self, tile: &TileRect, pixels: &DynamicImage) -> TileClassification;

    /// Processing time to report instead of a wall-clock measurement.
    fn simulated_duration(&self) -> Option<f64> {
        None
    }
}

/// Stand-in classifier that draws labels at random and ignores pixel data.
/// Replace with a trained model; nothing else in the pipeline changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomClassifier;

impl TileClassifier for RandomClassifier {
    fn classify(&self, _tile: &TileRect, _pixels: &DynamicImage) -> TileClassification {
        let mut rng = rand::rng();
        let label = ClassificationLabel::ALL[rng.random_range(0..ClassificationLabel::ALL.len())];
        let confidence = round_to(rng.random_range(0.70..=0.99), 2);
        if label.is_healthy() {
            TileClassification::healthy(confidence)
        } else {
            let severity = round_to(rng.random_range(0.0..=1.0), 2);
            TileClassification::new(label, confidence, severity)
        }
    }

    fn simulated_duration(&self) -> Option<f64> {
        Some(round_to(rand::rng().random_range(1.5..=4.0), 2))
    }
}
