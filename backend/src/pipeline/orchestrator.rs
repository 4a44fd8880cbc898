use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use rayon::prelude::*;
use shared::{AnalysisSummary, ImageDimensions, TileRect, TileResult};
use tokio_util::sync::CancellationToken;

use super::aggregate::{limit, summarize};
use super::classifier::TileClassifier;
use super::geometry::partition;
use super::round_to;
use crate::config::AnalysisConfig;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to decode image '{filename}': {source}")]
    Decode {
        filename: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Analysis cancelled at tile {at_tile} of {total}")]
    Cancelled { at_tile: usize, total: usize },
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Decode { .. } => "decode",
            PipelineError::Cancelled { .. } => "classify",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dimensions: ImageDimensions,
    pub chunk_results: Vec<TileResult>,
    pub summary: AnalysisSummary,
    pub processing_time_seconds: f64,
    /// Tiles removed by the capacity limit.
    pub tiles_dropped: usize,
}

#[derive(Clone)]
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    classifier: Arc<dyn TileClassifier>,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig, classifier: Arc<dyn TileClassifier>) -> Self {
        Self { config, classifier }
    }

    /// Decodes `image_bytes`, tiles the image, classifies every kept tile and
    /// aggregates the results. Nothing is persisted here.
    pub fn run(
        &self,
        image_bytes: &[u8],
        filename: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, PipelineError> {
        let image = image::load_from_memory(image_bytes).map_err(|source| PipelineError::Decode {
            filename: filename.to_string(),
            source,
        })?;
        let dimensions = ImageDimensions {
            width: image.width(),
            height: image.height(),
        };
        if dimensions.is_empty() {
            log::warn!(
                "Image '{}' has zero area ({}x{}), producing an empty analysis",
                filename,
                dimensions.width,
                dimensions.height
            );
        }

        let tiles = partition(dimensions.width, dimensions.height, self.config.tile_edge);
        let partitioned = tiles.len();
        let tiles = limit(tiles, self.config.max_tiles);
        let tiles_dropped = partitioned - tiles.len();
        if tiles_dropped > 0 {
            log::info!(
                "Image '{}' ({}x{}) split into {} tiles, analysing the first {}",
                filename,
                dimensions.width,
                dimensions.height,
                partitioned,
                tiles.len()
            );
        }

        let started = Instant::now();
        let chunk_results = self.classify_tiles(&tiles, &image, cancel)?;
        let summary = summarize(&chunk_results);
        let processing_time_seconds = self
            .classifier
            .simulated_duration()
            .unwrap_or_else(|| round_to(started.elapsed().as_secs_f64(), 2));

        log::debug!(
            "Analysed '{}': {} tiles, health score {}, dominant {}",
            filename,
            summary.chunks_total,
            summary.overall_health_score,
            summary.dominant_class
        );

        Ok(PipelineOutput {
            dimensions,
            chunk_results,
            summary,
            processing_time_seconds,
            tiles_dropped,
        })
    }

    fn classify_tiles(
        &self,
        tiles: &[TileRect],
        image: &DynamicImage,
        cancel: &CancellationToken,
    ) -> Result<Vec<TileResult>, PipelineError> {
        let total = tiles.len();
        tiles
            .par_iter()
            .enumerate()
            .map(|(index, tile)| {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled {
                        at_tile: index,
                        total,
                    });
                }
                Ok(self.classifier.classify(tile, image).into_result(*tile))
            })
            .collect()
    }
}
