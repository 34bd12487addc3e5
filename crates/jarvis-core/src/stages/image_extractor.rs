use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{Stage, StageKind};
use crate::error::StageError;
use crate::state::PipelineState;

/// Copies the image list out of the raw search payload.
///
/// Always overwrites `images`: when the payload has no image key the list
/// ends up empty, even if an earlier stage had set it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageExtractor;

#[async_trait]
impl Stage for ImageExtractor {
    fn kind(&self) -> StageKind {
        StageKind::ImageExtractor
    }

    #[instrument(name = "stage.image_extractor", skip_all)]
    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        state.images = state
            .search_results
            .as_ref()
            .and_then(|results| results.images.clone())
            .unwrap_or_default();

        debug!(images = state.images.len(), "extracted visual assets");
        Ok(())
    }
}
