use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{Stage, StageKind};
use crate::error::StageError;
use crate::state::{PipelineState, Source};

/// Drops sources whose `uri` was already seen, keeping first-seen order.
pub fn dedup_sources(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| seen.insert(source.uri.clone()))
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SourceDeduplicator;

#[async_trait]
impl Stage for SourceDeduplicator {
    fn kind(&self) -> StageKind {
        StageKind::SourceDeduplicator
    }

    #[instrument(name = "stage.source_deduplicator", skip_all)]
    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let before = state.sources.len();
        state.sources = dedup_sources(std::mem::take(&mut state.sources));

        debug!(
            before,
            unique = state.sources.len(),
            "deduplicated sources"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(uris: &[&str]) -> Vec<Source> {
        uris.iter()
            .enumerate()
            .map(|(idx, uri)| Source::new(format!("title {idx}"), *uri))
            .collect()
    }

    fn uris(sources: &[Source]) -> Vec<&str> {
        sources.iter().map(|s| s.uri.as_str()).collect()
    }

    #[test]
    fn keeps_first_occurrence_in_order() {
        let out = dedup_sources(sources(&["a", "b", "a", "c", "b"]));
        assert_eq!(uris(&out), vec!["a", "b", "c"]);
        assert_eq!(out[0].title, "title 0");
        assert_eq!(out[1].title, "title 1");
    }

    #[test]
    fn empty_uri_is_a_regular_key() {
        let out = dedup_sources(sources(&["", "x", ""]));
        assert_eq!(uris(&out), vec!["", "x"]);
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            vec![],
            vec!["a"],
            vec!["a", "a", "a"],
            vec!["#", "u1", "#", "u2", "u1", ""],
        ];
        for input in inputs {
            let once = dedup_sources(sources(&input));
            let twice = dedup_sources(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[tokio::test]
    async fn stage_rewrites_state_sources() {
        let mut state = PipelineState::research("rust", false);
        state.sources = sources(&["u1", "u2", "u1"]);

        SourceDeduplicator.run(&mut state).await.unwrap();

        assert_eq!(uris(&state.sources), vec!["u1", "u2"]);
    }
}
