use thiserror::Error;

use crate::PlayerId;

/// Fatal generation failures. They are raised through `anyhow`, so callers
/// recover the category with `err.downcast_ref::<GenerationError>()`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("player {player}: unknown region '{name}'")]
    UnknownRegion { player: PlayerId, name: String },

    #[error("player {player}: unknown location '{name}'")]
    UnknownLocation { player: PlayerId, name: String },

    #[error("player {player}: unknown entrance '{name}'")]
    UnknownEntrance { player: PlayerId, name: String },

    #[error("player {player}: unknown item group '{name}'")]
    UnknownItemGroup { player: PlayerId, name: String },

    #[error("player {player}: duplicate {kind} '{name}'")]
    DuplicateName {
        player: PlayerId,
        kind: &'static str,
        name: String,
    },

    #[error("player {player}: no start region")]
    MissingStartRegion { player: PlayerId },

    #[error("player {player}: event location '{name}' has no locked item")]
    UnplacedEvent { player: PlayerId, name: String },

    #[error("item pool has {items} items but there are {locations} unfilled locations ({breakdown})")]
    PoolMismatch {
        items: usize,
        locations: usize,
        breakdown: String,
    },

    #[error("player {player}: location '{name}' is unreachable even with every item collected")]
    UnreachableLocation { player: PlayerId, name: String },

    #[error("{stage}: no valid placement for {unplaced:?} after {swaps} swaps")]
    SearchExhausted {
        stage: String,
        unplaced: Vec<String>,
        swaps: usize,
    },

    #[error("fill finished with empty locations: {locations:?}")]
    UnfilledLocations { locations: Vec<String> },

    #[error("{excluded} excluded locations but only {available} non-progression items")]
    ExcludedOverflow { excluded: usize, available: usize },

    #[error("verification failed for player {player} ({name}): {reason}")]
    VerificationFailed {
        player: PlayerId,
        name: String,
        reason: String,
    },
}

impl GenerationError {
    /// Configuration errors are detected before fill starts and are never
    /// worth retrying with another seed.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            GenerationError::SearchExhausted { .. }
                | GenerationError::UnfilledLocations { .. }
                | GenerationError::VerificationFailed { .. }
        )
    }
}
