/// Default start of the holding area, far past any musical content (beats)
pub const DEFAULT_HOLDING_OFFSET: f64 = 100_000.0;

/// Space left between consecutive holding-area reservations (beats)
pub const DEFAULT_HOLDING_GAP: f64 = 16.0;

/// Most clips a single slice request may produce
pub const MAX_SLICES: usize = 64;

/// Most fragments a single split request may produce
pub const MAX_SPLIT_FRAGMENTS: usize = 64;

/// Engine settings threaded through one transform call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Where the holding area starts on every track
    pub holding_offset: f64,
    /// Gap between holding-area reservations
    pub holding_gap: f64,
    /// Cap on clips produced by slicing in one call
    pub max_slices: usize,
    /// Cap on fragments produced by splitting in one call
    pub max_split_fragments: usize,
}

impl EngineConfig {
    pub fn with_holding_offset(holding_offset: f64) -> Self {
        Self {
            holding_offset,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            holding_offset: DEFAULT_HOLDING_OFFSET,
            holding_gap: DEFAULT_HOLDING_GAP,
            max_slices: MAX_SLICES,
            max_split_fragments: MAX_SPLIT_FRAGMENTS,
        }
    }
}
