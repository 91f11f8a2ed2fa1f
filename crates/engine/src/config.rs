use crate::errors::{EngineError, EngineResult};

/// Minimum confirmation-depth window, in rounds. A buffer below this would
/// let a micro-batch be sealed before its surrounding context has settled.
pub const MIN_SAFETY_BUFFER: u64 = 2;

/// Default bound on internal retries after a lost conditional write.
pub const DEFAULT_MAX_OCC_RETRIES: u32 = 3;

/// Engine construction parameters, validated before any resource is touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    safety_buffer: u64,
    max_occ_retries: u32,
}

impl EngineConfig {
    pub fn new(safety_buffer: u64) -> EngineResult<Self> {
        if safety_buffer < MIN_SAFETY_BUFFER {
            return Err(EngineError::SafetyBufferTooSmall(safety_buffer));
        }
        Ok(Self {
            safety_buffer,
            max_occ_retries: DEFAULT_MAX_OCC_RETRIES,
        })
    }

    pub fn with_max_occ_retries(mut self, retries: u32) -> Self {
        self.max_occ_retries = retries;
        self
    }

    /// Rounds a micro-batch must wait, counted from its creation round.
    pub fn safety_buffer(&self) -> u64 {
        self.safety_buffer
    }

    pub fn max_occ_retries(&self) -> u32 {
        self.max_occ_retries
    }
}
