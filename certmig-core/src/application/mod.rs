// certmig-core/src/application/mod.rs

pub mod analyze;
pub mod anonymize;
pub mod coordinator;
pub mod extract;
pub mod load;
pub mod report;
pub mod rollback;
pub mod validate;

use crate::domain::error::DomainError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Manifest file names, one per phase, written into the phase's output
// directory.
pub const SCHEMA_ANALYSIS_FILE: &str = "schema-analysis.json";
pub const EXTRACTION_MANIFEST_FILE: &str = "extraction-manifest.json";
pub const ANONYMIZATION_REPORT_FILE: &str = "anonymization-report.json";
pub const VALIDATION_REPORT_FILE: &str = "validation-report.json";
pub const LOAD_MANIFEST_FILE: &str = "load-manifest.json";
pub const ROLLBACK_MANIFEST_FILE: &str = "rollback-manifest.json";
pub const CONSISTENCY_MAP_FILE: &str = "consistency-map.json";

/// Cooperative cancellation. The coordinator owns the flag; workers
/// observe it between tables and between row batches. A cancel seen
/// mid-transaction triggers an explicit rollback upstream.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Errors with `Cancelled` once the flag is set.
    pub fn checkpoint(&self) -> Result<(), DomainError> {
        if self.is_cancelled() {
            Err(DomainError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(flag.checkpoint().is_ok());
        flag.cancel();
        assert!(matches!(flag.checkpoint(), Err(DomainError::Cancelled)));

        // Clones observe the same flag
        let clone = flag.clone();
        assert!(clone.is_cancelled());
    }
}
