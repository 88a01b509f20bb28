//! Trait for independent surge evidence

use crate::model::{SignalContext, SignalOutcome, SurgeSignalKind};

/// One source of surge evidence.
///
/// Signals never see each other's outcomes; combining them is a separate,
/// order-independent step.
pub trait SurgeSignal: Send + Sync {
    fn kind(&self) -> SurgeSignalKind;

    fn evaluate(&self, context: &SignalContext<'_>) -> SignalOutcome;
}
