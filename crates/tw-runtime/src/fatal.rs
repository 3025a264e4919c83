use std::sync::{Mutex, MutexGuard, PoisonError};

use tw_core::TweakError;

/// Set by native bindings that hit an unrecoverable condition while the
/// embedded runtime is executing. Checked after every call into the runtime.
#[derive(Debug, Default)]
pub struct FatalSignal {
    raised: Mutex<Option<TweakError>>,
}

impl FatalSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn raised(&self) -> MutexGuard<'_, Option<TweakError>> {
        self.raised.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keeps the first error; later ones are dropped.
    pub fn raise(&self, error: TweakError) {
        let mut raised = self.raised();
        if raised.is_none() {
            *raised = Some(TweakError::fatal(error.code, error.message));
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised().is_some()
    }

    pub fn current(&self) -> Option<TweakError> {
        self.raised().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_raised_error_wins_and_is_fatal() {
        let signal = FatalSignal::new();
        assert!(!signal.is_raised());
        signal.raise(TweakError::new("IO_READ_FAILED", "first"));
        signal.raise(TweakError::new("OTHER", "second"));

        let error = signal.current().expect("error should be raised");
        assert_eq!(error.code, "IO_READ_FAILED");
        assert!(error.is_fatal());
        assert!(signal.is_raised());
    }
}
