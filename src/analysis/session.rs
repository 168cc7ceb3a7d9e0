//! Analysis session: owns the def-use and liveness oracles of the program
//! being analyzed.

use super::oracle::{DefUseOracle, LivenessOracle};
use crate::utils::errors::{SessionError, SessionErrorKind};
use log::debug;

/// Per-program analysis state.
///
/// Initialize once with the program's oracles, analyze any number of loops,
/// then [`release`](Self::release).
#[derive(Default)]
pub struct AnalysisSession {
    defuse: Option<Box<dyn DefUseOracle>>,
    liveness: Option<Box<dyn LivenessOracle>>,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the oracles. Fails if the session is already initialized.
    pub fn initialize(
        &mut self,
        defuse: Box<dyn DefUseOracle>,
        liveness: Box<dyn LivenessOracle>,
    ) -> Result<(), SessionError> {
        if self.is_initialized() {
            return Err(SessionError::new(
                SessionErrorKind::AlreadyInitialized,
                "analysis session is already initialized; release it first",
            ));
        }
        debug!("analysis session initialized");
        self.defuse = Some(defuse);
        self.liveness = Some(liveness);
        Ok(())
    }

    /// Drop the oracles.
    pub fn release(&mut self) {
        if self.is_initialized() {
            debug!("analysis session released");
        }
        self.defuse = None;
        self.liveness = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.defuse.is_some() && self.liveness.is_some()
    }

    pub fn defuse(&self) -> Result<&dyn DefUseOracle, SessionError> {
        self.defuse.as_deref().ok_or_else(not_initialized)
    }

    pub fn liveness(&self) -> Result<&dyn LivenessOracle, SessionError> {
        self.liveness.as_deref().ok_or_else(not_initialized)
    }
}

fn not_initialized() -> SessionError {
    SessionError::new(
        SessionErrorKind::NotInitialized,
        "analysis session used before initialize",
    )
}
