//! Last-known change indicator and the artifact produced for it

use crate::conditional::ChangeIndicator;
use crate::sink::Artifact;

/// Indicator and artifact from the last fully successful run.
///
/// Both halves are replaced together by [`ValidatorStore::commit`], so a
/// reader never sees a new indicator paired with an old artifact.
#[derive(Debug, Clone)]
struct Committed {
    indicator: ChangeIndicator,
    artifact: Artifact,
}

/// Single mutable slot holding the feed's last committed state.
///
/// Mutation needs `&mut self`: one writer at a time. Callers sharing a store
/// across threads wrap it in a lock themselves.
#[derive(Debug, Default)]
pub struct ValidatorStore {
    current: Option<Committed>,
}

impl ValidatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indicator(&self) -> Option<&ChangeIndicator> {
        self.current.as_ref().map(|c| &c.indicator)
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.current.as_ref().map(|c| &c.artifact)
    }

    /// Indicator and artifact as the pair they were committed as
    pub fn committed(&self) -> Option<(&ChangeIndicator, &Artifact)> {
        self.current.as_ref().map(|c| (&c.indicator, &c.artifact))
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Record a fully produced artifact and the indicator it was built from
    pub fn commit(&mut self, indicator: ChangeIndicator, artifact: Artifact) {
        log::debug!("Committing {indicator} -> {artifact}");
        self.current = Some(Committed {
            indicator,
            artifact,
        });
    }

    /// Forget the stored state so the next probe counts as changed
    pub fn invalidate(&mut self) {
        if self.current.take().is_some() {
            log::debug!("Validator store invalidated");
        }
    }
}
