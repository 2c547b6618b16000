//! Alias cutover from the source collection to the target.
//!
//! The switch is two independent store calls: attach to the target, then
//! detach from the source. Between them a reader can see the alias on both
//! collections (or on neither, if the second call of an earlier attempt
//! went through and the first did not). Each step checks membership before
//! acting, so re-running a partially applied switch converges to "alias only
//! on target".

use tracing::{info, warn};

use crate::config::MigrationSpec;
use crate::error::{Error, Result};
use crate::store::DocumentStore;

/// What a switch actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AliasSwitch {
    /// The alias was attached to the target by this call.
    pub attached: bool,
    /// The alias was detached from the source by this call.
    pub detached: bool,
}

impl AliasSwitch {
    /// Whether the call was a no-op.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.attached && !self.detached
    }
}

/// Moves aliases from `spec.source` to `spec.target`.
pub struct AliasSwitcher<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> AliasSwitcher<'a> {
    /// Creates a switcher operating on the store holding both collections.
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Points `alias` at the target collection only.
    ///
    /// # Errors
    ///
    /// Returns the store error of the failing step; the steps already applied
    /// stay applied. An unacknowledged attach stops before the detach and
    /// returns [`Error::AliasNotAcknowledged`].
    pub async fn switch(&self, alias: &str, spec: &MigrationSpec) -> Result<AliasSwitch> {
        if alias.trim().is_empty() {
            return Err(Error::Config("alias name cannot be empty".to_string()));
        }
        let source = spec.source.collection.as_str();
        let target = spec.target.collection.as_str();
        let mut outcome = AliasSwitch::default();

        let holders = self.store.alias_holders(alias).await?;
        if !holders.contains(target) {
            if !self.store.add_alias(alias, target).await? {
                return Err(not_acknowledged("attach", alias, target));
            }
            outcome.attached = true;
            info!(alias, collection = target, "Alias attached");
        }

        if source != target {
            let holders = self.store.alias_holders(alias).await?;
            if holders.contains(source) {
                if !self.store.remove_alias(alias, source).await? {
                    return Err(not_acknowledged("detach", alias, source));
                }
                outcome.detached = true;
                info!(alias, collection = source, "Alias detached");
            }
        }

        Ok(outcome)
    }

    /// Switches every alias in `aliases`, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first failing switch's error.
    pub async fn switch_all(
        &self,
        aliases: &[String],
        spec: &MigrationSpec,
    ) -> Result<Vec<(String, AliasSwitch)>> {
        let mut outcomes = Vec::with_capacity(aliases.len());
        for alias in aliases {
            match self.switch(alias, spec).await {
                Ok(outcome) => outcomes.push((alias.clone(), outcome)),
                Err(e) => {
                    warn!(alias = %alias, "Alias switch failed: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(outcomes)
    }
}

fn not_acknowledged(step: &str, alias: &str, collection: &str) -> Error {
    Error::AliasNotAcknowledged(format!(
        "{} '{}' on '{}' was not acknowledged",
        step, alias, collection
    ))
}
