use std::collections::BTreeMap;

use crate::model::{EnvMap, LoadReport};
use crate::variables::{EnvView, ProcessEnv};

/// Where loaded variables go, and what interpolation sees as the ambient
/// environment while they are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Writes call [`std::env::set_var`].
    Process,
    Memory(BTreeMap<String, String>),
}

impl Default for TargetEnv {
    fn default() -> Self {
        Self::memory()
    }
}

impl TargetEnv {
    /// Target the live process environment.
    ///
    /// # Safety
    ///
    /// Applying values to this target mutates global process state. No other
    /// thread may read or write the environment while that happens.
    pub unsafe fn process() -> Self {
        Self {
            kind: Kind::Process,
        }
    }

    /// An empty map that never touches the process environment.
    pub fn memory() -> Self {
        Self::from_memory(BTreeMap::new())
    }

    pub fn from_memory(map: BTreeMap<String, String>) -> Self {
        Self {
            kind: Kind::Memory(map),
        }
    }

    /// In-memory copy of the current process environment. Non-UTF-8 names
    /// and values are converted lossily.
    pub fn snapshot_process() -> Self {
        let map = std::env::vars_os()
            .map(|(name, value)| {
                (
                    name.to_string_lossy().into_owned(),
                    value.to_string_lossy().into_owned(),
                )
            })
            .collect();
        Self::from_memory(map)
    }

    pub fn is_process(&self) -> bool {
        matches!(self.kind, Kind::Process)
    }

    pub fn as_memory(&self) -> Option<&BTreeMap<String, String>> {
        match &self.kind {
            Kind::Memory(map) => Some(map),
            Kind::Process => None,
        }
    }

    pub fn into_memory(self) -> Option<BTreeMap<String, String>> {
        match self.kind {
            Kind::Memory(map) => Some(map),
            Kind::Process => None,
        }
    }

    /// Write `values` in order. Names already present are left alone unless
    /// `override_existing` is set.
    pub(crate) fn apply(&mut self, values: EnvMap, override_existing: bool) -> LoadReport {
        let mut report = LoadReport::default();
        for (name, value) in values {
            if !override_existing && self.lookup(&name).is_some() {
                tracing::debug!(key = %name, "skipping existing key");
                report.skipped_existing += 1;
                continue;
            }
            self.set(&name, &value);
            report.loaded += 1;
        }
        report
    }

    fn set(&mut self, name: &str, value: &str) {
        match &mut self.kind {
            // SAFETY: whoever built a process target through `process()`
            // promised exclusive access to the environment.
            Kind::Process => unsafe { std::env::set_var(name, value) },
            Kind::Memory(map) => {
                map.insert(name.to_owned(), value.to_owned());
            }
        }
    }
}

impl EnvView for TargetEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        match &self.kind {
            Kind::Process => ProcessEnv.lookup(name),
            Kind::Memory(map) => map.get(name).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_skips_existing_names_without_override() {
        let mut target = TargetEnv::from_memory([("A".to_owned(), "old".to_owned())].into());
        let values: EnvMap = [("A", "new"), ("B", "1")].into_iter().collect();

        let report = target.apply(values.clone(), false);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(target.lookup("A").as_deref(), Some("old"));

        let report = target.apply(values, true);
        assert_eq!(report.loaded, 2);
        assert_eq!(target.lookup("A").as_deref(), Some("new"));
        assert!(!target.is_process());
    }

    #[test]
    fn process_target_has_no_memory_map() {
        // SAFETY: nothing is applied to this target.
        let target = unsafe { TargetEnv::process() };
        assert!(target.is_process());
        assert_eq!(target.into_memory(), None);
    }

    #[test]
    fn snapshot_is_detached_from_process() {
        let target = TargetEnv::snapshot_process();
        assert!(target.as_memory().is_some());
        assert_eq!(target.lookup("DOTENVKIT_SURELY_UNSET_NAME"), None);
        let map = target.into_memory().expect("memory target");
        assert!(!map.contains_key("DOTENVKIT_SURELY_UNSET_NAME"));
    }
}
