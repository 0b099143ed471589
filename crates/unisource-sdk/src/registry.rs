//! Header registry
//!
//! Tracks which architectures produced a tagged variant of each header so
//! umbrella headers can be synthesized once every platform pass is done.
//! Only the merge engine records into it; the umbrella synthesizer consumes
//! the final [`RegistrySnapshot`].

use std::collections::{BTreeMap, BTreeSet};

use crate::types::Arch;

/// Append-only multimap from header file name to the archs that produced it.
#[derive(Debug, Default)]
pub struct HeaderRegistry {
    headers: BTreeMap<String, BTreeSet<Arch>>,
}

impl HeaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `arch` produced a tagged variant of `basename`.
    ///
    /// Returns `true` if the arch was not yet recorded for that header.
    pub(crate) fn record(&mut self, basename: &str, arch: Arch) -> bool {
        self.headers
            .entry(basename.to_string())
            .or_default()
            .insert(arch)
    }

    /// Architectures recorded for `basename`, if any.
    pub fn archs(&self, basename: &str) -> Option<&BTreeSet<Arch>> {
        self.headers.get(basename)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Freezes the registry. Consuming `self` means no header can be
    /// recorded after umbrella synthesis has started.
    pub fn snapshot(self) -> RegistrySnapshot {
        RegistrySnapshot {
            headers: self.headers,
        }
    }
}

/// Immutable view of the registry once all platform passes have completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    headers: BTreeMap<String, BTreeSet<Arch>>,
}

impl RegistrySnapshot {
    /// Iterates `(basename, archs)` pairs in basename order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<Arch>)> {
        self.headers.iter().map(|(name, archs)| (name.as_str(), archs))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
