//! Umbrella header synthesis
//!
//! After every platform pass, each header with per-architecture variants gets
//! an umbrella under its original name which includes all of them. Each
//! variant carries its own `#ifdef` guard, so at most one of them is active in
//! any compilation and the include order does not matter.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::merge::OutputName;
use crate::registry::RegistrySnapshot;
use crate::types::{Arch, UniError};

/// An umbrella header to be written under the original header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UmbrellaHeader {
    pub name: String,
    pub archs: BTreeSet<Arch>,
}

impl UmbrellaHeader {
    /// One `#include` directive per variant, in arch order.
    pub fn render(&self) -> String {
        let name = OutputName::new(&self.name);
        self.archs
            .iter()
            .map(|arch| format!("#include <{}>\n", name.tagged(Some(*arch))))
            .collect()
    }
}

/// What synthesis will do with a registry snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UmbrellaPlan {
    /// One entry per registered basename, in name order
    pub umbrellas: Vec<UmbrellaHeader>,
}

/// Plans one umbrella for every basename in the snapshot.
///
/// A basename tagged by a single arch still gets one, otherwise
/// `#include <name.h>` would not reach its only variant.
pub fn plan(snapshot: &RegistrySnapshot) -> UmbrellaPlan {
    UmbrellaPlan {
        umbrellas: snapshot
            .iter()
            .map(|(name, archs)| UmbrellaHeader {
                name: name.to_string(),
                archs: archs.clone(),
            })
            .collect(),
    }
}

/// Writes an umbrella header into `includes_dir` for every header in
/// `snapshot`, returning the plan that was carried out.
///
/// An umbrella replaces a common header of the same name.
pub fn synthesize(snapshot: RegistrySnapshot, includes_dir: &Path) -> Result<UmbrellaPlan, UniError> {
    let plan = plan(&snapshot);
    fs::create_dir_all(includes_dir).map_err(|e| UniError::io(includes_dir, e))?;

    for header in &plan.umbrellas {
        let path: PathBuf = includes_dir.join(&header.name);
        if path.is_file() {
            tracing::debug!(header = %header.name, "umbrella replaces common header");
        }
        fs::write(&path, header.render()).map_err(|e| UniError::io(&path, e))?;
        tracing::debug!(header = %header.name, variants = header.archs.len(), "wrote umbrella header");
    }

    Ok(plan)
}
