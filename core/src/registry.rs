//! Module registry and canonical ordering (spec.md §4.5, C5).
//!
//! Process-scoped: built once per process and read-only afterward (spec.md
//! §9 "process-wide state -> pipeline-scoped state" keeps only the
//! *mutable* engine state per pipeline; the catalog and the canonical order
//! stay process-scoped, same as the source's `darktable.iop` list).

use crate::module::IopModule;
use crate::modules;
use std::collections::HashMap;

/// A compiled-in module kind: its canonical position in the chain plus a
/// factory for building fresh instances.
struct CatalogEntry {
    op_name: &'static str,
    iop_order: f32,
    factory: fn() -> Box<dyn IopModule>,
}

/// Full catalog of compiled-in modules, in canonical "v5.0 iop-order" order.
/// Modules absent from this list sort to positive infinity and are skipped
/// at pipeline construction (spec.md §4.5).
pub struct ModuleRegistry {
    entries: Vec<CatalogEntry>,
    by_name: HashMap<&'static str, usize>,
}

/// Names enabled by default on a freshly created pipeline (spec.md §6). The
/// source matches these with `strncmp(op, entry, 20)`; this port resolves
/// spec.md §9 Open Questions #1 by using full string equality instead.
pub const DEFAULT_ENABLED: &[&str] = &["rawprepare", "demosaic", "colorin", "exposure", "colorout"];

impl ModuleRegistry {
    /// Builds the process-scoped catalog of every compiled-in module.
    pub fn builtin() -> Self {
        let mut reg = ModuleRegistry {
            entries: Vec::new(),
            by_name: HashMap::new(),
        };
        reg.add(10.0, || Box::new(modules::rawprepare::RawPrepare));
        reg.add(20.0, || Box::new(modules::temperature::Temperature));
        reg.add(30.0, || Box::new(modules::demosaic::Demosaic));
        reg.add(40.0, || Box::new(modules::colorin::ColorIn));
        reg.add(50.0, || Box::new(modules::colorcalib::ColorCalib));
        reg.add(60.0, || Box::new(modules::exposure::Exposure));
        reg.add(65.0, || Box::new(modules::crop::Crop));
        reg.add(67.0, || Box::new(modules::clipping::Clipping));
        reg.add(70.0, || Box::new(modules::channelmixerrgb::ChannelMixerRgb));
        reg.add(80.0, || Box::new(modules::colorbalancergb::ColorBalanceRgb));
        reg.add(90.0, || Box::new(modules::levels::Levels));
        reg.add(100.0, || Box::new(modules::rgbcurve::RgbCurve));
        reg.add(110.0, || Box::new(modules::filmic::Filmic));
        reg.add(120.0, || Box::new(modules::vignette::Vignette));
        reg.add(130.0, || Box::new(modules::colorout::ColorOut));
        reg
    }

    fn add(&mut self, iop_order: f32, factory: fn() -> Box<dyn IopModule>) {
        let probe = factory();
        let op_name = probe.meta().op_name;
        let index = self.entries.len();
        self.entries.push(CatalogEntry {
            op_name,
            iop_order,
            factory,
        });
        self.by_name.insert(op_name, index);
    }

    /// Number of compiled-in modules (spec.md §6 `module_count`).
    pub fn module_count(&self) -> usize {
        self.entries.len()
    }

    /// Name of the `index`-th compiled-in module, in catalog (canonical
    /// iop-order) order (spec.md §6 `module_name`).
    pub fn module_name(&self, index: usize) -> Option<&'static str> {
        self.entries.get(index).map(|e| e.op_name)
    }

    /// Every compiled-in module in canonical iop-order, ties broken by
    /// catalog insertion order (spec.md §4.5).
    pub fn canonical_order(&self) -> impl Iterator<Item = (&'static str, f32, fn() -> Box<dyn IopModule>)> + '_ {
        self.entries
            .iter()
            .map(|e| (e.op_name, e.iop_order, e.factory))
    }

    pub fn iop_order(&self, op_name: &str) -> Option<f32> {
        self.by_name.get(op_name).map(|&i| self.entries[i].iop_order)
    }

    pub fn contains(&self, op_name: &str) -> bool {
        self.by_name.contains_key(op_name)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_strictly_ordered() {
        let reg = ModuleRegistry::builtin();
        let mut last = f32::NEG_INFINITY;
        for (_, order, _) in reg.canonical_order() {
            assert!(order >= last);
            last = order;
        }
    }

    #[test]
    fn default_enabled_names_are_all_present() {
        let reg = ModuleRegistry::builtin();
        for name in DEFAULT_ENABLED {
            assert!(reg.contains(name), "missing default-enabled module {name}");
        }
    }

    #[test]
    fn module_name_enumeration_matches_count() {
        let reg = ModuleRegistry::builtin();
        for i in 0..reg.module_count() {
            assert!(reg.module_name(i).is_some());
        }
        assert!(reg.module_name(reg.module_count()).is_none());
    }
}
