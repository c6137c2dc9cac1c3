//! Cached, invalidatable analyses over a module.
//!
//! An [`AnalysisManager`] is a per-module registry. *Default* analyses carry
//! a compile-time [`AnalysisKind`] tag and live in a fixed-size slot table;
//! *additional* analyses are registered at runtime and keyed by their type
//! identity. Each analysis has a validity bit: `get` hands back the cached
//! result, recomputing it first if the bit is clear, and `invalidate` clears
//! the bit. There is no automatic dependency cascade — a pass that dirties
//! something is responsible for invalidating whatever depends on it, and
//! conservatively invalidating everything is always legal.

use crate::module::{FuncId, Module};
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::fmt;

/// The compile-time tag of a default analysis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    /// [`CfgAnalysis`](crate::cfg::CfgAnalysis).
    CfgEdges = 0,
}

/// How many default-analysis slots the manager reserves. Far more than
/// currently exist, so adding one never changes the layout.
pub const NUM_DEFAULT_ANALYSES: usize = 16;

/// An analysis over a whole module.
///
/// `run` recomputes the analysis from scratch; incremental update is not
/// part of the contract. An analysis may consult *other* analyses through
/// the manager it is handed, but must not recursively request itself.
pub trait AnalysisPass: Any + fmt::Debug {
    /// Recomputes this analysis for `module`.
    fn run(&mut self, module: &Module, manager: &mut AnalysisManager<'_>);

    /// This analysis as [`Any`], for downcasting out of the registry.
    fn as_any(&self) -> &dyn Any;
}

/// A default analysis: one with a reserved [`AnalysisKind`] slot, creatable
/// on demand.
pub trait DefaultAnalysis: AnalysisPass + Default {
    /// The slot this analysis lives in.
    const KIND: AnalysisKind;
}

/// An analysis that runs function-by-function.
///
/// Implementors get a whole-module driver for free, suitable for
/// implementing [`AnalysisPass::run`].
pub trait FunctionAnalysis {
    /// Recomputes this analysis for a single function.
    fn run_on_function(&mut self, module: &Module, func: FuncId, manager: &mut AnalysisManager<'_>);

    /// Runs [`run_on_function`](Self::run_on_function) over every function
    /// in the module, in insertion order.
    fn run_on_module(&mut self, module: &Module, manager: &mut AnalysisManager<'_>) {
        for (func, _) in module.funcs() {
            self.run_on_function(module, func, manager);
        }
    }
}

/// The per-module analysis registry and cache.
#[derive(Debug)]
pub struct AnalysisManager<'m> {
    module: &'m Module,
    slots: [Option<Box<dyn AnalysisPass>>; NUM_DEFAULT_ANALYSES],
    slot_valid: [bool; NUM_DEFAULT_ANALYSES],
    additional: FxHashMap<TypeId, Box<dyn AnalysisPass>>,
    additional_valid: FxHashMap<TypeId, bool>,
}

impl<'m> AnalysisManager<'m> {
    /// Creates a manager for `module` with every analysis invalid.
    pub fn new(module: &'m Module) -> Self {
        AnalysisManager {
            module,
            slots: std::array::from_fn(|_| None),
            slot_valid: [false; NUM_DEFAULT_ANALYSES],
            additional: FxHashMap::default(),
            additional_valid: FxHashMap::default(),
        }
    }

    /// The module this manager serves.
    #[inline]
    pub fn module(&self) -> &'m Module {
        self.module
    }

    /// The cached result of a default analysis, recomputing it first if it
    /// is invalid.
    pub fn get<A: DefaultAnalysis>(&mut self) -> &A {
        let slot = A::KIND as usize;

        if !self.slot_valid[slot] {
            let mut pass = self.slots[slot]
                .take()
                .unwrap_or_else(|| Box::new(A::default()) as Box<dyn AnalysisPass>);

            log::debug!("recomputing analysis {:?}", A::KIND);

            let module = self.module;
            pass.run(module, self);

            self.slots[slot] = Some(pass);
            self.slot_valid[slot] = true;
        }

        self.slots[slot]
            .as_ref()
            .expect("analyses must not recursively request themselves")
            .as_any()
            .downcast_ref::<A>()
            .expect("analysis slot holds a different analysis type")
    }

    /// Marks a default analysis invalid; the next `get` recomputes it.
    pub fn invalidate<A: DefaultAnalysis>(&mut self) {
        self.slot_valid[A::KIND as usize] = false;
    }

    /// Registers an additional analysis, initially invalid.
    pub fn register<A: AnalysisPass>(&mut self, analysis: A) {
        let key = TypeId::of::<A>();
        self.additional.insert(key, Box::new(analysis));
        self.additional_valid.insert(key, false);
    }

    /// The cached result of a registered additional analysis, recomputing it
    /// first if it is invalid.
    ///
    /// # Panics
    ///
    /// Panics if `A` was never [`register`](Self::register)ed.
    pub fn get_registered<A: AnalysisPass>(&mut self) -> &A {
        let key = TypeId::of::<A>();

        assert!(
            self.additional.contains_key(&key),
            "the analysis must be registered beforehand"
        );

        if !self.additional_valid[&key] {
            let mut pass = self
                .additional
                .remove(&key)
                .expect("analyses must not recursively request themselves");

            log::debug!("recomputing additional analysis {}", std::any::type_name::<A>());

            let module = self.module;
            pass.run(module, self);

            self.additional.insert(key, pass);
            self.additional_valid.insert(key, true);
        }

        self.additional[&key]
            .as_any()
            .downcast_ref::<A>()
            .expect("additional analysis registered under a different type id")
    }

    /// Marks a registered additional analysis invalid.
    ///
    /// # Panics
    ///
    /// Panics if `A` was never registered.
    pub fn invalidate_registered<A: AnalysisPass>(&mut self) {
        let key = TypeId::of::<A>();

        assert!(
            self.additional.contains_key(&key),
            "the analysis must be registered beforehand"
        );

        self.additional_valid.insert(key, false);
    }

    /// Conservatively marks every analysis invalid.
    pub fn invalidate_all(&mut self) {
        self.slot_valid = [false; NUM_DEFAULT_ANALYSES];

        for valid in self.additional_valid.values_mut() {
            *valid = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct CountingAnalysis {
        runs: Rc<Cell<usize>>,
        func_count: usize,
    }

    impl AnalysisPass for CountingAnalysis {
        fn run(&mut self, module: &Module, _manager: &mut AnalysisManager<'_>) {
            self.runs.set(self.runs.get() + 1);
            self.func_count = module.funcs().count();
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn additional_analyses_cache_until_invalidated() {
        let mut module = Module::new();
        let void = module.void_ty();
        module.create_func("a", void, &[]);
        module.create_func("b", void, &[]);

        let runs = Rc::new(Cell::new(0));
        let mut manager = AnalysisManager::new(&module);
        manager.register(CountingAnalysis {
            runs: runs.clone(),
            func_count: 0,
        });

        assert_eq!(runs.get(), 0);

        let result = manager.get_registered::<CountingAnalysis>();
        assert_eq!(result.func_count, 2);
        assert_eq!(runs.get(), 1);

        // cached: no recompute
        let _ = manager.get_registered::<CountingAnalysis>();
        assert_eq!(runs.get(), 1);

        manager.invalidate_registered::<CountingAnalysis>();
        let _ = manager.get_registered::<CountingAnalysis>();
        assert_eq!(runs.get(), 2);

        manager.invalidate_all();
        let _ = manager.get_registered::<CountingAnalysis>();
        assert_eq!(runs.get(), 3);
    }

    #[test]
    #[should_panic(expected = "must be registered beforehand")]
    fn unregistered_analysis_panics() {
        let module = Module::new();
        let mut manager = AnalysisManager::new(&module);
        let _ = manager.get_registered::<CountingAnalysis>();
    }
}
