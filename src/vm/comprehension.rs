//! Comprehension and generator evaluation.
//!
//! Clause sources arrive on the stack, already evaluated. Iteration is a
//! recursive walk over the clauses, leftmost outermost; the element, value
//! and filter regions run as nested frames whose locals are the loop
//! bindings and whose captured scope is a snapshot of the surrounding code.

use std::rc::Rc;

use crate::ast::ComprehensionKind;
use crate::error::RuntimeError;

use super::chunk::{Chunk, ComprehensionProto};
use super::env::{bind, Bindings, CapturedEnv};
use super::value::{Function, Value, ValueMap, ValueSet};
use super::vm::Vm;

/// Accumulates results for one comprehension kind.
enum Collector {
    List(Vec<Value>),
    Set(ValueSet),
    Mapping(ValueMap),
    Generator(Vec<Value>),
}

impl Collector {
    fn new(kind: ComprehensionKind) -> Self {
        match kind {
            ComprehensionKind::List => Collector::List(Vec::new()),
            ComprehensionKind::Set => Collector::Set(ValueSet::default()),
            ComprehensionKind::Mapping => Collector::Mapping(ValueMap::default()),
            ComprehensionKind::Generator => Collector::Generator(Vec::new()),
        }
    }

    fn push(&mut self, element: Value) -> Result<(), RuntimeError> {
        match self {
            Collector::List(items) | Collector::Generator(items) => items.push(element),
            Collector::Set(set) => {
                set.insert(element.to_hash_key()?);
            }
            Collector::Mapping(_) => {
                return Err(RuntimeError::new("Mapping comprehension without a value"));
            }
        }
        Ok(())
    }

    fn insert(&mut self, key: Value, value: Value) -> Result<(), RuntimeError> {
        match self {
            Collector::Mapping(map) => {
                map.insert(key.to_hash_key()?, value);
                Ok(())
            }
            _ => self.push(key),
        }
    }

    fn finish(self) -> Value {
        match self {
            Collector::List(items) => Value::list(items),
            Collector::Set(set) => Value::Set(Rc::new(set)),
            Collector::Mapping(map) => Value::Mapping(Rc::new(map)),
            Collector::Generator(items) => Value::Generator(Rc::new(items)),
        }
    }
}

/// What every region evaluation of one comprehension shares.
struct Regions<'a> {
    proto: &'a ComprehensionProto,
    chunk: Rc<Chunk>,
    scope: Rc<CapturedEnv>,
    function: Option<Rc<Function>>,
}

impl Vm {
    /// Execute `COMPREHENSION idx`: pop the clause sources and build the
    /// resulting collection.
    pub(super) fn run_comprehension(&mut self, idx: u16) -> Result<Value, RuntimeError> {
        let chunk = self.chunk.clone();
        let proto = chunk
            .comprehensions
            .get(idx as usize)
            .ok_or_else(|| RuntimeError::new(format!("Bad comprehension index {}", idx)))?;

        // Each source is materialized once, before any binding.
        let sources = self
            .pop_n(proto.variables.len())?
            .iter()
            .map(Value::iter_values)
            .collect::<Result<Vec<_>, _>>()?;

        let regions = Regions {
            proto,
            chunk: chunk.clone(),
            scope: self.capture_scope(),
            function: self.frames.last().and_then(|frame| frame.function.clone()),
        };
        let mut collector = Collector::new(proto.kind);
        let mut bindings = Rc::new(Bindings::new());
        self.comprehension_level(&regions, &sources, 0, &mut bindings, &mut collector)?;
        Ok(collector.finish())
    }

    fn comprehension_level(
        &mut self,
        regions: &Regions<'_>,
        sources: &[Vec<Value>],
        level: usize,
        bindings: &mut Rc<Bindings>,
        out: &mut Collector,
    ) -> Result<(), RuntimeError> {
        let Some(items) = sources.get(level) else {
            return self.emit_element(regions, bindings, out);
        };
        let variable = &regions.proto.variables[level];
        for item in items {
            bind(bindings, variable, item.clone());
            self.comprehension_level(regions, sources, level + 1, bindings, out)?;
        }
        Ok(())
    }

    fn emit_element(
        &mut self,
        regions: &Regions<'_>,
        bindings: &Rc<Bindings>,
        out: &mut Collector,
    ) -> Result<(), RuntimeError> {
        if let Some(filter) = regions.proto.filter {
            if !self.run_region(regions, filter, bindings)?.is_truthy() {
                return Ok(());
            }
        }
        let element = self.run_region(regions, regions.proto.element, bindings)?;
        match regions.proto.value {
            Some(value_start) => {
                let value = self.run_region(regions, value_start, bindings)?;
                out.insert(element, value)
            }
            None => out.push(element),
        }
    }

    fn run_region(
        &mut self,
        regions: &Regions<'_>,
        start: usize,
        bindings: &Rc<Bindings>,
    ) -> Result<Value, RuntimeError> {
        self.eval_region(
            &regions.chunk,
            start,
            bindings.clone(),
            &regions.scope,
            regions.function.clone(),
        )
    }
}
