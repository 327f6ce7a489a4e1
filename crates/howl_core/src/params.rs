//! Parameter Store
//!
//! A typed view over one instance's parameter tables. Reads and writes are
//! addressed by `IntParam` / `FloatParam`; writes can be clamped to a range
//! the caller declares, and structural slots refuse writes once the instance
//! has been prepared.

use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};
use howl_dsp::{FloatParam, IntParam, ParamTables};

/// Any addressable scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamSlot {
    Int(IntParam),
    Float(FloatParam),
}

impl ParamSlot {
    pub const fn label(self) -> &'static str {
        match self {
            ParamSlot::Int(p) => p.label(),
            ParamSlot::Float(p) => p.label(),
        }
    }
}

/// Inclusive bounds for a mutation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    /// The closed unit interval
    pub const UNIT: ParamRange = ParamRange { min: 0.0, max: 1.0 };

    /// Range between `a` and `b`, in either order
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// `min(max(value, lo), hi)`; NaN lands on the lower bound
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Mutable, bounds-aware accessor over an instance's tables
pub struct ParameterStore<'a> {
    tables: &'a mut ParamTables,
    prepared: bool,
}

impl<'a> ParameterStore<'a> {
    /// `prepared` locks the structural slots
    pub fn new(tables: &'a mut ParamTables, prepared: bool) -> Self {
        Self { tables, prepared }
    }

    #[inline]
    pub fn int(&self, param: IntParam) -> i32 {
        self.tables.int(param)
    }

    #[inline]
    pub fn float(&self, param: FloatParam) -> f64 {
        self.tables.float(param)
    }

    /// Read any slot as `f64`
    pub fn get(&self, slot: ParamSlot) -> f64 {
        match slot {
            ParamSlot::Int(p) => f64::from(self.int(p)),
            ParamSlot::Float(p) => self.float(p),
        }
    }

    /// Unchecked write; returns the stored value
    pub fn set_float(&mut self, param: FloatParam, value: f64) -> f64 {
        self.tables.set_float(param, value)
    }

    /// Write `value` clamped to `range`; returns the stored value
    pub fn set_float_within(&mut self, param: FloatParam, value: f64, range: ParamRange) -> f64 {
        self.tables.set_float(param, range.clamp(value))
    }

    /// Write an integer slot. Structural slots are refused after prepare.
    pub fn set_int(&mut self, param: IntParam, value: i32) -> HostResult<i32> {
        if self.prepared && param.is_structural() {
            return Err(HostError::StructuralParameterLocked(param));
        }
        Ok(self.tables.set_int(param, value))
    }

    /// Write any slot, optionally clamped. Integer slots round to nearest.
    pub fn set(
        &mut self,
        slot: ParamSlot,
        value: f64,
        range: Option<ParamRange>,
    ) -> HostResult<f64> {
        let value = match range {
            Some(range) => range.clamp(value),
            None => value,
        };
        match slot {
            ParamSlot::Int(p) => self.set_int(p, value.round() as i32).map(f64::from),
            ParamSlot::Float(p) => Ok(self.set_float(p, value)),
        }
    }

    /// Ask the engine to restart its adaptive recursion on the next chunk
    pub fn request_reinit(&mut self) {
        self.tables.set_int(IntParam::Reinit, 0);
    }

    pub fn reinit_pending(&self) -> bool {
        self.tables.reinit_pending()
    }
}
