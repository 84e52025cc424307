//! Converter pipeline.
//!
//! A [`ConverterSpec`] bridges the wire-native value the codec produces and
//! consumes, and the application value a field actually stores. Each spec is
//! a pure function pair: `to_wire` applied on encode, `from_wire` applied on
//! decode, with to-wire composition the exact inverse of from-wire
//! composition applied in reverse order.
//!
//! The builder-behaviour flag distinguishes strict construction (a failed
//! conversion aborts the whole decode) from nullable construction (a failed
//! conversion substitutes the field's default rule instead).

use crate::error::ConvertError;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A pure conversion step
pub type ConvertFn = dyn Fn(Value) -> Result<Value, ConvertError> + Send + Sync;

/// How a converter behaves when the wire value cannot be converted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuilderBehavior {
    /// Fail the whole encode/decode call
    #[default]
    Strict,
    /// Substitute the field's default-value rule instead of failing
    Nullable,
}

/// An ordered pair of pure to-wire/from-wire functions
#[derive(Clone)]
pub struct ConverterSpec {
    name: String,
    to_wire: Arc<ConvertFn>,
    from_wire: Arc<ConvertFn>,
    behavior: BuilderBehavior,
}

impl ConverterSpec {
    /// Creates a strict converter from a function pair
    pub fn new(
        name: impl Into<String>,
        to_wire: impl Fn(Value) -> Result<Value, ConvertError> + Send + Sync + 'static,
        from_wire: impl Fn(Value) -> Result<Value, ConvertError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            to_wire: Arc::new(to_wire),
            from_wire: Arc::new(from_wire),
            behavior: BuilderBehavior::Strict,
        }
    }

    /// Sets the builder behaviour
    pub fn with_behavior(mut self, behavior: BuilderBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// The converter's registered name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The builder behaviour on conversion failure
    pub fn behavior(&self) -> BuilderBehavior {
        self.behavior
    }

    /// Applies the application → wire direction
    pub fn apply_to_wire(&self, value: Value) -> Result<Value, ConvertError> {
        (self.to_wire)(value)
    }

    /// Applies the wire → application direction
    pub fn apply_from_wire(&self, value: Value) -> Result<Value, ConvertError> {
        (self.from_wire)(value)
    }

    /// The implicit unwrap/rewrap step recorded when the resolver peels a
    /// single-slot wrapper.
    ///
    /// In the dynamic value model both directions are the identity on
    /// present values; the wrapper's observable effect is that `Value::None`
    /// is legal and means "absent". Nullable, so an absent inner value never
    /// aborts a decode.
    pub fn single_slot() -> Self {
        Self::new("single-slot", Ok, Ok).with_behavior(BuilderBehavior::Nullable)
    }
}

impl fmt::Debug for ConverterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterSpec")
            .field("name", &self.name)
            .field("behavior", &self.behavior)
            .finish_non_exhaustive()
    }
}

/// Named converter lookup supplied by the caller.
///
/// Field declarations reference converters by name; a name with no
/// registered spec is an `UnresolvedConverter` diagnostic at resolution
/// time, never a runtime surprise.
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    by_name: HashMap<String, ConverterSpec>,
}

impl ConverterRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a converter under its own name, replacing any previous one
    pub fn register(&mut self, spec: ConverterSpec) {
        self.by_name.insert(spec.name().to_string(), spec);
    }

    /// Registers a converter, builder style
    pub fn with(mut self, spec: ConverterSpec) -> Self {
        self.register(spec);
        self
    }

    /// Looks up a converter by name
    pub fn get(&self, name: &str) -> Option<&ConverterSpec> {
        self.by_name.get(name)
    }

    /// Number of registered converters
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if no converters are registered
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling() -> ConverterSpec {
        ConverterSpec::new(
            "double",
            |v| match v {
                Value::U64(n) => Ok(Value::U64(n * 2)),
                other => Err(ConvertError::new("double", other.kind_name())),
            },
            |v| match v {
                Value::U64(n) => Ok(Value::U64(n / 2)),
                other => Err(ConvertError::new("double", other.kind_name())),
            },
        )
    }

    #[test]
    fn test_directions_are_inverse() {
        let spec = doubling();
        let wire = spec.apply_to_wire(Value::U64(21)).unwrap();
        assert_eq!(wire, Value::U64(42));
        assert_eq!(spec.apply_from_wire(wire).unwrap(), Value::U64(21));
    }

    #[test]
    fn test_strict_failure_surfaces() {
        let spec = doubling();
        let err = spec.apply_to_wire(Value::Bool(true)).unwrap_err();
        assert_eq!(err.converter, "double");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ConverterRegistry::new().with(doubling());
        assert!(registry.get("double").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_single_slot_is_identity() {
        let spec = ConverterSpec::single_slot();
        assert_eq!(spec.behavior(), BuilderBehavior::Nullable);
        assert_eq!(spec.apply_to_wire(Value::I32(5)).unwrap(), Value::I32(5));
        assert_eq!(spec.apply_from_wire(Value::None).unwrap(), Value::None);
    }
}
