//! The type resolver: declarations → descriptors.
//!
//! Resolution is a pure, synchronous pass that runs once per schema. For
//! each field it peels the declared shape layer by layer, derives exactly
//! one canonical [`PropertyShape`], and attaches a default-value rule. All
//! diagnostics surface here, at schema-build time; a type that fails to
//! resolve never gets a descriptor, and nothing downstream ever re-derives
//! strategy at encode/decode time.
//!
//! ## Resolution precedence
//!
//! Applied top-down, each layer peeling one shape and recursing:
//!
//! 1. `ignored` fields are dropped entirely
//! 2. an explicit converter wraps the inner resolved shape
//! 3. a single-slot wrapper unwraps one layer, recording the implicit
//!    unwrap/rewrap converter step
//! 4. collections resolve as repeated (packed only for numeric scalars)
//! 5. maps resolve key (scalar only) and value independently
//! 6. nominal types resolve through the pool, with a placeholder reserved
//!    before descending so self-referential and mutually recursive types
//!    terminate
//! 7. what remains is a scalar, validated against any declared wire kind

use crate::error::ResolutionError;
use crate::schema::convert::{ConverterRegistry, ConverterSpec};
use crate::schema::descriptor::{
    DescriptorPool, EnumDescriptor, EnumId, FieldDescriptor, MessageDescriptor, MessageId,
};
use crate::schema::shape::{DefaultRule, PropertyShape};
use crate::schema::{FieldDecl, FieldShape, MessageDecl, MessageKind, Schema, TypeRef};
use crate::wire::{WireType, MAX_FIELD_INDEX};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

type Result<T> = std::result::Result<T, ResolutionError>;

/// Most single-slot wrapper layers a declaration may nest before the
/// resolver refuses to guess
const MAX_WRAPPER_DEPTH: usize = 4;

/// Resolves a whole schema into a descriptor pool.
///
/// Convenience wrapper around [`Resolver`].
pub fn resolve(schema: &Schema, converters: &ConverterRegistry) -> Result<DescriptorPool> {
    Resolver::new(schema, converters).resolve()
}

/// The resolution pass.
///
/// Holds the in-progress arena: message slots are reserved (as `None`)
/// before their fields resolve and populated afterwards, which is what lets
/// a group or message reference itself without infinite recursion.
pub struct Resolver<'a> {
    schema: &'a Schema,
    converters: &'a ConverterRegistry,
    slots: Vec<Option<MessageDescriptor>>,
    message_ids: HashMap<String, MessageId>,
    enums: Vec<EnumDescriptor>,
    enum_ids: HashMap<String, EnumId>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over a schema and the caller's converters
    pub fn new(schema: &'a Schema, converters: &'a ConverterRegistry) -> Self {
        Self {
            schema,
            converters,
            slots: Vec::new(),
            message_ids: HashMap::new(),
            enums: Vec::new(),
            enum_ids: HashMap::new(),
        }
    }

    /// Resolves every declared type and returns the finished pool
    pub fn resolve(mut self) -> Result<DescriptorPool> {
        for decl in self.schema.enums() {
            self.resolve_enum(&decl.name)?;
        }
        for decl in self.schema.messages() {
            self.resolve_message_ref(&decl.name, &decl.name)?;
        }
        self.finish()
    }

    /// Resolves just the named message or group type, plus every type it
    /// references, and returns a pool containing that subgraph
    pub fn resolve_message(mut self, name: &str) -> Result<DescriptorPool> {
        self.resolve_message_ref(name, name)?;
        self.finish()
    }

    fn finish(self) -> Result<DescriptorPool> {
        debug!(
            messages = self.slots.len(),
            enums = self.enums.len(),
            "schema resolved"
        );

        let messages = self
            .slots
            .into_iter()
            .map(|slot| slot.expect("every reserved slot is populated before resolution returns"))
            .collect();

        Ok(DescriptorPool::from_parts(
            messages,
            self.enums,
            self.message_ids,
            self.enum_ids,
        ))
    }

    /// Resolves one message or group type, reusing the slot if the type is
    /// already resolved or currently in progress
    fn resolve_message_ref(&mut self, name: &str, referrer: &str) -> Result<MessageId> {
        if let Some(&id) = self.message_ids.get(name) {
            return Ok(id);
        }

        let decl = self
            .schema
            .message(name)
            .ok_or_else(|| ResolutionError::UnknownType {
                name: name.to_string(),
                field: referrer.to_string(),
            })?;

        // Reserve the placeholder before descending so recursive references
        // resolve to this id instead of recursing forever.
        let id = MessageId::new(self.slots.len());
        self.slots.push(None);
        self.message_ids.insert(name.to_string(), id);

        debug!(message = name, ?id, "resolving message");
        let descriptor = self.resolve_fields(decl)?;
        self.slots[id.index()] = Some(descriptor);

        Ok(id)
    }

    fn resolve_enum(&mut self, name: &str) -> Result<EnumId> {
        if let Some(&id) = self.enum_ids.get(name) {
            return Ok(id);
        }
        let decl = self
            .schema
            .enum_decl(name)
            .expect("resolve_enum is only called for declared enums");
        let id = EnumId::new(self.enums.len());
        self.enums
            .push(EnumDescriptor::new(decl.name.clone(), decl.values.clone()));
        self.enum_ids.insert(name.to_string(), id);
        Ok(id)
    }

    fn resolve_fields(&mut self, decl: &MessageDecl) -> Result<MessageDescriptor> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(decl.fields.len());

        for field in &decl.fields {
            // Precedence step 1: ignored fields vanish from the output
            if field.ignored {
                trace!(message = %decl.name, field = %field.name, "skipping ignored field");
                continue;
            }

            let ctx = format!("{}.{}", decl.name, field.name);

            if field.index == 0 || field.index > MAX_FIELD_INDEX {
                return Err(ResolutionError::InvalidIndex {
                    field: ctx,
                    index: field.index,
                    max: MAX_FIELD_INDEX,
                });
            }
            if !seen.insert(field.index) {
                return Err(ResolutionError::DuplicateIndex {
                    message: decl.name.clone(),
                    index: field.index,
                });
            }
            if decl.reserved.iter().any(|r| r.contains(&field.index)) {
                return Err(ResolutionError::ReservedIndexViolation {
                    message: decl.name.clone(),
                    field: field.name.clone(),
                    index: field.index,
                });
            }

            trace!(field = %ctx, index = field.index, "resolving field");

            let mut shape = self.resolve_shape(&ctx, &field.shape, 0)?;

            // Precedence step 2: an explicit converter wraps the resolved
            // inner shape.
            if let Some(converter_name) = &field.converter {
                let spec = self.converters.get(converter_name).ok_or_else(|| {
                    ResolutionError::UnresolvedConverter {
                        name: converter_name.clone(),
                        field: ctx.clone(),
                    }
                })?;
                shape = PropertyShape::Wrapped {
                    inner: Box::new(shape),
                    converter: spec.clone(),
                };
            }

            if let Some(declared) = field.wire {
                validate_wire(&ctx, &shape, declared)?;
            }

            let default = default_rule(field, &shape);

            fields.push(FieldDescriptor {
                name: field.name.clone(),
                index: field.index,
                shape,
                default,
                required: field.required,
                oneof: field.oneof.clone(),
            });
        }

        Ok(MessageDescriptor::new(
            decl.name.clone(),
            decl.kind,
            fields,
            decl.reserved.clone(),
            decl.capture_unknown,
        ))
    }

    fn resolve_shape(
        &mut self,
        ctx: &str,
        shape: &FieldShape,
        wrapper_depth: usize,
    ) -> Result<PropertyShape> {
        match shape {
            // Precedence step 3: peel one single-slot layer and recurse
            FieldShape::Optional(inner) => {
                if wrapper_depth + 1 > MAX_WRAPPER_DEPTH {
                    return Err(ResolutionError::ambiguous_shape(
                        ctx,
                        format!("more than {MAX_WRAPPER_DEPTH} wrapper layers"),
                    ));
                }
                if matches!(inner.as_ref(), FieldShape::Optional(_)) {
                    return Err(ResolutionError::ambiguous_shape(
                        ctx,
                        "single-slot wrapper directly inside another",
                    ));
                }
                let resolved = self.resolve_shape(ctx, inner, wrapper_depth + 1)?;
                Ok(PropertyShape::Wrapped {
                    inner: Box::new(resolved),
                    converter: ConverterSpec::single_slot(),
                })
            }

            // Precedence step 4: collections
            FieldShape::Repeated { element, packed } => {
                if matches!(
                    element.as_ref(),
                    FieldShape::Repeated { .. } | FieldShape::Map { .. }
                ) {
                    return Err(ResolutionError::ambiguous_shape(
                        ctx,
                        format!("repeated of {}", element_kind_name(element)),
                    ));
                }
                let resolved = self.resolve_shape(ctx, element, wrapper_depth)?;
                if *packed && !resolved.is_numeric_scalar() {
                    return Err(ResolutionError::InvalidPacked {
                        field: ctx.to_string(),
                        details: format!("element shape is {}", resolved.kind_name()),
                    });
                }
                Ok(PropertyShape::Repeated {
                    element: Box::new(resolved),
                    packed: *packed,
                })
            }

            // Precedence step 5: maps, key and value independently
            FieldShape::Map { key, value } => {
                if !key.is_valid_map_key() {
                    return Err(ResolutionError::InvalidMapKey {
                        field: ctx.to_string(),
                        details: format!("{} is not a legal key kind", key.as_str()),
                    });
                }
                if matches!(value.as_ref(), FieldShape::Map { .. }) {
                    return Err(ResolutionError::ambiguous_shape(
                        ctx,
                        "map values may not themselves be maps",
                    ));
                }
                let resolved_value = self.resolve_shape(ctx, value, wrapper_depth)?;
                Ok(PropertyShape::Map {
                    key: *key,
                    value: Box::new(resolved_value),
                })
            }

            // Precedence steps 6 and 7: nominal types, then scalars
            FieldShape::Plain(TypeRef::Named(name)) => {
                if self.schema.enum_decl(name).is_some() {
                    let id = self.resolve_enum(name)?;
                    return Ok(PropertyShape::Enum(id));
                }
                let kind = self
                    .schema
                    .message(name)
                    .map(|decl| decl.kind)
                    .ok_or_else(|| ResolutionError::UnknownType {
                        name: name.clone(),
                        field: ctx.to_string(),
                    })?;
                let id = self.resolve_message_ref(name, ctx)?;
                Ok(match kind {
                    MessageKind::Message => PropertyShape::Message(id),
                    MessageKind::Group => PropertyShape::Group(id),
                })
            }

            FieldShape::Plain(TypeRef::Scalar(kind)) => Ok(PropertyShape::Scalar(*kind)),
        }
    }
}

fn element_kind_name(shape: &FieldShape) -> &'static str {
    match shape {
        FieldShape::Plain(_) => "plain",
        FieldShape::Optional(_) => "optional",
        FieldShape::Repeated { .. } => "repeated",
        FieldShape::Map { .. } => "map",
    }
}

fn validate_wire(ctx: &str, shape: &PropertyShape, declared: WireType) -> Result<()> {
    let natural = shape.natural_wire();
    if natural != declared {
        return Err(ResolutionError::incompatible_wire_kind(
            ctx,
            format!("declared {declared:?}, shape encodes as {natural:?}"),
        ));
    }
    Ok(())
}

/// Default-value resolution: explicit factory first, then by shape
fn default_rule(field: &FieldDecl, shape: &PropertyShape) -> DefaultRule {
    if let Some(value) = &field.default {
        return DefaultRule::Explicit(value.clone());
    }
    match shape {
        PropertyShape::Scalar(kind) => DefaultRule::ZeroOfKind(*kind),
        PropertyShape::Repeated { .. } => DefaultRule::EmptyList,
        PropertyShape::Map { .. } => DefaultRule::EmptyMap,
        PropertyShape::Enum(_)
        | PropertyShape::Message(_)
        | PropertyShape::Group(_)
        | PropertyShape::Wrapped { .. } => DefaultRule::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumDecl, ScalarKind};
    use crate::value::Value;

    fn empty_registry() -> ConverterRegistry {
        ConverterRegistry::new()
    }

    fn resolve_single(decl: MessageDecl) -> Result<DescriptorPool> {
        resolve(&Schema::new().with_message(decl), &empty_registry())
    }

    #[test]
    fn test_plain_scalar_field() {
        let pool = resolve_single(
            MessageDecl::new("M")
                .with_field(FieldDecl::new("id", 1, FieldShape::scalar(ScalarKind::Uint64))),
        )
        .unwrap();

        let desc = pool.message(pool.message_id("M").unwrap());
        let field = desc.field(1).unwrap();
        assert!(matches!(
            field.shape,
            PropertyShape::Scalar(ScalarKind::Uint64)
        ));
        assert_eq!(field.default, DefaultRule::ZeroOfKind(ScalarKind::Uint64));
    }

    #[test]
    fn test_ignored_field_dropped() {
        let pool = resolve_single(
            MessageDecl::new("M")
                .with_field(FieldDecl::new("a", 1, FieldShape::scalar(ScalarKind::Int32)))
                .with_field(
                    FieldDecl::new("b", 2, FieldShape::scalar(ScalarKind::Int32)).ignored(),
                ),
        )
        .unwrap();

        let desc = pool.message(pool.message_id("M").unwrap());
        assert!(desc.field(1).is_some());
        assert!(desc.field(2).is_none());
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let err = resolve_single(
            MessageDecl::new("M")
                .with_field(FieldDecl::new("a", 1, FieldShape::scalar(ScalarKind::Int32)))
                .with_field(FieldDecl::new("b", 1, FieldShape::scalar(ScalarKind::Int32))),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::DuplicateIndex { index: 1, .. }
        ));
    }

    #[test]
    fn test_reserved_index_rejected() {
        let err = resolve_single(
            MessageDecl::new("M")
                .with_reserved(5..=10)
                .with_field(FieldDecl::new("a", 7, FieldShape::scalar(ScalarKind::Int32))),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::ReservedIndexViolation { index: 7, .. }
        ));
    }

    #[test]
    fn test_index_zero_rejected() {
        let err = resolve_single(
            MessageDecl::new("M")
                .with_field(FieldDecl::new("a", 0, FieldShape::scalar(ScalarKind::Int32))),
        )
        .unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidIndex { index: 0, .. }));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = resolve_single(
            MessageDecl::new("M").with_field(FieldDecl::new("a", 1, FieldShape::named("Ghost"))),
        )
        .unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownType { .. }));
    }

    #[test]
    fn test_unresolved_converter_rejected() {
        let err = resolve_single(
            MessageDecl::new("M").with_field(
                FieldDecl::new("a", 1, FieldShape::scalar(ScalarKind::String))
                    .with_converter("uuid"),
            ),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::UnresolvedConverter { .. }
        ));
    }

    #[test]
    fn test_packed_string_rejected() {
        let err = resolve_single(
            MessageDecl::new("M").with_field(FieldDecl::new(
                "a",
                1,
                FieldShape::packed(FieldShape::scalar(ScalarKind::String)),
            )),
        )
        .unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidPacked { .. }));
    }

    #[test]
    fn test_packed_numeric_accepted() {
        let pool = resolve_single(MessageDecl::new("M").with_field(FieldDecl::new(
            "a",
            1,
            FieldShape::packed(FieldShape::scalar(ScalarKind::Sint64)),
        )))
        .unwrap();
        let desc = pool.message(pool.message_id("M").unwrap());
        assert!(matches!(
            desc.field(1).unwrap().shape,
            PropertyShape::Repeated { packed: true, .. }
        ));
    }

    #[test]
    fn test_optional_of_optional_ambiguous() {
        let err = resolve_single(MessageDecl::new("M").with_field(FieldDecl::new(
            "a",
            1,
            FieldShape::optional(FieldShape::optional(FieldShape::scalar(ScalarKind::Bool))),
        )))
        .unwrap_err();
        assert!(matches!(err, ResolutionError::AmbiguousShape { .. }));
    }

    #[test]
    fn test_map_of_map_rejected() {
        let err = resolve_single(MessageDecl::new("M").with_field(FieldDecl::new(
            "a",
            1,
            FieldShape::map(
                ScalarKind::String,
                FieldShape::map(ScalarKind::String, FieldShape::scalar(ScalarKind::Int32)),
            ),
        )))
        .unwrap_err();
        assert!(matches!(err, ResolutionError::AmbiguousShape { .. }));
    }

    #[test]
    fn test_float_map_key_rejected() {
        let err = resolve_single(MessageDecl::new("M").with_field(FieldDecl::new(
            "a",
            1,
            FieldShape::map(ScalarKind::Double, FieldShape::scalar(ScalarKind::Int32)),
        )))
        .unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidMapKey { .. }));
    }

    #[test]
    fn test_wire_override_mismatch() {
        let err = resolve_single(
            MessageDecl::new("M").with_field(
                FieldDecl::new("a", 1, FieldShape::scalar(ScalarKind::Fixed32))
                    .with_wire(WireType::Fixed64),
            ),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::IncompatibleWireKind { .. }
        ));
    }

    #[test]
    fn test_self_referential_message() {
        let pool = resolve_single(
            MessageDecl::new("Node")
                .with_field(FieldDecl::new("value", 1, FieldShape::scalar(ScalarKind::Int64)))
                .with_field(FieldDecl::new("next", 2, FieldShape::named("Node"))),
        )
        .unwrap();

        let id = pool.message_id("Node").unwrap();
        let desc = pool.message(id);
        match &desc.field(2).unwrap().shape {
            PropertyShape::Message(referenced) => assert_eq!(*referenced, id),
            other => panic!("expected message shape, got {other:?}"),
        }
    }

    #[test]
    fn test_self_referential_group() {
        let pool = resolve_single(
            MessageDecl::group("Ring")
                .with_field(FieldDecl::new("label", 1, FieldShape::scalar(ScalarKind::String)))
                .with_field(FieldDecl::new("inner", 2, FieldShape::named("Ring"))),
        )
        .unwrap();

        let id = pool.message_id("Ring").unwrap();
        assert!(matches!(
            pool.message(id).field(2).unwrap().shape,
            PropertyShape::Group(referenced) if referenced == id
        ));
    }

    #[test]
    fn test_mutually_recursive_messages() {
        let schema = Schema::new()
            .with_message(
                MessageDecl::new("A").with_field(FieldDecl::new("b", 1, FieldShape::named("B"))),
            )
            .with_message(
                MessageDecl::new("B").with_field(FieldDecl::new("a", 1, FieldShape::named("A"))),
            );
        let pool = resolve(&schema, &empty_registry()).unwrap();
        assert_eq!(pool.message_count(), 2);
    }

    #[test]
    fn test_resolve_message_builds_only_the_subgraph() {
        let schema = Schema::new()
            .with_message(
                MessageDecl::new("Wanted")
                    .with_field(FieldDecl::new("dep", 1, FieldShape::named("Dep"))),
            )
            .with_message(
                MessageDecl::new("Dep")
                    .with_field(FieldDecl::new("n", 1, FieldShape::scalar(ScalarKind::Uint32))),
            )
            .with_message(
                MessageDecl::new("Unrelated")
                    .with_field(FieldDecl::new("s", 1, FieldShape::scalar(ScalarKind::String))),
            );

        let registry = empty_registry();
        let pool = Resolver::new(&schema, &registry)
            .resolve_message("Wanted")
            .unwrap();

        assert_eq!(pool.message_count(), 2);
        assert!(pool.message_id("Wanted").is_some());
        assert!(pool.message_id("Dep").is_some());
        assert!(pool.message_id("Unrelated").is_none());
    }

    #[test]
    fn test_resolve_message_unknown_name() {
        let schema = Schema::new();
        let registry = empty_registry();
        let err = Resolver::new(&schema, &registry)
            .resolve_message("Ghost")
            .unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownType { .. }));
    }

    #[test]
    fn test_explicit_default_wins() {
        let pool = resolve_single(
            MessageDecl::new("M").with_field(
                FieldDecl::new("a", 1, FieldShape::scalar(ScalarKind::Int32))
                    .with_default(Value::I32(42)),
            ),
        )
        .unwrap();
        let desc = pool.message(pool.message_id("M").unwrap());
        assert_eq!(
            desc.field(1).unwrap().default,
            DefaultRule::Explicit(Value::I32(42))
        );
    }

    #[test]
    fn test_enum_field() {
        let schema = Schema::new()
            .with_enum(EnumDecl::new("Color").with_value("RED", 0).with_value("BLUE", 1))
            .with_message(
                MessageDecl::new("M").with_field(FieldDecl::new("c", 1, FieldShape::named("Color"))),
            );
        let pool = resolve(&schema, &empty_registry()).unwrap();
        let desc = pool.message(pool.message_id("M").unwrap());
        assert!(matches!(desc.field(1).unwrap().shape, PropertyShape::Enum(_)));
        assert_eq!(desc.field(1).unwrap().default, DefaultRule::Absent);
    }
}
