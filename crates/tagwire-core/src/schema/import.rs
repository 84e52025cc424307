//! `FileDescriptorProto` → [`Schema`] adapter.
//!
//! The textual `.proto` grammar lives outside this engine; what crosses the
//! boundary is a parsed descriptor. This module converts a
//! `prost_types::FileDescriptorProto` (or its serialized bytes) into the
//! engine's own declaration model: nested messages flatten to dotted names,
//! synthetic map-entry types collapse back into map shapes, groups keep
//! their group framing, proto3 optionals become single-slot wrappers, and
//! reserved ranges carry over.
//!
//! Unsupported constructs (extensions) fail the import; they are never
//! silently dropped.

use crate::schema::{
    EnumDecl, FieldDecl, FieldShape, MessageDecl, MessageKind, ScalarKind, Schema,
};
use crate::error::ResolutionError;
use crate::value::Value;
use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

type Result<T> = std::result::Result<T, ResolutionError>;

/// Imports a schema from serialized `FileDescriptorProto` bytes
pub fn from_bytes(data: &[u8]) -> Result<Schema> {
    let proto = FileDescriptorProto::decode(data)
        .map_err(|e| ResolutionError::import(format!("failed to parse descriptor: {e}")))?;
    from_file_descriptor(&proto)
}

/// Imports a schema from a parsed `FileDescriptorProto`
pub fn from_file_descriptor(proto: &FileDescriptorProto) -> Result<Schema> {
    if !proto.extension.is_empty() {
        return Err(ResolutionError::import(
            "top-level extensions are not supported",
        ));
    }

    let proto3 = proto.syntax() == "proto3";
    let mut importer = Importer {
        package: proto.package().to_string(),
        proto3,
        map_entries: HashMap::new(),
        group_types: HashSet::new(),
        messages: Vec::new(),
        enums: Vec::new(),
    };

    // First pass registers map-entry descriptors so field import can
    // collapse them; it also records which nested types are group-framed.
    for message in &proto.message_type {
        importer.index_message("", message);
    }
    for message in &proto.message_type {
        importer.import_message("", message)?;
    }
    for enum_type in &proto.enum_type {
        importer.import_enum("", enum_type);
    }

    debug!(
        file = proto.name(),
        messages = importer.messages.len(),
        enums = importer.enums.len(),
        "imported descriptor"
    );

    let mut schema = Schema::new();
    for mut decl in importer.messages {
        if importer.group_types.contains(&decl.name) {
            decl.kind = MessageKind::Group;
        }
        schema = schema.with_message(decl);
    }
    for decl in importer.enums {
        schema = schema.with_enum(decl);
    }
    Ok(schema)
}

struct Importer {
    package: String,
    proto3: bool,
    /// Local name → map-entry descriptor, for collapsing map fields
    map_entries: HashMap<String, DescriptorProto>,
    /// Local names referenced by group-typed fields
    group_types: HashSet<String>,
    messages: Vec<MessageDecl>,
    enums: Vec<EnumDecl>,
}

impl Importer {
    fn index_message(&mut self, prefix: &str, message: &DescriptorProto) {
        let name = qualify(prefix, message.name());
        for nested in &message.nested_type {
            if is_map_entry(nested) {
                self.map_entries
                    .insert(qualify(&name, nested.name()), nested.clone());
            } else {
                self.index_message(&name, nested);
            }
        }
        for field in &message.field {
            if field.r#type() == Type::Group {
                self.group_types
                    .insert(self.local_name(field.type_name()));
            }
        }
    }

    fn import_message(&mut self, prefix: &str, message: &DescriptorProto) -> Result<()> {
        if !message.extension.is_empty() {
            return Err(ResolutionError::import(format!(
                "message '{}' declares extensions",
                message.name()
            )));
        }

        let name = qualify(prefix, message.name());

        for nested in &message.nested_type {
            if !is_map_entry(nested) {
                self.import_message(&name, nested)?;
            }
        }
        for enum_type in &message.enum_type {
            self.import_enum(&name, enum_type);
        }

        let mut decl = MessageDecl::new(name.clone());
        for range in &message.reserved_range {
            let start = range.start().max(1) as u32;
            // Descriptor ranges are exclusive at the end
            let end = (range.end() - 1).max(0) as u32;
            if end >= start {
                decl = decl.with_reserved(start..=end);
            }
        }

        for field in &message.field {
            decl = decl.with_field(self.import_field(&name, message, field)?);
        }

        self.messages.push(decl);
        Ok(())
    }

    fn import_field(
        &self,
        message_name: &str,
        message: &DescriptorProto,
        field: &FieldDescriptorProto,
    ) -> Result<FieldDecl> {
        let number = field.number();
        if number <= 0 {
            return Err(ResolutionError::import(format!(
                "field '{}.{}' has non-positive number {number}",
                message_name,
                field.name()
            )));
        }

        let shape = self.field_shape(field)?;
        let mut decl = FieldDecl::new(field.name(), number as u32, shape);

        if field.label() == Label::Required {
            decl = decl.required();
        }

        // Oneof labels carry over, except the synthetic oneofs proto3 uses
        // to mark explicit optionals.
        if let Some(oneof_index) = field.oneof_index {
            if let Some(oneof) = message.oneof_decl.get(oneof_index as usize) {
                if !oneof.name().starts_with('_') {
                    decl = decl.in_oneof(oneof.name());
                }
            }
        }

        if let Some(default) = &field.default_value {
            if let Some(value) = parse_default(field.r#type(), default) {
                decl = decl.with_default(value);
            } else {
                trace!(
                    field = field.name(),
                    default,
                    "skipping unparseable default value"
                );
            }
        }

        Ok(decl)
    }

    fn field_shape(&self, field: &FieldDescriptorProto) -> Result<FieldShape> {
        let base = match scalar_kind(field.r#type()) {
            Some(kind) => FieldShape::scalar(kind),
            None => FieldShape::named(self.local_name(field.type_name())),
        };

        if field.label() == Label::Repeated {
            // A repeated message field whose type is a synthetic map entry is
            // really a map field.
            if field.r#type() == Type::Message {
                let entry_name = self.local_name(field.type_name());
                if let Some(entry) = self.map_entries.get(&entry_name) {
                    return self.map_shape(field, entry);
                }
            }
            let packed = match field.options.as_ref().and_then(|o| o.packed) {
                Some(explicit) => explicit,
                None => self.proto3 && packable(field.r#type()),
            };
            return Ok(FieldShape::Repeated {
                element: Box::new(base),
                packed,
            });
        }

        if field.proto3_optional() {
            return Ok(FieldShape::optional(base));
        }

        Ok(base)
    }

    fn map_shape(&self, field: &FieldDescriptorProto, entry: &DescriptorProto) -> Result<FieldShape> {
        let key_field = entry.field.iter().find(|f| f.number() == 1);
        let value_field = entry.field.iter().find(|f| f.number() == 2);
        let (Some(key_field), Some(value_field)) = (key_field, value_field) else {
            return Err(ResolutionError::import(format!(
                "map entry for field '{}' lacks key/value fields",
                field.name()
            )));
        };

        let key = scalar_kind(key_field.r#type()).ok_or_else(|| {
            ResolutionError::import(format!(
                "map key of field '{}' is not a scalar",
                field.name()
            ))
        })?;
        let value = match scalar_kind(value_field.r#type()) {
            Some(kind) => FieldShape::scalar(kind),
            None => FieldShape::named(self.local_name(value_field.type_name())),
        };

        Ok(FieldShape::map(key, value))
    }

    fn import_enum(&mut self, prefix: &str, enum_type: &prost_types::EnumDescriptorProto) {
        let mut decl = EnumDecl::new(qualify(prefix, enum_type.name()));
        for value in &enum_type.value {
            decl = decl.with_value(value.name(), value.number());
        }
        self.enums.push(decl);
    }

    /// Strips the leading dot and the file's package prefix from a fully
    /// qualified type name
    fn local_name(&self, type_name: &str) -> String {
        let name = type_name.strip_prefix('.').unwrap_or(type_name);
        if !self.package.is_empty() {
            if let Some(stripped) = name.strip_prefix(&format!("{}.", self.package)) {
                return stripped.to_string();
            }
        }
        name.to_string()
    }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn is_map_entry(message: &DescriptorProto) -> bool {
    message
        .options
        .as_ref()
        .is_some_and(|o| o.map_entry.unwrap_or(false))
}

fn scalar_kind(ty: Type) -> Option<ScalarKind> {
    match ty {
        Type::Double => Some(ScalarKind::Double),
        Type::Float => Some(ScalarKind::Float),
        Type::Int64 => Some(ScalarKind::Int64),
        Type::Uint64 => Some(ScalarKind::Uint64),
        Type::Int32 => Some(ScalarKind::Int32),
        Type::Fixed64 => Some(ScalarKind::Fixed64),
        Type::Fixed32 => Some(ScalarKind::Fixed32),
        Type::Bool => Some(ScalarKind::Bool),
        Type::String => Some(ScalarKind::String),
        Type::Bytes => Some(ScalarKind::Bytes),
        Type::Uint32 => Some(ScalarKind::Uint32),
        Type::Sfixed32 => Some(ScalarKind::Sfixed32),
        Type::Sfixed64 => Some(ScalarKind::Sfixed64),
        Type::Sint32 => Some(ScalarKind::Sint32),
        Type::Sint64 => Some(ScalarKind::Sint64),
        Type::Group | Type::Message | Type::Enum => None,
    }
}

fn packable(ty: Type) -> bool {
    !matches!(
        ty,
        Type::String | Type::Bytes | Type::Group | Type::Message
    )
}

fn parse_default(ty: Type, text: &str) -> Option<Value> {
    match ty {
        Type::Bool => text.parse().ok().map(Value::Bool),
        Type::Int32 | Type::Sint32 | Type::Sfixed32 => text.parse().ok().map(Value::I32),
        Type::Int64 | Type::Sint64 | Type::Sfixed64 => text.parse().ok().map(Value::I64),
        Type::Uint32 | Type::Fixed32 => text.parse().ok().map(Value::U32),
        Type::Uint64 | Type::Fixed64 => text.parse().ok().map(Value::U64),
        Type::Float => text.parse().ok().map(Value::F32),
        Type::Double => text.parse().ok().map(Value::F64),
        Type::String => Some(Value::String(text.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
        MessageOptions, OneofDescriptorProto,
    };

    fn scalar_field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            r#type: Some(ty as i32),
            label: Some(Label::Optional as i32),
            ..Default::default()
        }
    }

    fn file(messages: Vec<DescriptorProto>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some("test.proto".to_string()),
            package: Some("pkg".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: messages,
            ..Default::default()
        }
    }

    #[test]
    fn test_import_simple_message() {
        let proto = file(vec![DescriptorProto {
            name: Some("Item".to_string()),
            field: vec![
                scalar_field("id", 1, Type::Uint64),
                scalar_field("label", 2, Type::String),
            ],
            ..Default::default()
        }]);

        let schema = from_file_descriptor(&proto).unwrap();
        let decl = schema.message("Item").unwrap();
        assert_eq!(decl.fields.len(), 2);
        assert_eq!(
            decl.fields[0].shape,
            FieldShape::scalar(ScalarKind::Uint64)
        );
    }

    #[test]
    fn test_import_nested_and_named_reference() {
        let proto = file(vec![DescriptorProto {
            name: Some("Outer".to_string()),
            field: vec![FieldDescriptorProto {
                name: Some("inner".to_string()),
                number: Some(1),
                r#type: Some(Type::Message as i32),
                label: Some(Label::Optional as i32),
                type_name: Some(".pkg.Outer.Inner".to_string()),
                ..Default::default()
            }],
            nested_type: vec![DescriptorProto {
                name: Some("Inner".to_string()),
                field: vec![scalar_field("x", 1, Type::Int32)],
                ..Default::default()
            }],
            ..Default::default()
        }]);

        let schema = from_file_descriptor(&proto).unwrap();
        assert!(schema.message("Outer.Inner").is_some());
        let outer = schema.message("Outer").unwrap();
        assert_eq!(outer.fields[0].shape, FieldShape::named("Outer.Inner"));
    }

    #[test]
    fn test_import_map_field_collapses_entry() {
        let entry = DescriptorProto {
            name: Some("CountsEntry".to_string()),
            field: vec![
                scalar_field("key", 1, Type::String),
                scalar_field("value", 2, Type::Int32),
            ],
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let proto = file(vec![DescriptorProto {
            name: Some("Stats".to_string()),
            field: vec![FieldDescriptorProto {
                name: Some("counts".to_string()),
                number: Some(1),
                r#type: Some(Type::Message as i32),
                label: Some(Label::Repeated as i32),
                type_name: Some(".pkg.Stats.CountsEntry".to_string()),
                ..Default::default()
            }],
            nested_type: vec![entry],
            ..Default::default()
        }]);

        let schema = from_file_descriptor(&proto).unwrap();
        let decl = schema.message("Stats").unwrap();
        assert_eq!(
            decl.fields[0].shape,
            FieldShape::map(ScalarKind::String, FieldShape::scalar(ScalarKind::Int32))
        );
        // The synthetic entry type itself is not imported
        assert!(schema.message("Stats.CountsEntry").is_none());
    }

    #[test]
    fn test_import_repeated_proto3_packs_numerics() {
        let proto = file(vec![DescriptorProto {
            name: Some("Series".to_string()),
            field: vec![FieldDescriptorProto {
                name: Some("points".to_string()),
                number: Some(1),
                r#type: Some(Type::Sint64 as i32),
                label: Some(Label::Repeated as i32),
                ..Default::default()
            }],
            ..Default::default()
        }]);

        let schema = from_file_descriptor(&proto).unwrap();
        let decl = schema.message("Series").unwrap();
        assert!(matches!(
            decl.fields[0].shape,
            FieldShape::Repeated { packed: true, .. }
        ));
    }

    #[test]
    fn test_import_oneof_skips_synthetic() {
        let proto = file(vec![DescriptorProto {
            name: Some("Choice".to_string()),
            field: vec![
                FieldDescriptorProto {
                    oneof_index: Some(0),
                    ..scalar_field("a", 1, Type::Int32)
                },
                FieldDescriptorProto {
                    oneof_index: Some(1),
                    proto3_optional: Some(true),
                    ..scalar_field("b", 2, Type::Int32)
                },
            ],
            oneof_decl: vec![
                OneofDescriptorProto {
                    name: Some("kind".to_string()),
                    ..Default::default()
                },
                OneofDescriptorProto {
                    name: Some("_b".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }]);

        let schema = from_file_descriptor(&proto).unwrap();
        let decl = schema.message("Choice").unwrap();
        assert_eq!(decl.fields[0].oneof.as_deref(), Some("kind"));
        assert_eq!(decl.fields[1].oneof, None);
        assert!(matches!(decl.fields[1].shape, FieldShape::Optional(_)));
    }

    #[test]
    fn test_import_reserved_ranges() {
        let proto = file(vec![DescriptorProto {
            name: Some("Legacy".to_string()),
            reserved_range: vec![prost_types::descriptor_proto::ReservedRange {
                start: Some(5),
                end: Some(10),
            }],
            ..Default::default()
        }]);

        let schema = from_file_descriptor(&proto).unwrap();
        // Exclusive end becomes an inclusive range
        assert_eq!(schema.message("Legacy").unwrap().reserved, vec![5..=9]);
    }

    #[test]
    fn test_import_enum() {
        let mut proto = file(vec![]);
        proto.enum_type = vec![EnumDescriptorProto {
            name: Some("Color".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("RED".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("BLUE".to_string()),
                    number: Some(3),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }];

        let schema = from_file_descriptor(&proto).unwrap();
        let decl = schema.enum_decl("Color").unwrap();
        assert_eq!(decl.values, vec![("RED".to_string(), 0), ("BLUE".to_string(), 3)]);
    }

    #[test]
    fn test_import_rejects_extensions() {
        let mut proto = file(vec![]);
        proto.extension = vec![scalar_field("ext", 100, Type::Int32)];
        assert!(matches!(
            from_file_descriptor(&proto),
            Err(ResolutionError::Import(_))
        ));
    }
}
