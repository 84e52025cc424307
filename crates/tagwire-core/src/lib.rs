//! # tagwire-core
//!
//! A Protocol-Buffers-compatible binary serialization engine: a wire-format
//! codec plus a schema-resolution model that maps structured application
//! values onto the protobuf wire format and back.
//!
//! This crate provides the core functionality for:
//! - Encoding and decoding the protobuf wire format byte-exactly (varints,
//!   zigzag, fixed-width values, length-delimited records, legacy groups)
//! - Resolving field declarations into one canonical encode/decode/size
//!   strategy per field, ahead of time
//! - Capturing unknown fields for byte-identical round-trips
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`wire`]: stream-level wire format primitives
//! - [`schema`]: declarations, the resolver, and resolved descriptors
//! - [`codec`]: encode/decode/size against resolved descriptors
//! - [`value`]: the dynamic value model the codec operates on
//! - [`unknown`]: unknown-field capture
//! - [`error`]: error types and handling
//!
//! Data flows one way: declarations resolve once into an immutable
//! [`DescriptorPool`], and every subsequent encode/decode/size call works
//! from the pool. Nothing re-derives strategy at call time.
//!
//! ## Example
//!
//! ```
//! use tagwire_core::schema::{FieldDecl, FieldShape, MessageDecl, ScalarKind, Schema};
//! use tagwire_core::schema::convert::ConverterRegistry;
//! use tagwire_core::{decode, encode, resolve, MessageValue, Value};
//!
//! let schema = Schema::new().with_message(
//!     MessageDecl::new("Greeting")
//!         .with_field(FieldDecl::new("text", 1, FieldShape::scalar(ScalarKind::String))),
//! );
//! let pool = resolve(&schema, &ConverterRegistry::new())?;
//! let id = pool.message_id("Greeting").unwrap();
//!
//! let msg = MessageValue::new().with_field(1, "hello");
//! let mut buf = Vec::new();
//! encode(&pool, id, &msg, &mut buf)?;
//! assert_eq!(buf, [0x0A, 0x05, b'h', b'e', b'l', b'l', b'o']);
//!
//! let decoded = decode(&pool, id, &buf)?;
//! assert_eq!(decoded.get(1), Some(&Value::String("hello".into())));
//! # Ok::<(), tagwire_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! Custom to-wire/from-wire bridges plug in through
//! [`ConverterSpec`](schema::convert::ConverterSpec)s registered in a
//! [`ConverterRegistry`](schema::convert::ConverterRegistry); fields
//! reference them by name at declaration time.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod codec;
pub mod error;
pub mod schema;
pub mod unknown;
pub mod value;
pub mod wire;

// Re-export primary types for convenience
pub use codec::{decode, encode, encoded_len};
pub use error::{ConvertError, Error, ResolutionError, Result, ValidationError, WireFormatError};
pub use schema::descriptor::{DescriptorPool, EnumId, MessageId};
pub use schema::resolver::{resolve, Resolver};
pub use unknown::{UnknownFieldSet, UnknownValue};
pub use value::{MapKey, MessageValue, Value};
pub use wire::{WireReader, WireType, WireWriter};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field index (2^29 - 1)
pub const MAX_FIELD_INDEX: u32 = wire::MAX_FIELD_INDEX;
