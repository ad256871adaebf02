//! Farecard Common - Shared bit-level codec for transit card records
//!
//! Transit cards store their records as densely packed bit fields. This crate
//! describes those layouts declaratively with a [`Schema`] and turns raw block
//! bytes into [`ParsedFields`] (and back) without knowing anything about card
//! I/O or any particular operator.
//!
//! ```
//! use farecard_common::{decode, encode, Field, Schema};
//!
//! let schema = Schema::new(vec![
//!     Field::int("version", 8),
//!     Field::bitmap(vec![Field::int("station", 16), Field::int("route", 8)]),
//! ]);
//!
//! // version 7, bitmap 0b01 (station present, route absent), station 0x1234
//! let bytes = [0x07, 0x44, 0x8D, 0x00];
//! let fields = decode(&schema, &bytes).unwrap();
//! assert_eq!(fields.int("station"), Some(0x1234));
//! assert!(!fields.contains("route"));
//! assert_eq!(encode(&schema, &fields).unwrap(), bytes.to_vec());
//! ```

pub mod bits;
pub mod codec;
pub mod fields;
pub mod schema;

pub use codec::{decode, decode_field, encode};
pub use fields::{ParsedFields, Value};
pub use schema::{Field, Schema, TimeUnit};

use thiserror::Error;

/// Errors produced by the schema codec
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before the schema was fully decoded
    #[error("Truncated buffer: needed {needed} bits, only {available} available")]
    TruncatedBuffer { needed: usize, available: usize },

    /// An integer field was declared wider than 64 bits
    #[error("Field '{name}' has unsupported width {width}")]
    InvalidWidth { name: &'static str, width: usize },

    /// A field required for encoding has no value
    #[error("Missing value for field '{0}'")]
    MissingField(&'static str),

    /// A value does not fit in its field
    #[error("Value for field '{name}' does not fit in {width} bits")]
    ValueOutOfRange { name: &'static str, width: usize },

    /// A value has the wrong kind for its field
    #[error("Value for field '{name}' has the wrong type")]
    TypeMismatch { name: &'static str },
}

/// A specialized [`Result`] type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
