//! # tandem-wire
//!
//! Wire codec for tandem frames.
//!
//! A frame is the `//OK` sentinel followed by one serialization stream. The
//! stream is a fixed four-token header (interface marker, dispatch marker,
//! parameter count, envelope type) and then the envelope object.
//!
//! - [`Serializer`]: pluggable stream codec, shipped as [`JsonSerializer`]
//! - [`TypeRegistry`]: object types the serializer accepts in argument graphs
//! - [`StreamWriter`] / [`StreamReader`]: typed token cursors
//! - [`encode_frame`] / [`decode_frame`]: envelope ⇄ text frame

#![deny(unsafe_code)]

pub mod frame;
pub mod registry;
pub mod serializer;
pub mod stream;

pub use frame::{decode_frame, encode_frame};
pub use registry::TypeRegistry;
pub use serializer::{JsonSerializer, Serializer, value_kind};
pub use stream::{StreamReader, StreamWriter};
