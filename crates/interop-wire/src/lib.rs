//! Wire format for Interop.
//!
//! Messages cross the channel as flat, versioned data objects. Each message
//! kind has a [`MessageConverter`] that translates between the two forms;
//! [`WireTranslator`] holds one per kind and [`WireCodec`] turns the result
//! into JSON bytes.
//!
//! Translation fails closed: a record this version cannot understand comes
//! back as `UnknownMessageType` with its envelope intact, so the receiver
//! can still reply to it.

mod converter;
pub mod converters;
mod translator;
pub mod v1;

pub use converter::{ConversionError, MessageConverter};
pub use translator::{WireCodec, WireTranslator};
pub use v1::{DataBody, DataHeader, DataObject, WIRE_VERSION};
