//! # bitlayout
//!
//! Computes the bit layout of C-style `typedef struct` definitions with
//! bitfields, fixed-length arrays and nested structs, then packs and unpacks
//! values into byte buffers following that layout.
//!
//! Bitfields are packed back to back; whole primitives and nested structs are
//! aligned to their own width. A [parser::StructParser] owns the constant
//! table, the registry of parsed structs and the symbol table.
//!
//! ## Example
//!
//! ```
//! use bitlayout::{layout::Endianness, parser::StructParser, value::{Value, ValueTree}};
//!
//! let mut parser = StructParser::with_endianness(Endianness::Little);
//! let layout = parser
//!     .parse(
//!         "typedef struct {
//!             char msg_type : 4;
//!             char msg_source : 4;
//!             char counter;
//!             short length;
//!         } header_t;",
//!     )
//!     .unwrap();
//! assert_eq!(layout.total_bits, 32);
//!
//! let values = ValueTree::from([
//!     ("msg_type".to_string(), Value::U64(3)),
//!     ("msg_source".to_string(), Value::U64(6)),
//!     ("counter".to_string(), Value::U64(0x78)),
//!     ("length".to_string(), Value::U64(0xABCD)),
//! ]);
//! let bytes = parser.encode("header_t", &values).unwrap();
//! assert_eq!(bytes, [0x63, 0x78, 0xcd, 0xab]);
//! assert_eq!(parser.decode("header_t", &bytes).unwrap(), values);
//! ```

pub mod bits;
pub mod codec;
pub mod config;
pub mod describe;
pub mod errors;
pub mod field;
pub mod json;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod registry;
pub mod scanner;
pub mod symbols;
pub mod value;

pub use errors::{Error, Result};
pub use layout::{Endianness, StructLayout};
pub use parser::StructParser;
pub use value::{Value, ValueTree};
