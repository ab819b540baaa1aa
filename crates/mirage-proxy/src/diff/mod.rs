//! Response diffing for diff mode.
//!
//! # Module Structure
//!
//! - `engine` - status, header and structural body comparison
//! - `decode` - `Content-Encoding` chain decoding (gzip, br, deflate)
//! - `store` - reports per simplified request identity

mod decode;
mod engine;
mod store;

pub use decode::{decode_body, encoding_chain};
pub use engine::{diff, DiffEntry, UNDEFINED};
pub use store::{DiffReport, DiffStore};
