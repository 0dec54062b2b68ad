//! Model types for dynarepo.
//!
//! Items are maps of attribute name to [`AttributeValue`]; requests and
//! responses mirror the subset of the DynamoDB JSON protocol that a
//! repository needs (point reads and writes, paginated query and scan, table
//! creation for local stores). Field naming follows the wire format so the
//! same structs can be loaded from JSON fixtures.
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(missing_docs)]

pub mod attribute_value;
pub mod error;
pub mod input;
pub mod output;
pub mod types;

pub use attribute_value::{AttributeValue, Item};
pub use error::{StoreError, StoreErrorCode};
