//! Core of a single-user desktop invoicing tool: an append-only flat-file
//! record store (profiles, invoice history, settings) and a deterministic
//! document composer that renders one invoice record to a paginated HTML
//! file. The interactive front end lives in the binary and only calls the
//! surface re-exported here.

pub mod document;
pub mod error;
pub mod model;
pub mod paths;
pub mod store;

pub use document::{build_invoice_document, default_output_path, invoice_number};
pub use error::{Error, Result};
pub use store::RecordStore;
