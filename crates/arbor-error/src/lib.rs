//! # arbor-error
//!
//! Unified error handling for the arbor engine - following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., HeaderMalformed, FieldNotFound)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use arbor_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::HeaderMalformed, "missing Nhalos attribute")
//!         .with_operation("formats::forest_pack::read_header")
//!         .with_context("file", "forest.h5"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, arbor_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the arbor Error.
pub type Result<T> = std::result::Result<T, Error>;
