//! Command sanitization and path validation: the runtime's security
//! boundary. Both pieces reject outright rather than attempt to rewrite
//! input into a safe form.

pub mod command_sanitizer;
pub mod path_validator;

pub use command_sanitizer::{CommandSanitizer, SanitizedCommand};
pub use path_validator::{PathValidationOutcome, PathValidator};
