//! WordprocessingML template image insertion.
//!
//! Takes a .docx template containing `{{insert_image name type width height}}`
//! placeholders and replaces matching occurrences with inline pictures. The
//! pipeline scans the main document part for placeholders, resolves the
//! requested image sources concurrently, registers each image's identity
//! within the package, and splices drawing markup into the document XML. The
//! package is only mutated after every fallible step has succeeded.
//!
//! The main entry point is [`Package`], a verified WordprocessingML package
//! wrapper whose [`Package::insert_images`] method runs the whole pipeline.

pub mod drawing;
pub mod error;
pub mod media;
pub mod package;
pub mod placeholder;
pub mod source;

pub use error::{DocxError, Result, SourceError};
pub use package::{InsertReport, Package};
pub use placeholder::Placeholder;
