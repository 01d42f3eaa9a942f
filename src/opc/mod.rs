//! Open Packaging Convention (OPC) support.
//!
//! Implements the packaging layer shared by Office Open XML documents: ZIP
//! physical packages, partnames, content type declarations, and the
//! relationship graph that ties parts together.
//!
//! The main entry point is [`OpcPackage`], which loads a package into memory,
//! exposes its parts for reading and mutation, and serializes the result back
//! to an archive.

pub mod constants;
pub mod error;
pub mod package;
pub mod packuri;
pub mod part;
pub mod phys_pkg;
pub mod pkgreader;
pub mod pkgwriter;
pub mod rel;

pub use error::{OpcError, Result};
pub use package::OpcPackage;
pub use packuri::PackURI;
pub use part::{BlobPart, Part, XmlPart};
pub use rel::{Relationship, Relationships};
