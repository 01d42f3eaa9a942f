//! Longan - a Rust library for inserting images into Word templates
//!
//! This library takes a .docx template containing
//! `{{insert_image name type width height}}` placeholders and replaces them
//! with inline pictures, handling the package bookkeeping that a picture
//! insertion requires: media parts, content type declarations, relationship
//! ids, and the drawing markup itself.
//!
//! # Features
//!
//! - **Placeholder scanning**: Finds placeholders even when Word has split
//!   them across multiple runs
//! - **Concurrent acquisition**: Resolves local paths, http(s) URLs, and
//!   base64 data URIs in one concurrent batch
//! - **All-or-nothing**: A package is never mutated until every source has
//!   resolved and every drawing has been spliced
//! - **OPC layer**: ZIP physical packages, partnames, content types, and
//!   relationship graphs usable on their own
//!
//! # Example - Inserting images into a template
//!
//! ```no_run
//! use longan::docx::Package;
//! use std::collections::HashMap;
//!
//! # async fn run() -> Result<(), longan::docx::DocxError> {
//! // Open a .docx template
//! let mut pkg = Package::open("template.docx")?;
//!
//! // Map placeholder names to image sources
//! let mut sources = HashMap::new();
//! sources.insert("logo".to_string(), "assets/logo.png".to_string());
//! sources.insert("chart".to_string(), "https://example.com/chart.png".to_string());
//!
//! // Resolve, register, and splice in one pipeline
//! let report = pkg.insert_images(&sources).await?;
//! println!("{} image(s) inserted", report.images_added);
//!
//! pkg.save("out.docx")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Low-level OPC access
//!
//! ```no_run
//! use longan::opc::OpcPackage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Open any OPC package
//! let pkg = OpcPackage::open("document.docx")?;
//!
//! // List all parts
//! for part in pkg.iter_parts() {
//!     println!("Part: {} ({})", part.partname(), part.content_type());
//! }
//! # Ok(())
//! # }
//! ```

/// WordprocessingML template image insertion
///
/// This module provides the placeholder scanner, image source resolver,
/// media registrar, and drawing splicer, driven by [`docx::Package`].
pub mod docx;

/// Open Packaging Convention (OPC) layer
///
/// This module provides the packaging substrate shared by Office Open XML
/// documents: ZIP physical packages, partnames, content type declarations,
/// and relationship graphs.
pub mod opc;

// Re-export commonly used types for convenience
pub use docx::{DocxError, InsertReport, Package, SourceError};
pub use opc::{OpcError, OpcPackage, PackURI};
