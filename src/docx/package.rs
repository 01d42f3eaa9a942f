//! Package implementation for Word document templating.
//!
//! `Package` wraps an OPC package verified to be a Word document and drives
//! the insertion pipeline: scan for placeholders, resolve every image
//! source, plan the registration, splice the document, then commit all four
//! part mutations in one step. Any failure before the commit leaves the
//! package exactly as loaded.

use crate::docx::drawing;
use crate::docx::error::{DocxError, Result, SourceError};
use crate::docx::media::{self, ResolvedImage};
use crate::docx::placeholder;
use crate::docx::source::{self, ImageFormat};
use crate::opc::constants::{content_type as ct, relationship_type};
use crate::opc::part::BlobPart;
use crate::opc::{OpcError, OpcPackage};
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, warn};

/// Counts reported by a completed insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReport {
    /// Media parts added to the package
    pub images_added: u32,

    /// Placeholder occurrences replaced with drawings
    pub occurrences_replaced: u32,

    /// Marker-bearing spans skipped for failing the grammar
    pub malformed_skipped: u32,
}

/// A Word (.docx) template package.
///
/// This is the main entry point for inserting images into a document. It
/// wraps an OPC package and provides the template-resolution pipeline.
///
/// # Examples
///
/// ```rust,no_run
/// use longan::docx::Package;
/// use std::collections::HashMap;
///
/// # async fn run() -> Result<(), longan::docx::DocxError> {
/// let mut pkg = Package::open("template.docx")?;
///
/// let mut sources = HashMap::new();
/// sources.insert("logo".to_string(), "assets/logo.png".to_string());
///
/// let report = pkg.insert_images(&sources).await?;
/// println!("{} image(s) inserted", report.images_added);
/// pkg.save("out.docx")?;
/// # Ok(())
/// # }
/// ```
pub struct Package {
    /// The underlying OPC package
    opc: OpcPackage,
}

impl Package {
    /// Open a .docx package from a file path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::verify(OpcPackage::open(path)?)
    }

    /// Load a .docx package from a reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        Self::verify(OpcPackage::from_reader(reader)?)
    }

    /// Load a .docx package from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::verify(OpcPackage::from_bytes(data)?)
    }

    /// Verify the package is a Word document by checking the main part's
    /// content type.
    fn verify(opc: OpcPackage) -> Result<Self> {
        let main_part = opc.main_document_part()?;

        let content_type = main_part.content_type();
        if content_type != ct::WML_DOCUMENT_MAIN {
            return Err(DocxError::InvalidContentType {
                expected: ct::WML_DOCUMENT_MAIN.to_string(),
                got: content_type.to_string(),
            });
        }

        Ok(Self { opc })
    }

    /// Resolve every `{{insert_image ...}}` placeholder named in `sources`
    /// and splice the images into the document.
    ///
    /// `sources` maps placeholder names to image locators: a local path, an
    /// http(s) URL, or a base64 data URI. All matched sources are resolved
    /// concurrently; if any fails, the call returns
    /// [`DocxError::SourceResolution`] listing every failure and the package
    /// is left untouched. Mutation happens as a single commit only after
    /// the whole batch has been planned and spliced.
    pub async fn insert_images(
        &mut self,
        sources: &HashMap<String, String>,
    ) -> Result<InsertReport> {
        let document_partname = self.opc.main_document_partname()?;
        let document_part = self.opc.get_part(&document_partname)?;
        let document_xml = std::str::from_utf8(document_part.blob())
            .map_err(OpcError::from)?
            .to_string();

        let outcome = placeholder::scan(&document_xml, sources);
        if outcome.placeholders.is_empty() {
            return Err(DocxError::NoPlaceholdersFound);
        }
        debug!(
            placeholders = outcome.placeholders.len(),
            malformed = outcome.malformed_skipped,
            "scan complete"
        );

        let entries: Vec<(String, String)> = outcome
            .placeholders
            .iter()
            .filter_map(|ph| {
                sources
                    .get(&ph.name)
                    .map(|locator| (ph.name.clone(), locator.clone()))
            })
            .collect();

        let mut resolved_bytes: HashMap<String, Vec<u8>> = HashMap::new();
        let mut failures: Vec<(String, SourceError)> = Vec::new();
        for (name, outcome) in source::resolve_batch(entries).await {
            match outcome {
                Ok(bytes) => {
                    resolved_bytes.insert(name, bytes);
                }
                Err(e) => failures.push((name, e)),
            }
        }
        for ph in &outcome.placeholders {
            if !resolved_bytes.contains_key(&ph.name)
                && !failures.iter().any(|(name, _)| name == &ph.name)
            {
                failures.push((
                    ph.name.clone(),
                    SourceError::Fetch("resolution did not settle".to_string()),
                ));
            }
        }
        if !failures.is_empty() {
            return Err(DocxError::SourceResolution(failures));
        }

        let mut resolved: Vec<ResolvedImage> = Vec::with_capacity(outcome.placeholders.len());
        for ph in &outcome.placeholders {
            let bytes = resolved_bytes
                .remove(&ph.name)
                .ok_or_else(|| DocxError::PackagePartMissing(ph.name.clone()))?;

            match ImageFormat::detect_from_bytes(&bytes) {
                Some(format) if !format.matches_declared(&ph.image_type) => warn!(
                    name = ph.name.as_str(),
                    declared = ph.image_type.as_str(),
                    detected = format.extension(),
                    "image signature disagrees with declared type"
                ),
                None => warn!(
                    name = ph.name.as_str(),
                    "image bytes carry no recognized signature"
                ),
                _ => {}
            }

            resolved.push(ResolvedImage {
                name: ph.name.clone(),
                image_type: ph.image_type.clone(),
                bytes,
            });
        }

        let plan = media::register(&self.opc, &document_partname, resolved)?;

        let assignments: HashMap<String, String> = plan
            .images
            .iter()
            .map(|planned| (planned.name.clone(), planned.r_id.clone()))
            .collect();
        let doc_pr_start = drawing::max_doc_pr_id(&outcome.xml) + 1;
        let (spliced_xml, occurrences_replaced) =
            drawing::splice(&outcome.xml, &assignments, doc_pr_start)?;

        // Commit: everything below is infallible mutation of owned state.
        let images_added = plan.images.len() as u32;
        let mut relationships: Vec<(String, String)> = Vec::with_capacity(plan.images.len());
        for planned in plan.images {
            relationships.push((planned.target_ref, planned.r_id));
            self.opc.add_part(Box::new(BlobPart::new(
                planned.partname,
                planned.content_type,
                planned.bytes,
            )));
        }
        for (partname, content_type) in plan.overrides {
            self.opc
                .content_types_mut()
                .add_override(partname, content_type);
        }
        let document_part = self.opc.get_part_mut(&document_partname)?;
        for (target_ref, r_id) in relationships {
            document_part.rels_mut().add_relationship(
                relationship_type::IMAGE.to_string(),
                target_ref,
                r_id,
                false,
            );
        }
        document_part.set_blob(spliced_xml.into_bytes());

        Ok(InsertReport {
            images_added,
            occurrences_replaced,
            malformed_skipped: outcome.malformed_skipped,
        })
    }

    /// Serialize the package to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.opc.to_bytes()?)
    }

    /// Save the package to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        Ok(self.opc.save(path)?)
    }

    /// Get the underlying OPC package.
    #[inline]
    pub fn opc_package(&self) -> &OpcPackage {
        &self.opc
    }
}
