//! Objects that implement reading and writing OPC packages.
//!
//! This module provides the main OpcPackage type, which represents an Open
//! Packaging Convention package in memory. It manages parts, relationships,
//! and the content type declarations carried by [Content_Types].xml.

use crate::opc::constants::{content_type as ct, relationship_type};
use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::{PACKAGE_URI, PackURI};
use crate::opc::part::{Part, PartFactory};
use crate::opc::phys_pkg::PhysPkgReader;
use crate::opc::pkgreader::{ContentTypeMap, PackageReader};
use crate::opc::pkgwriter::PackageWriter;
use crate::opc::rel::Relationships;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;

/// Main API class for working with OPC packages.
///
/// OpcPackage represents an Open Packaging Convention package in memory,
/// providing access to parts, relationships, and package-level operations.
/// The content type map loaded from the source archive is kept alongside the
/// parts so the package round-trips its declarations on save.
pub struct OpcPackage {
    /// Package-level relationships
    rels: Relationships,

    /// All parts in the package, indexed by partname
    parts: HashMap<String, Box<dyn Part>>,

    /// Default and Override declarations from [Content_Types].xml
    content_types: ContentTypeMap,
}

impl OpcPackage {
    /// Create a new empty OPC package.
    ///
    /// The content type map starts with the Default declarations every OPC
    /// package carries, for .rels and .xml members.
    pub fn new() -> Self {
        let mut content_types = ContentTypeMap::new();
        content_types.add_default("rels".to_string(), ct::OPC_RELATIONSHIPS.to_string());
        content_types.add_default("xml".to_string(), ct::XML.to_string());

        Self {
            rels: Relationships::new(PACKAGE_URI.to_string()),
            parts: HashMap::new(),
            content_types,
        }
    }

    /// Open an OPC package from a file.
    ///
    /// # Arguments
    /// * `path` - Path to the package file (.docx, .xlsx, .pptx, etc.)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut phys_reader = PhysPkgReader::open(path)?;
        Self::from_phys_reader(&mut phys_reader)
    }

    /// Load an OPC package from a reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut phys_reader = PhysPkgReader::new(reader)?;
        Self::from_phys_reader(&mut phys_reader)
    }

    /// Load an OPC package from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mut phys_reader = PhysPkgReader::from_bytes(data)?;
        Self::from_phys_reader(&mut phys_reader)
    }

    /// Load an OPC package from a physical package reader.
    fn from_phys_reader<R: Read + Seek>(phys_reader: &mut PhysPkgReader<R>) -> Result<Self> {
        let pkg_reader = PackageReader::from_phys_reader(phys_reader)?;
        Self::unmarshal(pkg_reader)
    }

    /// Unmarshal a package from a package reader.
    ///
    /// This is the main deserialization logic that converts serialized parts
    /// and relationships into the in-memory object graph.
    fn unmarshal(mut pkg_reader: PackageReader) -> Result<Self> {
        let mut package = Self::new();

        for srel in pkg_reader.pkg_srels() {
            package.rels.add_relationship(
                srel.reltype.clone(),
                srel.target_ref.clone(),
                srel.r_id.clone(),
                srel.is_external(),
            );
        }

        for spart in pkg_reader.take_sparts() {
            let mut part =
                PartFactory::load(spart.partname, spart.content_type, spart.blob)?;

            for srel in spart.srels {
                let is_external = srel.is_external();
                part.rels_mut().add_relationship(
                    srel.reltype,
                    srel.target_ref,
                    srel.r_id,
                    is_external,
                );
            }

            package.parts.insert(part.partname().to_string(), part);
        }

        package.content_types = pkg_reader.take_content_types();
        Ok(package)
    }

    /// Get the partname of the main document part.
    ///
    /// Resolved through the package-level officeDocument relationship, so it
    /// works whatever directory layout the producer chose.
    pub fn main_document_partname(&self) -> Result<PackURI> {
        let rel = self
            .rels
            .part_with_reltype(relationship_type::OFFICE_DOCUMENT)?;
        rel.target_partname()
    }

    /// Get a reference to the main document part.
    ///
    /// For Word documents, this is the document.xml part.
    pub fn main_document_part(&self) -> Result<&dyn Part> {
        let partname = self.main_document_partname()?;
        self.get_part(&partname)
    }

    /// Get a part by its partname.
    pub fn get_part(&self, partname: &PackURI) -> Result<&dyn Part> {
        self.parts
            .get(partname.as_str())
            .map(|b| &**b as &dyn Part)
            .ok_or_else(|| OpcError::PartNotFound(partname.to_string()))
    }

    /// Get a mutable reference to a part by its partname.
    pub fn get_part_mut(&mut self, partname: &PackURI) -> Result<&mut dyn Part> {
        self.parts
            .get_mut(partname.as_str())
            .map(|b| &mut **b as &mut dyn Part)
            .ok_or_else(|| OpcError::PartNotFound(partname.to_string()))
    }

    /// Add a new part to the package.
    pub fn add_part(&mut self, part: Box<dyn Part>) {
        let partname = part.partname().to_string();
        self.parts.insert(partname, part);
    }

    /// Get an iterator over all parts in the package.
    pub fn iter_parts(&self) -> impl Iterator<Item = &dyn Part> {
        self.parts.values().map(|b| &**b as &dyn Part)
    }

    /// Get the number of parts in the package.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Check if a part exists in the package.
    pub fn contains_part(&self, partname: &PackURI) -> bool {
        self.parts.contains_key(partname.as_str())
    }

    /// Get a reference to the package-level relationships.
    pub fn rels(&self) -> &Relationships {
        &self.rels
    }

    /// Get a mutable reference to the package-level relationships.
    pub fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    /// Get a reference to the content type declarations.
    pub fn content_types(&self) -> &ContentTypeMap {
        &self.content_types
    }

    /// Get a mutable reference to the content type declarations.
    pub fn content_types_mut(&mut self) -> &mut ContentTypeMap {
        &mut self.content_types
    }

    /// Get the highest numeric index among media parts with the given
    /// extension, or 0 when none exist.
    ///
    /// Counts only parts under a media directory whose filename carries a
    /// numeric suffix, so "/word/media/image3.png" contributes 3 while
    /// "/word/media/logo.png" contributes nothing. New media partnames are
    /// numbered one past this value; indexes freed by removed parts are
    /// never reissued.
    pub fn max_media_index(&self, ext: &str) -> u32 {
        self.parts
            .values()
            .filter_map(|part| {
                let partname = part.partname();
                if partname.base_uri().ends_with("/media")
                    && partname.ext().eq_ignore_ascii_case(ext)
                {
                    partname.idx()
                } else {
                    None
                }
            })
            .max()
            .unwrap_or(0)
    }

    /// Serialize the package to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        PackageWriter::to_bytes(self)
    }

    /// Save the package to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        PackageWriter::write(path, self)
    }
}

impl Default for OpcPackage {
    fn default() -> Self {
        Self::new()
    }
}
