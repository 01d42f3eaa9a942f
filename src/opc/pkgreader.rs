//! Low-level, read-only API to a serialized Open Packaging Convention (OPC) package.
//!
//! This module provides the PackageReader for parsing OPC packages, including
//! content type mapping and relationship resolution. Every archive member
//! becomes a serialized part, so a package that is loaded and immediately
//! saved round-trips without losing members the loader never interpreted.

use crate::opc::constants::target_mode;
use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::{CONTENT_TYPES_URI, PACKAGE_URI, PackURI};
use crate::opc::phys_pkg::PhysPkgReader;
use quick_xml::Reader;
use quick_xml::events::Event;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::io::{Read, Seek};

/// Serialized part with its content and relationships.
///
/// Represents a part as loaded from the physical package, before
/// being converted into a Part object.
#[derive(Debug)]
pub struct SerializedPart {
    /// The partname (URI) of this part
    pub partname: PackURI,

    /// The content type of this part
    pub content_type: String,

    /// The binary content of this part
    pub blob: Vec<u8>,

    /// Serialized relationships from this part
    pub srels: SmallVec<[SerializedRelationship; 8]>,
}

/// Serialized relationship as read from a .rels file.
#[derive(Debug, Clone)]
pub struct SerializedRelationship {
    /// Base URI for resolving relative references
    pub base_uri: String,

    /// Relationship ID (e.g., "rId1")
    pub r_id: String,

    /// Relationship type URI
    pub reltype: String,

    /// Target reference (relative URI or external URL)
    pub target_ref: String,

    /// Target mode (Internal or External)
    pub target_mode: String,
}

impl SerializedRelationship {
    /// Check if this is an external relationship.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.target_mode == target_mode::EXTERNAL
    }
}

/// Content type map for looking up content types by part name or extension.
///
/// Implements the OPC content type discovery algorithm using Default and
/// Override elements from [Content_Types].xml. Override wins over Default;
/// Default matching is case-insensitive on the extension.
#[derive(Debug, Default)]
pub struct ContentTypeMap {
    /// Maps file extensions to default content types
    defaults: HashMap<String, String>,

    /// Maps specific partnames to override content types
    overrides: HashMap<String, String>,
}

impl ContentTypeMap {
    /// Create a new empty content type map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse content types from [Content_Types].xml.
    pub fn from_xml(xml: &[u8]) -> Result<Self> {
        let mut map = Self::new();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                    b"Default" => {
                        // <Default Extension="xml" ContentType="application/xml"/>
                        let mut extension = None;
                        let mut content_type = None;

                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"Extension" => {
                                    extension = Some(attr.unescape_value()?.to_string());
                                }
                                b"ContentType" => {
                                    content_type = Some(attr.unescape_value()?.to_string());
                                }
                                _ => {}
                            }
                        }

                        if let (Some(ext), Some(ct)) = (extension, content_type) {
                            map.add_default(ext, ct);
                        }
                    }
                    b"Override" => {
                        // <Override PartName="/word/document.xml" ContentType="..."/>
                        let mut partname = None;
                        let mut content_type = None;

                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"PartName" => {
                                    partname = Some(attr.unescape_value()?.to_string());
                                }
                                b"ContentType" => {
                                    content_type = Some(attr.unescape_value()?.to_string());
                                }
                                _ => {}
                            }
                        }

                        if let (Some(pn), Some(ct)) = (partname, content_type) {
                            map.add_override(pn, ct);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(OpcError::XmlError(format!(
                        "Content types parse error: {}",
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(map)
    }

    /// Add a default content type mapping for a file extension.
    pub fn add_default(&mut self, extension: String, content_type: String) {
        self.defaults.insert(extension.to_lowercase(), content_type);
    }

    /// Add an override content type mapping for a specific partname.
    ///
    /// Adding a partname that already has an override is a no-op, so staged
    /// registrations can be replayed without producing duplicates.
    pub fn add_override(&mut self, partname: String, content_type: String) {
        self.overrides.entry(partname).or_insert(content_type);
    }

    /// Check whether an extension has a Default declaration.
    pub fn has_default(&self, extension: &str) -> bool {
        self.defaults.contains_key(&extension.to_lowercase())
    }

    /// Check whether a partname has an Override declaration.
    pub fn has_override(&self, partname: &str) -> bool {
        self.overrides.contains_key(partname)
    }

    /// Get the content type for a partname.
    ///
    /// Checks for an override first, then falls back to the extension
    /// default.
    pub fn get(&self, pack_uri: &PackURI) -> Result<String> {
        if let Some(ct) = self.overrides.get(pack_uri.as_str()) {
            return Ok(ct.clone());
        }

        if let Some(ct) = self.defaults.get(&pack_uri.ext().to_lowercase()) {
            return Ok(ct.clone());
        }

        Err(OpcError::ContentTypeNotFound(pack_uri.to_string()))
    }

    /// Default declarations sorted by extension.
    pub fn sorted_defaults(&self) -> Vec<(&str, &str)> {
        let mut items: Vec<(&str, &str)> = self
            .defaults
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        items.sort_unstable();
        items
    }

    /// Override declarations sorted by partname.
    pub fn sorted_overrides(&self) -> Vec<(&str, &str)> {
        let mut items: Vec<(&str, &str)> = self
            .overrides
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        items.sort_unstable();
        items
    }
}

/// Package reader that provides access to serialized parts and relationships.
///
/// This is the main entry point for reading OPC packages. It parses
/// [Content_Types].xml and the package-level .rels, then loads every archive
/// member (other than the content types part and .rels files) as a part.
pub struct PackageReader {
    /// Parsed content type declarations
    content_types: ContentTypeMap,

    /// Package-level relationships
    pkg_srels: SmallVec<[SerializedRelationship; 8]>,

    /// All serialized parts in the package
    sparts: Vec<SerializedPart>,
}

impl PackageReader {
    /// Read an OPC package through a physical package reader.
    pub fn from_phys_reader<R: Read + Seek>(phys_reader: &mut PhysPkgReader<R>) -> Result<Self> {
        let content_types = ContentTypeMap::from_xml(&phys_reader.content_types_xml()?)?;

        let package_uri = PackURI::new(PACKAGE_URI).map_err(OpcError::InvalidPackUri)?;
        let pkg_srels = Self::load_rels(phys_reader, &package_uri)?;

        let mut sparts = Vec::with_capacity(phys_reader.len());
        for membername in phys_reader.member_names() {
            if Self::is_structural_member(&membername) {
                continue;
            }

            let partname =
                PackURI::new(format!("/{}", membername)).map_err(OpcError::InvalidPackUri)?;
            let content_type = content_types.get(&partname)?;
            let blob = phys_reader.blob_for(&partname)?;
            let srels = Self::load_rels(phys_reader, &partname)?;

            sparts.push(SerializedPart {
                partname,
                content_type,
                blob,
                srels,
            });
        }

        Ok(Self {
            content_types,
            pkg_srels,
            sparts,
        })
    }

    /// Members that describe package structure rather than content:
    /// [Content_Types].xml and .rels files.
    fn is_structural_member(membername: &str) -> bool {
        format!("/{}", membername) == CONTENT_TYPES_URI
            || membername.starts_with("_rels/")
            || membername.contains("/_rels/")
    }

    /// Load and parse the .rels file for a source URI, if present.
    fn load_rels<R: Read + Seek>(
        phys_reader: &mut PhysPkgReader<R>,
        source_uri: &PackURI,
    ) -> Result<SmallVec<[SerializedRelationship; 8]>> {
        match phys_reader.rels_xml_for(source_uri)? {
            Some(xml) => Self::parse_rels_xml(&xml, source_uri.base_uri()),
            None => Ok(SmallVec::new()),
        }
    }

    /// Parse relationships XML into SerializedRelationship structs.
    fn parse_rels_xml(
        rels_xml: &[u8],
        base_uri: &str,
    ) -> Result<SmallVec<[SerializedRelationship; 8]>> {
        let mut srels = SmallVec::new();
        let mut reader = Reader::from_reader(rels_xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    if e.local_name().as_ref() == b"Relationship" {
                        let mut r_id = None;
                        let mut reltype = None;
                        let mut target_ref = None;
                        let mut target_mode = target_mode::INTERNAL.to_string();

                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"Id" => r_id = Some(attr.unescape_value()?.to_string()),
                                b"Type" => reltype = Some(attr.unescape_value()?.to_string()),
                                b"Target" => target_ref = Some(attr.unescape_value()?.to_string()),
                                b"TargetMode" => target_mode = attr.unescape_value()?.to_string(),
                                _ => {}
                            }
                        }

                        if let (Some(id), Some(rt), Some(tr)) = (r_id, reltype, target_ref) {
                            srels.push(SerializedRelationship {
                                base_uri: base_uri.to_string(),
                                r_id: id,
                                reltype: rt,
                                target_ref: tr,
                                target_mode,
                            });
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(OpcError::XmlError(format!("Rels parse error: {}", e))),
                _ => {}
            }
            buf.clear();
        }

        Ok(srels)
    }

    /// Get an iterator over all serialized parts.
    pub fn iter_sparts(&self) -> impl Iterator<Item = &SerializedPart> {
        self.sparts.iter()
    }

    /// Get package-level relationships.
    pub fn pkg_srels(&self) -> &[SerializedRelationship] {
        &self.pkg_srels
    }

    /// Take ownership of all serialized parts.
    pub fn take_sparts(&mut self) -> Vec<SerializedPart> {
        std::mem::take(&mut self.sparts)
    }

    /// Take ownership of the content type map.
    pub fn take_content_types(&mut self) -> ContentTypeMap {
        std::mem::take(&mut self.content_types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_map() {
        let xml = br#"<?xml version="1.0"?>
            <Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
                <Default Extension="xml" ContentType="application/xml"/>
                <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
                <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
            </Types>"#;

        let ct_map = ContentTypeMap::from_xml(xml).unwrap();

        let uri = PackURI::new("/test.xml").unwrap();
        assert_eq!(ct_map.get(&uri).unwrap(), "application/xml");

        let uri = PackURI::new("/word/document.xml").unwrap();
        assert_eq!(
            ct_map.get(&uri).unwrap(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"
        );
    }

    #[test]
    fn test_content_type_not_found() {
        let ct_map = ContentTypeMap::new();
        let uri = PackURI::new("/word/media/image1.png").unwrap();
        assert!(matches!(
            ct_map.get(&uri),
            Err(OpcError::ContentTypeNotFound(_))
        ));
    }

    #[test]
    fn test_override_is_idempotent() {
        let mut ct_map = ContentTypeMap::new();
        ct_map.add_override("/word/media/image1.png".to_string(), "image/png".to_string());
        ct_map.add_override("/word/media/image1.png".to_string(), "image/gif".to_string());

        let uri = PackURI::new("/word/media/image1.png").unwrap();
        assert_eq!(ct_map.get(&uri).unwrap(), "image/png");
        assert_eq!(ct_map.sorted_overrides().len(), 1);
    }

    #[test]
    fn test_default_extension_case_insensitive() {
        let mut ct_map = ContentTypeMap::new();
        ct_map.add_default("PNG".to_string(), "image/png".to_string());

        let uri = PackURI::new("/word/media/image1.png").unwrap();
        assert_eq!(ct_map.get(&uri).unwrap(), "image/png");
        assert!(ct_map.has_default("png"));
    }

    #[test]
    fn test_parse_rels_xml() {
        let xml = br#"<?xml version="1.0"?>
            <Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
                <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
                <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
            </Relationships>"#;

        let srels = PackageReader::parse_rels_xml(xml, "/").unwrap();
        assert_eq!(srels.len(), 2);
        assert!(!srels[0].is_external());
        assert!(srels[1].is_external());
    }

    #[test]
    fn test_is_structural_member() {
        assert!(PackageReader::is_structural_member("[Content_Types].xml"));
        assert!(PackageReader::is_structural_member("_rels/.rels"));
        assert!(PackageReader::is_structural_member(
            "word/_rels/document.xml.rels"
        ));
        assert!(!PackageReader::is_structural_member("word/document.xml"));
        assert!(!PackageReader::is_structural_member("word/media/image1.png"));
    }
}
