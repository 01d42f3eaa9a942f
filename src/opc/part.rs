use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::PackURI;
use crate::opc::rel::Relationships;
/// Open Packaging Convention (OPC) objects related to package parts.
///
/// This module provides the Part trait and its implementations for representing
/// parts within an OPC package. Parts are the fundamental units of content in an
/// OPC package, each with a unique partname, content type, and optional relationships.

/// Trait representing a part in an OPC package.
pub trait Part {
    /// Get the partname of this part.
    fn partname(&self) -> &PackURI;

    /// Get the content type of this part.
    fn content_type(&self) -> &str;

    /// Get the binary content of this part.
    fn blob(&self) -> &[u8];

    /// Replace the binary content of this part.
    fn set_blob(&mut self, blob: Vec<u8>);

    /// Get the relationships for this part.
    fn rels(&self) -> &Relationships;

    /// Get mutable access to the relationships for this part.
    fn rels_mut(&mut self) -> &mut Relationships;

    /// Get the target reference for a relationship ID.
    fn target_ref(&self, r_id: &str) -> Result<&str> {
        self.rels()
            .get(r_id)
            .map(|rel| rel.target_ref())
            .ok_or_else(|| OpcError::RelationshipNotFound(format!("rId: {}", r_id)))
    }
}

/// A basic implementation of a Part that stores binary content.
///
/// This is the default part type for non-XML content such as images.
#[derive(Debug)]
pub struct BlobPart {
    /// The partname (URI) of this part
    partname: PackURI,

    /// The content type of this part
    content_type: String,

    /// The binary content of this part
    blob: Vec<u8>,

    /// Relationships from this part to other parts
    rels: Relationships,
}

impl BlobPart {
    /// Create a new BlobPart.
    pub fn new(partname: PackURI, content_type: String, blob: Vec<u8>) -> Self {
        let rels = Relationships::new(partname.base_uri().to_string());
        Self {
            partname,
            content_type,
            blob,
            rels,
        }
    }
}

impl Part for BlobPart {
    fn partname(&self) -> &PackURI {
        &self.partname
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn blob(&self) -> &[u8] {
        &self.blob
    }

    fn set_blob(&mut self, blob: Vec<u8>) {
        self.blob = blob;
    }

    fn rels(&self) -> &Relationships {
        &self.rels
    }

    fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }
}

/// An XML part.
///
/// Stores the raw XML as UTF-8 bytes, validated at load time so downstream
/// consumers can borrow the content as &str without re-checking.
#[derive(Debug)]
pub struct XmlPart {
    /// The partname (URI) of this part
    partname: PackURI,

    /// The content type of this part
    content_type: String,

    /// The XML content as raw bytes (UTF-8 validated)
    xml_bytes: Vec<u8>,

    /// Relationships from this part to other parts
    rels: Relationships,
}

impl XmlPart {
    /// Load an XML part from raw data.
    ///
    /// Returns an error if the bytes are not valid UTF-8.
    pub fn load(partname: PackURI, content_type: String, xml_bytes: Vec<u8>) -> Result<Self> {
        std::str::from_utf8(&xml_bytes)
            .map_err(|e| OpcError::XmlError(format!("Invalid UTF-8 in XML: {}", e)))?;

        let rels = Relationships::new(partname.base_uri().to_string());
        Ok(Self {
            partname,
            content_type,
            xml_bytes,
            rels,
        })
    }

    /// Get the XML content as a UTF-8 string.
    pub fn xml_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.xml_bytes).map_err(Into::into)
    }
}

impl Part for XmlPart {
    fn partname(&self) -> &PackURI {
        &self.partname
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn blob(&self) -> &[u8] {
        &self.xml_bytes
    }

    fn set_blob(&mut self, blob: Vec<u8>) {
        self.xml_bytes = blob;
    }

    fn rels(&self) -> &Relationships {
        &self.rels
    }

    fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }
}

/// Factory for creating Part instances based on content type.
pub struct PartFactory;

impl PartFactory {
    /// Load a part from raw data, selecting the Part type by content type.
    pub fn load(partname: PackURI, content_type: String, blob: Vec<u8>) -> Result<Box<dyn Part>> {
        if Self::is_xml_content_type(&content_type) {
            Ok(Box::new(XmlPart::load(partname, content_type, blob)?))
        } else {
            Ok(Box::new(BlobPart::new(partname, content_type, blob)))
        }
    }

    /// Check if a content type represents XML content.
    #[inline]
    fn is_xml_content_type(content_type: &str) -> bool {
        content_type.ends_with("+xml") || content_type.ends_with("/xml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_part() {
        let partname = PackURI::new("/word/media/image1.png").unwrap();
        let content = vec![0x89, 0x50, 0x4E, 0x47];
        let part = BlobPart::new(partname, "image/png".to_string(), content.clone());

        assert_eq!(part.content_type(), "image/png");
        assert_eq!(part.blob(), content.as_slice());
    }

    #[test]
    fn test_xml_part_rejects_invalid_utf8() {
        let partname = PackURI::new("/word/document.xml").unwrap();
        let result = XmlPart::load(partname, "application/xml".to_string(), vec![0xFF, 0xFE]);
        assert!(result.is_err());
    }

    #[test]
    fn test_set_blob() {
        let partname = PackURI::new("/word/document.xml").unwrap();
        let mut part =
            XmlPart::load(partname, "application/xml".to_string(), b"<a/>".to_vec()).unwrap();
        part.set_blob(b"<b/>".to_vec());
        assert_eq!(part.blob(), b"<b/>");
    }

    #[test]
    fn test_is_xml_content_type() {
        assert!(PartFactory::is_xml_content_type("application/xml"));
        assert!(PartFactory::is_xml_content_type(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"
        ));
        assert!(!PartFactory::is_xml_content_type("image/png"));
    }
}
