//! Package writer for OPC packages.
//!
//! This module provides functionality to serialize and write OPC packages,
//! including writing the [Content_Types].xml, relationships, and all parts.

use crate::opc::error::{OpcError, Result};
use crate::opc::package::OpcPackage;
use crate::opc::packuri::{CONTENT_TYPES_URI, PACKAGE_URI, PackURI};
use crate::opc::phys_pkg::PhysPkgWriter;
use std::path::Path;

/// Package writer that serializes an OPC package to a ZIP archive.
///
/// This is the main entry point for saving packages. It handles writing:
/// - [Content_Types].xml
/// - _rels/.rels (package relationships)
/// - All parts and their relationships
pub struct PackageWriter;

impl PackageWriter {
    /// Write an OPC package to a file.
    pub fn write<P: AsRef<Path>>(path: P, package: &OpcPackage) -> Result<()> {
        let bytes = Self::to_bytes(package)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Write an OPC package to a stream.
    pub fn write_to_stream<W: std::io::Write>(mut writer: W, package: &OpcPackage) -> Result<()> {
        let bytes = Self::to_bytes(package)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Serialize an OPC package to bytes.
    ///
    /// Every internal relationship target is checked against the part map
    /// before any member is written, so a package with a dangling reference
    /// fails fast instead of producing an archive other readers reject.
    pub fn to_bytes(package: &OpcPackage) -> Result<Vec<u8>> {
        Self::verify_rel_targets(package)?;

        let mut phys_writer = PhysPkgWriter::new();

        Self::write_content_types(&mut phys_writer, package)?;
        Self::write_pkg_rels(&mut phys_writer, package)?;
        Self::write_parts(&mut phys_writer, package)?;

        phys_writer.finish()
    }

    /// Check that every internal relationship resolves to a present part.
    fn verify_rel_targets(package: &OpcPackage) -> Result<()> {
        let sources = std::iter::once(package.rels())
            .chain(package.iter_parts().map(|part| part.rels()));

        for rels in sources {
            for rel in rels.iter().filter(|rel| !rel.is_external()) {
                let target = rel.target_partname()?;
                if !package.contains_part(&target) {
                    return Err(OpcError::InvalidRelationship(format!(
                        "Relationship '{}' targets missing part '{}'",
                        rel.r_id(),
                        target
                    )));
                }
            }
        }

        Ok(())
    }

    /// Write the [Content_Types].xml part.
    ///
    /// Serializes the content type map carried by the package, so Default
    /// declarations loaded from the source document survive a save even when
    /// no part currently uses them.
    fn write_content_types(phys_writer: &mut PhysPkgWriter, package: &OpcPackage) -> Result<()> {
        let blob = Self::content_types_xml(package);

        let content_types_uri =
            PackURI::new(CONTENT_TYPES_URI).map_err(OpcError::InvalidPackUri)?;
        phys_writer.write(&content_types_uri, blob.as_bytes())?;

        Ok(())
    }

    /// Generate the XML for [Content_Types].xml.
    fn content_types_xml(package: &OpcPackage) -> String {
        let content_types = package.content_types();
        let mut xml = String::with_capacity(4096);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        xml.push('\n');

        for (ext, content_type) in content_types.sorted_defaults() {
            xml.push_str(&format!(
                r#"  <Default Extension="{}" ContentType="{}"/>"#,
                Self::escape_xml(ext),
                Self::escape_xml(content_type)
            ));
            xml.push('\n');
        }

        for (partname, content_type) in content_types.sorted_overrides() {
            xml.push_str(&format!(
                r#"  <Override PartName="{}" ContentType="{}"/>"#,
                Self::escape_xml(partname),
                Self::escape_xml(content_type)
            ));
            xml.push('\n');
        }

        xml.push_str("</Types>");

        xml
    }

    /// Write package-level relationships.
    fn write_pkg_rels(phys_writer: &mut PhysPkgWriter, package: &OpcPackage) -> Result<()> {
        let package_uri = PackURI::new(PACKAGE_URI).map_err(OpcError::InvalidPackUri)?;
        let rels_uri = package_uri.rels_uri().map_err(OpcError::InvalidPackUri)?;
        let rels_xml = package.rels().to_xml();
        phys_writer.write(&rels_uri, rels_xml.as_bytes())?;

        Ok(())
    }

    /// Write all parts and their relationships.
    fn write_parts(phys_writer: &mut PhysPkgWriter, package: &OpcPackage) -> Result<()> {
        let mut partnames: Vec<&PackURI> =
            package.iter_parts().map(|part| part.partname()).collect();
        partnames.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        for partname in partnames {
            let part = package.get_part(partname)?;
            phys_writer.write(part.partname(), part.blob())?;

            if !part.rels().is_empty() {
                let rels_uri = part
                    .partname()
                    .rels_uri()
                    .map_err(OpcError::InvalidPackUri)?;
                let rels_xml = part.rels().to_xml();
                phys_writer.write(&rels_uri, rels_xml.as_bytes())?;
            }
        }

        Ok(())
    }

    /// Escape XML special characters.
    #[inline]
    fn escape_xml(s: &str) -> String {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::constants::{content_type as ct, relationship_type};
    use crate::opc::part::BlobPart;

    #[test]
    fn test_content_types_xml() {
        let mut pkg = OpcPackage::new();
        pkg.content_types_mut()
            .add_default("png".to_string(), ct::PNG.to_string());
        pkg.content_types_mut().add_override(
            "/word/document.xml".to_string(),
            ct::WML_DOCUMENT_MAIN.to_string(),
        );

        let xml = PackageWriter::content_types_xml(&pkg);

        assert!(xml.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
        assert!(xml.contains(r#"<Override PartName="/word/document.xml""#));

        // Defaults precede overrides
        let default_pos = xml.find("<Default").unwrap();
        let override_pos = xml.find("<Override").unwrap();
        assert!(default_pos < override_pos);
    }

    #[test]
    fn test_dangling_relationship_rejected() {
        let mut pkg = OpcPackage::new();
        pkg.rels_mut().add_relationship(
            relationship_type::OFFICE_DOCUMENT.to_string(),
            "word/document.xml".to_string(),
            "rId1".to_string(),
            false,
        );

        assert!(matches!(
            PackageWriter::to_bytes(&pkg),
            Err(OpcError::InvalidRelationship(_))
        ));
    }

    #[test]
    fn test_external_relationship_needs_no_part() {
        let mut pkg = OpcPackage::new();
        pkg.rels_mut().add_relationship(
            relationship_type::HYPERLINK.to_string(),
            "https://example.com".to_string(),
            "rId1".to_string(),
            true,
        );

        assert!(PackageWriter::to_bytes(&pkg).is_ok());
    }

    #[test]
    fn test_parts_written_in_partname_order() {
        let mut pkg = OpcPackage::new();
        for name in ["/word/b.bin", "/word/a.bin"] {
            let partname = PackURI::new(name).unwrap();
            pkg.add_part(Box::new(BlobPart::new(
                partname,
                "application/octet-stream".to_string(),
                vec![0u8],
            )));
        }

        let bytes = PackageWriter::to_bytes(&pkg).unwrap();

        let mut reader =
            crate::opc::phys_pkg::PhysPkgReader::from_bytes(bytes).unwrap();
        assert!(reader.contains(&PackURI::new("/word/a.bin").unwrap()));
        assert!(reader.contains(&PackURI::new("/word/b.bin").unwrap()));
        assert_eq!(
            reader
                .blob_for(&PackURI::new("/word/a.bin").unwrap())
                .unwrap(),
            vec![0u8]
        );
    }

    #[test]
    fn test_escape_xml() {
        let escaped = PackageWriter::escape_xml(r#"<foo & "bar">"#);
        assert_eq!(escaped, "&lt;foo &amp; &quot;bar&quot;&gt;");
    }
}
