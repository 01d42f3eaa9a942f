//! Provides a general interface to a physical OPC package (ZIP file).
//!
//! This module handles the low-level reading and writing of OPC packages as
//! ZIP archives. Reading loads members into memory on demand; writing
//! produces a deflated in-memory archive.

use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::{CONTENT_TYPES_URI, PackURI};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Physical package reader that provides access to members of a ZIP-based
/// OPC package.
pub struct PhysPkgReader<R: Read + Seek> {
    /// The underlying ZIP archive
    archive: ZipArchive<R>,
}

impl PhysPkgReader<std::fs::File> {
    /// Open an OPC package from a file path.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or isn't a valid ZIP
    /// archive.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(OpcError::PackageNotFound(path.display().to_string()));
        }

        let file = std::fs::File::open(path)?;
        Self::new(file)
    }
}

impl PhysPkgReader<Cursor<Vec<u8>>> {
    /// Create a reader over an in-memory archive.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::new(Cursor::new(data))
    }
}

impl<R: Read + Seek> PhysPkgReader<R> {
    /// Create a new PhysPkgReader from a seekable reader.
    pub fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader)?;
        Ok(Self { archive })
    }

    /// Get the binary content for a part by its PackURI.
    pub fn blob_for(&mut self, pack_uri: &PackURI) -> Result<Vec<u8>> {
        let membername = pack_uri.membername().to_string();

        let mut member = match self.archive.by_name(&membername) {
            Ok(member) => member,
            Err(ZipError::FileNotFound) => {
                return Err(OpcError::PartNotFound(pack_uri.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut blob = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut blob)?;
        Ok(blob)
    }

    /// Get the [Content_Types].xml content.
    ///
    /// This is a required part of every OPC package; its absence means the
    /// archive is not an OPC package at all.
    pub fn content_types_xml(&mut self) -> Result<Vec<u8>> {
        let content_types_uri = PackURI::new(CONTENT_TYPES_URI).map_err(OpcError::InvalidPackUri)?;
        self.blob_for(&content_types_uri)
    }

    /// Get the relationships XML for a specific source URI.
    ///
    /// Returns None if the source has no relationships file.
    pub fn rels_xml_for(&mut self, source_uri: &PackURI) -> Result<Option<Vec<u8>>> {
        let rels_uri = source_uri.rels_uri().map_err(OpcError::InvalidPackUri)?;

        match self.blob_for(&rels_uri) {
            Ok(blob) => Ok(Some(blob)),
            Err(OpcError::PartNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List all member names in the package, excluding directory entries.
    pub fn member_names(&self) -> Vec<String> {
        self.archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(String::from)
            .collect()
    }

    /// Check if a specific member exists in the package.
    pub fn contains(&self, pack_uri: &PackURI) -> bool {
        self.archive.index_for_name(pack_uri.membername()).is_some()
    }

    /// Get the number of members in the package.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Check if the package is empty.
    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }
}

/// Physical package writer for creating OPC packages.
///
/// Writes members with Deflate compression into an in-memory archive.
pub struct PhysPkgWriter {
    /// The underlying ZIP archive writer
    archive: ZipWriter<Cursor<Vec<u8>>>,
}

impl PhysPkgWriter {
    /// Create a new package writer that writes to memory.
    pub fn new() -> Self {
        Self {
            archive: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Write a part to the package with Deflate compression.
    pub fn write(&mut self, pack_uri: &PackURI, blob: &[u8]) -> Result<()> {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.archive.start_file(pack_uri.membername(), options)?;
        self.archive.write_all(blob)?;
        Ok(())
    }

    /// Finish writing and return the package bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self.archive.finish()?;
        Ok(cursor.into_inner())
    }
}

impl Default for PhysPkgWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut writer = PhysPkgWriter::new();
        let pack_uri = PackURI::new("/test.txt").unwrap();
        writer.write(&pack_uri, b"Hello, World!").unwrap();
        let zip_data = writer.finish().unwrap();

        let mut reader = PhysPkgReader::from_bytes(zip_data).unwrap();
        let content = reader.blob_for(&pack_uri).unwrap();
        assert_eq!(content, b"Hello, World!");
    }

    #[test]
    fn test_multiple_parts() {
        let mut writer = PhysPkgWriter::new();

        let content_types = PackURI::new("/[Content_Types].xml").unwrap();
        let rels = PackURI::new("/_rels/.rels").unwrap();
        let document = PackURI::new("/word/document.xml").unwrap();

        writer.write(&content_types, b"<Types/>").unwrap();
        writer.write(&rels, b"<Relationships/>").unwrap();
        writer.write(&document, b"<document/>").unwrap();

        let zip_data = writer.finish().unwrap();
        let mut reader = PhysPkgReader::from_bytes(zip_data).unwrap();

        assert!(reader.contains(&content_types));
        assert!(reader.contains(&rels));
        assert!(reader.contains(&document));
        assert_eq!(reader.blob_for(&document).unwrap(), b"<document/>");
    }

    #[test]
    fn test_missing_member() {
        let mut writer = PhysPkgWriter::new();
        let pack_uri = PackURI::new("/present.xml").unwrap();
        writer.write(&pack_uri, b"<a/>").unwrap();
        let zip_data = writer.finish().unwrap();

        let mut reader = PhysPkgReader::from_bytes(zip_data).unwrap();
        let missing = PackURI::new("/absent.xml").unwrap();
        assert!(matches!(
            reader.blob_for(&missing),
            Err(OpcError::PartNotFound(_))
        ));
    }
}
