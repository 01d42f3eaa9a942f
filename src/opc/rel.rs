use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::PackURI;
/// Relationship-related objects for OPC packages.
///
/// This module provides types for managing relationships between parts in an OPC package,
/// including internal and external relationships.
use std::collections::HashMap;

/// A single relationship from a source part to a target.
///
/// Represents a connection between parts in an OPC package, identified by an rId
/// (relationship ID). Can be either internal (pointing to another part) or external
/// (pointing to an external URL).
#[derive(Debug, Clone)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1", "rId2")
    r_id: String,

    /// Relationship type URI
    reltype: String,

    /// Target reference - either a part URI or external URL
    target_ref: String,

    /// Base URI for resolving relative references
    base_uri: String,

    /// Whether this is an external relationship
    is_external: bool,
}

impl Relationship {
    /// Create a new relationship.
    pub fn new(
        r_id: String,
        reltype: String,
        target_ref: String,
        base_uri: String,
        is_external: bool,
    ) -> Self {
        Self {
            r_id,
            reltype,
            target_ref,
            base_uri,
            is_external,
        }
    }

    /// Get the relationship ID.
    #[inline]
    pub fn r_id(&self) -> &str {
        &self.r_id
    }

    /// Get the relationship type.
    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    /// Get the target reference.
    ///
    /// For internal relationships, this is a relative part reference.
    /// For external relationships, this is an absolute URL.
    #[inline]
    pub fn target_ref(&self) -> &str {
        &self.target_ref
    }

    /// Check if this is an external relationship.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.is_external
    }

    /// Get the absolute target partname for internal relationships.
    ///
    /// Returns an error if this is an external relationship.
    pub fn target_partname(&self) -> Result<PackURI> {
        if self.is_external {
            return Err(OpcError::InvalidRelationship(
                "Cannot get target_partname for external relationship".to_string(),
            ));
        }
        PackURI::from_rel_ref(&self.base_uri, &self.target_ref).map_err(OpcError::InvalidPackUri)
    }
}

/// Collection of relationships from a single source.
///
/// Uses a HashMap for O(1) lookup by relationship ID.
#[derive(Debug)]
pub struct Relationships {
    /// Base URI for resolving relative references
    base_uri: String,

    /// Map of relationship ID to Relationship
    rels: HashMap<String, Relationship>,
}

impl Relationships {
    /// Create a new empty relationships collection.
    pub fn new(base_uri: String) -> Self {
        Self {
            base_uri,
            rels: HashMap::new(),
        }
    }

    /// Add a relationship to the collection.
    ///
    /// # Returns
    /// Reference to the newly added relationship
    pub fn add_relationship(
        &mut self,
        reltype: String,
        target_ref: String,
        r_id: String,
        is_external: bool,
    ) -> &Relationship {
        let rel = Relationship::new(
            r_id.clone(),
            reltype,
            target_ref,
            self.base_uri.clone(),
            is_external,
        );
        self.rels.entry(r_id).or_insert(rel)
    }

    /// Get a relationship by its ID.
    #[inline]
    pub fn get(&self, r_id: &str) -> Option<&Relationship> {
        self.rels.get(r_id)
    }

    /// Get or add a relationship to a target part.
    ///
    /// If a relationship of the given type to the target already exists,
    /// returns that relationship. Otherwise, creates a new one with the
    /// next rId.
    pub fn get_or_add(&mut self, reltype: &str, target_ref: &str) -> &Relationship {
        let existing = self
            .rels
            .values()
            .find(|rel| rel.reltype() == reltype && rel.target_ref() == target_ref && !rel.is_external())
            .map(|rel| rel.r_id().to_string());

        match existing {
            // Look up again by id to satisfy the borrow checker
            Some(r_id) => &self.rels[&r_id],
            None => {
                let r_id = self.next_r_id();
                self.add_relationship(reltype.to_string(), target_ref.to_string(), r_id, false)
            }
        }
    }

    /// Get the highest numeric suffix among existing rIds, or 0 when none
    /// follow the "rId<n>" form.
    pub fn max_r_id_suffix(&self) -> u32 {
        self.rels
            .keys()
            .filter_map(|r_id| {
                let bytes = r_id.as_bytes();
                if bytes.len() > 3 && &bytes[..3] == b"rId" {
                    atoi_simd::parse::<u32, false, false>(&bytes[3..]).ok()
                } else {
                    None
                }
            })
            .max()
            .unwrap_or(0)
    }

    /// Get the next relationship ID.
    ///
    /// IDs are strictly increasing: one past the highest numeric suffix in
    /// the collection. Gaps left by deleted relationships are never reused,
    /// so a batch of new ids can be reserved by counting up from
    /// [`max_r_id_suffix`](Self::max_r_id_suffix).
    pub fn next_r_id(&self) -> String {
        format!("rId{}", self.max_r_id_suffix() + 1)
    }

    /// Get the relationship of a specific type.
    ///
    /// Returns an error if no relationship of the type is found,
    /// or if multiple relationships of the type exist.
    pub fn part_with_reltype(&self, reltype: &str) -> Result<&Relationship> {
        let mut matching = self.rels.values().filter(|rel| rel.reltype() == reltype);

        match (matching.next(), matching.next()) {
            (None, _) => Err(OpcError::RelationshipNotFound(format!(
                "No relationship of type '{}'",
                reltype
            ))),
            (Some(rel), None) => Ok(rel),
            (Some(_), Some(_)) => Err(OpcError::InvalidRelationship(format!(
                "Multiple relationships of type '{}'",
                reltype
            ))),
        }
    }

    /// Get an iterator over all relationships.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.values()
    }

    /// Get the number of relationships in the collection.
    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    /// Check if the collection is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    /// Serialize relationships to XML format.
    ///
    /// Generates the XML for a .rels file. Relationships are sorted by their
    /// numeric id suffix so "rId10" follows "rId9" and output is stable.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(1024);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        xml.push('\n');

        let mut rels: Vec<&Relationship> = self.rels.values().collect();
        rels.sort_by_key(|rel| {
            let bytes = rel.r_id().as_bytes();
            let suffix = if bytes.len() > 3 && &bytes[..3] == b"rId" {
                atoi_simd::parse::<u32, false, false>(&bytes[3..]).ok()
            } else {
                None
            };
            (suffix.unwrap_or(u32::MAX), rel.r_id().to_string())
        });

        for rel in rels {
            let target_mode = if rel.is_external() {
                r#" TargetMode="External""#
            } else {
                ""
            };

            xml.push_str(&format!(
                r#"  <Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                Self::escape_xml(rel.r_id()),
                Self::escape_xml(rel.reltype()),
                Self::escape_xml(rel.target_ref()),
                target_mode
            ));
            xml.push('\n');
        }

        xml.push_str("</Relationships>");

        xml
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

impl Default for Relationships {
    fn default() -> Self {
        Self::new("/".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_creation() {
        let rel = Relationship::new(
            "rId1".to_string(),
            "http://example.com/rel".to_string(),
            "target.xml".to_string(),
            "/word".to_string(),
            false,
        );

        assert_eq!(rel.r_id(), "rId1");
        assert_eq!(rel.reltype(), "http://example.com/rel");
        assert!(!rel.is_external());
    }

    #[test]
    fn test_next_r_id_counts_up() {
        let mut rels = Relationships::new("/word".to_string());
        assert_eq!(rels.next_r_id(), "rId1");

        rels.add_relationship(
            "type1".to_string(),
            "target1".to_string(),
            "rId1".to_string(),
            false,
        );
        assert_eq!(rels.next_r_id(), "rId2");
    }

    #[test]
    fn test_next_r_id_never_fills_gaps() {
        let mut rels = Relationships::new("/word".to_string());
        rels.add_relationship(
            "type1".to_string(),
            "target1".to_string(),
            "rId1".to_string(),
            false,
        );
        rels.add_relationship(
            "type2".to_string(),
            "target2".to_string(),
            "rId7".to_string(),
            false,
        );

        assert_eq!(rels.next_r_id(), "rId8");
    }

    #[test]
    fn test_get_or_add() {
        let mut rels = Relationships::new("/word".to_string());

        let r_id1 = rels.get_or_add("type1", "target1").r_id().to_string();
        assert_eq!(r_id1, "rId1");

        // Getting the same relationship should return the same rId
        let r_id2 = rels.get_or_add("type1", "target1").r_id().to_string();
        assert_eq!(r_id2, "rId1");

        // Different target should create a new relationship
        let r_id3 = rels.get_or_add("type1", "target2").r_id().to_string();
        assert_eq!(r_id3, "rId2");
    }

    #[test]
    fn test_to_xml_numeric_order() {
        let mut rels = Relationships::new("/word".to_string());
        for n in [2u32, 10, 1] {
            rels.add_relationship(
                "t".to_string(),
                format!("target{}", n),
                format!("rId{}", n),
                false,
            );
        }

        let xml = rels.to_xml();
        let p1 = xml.find(r#"Id="rId1""#).unwrap();
        let p2 = xml.find(r#"Id="rId2""#).unwrap();
        let p10 = xml.find(r#"Id="rId10""#).unwrap();
        assert!(p1 < p2 && p2 < p10);
    }

    #[test]
    fn test_external_target_mode() {
        let mut rels = Relationships::new("/word".to_string());
        rels.add_relationship(
            "hyperlink".to_string(),
            "https://example.com".to_string(),
            "rId1".to_string(),
            true,
        );

        let xml = rels.to_xml();
        assert!(xml.contains(r#"TargetMode="External""#));
    }
}
