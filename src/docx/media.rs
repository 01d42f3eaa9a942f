//! Media part registration planning.
//!
//! Inserting an image touches four package parts at once. The registrar
//! computes every new identifier and declaration as a plan over the current
//! package state without mutating anything; the orchestrator applies the
//! plan in one step after splicing succeeds, so no observer ever sees a
//! half-registered image.

use crate::docx::error::{DocxError, Result};
use crate::opc::{OpcPackage, PackURI};

/// An image with resolved bytes, ready for registration.
#[derive(Debug)]
pub struct ResolvedImage {
    /// Placeholder variable name
    pub name: String,

    /// Declared image type (extension form, e.g. "png")
    pub image_type: String,

    /// Resolved image bytes
    pub bytes: Vec<u8>,
}

/// One image's planned identity within the package.
#[derive(Debug)]
pub struct PlannedImage {
    /// Placeholder variable name this image serves
    pub name: String,

    /// Relationship id the document part will use to reference the media
    pub r_id: String,

    /// Absolute partname of the new media part
    pub partname: PackURI,

    /// Relationship target relative to the document part
    pub target_ref: String,

    /// Content type recorded for the media part
    pub content_type: String,

    /// Image bytes to store in the media part
    pub bytes: Vec<u8>,
}

/// Staged registration for a batch of images.
#[derive(Debug, Default)]
pub struct RegisterPlan {
    /// New media parts in input order
    pub images: Vec<PlannedImage>,

    /// Content-type overrides to merge, as (partname, content type)
    pub overrides: Vec<(String, String)>,
}

/// Plan the registration of a batch of resolved images.
///
/// Relationship ids continue strictly past the highest numeric suffix
/// already present in the document part's relationships, and media indexes
/// continue past the highest in use for each extension, so a batch of
/// same-type images lands in distinct parts and ids from removed content
/// are never reissued.
pub fn register(
    package: &OpcPackage,
    document_partname: &PackURI,
    resolved: Vec<ResolvedImage>,
) -> Result<RegisterPlan> {
    let document_part = package
        .get_part(document_partname)
        .map_err(|_| DocxError::PackagePartMissing(document_partname.to_string()))?;

    let media_base = document_partname.base_uri();
    let mut next_r_id_suffix = document_part.rels().max_r_id_suffix() + 1;
    let mut plan = RegisterPlan::default();

    for image in resolved {
        let ext = image.image_type.to_lowercase();

        let planned_max = plan
            .images
            .iter()
            .filter(|planned| planned.partname.ext().eq_ignore_ascii_case(&ext))
            .filter_map(|planned| planned.partname.idx())
            .max()
            .unwrap_or(0);
        let index = package.max_media_index(&ext).max(planned_max) + 1;

        let partname = PackURI::new(format!("{}/media/image{}.{}", media_base, index, ext))
            .map_err(crate::opc::OpcError::InvalidPackUri)?;
        let target_ref = partname.relative_ref(media_base);
        let content_type = format!("image/{}", ext);

        if !package.content_types().has_default(&ext)
            && !package.content_types().has_override(partname.as_str())
        {
            plan.overrides
                .push((partname.to_string(), content_type.clone()));
        }

        plan.images.push(PlannedImage {
            name: image.name,
            r_id: format!("rId{}", next_r_id_suffix),
            partname,
            target_ref,
            content_type,
            bytes: image.bytes,
        });
        next_r_id_suffix += 1;
    }

    Ok(plan)
}
