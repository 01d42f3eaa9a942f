//! Drawing construction and document splicing.
//!
//! Replaces normalized placeholder tokens with inline drawing runs. The
//! pass is driven by the XML parser, so every element boundary comes from
//! quick-xml events rather than brace counting, and byte ranges the splice
//! does not touch are copied through verbatim.

use crate::docx::error::{DocxError, Result};
use crate::docx::placeholder::{Token, parse_token};
use crate::opc::constants::namespace as ns;
use memchr::{memchr, memmem};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::fmt::Write as FmtWrite;
use tracing::debug;

/// EMUs per pixel at 96 dpi (914400 EMU/inch / 96 px/inch).
const EMU_PER_PIXEL: u64 = 9525;

/// Convert a pixel dimension to EMUs (English Metric Units).
#[inline]
pub fn px_to_emu(px: u32) -> u64 {
    px as u64 * EMU_PER_PIXEL
}

/// Highest `<wp:docPr id="...">` value in the document, or 0 when the
/// document has no drawings. New drawing ids count up from here.
pub fn max_doc_pr_id(xml: &str) -> u32 {
    let bytes = xml.as_bytes();
    let finder = memmem::Finder::new(b"<wp:docPr");
    let mut max = 0u32;
    let mut pos = 0;

    while let Some(found) = finder.find(&bytes[pos..]) {
        let tag_start = pos + found;
        let tag_end = memchr(b'>', &bytes[tag_start..])
            .map(|i| tag_start + i)
            .unwrap_or(bytes.len());
        let tag = &xml[tag_start..tag_end];

        if let Some(id_pos) = tag.find(r#" id=""#) {
            let digits = &tag[id_pos + 5..];
            let digits_end = digits.find('"').unwrap_or(digits.len());
            if let Ok(id) = atoi_simd::parse::<u32, false, false>(digits[..digits_end].as_bytes()) {
                max = max.max(id);
            }
        }

        pos = tag_end;
    }

    max
}

/// Find the next assigned placeholder token in a text slice.
///
/// Returns the token's byte span within `text` and its parsed form. Spans
/// that fail the grammar or name an unassigned variable are stepped over.
fn find_assigned_token<'a>(
    text: &'a str,
    from: usize,
    assignments: &HashMap<String, String>,
) -> Option<(usize, usize, Token<'a>)> {
    let bytes = text.as_bytes();
    let open_finder = memmem::Finder::new(b"{{");
    let close_finder = memmem::Finder::new(b"}}");

    let mut search_from = from;
    while let Some(found) = open_finder.find(&bytes[search_from..]) {
        let start = search_from + found;
        let close = close_finder.find(&bytes[start + 2..])?;
        let end = start + 2 + close + 2;

        if let Some(token) = parse_token(&text[start..end])
            && assignments.contains_key(token.name)
        {
            return Some((start, end, token));
        }

        search_from = end;
    }

    None
}

/// Kind of the run child currently being captured.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ChildKind {
    RunProps,
    Text,
    Other,
}

/// A direct child of a captured run, as a raw byte span.
enum Child {
    /// A `<w:t>` element; span of its inner text, None when empty
    Text { inner: Option<(usize, usize)> },

    /// Any other child content, copied through inside its own run
    Other { span: (usize, usize) },
}

/// A `<w:r>` element under capture.
struct RunCapture {
    start: usize,
    rpr: Option<(usize, usize)>,
    children: Vec<Child>,
    has_assigned: bool,
}

/// Replace assigned placeholder tokens with inline drawings.
///
/// `assignments` maps placeholder names to the relationship ids their media
/// parts will use. Each occurrence is swapped for a drawing run sized from
/// its own token; surrounding text is re-emitted in literal runs that keep
/// the original run properties. Returns the spliced document and the number
/// of occurrences replaced.
pub fn splice(
    document_xml: &str,
    assignments: &HashMap<String, String>,
    doc_pr_start: u32,
) -> Result<(String, u32)> {
    let mut reader = Reader::from_str(document_xml);

    let mut out = String::with_capacity(document_xml.len() + 1024);
    let mut copied = 0usize;
    let mut replaced = 0u32;
    let mut doc_pr = doc_pr_start;

    let mut run: Option<RunCapture> = None;
    let mut child_depth = 0usize;
    let mut child_start = 0usize;
    let mut child_kind = ChildKind::Other;
    let mut text_inner: Option<(usize, usize)> = None;

    loop {
        let pos_before = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| DocxError::Xml(format!("document parse error: {}", e)))?;
        let pos_after = reader.buffer_position() as usize;

        match event {
            Event::Eof => break,

            Event::Start(ref e) => {
                if run.is_some() {
                    if child_depth == 0 {
                        child_start = pos_before;
                        child_kind = match e.name().as_ref() {
                            b"w:rPr" => ChildKind::RunProps,
                            b"w:t" => {
                                text_inner = None;
                                ChildKind::Text
                            }
                            _ => ChildKind::Other,
                        };
                    }
                    child_depth += 1;
                } else if e.name().as_ref() == b"w:r" {
                    run = Some(RunCapture {
                        start: pos_before,
                        rpr: None,
                        children: Vec::new(),
                        has_assigned: false,
                    });
                    child_depth = 0;
                }
            }

            Event::Empty(ref e) => {
                if let Some(capture) = run.as_mut()
                    && child_depth == 0
                {
                    match e.name().as_ref() {
                        b"w:rPr" => capture.rpr = Some((pos_before, pos_after)),
                        b"w:t" => capture.children.push(Child::Text { inner: None }),
                        _ => capture.children.push(Child::Other {
                            span: (pos_before, pos_after),
                        }),
                    }
                }
            }

            Event::End(ref e) => {
                if child_depth == 0 {
                    if e.name().as_ref() == b"w:r"
                        && let Some(capture) = run.take()
                        && capture.has_assigned
                    {
                        out.push_str(&document_xml[copied..capture.start]);
                        rebuild_run(
                            &mut out,
                            document_xml,
                            &capture,
                            assignments,
                            &mut doc_pr,
                            &mut replaced,
                        )?;
                        copied = pos_after;
                    }
                } else if let Some(capture) = run.as_mut() {
                    child_depth -= 1;
                    if child_depth == 0 {
                        match child_kind {
                            ChildKind::RunProps => {
                                capture.rpr = Some((child_start, pos_after));
                            }
                            ChildKind::Text => {
                                let inner = text_inner.take();
                                if let Some((ts, te)) = inner
                                    && find_assigned_token(
                                        &document_xml[ts..te],
                                        0,
                                        assignments,
                                    )
                                    .is_some()
                                {
                                    capture.has_assigned = true;
                                }
                                capture.children.push(Child::Text { inner });
                            }
                            ChildKind::Other => {
                                capture.children.push(Child::Other {
                                    span: (child_start, pos_after),
                                });
                            }
                        }
                    }
                }
            }

            // Text, CDATA, entity references, comments: inside a captured
            // w:t they extend the inner span; directly under the run they
            // pass through as an opaque child.
            _ => {
                if let Some(capture) = run.as_mut() {
                    if child_depth == 1 && child_kind == ChildKind::Text {
                        text_inner = match text_inner {
                            Some((s, _)) => Some((s, pos_after)),
                            None => Some((pos_before, pos_after)),
                        };
                    } else if child_depth == 0 {
                        capture.children.push(Child::Other {
                            span: (pos_before, pos_after),
                        });
                    }
                }
            }
        }
    }

    out.push_str(&document_xml[copied..]);
    debug!(replaced, "placeholder occurrences spliced");
    Ok((out, replaced))
}

/// Re-emit a captured run, swapping assigned tokens for drawing runs.
fn rebuild_run(
    out: &mut String,
    xml: &str,
    capture: &RunCapture,
    assignments: &HashMap<String, String>,
    doc_pr: &mut u32,
    replaced: &mut u32,
) -> Result<()> {
    let rpr = capture.rpr.map(|(s, e)| &xml[s..e]).unwrap_or("");

    for child in &capture.children {
        match child {
            Child::Other { span } => {
                out.push_str("<w:r>");
                out.push_str(rpr);
                out.push_str(&xml[span.0..span.1]);
                out.push_str("</w:r>");
            }
            Child::Text { inner } => {
                let text = inner.map(|(s, e)| &xml[s..e]).unwrap_or("");
                let mut cursor = 0;

                while let Some((start, end, token)) =
                    find_assigned_token(text, cursor, assignments)
                {
                    push_literal_run(out, rpr, &text[cursor..start]);

                    let r_id = assignments.get(token.name).ok_or_else(|| {
                        DocxError::Xml(format!("no assignment for '{}'", token.name))
                    })?;
                    push_drawing_run(out, r_id, &token, *doc_pr)?;
                    *doc_pr += 1;
                    *replaced += 1;

                    cursor = end;
                }

                push_literal_run(out, rpr, &text[cursor..]);
            }
        }
    }

    Ok(())
}

/// Emit a literal text run reusing the original run properties.
fn push_literal_run(out: &mut String, rpr: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    out.push_str("<w:r>");
    out.push_str(rpr);
    out.push_str(r#"<w:t xml:space="preserve">"#);
    out.push_str(text);
    out.push_str("</w:t></w:r>");
}

/// Emit an inline drawing run for one placeholder occurrence.
fn push_drawing_run(out: &mut String, r_id: &str, token: &Token<'_>, doc_pr_id: u32) -> Result<()> {
    let cx = px_to_emu(token.width);
    let cy = px_to_emu(token.height);
    let desc = escape_xml(token.name);

    write!(
        out,
        r#"<w:r><w:rPr><w:noProof/></w:rPr><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="{ns_wp}"><wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/><wp:docPr id="{id}" name="Picture {id}" descr="{desc}"/><wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="{ns_a}" noChangeAspect="1"/></wp:cNvGraphicFramePr><a:graphic xmlns:a="{ns_a}"><a:graphicData uri="{ns_pic}"><pic:pic xmlns:pic="{ns_pic}"><pic:nvPicPr><pic:cNvPr id="0" name="Picture {id}" descr="{desc}"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip xmlns:r="{ns_r}" r:embed="{r_id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#,
        ns_wp = ns::DML_WORDPROCESSING_DRAWING,
        ns_a = ns::DML_MAIN,
        ns_pic = ns::DML_PICTURE,
        ns_r = ns::OFC_RELATIONSHIPS,
        cx = cx,
        cy = cy,
        id = doc_pr_id,
        desc = desc,
        r_id = r_id,
    )
    .map_err(|e| DocxError::Xml(e.to_string()))?;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn assignments(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, r_id)| (name.to_string(), r_id.to_string()))
            .collect()
    }

    fn doc(runs: &str) -> String {
        format!(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p>{}</w:p></w:body></w:document>"#,
            runs
        )
    }

    #[test]
    fn test_px_to_emu_exact() {
        assert_eq!(px_to_emu(100), 952_500);
        assert_eq!(px_to_emu(50), 476_250);
        assert_eq!(px_to_emu(0), 0);
        assert_eq!(px_to_emu(u32::MAX), u32::MAX as u64 * 9525);
    }

    #[test]
    fn test_max_doc_pr_id() {
        let xml = r#"<w:p><wp:docPr id="3" name="a"/><wp:docPr id="7" name="b"/></w:p>"#;
        assert_eq!(max_doc_pr_id(xml), 7);
        assert_eq!(max_doc_pr_id("<w:p/>"), 0);
    }

    #[test]
    fn test_splice_token_with_surrounding_text() {
        let xml = doc(
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t>before {{insert_image logo png 100 50}} after</w:t></w:r>"#,
        );
        let (spliced, replaced) = splice(&xml, &assignments(&[("logo", "rId9")]), 1).unwrap();

        assert_eq!(replaced, 1);
        assert!(spliced.contains(r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">before </w:t></w:r>"#));
        assert!(spliced.contains(r#"<w:t xml:space="preserve"> after</w:t>"#));
        assert!(spliced.contains(r#"r:embed="rId9""#));
        assert!(spliced.contains(r#"<wp:extent cx="952500" cy="476250"/>"#));
        assert!(spliced.contains(r#"<wp:docPr id="1""#));
        assert!(!spliced.contains("insert_image"));
    }

    #[test]
    fn test_splice_lone_token_emits_no_empty_literals() {
        let xml = doc(r#"<w:r><w:t>{{insert_image logo png 10 10}}</w:t></w:r>"#);
        let (spliced, replaced) = splice(&xml, &assignments(&[("logo", "rId4")]), 2).unwrap();

        assert_eq!(replaced, 1);
        assert!(!spliced.contains(r#"<w:t xml:space="preserve">"#));
        assert_eq!(spliced.matches("<w:drawing>").count(), 1);
    }

    #[test]
    fn test_splice_leaves_unassigned_tokens() {
        let xml = doc(r#"<w:r><w:t>{{insert_image other png 10 10}}</w:t></w:r>"#);
        let (spliced, replaced) = splice(&xml, &assignments(&[("logo", "rId4")]), 1).unwrap();

        assert_eq!(replaced, 0);
        assert_eq!(spliced, xml);
    }

    #[test]
    fn test_splice_multiple_occurrences_share_r_id() {
        let xml = doc(
            r#"<w:r><w:t>{{insert_image logo png 10 10}} and {{insert_image logo png 20 30}}</w:t></w:r>"#,
        );
        let (spliced, replaced) = splice(&xml, &assignments(&[("logo", "rId4")]), 5).unwrap();

        assert_eq!(replaced, 2);
        assert_eq!(spliced.matches(r#"r:embed="rId4""#).count(), 2);
        assert!(spliced.contains(r#"<wp:docPr id="5""#));
        assert!(spliced.contains(r#"<wp:docPr id="6""#));
        // Second occurrence sized from its own token
        assert!(spliced.contains(r#"<wp:extent cx="190500" cy="285750"/>"#));
    }

    #[test]
    fn test_splice_preserves_other_run_children() {
        let xml = doc(r#"<w:r><w:t>{{insert_image logo png 10 10}}</w:t><w:br/></w:r>"#);
        let (spliced, replaced) = splice(&xml, &assignments(&[("logo", "rId4")]), 1).unwrap();

        assert_eq!(replaced, 1);
        assert!(spliced.contains("<w:r><w:br/></w:r>"));
    }

    #[test]
    fn test_splice_untouched_document_is_identity() {
        let xml = doc(r#"<w:r><w:t>plain text</w:t></w:r>"#);
        let (spliced, replaced) = splice(&xml, &assignments(&[("logo", "rId4")]), 1).unwrap();

        assert_eq!(replaced, 0);
        assert_eq!(spliced, xml);
    }
}
