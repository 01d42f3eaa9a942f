//! Placeholder discovery in WordprocessingML documents.
//!
//! Word splits literal text across runs freely (spell-check state, style
//! toggles, and revision tracking all fragment runs), so a placeholder typed
//! as one token may arrive as several `<w:t>` slices. The scanner builds a
//! logical view of the document text, finds `{{insert_image ...}}` spans in
//! that view, and rewrites each accepted span so the token is contiguous in
//! a single text node before the splicing pass runs.

use memchr::{memchr, memmem};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Literal marker that distinguishes image placeholders from other
/// brace-delimited text.
pub(crate) const MARKER: &str = "insert_image";

/// A named image placeholder discovered in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Variable name bound by the caller's source map
    pub name: String,

    /// Declared image type (extension form, e.g. "png")
    pub image_type: String,

    /// Display width in pixels, from the first occurrence
    pub width: u32,

    /// Display height in pixels, from the first occurrence
    pub height: u32,

    /// Number of well-formed occurrences of this name
    pub occurrences: u32,
}

/// Result of a scan pass.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Document XML with every accepted token made contiguous
    pub xml: String,

    /// Accepted placeholders in first-seen document order
    pub placeholders: Vec<Placeholder>,

    /// Spans carrying the marker that failed the grammar
    pub malformed_skipped: u32,
}

/// One parsed `{{insert_image <name> <type> <width> <height>}}` token.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Token<'a> {
    pub name: &'a str,
    pub image_type: &'a str,
    pub width: u32,
    pub height: u32,
}

/// Parse a brace-delimited span against the placeholder grammar.
///
/// Fields are whitespace-separated; width and height admit unsigned decimal
/// integers only. Returns None for any deviation.
pub(crate) fn parse_token(span: &str) -> Option<Token<'_>> {
    let inner = span.strip_prefix("{{")?.strip_suffix("}}")?;
    let mut fields = inner.split_whitespace();

    if fields.next()? != MARKER {
        return None;
    }
    let name = fields.next()?;
    let image_type = fields.next()?;
    let width = atoi_simd::parse::<u32, false, false>(fields.next()?.as_bytes()).ok()?;
    let height = atoi_simd::parse::<u32, false, false>(fields.next()?.as_bytes()).ok()?;
    if fields.next().is_some() {
        return None;
    }

    Some(Token {
        name,
        image_type,
        width,
        height,
    })
}

/// Logical text of a document: every `<w:t>` content slice concatenated,
/// with a raw byte offset recorded per logical byte.
struct LogicalText {
    text: String,
    raw_offsets: Vec<usize>,

    /// Raw offsets of each `</w:p>` tag, for paragraph-bound checks
    para_ends: Vec<usize>,
}

fn logical_view(xml: &str) -> LogicalText {
    let bytes = xml.as_bytes();
    let mut text = String::new();
    let mut raw_offsets = Vec::new();
    let mut para_ends = Vec::new();

    let mut in_text = false;
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] == b'<' {
            let Some(close) = memchr(b'>', &bytes[pos..]).map(|i| pos + i) else {
                break;
            };
            let tag = &xml[pos + 1..close];

            if let Some(closing) = tag.strip_prefix('/') {
                match closing.trim_end() {
                    "w:t" => in_text = false,
                    "w:p" => para_ends.push(pos),
                    _ => {}
                }
            } else if !tag.starts_with('?') && !tag.starts_with('!') {
                let self_closing = tag.ends_with('/');
                let body = tag.strip_suffix('/').unwrap_or(tag);
                let name_end = body
                    .find(|c: char| c.is_ascii_whitespace())
                    .unwrap_or(body.len());
                if &body[..name_end] == "w:t" && !self_closing {
                    in_text = true;
                }
            }

            pos = close + 1;
        } else {
            let next_lt = memchr(b'<', &bytes[pos..])
                .map(|i| pos + i)
                .unwrap_or(bytes.len());
            if in_text {
                text.push_str(&xml[pos..next_lt]);
                raw_offsets.extend(pos..next_lt);
            }
            pos = next_lt;
        }
    }

    LogicalText {
        text,
        raw_offsets,
        para_ends,
    }
}

/// Scan a document for image placeholders bound by the caller's source map.
///
/// Spans carrying the marker but failing the grammar, and spans crossing a
/// paragraph boundary, are logged and skipped; they never fail the scan.
/// Well-formed tokens whose name is not in `sources` are left in place
/// untouched. Accepted tokens are normalized so each occupies a contiguous
/// slice of one text node in the returned XML.
pub fn scan(document_xml: &str, sources: &HashMap<String, String>) -> ScanOutcome {
    let logical = logical_view(document_xml);
    let lbytes = logical.text.as_bytes();
    let open_finder = memmem::Finder::new(b"{{");
    let close_finder = memmem::Finder::new(b"}}");

    let mut placeholders: Vec<Placeholder> = Vec::new();
    let mut malformed_skipped = 0u32;
    let mut rewrites: Vec<(usize, usize, &str)> = Vec::new();

    let mut search_from = 0;
    while let Some(found) = open_finder.find(&lbytes[search_from..]) {
        let span_start = search_from + found;

        let Some(close) = close_finder.find(&lbytes[span_start + 2..]) else {
            if logical.text[span_start..].contains(MARKER) {
                warn!("unterminated image placeholder skipped");
                malformed_skipped += 1;
            }
            break;
        };
        let span_end = span_start + 2 + close + 2;

        let span_text = &logical.text[span_start..span_end];
        if !span_text.contains(MARKER) {
            search_from = span_end;
            continue;
        }

        let raw_start = logical.raw_offsets[span_start];
        let raw_end = logical.raw_offsets[span_end - 1] + 1;

        if logical
            .para_ends
            .iter()
            .any(|&p| raw_start < p && p < raw_end)
        {
            warn!(
                span = span_text,
                "image placeholder crosses a paragraph boundary, skipped"
            );
            malformed_skipped += 1;
            search_from = span_end;
            continue;
        }

        match parse_token(span_text) {
            Some(token) if sources.contains_key(token.name) => {
                match placeholders.iter_mut().find(|p| p.name == token.name) {
                    Some(existing) => existing.occurrences += 1,
                    None => placeholders.push(Placeholder {
                        name: token.name.to_string(),
                        image_type: token.image_type.to_string(),
                        width: token.width,
                        height: token.height,
                        occurrences: 1,
                    }),
                }
                rewrites.push((raw_start, raw_end, span_text));
            }
            Some(token) => {
                debug!(name = token.name, "placeholder has no requested source");
            }
            None => {
                warn!(span = span_text, "malformed image placeholder skipped");
                malformed_skipped += 1;
            }
        }

        search_from = span_end;
    }

    let mut xml = String::with_capacity(document_xml.len());
    let mut copied = 0;
    for (start, end, token_text) in rewrites {
        xml.push_str(&document_xml[copied..start]);
        xml.push_str(token_text);
        copied = end;
    }
    xml.push_str(&document_xml[copied..]);

    ScanOutcome {
        xml,
        placeholders,
        malformed_skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc(body_runs: &str) -> String {
        format!(
            r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p>{}</w:p></w:body></w:document>"#,
            body_runs
        )
    }

    fn run(text: &str) -> String {
        format!("<w:r><w:t>{}</w:t></w:r>", text)
    }

    fn sources(names: &[&str]) -> HashMap<String, String> {
        names
            .iter()
            .map(|n| (n.to_string(), "unused".to_string()))
            .collect()
    }

    #[test]
    fn test_parse_token() {
        let token = parse_token("{{insert_image logo png 100 50}}").unwrap();
        assert_eq!(token.name, "logo");
        assert_eq!(token.image_type, "png");
        assert_eq!(token.width, 100);
        assert_eq!(token.height, 50);
    }

    #[test]
    fn test_parse_token_rejects_deviations() {
        assert!(parse_token("{{insert_image logo png 100}}").is_none());
        assert!(parse_token("{{insert_image logo png 100 50 extra}}").is_none());
        assert!(parse_token("{{insert_image logo png wide 50}}").is_none());
        assert!(parse_token("{{insert_image logo png -3 50}}").is_none());
        assert!(parse_token("{{other_marker logo png 100 50}}").is_none());
    }

    #[test]
    fn test_scan_unsplit_token() {
        let xml = doc(&run("before {{insert_image logo png 100 50}} after"));
        let outcome = scan(&xml, &sources(&["logo"]));

        assert_eq!(outcome.placeholders.len(), 1);
        let ph = &outcome.placeholders[0];
        assert_eq!(ph.name, "logo");
        assert_eq!(ph.image_type, "png");
        assert_eq!((ph.width, ph.height), (100, 50));
        assert_eq!(ph.occurrences, 1);
        assert_eq!(outcome.malformed_skipped, 0);
        assert_eq!(outcome.xml, xml);
    }

    #[test]
    fn test_scan_fragmented_token() {
        // Split inside the braces, the marker, and the fields
        let xml = doc(&[
            run("{"),
            run("{ins"),
            run("ert_image lo"),
            run("go png 1"),
            run("00 50}}"),
        ]
        .concat());
        let outcome = scan(&xml, &sources(&["logo"]));

        assert_eq!(outcome.placeholders.len(), 1);
        assert_eq!(outcome.placeholders[0].name, "logo");
        assert!(outcome.xml.contains("{{insert_image logo png 100 50}}"));

        // Normalized output is a fixpoint of the scan
        let again = scan(&outcome.xml, &sources(&["logo"]));
        assert_eq!(again.placeholders, outcome.placeholders);
        assert_eq!(again.xml, outcome.xml);
    }

    #[test]
    fn test_scan_malformed_span_left_untouched() {
        let xml = doc(&run("{{insert_image logo png}}"));
        let outcome = scan(&xml, &sources(&["logo"]));

        assert!(outcome.placeholders.is_empty());
        assert_eq!(outcome.malformed_skipped, 1);
        assert_eq!(outcome.xml, xml);
    }

    #[test]
    fn test_scan_ignores_unrequested_names() {
        let xml = doc(&run("{{insert_image other png 10 10}}"));
        let outcome = scan(&xml, &sources(&["logo"]));

        assert!(outcome.placeholders.is_empty());
        assert_eq!(outcome.malformed_skipped, 0);
        assert_eq!(outcome.xml, xml);
    }

    #[test]
    fn test_scan_ignores_plain_braces() {
        let xml = doc(&run("a {{mustache}} template"));
        let outcome = scan(&xml, &sources(&["logo"]));

        assert!(outcome.placeholders.is_empty());
        assert_eq!(outcome.malformed_skipped, 0);
    }

    #[test]
    fn test_scan_counts_occurrences() {
        let xml = doc(&[
            run("{{insert_image logo png 100 50}}"),
            run("{{insert_image logo png 30 40}}"),
        ]
        .concat());
        let outcome = scan(&xml, &sources(&["logo"]));

        assert_eq!(outcome.placeholders.len(), 1);
        assert_eq!(outcome.placeholders[0].occurrences, 2);
        // First occurrence wins the recorded dimensions
        assert_eq!(outcome.placeholders[0].width, 100);
    }

    #[test]
    fn test_scan_rejects_cross_paragraph_span() {
        let xml = format!(
            r#"<w:document><w:body><w:p>{}</w:p><w:p>{}</w:p></w:body></w:document>"#,
            run("{{insert_image logo"),
            run(" png 100 50}}"),
        );
        let outcome = scan(&xml, &sources(&["logo"]));

        assert!(outcome.placeholders.is_empty());
        assert_eq!(outcome.malformed_skipped, 1);
        assert_eq!(outcome.xml, xml);
    }

    #[test]
    fn test_scan_text_outside_w_t_not_matched() {
        let xml = doc("<w:r><w:instrText>{{insert_image logo png 1 1}}</w:instrText></w:r>");
        let outcome = scan(&xml, &sources(&["logo"]));
        assert!(outcome.placeholders.is_empty());
    }

    proptest! {
        #[test]
        fn prop_fragmentation_is_invisible(splits in proptest::collection::vec(1usize..33, 0..5)) {
            let token = "{{insert_image logo png 100 50}}";

            let mut cuts: Vec<usize> = splits.into_iter().filter(|&i| i < token.len()).collect();
            cuts.sort_unstable();
            cuts.dedup();

            let mut runs = String::new();
            let mut prev = 0;
            for cut in cuts {
                runs.push_str(&run(&token[prev..cut]));
                prev = cut;
            }
            runs.push_str(&run(&token[prev..]));

            let fragmented = doc(&runs);
            let whole = doc(&run(token));

            let got = scan(&fragmented, &sources(&["logo"]));
            let want = scan(&whole, &sources(&["logo"]));

            prop_assert_eq!(got.placeholders, want.placeholders);
            prop_assert_eq!(got.malformed_skipped, 0);
            prop_assert!(got.xml.contains(token));
        }
    }
}
