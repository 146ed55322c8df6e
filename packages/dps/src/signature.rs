//! Signature placement normalization.
//!
//! External signers embed the XML-DSig `Signature` inside the signed
//! `infDPS` element or next to it, sometimes more than once. The national
//! schema wants exactly one signature as the sibling that follows
//! `</infDPS>` inside `DPS`. This module moves it there by byte offsets only:
//! the signature text itself is never parsed or re-serialized, so its digest
//! stays valid.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::{SIGNED_ELEMENT, XMLDSIG_NAMESPACE};
use crate::xml::{find_elements, find_end_tag, find_start_tag, tag_end};

/// Root element of the document.
const ROOT_ELEMENT: &str = "DPS";

/// Recognized signature element names.
const SIGNATURE_FORMS: [&str; 2] = ["ds:Signature", "Signature"];

/// `xmlns:ds="…"` declaration with its value.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DS_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\sxmlns:ds\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

/// Move an embedded signature to its schema position.
///
/// Returns the input unchanged when there is nothing to do: no `DPS` or
/// `infDPS` element, no signature inside `infDPS`, or several different
/// signatures inside `infDPS`. Otherwise the signature found inside
/// `infDPS`, countersignatures included, is moved byte for byte
/// to just after `</infDPS>` followed by a newline; identical copies are
/// dropped; and the root gains an `xmlns:ds` declaration when the moved
/// block uses that prefix and the root has none.
///
/// When `infDPS` holds a `ds:Signature` and a different bare `Signature`,
/// nothing is moved, even though the prefixed form would otherwise win:
/// relocating one of them would not be idempotent.
///
/// The transformation is idempotent.
///
/// # Examples
/// ```
/// use nfse_dps::normalize_signature_placement;
///
/// let signed = "<DPS><infDPS Id=\"x\"><a/><Signature>S</Signature></infDPS></DPS>";
/// assert_eq!(
///     normalize_signature_placement(signed),
///     "<DPS><infDPS Id=\"x\"><a/></infDPS><Signature>S</Signature>\n</DPS>"
/// );
/// ```
pub fn normalize_signature_placement(xml: &str) -> String {
    let cleaned = clean(xml);
    let Some(normalized) = relocate(&cleaned) else {
        return xml.to_string();
    };

    // A second pass must find nothing to do, or the transform is not stable.
    if relocate(&normalized).is_some() {
        tracing::warn!("signature relocation would not be stable, leaving document unchanged");
        return xml.to_string();
    }
    normalized
}

/// Strip a leading BOM and normalize line endings to `\n`.
fn clean(xml: &str) -> Cow<'_, str> {
    let without_bom = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    if without_bom.contains('\r') {
        Cow::Owned(without_bom.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(without_bom)
    }
}

/// Byte offsets of the elements involved in a relocation.
struct Layout {
    root_start: usize,
    /// Content of `infDPS`, between its start and end tags.
    content: Range<usize>,
    /// The `</infDPS>` end tag.
    close: Range<usize>,
}

fn layout(text: &str) -> Option<Layout> {
    let root_start = find_start_tag(text, ROOT_ELEMENT, 0)?;
    let inf_start = find_start_tag(text, SIGNED_ELEMENT, 0)?;
    if inf_start < root_start {
        return None;
    }
    let content_start = tag_end(text, inf_start)?;
    let close = find_end_tag(text, SIGNED_ELEMENT, content_start)?;
    Some(Layout {
        root_start,
        content: content_start..close.start,
        close,
    })
}

/// Outermost signature spans inside `infDPS`, in document order.
///
/// `None` when there are none or when they are not all byte-identical.
fn signatures_inside(text: &str, content: &Range<usize>) -> Option<Vec<Range<usize>>> {
    let mut all: Vec<Range<usize>> = SIGNATURE_FORMS
        .iter()
        .flat_map(|form| find_elements(text, form, content.clone()))
        .collect();
    all.sort_by_key(|span| span.start);

    // Signatures nested in another one (countersignatures) travel with it.
    let mut spans: Vec<Range<usize>> = Vec::with_capacity(all.len());
    for span in all {
        if spans.last().is_some_and(|outer| span.end <= outer.end) {
            continue;
        }
        spans.push(span);
    }

    let signature = &text[spans.first()?.clone()];
    if spans.iter().any(|span| &text[span.clone()] != signature) {
        tracing::warn!(
            count = spans.len(),
            "several different signatures inside infDPS, leaving document unchanged"
        );
        return None;
    }
    Some(spans)
}

/// Relocated document, or `None` when nothing has to move.
fn relocate(text: &str) -> Option<String> {
    let layout = layout(text)?;
    let spans = signatures_inside(text, &layout.content)?;
    let first = spans.first()?;
    let signature = &text[first.clone()];

    tracing::debug!(
        offset = first.start,
        len = signature.len(),
        copies = spans.len(),
        "moving signature out of infDPS"
    );

    let mut out = String::with_capacity(text.len() + 64);
    let mut cursor = 0;
    for span in &spans {
        out.push_str(&text[cursor..span.start]);
        cursor = span.end;
    }
    out.push_str(&text[cursor..layout.close.end]);
    out.push_str(signature);
    out.push('\n');

    // Drop identical copies the signer already placed after infDPS.
    let tail = &text[layout.close.end..];
    let tail_limit = find_end_tag(tail, ROOT_ELEMENT, 0).map_or(tail.len(), |close| close.start);
    let (before_root_close, rest) = tail.split_at(tail_limit);
    let duplicates = before_root_close.matches(signature).count();
    if duplicates > 0 {
        tracing::debug!(duplicates, "removing duplicate signatures after infDPS");
    }
    out.push_str(&before_root_close.replace(signature, ""));
    out.push_str(rest);

    if signature.starts_with("<ds:") {
        declare_ds_namespace(&mut out, layout.root_start);
    }
    Some(out)
}

/// Add `xmlns:ds` to the root start tag unless it already binds `ds`.
fn declare_ds_namespace(xml: &mut String, root_start: usize) {
    let Some(root_end) = tag_end(xml, root_start) else {
        return;
    };
    let root_tag = &xml[root_start..root_end];

    if let Some(caps) = DS_DECLARATION.captures(root_tag) {
        let uri = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        if uri != XMLDSIG_NAMESPACE {
            tracing::warn!(uri, "root element binds ds to an unexpected namespace");
        }
        return;
    }

    let insert_at = if root_tag.ends_with("/>") {
        root_end - 2
    } else {
        root_end - 1
    };
    xml.insert_str(insert_at, &format!(" xmlns:ds=\"{XMLDSIG_NAMESPACE}\""));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DS_SIG: &str = "<ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\
        <ds:SignedInfo/><ds:SignatureValue>abc=</ds:SignatureValue></ds:Signature>";

    #[test]
    fn test_moves_ds_signature_and_declares_namespace() {
        let xml = format!(
            "<DPS xmlns=\"http://www.sped.fazenda.gov.br/nfse\" versao=\"1.00\">\
             <infDPS Id=\"DPS1\"><tpAmb>2</tpAmb>{DS_SIG}</infDPS></DPS>"
        );
        assert_eq!(
            normalize_signature_placement(&xml),
            format!(
                "<DPS xmlns=\"http://www.sped.fazenda.gov.br/nfse\" versao=\"1.00\" \
                 xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\
                 <infDPS Id=\"DPS1\"><tpAmb>2</tpAmb></infDPS>{DS_SIG}\n</DPS>"
            )
        );
    }

    #[test]
    fn test_existing_ds_declaration_not_duplicated() {
        let xml = format!(
            "<DPS xmlns:ds='http://www.w3.org/2000/09/xmldsig#'><infDPS>{DS_SIG}</infDPS></DPS>"
        );
        let out = normalize_signature_placement(&xml);
        assert_eq!(out.matches("xmlns:ds=").count(), 2); // root + signature's own
        assert!(out.starts_with("<DPS xmlns:ds='http://www.w3.org/2000/09/xmldsig#'><infDPS></infDPS>"));
    }

    #[test]
    fn test_bare_signature_does_not_touch_root() {
        let xml = "<DPS versao=\"1.00\"><infDPS><a>1</a><Signature xmlns=\"x\">S</Signature></infDPS></DPS>";
        assert_eq!(
            normalize_signature_placement(xml),
            "<DPS versao=\"1.00\"><infDPS><a>1</a></infDPS><Signature xmlns=\"x\">S</Signature>\n</DPS>"
        );
    }

    #[test]
    fn test_different_signatures_are_left_alone() {
        let xml = format!("<DPS><infDPS><Signature>B</Signature>{DS_SIG}</infDPS></DPS>");
        assert_eq!(normalize_signature_placement(&xml), xml);
    }

    #[test]
    fn test_nested_signature_moves_as_one_block() {
        let xml = "<DPS><infDPS><Signature><Signature>S</Signature></Signature></infDPS></DPS>";
        assert_eq!(
            normalize_signature_placement(xml),
            "<DPS><infDPS></infDPS><Signature><Signature>S</Signature></Signature>\n</DPS>"
        );
    }

    #[test]
    fn test_countersignature_inside_ds_signature() {
        let sig = "<ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\"><ds:Object>\
                   <Signature xmlns=\"http://www.w3.org/2000/09/xmldsig#\">C</Signature>\
                   </ds:Object></ds:Signature>";
        let xml = format!("<DPS><infDPS><a/>{sig}</infDPS></DPS>");
        let out = normalize_signature_placement(&xml);
        assert!(out.contains(&format!("<infDPS><a/></infDPS>{sig}\n</DPS>")));
        assert_eq!(normalize_signature_placement(&out), out);
    }

    #[test]
    fn test_identical_copies_collapse_to_one() {
        let xml = format!(
            "<DPS><infDPS><a/>{DS_SIG}</infDPS>\n{DS_SIG}\n{DS_SIG}</DPS>"
        );
        let out = normalize_signature_placement(&xml);
        assert_eq!(out.matches("</ds:Signature>").count(), 1);
        assert!(out.contains(&format!("</infDPS>{DS_SIG}\n")));
        assert!(out.ends_with("</DPS>"));
    }

    #[test]
    fn test_copies_inside_infdps_removed() {
        let xml = "<DPS><infDPS><Signature>S</Signature><a/><Signature>S</Signature></infDPS></DPS>";
        assert_eq!(
            normalize_signature_placement(xml),
            "<DPS><infDPS><a/></infDPS><Signature>S</Signature>\n</DPS>"
        );
    }

    #[test]
    fn test_already_placed_is_untouched() {
        let xml = format!("<DPS><infDPS><a/></infDPS>{DS_SIG}</DPS>");
        assert_eq!(normalize_signature_placement(&xml), xml);
    }

    #[test]
    fn test_missing_elements_pass_through() {
        for xml in [
            "",
            "<NFSe><infNFSe/></NFSe>",
            "<DPS><Signature>S</Signature></DPS>",
            "<infDPS><Signature>S</Signature></infDPS>",
            "<DPS><infDPS><Signature>S</Signature></DPS>",
            "\u{feff}<other/>\r\n",
        ] {
            assert_eq!(normalize_signature_placement(xml), xml);
        }
    }

    #[test]
    fn test_bom_and_line_endings_cleaned_on_relocation() {
        let xml = "\u{feff}<DPS>\r\n<infDPS>\r<Signature>S</Signature></infDPS>\r\n</DPS>";
        assert_eq!(
            normalize_signature_placement(xml),
            "<DPS>\n<infDPS>\n</infDPS><Signature>S</Signature>\n\n</DPS>"
        );
    }

    #[test]
    fn test_signature_value_element_not_mistaken() {
        let xml = "<DPS><infDPS><SignatureValue>x</SignatureValue></infDPS></DPS>";
        assert_eq!(normalize_signature_placement(xml), xml);
    }

    #[test]
    fn test_idempotent_on_relocated_output() {
        let xml = format!(
            "\u{feff}<DPS xmlns=\"n\">\r\n  <infDPS Id=\"a\">\r\n    <x>1</x>\r\n    {DS_SIG}\r\n  </infDPS>\r\n</DPS>\r\n"
        );
        let once = normalize_signature_placement(&xml);
        assert_ne!(once, xml);
        assert_eq!(normalize_signature_placement(&once), once);
    }

    #[test]
    fn test_root_gt_inside_attribute() {
        let xml = format!("<DPS note=\"a>b\"><infDPS>{DS_SIG}</infDPS></DPS>");
        let out = normalize_signature_placement(&xml);
        assert!(out.starts_with(
            "<DPS note=\"a>b\" xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\"><infDPS></infDPS>"
        ));
    }
}
