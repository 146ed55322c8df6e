//! Best-effort field extraction from authority responses.
//!
//! Responses are matched with tag patterns rather than parsed, so a
//! truncated or otherwise malformed document still yields whatever fields
//! can be found. Nothing here returns an error.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::types::Ambiente;
use crate::xml::find_element;

/// A text-only element, possibly prefixed: `<p:tag attr="…">text</p:tag>`.
/// Captures: (1) opening name, (2) text, (3) closing name.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static SIMPLE_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<(?:[A-Za-z_][\w.-]*:)?([A-Za-z_][\w.-]*)(?:\s[^<>]*)?>([^<]*)</(?:[A-Za-z_][\w.-]*:)?([A-Za-z_][\w.-]*)\s*>",
    )
    .expect("valid regex")
});

/// `Id` attribute of the `infNFSe` or `infDPS` start tag.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DOCUMENT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:[A-Za-z_][\w.-]*:)?inf(?:NFSe|DPS)\s[^>]*?\bId\s*=\s*["']([^"']*)["']"#)
        .expect("valid regex")
});

/// NFS-e document id: `NFS` followed by the 50-digit access key.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static NFSE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^NFS(\d{50})$").expect("valid regex"));

/// Predefined and numeric character references.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9A-Fa-f]+|#\d+|lt|gt|amp|quot|apos);").expect("valid regex")
});

/// Fields recovered from an authority response.
///
/// Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFields {
    pub id: Option<String>,
    pub numero_nfse: Option<String>,
    pub codigo_verificacao: Option<String>,
    pub chave_acesso: Option<String>,
    pub ambiente: Option<Ambiente>,
    pub valor_total: Option<String>,
    pub codigo_tributacao_nacional: Option<String>,
    pub codigo_tributacao_municipal: Option<String>,
    pub descricao: Option<String>,
    pub prestador_documento: Option<String>,
    pub tomador_documento: Option<String>,
}

impl ParsedFields {
    /// Whether nothing at all was recognized.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Extract whatever fields `xml` carries.
///
/// # Examples
/// ```
/// use nfse_dps::parse_authority_fields;
///
/// let fields = parse_authority_fields(Some("<NFSe><infNFSe><nNFSe>17</nNFSe></infNFSe></NFSe>"));
/// assert_eq!(fields.numero_nfse.as_deref(), Some("17"));
/// assert!(fields.chave_acesso.is_none());
///
/// assert!(parse_authority_fields(None).is_empty());
/// ```
pub fn parse_authority_fields(xml: Option<&str>) -> ParsedFields {
    let Some(xml) = xml.filter(|x| !x.trim().is_empty()) else {
        return ParsedFields::default();
    };

    let id = DOCUMENT_ID
        .captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty());

    let chave_acesso = first_text(xml, &["chaveAcesso", "chNFSe"]).or_else(|| {
        id.as_deref()
            .and_then(|id| NFSE_ID.captures(id))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    });

    let prestador_documento = ["emit", "prest"]
        .iter()
        .find_map(|section| section_text(xml, section, &["CNPJ", "CPF"]));

    let tomador_documento = section_text(xml, "toma", &["CNPJ", "CPF", "NIF", "idEstrangeiro"]);

    let fields = ParsedFields {
        id,
        numero_nfse: first_text(xml, &["nNFSe"]),
        codigo_verificacao: first_text(xml, &["cVerif", "codigoVerificacao"]),
        chave_acesso,
        ambiente: first_text(xml, &["tpAmb"]).and_then(|code| Ambiente::from_code(&code)),
        valor_total: first_text(xml, &["vServ", "vLiq"]),
        codigo_tributacao_nacional: first_text(xml, &["cTribNac"]),
        codigo_tributacao_municipal: first_text(xml, &["cTribMun"]),
        descricao: first_text(xml, &["xDescServ"]),
        prestador_documento,
        tomador_documento,
    };

    tracing::debug!(
        id = ?fields.id,
        chave = ?fields.chave_acesso,
        numero = ?fields.numero_nfse,
        "extracted authority fields"
    );
    fields
}

/// Text of the first element named by `tags`, tried in order.
fn first_text(xml: &str, tags: &[&str]) -> Option<String> {
    tags.iter().find_map(|tag| element_text(xml, tag))
}

/// Like [`first_text`] but restricted to the first `section` element.
fn section_text(xml: &str, section: &str, tags: &[&str]) -> Option<String> {
    let range = find_element(xml, section, 0, xml.len())?;
    first_text(&xml[range], tags)
}

/// Decoded, trimmed text of the first text-only `tag` element.
fn element_text(xml: &str, tag: &str) -> Option<String> {
    SIMPLE_ELEMENT
        .captures_iter(xml)
        .find(|caps| &caps[1] == tag && &caps[3] == tag)
        .map(|caps| decode_entities(caps[2].trim()))
        .filter(|text| !text.is_empty())
}

/// Resolve predefined and numeric character references.
///
/// Unresolvable references are kept as written.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .unwrap_or_else(|| entity[1..].parse::<u32>())
                    .ok()
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
