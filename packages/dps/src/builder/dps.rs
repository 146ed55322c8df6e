//! Complete unsigned DPS document.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{build_servico, build_tomador};
use crate::config::{APP_VERSION, DPS_VERSION, NFSE_NAMESPACE, SIGNED_ELEMENT};
use crate::error::{DpsError, Result};
use crate::types::{Ambiente, DpsContext, DpsInput};
use crate::xml::XmlWriter;

/// Monetary value with at most two decimals, e.g. `1500.00`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static AMOUNT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,13}(\.\d{1,2})?$").expect("valid regex"));

/// IBGE municipality code: 7 digits.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static MUNICIPIO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{7}$").expect("valid regex"));

/// Identification data of the declaration itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cabecalho {
    pub ambiente: Ambiente,
    pub emitido_em: DateTime<FixedOffset>,
    pub serie: String,
    pub numero: String,
    pub competencia: NaiveDate,
    /// Municipality of emission (`cLocEmi`).
    pub municipio_emissor: String,
    #[serde(default = "default_tipo_emitente")]
    pub tipo_emitente: u8,
}

fn default_tipo_emitente() -> u8 {
    1
}

/// The issuing party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prestador {
    /// CNPJ or CPF, formatting characters allowed.
    pub documento: String,
    #[serde(default)]
    pub inscricao_municipal: Option<String>,
    #[serde(default)]
    pub telefone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub opcao_simples_nacional: u8,
    #[serde(default)]
    pub regime_especial: u8,
}

/// Service value and ISSQN treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valores {
    pub valor_servico: String,
    #[serde(default = "default_one")]
    pub tributacao_issqn: u8,
    #[serde(default = "default_one")]
    pub retencao_issqn: u8,
}

fn default_one() -> u8 {
    1
}

/// Everything needed to build one unsigned DPS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DpsDocument {
    pub cabecalho: Cabecalho,
    pub prestador: Prestador,
    pub contexto: DpsInput,
    pub valores: Valores,
}

/// Federal inscription of the prestador with its type code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InscricaoFederal {
    Cpf(String),
    Cnpj(String),
}

impl InscricaoFederal {
    /// Parse a CPF (11 digits) or CNPJ (14 digits), ignoring punctuation.
    pub fn parse(documento: &str) -> Result<Self> {
        let digits: String = documento.chars().filter(char::is_ascii_digit).collect();
        match digits.len() {
            11 => Ok(Self::Cpf(digits)),
            14 => Ok(Self::Cnpj(digits)),
            _ => Err(DpsError::InvalidInput(format!(
                "prestador document '{documento}' is neither a CPF nor a CNPJ"
            ))),
        }
    }

    /// Inscription type code used in the DPS `Id`.
    pub fn type_code(&self) -> char {
        match self {
            Self::Cpf(_) => '1',
            Self::Cnpj(_) => '2',
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cpf(_) => "CPF",
            Self::Cnpj(_) => "CNPJ",
        }
    }

    pub fn digits(&self) -> &str {
        match self {
            Self::Cpf(d) | Self::Cnpj(d) => d,
        }
    }
}

/// Build the 45-character DPS identifier.
///
/// Layout: `DPS` + municipality (7) + inscription type (1) + inscription
/// (14, zero-padded) + série (5, zero-padded) + number (15, zero-padded).
///
/// # Examples
/// ```
/// use nfse_dps::builder::{dps_id, InscricaoFederal};
///
/// let cnpj = InscricaoFederal::parse("12.345.678/0001-95").unwrap();
/// let id = dps_id("3550308", &cnpj, "1", "42").unwrap();
/// assert_eq!(id, "DPS355030821234567800019500001000000000000042");
/// assert_eq!(id.len(), 45);
/// ```
pub fn dps_id(
    municipio: &str,
    inscricao: &InscricaoFederal,
    serie: &str,
    numero: &str,
) -> Result<String> {
    let municipio = municipio.trim();
    if !MUNICIPIO_PATTERN.is_match(municipio) {
        return Err(DpsError::InvalidInput(format!(
            "municipio '{municipio}' must be a 7-digit IBGE code"
        )));
    }
    let serie = digits_field(serie, 5, "serie")?;
    let numero = digits_field(numero, 15, "numero")?;

    Ok(format!(
        "DPS{municipio}{}{:0>14}{serie:0>5}{numero:0>15}",
        inscricao.type_code(),
        inscricao.digits(),
    ))
}

fn digits_field<'a>(value: &'a str, max_len: usize, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() || value.len() > max_len || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(DpsError::InvalidInput(format!(
            "{field} '{value}' must be 1 to {max_len} digits"
        )));
    }
    Ok(value)
}

/// Build a complete unsigned DPS document.
///
/// Input data problems are reported before anything is written, so the
/// writer never sees a half-built document.
#[tracing::instrument(skip_all, fields(serie = %document.cabecalho.serie, numero = %document.cabecalho.numero))]
pub fn build_dps(document: &DpsDocument) -> Result<String> {
    let context = DpsContext::from_input(&document.contexto)?;
    let cabecalho = &document.cabecalho;
    let prestador = &document.prestador;

    let inscricao = InscricaoFederal::parse(&prestador.documento)?;
    let id = dps_id(
        &cabecalho.municipio_emissor,
        &inscricao,
        &cabecalho.serie,
        &cabecalho.numero,
    )?;

    let valor = document.valores.valor_servico.trim();
    if !AMOUNT_PATTERN.is_match(valor) {
        return Err(DpsError::InvalidInput(format!(
            "valorServico '{valor}' is not a decimal amount"
        )));
    }

    tracing::debug!(%id, servico = %context.servico.kind.tipo(), tomador = %context.tomador.kind.tipo(), "building DPS");

    let mut w = XmlWriter::new();
    w.declaration();
    w.open_with_attrs("DPS", &[("xmlns", NFSE_NAMESPACE), ("versao", DPS_VERSION)]);
    w.open_with_attrs(SIGNED_ELEMENT, &[("Id", &id)]);

    w.leaf("tpAmb", cabecalho.ambiente.code());
    w.leaf(
        "dhEmi",
        &cabecalho.emitido_em.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
    );
    w.leaf("verAplic", APP_VERSION);
    w.leaf("serie", cabecalho.serie.trim());
    w.leaf("nDPS", cabecalho.numero.trim());
    w.leaf("dCompet", &cabecalho.competencia.format("%Y-%m-%d").to_string());
    w.leaf("tpEmit", &cabecalho.tipo_emitente.to_string());
    w.leaf("cLocEmi", cabecalho.municipio_emissor.trim());

    w.open("prest");
    w.leaf(inscricao.tag(), inscricao.digits());
    w.leaf_opt("IM", prestador.inscricao_municipal.as_deref());
    w.leaf_opt("fone", prestador.telefone.as_deref());
    w.leaf_opt("email", prestador.email.as_deref());
    w.open("regTrib");
    w.leaf("opSimpNac", &prestador.opcao_simples_nacional.to_string());
    w.leaf("regEspTrib", &prestador.regime_especial.to_string());
    w.close("regTrib");
    w.close("prest");

    build_tomador(&mut w, &context);

    w.open("serv");
    build_servico(&mut w, &context);
    w.close("serv");

    w.open("valores");
    w.open("vServPrest");
    w.leaf("vServ", valor);
    w.close("vServPrest");
    w.open("trib");
    w.open("tribMun");
    w.leaf("tribISSQN", &document.valores.tributacao_issqn.to_string());
    w.leaf("tpRetISSQN", &document.valores.retencao_issqn.to_string());
    w.close("tribMun");
    w.open("totTrib");
    w.leaf("indTotTrib", "0");
    w.close("totTrib");
    w.close("trib");
    w.close("valores");

    w.close(SIGNED_ELEMENT);
    w.close("DPS");
    Ok(w.finish())
}
