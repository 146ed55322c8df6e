//! Input and context types for DPS assembly.
//!
//! [`DpsInput`] is the flat record produced by upstream forms and lookups.
//! It is converted once into a [`DpsContext`], whose variants carry only the
//! fields relevant to them, before any XML is built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DpsError, Result};
use crate::xml::present;

/// Kind of service being declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServicoTipo {
    #[default]
    Normal,
    Exportacao,
    Construcao,
}

impl ServicoTipo {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Exportacao => "EXPORTACAO",
            Self::Construcao => "CONSTRUCAO",
        }
    }
}

impl FromStr for ServicoTipo {
    type Err = DpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "NORMAL" => Ok(Self::Normal),
            "EXPORTACAO" => Ok(Self::Exportacao),
            "CONSTRUCAO" => Ok(Self::Construcao),
            _ => Err(DpsError::UnknownServicoTipo(s.to_string())),
        }
    }
}

impl fmt::Display for ServicoTipo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of service recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TomadorTipo {
    #[default]
    Nacional,
    Estrangeiro,
    Anonimo,
}

impl TomadorTipo {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nacional => "NACIONAL",
            Self::Estrangeiro => "ESTRANGEIRO",
            Self::Anonimo => "ANONIMO",
        }
    }
}

impl FromStr for TomadorTipo {
    type Err = DpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "NACIONAL" => Ok(Self::Nacional),
            "ESTRANGEIRO" => Ok(Self::Estrangeiro),
            "ANONIMO" => Ok(Self::Anonimo),
            _ => Err(DpsError::UnknownTomadorTipo(s.to_string())),
        }
    }
}

impl fmt::Display for TomadorTipo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment a document belongs to (`tpAmb`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ambiente {
    Producao,
    Homologacao,
}

impl Ambiente {
    /// Code written to `tpAmb`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Producao => "1",
            Self::Homologacao => "2",
        }
    }

    /// Parse a `tpAmb` code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(Self::Producao),
            "2" => Some(Self::Homologacao),
            _ => None,
        }
    }
}

/// Element name carrying a national tomador's document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentoTag {
    Cnpj,
    Cpf,
    Nif,
}

impl DocumentoTag {
    /// Element name as written to the document.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cnpj => "CNPJ",
            Self::Cpf => "CPF",
            Self::Nif => "NIF",
        }
    }
}

impl FromStr for DocumentoTag {
    type Err = DpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CNPJ" => Ok(Self::Cnpj),
            "CPF" => Ok(Self::Cpf),
            "NIF" => Ok(Self::Nif),
            _ => Err(DpsError::UnknownDocumentoTag(s.to_string())),
        }
    }
}

/// Raw tomador data as captured by the upstream form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TomadorBase {
    pub documento: Option<String>,
    pub nome: Option<String>,
    pub email: Option<String>,
    pub telefone: Option<String>,
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub complemento: Option<String>,
    pub bairro: Option<String>,
    pub codigo_pais: Option<String>,
    pub codigo_postal_exterior: Option<String>,
    pub cidade_exterior: Option<String>,
    pub estado_exterior: Option<String>,
}

/// Export details, read only for `EXPORTACAO` services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Exportacao {
    pub pais_destino: Option<String>,
    pub justificativa: Option<String>,
}

/// Construction-work details, read only for `CONSTRUCAO` services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Construcao {
    pub codigo_obra: Option<String>,
    pub codigo_art: Option<String>,
}

/// Nested optional groups of the raw input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawGroups {
    pub exportacao: Option<Exportacao>,
    pub construcao: Option<Construcao>,
    pub tomador: TomadorBase,
}

/// Flat per-build record produced by upstream validation and lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DpsInput {
    pub servico_tipo: Option<String>,
    pub tomador_tipo: Option<String>,
    pub tomador_documento: Option<String>,
    pub tomador_documento_tag: Option<String>,
    pub telefone: Option<String>,
    pub codigo_municipio: Option<String>,
    pub cep: Option<String>,
    pub codigo_local_prestacao: Option<String>,
    pub codigo_tributacao_nacional: Option<String>,
    pub codigo_tributacao_municipal: Option<String>,
    pub codigo_nbs: Option<String>,
    pub codigo_interno: Option<String>,
    pub descricao: Option<String>,
    pub informacoes_complementares: Option<String>,
    pub input: RawGroups,
}

/// Service section of a DPS.
#[derive(Debug, Clone, PartialEq)]
pub struct Servico {
    pub c_loc_prestacao: String,
    pub c_trib_nac: String,
    pub c_trib_mun: Option<String>,
    pub x_desc_serv: String,
    pub c_nbs: String,
    pub c_int_contrib: Option<String>,
    pub x_inf_comp: Option<String>,
    pub kind: ServicoKind,
}

/// Service variant with its own fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ServicoKind {
    Normal,
    Exportacao(Exportacao),
    Construcao(Construcao),
}

impl ServicoKind {
    pub fn tipo(&self) -> ServicoTipo {
        match self {
            Self::Normal => ServicoTipo::Normal,
            Self::Exportacao(_) => ServicoTipo::Exportacao,
            Self::Construcao(_) => ServicoTipo::Construcao,
        }
    }
}

/// A national tomador's document with the element it is written under.
#[derive(Debug, Clone, PartialEq)]
pub struct Documento {
    pub tag: DocumentoTag,
    pub numero: String,
}

/// Tomador variant with its own identification.
#[derive(Debug, Clone, PartialEq)]
pub enum TomadorKind {
    Nacional { documento: Option<Documento> },
    Estrangeiro { id_estrangeiro: Option<String> },
    Anonimo,
}

impl TomadorKind {
    pub fn tipo(&self) -> TomadorTipo {
        match self {
            Self::Nacional { .. } => TomadorTipo::Nacional,
            Self::Estrangeiro { .. } => TomadorTipo::Estrangeiro,
            Self::Anonimo => TomadorTipo::Anonimo,
        }
    }
}

/// Address data for the tomador.
///
/// `codigo_municipio` and `cep` come from the context (master-data lookup);
/// the rest is raw form data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Endereco {
    pub codigo_municipio: Option<String>,
    pub cep: Option<String>,
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub complemento: Option<String>,
    pub bairro: Option<String>,
    pub codigo_pais: Option<String>,
    pub codigo_postal_exterior: Option<String>,
    pub cidade_exterior: Option<String>,
    pub estado_exterior: Option<String>,
}

/// Tomador section of a DPS.
#[derive(Debug, Clone, PartialEq)]
pub struct Tomador {
    pub kind: TomadorKind,
    pub nome: String,
    pub telefone: Option<String>,
    pub email: Option<String>,
    pub endereco: Endereco,
}

/// Typed per-build context consumed by the builders.
#[derive(Debug, Clone, PartialEq)]
pub struct DpsContext {
    pub servico: Servico,
    pub tomador: Tomador,
}

impl DpsContext {
    /// Convert raw input, reading variant groups only for the active variant.
    pub fn from_input(input: &DpsInput) -> Result<Self> {
        let servico_tipo = match present(input.servico_tipo.as_deref()) {
            Some(s) => s.parse()?,
            None => ServicoTipo::default(),
        };
        let tomador_tipo = match present(input.tomador_tipo.as_deref()) {
            Some(s) => s.parse()?,
            None => TomadorTipo::default(),
        };

        let servico = Servico {
            c_loc_prestacao: required(&input.codigo_local_prestacao, "codigoLocalPrestacao")?,
            c_trib_nac: required(&input.codigo_tributacao_nacional, "codigoTributacaoNacional")?,
            c_trib_mun: input.codigo_tributacao_municipal.clone(),
            x_desc_serv: required(&input.descricao, "descricao")?,
            c_nbs: required(&input.codigo_nbs, "codigoNbs")?,
            c_int_contrib: input.codigo_interno.clone(),
            x_inf_comp: input.informacoes_complementares.clone(),
            kind: match servico_tipo {
                ServicoTipo::Normal => ServicoKind::Normal,
                ServicoTipo::Exportacao => {
                    ServicoKind::Exportacao(input.input.exportacao.clone().unwrap_or_default())
                }
                ServicoTipo::Construcao => {
                    ServicoKind::Construcao(input.input.construcao.clone().unwrap_or_default())
                }
            },
        };

        let base = &input.input.tomador;
        let kind = match tomador_tipo {
            TomadorTipo::Nacional => {
                let tag = present(input.tomador_documento_tag.as_deref())
                    .map(DocumentoTag::from_str)
                    .transpose()?;
                let documento = match (tag, present(input.tomador_documento.as_deref())) {
                    (Some(tag), Some(numero)) => Some(Documento {
                        tag,
                        numero: numero.to_string(),
                    }),
                    _ => None,
                };
                TomadorKind::Nacional { documento }
            }
            TomadorTipo::Estrangeiro => TomadorKind::Estrangeiro {
                id_estrangeiro: present(input.tomador_documento.as_deref())
                    .or_else(|| present(base.documento.as_deref()))
                    .map(str::to_string),
            },
            TomadorTipo::Anonimo => TomadorKind::Anonimo,
        };

        let tomador = Tomador {
            kind,
            nome: base.nome.as_deref().map(str::trim).unwrap_or_default().to_string(),
            telefone: present(input.telefone.as_deref())
                .or_else(|| present(base.telefone.as_deref()))
                .map(str::to_string),
            email: base.email.clone(),
            endereco: Endereco {
                codigo_municipio: input.codigo_municipio.clone(),
                cep: input.cep.clone(),
                logradouro: base.logradouro.clone(),
                numero: base.numero.clone(),
                complemento: base.complemento.clone(),
                bairro: base.bairro.clone(),
                codigo_pais: base.codigo_pais.clone(),
                codigo_postal_exterior: base.codigo_postal_exterior.clone(),
                cidade_exterior: base.cidade_exterior.clone(),
                estado_exterior: base.estado_exterior.clone(),
            },
        };

        Ok(Self { servico, tomador })
    }
}

impl TryFrom<&DpsInput> for DpsContext {
    type Error = DpsError;

    fn try_from(input: &DpsInput) -> Result<Self> {
        Self::from_input(input)
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String> {
    present(value.as_deref())
        .map(str::to_string)
        .ok_or_else(|| DpsError::InvalidInput(format!("{field} is required")))
}
