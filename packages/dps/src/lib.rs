//! NFS-e DPS - Build, normalize and check service-provision declarations.
//!
//! This crate assembles the XML of a DPS (Declaração de Prestação de
//! Serviço) for the national NFS-e authority, repairs the placement of the
//! XML-DSig signature an external signer adds, extracts the interesting
//! fields from authority responses and runs an advisory XSD check through an
//! external engine.
//!
//! # Example
//!
//! ```
//! use nfse_dps::{normalize_signature_placement, parse_authority_fields};
//!
//! let signed = "<DPS><infDPS><a/><Signature>S</Signature></infDPS></DPS>";
//! let fixed = normalize_signature_placement(signed);
//! assert!(fixed.contains("</infDPS><Signature>S</Signature>"));
//!
//! let fields = parse_authority_fields(Some("<NFSe><nNFSe>9</nNFSe></NFSe>"));
//! assert_eq!(fields.numero_nfse.as_deref(), Some("9"));
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Constants and validator engine configuration
//! - [`types`]: Raw input record and the typed build context
//! - [`error`]: Error types and Result alias
//! - [`xml`]: Streaming writer and tag scanning
//! - [`builder`]: Section builders and full document assembly
//! - [`signature`]: Signature placement normalizer
//! - [`extract`]: Field extraction from authority responses
//! - [`validator`]: Advisory XSD validation dispatcher
//! - [`emission`]: Build, sign, normalize and check in one call
//! - [`cli`]: Command-line interface

pub mod builder;
pub mod cli;
pub mod config;
pub mod emission;
pub mod error;
pub mod extract;
pub mod signature;
pub mod types;
pub mod validator;
pub mod xml;

// Re-export the main operations
pub use builder::{build_dps, build_servico, build_tomador, DpsDocument};
pub use emission::{prepare_for_transmission, DpsSigner, PreparedDps};
pub use extract::{parse_authority_fields, ParsedFields};
pub use signature::normalize_signature_placement;
pub use validator::{HttpXsdEngine, XsdDispatcher, XsdEngine, XsdResult};

// Re-export commonly used items
pub use config::ValidatorConfig;
pub use error::{DpsError, Result};
pub use types::{DpsContext, DpsInput, ServicoTipo, TomadorTipo};
pub use xml::XmlWriter;
