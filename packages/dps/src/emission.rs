//! Preparation of a DPS for transmission.
//!
//! Signing happens outside this crate. The flow here is: build the unsigned
//! document, hand it to a [`DpsSigner`], move the signature to its schema
//! position and ask the validation engine for an advisory opinion.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::builder::{build_dps, DpsDocument};
use crate::config::SIGNED_ELEMENT;
use crate::error::{DpsError, Result};
use crate::signature::normalize_signature_placement;
use crate::validator::{XsdDispatcher, XsdEngine, XsdResult};

/// External XML-DSig signer.
#[async_trait]
pub trait DpsSigner: Send + Sync {
    /// Sign `element` of `unsigned_xml` with the certificate `certificate_id`
    /// and return the full signed document.
    async fn sign(&self, unsigned_xml: &str, element: &str, certificate_id: &str)
        -> Result<String>;
}

/// Signed, normalized document together with the schema opinion.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedDps {
    pub xml: String,
    pub validation: XsdResult,
}

impl PreparedDps {
    /// Whether the engine positively rejected the document.
    pub fn rejected(&self) -> bool {
        !self.validation.valid
    }
}

/// Build, sign, normalize and check one DPS.
///
/// Input and signer errors propagate. Validation engine trouble never does;
/// it shows up as a warning in [`PreparedDps::validation`].
#[tracing::instrument(skip_all, fields(certificate = %certificate_id))]
pub async fn prepare_for_transmission<S, E>(
    document: &DpsDocument,
    signer: &S,
    certificate_id: &str,
    dispatcher: &XsdDispatcher<E>,
) -> Result<PreparedDps>
where
    S: DpsSigner + ?Sized,
    E: XsdEngine,
{
    if certificate_id.trim().is_empty() {
        return Err(DpsError::InvalidInput("certificate id is required".into()));
    }

    let unsigned = build_dps(document)?;
    let signed = signer
        .sign(&unsigned, SIGNED_ELEMENT, certificate_id)
        .await?;
    if signed.trim().is_empty() {
        return Err(DpsError::Signing("signer returned an empty document".into()));
    }

    let xml = normalize_signature_placement(&signed);
    let validation = dispatcher.validate_against_xsd(&xml, None, None).await?;

    if validation.valid {
        info!(advisory = validation.is_advisory_only(), "DPS ready for transmission");
    } else {
        warn!(errors = validation.errors.len(), "validation engine rejected DPS");
    }
    Ok(PreparedDps { xml, validation })
}

/// Test utilities for the emission flow.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::*;

    /// Signer that inserts a fixed signature just before `</infDPS>`, the way
    /// enveloped signers commonly misplace it.
    pub struct EmbeddingSigner {
        pub signature: String,
    }

    impl EmbeddingSigner {
        pub fn new(signature: impl Into<String>) -> Self {
            Self {
                signature: signature.into(),
            }
        }
    }

    #[async_trait]
    impl DpsSigner for EmbeddingSigner {
        async fn sign(&self, unsigned_xml: &str, element: &str, _certificate_id: &str) -> Result<String> {
            let close = format!("</{element}>");
            let Some(at) = unsigned_xml.find(&close) else {
                return Err(DpsError::Signing(format!("element {element} not found")));
            };
            let mut out = unsigned_xml.to_string();
            out.insert_str(at, &self.signature);
            Ok(out)
        }
    }

    /// Signer that always fails.
    pub struct FailingSigner;

    #[async_trait]
    impl DpsSigner for FailingSigner {
        async fn sign(&self, _: &str, _: &str, certificate_id: &str) -> Result<String> {
            Err(DpsError::Signing(format!("certificate {certificate_id} expired")))
        }
    }
}
