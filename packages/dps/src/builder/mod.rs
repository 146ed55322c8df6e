//! Document-section builders.
//!
//! Each builder writes one part of the DPS onto a shared [`XmlWriter`],
//! dispatching on the context's variants. Element names and order follow the
//! national schema and are not configurable.
//!
//! [`XmlWriter`]: crate::xml::XmlWriter

mod dps;
mod servico;
mod tomador;

pub use dps::{
    build_dps, dps_id, Cabecalho, DpsDocument, InscricaoFederal, Prestador, Valores,
};
pub use servico::{build_servico, municipal_code};
pub use tomador::{build_tomador, has_foreign_address, has_national_address};
