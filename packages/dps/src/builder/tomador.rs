//! `toma` section.

use crate::types::{DpsContext, Endereco, TomadorKind};
use crate::xml::{present, XmlWriter};

/// Emit the `toma` element for `context`.
///
/// Identification depends on the tomador variant; name, address, phone and
/// email follow in that order for every variant.
pub fn build_tomador(w: &mut XmlWriter, context: &DpsContext) {
    let tomador = &context.tomador;

    w.open("toma");
    match &tomador.kind {
        TomadorKind::Nacional { documento } => {
            if let Some(doc) = documento {
                w.leaf_opt(doc.tag.as_str(), Some(&doc.numero));
            }
        }
        TomadorKind::Estrangeiro { id_estrangeiro } => {
            w.leaf_opt("idEstrangeiro", id_estrangeiro.as_deref());
        }
        TomadorKind::Anonimo => {}
    }

    w.leaf("xNome", tomador.nome.trim());
    build_endereco(w, &tomador.endereco, &tomador.kind);
    w.leaf_opt("fone", tomador.telefone.as_deref());
    w.leaf_opt("email", tomador.email.as_deref());
    w.close("toma");
}

/// Whether the national address block applies.
pub fn has_national_address(endereco: &Endereco) -> bool {
    has_street(endereco)
        || present(endereco.codigo_municipio.as_deref()).is_some()
        || present(endereco.cep.as_deref()).is_some()
}

/// Whether the foreign address block applies. Only foreign tomadores have one.
pub fn has_foreign_address(endereco: &Endereco, kind: &TomadorKind) -> bool {
    matches!(kind, TomadorKind::Estrangeiro { .. })
        && (has_street(endereco)
            || [
                &endereco.codigo_pais,
                &endereco.codigo_postal_exterior,
                &endereco.cidade_exterior,
                &endereco.estado_exterior,
            ]
            .iter()
            .any(|field| present(field.as_deref()).is_some()))
}

fn has_street(endereco: &Endereco) -> bool {
    [
        &endereco.logradouro,
        &endereco.numero,
        &endereco.complemento,
        &endereco.bairro,
    ]
    .iter()
    .any(|field| present(field.as_deref()).is_some())
}

/// Emit `end`, or nothing when neither block applies.
///
/// Street fields are siblings of `endNac` but children of `endExt`. The
/// schema requires exactly this shape.
fn build_endereco(w: &mut XmlWriter, endereco: &Endereco, kind: &TomadorKind) {
    let national = has_national_address(endereco);
    let foreign = has_foreign_address(endereco, kind);
    if !national && !foreign {
        return;
    }

    w.open("end");
    if national {
        w.open("endNac");
        w.leaf_opt("cMun", endereco.codigo_municipio.as_deref());
        w.leaf_opt("CEP", endereco.cep.as_deref());
        w.close("endNac");
        write_street(w, endereco);
    }
    if foreign {
        w.open("endExt");
        w.leaf_opt("cPais", endereco.codigo_pais.as_deref());
        w.leaf_opt("cEndPost", endereco.codigo_postal_exterior.as_deref());
        w.leaf_opt("xCidade", endereco.cidade_exterior.as_deref());
        w.leaf_opt("xEstProvReg", endereco.estado_exterior.as_deref());
        write_street(w, endereco);
        w.close("endExt");
    }
    w.close("end");
}

fn write_street(w: &mut XmlWriter, endereco: &Endereco) {
    w.leaf_opt("xLgr", endereco.logradouro.as_deref());
    w.leaf_opt("nro", endereco.numero.as_deref());
    w.leaf_opt("xCpl", endereco.complemento.as_deref());
    w.leaf_opt("xBairro", endereco.bairro.as_deref());
}
