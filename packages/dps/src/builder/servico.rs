//! `serv` section content.

use crate::types::{DpsContext, ServicoKind};
use crate::xml::{present, XmlWriter};

/// Emit the content of the `serv` element for `context`.
///
/// The caller opens and closes `serv`. Order is fixed by the national schema:
/// `locPrest`, `cServ`, the variant block, then `infoCompl`.
pub fn build_servico(w: &mut XmlWriter, context: &DpsContext) {
    let servico = &context.servico;

    w.open("locPrest");
    w.leaf("cLocPrestacao", servico.c_loc_prestacao.trim());
    w.close("locPrest");

    w.open("cServ");
    w.leaf("cTribNac", servico.c_trib_nac.trim());
    if let Some(c_trib_mun) = municipal_code(servico.c_trib_mun.as_deref()) {
        w.leaf("cTribMun", c_trib_mun);
    }
    w.leaf("xDescServ", servico.x_desc_serv.trim());
    w.leaf("cNBS", servico.c_nbs.trim());
    w.leaf_opt("cIntContrib", servico.c_int_contrib.as_deref());
    w.close("cServ");

    match &servico.kind {
        ServicoKind::Normal => {}
        ServicoKind::Exportacao(exportacao) => {
            w.open("exportacao");
            w.leaf_opt("paisDest", exportacao.pais_destino.as_deref());
            w.leaf_opt("xJust", exportacao.justificativa.as_deref());
            w.close("exportacao");
        }
        ServicoKind::Construcao(construcao) => {
            w.open("obra");
            w.leaf_opt("cObra", construcao.codigo_obra.as_deref());
            w.leaf_opt("cArt", construcao.codigo_art.as_deref());
            w.close("obra");
        }
    }

    if present(servico.x_inf_comp.as_deref()).is_some() {
        w.open("infoCompl");
        w.leaf_opt("xInfComp", servico.x_inf_comp.as_deref());
        w.close("infoCompl");
    }
}

/// Municipal tax code to emit, if any.
///
/// Blank and numerically-zero codes ("0", "00", "0.0") are suppressed; the
/// comparison is numeric on the trimmed value, not textual. Non-numeric
/// codes are always emitted.
pub fn municipal_code(value: Option<&str>) -> Option<&str> {
    let code = present(value)?;
    if code.parse::<f64>().is_ok_and(|n| n == 0.0) {
        tracing::debug!(code, "suppressing numerically zero cTribMun");
        return None;
    }
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Construcao, Endereco, Exportacao, Servico, Tomador, TomadorKind,
    };
    use pretty_assertions::assert_eq;

    fn context(kind: ServicoKind) -> DpsContext {
        DpsContext {
            servico: Servico {
                c_loc_prestacao: "3550308".into(),
                c_trib_nac: "010101".into(),
                c_trib_mun: None,
                x_desc_serv: "Consultoria".into(),
                c_nbs: "115013000".into(),
                c_int_contrib: None,
                x_inf_comp: None,
                kind,
            },
            tomador: Tomador {
                kind: TomadorKind::Anonimo,
                nome: String::new(),
                telefone: None,
                email: None,
                endereco: Endereco::default(),
            },
        }
    }

    fn render(ctx: &DpsContext) -> String {
        let mut w = XmlWriter::new();
        build_servico(&mut w, ctx);
        w.finish()
    }

    #[test]
    fn test_normal_skeleton() {
        assert_eq!(
            render(&context(ServicoKind::Normal)),
            "<locPrest><cLocPrestacao>3550308</cLocPrestacao></locPrest>\
             <cServ><cTribNac>010101</cTribNac><xDescServ>Consultoria</xDescServ>\
             <cNBS>115013000</cNBS></cServ>"
        );
    }

    #[test]
    fn test_optional_skeleton_fields() {
        let mut ctx = context(ServicoKind::Normal);
        ctx.servico.c_trib_mun = Some(" 001 ".into());
        ctx.servico.c_int_contrib = Some("INT-9".into());
        ctx.servico.x_inf_comp = Some("Pedido 42".into());
        assert_eq!(
            render(&ctx),
            "<locPrest><cLocPrestacao>3550308</cLocPrestacao></locPrest>\
             <cServ><cTribNac>010101</cTribNac><cTribMun>001</cTribMun>\
             <xDescServ>Consultoria</xDescServ><cNBS>115013000</cNBS>\
             <cIntContrib>INT-9</cIntContrib></cServ>\
             <infoCompl><xInfComp>Pedido 42</xInfComp></infoCompl>"
        );
    }

    #[test]
    fn test_zero_municipal_code_suppressed() {
        for zero in ["0", "00", " 0 ", "000", "0.0"] {
            let mut ctx = context(ServicoKind::Normal);
            ctx.servico.c_trib_mun = Some(zero.into());
            assert!(!render(&ctx).contains("cTribMun"), "{zero:?} should be suppressed");
        }
    }

    #[test]
    fn test_municipal_code() {
        assert_eq!(municipal_code(None), None);
        assert_eq!(municipal_code(Some("   ")), None);
        assert_eq!(municipal_code(Some("00")), None);
        assert_eq!(municipal_code(Some(" 10 ")), Some("10"));
        assert_eq!(municipal_code(Some("0A")), Some("0A"));
    }

    #[test]
    fn test_exportacao_block() {
        let ctx = context(ServicoKind::Exportacao(Exportacao {
            pais_destino: Some("US".into()),
            justificativa: None,
        }));
        let xml = render(&ctx);
        assert!(xml.contains("</cServ><exportacao><paisDest>US</paisDest></exportacao>"));
        assert!(!xml.contains("xJust"));
    }

    #[test]
    fn test_construcao_without_art() {
        let ctx = context(ServicoKind::Construcao(Construcao {
            codigo_obra: Some("123".into()),
            codigo_art: None,
        }));
        let xml = render(&ctx);
        assert!(xml.contains("<obra><cObra>123</cObra></obra>"));
        assert!(!xml.contains("cArt"));
    }

    #[test]
    fn test_variant_block_precedes_info_compl() {
        let mut ctx = context(ServicoKind::Construcao(Construcao {
            codigo_obra: None,
            codigo_art: Some("ART-1".into()),
        }));
        ctx.servico.x_inf_comp = Some("obs".into());
        assert!(render(&ctx).ends_with(
            "<obra><cArt>ART-1</cArt></obra><infoCompl><xInfComp>obs</xInfComp></infoCompl>"
        ));
    }
}
