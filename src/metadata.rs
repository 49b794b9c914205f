//! Document identity fields derived from bounded pattern windows.
//!
//! Every field is optional. A miss leaves the field empty and never blocks
//! chunking.

use tracing::debug;

use crate::model::{DEFAULT_DOC_ID, HeadingBlock, PfDocumentMetadata};
use crate::patterns::PatternLibrary;
use crate::util::{lead_window, slug_join};

const NUMBERING_WINDOW_BYTES: usize = 4000;
const DATE_WINDOW_BYTES: usize = 2000;

const FONTE_BOLETIM: &str = "Boletim de Serviço DPF";
const FONTE_DOU: &str = "DOU";
const SITUACAO_REVOGADA: &str = "revogada";

pub fn extract_metadata(
    patterns: &PatternLibrary,
    text: &str,
    heading: &HeadingBlock,
    source_file: &str,
) -> PfDocumentMetadata {
    let numbering = patterns.numbering(lead_window(text, NUMBERING_WINDOW_BYTES));
    let data_publicacao = patterns.brazilian_date(lead_window(text, DATE_WINDOW_BYTES));
    let lowered = text.to_lowercase();

    let (especie, numero, ano, unidade, numero_completo) = match numbering {
        Some(found) => {
            let ano = found.ano.clone().or_else(|| {
                patterns
                    .brazilian_date(&found.numero_completo)
                    .map(|iso| iso[..4].to_string())
            });
            (
                Some(found.especie),
                found.numero,
                ano,
                Some(found.unidade),
                Some(found.numero_completo),
            )
        }
        None => (None, None, None, None, None),
    };

    let doc_id = canonical_doc_id(
        especie.as_deref(),
        numero.as_deref(),
        ano.as_deref(),
        unidade.as_deref(),
    );

    let data_vigencia = lowered
        .contains("entra em vigor na data de sua publicação")
        .then(|| data_publicacao.clone())
        .flatten();

    debug!(
        source = source_file,
        doc_id = %doc_id,
        numbered = numero_completo.is_some(),
        "metadata extracted"
    );

    PfDocumentMetadata {
        doc_id,
        especie_normativa: especie,
        numero,
        ano,
        numero_completo,
        data_publicacao,
        data_vigencia,
        situacao: publication_status(&lowered),
        fonte_publicacao: publication_source(&lowered),
        processo_ref: patterns.sei_process(text),
        unidade_emitente: unidade,
        ementa: heading.ementa.clone(),
        preambulo: heading.preambulo.clone(),
        considerandos: heading.considerandos.clone(),
        anexos_presentes: heading.anexos_presentes.clone(),
    }
}

/// Slug of species, number, year and unit; the constant default when none is known.
pub fn canonical_doc_id(
    especie: Option<&str>,
    numero: Option<&str>,
    ano: Option<&str>,
    unidade: Option<&str>,
) -> String {
    let joined = slug_join([especie, numero, ano, unidade].into_iter().flatten());
    if joined.is_empty() {
        DEFAULT_DOC_ID.to_string()
    } else {
        joined
    }
}

fn publication_source(lowered: &str) -> Option<String> {
    if lowered.contains("boletim de serviço") || lowered.contains("boletim de servico") {
        return Some(FONTE_BOLETIM.to_string());
    }
    let mentions_dou = lowered
        .split(|ch: char| !ch.is_alphanumeric())
        .any(|word| word == "dou");
    if mentions_dou || lowered.contains("diário oficial") || lowered.contains("diario oficial") {
        return Some(FONTE_DOU.to_string());
    }
    None
}

fn publication_status(lowered: &str) -> Option<String> {
    (lowered.contains("fica revogada") || lowered.contains("revogam-se"))
        .then(|| SITUACAO_REVOGADA.to_string())
}
