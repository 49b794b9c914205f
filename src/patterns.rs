//! Line-anchored matchers for Brazilian normative drafting conventions.
//!
//! Every matcher is stateless and operates on one trimmed line. Which
//! matchers are consulted for a given line, and in what order, is decided by
//! the structure detector.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;

use crate::model::Level;

/// A structural heading recognised on a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub level: Level,
    pub label: String,
    pub title: Option<String>,
}

/// Species, number, year and issuing unit found in the numbering line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberingMatch {
    pub especie: String,
    pub numero: Option<String>,
    pub ano: Option<String>,
    pub unidade: String,
    pub numero_completo: String,
}

struct MatcherSpec {
    level: Level,
    pattern: &'static str,
}

/// Macro headings in detection priority order. Capture 1 is the keyword as
/// written, capture 2 the numeral, capture 3 the optional title.
const MACRO_SPECS: [MatcherSpec; 7] = [
    MatcherSpec {
        level: Level::Parte,
        pattern: r"(?i)^(PARTE)\s+([IVXLCDM]+|\d+[ºo°]?|[ÚU]NICA)\s*(?:[-–—:]\s*(.*))?$",
    },
    MatcherSpec {
        level: Level::Livro,
        pattern: r"(?i)^(LIVRO)\s+([IVXLCDM]+|\d+[ºo°]?|[ÚU]NICO)\s*(?:[-–—:]\s*(.*))?$",
    },
    MatcherSpec {
        level: Level::Titulo,
        pattern: r"(?i)^(T[ÍI]TULO)\s+([IVXLCDM]+|\d+[ºo°]?|[ÚU]NICO)\s*(?:[-–—:]\s*(.*))?$",
    },
    MatcherSpec {
        level: Level::Capitulo,
        pattern: r"(?i)^(CAP[ÍI]TULO)\s+([IVXLCDM]+|\d+[ºo°]?|[ÚU]NICO)\s*(?:[-–—:]\s*(.*))?$",
    },
    MatcherSpec {
        level: Level::Secao,
        pattern: r"(?i)^(SE[ÇC][ÃA]O)\s+([IVXLCDM]+|\d+[ºo°]?|[ÚU]NICA)\s*(?:[-–—:]\s*(.*))?$",
    },
    MatcherSpec {
        level: Level::Subsecao,
        pattern: r"(?i)^(SUBSE[ÇC][ÃA]O)\s+([IVXLCDM]+|\d+[ºo°]?|[ÚU]NICA)\s*(?:[-–—:]\s*(.*))?$",
    },
    MatcherSpec {
        level: Level::Anexo,
        pattern: r"(?i)^(ANEXO)\s+([IVXLCDM]+|\d+|[ÚU]NICO)\s*(?:[-–—:]\s*(.*))?$",
    },
];

/// Dispositivo levels in detection priority order.
pub const DISPOSITIVO_ORDER: [Level; 5] = [
    Level::Artigo,
    Level::Paragrafo,
    Level::Inciso,
    Level::Alinea,
    Level::Item,
];

const MONTHS: [(&str, u32); 13] = [
    ("janeiro", 1),
    ("fevereiro", 2),
    ("março", 3),
    ("marco", 3),
    ("abril", 4),
    ("maio", 5),
    ("junho", 6),
    ("julho", 7),
    ("agosto", 8),
    ("setembro", 9),
    ("outubro", 10),
    ("novembro", 11),
    ("dezembro", 12),
];

pub fn month_number(name: &str) -> Option<u32> {
    let lowered = name.trim().to_lowercase();
    MONTHS
        .iter()
        .find(|(month, _)| *month == lowered)
        .map(|(_, number)| *number)
}

#[derive(Debug)]
pub struct PatternLibrary {
    macros: Vec<(Level, Regex)>,
    artigo: Regex,
    paragrafo: Regex,
    paragrafo_unico: Regex,
    inciso: Regex,
    alinea: Regex,
    item: Regex,
    roman: Regex,
    ementa: Regex,
    preambulo: Regex,
    numeracao: Regex,
    sei_processo: Regex,
    data_extenso: Regex,
}

impl PatternLibrary {
    pub fn new() -> Result<Self> {
        let mut macros = Vec::with_capacity(MACRO_SPECS.len());
        for spec in &MACRO_SPECS {
            let regex = Regex::new(spec.pattern)
                .with_context(|| format!("failed to compile {} heading regex", spec.level))?;
            macros.push((spec.level, regex));
        }

        Ok(Self {
            macros,
            artigo: Regex::new(
                r"(?i)^Art(?:igo)?\.?\s*(\d+)([ºo°])?(?-i:-([A-Z]))?\s*\.?\s*(?:[-–—:]\s*)?(.*)$",
            )
            .context("failed to compile artigo regex")?,
            paragrafo: Regex::new(r"^§\s*(\d+)([ºo°])?\s*\.?\s*(?:[-–—:]\s*)?(.*)$")
                .context("failed to compile paragrafo regex")?,
            paragrafo_unico: Regex::new(
                r"(?i)^Par[aá]grafo\s+[úu]nico\b\.?\s*(?:[-–—:.]\s*)?(.*)$",
            )
            .context("failed to compile paragrafo unico regex")?,
            inciso: Regex::new(r"^([IVXLCDM]+)\s*(?:[-–—)]|\.(?:\s|$))\s*(.*)$")
                .context("failed to compile inciso regex")?,
            alinea: Regex::new(r"^([a-z])\s*(?:\)|[-–—](?:\s|$)|\.(?:\s|$))\s*(.*)$")
                .context("failed to compile alinea regex")?,
            item: Regex::new(r"^(\d{1,3})\s*(?:[)\-–—]|\.(?:\s|$))\s*(.*)$")
                .context("failed to compile item regex")?,
            roman: Regex::new(
                r"(?i)^M{0,4}(?:CM|CD|D?C{0,3})(?:XC|XL|L?X{0,3})(?:IX|IV|V?I{0,3})$",
            )
            .context("failed to compile roman numeral regex")?,
            ementa: Regex::new(
                r"(?i)\b(?:Disp[õóo]e\s+sobre|Estabelece|Regulamenta|Altera|Aprova|Define|Institui)\b",
            )
            .context("failed to compile ementa regex")?,
            preambulo: Regex::new(
                r"(?im)^\s*O\s+(?:DIRETOR-GERAL(?:\s+DA\s+POL[ÍI]CIA\s+FEDERAL)?|DIRETOR-EXECUTIVO|SECRET[ÁA]RIO-EXECUTIVO|COORDENADOR-GERAL|SUPERINTENDENTE(?:\s+REGIONAL)?)\b[\s\S]{0,220}?no\s+uso\s+de\s+suas\s+atribui[cç][õo]es",
            )
            .context("failed to compile preambulo regex")?,
            numeracao: Regex::new(
                r"(?i)\b(Portaria|Instru[çc][ãa]o\s+Normativa|Resolu[çc][ãa]o|Ordem\s+Interna|Despacho)\b.*?\bn[ºo°]\.?\s*([\d.\-]+)/?(\d{4})?.{0,80}?\b(?-i:(DG/DPF|DIREX/DPF|[A-Z]{2,5}/DPF|SR/PF-[A-Z]{2}|PF))\b",
            )
            .context("failed to compile numbering regex")?,
            sei_processo: Regex::new(r"\b(\d{5,}\.\d{6}/\d{4}-[A-Z]{2})\b")
                .context("failed to compile SEI process regex")?,
            data_extenso: Regex::new(
                r"(?i)\bde\s+(\d{1,2})[ºo°]?\s+de\s+([a-zçãéíô]+)\s+de\s+(\d{4})",
            )
            .context("failed to compile date regex")?,
        })
    }

    /// Strict Roman-numeral grammar; rejects the empty string.
    pub fn is_roman(&self, candidate: &str) -> bool {
        !candidate.is_empty() && self.roman.is_match(candidate)
    }

    /// First macro heading matching `line`, in priority order.
    pub fn match_macro(&self, line: &str) -> Option<LineMatch> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        self.macros
            .iter()
            .find_map(|(level, regex)| self.capture_macro(*level, regex, line))
    }

    /// Roman-looking numerals must pass the validator so words such as
    /// "CIVIL" are not read as headings.
    fn capture_macro(&self, level: Level, regex: &Regex, line: &str) -> Option<LineMatch> {
        let captures = regex.captures(line)?;
        let keyword = captures.get(1)?.as_str();
        let numeral = captures.get(2)?.as_str();
        if numeral.chars().all(|ch| "IVXLCDMivxlcdm".contains(ch)) && !self.is_roman(numeral) {
            return None;
        }
        let title = captures
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .filter(|title| !title.is_empty());

        Some(LineMatch {
            level,
            label: format!("{keyword} {numeral}"),
            title,
        })
    }

    /// Matches `line` against one dispositivo level. Inciso candidates must
    /// also pass the Roman-numeral validator.
    pub fn match_dispositivo(&self, level: Level, line: &str) -> Option<LineMatch> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match level {
            Level::Artigo => {
                let captures = self.artigo.captures(line)?;
                let number = captures.get(1)?.as_str();
                let ordinal = if captures.get(2).is_some() { "º" } else { "" };
                let suffix = captures
                    .get(3)
                    .map(|m| format!("-{}", m.as_str()))
                    .unwrap_or_default();
                Some(LineMatch {
                    level,
                    label: format!("Art. {number}{ordinal}{suffix}"),
                    title: None,
                })
            }
            Level::Paragrafo => {
                if let Some(captures) = self.paragrafo.captures(line) {
                    let number = captures.get(1)?.as_str();
                    let ordinal = if captures.get(2).is_some() { "º" } else { "" };
                    return Some(LineMatch {
                        level,
                        label: format!("§ {number}{ordinal}"),
                        title: None,
                    });
                }
                self.paragrafo_unico.is_match(line).then(|| LineMatch {
                    level,
                    label: "Parágrafo Único".to_string(),
                    title: None,
                })
            }
            Level::Inciso => {
                let captures = self.inciso.captures(line)?;
                let numeral = captures.get(1)?.as_str();
                if !self.is_roman(numeral) {
                    return None;
                }
                Some(LineMatch {
                    level,
                    label: numeral.to_string(),
                    title: None,
                })
            }
            Level::Alinea => {
                let captures = self.alinea.captures(line)?;
                Some(LineMatch {
                    level,
                    label: format!("{})", captures.get(1)?.as_str()),
                    title: None,
                })
            }
            Level::Item => {
                let captures = self.item.captures(line)?;
                Some(LineMatch {
                    level,
                    label: captures.get(1)?.as_str().to_string(),
                    title: None,
                })
            }
            _ => None,
        }
    }

    /// Every level whose matcher accepts `line`, without stack gating.
    pub fn matching_levels(&self, line: &str) -> Vec<Level> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let mut levels = self
            .macros
            .iter()
            .filter_map(|(level, regex)| self.capture_macro(*level, regex, trimmed))
            .map(|found| found.level)
            .collect::<Vec<Level>>();
        for level in DISPOSITIVO_ORDER {
            if self.match_dispositivo(level, trimmed).is_some() {
                levels.push(level);
            }
        }
        levels
    }

    pub fn is_ementa_line(&self, line: &str) -> bool {
        self.ementa.is_match(line)
    }

    /// Byte offset where the issuing-authority preamble starts.
    pub fn preamble_start(&self, window: &str) -> Option<usize> {
        self.preambulo.find(window).map(|m| {
            let matched = m.as_str();
            m.start() + (matched.len() - matched.trim_start().len())
        })
    }

    pub fn numbering(&self, window: &str) -> Option<NumberingMatch> {
        let captures = self.numeracao.captures(window)?;
        let especie = captures.get(1)?.as_str().to_string();
        let numero = captures
            .get(2)
            .map(|m| {
                m.as_str()
                    .chars()
                    .filter(|ch| ch.is_ascii_digit())
                    .collect::<String>()
            })
            .filter(|digits| !digits.is_empty());
        let ano = captures.get(3).map(|m| m.as_str().to_string());
        let unidade = captures.get(4)?.as_str().to_string();
        let numero_completo = captures.get(0)?.as_str().trim().to_string();

        Some(NumberingMatch {
            especie,
            numero,
            ano,
            unidade,
            numero_completo,
        })
    }

    pub fn sei_process(&self, text: &str) -> Option<String> {
        self.sei_processo
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// First "de D de MÊS de AAAA" date in `window`, as an ISO `YYYY-MM-DD`
    /// string. Unknown month names and impossible dates yield `None`.
    pub fn brazilian_date(&self, window: &str) -> Option<String> {
        let captures = self.data_extenso.captures(window)?;
        let day = captures.get(1)?.as_str().parse::<u32>().ok()?;
        let month = month_number(captures.get(2)?.as_str())?;
        let year = captures.get(3)?.as_str().parse::<i32>().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(date.format("%Y-%m-%d").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> PatternLibrary {
        PatternLibrary::new().expect("patterns compile")
    }

    #[test]
    fn macro_headings_capture_label_and_title() {
        let patterns = library();

        let chapter = patterns
            .match_macro("CAPÍTULO I - DAS DISPOSIÇÕES GERAIS")
            .expect("chapter matches");
        assert_eq!(chapter.level, Level::Capitulo);
        assert_eq!(chapter.label, "CAPÍTULO I");
        assert_eq!(chapter.title.as_deref(), Some("DAS DISPOSIÇÕES GERAIS"));

        let section = patterns.match_macro("Seção II").expect("section matches");
        assert_eq!(section.level, Level::Secao);
        assert_eq!(section.title, None);

        let sub = patterns
            .match_macro("SUBSEÇÃO III: Dos Prazos")
            .expect("subsection matches");
        assert_eq!(sub.level, Level::Subsecao);

        let annex = patterns
            .match_macro("ANEXO I – Formulário")
            .expect("annex matches");
        assert_eq!(annex.level, Level::Anexo);
        assert_eq!(annex.label, "ANEXO I");
        assert_eq!(annex.title.as_deref(), Some("Formulário"));

        assert_eq!(
            patterns.match_macro("LIVRO II").map(|m| m.level),
            Some(Level::Livro)
        );
        assert_eq!(
            patterns.match_macro("Título IV").map(|m| m.level),
            Some(Level::Titulo)
        );
    }

    #[test]
    fn macro_headings_reject_invalid_roman_words() {
        let patterns = library();
        assert!(patterns.match_macro("TÍTULO CIVIL").is_none());
        assert!(patterns.match_macro("Seção de pessoal").is_none());
        assert!(patterns.match_macro("   ").is_none());
    }

    #[test]
    fn artigo_labels_keep_ordinal_and_suffix() {
        let patterns = library();
        let art = patterns
            .match_dispositivo(Level::Artigo, "Art. 5º Esta norma entra em vigor.")
            .expect("article matches");
        assert_eq!(art.label, "Art. 5º");

        let art = patterns
            .match_dispositivo(Level::Artigo, "Art. 12. Revogam-se as disposições.")
            .expect("article matches");
        assert_eq!(art.label, "Art. 12");

        let art = patterns
            .match_dispositivo(Level::Artigo, "Art. 7-A Fica acrescido.")
            .expect("article matches");
        assert_eq!(art.label, "Art. 7-A");

        let art = patterns
            .match_dispositivo(Level::Artigo, "Art. 3 - a norma se aplica")
            .expect("article matches");
        assert_eq!(art.label, "Art. 3");
    }

    #[test]
    fn paragrafo_matches_section_sign_and_unico() {
        let patterns = library();
        assert_eq!(
            patterns
                .match_dispositivo(Level::Paragrafo, "§ 1º O procedimento...")
                .map(|m| m.label),
            Some("§ 1º".to_string())
        );
        assert_eq!(
            patterns
                .match_dispositivo(Level::Paragrafo, "Parágrafo Único As exceções...")
                .map(|m| m.label),
            Some("Parágrafo Único".to_string())
        );
        assert_eq!(
            patterns
                .match_dispositivo(Level::Paragrafo, "Parágrafo único. O disposto...")
                .map(|m| m.label),
            Some("Parágrafo Único".to_string())
        );
    }

    #[test]
    fn inciso_requires_valid_roman_numeral_and_separator() {
        let patterns = library();
        assert_eq!(
            patterns
                .match_dispositivo(Level::Inciso, "I - do procedimento")
                .map(|m| m.label),
            Some("I".to_string())
        );
        assert_eq!(
            patterns
                .match_dispositivo(Level::Inciso, "XIV – da competência")
                .map(|m| m.label),
            Some("XIV".to_string())
        );
        assert!(patterns.match_dispositivo(Level::Inciso, "IIII - invalid").is_none());
        assert!(patterns.match_dispositivo(Level::Inciso, "IMPORTANTE").is_none());
        assert!(patterns.match_dispositivo(Level::Inciso, "DA COMPETÊNCIA").is_none());
    }

    #[test]
    fn alinea_and_item_require_closing_punctuation() {
        let patterns = library();
        assert_eq!(
            patterns
                .match_dispositivo(Level::Alinea, "a) item de lista")
                .map(|m| m.label),
            Some("a)".to_string())
        );
        assert!(
            patterns
                .match_dispositivo(Level::Alinea, "e os demais servidores")
                .is_none()
        );
        assert_eq!(
            patterns
                .match_dispositivo(Level::Item, "1. primeiro")
                .map(|m| m.label),
            Some("1".to_string())
        );
        assert!(patterns.match_dispositivo(Level::Item, "1.234 pessoas").is_none());
        assert!(patterns.match_dispositivo(Level::Item, "2024 - ano").is_none());
    }

    #[test]
    fn roman_validator_follows_strict_grammar() {
        let patterns = library();
        for valid in ["I", "IV", "IX", "XL", "XCIX", "MMXXIV", "iii"] {
            assert!(patterns.is_roman(valid), "{valid} should be valid");
        }
        for invalid in ["", "IIII", "VV", "IC", "CIVIL", "ABC"] {
            assert!(!patterns.is_roman(invalid), "{invalid} should be invalid");
        }
    }

    #[test]
    fn numbering_captures_species_number_year_and_unit() {
        let patterns = library();
        let found = patterns
            .numbering("Instrução Normativa nº 12/2023-DIREX/DPF")
            .expect("numbering matches");
        assert!(found.especie.to_lowercase().starts_with("instru"));
        assert_eq!(found.numero.as_deref(), Some("12"));
        assert_eq!(found.ano.as_deref(), Some("2023"));
        assert_eq!(found.unidade, "DIREX/DPF");

        let found = patterns
            .numbering("PORTARIA Nº 1.234, de 1º de março de 2024 – DG/DPF")
            .expect("numbering matches");
        assert_eq!(found.numero.as_deref(), Some("1234"));
        assert_eq!(found.ano, None);
        assert_eq!(found.unidade, "DG/DPF");
    }

    #[test]
    fn sei_process_and_dates() {
        let patterns = library();
        assert_eq!(
            patterns.sei_process("Processo SEI nº 08200.012345/2023-AB referente"),
            Some("08200.012345/2023-AB".to_string())
        );
        assert_eq!(patterns.sei_process("sem processo"), None);

        assert_eq!(
            patterns.brazilian_date("Brasília, de 1º de março de 2024."),
            Some("2024-03-01".to_string())
        );
        assert_eq!(
            patterns.brazilian_date("de 15 de Dezembro de 2021"),
            Some("2021-12-15".to_string())
        );
        assert_eq!(patterns.brazilian_date("de 31 de fevereiro de 2021"), None);
        assert_eq!(patterns.brazilian_date("de 3 de brumário de 2021"), None);
    }

    #[test]
    fn ementa_and_preamble_heuristics() {
        let patterns = library();
        assert!(patterns.is_ementa_line("Dispõe sobre procedimentos de teste."));
        assert!(patterns.is_ementa_line("Institui o programa de integridade."));
        assert!(!patterns.is_ementa_line("Brasília, 1º de março de 2024."));

        let text = "PORTARIA\n\nO DIRETOR-GERAL DA POLÍCIA FEDERAL, no uso de suas atribuições, resolve:";
        let start = patterns.preamble_start(text).expect("preamble found");
        assert!(text[start..].starts_with("O DIRETOR-GERAL"));
    }

    #[test]
    fn month_lookup_accepts_accented_and_plain_forms() {
        assert_eq!(month_number("Março"), Some(3));
        assert_eq!(month_number("marco"), Some(3));
        assert_eq!(month_number("dezembro"), Some(12));
        assert_eq!(month_number("december"), None);
    }
}
