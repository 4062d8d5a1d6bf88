//! Normalización de la salida del modelo antes de parsearla.
//!
//! Cada regla es una transformación de texto con nombre propio, aplicada en
//! orden y una sola vez. Aquí vive toda la cirugía con regex; el parser no
//! vuelve a tocar el texto.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Regla de normalización con nombre.
#[derive(Clone, Copy)]
pub struct NormalizationRule {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

impl std::fmt::Debug for NormalizationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizationRule")
            .field("name", &self.name)
            .finish()
    }
}

/// Reglas por defecto, en orden de aplicación.
pub const DEFAULT_RULES: [NormalizationRule; 5] = [
    NormalizationRule {
        name: "line-endings",
        apply: normalize_line_endings,
    },
    NormalizationRule {
        name: "code-fences",
        apply: strip_code_fences,
    },
    NormalizationRule {
        name: "import-lines",
        apply: strip_import_lines,
    },
    NormalizationRule {
        name: "void-tags",
        apply: self_close_void_tags,
    },
    NormalizationRule {
        name: "double-escaped-entities",
        apply: fix_double_escaped_entities,
    },
];

static CODE_FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[^\n]*\n(.*?)```").expect("invalid code fence regex")
});

static IMPORT_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s[^\n]*\n?"#).expect("invalid import regex")
});

static VOID_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<(area|base|br|col|embed|hr|img|input|link|meta|source|track|wbr)(\s(?:[^>"'{]|"[^"]*"|'[^']*'|\{[^}]*\})*?)?\s*(/?)>"#,
    )
    .expect("invalid void tag regex")
});

static DOUBLE_ESCAPED_ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&amp;(#[0-9]+|#x[0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);")
        .expect("invalid entity regex")
});

/// Aplica las reglas por defecto.
pub fn normalize(input: &str) -> String {
    normalize_with(input, &DEFAULT_RULES)
}

/// Aplica una lista de reglas arbitraria, en orden.
pub fn normalize_with(input: &str, rules: &[NormalizationRule]) -> String {
    rules
        .iter()
        .fold(input.to_string(), |text, rule| (rule.apply)(&text))
}

pub fn normalize_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Si hay un bloque de código Markdown, se queda sólo con su contenido.
pub fn strip_code_fences(input: &str) -> String {
    match CODE_FENCE_REGEX.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

pub fn strip_import_lines(input: &str) -> String {
    IMPORT_LINE_REGEX.replace_all(input, "").into_owned()
}

/// `<br>` → `<br />`, `<img src="a">` → `<img src="a" />`.
pub fn self_close_void_tags(input: &str) -> String {
    VOID_TAG_REGEX
        .replace_all(input, |caps: &Captures| {
            if !caps[3].is_empty() {
                return caps[0].to_string();
            }
            let attrs = caps.get(2).map(|m| m.as_str().trim_end()).unwrap_or("");
            format!("<{}{} />", &caps[1], attrs)
        })
        .into_owned()
}

/// `&amp;nbsp;` → `&nbsp;`
pub fn fix_double_escaped_entities(input: &str) -> String {
    DOUBLE_ESCAPED_ENTITY_REGEX
        .replace_all(input, "&$1;")
        .into_owned()
}
