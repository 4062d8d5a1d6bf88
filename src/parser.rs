//! Parser tolerante del marcado generado por el modelo.
//!
//! Flujo:
//!   1. Buscar un bloque `return ( … ); }` y quedarse con su contenido.
//!   2. Si no existe, aceptar la entrada si es un único elemento completo.
//!   3. Si tampoco, devolver un fragmento de error autocontenido.
//!   4. Construir el árbol sin rechazar nunca la entrada: etiquetas sin
//!      cerrar, cierres sueltos y mayúsculas/minúsculas mezcladas se toleran.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::{
    identity::IdScope,
    markup::{is_raw_text, is_void, AttrValue, Attribute, Element, Node},
    models::Fragment,
};

/// Texto fijo del fragmento de error.
pub const MALFORMED_NOTICE: &str =
    "No se pudo interpretar el componente generado. Intenta reformular la petición.";

static RETURN_BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)return\s*\((.*)\)\s*;?\s*\}").expect("invalid return block regex")
});

static OPENING_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<([A-Za-z][\w.:-]*)?[\s/>]").expect("invalid opening tag regex")
});

static CLOSING_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</\s*([A-Za-z][\w.:-]*)?\s*>$").expect("invalid closing tag regex")
});

/// Marcado de trabajo ya parseado.
#[derive(Debug, Clone)]
pub struct Document {
    /// Texto extraído de la salida del modelo.
    pub working: String,
    pub nodes: Vec<Node>,
}

/// Resultado etiquetado: árbol o fragmento de error terminal.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Parsed(Document),
    Malformed(Fragment),
}

/// Parsea la salida (ya normalizada) del modelo.
pub fn parse_source(input: &str, ids: &mut IdScope<'_>) -> ParseOutcome {
    match extract_working_markup(input) {
        Some(working) => {
            let nodes = parse_markup(&working);
            debug!("Marcado de trabajo parseado: {} nodos raíz", nodes.len());
            ParseOutcome::Parsed(Document { working, nodes })
        }
        None => {
            warn!(
                "La salida del modelo no contiene marcado reconocible ({} caracteres)",
                input.len()
            );
            ParseOutcome::Malformed(malformed_fragment(&ids.fresh()))
        }
    }
}

/// Localiza el marcado de trabajo dentro de la salida del modelo.
pub fn extract_working_markup(input: &str) -> Option<String> {
    if let Some(caps) = RETURN_BLOCK_REGEX.captures(input) {
        let working = caps[1].trim();
        if !working.is_empty() {
            return Some(working.to_string());
        }
    }

    let trimmed = input.trim();
    if is_single_element(trimmed) {
        return Some(trimmed.to_string());
    }
    None
}

/// `true` si el texto empieza con una etiqueta de apertura y termina con un
/// cierre del mismo nombre, o es una única etiqueta autocerrada.
///
/// Sólo se comparan la primera apertura y el último cierre: `<a></a><a></a>`
/// también pasa, y el árbol resultante tiene varias raíces.
fn is_single_element(text: &str) -> bool {
    if text.starts_with('<') && text.ends_with("/>") && OPENING_TAG_REGEX.is_match(text) {
        return find_tag_end(text, 0) == Some(text.len() - 1);
    }

    let (Some(open), Some(close)) = (
        OPENING_TAG_REGEX.captures(text),
        CLOSING_TAG_REGEX.captures(text),
    ) else {
        return false;
    };
    let open_name = open.get(1).map(|m| m.as_str()).unwrap_or("");
    let close_name = close.get(1).map(|m| m.as_str()).unwrap_or("");
    let close_start = close.get(0).map(|m| m.start()).unwrap_or(0);
    close_start > 0 && open_name.eq_ignore_ascii_case(close_name)
}

/// Fragmento de error autocontenido, renderizable por sí solo.
pub fn malformed_fragment(id: &str) -> Fragment {
    let content = format!(
        r#"<div data-id="{id}" className="p-6 rounded-lg border border-red-300 bg-red-50 text-red-700">{MALFORMED_NOTICE}</div>"#
    );
    Fragment::new(id, "div", content, Utc::now())
}

/// Construye el árbol de nodos. Nunca falla.
pub fn parse_markup(input: &str) -> Vec<Node> {
    let bytes = input.as_bytes();
    let mut builder = TreeBuilder::default();
    let mut i = 0usize;
    let mut text_start = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let rest = &input[i..];

        if rest.starts_with("<!--") {
            builder.text(&input[text_start..i]);
            let end = rest.find("-->").map(|e| i + e + 3).unwrap_or(input.len());
            builder.push(Node::Raw(input[i..end].to_string()));
            i = end;
            text_start = i;
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            builder.text(&input[text_start..i]);
            let end = find_tag_end(input, i).map(|e| e + 1).unwrap_or(input.len());
            builder.push(Node::Raw(input[i..end].to_string()));
            i = end;
            text_start = i;
            continue;
        }

        if rest.starts_with("</") {
            let Some(end) = find_tag_end(input, i) else {
                break;
            };
            builder.text(&input[text_start..i]);
            builder.close(input[i + 2..end].trim());
            i = end + 1;
            text_start = i;
            continue;
        }

        let next = bytes.get(i + 1).copied().unwrap_or(b' ');
        if !(next.is_ascii_alphabetic() || next == b'>') {
            // `a < b`: texto
            i += 1;
            continue;
        }

        let Some(end) = find_tag_end(input, i) else {
            break;
        };
        builder.text(&input[text_start..i]);
        let element = parse_start_tag(&input[i + 1..end]);
        i = end + 1;

        if is_raw_text(&element.tag) && !element.self_closing {
            let (body_end, resume) = find_raw_text_end(input, i, &element.tag);
            let mut element = element;
            if body_end > i {
                element.children.push(Node::Text(input[i..body_end].to_string()));
            }
            builder.push(Node::Element(element));
            i = resume;
        } else {
            builder.open(element);
        }
        text_start = i;
    }

    builder.text(&input[text_start.min(input.len())..]);
    builder.finish()
}

/// Analiza el interior de una etiqueta de apertura (`div className="a"`).
fn parse_start_tag(inside: &str) -> Element {
    let trimmed = inside.trim();
    let self_closing = trimmed.ends_with('/');
    let core = if self_closing {
        trimmed[..trimmed.len() - 1].trim_end()
    } else {
        trimmed
    };

    let name_end = core
        .char_indices()
        .find(|(_, c)| c.is_whitespace() || *c == '{')
        .map(|(idx, _)| idx)
        .unwrap_or(core.len());

    let mut element = Element::new(&core[..name_end]);
    element.attrs = parse_attributes(&core[name_end..]);
    element.self_closing = self_closing;
    element
}

fn parse_attributes(input: &str) -> Vec<Attribute> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        // `{...props}`
        if bytes[i] == b'{' {
            let end = scan_braced(input, i);
            out.push(Attribute::new(&input[i..end], AttrValue::Empty));
            i = end;
            continue;
        }

        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'{'
        {
            i += 1;
        }
        if i == name_start {
            i += 1;
            continue;
        }
        let name = input[name_start..i].to_string();

        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'=' {
            out.push(Attribute::new(name, AttrValue::Empty));
            continue;
        }
        i = j + 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            out.push(Attribute::new(name, AttrValue::quoted("")));
            break;
        }

        let value = match bytes[i] {
            quote @ (b'"' | b'\'') => {
                let start = i + 1;
                let mut k = start;
                while k < bytes.len() && bytes[k] != quote {
                    k += 1;
                }
                let text = input[start..k].to_string();
                i = (k + 1).min(bytes.len());
                AttrValue::Quoted {
                    quote: quote as char,
                    text,
                }
            }
            b'{' => {
                let end = scan_braced(input, i);
                let inner_end = if input[..end].ends_with('}') { end - 1 } else { end };
                let expr = input[i + 1..inner_end.max(i + 1)].to_string();
                i = end;
                AttrValue::Expression(expr)
            }
            _ => {
                let start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                AttrValue::Unquoted(input[start..i].to_string())
            }
        };
        out.push(Attribute::new(name, value));
    }

    out
}

/// Índice (exclusivo) tras la llave que cierra la abierta en `start`.
/// Respeta comillas y plantillas. Si no se cierra, devuelve el final.
fn scan_braced(input: &str, start: usize) -> usize {
    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' | b'`' => quote = Some(b),
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Posición del `>` que cierra la etiqueta abierta en `lt_idx`, ignorando
/// los que aparecen entre comillas o dentro de expresiones `{…}`.
fn find_tag_end(input: &str, lt_idx: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = lt_idx + 1;
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'`' if depth > 0 => quote = Some(b),
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'>' if depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Fin del contenido de `<script>`/`<style>` y posición para continuar.
fn find_raw_text_end(input: &str, from: usize, tag: &str) -> (usize, usize) {
    let needle = format!("</{}", tag.to_ascii_lowercase());
    let lower = input[from..].to_ascii_lowercase();
    match lower.find(&needle) {
        Some(rel) => {
            let close_start = from + rel;
            let resume = input[close_start..]
                .find('>')
                .map(|e| close_start + e + 1)
                .unwrap_or(input.len());
            (close_start, resume)
        }
        None => (input.len(), input.len()),
    }
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Element>,
    roots: Vec<Node>,
}

impl TreeBuilder {
    fn push(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }

    fn text(&mut self, text: &str) {
        if !text.is_empty() {
            self.push(Node::Text(text.to_string()));
        }
    }

    fn open(&mut self, element: Element) {
        if element.self_closing || is_void(&element.tag) {
            self.push(Node::Element(element));
        } else {
            self.stack.push(element);
        }
    }

    /// Cierra el elemento abierto más cercano con ese nombre. Los que quedan
    /// por encima se cierran implícitamente; un cierre sin pareja se ignora.
    fn close(&mut self, name: &str) {
        let Some(pos) = self
            .stack
            .iter()
            .rposition(|el| el.tag.eq_ignore_ascii_case(name))
        else {
            debug!("Etiqueta de cierre sin pareja ignorada: </{}>", name);
            return;
        };
        while self.stack.len() > pos {
            if let Some(el) = self.stack.pop() {
                self.push(Node::Element(el));
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while let Some(el) = self.stack.pop() {
            self.push(Node::Element(el));
        }
        self.roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SequentialIds;
    use crate::markup::{serialize_nodes, single_root};

    fn root(markup: &str) -> Element {
        let nodes = parse_markup(markup);
        single_root(&nodes).cloned().expect("single root element")
    }

    #[test]
    fn extracts_return_block_with_nested_parentheses() {
        let src = "function X(){ const f = (a) => a; return (\n  <div onClick={() => f(1)}>(hola)</div>\n); }";
        assert_eq!(
            extract_working_markup(src).as_deref(),
            Some("<div onClick={() => f(1)}>(hola)</div>")
        );
    }

    #[test]
    fn sibling_roots_with_same_tag_pass_as_bare_markup() {
        let working = extract_working_markup(r#"<div data-id="a"></div><div data-id="b"></div>"#)
            .expect("working markup");
        assert_eq!(parse_markup(&working).len(), 2);
    }

    #[test]
    fn accepts_bare_element_with_matching_close() {
        assert!(extract_working_markup("  <Section a=\"1\"><p>x</p></section>\n").is_some());
        assert!(extract_working_markup("<>\n<p>a</p>\n</>").is_some());
        assert!(extract_working_markup("<Hero data-id=\"h\" title={t} />").is_some());
        assert!(extract_working_markup("<br /> texto <br />").is_none());
        assert!(extract_working_markup("<div>a</span>").is_none());
        assert!(extract_working_markup("solo texto").is_none());
    }

    #[test]
    fn malformed_input_yields_fallback_fragment() {
        let mut ids = SequentialIds::new("err");
        let mut scope = IdScope::new(&mut ids);
        match parse_source("esto no es marcado", &mut scope) {
            ParseOutcome::Malformed(fragment) => {
                assert_eq!(fragment.id, "err-1");
                assert_eq!(fragment.element_kind, "div");
                assert!(fragment.content.contains(MALFORMED_NOTICE));
                assert!(fragment.content.contains("data-id=\"err-1\""));
            }
            ParseOutcome::Parsed(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn round_trips_untouched_markup() {
        let markup = r#"<div data-id="a" className='x'><p>Hola {user.name}</p><!-- nota --><img src="a.png" /><Button onClick={() => setOpen(v => !v)} disabled>Abrir</Button></div>"#;
        assert_eq!(serialize_nodes(&parse_markup(markup)), markup);
    }

    #[test]
    fn attribute_expression_may_contain_gt_and_braces() {
        let el = root(r#"<div style={{ color: a > b ? "red" : "blue" }} data-id="s1">x</div>"#);
        assert_eq!(el.identity(), Some("s1"));
        assert_eq!(
            el.attr("style").map(|a| a.value.clone()),
            Some(AttrValue::Expression(r#"{ color: a > b ? "red" : "blue" }"#.to_string()))
        );
    }

    #[test]
    fn tolerates_unclosed_void_and_stray_closing_tags() {
        let el = root("<DIV data-id=\"r\"><br><span>a</b></span>");
        assert_eq!(el.kind(), "div");
        assert_eq!(el.children.len(), 2);
        assert_eq!(el.to_markup(), "<DIV data-id=\"r\"><br><span>a</span></DIV>");
    }

    #[test]
    fn auto_closes_inner_elements_on_outer_close() {
        let el = root("<ul><li>a<li>b</ul>");
        assert_eq!(el.to_markup(), "<ul><li>a<li>b</li></li></ul>");
    }

    #[test]
    fn jsx_children_with_map_expressions_are_parsed() {
        let el = root(r#"<ul data-id="list">{items.map(i => <li key={i} data-id={`item-${i}`}>{i}</li>)}</ul>"#);
        let li = el
            .children
            .iter()
            .find_map(|n| match n {
                Node::Element(e) => Some(e),
                _ => None,
            })
            .expect("li element");
        assert_eq!(li.tag, "li");
        assert_eq!(li.identity(), None);
    }

    #[test]
    fn script_body_is_raw_text() {
        let el = root("<div><script>if (a<b) { x = '</p>'; }</script></div>");
        assert_eq!(el.to_markup(), "<div><script>if (a<b) { x = '</p>'; }</script></div>");
    }

    #[test]
    fn less_than_in_text_is_not_a_tag() {
        let el = root("<p>{a < 3 && <b>ok</b>}</p>");
        assert_eq!(el.to_markup(), "<p>{a < 3 && <b>ok</b>}</p>");
    }

    #[test]
    fn spread_attributes_survive() {
        let el = root("<Card {...props} data-id=\"c\" />");
        assert!(el.self_closing);
        assert_eq!(el.to_markup(), "<Card {...props} data-id=\"c\" />");
    }
}
