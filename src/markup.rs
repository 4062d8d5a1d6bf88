//! Árbol de marcado tolerante y su serialización.
//!
//! La serialización respeta el texto original de todo lo que no se toca:
//! texto, comentarios, comillas de los atributos, expresiones JSX y la
//! capitalización de las etiquetas.

use crate::identity::IDENTITY_ATTR;

/// Elementos que nunca tienen hijos.
pub const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elementos cuyo contenido es texto crudo.
pub const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

pub fn is_raw_text(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

/// Valor de un atributo tal y como aparecía en el fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// `disabled`
    Empty,
    /// `class="a"` / `class='a'`
    Quoted { quote: char, text: String },
    /// `value={count + 1}`; guarda el texto entre las llaves exteriores.
    Expression(String),
    /// `width=100`
    Unquoted(String),
}

impl AttrValue {
    pub fn quoted(text: impl Into<String>) -> Self {
        AttrValue::Quoted {
            quote: '"',
            text: text.into(),
        }
    }

    /// Texto literal del valor; `None` para expresiones y atributos vacíos.
    pub fn literal(&self) -> Option<&str> {
        match self {
            AttrValue::Quoted { text, .. } | AttrValue::Unquoted(text) => Some(text),
            AttrValue::Empty | AttrValue::Expression(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: AttrValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Nombre tal y como aparece en el fuente. Vacío para `<>…</>`.
    pub tag: String,
    pub attrs: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Escrito como `<x />` en el fuente.
    pub self_closing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    /// Comentarios y declaraciones (`<!-- -->`, `<!DOCTYPE>`), verbatim.
    Raw(String),
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    /// Nombre de etiqueta en minúsculas.
    pub fn kind(&self) -> String {
        self.tag.to_ascii_lowercase()
    }

    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.name == name)
    }

    fn attr_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attrs.iter_mut().find(|a| a.name == name)
    }

    /// Sustituye el valor del atributo o lo añade al final.
    pub fn set_attr(&mut self, name: &str, value: AttrValue) {
        match self.attr_mut(name) {
            Some(attr) => attr.value = value,
            None => self.attrs.push(Attribute::new(name, value)),
        }
    }

    /// Valor literal del atributo de identidad, si existe.
    pub fn identity(&self) -> Option<&str> {
        self.attr(IDENTITY_ATTR).and_then(|a| a.value.literal())
    }

    /// Fija el atributo de identidad conservando su posición si ya existía.
    pub fn set_identity(&mut self, id: &str) {
        self.set_attr(IDENTITY_ATTR, AttrValue::quoted(id));
    }

    /// Primer elemento (DFS, incluido `self`) con la identidad dada.
    pub fn find_by_identity(&self, id: &str) -> Option<&Element> {
        if self.identity() == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|child| match child {
            Node::Element(el) => el.find_by_identity(id),
            _ => None,
        })
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

/// Serializa una secuencia de nodos.
pub fn serialize_nodes(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(el) => write_element(el, out),
        Node::Text(text) | Node::Raw(text) => out.push_str(text),
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for attr in &el.attrs {
        out.push(' ');
        write_attr(attr, out);
    }

    if el.self_closing {
        out.push_str(" />");
        return;
    }
    out.push('>');
    if is_void(&el.tag) && el.children.is_empty() {
        return;
    }

    for child in &el.children {
        write_node(child, out);
    }
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

fn write_attr(attr: &Attribute, out: &mut String) {
    out.push_str(&attr.name);
    match &attr.value {
        AttrValue::Empty => {}
        AttrValue::Quoted { quote, text } => {
            out.push('=');
            out.push(*quote);
            out.push_str(text);
            out.push(*quote);
        }
        AttrValue::Expression(expr) => {
            out.push_str("={");
            out.push_str(expr);
            out.push('}');
        }
        AttrValue::Unquoted(text) => {
            out.push('=');
            out.push_str(text);
        }
    }
}

/// Primer nodo elemento de una secuencia.
pub fn first_element(nodes: &[Node]) -> Option<&Element> {
    nodes.iter().find_map(|n| match n {
        Node::Element(el) => Some(el),
        _ => None,
    })
}

/// Único elemento raíz de la secuencia, ignorando texto en blanco alrededor.
pub fn single_root(nodes: &[Node]) -> Option<&Element> {
    let mut roots = nodes.iter().filter(|n| match n {
        Node::Text(t) => !t.trim().is_empty(),
        Node::Raw(_) => false,
        Node::Element(_) => true,
    });
    match (roots.next(), roots.next()) {
        (Some(Node::Element(el)), None) => Some(el),
        _ => None,
    }
}
