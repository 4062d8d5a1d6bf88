//! Localización y sustitución de un subárbol identificado dentro del
//! contenido de un fragmento.

use tracing::debug;

use crate::{
    markup::{first_element, serialize_nodes, AttrValue, Attribute, Element, Node},
    parser::parse_markup,
};

/// Atributos de clase reconocidos (JSX y HTML).
const CLASS_ATTRS: [&str; 2] = ["className", "class"];
const STYLE_ATTR: &str = "style";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpliceError {
    #[error("no existe ningún elemento con data-id=\"{0}\"")]
    NotFound(String),
    #[error("el contenido del fragmento no contiene ningún elemento")]
    MalformedContent,
    #[error("el contenido de reemplazo no contiene ningún elemento")]
    EmptyReplacement,
}

/// Marcado serializado del primer elemento (DFS) con la identidad dada.
pub fn locate(content: &str, target: &str) -> Result<String, SpliceError> {
    let nodes = parse_markup(content);
    if first_element(&nodes).is_none() {
        return Err(SpliceError::MalformedContent);
    }
    nodes
        .iter()
        .find_map(|node| match node {
            Node::Element(el) => el.find_by_identity(target),
            _ => None,
        })
        .map(Element::to_markup)
        .ok_or_else(|| SpliceError::NotFound(target.to_string()))
}

/// Sustituye in situ el primer elemento con la identidad `target` por
/// `replacement` y devuelve el contenido completo reserializado.
///
/// Con `preserve_style`, la clase previa se antepone a la del reemplazo y un
/// `style` previo se conserva si el reemplazo no trae uno propio.
pub fn splice(
    content: &str,
    target: &str,
    replacement: &str,
    preserve_style: bool,
) -> Result<String, SpliceError> {
    let mut nodes = parse_markup(content);
    if first_element(&nodes).is_none() {
        return Err(SpliceError::MalformedContent);
    }

    let replacement_nodes = parse_markup(replacement.trim());
    if first_element(&replacement_nodes).is_none() {
        return Err(SpliceError::EmptyReplacement);
    }

    let mut pending = Some(replacement_nodes);
    if !replace_first(&mut nodes, target, &mut pending, preserve_style) {
        return Err(SpliceError::NotFound(target.to_string()));
    }
    Ok(serialize_nodes(&nodes))
}

fn replace_first(
    nodes: &mut Vec<Node>,
    target: &str,
    pending: &mut Option<Vec<Node>>,
    preserve_style: bool,
) -> bool {
    for idx in 0..nodes.len() {
        let Node::Element(el) = &mut nodes[idx] else {
            continue;
        };

        if el.identity() == Some(target) {
            let prior = PriorStyle::capture(el);
            let Some(mut incoming) = pending.take() else {
                return false;
            };
            if preserve_style {
                if let Some(root) = replacement_root(&mut incoming, target) {
                    prior.merge_into(root);
                }
            }
            debug!("Sustituyendo data-id=\"{}\" ({} nodos nuevos)", target, incoming.len());
            nodes.splice(idx..=idx, incoming);
            return true;
        }

        if replace_first(&mut el.children, target, pending, preserve_style) {
            return true;
        }
    }
    false
}

/// Elemento del reemplazo que hereda el estilo: el que lleva la identidad
/// buscada o, si no hay ninguno, el primero.
fn replacement_root<'a>(nodes: &'a mut [Node], target: &str) -> Option<&'a mut Element> {
    let position = nodes
        .iter()
        .position(|n| matches!(n, Node::Element(el) if el.identity() == Some(target)))
        .or_else(|| nodes.iter().position(|n| matches!(n, Node::Element(_))))?;
    match &mut nodes[position] {
        Node::Element(el) => Some(el),
        _ => None,
    }
}

/// Clase y estilo del elemento antes de la sustitución.
struct PriorStyle {
    class: Option<Attribute>,
    style: Option<Attribute>,
}

impl PriorStyle {
    fn capture(el: &Element) -> Self {
        Self {
            class: CLASS_ATTRS.iter().find_map(|name| el.attr(name)).cloned(),
            style: el.attr(STYLE_ATTR).cloned(),
        }
    }

    fn merge_into(self, el: &mut Element) {
        if let Some(prior) = self.class {
            let current = el
                .attrs
                .iter_mut()
                .find(|a| CLASS_ATTRS.contains(&a.name.as_str()));
            match current {
                Some(current) => {
                    // Las expresiones no se concatenan: gana el reemplazo.
                    if let (Some(old), Some(new)) = (prior.value.literal(), current.value.literal()) {
                        let quote = match &current.value {
                            AttrValue::Quoted { quote, .. } => *quote,
                            _ => '"',
                        };
                        current.value = AttrValue::Quoted {
                            quote,
                            text: join_classes(old, new),
                        };
                    }
                }
                None => el.attrs.push(prior),
            }
        }

        if let Some(style) = self.style {
            if el.attr(STYLE_ATTR).is_none() {
                el.attrs.push(style);
            }
        }
    }
}

/// Previa y luego nueva, sin deduplicar.
fn join_classes(old: &str, new: &str) -> String {
    match (old.trim(), new.trim()) {
        ("", new) => new.to_string(),
        (old, "") => old.to_string(),
        (old, new) => format!("{old} {new}"),
    }
}
