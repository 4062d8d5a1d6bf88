//! Descomposición del marcado en fragmentos independientes.
//!
//! Sólo se extraen los elementos identificados de nivel raíz (sin ningún
//! ancestro con `data-id`); los anidados viajan dentro del contenido de su
//! fragmento. Toda descomposición devuelve al menos un fragmento.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    identity::{IdGenerator, IdScope, IDENTITY_ATTR},
    markup::{Element, Node},
    models::{Fragment, ROOT_CONTAINER_NAME},
    normalize::normalize,
    parser::{parse_source, Document, ParseOutcome},
};

/// Normaliza, parsea y descompone la salida del modelo.
pub fn decompose(raw: &str, generator: &mut dyn IdGenerator) -> Vec<Fragment> {
    let normalized = normalize(raw);
    let mut scope = IdScope::new(generator);
    match parse_source(&normalized, &mut scope) {
        ParseOutcome::Parsed(document) => decompose_document(&document, &mut scope, Utc::now()),
        ParseOutcome::Malformed(fragment) => vec![fragment],
    }
}

/// Descompone un documento ya parseado.
pub fn decompose_document(
    document: &Document,
    scope: &mut IdScope<'_>,
    now: DateTime<Utc>,
) -> Vec<Fragment> {
    reserve_identities(&document.nodes, scope);

    let mut roots = Vec::new();
    collect_identified_roots(&document.nodes, &mut roots);
    if roots.is_empty() {
        debug!("Sin elementos identificados: se usa el contenedor raíz");
        return vec![root_container(document, scope, now)];
    }

    let mut seen = HashSet::new();
    let fragments: Vec<Fragment> = roots
        .into_iter()
        .map(|mut element| {
            let existing = element
                .identity()
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            let id = match existing {
                Some(id) if !seen.contains(&id) => id,
                Some(id) => {
                    let fresh = scope.fresh();
                    warn!("data-id duplicado \"{}\" en la raíz; se reasigna a \"{}\"", id, fresh);
                    element.set_identity(&fresh);
                    fresh
                }
                None => {
                    let fresh = scope.fresh();
                    element.set_identity(&fresh);
                    fresh
                }
            };
            seen.insert(id.clone());
            Fragment::new(id, &element.tag, element.to_markup(), now)
        })
        .collect();

    debug!("Descomposición completada: {} fragmentos", fragments.len());
    fragments
}

/// Un elemento lleva identidad explícita si tiene un `data-id` literal.
fn is_identified(element: &Element) -> bool {
    element
        .attr(IDENTITY_ATTR)
        .is_some_and(|attr| attr.value.literal().is_some())
}

fn collect_identified_roots(nodes: &[Node], out: &mut Vec<Element>) {
    for node in nodes {
        if let Node::Element(element) = node {
            if is_identified(element) {
                out.push(element.clone());
            } else {
                collect_identified_roots(&element.children, out);
            }
        }
    }
}

/// Reserva todos los ids presentes, también los anidados, para que ningún
/// id generado colisione con ellos.
fn reserve_identities(nodes: &[Node], scope: &mut IdScope<'_>) {
    for node in nodes {
        if let Node::Element(element) = node {
            if let Some(id) = element.identity().filter(|id| !id.is_empty()) {
                scope.reserve(id);
            }
            reserve_identities(&element.children, scope);
        }
    }
}

/// Envuelve todo el marcado de trabajo en un `div` con un id nuevo, para que
/// la raíz del fragmento lleve su identidad. Sólo se llega aquí sin ningún
/// `data-id` literal, así que no hay identidad que recuperar.
fn root_container(document: &Document, scope: &mut IdScope<'_>, now: DateTime<Utc>) -> Fragment {
    let id = scope.fresh();
    let content = format!(r#"<div {IDENTITY_ATTR}="{id}">{}</div>"#, document.working);
    Fragment::new(id, "div", content, now).with_display_name(ROOT_CONTAINER_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SequentialIds;

    #[test]
    fn nested_identities_stay_inside_their_owner() {
        let mut ids = SequentialIds::new("gen");
        let src = r#"function X(){ return (<div data-id="a1"><span data-id="a2">hi</span></div>); }"#;
        let fragments = decompose(src, &mut ids);

        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].id, "a1");
        assert_eq!(fragments[0].element_kind, "div");
        assert_eq!(fragments[0].display_name, "Div");
        assert!(fragments[0].content.contains(r#"<span data-id="a2">hi</span>"#));
    }

    #[test]
    fn root_level_elements_come_out_in_document_order() {
        let mut ids = SequentialIds::new("gen");
        let src = r#"<main>
  <header data-id="h"><h1 data-id="t">Hola</h1></header>
  <section><Card data-id="c1" /><Card data-id="c2" /></section>
  <footer data-id="f">pie</footer>
</main>"#;
        let ids: Vec<String> = decompose(src, &mut ids).into_iter().map(|f| f.id).collect();
        assert_eq!(ids, ["h", "c1", "c2", "f"]);
    }

    #[test]
    fn empty_identity_gets_generated_and_written_back() {
        let mut ids = SequentialIds::new("gen");
        let fragments = decompose(r#"<div><p data-id="">x</p></div>"#, &mut ids);
        assert_eq!(fragments[0].id, "gen-1");
        assert_eq!(fragments[0].content, r#"<p data-id="gen-1">x</p>"#);
    }

    #[test]
    fn duplicate_root_identities_are_reassigned() {
        let mut ids = SequentialIds::new("gen");
        let fragments = decompose(r#"<div><p data-id="x">1</p><p data-id="x">2</p></div>"#, &mut ids);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].id, "x");
        assert_eq!(fragments[1].id, "gen-1");
        assert_eq!(fragments[1].content, r#"<p data-id="gen-1">2</p>"#);
    }

    #[test]
    fn generated_ids_avoid_nested_recovered_ids() {
        let mut ids = SequentialIds::new("n");
        let src = r#"<div><p data-id="">a</p><section data-id="s"><b data-id="n-1">b</b></section></div>"#;
        let fragments = decompose(src, &mut ids);
        assert_eq!(fragments[0].id, "n-2");
    }

    #[test]
    fn unidentified_markup_becomes_root_container() {
        let mut ids = SequentialIds::new("gen");
        let fragments = decompose("<div>no identity here</div>", &mut ids);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].id, "gen-1");
        assert_eq!(fragments[0].element_kind, "div");
        assert_eq!(fragments[0].display_name, ROOT_CONTAINER_NAME);
        assert_eq!(
            fragments[0].content,
            r#"<div data-id="gen-1"><div>no identity here</div></div>"#
        );
    }

    #[test]
    fn expression_identities_are_not_fragments() {
        let mut ids = SequentialIds::new("gen");
        let fragments = decompose("<ul><li data-id={item.id}>a</li></ul>", &mut ids);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].display_name, ROOT_CONTAINER_NAME);
    }
}
