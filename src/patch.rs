//! Orquestación de un parche sobre la colección de fragmentos.
//!
//! El parche es todo o nada: o se devuelve la colección completa ya
//! actualizada y reensamblada, o un error y nada cambia.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    assemble::{assemble, verify_assembled, AssemblyError},
    identity::IDENTITY_ATTR,
    markup::first_element,
    models::Fragment,
    parser::parse_markup,
    splice::{locate, splice, SpliceError},
};

/// Petición de sustitución de un elemento identificado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    pub target_id: String,
    /// Marcado nuevo, ya generado y saneado.
    pub content: String,
    pub preserve_style: bool,
}

/// Resultado de un parche aplicado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub fragments: Vec<Fragment>,
    pub assembled_content: String,
    /// Fragmento que contenía el objetivo.
    pub fragment_id: String,
    /// `true` si el objetivo era un descendiente y no la raíz del fragmento.
    pub nested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("ningún fragmento contiene data-id=\"{0}\"")]
    TargetNotFound(String),
    #[error("el nuevo contenido no conserva data-id=\"{0}\"")]
    IdentityNotPreserved(String),
    #[error("no se pudo sustituir el elemento en el fragmento {fragment_id}: {source}")]
    Splice {
        fragment_id: String,
        source: SpliceError,
    },
    #[error(transparent)]
    AssemblyInvariant(#[from] AssemblyError),
}

/// `true` si `markup` contiene `data-id="<id>"` (o con comillas simples).
pub fn has_identity_attr(markup: &str, id: &str) -> bool {
    markup.contains(&format!(r#"{IDENTITY_ATTR}="{id}""#))
        || markup.contains(&format!("{IDENTITY_ATTR}='{id}'"))
}

/// Fragmento propietario del objetivo: primero por id, luego el primero
/// cuyo contenido tenga un elemento real con esa identidad.
///
/// El texto `data-id="x"` dentro de un nodo de texto o de otro atributo no
/// cuenta.
pub fn find_owner<'a>(fragments: &'a [Fragment], target: &str) -> Option<&'a Fragment> {
    fragments.iter().find(|f| f.id == target).or_else(|| {
        fragments
            .iter()
            .filter(|f| has_identity_attr(&f.content, target))
            .find(|f| locate(&f.content, target).is_ok())
    })
}

/// Etiqueta del primer elemento de `content`.
fn root_tag(content: &str) -> Option<String> {
    first_element(&parse_markup(content)).map(|el| el.tag.clone())
}

/// Aplica el parche y devuelve una colección nueva; la de entrada no cambia.
pub fn apply_patch(
    fragments: &[Fragment],
    request: &PatchRequest,
    now: DateTime<Utc>,
) -> Result<PatchOutcome, PatchError> {
    apply_patch_verified(fragments, request, now, verify_assembled)
}

/// Igual que [`apply_patch`], con la comprobación del documento ensamblado
/// como parámetro.
pub fn apply_patch_verified<V>(
    fragments: &[Fragment],
    request: &PatchRequest,
    now: DateTime<Utc>,
    verify: V,
) -> Result<PatchOutcome, PatchError>
where
    V: Fn(&str) -> Result<(), AssemblyError>,
{
    let target = request.target_id.as_str();
    let owner = find_owner(fragments, target)
        .ok_or_else(|| PatchError::TargetNotFound(target.to_string()))?;

    if !has_identity_attr(&request.content, target) {
        return Err(PatchError::IdentityNotPreserved(target.to_string()));
    }

    let nested = owner.id != target;
    let content = if nested {
        splice(&owner.content, target, &request.content, request.preserve_style).map_err(
            |err| match err {
                SpliceError::NotFound(id) => PatchError::TargetNotFound(id),
                other => PatchError::Splice {
                    fragment_id: owner.id.clone(),
                    source: other,
                },
            },
        )?
    } else {
        request.content.trim().to_string()
    };
    debug!(
        "Fragmento {} actualizado ({} → {} caracteres)",
        owner.id,
        owner.content.len(),
        content.len()
    );

    // Una sustitución completa puede cambiar la etiqueta raíz.
    let new_tag = if nested { None } else { root_tag(&content) };
    let updated: Vec<Fragment> = fragments
        .iter()
        .map(|f| {
            if f.id != owner.id {
                return f.clone();
            }
            let fragment = f.with_content(content.clone(), now);
            match &new_tag {
                Some(tag) => fragment.with_element_kind(tag),
                None => fragment,
            }
        })
        .collect();

    let assembled_content = assemble(&updated);
    verify(&assembled_content)?;

    info!(
        "Parche aplicado sobre data-id=\"{}\" en el fragmento {}",
        target, owner.id
    );
    Ok(PatchOutcome {
        fragments: updated,
        assembled_content,
        fragment_id: owner.id.clone(),
        nested,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fragments() -> Vec<Fragment> {
        let then = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        vec![
            Fragment::new(
                "a1",
                "div",
                r#"<div data-id="a1"><span data-id="a2">hi</span></div>"#,
                then,
            ),
            Fragment::new("b1", "p", r#"<p data-id="b1">B</p>"#, then),
        ]
    }

    fn request(target: &str, content: &str) -> PatchRequest {
        PatchRequest {
            target_id: target.into(),
            content: content.into(),
            preserve_style: true,
        }
    }

    #[test]
    fn nested_target_is_spliced_into_owner() {
        let before = fragments();
        let now = Utc::now();
        let outcome = apply_patch(
            &before,
            &request("a2", r#"<span data-id="a2" className="text-red-500">bye</span>"#),
            now,
        )
        .unwrap();

        assert!(outcome.nested);
        assert_eq!(outcome.fragment_id, "a1");
        assert_eq!(outcome.fragments[0].id, "a1");
        assert_eq!(
            outcome.fragments[0].content,
            r#"<div data-id="a1"><span data-id="a2" className="text-red-500">bye</span></div>"#
        );
        assert_eq!(outcome.fragments[0].last_modified_at, now);
        assert_eq!(outcome.fragments[1], before[1]);
        assert!(outcome.assembled_content.contains("bye"));
    }

    #[test]
    fn root_target_is_swapped_wholesale() {
        let outcome = apply_patch(
            &fragments(),
            &request("b1", "\n<p data-id=\"b1\" className=\"lead\">Nuevo</p>\n"),
            Utc::now(),
        )
        .unwrap();
        assert!(!outcome.nested);
        assert_eq!(outcome.fragments[1].content, r#"<p data-id="b1" className="lead">Nuevo</p>"#);
    }

    #[test]
    fn unknown_target_is_not_found() {
        let err = apply_patch(&fragments(), &request("zz", r#"<b data-id="zz" />"#), Utc::now());
        assert_eq!(err, Err(PatchError::TargetNotFound("zz".into())));
    }

    #[test]
    fn content_without_identity_is_rejected() {
        let before = fragments();
        let err = apply_patch(&before, &request("a2", "<span>bye</span>"), Utc::now());
        assert_eq!(err, Err(PatchError::IdentityNotPreserved("a2".into())));
        assert_eq!(before, fragments());
    }

    #[test]
    fn textual_match_inside_attribute_reports_not_found() {
        let then = Utc::now();
        let frags = vec![Fragment::new(
            "r",
            "div",
            r#"<div data-id="r" title='data-id="q"'>x</div>"#,
            then,
        )];
        let err = apply_patch(&frags, &request("q", r#"<b data-id="q" />"#), Utc::now());
        assert_eq!(err, Err(PatchError::TargetNotFound("q".into())));
    }

    #[test]
    fn owner_is_the_fragment_with_a_real_element() {
        let then = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let frags = vec![
            Fragment::new(
                "doc",
                "pre",
                r#"<pre data-id="doc">usa data-id="q" para marcarlo</pre>"#,
                then,
            ),
            Fragment::new(
                "card",
                "div",
                r#"<div data-id="card"><b data-id="q">x</b></div>"#,
                then,
            ),
        ];

        assert_eq!(find_owner(&frags, "q").map(|f| f.id.as_str()), Some("card"));

        let outcome = apply_patch(&frags, &request("q", r#"<b data-id="q">y</b>"#), Utc::now())
            .unwrap();
        assert_eq!(outcome.fragment_id, "card");
        assert_eq!(outcome.fragments[0], frags[0]);
        assert_eq!(
            outcome.fragments[1].content,
            r#"<div data-id="card"><b data-id="q">y</b></div>"#
        );
    }

    #[test]
    fn root_swap_refreshes_element_kind() {
        let outcome = apply_patch(
            &fragments(),
            &request("b1", r#"<section data-id="b1">B</section>"#),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(outcome.fragments[1].element_kind, "section");
        assert_eq!(outcome.fragments[1].display_name, "Section");
    }

    #[test]
    fn nested_splice_keeps_owner_kind() {
        let outcome = apply_patch(
            &fragments(),
            &request("a2", r#"<em data-id="a2">hola</em>"#),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(outcome.fragments[0].element_kind, "div");
        assert_eq!(outcome.fragments[0].display_name, "Div");
    }

    #[test]
    fn assembled_document_is_verified() {
        let seen = std::cell::RefCell::new(String::new());
        let outcome = apply_patch_verified(
            &fragments(),
            &request("b1", r#"<p data-id="b1">C</p>"#),
            Utc::now(),
            |doc| {
                *seen.borrow_mut() = doc.to_string();
                verify_assembled(doc)
            },
        )
        .unwrap();
        assert_eq!(*seen.borrow(), outcome.assembled_content);
    }

    #[test]
    fn failed_verification_returns_error_and_leaves_input_untouched() {
        let before = fragments();
        let err = apply_patch_verified(
            &before,
            &request("b1", r#"<p data-id="b1">C</p>"#),
            Utc::now(),
            |_| Err(AssemblyError::MissingMarker),
        );
        assert_eq!(
            err,
            Err(PatchError::AssemblyInvariant(AssemblyError::MissingMarker))
        );
        assert_eq!(before, fragments());
    }
}
