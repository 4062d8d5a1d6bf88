//! Plantillas de prompt para generar y regenerar componentes.

use crate::identity::IDENTITY_ATTR;
use crate::llm::MessagePart;

const GENERATION_PROMPT: &str = r#"
Eres un desarrollador frontend experto en React y Tailwind CSS.
Genera un único componente funcional de React a partir de la petición del usuario.

Reglas obligatorias:
- Devuelve sólo código, con la forma `function Component() { return ( ... ); }`.
- Todo elemento visible debe llevar un atributo data-id único, corto y estable (ej: data-id="hero-title").
- Usa className con utilidades de Tailwind; no uses hojas de estilo externas.
- No incluyas imports, exports ni explicaciones.
- No uses <script>, <iframe> ni dangerouslySetInnerHTML.
"#;

const PATCH_PROMPT: &str = r#"
Eres un desarrollador frontend experto en React y Tailwind CSS.
Vas a modificar un único elemento JSX según la instrucción del usuario.

Reglas obligatorias:
- Devuelve sólo el elemento modificado, sin envolverlo en una función.
- El elemento raíz debe conservar exactamente el mismo atributo data-id.
- Conserva los data-id de los descendientes que sigan existiendo.
- Mantén las clases de estilo salvo que la instrucción pida cambiarlas.
- No incluyas explicaciones ni bloques de código Markdown.
"#;

/// Mensajes para generar un componente completo.
pub fn generation_messages(prompt: &str) -> Vec<MessagePart> {
    vec![
        MessagePart::system(GENERATION_PROMPT.trim()),
        MessagePart::user(prompt.trim()),
    ]
}

/// Mensajes para regenerar un elemento concreto.
pub fn patch_messages(element_markup: &str, target_id: &str, instruction: &str) -> Vec<MessagePart> {
    vec![
        MessagePart::system(PATCH_PROMPT.trim()),
        MessagePart::assistant(format!(
            "Elemento actual ({IDENTITY_ATTR}=\"{target_id}\"):\n{element_markup}"
        )),
        MessagePart::user(format!(
            "Instrucción: {}\n\nDevuelve el elemento completo con {IDENTITY_ATTR}=\"{target_id}\".",
            instruction.trim()
        )),
    ]
}
