//! Reensamblado de los fragmentos en un único documento renderizable.
//!
//! El envoltorio es un contrato con el renderizador: contenedor exterior
//! centrado (con la marca `data-assembly-root`), contenedor interior de ancho
//! fijo y un fragmento JSX que agrupa varias raíces. Al ser una función con
//! `return ( … ); }`, el documento se puede volver a descomponer.

use crate::models::Fragment;

/// Marca que todo documento ensamblado debe contener.
pub const ASSEMBLY_MARKER: &str = r#"data-assembly-root="true""#;

const WRAPPER_HEAD: &str = r#"export default function GeneratedPage() {
  return (
    <div data-assembly-root="true" className="min-h-screen w-full flex items-center justify-center">
      <div className="w-full max-w-6xl mx-auto">
        <>
"#;

const WRAPPER_TAIL: &str = r#"
        </>
      </div>
    </div>
  );
}
"#;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("el documento ensamblado no contiene la marca data-assembly-root")]
    MissingMarker,
}

/// Concatena el contenido de los fragmentos, en orden y separado por `\n`,
/// dentro del envoltorio fijo. Determinista y sin efectos.
pub fn assemble(fragments: &[Fragment]) -> String {
    let body = fragments
        .iter()
        .map(|f| f.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let mut document = String::with_capacity(WRAPPER_HEAD.len() + body.len() + WRAPPER_TAIL.len());
    document.push_str(WRAPPER_HEAD);
    document.push_str(&body);
    document.push_str(WRAPPER_TAIL);
    document
}

pub fn verify_assembled(document: &str) -> Result<(), AssemblyError> {
    if document.contains(ASSEMBLY_MARKER) {
        Ok(())
    } else {
        Err(AssemblyError::MissingMarker)
    }
}
