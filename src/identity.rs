//! Esquema de identidad de los elementos del marcado.
//!
//! Cada elemento editable lleva un atributo `data-id` con un token corto.
//! Los ids que ya vienen en el marcado se respetan tal cual; sólo se generan
//! ids nuevos cuando falta uno.

use std::collections::HashSet;

use uuid::Uuid;

/// Atributo reservado que identifica un elemento dentro del documento.
pub const IDENTITY_ATTR: &str = "data-id";

const SHORT_ID_LEN: usize = 10;

/// Fuente de ids nuevos.
pub trait IdGenerator {
    fn next_id(&mut self) -> String;
}

/// Genera tokens cortos a partir de un UUID v4 (10 caracteres hexadecimales).
#[derive(Debug, Default, Clone, Copy)]
pub struct ShortUuid;

impl IdGenerator for ShortUuid {
    fn next_id(&mut self) -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(SHORT_ID_LEN);
        id
    }
}

/// Generador determinista: `prefijo-1`, `prefijo-2`, ...
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

/// Ámbito de ids de una descomposición.
///
/// Los ids recuperados del marcado se reservan primero; los generados se
/// vuelven a pedir hasta que no colisionan con nada reservado.
pub struct IdScope<'a> {
    generator: &'a mut dyn IdGenerator,
    taken: HashSet<String>,
}

impl<'a> IdScope<'a> {
    pub fn new(generator: &'a mut dyn IdGenerator) -> Self {
        Self {
            generator,
            taken: HashSet::new(),
        }
    }

    /// Reserva un id recuperado. Devuelve `false` si ya estaba reservado.
    pub fn reserve(&mut self, id: &str) -> bool {
        self.taken.insert(id.to_string())
    }

    pub fn is_taken(&self, id: &str) -> bool {
        self.taken.contains(id)
    }

    /// Genera un id que no colisiona con ninguno del ámbito y lo reserva.
    pub fn fresh(&mut self) -> String {
        loop {
            let candidate = self.generator.next_id();
            if !candidate.is_empty() && self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// `true` si `value` puede usarse como valor literal del atributo de identidad.
pub fn is_valid_identity(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| !c.is_whitespace() && c != '"' && c != '\'' && c != '<' && c != '>')
}
