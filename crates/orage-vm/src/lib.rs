//! orage-vm — frontière VM du runtime Orage
//!
//! Objectif : offrir les types que le CLI et l'hôte échangent avec la VM,
//! **sans** embarquer l'interpréteur (collaborateur externe, branché par
//! hooks côté CLI).
//!
//! - [`Variant`] / [`VariantList`] : séquence hétérogène scalaires + buffers
//!   façonnés, avec la grammaire texte aller-retour `[forme]xtype=[valeurs]`
//! - [`Module`] : frontière capacitaire (nom + exports)
//! - [`HalModule`] : expose un [`orage_hal::Device`] comme module VM
//! - [`BytecodeModule`] / [`OrbcBuilder`] : conteneur ORBC (sections fourcc,
//!   trailer CRC32)

#![deny(unused_must_use)]

use thiserror::Error;

pub mod module;
pub mod orbc;
pub mod variant;

pub use module::{FunctionSignature, HalModule, Module};
pub use orbc::{BytecodeModule, FormatError, OrbcBuilder};
pub use variant::{BufferView, ParseError, PrintError, Variant, VariantList};

/* ─────────────────────────── Formes ─────────────────────────── */

/// Forme d'un buffer (dimensions).
#[cfg(feature = "small")]
pub type Shape = smallvec::SmallVec<[usize; 4]>;

/// Forme d'un buffer (dimensions).
#[cfg(not(feature = "small"))]
pub type Shape = Vec<usize>;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de la frontière VM.
#[derive(Debug, Error)]
pub enum VmError {
    /// Argument texte malformé.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Échec d'impression d'une liste de variants.
    #[error(transparent)]
    Print(#[from] PrintError),

    /// Conteneur ORBC malformé ou non supporté.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Échec HAL sous-jacent.
    #[error("hal: {0}")]
    Hal(#[from] orage_hal::HalError),

    /// Le runtime n'a pas pu construire le module.
    #[error("création de module impossible: {0}")]
    Creation(String),

    /// Fonction exportée introuvable.
    #[error("fonction introuvable: `{0}`")]
    FunctionNotFound(String),

    /// Type d'argument invalide lors d'un appel natif.
    #[error("type d'argument invalide: {0}")]
    ArgType(String),

    /// Mauvaise arité lors d'un appel.
    #[error("mauvaise arité: attendu {expected}, reçu {got}")]
    Arity {
        /// Nombre d'arguments attendus.
        expected: usize,
        /// Nombre d'arguments fournis.
        got: usize,
    },
}

/// Alias résultat VM.
pub type VmResult<T> = std::result::Result<T, VmError>;

/* ─────────────────────────── Prélude ─────────────────────────── */

/// Prélude pratique pour importer d'un coup.
pub mod prelude {
    pub use crate::{
        BufferView, BytecodeModule, FormatError, FunctionSignature, HalModule, Module,
        OrbcBuilder, ParseError, PrintError, Shape, Variant, VariantList, VmError, VmResult,
    };
}
