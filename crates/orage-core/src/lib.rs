//! orage-core — primitives partagées du runtime Orage
//!
//! Fournit :
//! - [`ElementType`] : les étiquettes de types numériques reconnues par la
//!   grammaire des arguments (`i8`..`u64`, `f32`, `f64`)
//! - [`Scalar`] : une valeur numérique typée, parsable depuis `type=valeur`
//! - Encodage/décodage little-endian d'un scalaire vers/depuis des octets
//! - Erreurs [`CoreError`] + alias [`CoreResult<T>`]
//!
//! Les étiquettes de types et le formatage numérique sont un **contrat
//! versionné** avec le conteneur ORBC : ne pas étendre sans bump de version.

#![deny(missing_docs)]

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat commun au core.
pub type CoreResult<T> = core::result::Result<T, CoreError>;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de bas niveau communes (grammaire scalaire, encodage).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Étiquette de type inconnue (ex: `i13`).
    #[error("étiquette de type inconnue: `{0}`")]
    UnknownType(String),

    /// Valeur non convertible vers le type déclaré.
    #[error("valeur `{value}` invalide pour le type {ty}")]
    BadValue {
        /// Type déclaré par l'argument.
        ty: ElementType,
        /// Texte fautif.
        value: String,
    },

    /// Tranche d'octets trop courte pour décoder un élément.
    #[error("octets insuffisants pour {ty}: {got} fournis, {needed} requis")]
    Truncated {
        /// Type à décoder.
        ty: ElementType,
        /// Octets requis.
        needed: usize,
        /// Octets disponibles.
        got: usize,
    },
}

/* ─────────────────────────── Types d'éléments ─────────────────────────── */

/// Type d'élément d'un scalaire ou d'un buffer façonné.
///
/// L'ensemble est fermé : c'est lui qui définit la grammaire `type=valeur`
/// et le format texte `[forme]xtype=[valeurs]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementType {
    /// Entier signé 8 bits.
    I8,
    /// Entier non signé 8 bits.
    U8,
    /// Entier signé 16 bits.
    I16,
    /// Entier non signé 16 bits.
    U16,
    /// Entier signé 32 bits.
    I32,
    /// Entier non signé 32 bits.
    U32,
    /// Entier signé 64 bits.
    I64,
    /// Entier non signé 64 bits.
    U64,
    /// Flottant 32 bits.
    F32,
    /// Flottant 64 bits.
    F64,
}

impl ElementType {
    /// Tous les types reconnus (ordre stable).
    pub const ALL: [ElementType; 10] = [
        ElementType::I8,
        ElementType::U8,
        ElementType::I16,
        ElementType::U16,
        ElementType::I32,
        ElementType::U32,
        ElementType::I64,
        ElementType::U64,
        ElementType::F32,
        ElementType::F64,
    ];

    /// Taille d'un élément en octets.
    pub const fn byte_width(self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::U64 | ElementType::F64 => 8,
        }
    }

    /// Étiquette textuelle (celle de la grammaire).
    pub const fn tag(self) -> &'static str {
        match self {
            ElementType::I8 => "i8",
            ElementType::U8 => "u8",
            ElementType::I16 => "i16",
            ElementType::U16 => "u16",
            ElementType::I32 => "i32",
            ElementType::U32 => "u32",
            ElementType::I64 => "i64",
            ElementType::U64 => "u64",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ElementType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "i8" => Ok(ElementType::I8),
            "u8" => Ok(ElementType::U8),
            "i16" => Ok(ElementType::I16),
            "u16" => Ok(ElementType::U16),
            "i32" => Ok(ElementType::I32),
            "u32" => Ok(ElementType::U32),
            "i64" => Ok(ElementType::I64),
            "u64" => Ok(ElementType::U64),
            "f32" => Ok(ElementType::F32),
            "f64" => Ok(ElementType::F64),
            other => Err(CoreError::UnknownType(other.to_string())),
        }
    }
}

/* ─────────────────────────── Scalaires ─────────────────────────── */

/// Valeur numérique typée.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Scalar {
    /// i8
    I8(i8),
    /// u8
    U8(u8),
    /// i16
    I16(i16),
    /// u16
    U16(u16),
    /// i32
    I32(i32),
    /// u32
    U32(u32),
    /// i64
    I64(i64),
    /// u64
    U64(u64),
    /// f32
    F32(f32),
    /// f64
    F64(f64),
}

impl Scalar {
    /// Type d'élément porté par la valeur.
    pub const fn element_type(&self) -> ElementType {
        match self {
            Scalar::I8(_) => ElementType::I8,
            Scalar::U8(_) => ElementType::U8,
            Scalar::I16(_) => ElementType::I16,
            Scalar::U16(_) => ElementType::U16,
            Scalar::I32(_) => ElementType::I32,
            Scalar::U32(_) => ElementType::U32,
            Scalar::I64(_) => ElementType::I64,
            Scalar::U64(_) => ElementType::U64,
            Scalar::F32(_) => ElementType::F32,
            Scalar::F64(_) => ElementType::F64,
        }
    }

    /// Parse `text` comme une valeur du type `ty`.
    pub fn parse(ty: ElementType, text: &str) -> CoreResult<Self> {
        let t = text.trim();
        let bad = || CoreError::BadValue { ty, value: text.to_string() };
        match ty {
            ElementType::I8 => t.parse().map(Scalar::I8).map_err(|_| bad()),
            ElementType::U8 => t.parse().map(Scalar::U8).map_err(|_| bad()),
            ElementType::I16 => t.parse().map(Scalar::I16).map_err(|_| bad()),
            ElementType::U16 => t.parse().map(Scalar::U16).map_err(|_| bad()),
            ElementType::I32 => t.parse().map(Scalar::I32).map_err(|_| bad()),
            ElementType::U32 => t.parse().map(Scalar::U32).map_err(|_| bad()),
            ElementType::I64 => t.parse().map(Scalar::I64).map_err(|_| bad()),
            ElementType::U64 => t.parse().map(Scalar::U64).map_err(|_| bad()),
            ElementType::F32 => t.parse().map(Scalar::F32).map_err(|_| bad()),
            ElementType::F64 => t.parse().map(Scalar::F64).map_err(|_| bad()),
        }
    }

    /// Ajoute l'encodage little-endian de la valeur à `out`.
    pub fn write_le(&self, out: &mut Vec<u8>) {
        match *self {
            Scalar::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Scalar::U8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Scalar::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Scalar::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Scalar::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Scalar::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Scalar::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Scalar::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Scalar::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Scalar::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    /// Décode un élément little-endian de type `ty` au début de `bytes`.
    pub fn read_le(ty: ElementType, bytes: &[u8]) -> CoreResult<Self> {
        let w = ty.byte_width();
        if bytes.len() < w {
            return Err(CoreError::Truncated { ty, needed: w, got: bytes.len() });
        }
        let b = &bytes[..w];
        Ok(match ty {
            ElementType::I8 => Scalar::I8(i8::from_le_bytes([b[0]])),
            ElementType::U8 => Scalar::U8(b[0]),
            ElementType::I16 => Scalar::I16(i16::from_le_bytes([b[0], b[1]])),
            ElementType::U16 => Scalar::U16(u16::from_le_bytes([b[0], b[1]])),
            ElementType::I32 => Scalar::I32(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ElementType::U32 => Scalar::U32(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ElementType::I64 => Scalar::I64(i64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ])),
            ElementType::U64 => Scalar::U64(u64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ])),
            ElementType::F32 => Scalar::F32(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ElementType::F64 => Scalar::F64(f64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ])),
        })
    }
}

impl fmt::Display for Scalar {
    /// Affiche la valeur « nue », sans étiquette de type.
    ///
    /// Les flottants passent par `Display` (représentation minimale qui
    /// re-parse vers la même valeur).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::I8(v) => write!(f, "{v}"),
            Scalar::U8(v) => write!(f, "{v}"),
            Scalar::I16(v) => write!(f, "{v}"),
            Scalar::U16(v) => write!(f, "{v}"),
            Scalar::I32(v) => write!(f, "{v}"),
            Scalar::U32(v) => write!(f, "{v}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::U64(v) => write!(f, "{v}"),
            Scalar::F32(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
        }
    }
}

/* ─────────────────────────── Prélude (reexports utiles) ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    /// Réexports utiles pour une importation rapide.
    pub use super::{CoreError, CoreResult, ElementType, Scalar};
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tags_roundtrip() {
        for ty in ElementType::ALL {
            assert_eq!(ty.tag().parse::<ElementType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_tag() {
        let err = "i13".parse::<ElementType>().unwrap_err();
        assert_eq!(err, CoreError::UnknownType("i13".to_string()));
    }

    #[test]
    fn parse_scalars() {
        assert_eq!(Scalar::parse(ElementType::I32, "42").unwrap(), Scalar::I32(42));
        assert_eq!(Scalar::parse(ElementType::I32, " -7 ").unwrap(), Scalar::I32(-7));
        assert_eq!(Scalar::parse(ElementType::F64, "1.5").unwrap(), Scalar::F64(1.5));
        assert!(Scalar::parse(ElementType::U8, "-1").is_err());
        assert!(Scalar::parse(ElementType::I32, "abc").is_err());
    }

    #[test]
    fn display_bare_value() {
        assert_eq!(Scalar::I32(42).to_string(), "42");
        assert_eq!(Scalar::F32(1.5).to_string(), "1.5");
        assert_eq!(Scalar::U64(0).to_string(), "0");
    }

    #[test]
    fn le_roundtrip() -> CoreResult<()> {
        let cases = [
            Scalar::I8(-3),
            Scalar::U16(0xBEEF),
            Scalar::I32(-42),
            Scalar::U64(7),
            Scalar::F32(2.25),
            Scalar::F64(-0.5),
        ];
        for s in cases {
            let mut buf = Vec::new();
            s.write_le(&mut buf);
            assert_eq!(buf.len(), s.element_type().byte_width());
            assert_eq!(Scalar::read_le(s.element_type(), &buf)?, s);
        }
        Ok(())
    }

    #[test]
    fn read_le_truncated() {
        let err = Scalar::read_le(ElementType::I32, &[1, 2]).unwrap_err();
        assert_eq!(
            err,
            CoreError::Truncated { ty: ElementType::I32, needed: 4, got: 2 }
        );
    }
}
