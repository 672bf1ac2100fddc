//! Conteneur ORBC (Orage ByteCode).
//!
//! Format :
//! ```text
//! Header: "ORBC\0" (5 bytes) + version u16 LE
//! [Section*]
//!   section = TAG[4] + len u32 LE + payload
//! Dernière section: "CRCC" + u32 LE (CRC32 sur tout après le header)
//! ```
//!
//! Sections supportées :
//! - "NAME" : nom du module (UTF-8)
//! - "EXPT" : fonctions exportées (count u32, puis [len:u16][nom][argc:u16][retc:u16])
//! - "RODT" : données constantes brutes
//! - "CODE" : bytecode opaque (exécuté par la VM externe, pas ici)
//!
//! Les sections inconnues sont ignorées (compat ascendante).

use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::module::FunctionSignature;

/// Magic d'un module ORBC.
pub const MAGIC: &[u8; 5] = b"ORBC\0";

/// Version courante du conteneur.
pub const VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de chargement d'un module ORBC.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Magic absent ou invalide.
    #[error("magic ORBC invalide")]
    BadMagic,

    /// Version de conteneur non supportée.
    #[error("version ORBC non supportée: {found} (max {VERSION})")]
    UnsupportedVersion {
        /// Version lue dans le header.
        found: u16,
    },

    /// Fin de données inattendue au milieu d'une section.
    #[error("module tronqué: {0}")]
    Truncated(#[from] io::Error),

    /// Aucune section CRCC terminale.
    #[error("section CRCC absente")]
    MissingCrc,

    /// Le CRC32 ne correspond pas au contenu.
    #[error("CRC32 invalide: attendu {expected:#010x}, calculé {computed:#010x}")]
    CrcMismatch {
        /// CRC porté par le module.
        expected: u32,
        /// CRC recalculé sur le contenu.
        computed: u32,
    },

    /// Section textuelle non UTF-8.
    #[error("UTF-8 invalide dans une section")]
    InvalidUtf8,
}

/* ─────────────────────────── Module chargé ─────────────────────────── */

/// Module bytecode chargé en mémoire.
///
/// Le `code` reste opaque : son exécution appartient à la VM externe.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BytecodeModule {
    /// Nom du module (section NAME).
    pub name: String,
    /// Version du conteneur.
    pub version: u16,
    /// Fonctions exportées (section EXPT).
    pub exports: Vec<FunctionSignature>,
    /// Données constantes (section RODT).
    pub rodata: Vec<u8>,
    /// Bytecode opaque (section CODE).
    pub code: Vec<u8>,
    /// CRC32 vérifié au chargement.
    pub crc32: u32,
}

impl BytecodeModule {
    /// Interprète `data` comme un module ORBC sérialisé.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
            return Err(FormatError::BadMagic);
        }
        let version = u16::from_le_bytes([data[5], data[6]]);
        if version == 0 || version > VERSION {
            return Err(FormatError::UnsupportedVersion { found: version });
        }

        let mut m = BytecodeModule { version, ..Default::default() };
        let mut cur = Cursor::new(data);
        cur.set_position(HEADER_LEN as u64);

        loop {
            let tag_pos = cur.position() as usize;
            if tag_pos >= data.len() {
                return Err(FormatError::MissingCrc);
            }

            let mut tag = [0u8; 4];
            cur.read_exact(&mut tag)?;

            if &tag == b"CRCC" {
                let expected = cur.read_u32::<LittleEndian>()?;
                let computed = crc32fast::hash(&data[HEADER_LEN..tag_pos]);
                if expected != computed {
                    return Err(FormatError::CrcMismatch { expected, computed });
                }
                m.crc32 = expected;
                break;
            }

            let len = cur.read_u32::<LittleEndian>()? as usize;
            let mut payload = vec![0u8; len];
            cur.read_exact(&mut payload)?;

            match &tag {
                b"NAME" => {
                    m.name = String::from_utf8(payload).map_err(|_| FormatError::InvalidUtf8)?;
                }
                b"EXPT" => m.exports = read_exports(&payload)?,
                b"RODT" => m.rodata = payload,
                b"CODE" => m.code = payload,
                _ => {
                    // section inconnue : ignorée
                }
            }
        }

        Ok(m)
    }
}

fn read_exports(payload: &[u8]) -> Result<Vec<FunctionSignature>, FormatError> {
    let mut cur = Cursor::new(payload);
    let count = cur.read_u32::<LittleEndian>()?;
    let mut exports = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_len = cur.read_u16::<LittleEndian>()? as usize;
        let mut name = vec![0u8; name_len];
        cur.read_exact(&mut name)?;
        let name = String::from_utf8(name).map_err(|_| FormatError::InvalidUtf8)?;
        let argc = cur.read_u16::<LittleEndian>()?;
        let retc = cur.read_u16::<LittleEndian>()?;
        exports.push(FunctionSignature { name, argc, retc });
    }
    Ok(exports)
}

/* ─────────────────────────── Builder ─────────────────────────── */

/// Construit un module ORBC sérialisé (outils, tests).
#[derive(Debug, Clone, Default)]
pub struct OrbcBuilder {
    name: String,
    exports: Vec<FunctionSignature>,
    rodata: Vec<u8>,
    code: Vec<u8>,
}

impl OrbcBuilder {
    /// Nouveau builder pour un module nommé.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Déclare une fonction exportée.
    #[must_use]
    pub fn export(mut self, name: impl Into<String>, argc: u16, retc: u16) -> Self {
        self.exports.push(FunctionSignature { name: name.into(), argc, retc });
        self
    }

    /// Section RODT.
    #[must_use]
    pub fn rodata(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.rodata = bytes.into();
        self
    }

    /// Section CODE.
    #[must_use]
    pub fn code(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.code = bytes.into();
        self
    }

    /// Sérialise le module (avec trailer CRC32).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());

        if !self.name.is_empty() {
            write_section(&mut out, b"NAME", self.name.as_bytes());
        }
        if !self.exports.is_empty() {
            let mut buf = Vec::new();
            buf.extend_from_slice(&(self.exports.len() as u32).to_le_bytes());
            for f in &self.exports {
                buf.extend_from_slice(&(f.name.len() as u16).to_le_bytes());
                buf.extend_from_slice(f.name.as_bytes());
                buf.extend_from_slice(&f.argc.to_le_bytes());
                buf.extend_from_slice(&f.retc.to_le_bytes());
            }
            write_section(&mut out, b"EXPT", &buf);
        }
        if !self.rodata.is_empty() {
            write_section(&mut out, b"RODT", &self.rodata);
        }
        if !self.code.is_empty() {
            write_section(&mut out, b"CODE", &self.code);
        }

        let crc = crc32fast::hash(&out[HEADER_LEN..]);
        out.extend_from_slice(b"CRCC");
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }
}

fn write_section(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<u8> {
        OrbcBuilder::new("demo")
            .export("main", 2, 1)
            .export("abs", 1, 1)
            .rodata(vec![1, 2, 3])
            .code(vec![0xAA, 0xBB, 0xCC])
            .to_bytes()
    }

    #[test]
    fn roundtrip_basic() {
        let m = BytecodeModule::from_bytes(&sample()).unwrap();
        assert_eq!(m.name, "demo");
        assert_eq!(m.version, VERSION);
        assert_eq!(m.exports.len(), 2);
        assert_eq!(m.exports[0].name, "main");
        assert_eq!(m.exports[0].argc, 2);
        assert_eq!(m.exports[0].retc, 1);
        assert_eq!(m.rodata, vec![1, 2, 3]);
        assert_eq!(m.code, vec![0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn bad_magic() {
        assert!(matches!(
            BytecodeModule::from_bytes(b"NOPE\0\x01\x00"),
            Err(FormatError::BadMagic)
        ));
        assert!(matches!(BytecodeModule::from_bytes(b"OR"), Err(FormatError::BadMagic)));
    }

    #[test]
    fn unsupported_version() {
        let mut bytes = sample();
        bytes[5] = 0x7F; // version 0x007F
        assert!(matches!(
            BytecodeModule::from_bytes(&bytes),
            Err(FormatError::UnsupportedVersion { found: 0x7F })
        ));
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let mut bytes = sample();
        // un octet du CODE retourné
        let idx = bytes.len() - 9;
        bytes[idx] ^= 0xFF;
        assert!(matches!(
            BytecodeModule::from_bytes(&bytes),
            Err(FormatError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn truncated_section() {
        let bytes = sample();
        assert!(matches!(
            BytecodeModule::from_bytes(&bytes[..bytes.len() - 12]),
            Err(FormatError::Truncated(_) | FormatError::MissingCrc)
        ));
    }

    #[test]
    fn missing_crc() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        assert!(matches!(BytecodeModule::from_bytes(&bytes), Err(FormatError::MissingCrc)));
    }

    #[test]
    fn unknown_section_skipped() {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        write_section(&mut out, b"NAME", b"demo");
        write_section(&mut out, b"ZZZZ", &[9, 9, 9]);
        let crc = crc32fast::hash(&out[HEADER_LEN..]);
        out.extend_from_slice(b"CRCC");
        out.extend_from_slice(&crc.to_le_bytes());

        let m = BytecodeModule::from_bytes(&out).unwrap();
        assert_eq!(m.name, "demo");
    }
}
