//! orage-hal — **Hardware Abstraction Layer** du runtime Orage
//!
//! But : fournir la couche device/mémoire que la VM consomme sans jamais
//! supposer une implémentation concrète (les kernels restent ailleurs).
//!
//! Design :
//! - Un trait fin [`Allocator`] + un buffer **possédant** sa mémoire
//!   ([`Buffer`]) : le drop est la libération, pas de convention « à
//!   relâcher par l'appelant »
//! - [`Driver`] (résolution par nom) + [`DriverRegistry`] composable
//! - Implémentations de base : [`HostAllocator`], [`HostDriver`] (tas CPU)
//! - `serde` optionnelle sur les infos de device
//!
//! # Exemple rapide
//! ```
//! use orage_hal as hal;
//! let registry = hal::DriverRegistry::with_defaults();
//! let device = registry.create_device("host").unwrap();
//! let buf = device
//!     .allocator()
//!     .allocate(hal::MemoryType::HOST_LOCAL, hal::BufferUsage::ALL, 16)
//!     .unwrap();
//! assert_eq!(buf.byte_len(), 16);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de la couche HAL.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Aucun driver enregistré sous ce nom.
    #[error("driver introuvable: `{0}`")]
    NotFound(String),

    /// Requête d'allocation invalide (taille, usage…).
    #[error("allocation invalide: {0}")]
    InvalidAllocation(String),

    /// Accès hors des bornes d'un buffer.
    #[error("accès hors bornes: offset {offset} + {len} > taille {capacity}")]
    OutOfRange {
        /// Début de l'accès.
        offset: usize,
        /// Longueur de l'accès.
        len: usize,
        /// Taille du buffer.
        capacity: usize,
    },

    /// Opération non supportée par le device.
    #[error("non supporté: {0}")]
    Unsupported(&'static str),
}

/// Alias résultat HAL.
pub type HalResult<T> = std::result::Result<T, HalError>;

/* ─────────────────────────── Flags mémoire / usage ─────────────────────────── */

bitflags! {
    /// Placement mémoire demandé à l'allocateur.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemoryType: u32 {
        /// Visible côté hôte (mappable).
        const HOST_LOCAL   = 1 << 0;
        /// Résidente côté device.
        const DEVICE_LOCAL = 1 << 1;
    }
}

bitflags! {
    /// Usages autorisés d'un buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        /// Source/cible de copies.
        const TRANSFER = 1 << 0;
        /// Mappable en lecture/écriture hôte.
        const MAPPING  = 1 << 1;
        /// Liable à un dispatch.
        const DISPATCH = 1 << 2;
        /// Tous les usages.
        const ALL = Self::TRANSFER.bits() | Self::MAPPING.bits() | Self::DISPATCH.bits();
    }
}

/* ─────────────────────────── Buffer ─────────────────────────── */

/// Buffer possédant sa mémoire.
///
/// Obtenu via [`Allocator::allocate`] ; sa destruction libère la mémoire,
/// il n'y a donc rien à « release » explicitement.
#[derive(Debug, Clone)]
pub struct Buffer {
    memory_type: MemoryType,
    usage: BufferUsage,
    data: Vec<u8>,
}

impl Buffer {
    /// Placement mémoire du buffer.
    pub const fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    /// Usages autorisés.
    pub const fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Taille en octets.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Vrai si le buffer est vide.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Mappe le contenu en lecture.
    ///
    /// Erreur si l'usage `MAPPING` n'a pas été demandé à l'allocation.
    pub fn map(&self) -> HalResult<&[u8]> {
        if !self.usage.contains(BufferUsage::MAPPING) {
            return Err(HalError::Unsupported("buffer non mappable (usage MAPPING absent)"));
        }
        Ok(&self.data)
    }

    /// Copie `bytes` dans le buffer à `offset` (usage `TRANSFER` requis).
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> HalResult<()> {
        if !self.usage.contains(BufferUsage::TRANSFER) {
            return Err(HalError::Unsupported("buffer non copiable (usage TRANSFER absent)"));
        }
        let end = offset.checked_add(bytes.len()).ok_or_else(|| {
            HalError::InvalidAllocation("offset + longueur déborde usize".to_string())
        })?;
        if end > self.data.len() {
            return Err(HalError::OutOfRange {
                offset,
                len: bytes.len(),
                capacity: self.data.len(),
            });
        }
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

/* ─────────────────────────── Allocateur ─────────────────────────── */

/// Fournisseur de mémoire pour buffers.
pub trait Allocator: Send + Sync {
    /// Nom de l'allocateur (diagnostics).
    fn name(&self) -> &str;

    /// Alloue un buffer zéro-initialisé de `byte_len` octets.
    fn allocate(
        &self,
        memory_type: MemoryType,
        usage: BufferUsage,
        byte_len: usize,
    ) -> HalResult<Buffer>;
}

/// Allocateur tas hôte.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostAllocator;

impl Allocator for HostAllocator {
    fn name(&self) -> &str {
        "host-heap"
    }

    fn allocate(
        &self,
        memory_type: MemoryType,
        usage: BufferUsage,
        byte_len: usize,
    ) -> HalResult<Buffer> {
        if usage.is_empty() {
            return Err(HalError::InvalidAllocation("usage vide".to_string()));
        }
        if memory_type.is_empty() {
            return Err(HalError::InvalidAllocation("type mémoire vide".to_string()));
        }
        Ok(Buffer { memory_type, usage, data: vec![0; byte_len] })
    }
}

/* ─────────────────────────── Device ─────────────────────────── */

/// Informations d'identité d'un device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceInfo {
    /// Nom du device (ex: `host:0`).
    pub name: String,
    /// Nom du driver qui l'a créé.
    pub driver: String,
}

/// Device de calcul : identité + allocateur.
///
/// Possédant : le drop relâche le device, aucun handle à rendre.
#[derive(Clone)]
pub struct Device {
    info: DeviceInfo,
    allocator: Arc<dyn Allocator>,
}

impl Device {
    /// Construit un device depuis ses infos et un allocateur.
    pub fn new(info: DeviceInfo, allocator: Arc<dyn Allocator>) -> Self {
        Self { info, allocator }
    }

    /// Infos d'identité.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Nom du device.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Allocateur du device.
    pub fn allocator(&self) -> &dyn Allocator {
        self.allocator.as_ref()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("info", &self.info)
            .field("allocator", &self.allocator.name())
            .finish()
    }
}

/* ─────────────────────────── Drivers ─────────────────────────── */

/// Fabrique de devices, résolue par nom.
pub trait Driver: Send + Sync {
    /// Nom d'enregistrement du driver.
    fn name(&self) -> &str;

    /// Crée le device par défaut du driver.
    fn create_default_device(&self) -> HalResult<Device>;
}

/// Driver CPU hôte (tas).
#[derive(Debug, Default, Clone, Copy)]
pub struct HostDriver;

impl Driver for HostDriver {
    fn name(&self) -> &str {
        "host"
    }

    fn create_default_device(&self) -> HalResult<Device> {
        Ok(Device::new(
            DeviceInfo { name: "host:0".to_string(), driver: "host".to_string() },
            Arc::new(HostAllocator),
        ))
    }
}

/// Registre de drivers, résolvable par nom.
pub struct DriverRegistry {
    drivers: BTreeMap<String, Box<dyn Driver>>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl DriverRegistry {
    /// Registre vide.
    pub fn new() -> Self {
        Self { drivers: BTreeMap::new() }
    }

    /// Registre préchargé avec les drivers de base ([`HostDriver`]).
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        r.register(Box::new(HostDriver));
        r
    }

    /// Enregistre un driver (remplace un homonyme éventuel).
    pub fn register(&mut self, driver: Box<dyn Driver>) {
        self.drivers.insert(driver.name().to_string(), driver);
    }

    /// Noms des drivers enregistrés (ordre stable).
    pub fn names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    /// Résout `driver_name` et instancie son device par défaut.
    pub fn create_device(&self, driver_name: &str) -> HalResult<Device> {
        let driver = self
            .drivers
            .get(driver_name)
            .ok_or_else(|| HalError::NotFound(driver_name.to_string()))?;
        driver.create_default_device()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry").field("drivers", &self.names()).finish()
    }
}

/* ─────────────────────────── Prélude ─────────────────────────── */

/// Prélude pratique pour importer d'un coup.
pub mod prelude {
    pub use crate::{
        Allocator, Buffer, BufferUsage, Device, DeviceInfo, Driver, DriverRegistry, HalError,
        HalResult, HostAllocator, HostDriver, MemoryType,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn host_device_roundtrip() {
        let registry = DriverRegistry::with_defaults();
        let device = registry.create_device("host").unwrap();
        assert_eq!(device.name(), "host:0");
        assert_eq!(device.info().driver, "host");
    }

    #[test]
    fn unknown_driver_not_found() {
        let registry = DriverRegistry::with_defaults();
        let err = registry.create_device("nonexistent_driver").unwrap_err();
        match err {
            HalError::NotFound(name) => assert_eq!(name, "nonexistent_driver"),
            other => panic!("attendu NotFound, reçu {other:?}"),
        }
    }

    #[test]
    fn allocate_and_write() {
        let alloc = HostAllocator;
        let mut buf = alloc
            .allocate(MemoryType::HOST_LOCAL, BufferUsage::ALL, 8)
            .unwrap();
        buf.write_bytes(0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buf.map().unwrap(), &[1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn write_out_of_range() {
        let alloc = HostAllocator;
        let mut buf = alloc
            .allocate(MemoryType::HOST_LOCAL, BufferUsage::ALL, 2)
            .unwrap();
        let err = buf.write_bytes(1, &[0, 0]).unwrap_err();
        match err {
            HalError::OutOfRange { offset: 1, len: 2, capacity: 2 } => {}
            other => panic!("attendu OutOfRange, reçu {other:?}"),
        }
    }

    #[test]
    fn usage_enforced() {
        let alloc = HostAllocator;
        let buf = alloc
            .allocate(MemoryType::HOST_LOCAL, BufferUsage::TRANSFER, 4)
            .unwrap();
        assert!(buf.map().is_err());
        assert!(alloc
            .allocate(MemoryType::HOST_LOCAL, BufferUsage::empty(), 4)
            .is_err());
    }

    #[test]
    fn custom_driver_registration() {
        struct NullDriver;
        impl Driver for NullDriver {
            fn name(&self) -> &str {
                "null"
            }
            fn create_default_device(&self) -> HalResult<Device> {
                Err(HalError::Unsupported("null ne crée pas de device"))
            }
        }

        let mut registry = DriverRegistry::with_defaults();
        registry.register(Box::new(NullDriver));
        assert_eq!(registry.names(), vec!["host", "null"]);
        assert!(registry.create_device("null").is_err());
    }
}
