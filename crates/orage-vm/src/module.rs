//! Modules VM : frontière capacitaire + module HAL.
//!
//! Le trait [`Module`] est tout ce que la couche CLI suppose d'un module
//! (nom + exports). [`HalModule`] enveloppe un [`Device`] déjà créé et
//! expose son allocateur sous forme de fonctions natives, à la manière
//! d'un registre `module.nom → fonction`.

use std::collections::BTreeMap;
use std::fmt;

use orage_core::{ElementType, Scalar};
use orage_hal::{BufferUsage, Device, MemoryType};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::orbc::BytecodeModule;
use crate::variant::{BufferView, Variant};
use crate::{Shape, VmError, VmResult};

/* ─────────────────────────── Signatures ─────────────────────────── */

/// Signature d'une fonction exportée par un module.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FunctionSignature {
    /// Nom exporté.
    pub name: String,
    /// Nombre d'arguments.
    pub argc: u16,
    /// Nombre de résultats.
    pub retc: u16,
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) -> {}", self.name, self.argc, self.retc)
    }
}

/* ─────────────────────────── Trait Module ─────────────────────────── */

/// Frontière minimale d'un module chargeable dans la VM.
pub trait Module {
    /// Nom du module.
    fn name(&self) -> &str;

    /// Fonctions exportées.
    fn exports(&self) -> &[FunctionSignature];

    /// Cherche une fonction exportée par nom.
    fn signature(&self, function: &str) -> Option<&FunctionSignature> {
        self.exports().iter().find(|f| f.name == function)
    }
}

impl Module for BytecodeModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn exports(&self) -> &[FunctionSignature] {
        &self.exports
    }
}

/* ─────────────────────────── Module HAL ─────────────────────────── */

/// Fonction native exposée par le module HAL.
pub type NativeFn = fn(&[Variant], &Device) -> VmResult<Variant>;

struct NativeEntry {
    arity: usize,
    func: NativeFn,
}

/// Module VM enveloppant un device déjà créé.
///
/// Possédant : droppe le device avec lui. Les natives opèrent sur des
/// [`Variant`] et passent par l'allocateur du device.
pub struct HalModule {
    device: Device,
    entries: BTreeMap<String, NativeEntry>,
    exports: Vec<FunctionSignature>,
}

impl HalModule {
    /// Enveloppe `device` dans un module utilisable par la VM.
    ///
    /// Échoue si le device est invalide (identité vide).
    pub fn create(device: Device) -> VmResult<Self> {
        if device.name().is_empty() {
            return Err(VmError::Creation("device sans identité".to_string()));
        }

        let mut m = Self { device, entries: BTreeMap::new(), exports: Vec::new() };
        m.register("hal.buffer_allocate", 1, native_buffer_allocate);
        m.register("hal.buffer_splat", 2, native_buffer_splat);
        Ok(m)
    }

    /// Device enveloppé.
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn register(&mut self, name: &str, arity: usize, func: NativeFn) {
        self.exports.push(FunctionSignature {
            name: name.to_string(),
            argc: arity as u16,
            retc: 1,
        });
        self.entries.insert(name.to_string(), NativeEntry { arity, func });
    }

    /// Appelle une native par nom complet (`hal.xxx`).
    pub fn call(&self, function: &str, args: &[Variant]) -> VmResult<Variant> {
        let entry = self
            .entries
            .get(function)
            .ok_or_else(|| VmError::FunctionNotFound(function.to_string()))?;
        if args.len() != entry.arity {
            return Err(VmError::Arity { expected: entry.arity, got: args.len() });
        }
        (entry.func)(args, &self.device)
    }
}

impl Module for HalModule {
    fn name(&self) -> &str {
        "hal"
    }

    fn exports(&self) -> &[FunctionSignature] {
        &self.exports
    }
}

impl fmt::Debug for HalModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HalModule")
            .field("device", &self.device.name())
            .field("exports", &self.exports)
            .finish()
    }
}

/* ─────────────────────────── Natives ─────────────────────────── */

fn expect_len(v: &Variant) -> VmResult<usize> {
    match v {
        Variant::Scalar(Scalar::I64(n)) if *n >= 0 => Ok(*n as usize),
        other => Err(VmError::ArgType(format!(
            "longueur attendue en i64 non négatif, reçu {}",
            other.element_type()
        ))),
    }
}

/// `hal.buffer_allocate(len: i64) -> [len]xu8` zéro-initialisé.
fn native_buffer_allocate(args: &[Variant], device: &Device) -> VmResult<Variant> {
    let len = expect_len(&args[0])?;
    let buffer = device
        .allocator()
        .allocate(MemoryType::HOST_LOCAL, BufferUsage::ALL, len)?;
    let mut shape = Shape::new();
    shape.push(len);
    Ok(Variant::Buffer(BufferView { element_type: ElementType::U8, shape, buffer }))
}

/// `hal.buffer_splat(count: i64, value: scalaire) -> [count]xtype` rempli.
fn native_buffer_splat(args: &[Variant], device: &Device) -> VmResult<Variant> {
    let count = expect_len(&args[0])?;
    let value = match &args[1] {
        Variant::Scalar(s) => *s,
        Variant::Buffer(_) => {
            return Err(VmError::ArgType("valeur de splat attendue scalaire".to_string()))
        }
    };

    let ty = value.element_type();
    let byte_len = count
        .checked_mul(ty.byte_width())
        .ok_or_else(|| VmError::ArgType(format!("splat de {count} éléments hors limites")))?;
    let mut bytes = Vec::with_capacity(byte_len);
    for _ in 0..count {
        value.write_le(&mut bytes);
    }

    let mut buffer = device
        .allocator()
        .allocate(MemoryType::HOST_LOCAL, BufferUsage::ALL, bytes.len())?;
    buffer.write_bytes(0, &bytes)?;

    let mut shape = Shape::new();
    shape.push(count);
    Ok(Variant::Buffer(BufferView { element_type: ty, shape, buffer }))
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbc::OrbcBuilder;
    use orage_hal::DriverRegistry;
    use pretty_assertions::assert_eq;

    fn hal_module() -> HalModule {
        let device = DriverRegistry::with_defaults().create_device("host").unwrap();
        HalModule::create(device).unwrap()
    }

    #[test]
    fn bytecode_module_exports_lookup() {
        let bytes = OrbcBuilder::new("demo").export("main", 2, 1).to_bytes();
        let m = BytecodeModule::from_bytes(&bytes).unwrap();
        assert_eq!(Module::name(&m), "demo");
        let sig = m.signature("main").unwrap();
        assert_eq!(sig.to_string(), "main(2) -> 1");
        assert!(m.signature("absent").is_none());
    }

    #[test]
    fn hal_module_allocate() {
        let m = hal_module();
        let out = m
            .call("hal.buffer_allocate", &[Variant::Scalar(Scalar::I64(4))])
            .unwrap();
        match out {
            Variant::Buffer(view) => {
                assert_eq!(view.element_type, ElementType::U8);
                assert_eq!(view.to_text().unwrap(), "[4]xu8=[0,0,0,0]");
            }
            Variant::Scalar(_) => panic!("attendu un buffer"),
        }
    }

    #[test]
    fn hal_module_splat() {
        let m = hal_module();
        let args = [Variant::Scalar(Scalar::I64(3)), Variant::Scalar(Scalar::I32(7))];
        let out = m.call("hal.buffer_splat", &args).unwrap();
        match out {
            Variant::Buffer(view) => {
                assert_eq!(view.to_text().unwrap(), "[3]xi32=[7,7,7]");
            }
            Variant::Scalar(_) => panic!("attendu un buffer"),
        }
    }

    #[test]
    fn hal_module_call_errors() {
        let m = hal_module();
        assert!(matches!(
            m.call("hal.absent", &[]),
            Err(VmError::FunctionNotFound(_))
        ));
        assert!(matches!(
            m.call("hal.buffer_allocate", &[]),
            Err(VmError::Arity { expected: 1, got: 0 })
        ));
        assert!(matches!(
            m.call("hal.buffer_allocate", &[Variant::Scalar(Scalar::I64(-1))]),
            Err(VmError::ArgType(_))
        ));
    }

    #[test]
    fn hal_module_splat_overflow_rejected() {
        // count * largeur d'élément hors usize : erreur, pas de panique
        let m = hal_module();
        let args = [
            Variant::Scalar(Scalar::I64(i64::MAX)),
            Variant::Scalar(Scalar::I32(7)),
        ];
        assert!(matches!(
            m.call("hal.buffer_splat", &args),
            Err(VmError::ArgType(_))
        ));
    }
}
