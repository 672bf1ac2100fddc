//! Listes de variants : parsing et impression aller-retour.
//!
//! Grammaire par argument :
//! ```text
//! scalaire : type=valeur              ex: i32=42
//! buffer   : [d0,d1,...]xtype=[v0,v1,...]   ex: [2,2]xi32=[1,2,3,4]
//! ```
//! Le nombre de valeurs doit égaler le produit des dimensions (forme vide
//! `[]` = rang 0, une valeur). L'impression reproduit exactement la forme
//! acceptée par le parseur, permettant le re-parse.

use std::fmt;
use std::io::{self, Write};

use thiserror::Error;

use orage_core::{CoreError, ElementType, Scalar};
use orage_hal::{Allocator, BufferUsage, HalError, MemoryType};

use crate::Shape;

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de parsing d'un argument texte.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Structure générale non reconnue.
    #[error("syntaxe invalide: `{0}`")]
    Syntax(String),

    /// Dimension non numérique ou négative.
    #[error("dimension invalide: `{0}`")]
    BadDim(String),

    /// Étiquette de type inconnue ou valeur non convertible.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Produit des dimensions hors de portée d'un `usize`.
    #[error("forme [{shape}] : produit des dimensions hors limites")]
    ShapeOverflow {
        /// Forme déclarée (dimensions jointes par des virgules).
        shape: String,
    },

    /// Le nombre de valeurs ne correspond pas à la forme déclarée.
    #[error("{got} valeur(s) fournie(s) pour la forme [{shape}] ({expected} attendue(s))")]
    CountMismatch {
        /// Forme déclarée (dimensions jointes par des virgules).
        shape: String,
        /// Nombre de valeurs attendu (produit des dimensions).
        expected: usize,
        /// Nombre de valeurs fournies.
        got: usize,
    },

    /// L'allocateur fourni a refusé la mémoire du buffer.
    #[error("allocation du buffer: {0}")]
    Alloc(#[from] HalError),
}

/// Erreurs d'impression d'une liste de variants.
#[derive(Debug, Error)]
pub enum PrintError {
    /// Échec d'écriture sur la sortie.
    #[error("écriture: {0}")]
    Io(#[from] io::Error),

    /// Buffer non mappable.
    #[error("mapping du buffer: {0}")]
    Hal(#[from] HalError),

    /// Forme de la vue hors de portée d'un `usize`.
    #[error("forme [{shape}] : produit des dimensions hors limites")]
    ShapeOverflow {
        /// Forme de la vue (dimensions jointes par des virgules).
        shape: String,
    },

    /// Contenu du buffer incohérent avec son type d'élément.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/* ─────────────────────────── Vue buffer ─────────────────────────── */

/// Buffer façonné : type d'élément + forme + mémoire HAL.
#[derive(Debug, Clone)]
pub struct BufferView {
    /// Type des éléments.
    pub element_type: ElementType,
    /// Dimensions (vide = rang 0).
    pub shape: Shape,
    /// Mémoire sous-jacente (possédée).
    pub buffer: orage_hal::Buffer,
}

impl BufferView {
    /// Nombre d'éléments (produit des dimensions, 1 pour le rang 0).
    ///
    /// `None` si le produit déborde `usize` — une vue construite à la main
    /// peut porter n'importe quelle forme.
    pub fn element_count(&self) -> Option<usize> {
        checked_product(&self.shape)
    }

    /// Rend la forme `[forme]xtype=[valeurs]` acceptée par le parseur.
    pub fn to_text(&self) -> Result<String, PrintError> {
        let bytes = self.buffer.map()?;
        let width = self.element_type.byte_width();
        let overflow = || PrintError::ShapeOverflow { shape: fmt_shape(&self.shape) };
        let count = self.element_count().ok_or_else(overflow)?;
        let needed = count.checked_mul(width).ok_or_else(overflow)?;
        if bytes.len() < needed {
            return Err(CoreError::Truncated {
                ty: self.element_type,
                needed,
                got: bytes.len(),
            }
            .into());
        }

        let mut values = Vec::with_capacity(count);
        for chunk in bytes[..needed].chunks_exact(width) {
            values.push(Scalar::read_le(self.element_type, chunk)?.to_string());
        }

        Ok(format!(
            "[{}]x{}=[{}]",
            fmt_shape(&self.shape),
            self.element_type,
            values.join(",")
        ))
    }
}

impl fmt::Display for BufferView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_text().map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

fn fmt_shape(shape: &Shape) -> String {
    shape.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

fn checked_product(shape: &Shape) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/* ─────────────────────────── Variant ─────────────────────────── */

/// Élément d'une [`VariantList`] : scalaire ou buffer façonné.
#[derive(Debug, Clone)]
pub enum Variant {
    /// Valeur numérique typée.
    Scalar(Scalar),
    /// Buffer façonné.
    Buffer(BufferView),
}

impl Variant {
    /// Type d'élément du variant.
    pub fn element_type(&self) -> ElementType {
        match self {
            Variant::Scalar(s) => s.element_type(),
            Variant::Buffer(b) => b.element_type,
        }
    }

    /// Forme texte aller-retour (scalaire nu, buffer `[forme]xtype=[v…]`).
    pub fn to_text(&self) -> Result<String, PrintError> {
        match self {
            Variant::Scalar(s) => Ok(s.to_string()),
            Variant::Buffer(b) => b.to_text(),
        }
    }
}

/* ─────────────────────────── VariantList ─────────────────────────── */

/// Séquence ordonnée, hétérogène, de scalaires et buffers.
///
/// Possédante : la destruction relâche les buffers, rien à libérer à la
/// main. En cas d'erreur de parsing, rien ne survit (les buffers déjà
/// alloués sont droppés avec la liste partielle).
#[derive(Debug, Default, Clone)]
pub struct VariantList {
    items: Vec<Variant>,
}

impl VariantList {
    /// Liste vide.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nombre d'éléments.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Vrai si la liste est vide.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ajoute un variant en fin de liste.
    pub fn push(&mut self, v: Variant) {
        self.items.push(v);
    }

    /// Accès indexé.
    pub fn get(&self, idx: usize) -> Option<&Variant> {
        self.items.get(idx)
    }

    /// Itère sur les éléments.
    pub fn iter(&self) -> std::slice::Iter<'_, Variant> {
        self.items.iter()
    }

    /// Parse chaque chaîne de `inputs` en un variant.
    ///
    /// La mémoire des buffers vient de `allocator` ; la liste produite est
    /// rendue à l'appelant (possédante). Une seule fonction suffit pour
    /// tous les conteneurs de chaînes.
    pub fn parse<I, S>(allocator: &dyn Allocator, inputs: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for raw in inputs {
            list.push(parse_one(allocator, raw.as_ref().trim())?);
        }
        Ok(list)
    }

    /// Écrit chaque élément sur sa propre ligne.
    pub fn write_to(&self, out: &mut dyn io::Write) -> Result<(), PrintError> {
        for item in &self.items {
            writeln!(out, "{}", item.to_text()?)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a VariantList {
    type Item = &'a Variant;
    type IntoIter = std::slice::Iter<'a, Variant>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/* ─────────────────────────── Parseur ─────────────────────────── */

fn parse_one(allocator: &dyn Allocator, s: &str) -> Result<Variant, ParseError> {
    if s.starts_with('[') {
        parse_buffer(allocator, s)
    } else {
        parse_scalar(s)
    }
}

fn parse_scalar(s: &str) -> Result<Variant, ParseError> {
    let (tag, value) = s
        .split_once('=')
        .ok_or_else(|| ParseError::Syntax(s.to_string()))?;
    let ty: ElementType = tag.trim().parse()?;
    Ok(Variant::Scalar(Scalar::parse(ty, value)?))
}

fn parse_buffer(allocator: &dyn Allocator, s: &str) -> Result<Variant, ParseError> {
    let syntax = || ParseError::Syntax(s.to_string());

    // [d0,d1,...]
    let close = s.find(']').ok_or_else(syntax)?;
    let shape_src = &s[1..close];

    // xtype=
    let rest = s[close + 1..].strip_prefix('x').ok_or_else(syntax)?;
    let (tag, values_src) = rest.split_once('=').ok_or_else(syntax)?;
    let ty: ElementType = tag.trim().parse()?;

    // [v0,v1,...]
    let inner = values_src
        .trim()
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(syntax)?;

    let shape = parse_shape(shape_src)?;
    let overflow = || ParseError::ShapeOverflow { shape: fmt_shape(&shape) };
    let expected = checked_product(&shape).ok_or_else(overflow)?;
    let byte_len = expected.checked_mul(ty.byte_width()).ok_or_else(overflow)?;
    let values: Vec<&str> = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner.split(',').collect()
    };
    if values.len() != expected {
        return Err(ParseError::CountMismatch {
            shape: fmt_shape(&shape),
            expected,
            got: values.len(),
        });
    }

    let mut bytes = Vec::with_capacity(byte_len);
    for v in values {
        Scalar::parse(ty, v)?.write_le(&mut bytes);
    }

    let mut buffer = allocator.allocate(MemoryType::HOST_LOCAL, BufferUsage::ALL, bytes.len())?;
    buffer.write_bytes(0, &bytes)?;

    Ok(Variant::Buffer(BufferView { element_type: ty, shape, buffer }))
}

fn parse_shape(src: &str) -> Result<Shape, ParseError> {
    let mut shape = Shape::new();
    if src.trim().is_empty() {
        // rang 0 : une seule valeur
        return Ok(shape);
    }
    for dim in src.split(',') {
        let d: usize = dim
            .trim()
            .parse()
            .map_err(|_| ParseError::BadDim(dim.trim().to_string()))?;
        shape.push(d);
    }
    Ok(shape)
}

/* ─────────────────────────── Tests ─────────────────────────── */
