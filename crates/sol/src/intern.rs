//! String interning and the metamethod name table.
//!
//! Identifiers, source names, and string constants are stored once in an
//! [`Interns`] table and referenced by [`StringId`]. Prototypes carry only
//! ids; the actual text is needed only when building error messages, debug
//! records, or host-facing output, so lookups stay off the hot paths.
//!
//! Metamethod names (`__index`, `__add`, ...) form a fixed vocabulary known
//! at compile time. [`MetaMethod`] plays the role of an interned name table
//! for them: the binary metamethod instructions carry a `MetaMethod` tag
//! directly, and error messages use [`MetaMethod::without_prefix`] to report
//! the event name (`"index"`, `"add"`, ...).

use ahash::AHashMap;
use strum::{Display, EnumString, FromRepr, IntoStaticStr};

/// Index into the string interner's storage.
///
/// Uses `u32` to save space (4 bytes vs 8 bytes for `usize`). This limits us
/// to ~4 billion unique interns, which is more than sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StringId(u32);

impl StringId {
    /// Creates a StringId from a raw index value.
    ///
    /// The caller is responsible for ensuring the index is valid for the
    /// interner it will be resolved against.
    #[inline]
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// String interner.
///
/// Stores unique strings in a vector and returns [`StringId`] indices for
/// storage and comparison. Populated during parsing and compilation, then
/// owned by the interpreter state; the debug core also interns error
/// messages it hands to the installed message handler.
#[derive(Debug, Default)]
pub struct Interns {
    /// Interned strings, indexed by `StringId`.
    strings: Vec<Box<str>>,
    /// Reverse lookup used to deduplicate on insert.
    lookup: AHashMap<Box<str>, StringId>,
}

impl Interns {
    /// Creates an empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning the id of the existing entry if the
    /// string was seen before.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.lookup.get(s) {
            return id;
        }
        let id = StringId(u32::try_from(self.strings.len()).expect("interner overflow"));
        self.strings.push(s.into());
        self.lookup.insert(s.into(), id);
        id
    }

    /// Returns the string for an id.
    ///
    /// # Panics
    /// Panics if the id was not produced by this interner.
    #[must_use]
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    /// Returns the number of interned strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns true if nothing has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Metamethod tags.
///
/// The order matches the interpreter's event numbering: the `MMBIN` family
/// of instructions stores one of these tags in its third operand, and the
/// table-access and comparison instructions map to `Index`/`NewIndex`/
/// `Lt`/`Le` when a metamethod call must be named in an error message.
///
/// The strum derives provide the full name (`"__add"`); error messages use
/// [`MetaMethod::without_prefix`] for the bare event name.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, FromRepr, IntoStaticStr)]
pub enum MetaMethod {
    #[strum(serialize = "__index")]
    Index,
    #[strum(serialize = "__newindex")]
    NewIndex,
    #[strum(serialize = "__gc")]
    Gc,
    #[strum(serialize = "__mode")]
    Mode,
    #[strum(serialize = "__len")]
    Len,
    #[strum(serialize = "__eq")]
    Eq,
    #[strum(serialize = "__add")]
    Add,
    #[strum(serialize = "__sub")]
    Sub,
    #[strum(serialize = "__mul")]
    Mul,
    #[strum(serialize = "__mod")]
    Mod,
    #[strum(serialize = "__pow")]
    Pow,
    #[strum(serialize = "__div")]
    Div,
    #[strum(serialize = "__idiv")]
    IDiv,
    #[strum(serialize = "__band")]
    BAnd,
    #[strum(serialize = "__bor")]
    BOr,
    #[strum(serialize = "__bxor")]
    BXor,
    #[strum(serialize = "__shl")]
    Shl,
    #[strum(serialize = "__shr")]
    Shr,
    #[strum(serialize = "__unm")]
    Unm,
    #[strum(serialize = "__bnot")]
    BNot,
    #[strum(serialize = "__lt")]
    Lt,
    #[strum(serialize = "__le")]
    Le,
    #[strum(serialize = "__concat")]
    Concat,
    #[strum(serialize = "__call")]
    Call,
    #[strum(serialize = "__close")]
    Close,
}

impl MetaMethod {
    /// Full metamethod name, e.g. `"__index"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Event name with the `"__"` prefix stripped, e.g. `"index"`.
    ///
    /// This is the form used in error messages naming a metamethod call.
    #[must_use]
    pub fn without_prefix(self) -> &'static str {
        &self.name()[2..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_deduplicates() {
        let mut interns = Interns::new();
        let a = interns.intern("print");
        let b = interns.intern("print");
        let c = interns.intern("x");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interns.get(a), "print");
        assert_eq!(interns.get(c), "x");
        assert_eq!(interns.len(), 2);
    }

    #[test]
    fn metamethod_names() {
        assert_eq!(MetaMethod::Index.name(), "__index");
        assert_eq!(MetaMethod::Index.without_prefix(), "index");
        assert_eq!(MetaMethod::Concat.without_prefix(), "concat");
        assert_eq!(MetaMethod::Close.without_prefix(), "close");
    }

    #[test]
    fn metamethod_from_repr_matches_order() {
        assert_eq!(MetaMethod::from_repr(0), Some(MetaMethod::Index));
        assert_eq!(MetaMethod::from_repr(6), Some(MetaMethod::Add));
        assert_eq!(MetaMethod::from_repr(24), Some(MetaMethod::Close));
    }
}
