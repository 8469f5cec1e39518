//! Macro definitions and the macro table (§3, §4.3.1).
//!
//! A macro's replacement list is stored as a sequence of [`ReplacementToken`]
//! rather than raw [`Token`]s, so parameter references, `#`-stringify, and
//! `##`-paste are encoded once at `#define` time instead of being
//! re-discovered on every expansion.

use rustc_hash::FxHashMap;

use cfront_base::Symbol;

use crate::token::Token;

/// One element of a stored macro replacement list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplacementToken {
    /// An ordinary token, copied verbatim (after re-spanning) on expansion.
    Plain(Token),
    /// A reference to the `n`th parameter (0-based).
    Parameter(usize),
    /// The varargs tail parameter (`__VA_ARGS__`-shaped, present only when
    /// the macro was declared with a trailing `...`).
    Varargs,
    /// `#` immediately before a parameter reference: stringify that argument.
    Stringify(usize),
    /// `##`: paste the token rendered so far with the token that follows.
    Paste,
}

/// A stored macro definition (§3: "Macro definition").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    pub replacement: Vec<ReplacementToken>,
    pub parameter_count: usize,
    pub is_function_like: bool,
    pub has_varargs: bool,
    pub parameter_names: FxHashMap<Symbol, usize>,
}

impl MacroDef {
    pub fn object_like(replacement: Vec<ReplacementToken>) -> Self {
        MacroDef {
            replacement,
            parameter_count: 0,
            is_function_like: false,
            has_varargs: false,
            parameter_names: FxHashMap::default(),
        }
    }
}

/// Maps identifier symbols to their macro definitions (§3: "MacroTable").
///
/// A macro is present iff a `#define` without a matching `#undef` has
/// executed; directives inside a skipped conditional branch never touch
/// this table (the preprocessor enforces that by never dispatching
/// directives while skipping non-conditional ones, see §4.3 step 3).
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: FxHashMap<Symbol, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `def` under `name`. Returns `Err(())` if `name` is already
    /// defined with a replacement list that differs from `def`'s (§3:
    /// "Redefinition of an existing macro with a non-identical replacement
    /// list is an error").
    pub fn define(&mut self, name: Symbol, def: MacroDef) -> Result<(), ()> {
        if let Some(existing) = self.macros.get(&name) {
            if *existing != def {
                return Err(());
            }
            return Ok(());
        }
        self.macros.insert(name, def);
        Ok(())
    }

    /// Removes `name`'s definition. Returns `false` if it wasn't defined
    /// (the caller reports that as a warning, not an error, per §4.3).
    pub fn undef(&mut self, name: Symbol) -> bool {
        self.macros.remove(&name).is_some()
    }

    pub fn lookup(&self, name: Symbol) -> Option<&MacroDef> {
        self.macros.get(&name)
    }

    pub fn is_defined(&self, name: Symbol) -> bool {
        self.macros.contains_key(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_then_lookup() {
        let mut interner = cfront_base::Interner::new();
        let name = interner.intern("FOO");
        let mut table = MacroTable::new();
        table.define(name, MacroDef::object_like(vec![])).unwrap();
        assert!(table.is_defined(name));
    }

    #[test]
    fn undef_removes_entry() {
        let mut interner = cfront_base::Interner::new();
        let name = interner.intern("FOO");
        let mut table = MacroTable::new();
        table.define(name, MacroDef::object_like(vec![])).unwrap();
        assert!(table.undef(name));
        assert!(!table.is_defined(name));
    }

    #[test]
    fn undef_missing_returns_false() {
        let mut interner = cfront_base::Interner::new();
        let name = interner.intern("FOO");
        let mut table = MacroTable::new();
        assert!(!table.undef(name));
    }

    #[test]
    fn identical_redefinition_is_ok() {
        let mut interner = cfront_base::Interner::new();
        let name = interner.intern("FOO");
        let mut table = MacroTable::new();
        table.define(name, MacroDef::object_like(vec![])).unwrap();
        assert!(table.define(name, MacroDef::object_like(vec![])).is_ok());
    }

    #[test]
    fn differing_redefinition_is_error() {
        let mut interner = cfront_base::Interner::new();
        let name = interner.intern("FOO");
        let mut table = MacroTable::new();
        table.define(name, MacroDef::object_like(vec![])).unwrap();
        let mut def = MacroDef::object_like(vec![]);
        def.parameter_count = 1;
        assert!(table.define(name, def).is_err());
    }
}
