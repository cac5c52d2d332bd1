//! Declaration identifiers and lookup symbols.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the synthetic lookup recorded wherever a functional-interface
/// conversion is resolved against a type.
///
/// Such a conversion depends on the single abstract method of the type even
/// when no call site names that method, so member changes must also
/// invalidate this symbol in every affected scope.
pub const SAM_LOOKUP_NAME: &str = "<SAM-CONSTRUCTOR>";

/// Fully-qualified, dot-separated name of a top-level class or file facade.
///
/// The root package is the empty string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeclarationId(String);

impl DeclarationId {
    /// Creates an identifier from its dotted form.
    pub fn new(fq_name: impl Into<String>) -> Self {
        Self(fq_name.into())
    }

    /// The root package.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Returns the dotted form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the root package.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the enclosing name, or the root for a single-segment name.
    pub fn parent(&self) -> DeclarationId {
        match self.0.rfind('.') {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        }
    }

    /// Returns the last segment.
    pub fn short_name(&self) -> &str {
        match self.0.rfind('.') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Returns `self.name`, or just `name` when `self` is the root.
    pub fn child(&self, name: &str) -> DeclarationId {
        if self.is_root() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", self.0, name))
        }
    }

    /// Iterates over the dot-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|s| !s.is_empty())
    }

    /// The lookup symbol under which references to this declaration are
    /// recorded: its short name in its parent's scope.
    pub fn as_lookup_symbol(&self) -> LookupSymbol {
        LookupSymbol::new(self.short_name(), self.parent().as_str())
    }
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeclarationId({})", self.0)
    }
}

impl From<&str> for DeclarationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// "`name` was referenced within `scope`": the fine-grained dependency edge.
///
/// `scope` is the dotted name of a package or class; the empty string is the
/// root package.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LookupSymbol {
    /// The referenced simple name.
    pub name: String,
    /// The scope the name was resolved in.
    pub scope: String,
}

impl LookupSymbol {
    /// Creates a lookup symbol.
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
        }
    }

    /// The SAM-conversion lookup symbol for `scope`.
    pub fn sam(scope: impl Into<String>) -> Self {
        Self::new(SAM_LOOKUP_NAME, scope)
    }
}

impl fmt::Display for LookupSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}#{}", self.scope, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_and_short_name() {
        let id = DeclarationId::new("a.b.Foo");
        assert_eq!(id.parent(), DeclarationId::new("a.b"));
        assert_eq!(id.short_name(), "Foo");
    }

    #[test]
    fn single_segment_parent_is_root() {
        let id = DeclarationId::new("Foo");
        assert!(id.parent().is_root());
        assert_eq!(id.short_name(), "Foo");
    }

    #[test]
    fn child_of_root() {
        assert_eq!(DeclarationId::root().child("Foo").as_str(), "Foo");
        assert_eq!(DeclarationId::new("a").child("Foo").as_str(), "a.Foo");
    }

    #[test]
    fn segments_skip_root() {
        let id = DeclarationId::new("a.b.C");
        let segs: Vec<_> = id.segments().collect();
        assert_eq!(segs, vec!["a", "b", "C"]);
        assert_eq!(DeclarationId::root().segments().count(), 0);
    }

    #[test]
    fn lookup_symbol_of_declaration() {
        let sym = DeclarationId::new("a.Foo").as_lookup_symbol();
        assert_eq!(sym, LookupSymbol::new("Foo", "a"));
    }

    #[test]
    fn lookup_symbol_display() {
        assert_eq!(LookupSymbol::new("bar", "a.Foo").to_string(), "a.Foo#bar");
        assert_eq!(LookupSymbol::new("main", "").to_string(), "main");
    }

    #[test]
    fn sam_symbol() {
        let sym = LookupSymbol::sam("a.Runner");
        assert_eq!(sym.name, SAM_LOOKUP_NAME);
        assert_eq!(sym.scope, "a.Runner");
    }
}
