//! Best-effort call resolution against the project's own declarations.
//!
//! The symbol table only ever holds first-party chunks, so anything defined
//! in a dependency tree (or not declared at all) fails to resolve and is
//! dropped silently.

use std::collections::{BTreeMap, BTreeSet};

use scry_core::{Chunk, ChunkKind};

use crate::analyzer::CallSite;

/// Declarations visible for call resolution.
///
/// # Examples
///
/// ```
/// use scry_analyzer::{CallSite, SymbolTable};
///
/// let mut table = SymbolTable::default();
/// table.declare("showToast");
/// table.declare("Cart.total");
///
/// assert_eq!(table.resolve(&CallSite::Bare("showToast".into()), None).as_deref(), Some("showToast"));
/// assert_eq!(table.resolve(&CallSite::SelfMember("total".into()), Some("Cart")).as_deref(), Some("Cart.total"));
/// assert_eq!(table.resolve(&CallSite::Bare("fetch".into()), None), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    free: BTreeSet<String>,
    methods: BTreeSet<String>,
    /// method name -> classes declaring it
    owners: BTreeMap<String, BTreeSet<String>>,
}

impl SymbolTable {
    /// Build a table from already-resolved chunks (e.g. a stored ledger).
    pub fn from_chunks<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Self {
        let mut table = Self::default();
        for chunk in chunks {
            table.declare_kind(&chunk.symbol, chunk.kind);
        }
        table
    }

    /// Declare a symbol. `Class.member` declares a method; anything else a
    /// free function or component.
    pub fn declare(&mut self, symbol: &str) {
        match symbol.split_once('.') {
            Some((class, member)) => {
                self.methods.insert(symbol.to_string());
                self.owners
                    .entry(member.to_string())
                    .or_default()
                    .insert(class.to_string());
            }
            None => {
                self.free.insert(symbol.to_string());
            }
        }
    }

    pub(crate) fn declare_kind(&mut self, symbol: &str, kind: ChunkKind) {
        match kind {
            ChunkKind::ClassMethod => self.declare(symbol),
            ChunkKind::Function | ChunkKind::Component => {
                self.free.insert(symbol.to_string());
            }
        }
    }

    /// Resolve one call site from inside `scope` (the enclosing class).
    pub fn resolve(&self, site: &CallSite, scope: Option<&str>) -> Option<String> {
        match site {
            CallSite::Bare(name) => self.free.contains(name).then(|| name.clone()),
            CallSite::SelfMember(member) => {
                let class = scope?;
                let symbol = format!("{class}.{member}");
                if self.methods.contains(&symbol) {
                    Some(symbol)
                } else {
                    None
                }
            }
            CallSite::Qualified { receiver, member } => {
                let symbol = format!("{receiver}.{member}");
                if self.methods.contains(&symbol) {
                    Some(symbol)
                } else {
                    self.unique_owner(member)
                }
            }
            CallSite::Member(member) => self.unique_owner(member),
        }
    }

    fn unique_owner(&self, member: &str) -> Option<String> {
        let classes = self.owners.get(member)?;
        if classes.len() == 1 {
            classes.iter().next().map(|class| format!("{class}.{member}"))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::LineRange;

    fn table() -> SymbolTable {
        let mut t = SymbolTable::default();
        for s in ["showToast", "Cart.total", "Cart.add", "Basket.add", "Config.load"] {
            t.declare(s);
        }
        t
    }

    #[test]
    fn member_calls_resolve_only_when_unambiguous() {
        let t = table();
        assert_eq!(
            t.resolve(&CallSite::Member("total".into()), None).as_deref(),
            Some("Cart.total")
        );
        assert_eq!(t.resolve(&CallSite::Member("add".into()), None), None);
    }

    #[test]
    fn qualified_calls_prefer_exact_receiver() {
        let t = table();
        let site = CallSite::Qualified {
            receiver: "Basket".into(),
            member: "add".into(),
        };
        assert_eq!(t.resolve(&site, None).as_deref(), Some("Basket.add"));

        let instance = CallSite::Qualified {
            receiver: "config".into(),
            member: "load".into(),
        };
        assert_eq!(t.resolve(&instance, None).as_deref(), Some("Config.load"));
    }

    #[test]
    fn self_member_needs_scope() {
        let t = table();
        let site = CallSite::SelfMember("total".into());
        assert_eq!(t.resolve(&site, None), None);
        assert_eq!(t.resolve(&site, Some("Basket")), None);
    }

    #[test]
    fn from_chunks_uses_kind() {
        let chunk = Chunk {
            symbol: "Toast".into(),
            file_path: "ui/Toast.tsx".into(),
            kind: ChunkKind::Component,
            line_range: LineRange::new(1, 3),
            calls: vec![],
            content: "const Toast = () => <div/>;".into(),
        };
        let t = SymbolTable::from_chunks([&chunk]);
        assert_eq!(
            t.resolve(&CallSite::Bare("Toast".into()), None).as_deref(),
            Some("Toast")
        );
    }
}
