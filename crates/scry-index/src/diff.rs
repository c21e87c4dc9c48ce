//! Create/update/delete diffing of fresh extractions against a ledger.
//!
//! Diffing is pure: it reads a ledger and produces a [`ChangeSet`]. The sync
//! engine pairs each transition with its vector mutation and only then
//! applies the change set to the ledger.

use std::collections::{HashMap, HashSet};

use scry_core::{Chunk, ChunkKey};
use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;
use crate::normalize::same_content;

/// A lifecycle transition for one chunk identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First time this key is observed.
    Created(Chunk),
    /// Same key, different normalized content.
    Updated { previous: Chunk, current: Chunk },
    /// A stored key missing from a fresh extraction of its file.
    Deleted(Chunk),
}

/// Wire name of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl Transition {
    pub fn change_type(&self) -> ChangeType {
        match self {
            Transition::Created(_) => ChangeType::Created,
            Transition::Updated { .. } => ChangeType::Updated,
            Transition::Deleted(_) => ChangeType::Deleted,
        }
    }

    /// The chunk as it stands after the transition (or, for deletions, as
    /// it stood before).
    pub fn chunk(&self) -> &Chunk {
        match self {
            Transition::Created(c) | Transition::Deleted(c) => c,
            Transition::Updated { current, .. } => current,
        }
    }
}

/// The transitions produced by one diff, plus how many chunks were unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub transitions: Vec<Transition>,
    pub unchanged: usize,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn count(&self, change: ChangeType) -> usize {
        self.transitions
            .iter()
            .filter(|t| t.change_type() == change)
            .count()
    }

    /// Chunks that need a fresh embedding (created and updated).
    pub fn needs_embedding(&self) -> impl Iterator<Item = &Chunk> {
        self.transitions.iter().filter_map(|t| match t {
            Transition::Created(c) | Transition::Updated { current: c, .. } => Some(c),
            Transition::Deleted(_) => None,
        })
    }

    /// Apply the transitions to `ledger`. Unchanged chunks are left exactly
    /// as stored, including their line ranges.
    pub fn apply(&self, ledger: &mut Ledger) {
        let mut index: HashMap<ChunkKey, usize> = ledger
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.key(), i))
            .collect();
        let mut deleted: HashSet<ChunkKey> = HashSet::new();

        for transition in &self.transitions {
            match transition {
                Transition::Created(chunk) => {
                    index.insert(chunk.key(), ledger.chunks.len());
                    ledger.chunks.push(chunk.clone());
                }
                Transition::Updated { current, .. } => match index.get(&current.key()) {
                    Some(&i) => ledger.chunks[i] = current.clone(),
                    None => {
                        index.insert(current.key(), ledger.chunks.len());
                        ledger.chunks.push(current.clone());
                    }
                },
                Transition::Deleted(chunk) => {
                    deleted.insert(chunk.key());
                }
            }
        }

        if !deleted.is_empty() {
            ledger.chunks.retain(|c| !deleted.contains(&c.key()));
        }
    }
}

fn classify(stored: Option<&Chunk>, fresh: &Chunk) -> Option<Transition> {
    match stored {
        None => Some(Transition::Created(fresh.clone())),
        Some(previous) if !same_content(&previous.content, &fresh.content, &fresh.file_path) => {
            Some(Transition::Updated {
                previous: previous.clone(),
                current: fresh.clone(),
            })
        }
        Some(_) => None,
    }
}

/// Diff a full scan against the stored ledger.
///
/// Chunks are upserted by identity key; a full scan never implies a
/// deletion. A ledger belonging to a different project is ignored, so every
/// chunk comes out as created.
///
/// # Examples
///
/// ```
/// use scry_core::{Chunk, ChunkKind, LineRange};
/// use scry_index::diff::diff_full_scan;
/// use scry_index::ledger::Ledger;
///
/// let chunk = Chunk {
///     symbol: "showToast".into(),
///     file_path: "ui/toast.ts".into(),
///     kind: ChunkKind::Function,
///     line_range: LineRange::new(1, 1),
///     calls: vec![],
///     content: "function showToast() {}".into(),
/// };
/// let first = diff_full_scan(None, "shop", &[chunk.clone()]);
/// assert_eq!(first.transitions.len(), 1);
///
/// let mut ledger = Ledger::new("shop", "");
/// first.apply(&mut ledger);
/// let second = diff_full_scan(Some(&ledger), "shop", &[chunk]);
/// assert!(second.is_empty());
/// assert_eq!(second.unchanged, 1);
/// ```
pub fn diff_full_scan(stored: Option<&Ledger>, project: &str, chunks: &[Chunk]) -> ChangeSet {
    let stored = stored.filter(|l| l.project_name == project);
    let index: HashMap<ChunkKey, &Chunk> = stored
        .map(|l| l.chunks.iter().map(|c| (c.key(), c)).collect())
        .unwrap_or_default();

    let mut set = ChangeSet::default();
    let mut seen: HashSet<ChunkKey> = HashSet::new();
    for fresh in chunks {
        let key = fresh.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        match classify(index.get(&key).copied(), fresh) {
            Some(t) => set.transitions.push(t),
            None => set.unchanged += 1,
        }
    }
    set
}

/// Diff a fresh extraction of `file_path` against the stored ledger.
///
/// Keys stored for the file but absent from `fresh` are deleted. Passing an
/// empty `fresh` list deletes every chunk of the file.
pub fn diff_file(stored: &Ledger, file_path: &str, fresh: &[Chunk]) -> ChangeSet {
    let previous: HashMap<ChunkKey, &Chunk> = stored
        .chunks_for_file(file_path)
        .map(|c| (c.key(), c))
        .collect();

    let mut set = ChangeSet::default();
    let mut seen: HashSet<ChunkKey> = HashSet::new();
    for chunk in fresh.iter().filter(|c| c.file_path == file_path) {
        let key = chunk.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        match classify(previous.get(&key).copied(), chunk) {
            Some(t) => set.transitions.push(t),
            None => set.unchanged += 1,
        }
    }

    for chunk in stored.chunks_for_file(file_path) {
        if !seen.contains(&chunk.key()) {
            set.transitions.push(Transition::Deleted(chunk.clone()));
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::{ChunkKind, LineRange};

    fn chunk(symbol: &str, file: &str, body: &str) -> Chunk {
        Chunk {
            symbol: symbol.into(),
            file_path: file.into(),
            kind: ChunkKind::Function,
            line_range: LineRange::new(1, 3),
            calls: vec![],
            content: format!("function {symbol}() {{ {body} }}"),
        }
    }

    fn ledger_with(chunks: Vec<Chunk>) -> Ledger {
        Ledger {
            project_name: "shop".into(),
            source_path: "/src/shop".into(),
            chunks,
        }
    }

    #[test]
    fn comment_only_edit_is_unchanged() {
        let ledger = ledger_with(vec![chunk("showToast", "ui/toast.ts", "render(msg);")]);
        let edited = chunk("showToast", "ui/toast.ts", "// show it\n render(msg);");
        let set = diff_file(&ledger, "ui/toast.ts", &[edited]);
        assert!(set.is_empty());
        assert_eq!(set.unchanged, 1);
    }

    #[test]
    fn executable_edit_is_updated() {
        let ledger = ledger_with(vec![chunk("showToast", "ui/toast.ts", "render(msg);")]);
        let edited = chunk("showToast", "ui/toast.ts", "render(msg, 3000);");
        let set = diff_file(&ledger, "ui/toast.ts", &[edited.clone()]);
        assert_eq!(set.count(ChangeType::Updated), 1);
        assert_eq!(set.transitions[0].chunk(), &edited);
    }

    #[test]
    fn removed_function_is_deleted_once() {
        let ledger = ledger_with(vec![
            chunk("showToast", "ui/toast.ts", "a();"),
            chunk("hideToast", "ui/toast.ts", "b();"),
            chunk("formatDate", "utils/date.ts", "c();"),
        ]);
        let set = diff_file(&ledger, "ui/toast.ts", &[chunk("showToast", "ui/toast.ts", "a();")]);
        assert_eq!(set.transitions.len(), 1);
        assert_eq!(set.count(ChangeType::Deleted), 1);
        assert_eq!(set.transitions[0].chunk().symbol, "hideToast");
    }

    #[test]
    fn empty_extraction_deletes_whole_file() {
        let ledger = ledger_with(vec![
            chunk("showToast", "ui/toast.ts", "a();"),
            chunk("formatDate", "utils/date.ts", "c();"),
        ]);
        let set = diff_file(&ledger, "ui/toast.ts", &[]);
        assert_eq!(set.count(ChangeType::Deleted), 1);

        let mut after = ledger.clone();
        set.apply(&mut after);
        assert_eq!(after.chunks.len(), 1);
        assert_eq!(after.chunks[0].symbol, "formatDate");
    }

    #[test]
    fn same_symbol_different_kind_is_a_different_chunk() {
        let ledger = ledger_with(vec![chunk("Toast", "ui/Toast.tsx", "x();")]);
        let mut component = chunk("Toast", "ui/Toast.tsx", "x();");
        component.kind = ChunkKind::Component;
        let set = diff_file(&ledger, "ui/Toast.tsx", &[component]);
        assert_eq!(set.count(ChangeType::Created), 1);
        assert_eq!(set.count(ChangeType::Deleted), 1);
    }

    #[test]
    fn full_scan_never_deletes() {
        let ledger = ledger_with(vec![
            chunk("showToast", "ui/toast.ts", "a();"),
            chunk("formatDate", "utils/date.ts", "c();"),
        ]);
        let set = diff_full_scan(
            Some(&ledger),
            "shop",
            &[chunk("showToast", "ui/toast.ts", "a(); b();")],
        );
        assert_eq!(set.transitions.len(), 1);
        assert_eq!(set.count(ChangeType::Updated), 1);
    }

    #[test]
    fn full_scan_of_other_project_creates_everything() {
        let ledger = ledger_with(vec![chunk("showToast", "ui/toast.ts", "a();")]);
        let set = diff_full_scan(
            Some(&ledger),
            "blog",
            &[chunk("showToast", "ui/toast.ts", "a();")],
        );
        assert_eq!(set.count(ChangeType::Created), 1);
    }

    #[test]
    fn unchanged_chunks_keep_stored_line_ranges() {
        let stored = chunk("showToast", "ui/toast.ts", "a();");
        let mut ledger = ledger_with(vec![stored.clone()]);
        let mut moved = stored.clone();
        moved.line_range = LineRange::new(10, 12);
        let set = diff_file(&ledger, "ui/toast.ts", &[moved]);
        set.apply(&mut ledger);
        assert_eq!(ledger.chunks[0].line_range, LineRange::new(1, 3));
    }

    #[test]
    fn apply_preserves_order_and_appends_creations() {
        let mut ledger = ledger_with(vec![
            chunk("a", "x.ts", "1;"),
            chunk("b", "x.ts", "2;"),
        ]);
        let set = diff_file(
            &ledger,
            "x.ts",
            &[chunk("a", "x.ts", "1;"), chunk("b", "x.ts", "3;"), chunk("c", "x.ts", "4;")],
        );
        set.apply(&mut ledger);
        let symbols: Vec<&str> = ledger.chunks.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["a", "b", "c"]);
        assert!(ledger.chunks[1].content.contains("3;"));
    }
}
