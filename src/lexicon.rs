//! Lexical entries and lexicons.
//!
//! A lexicon maps token sequences to candidate categories. Entries are
//! shared as `Arc<LexicalEntry<MR>>` between lexicons and chart cells.
//!
//! Lexicon files hold one entry per line:
//!
//! ```text
//! // comment
//! the :- NP/N : (lambda $0 (the $0))
//! new york :- NP : new_york
//! ```

use crate::category::{Category, CategoryError, CategoryServices, Semantics};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Property key recording where an entry came from.
pub const ORIGIN_PROPERTY: &str = "origin";

/// Origin of entries produced by the word-skipping generator.
pub const SKIPPING_ORIGIN: &str = "skipping";

/// Errors raised while reading lexical entries.
#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("unrecognized format for lexical item: {line}")]
    UnrecognizedFormat { line: String },
    #[error("invalid category in lexical item {line:?}: {source}")]
    Category {
        line: String,
        #[source]
        source: CategoryError,
    },
    #[error("reading failed at line {line_number}: {line}")]
    Entry {
        line_number: usize,
        line: String,
        #[source]
        source: Box<LexiconError>,
    },
    #[error("reading of input file {} failed at line {line_number}", .path.display())]
    File {
        path: PathBuf,
        line_number: usize,
        #[source]
        source: Box<LexiconError>,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for lexicon operations.
pub type LexiconResult<T> = Result<T, LexiconError>;

/// An immutable sequence of tokens.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TokenSeq {
    tokens: Arc<[Arc<str>]>,
}

impl TokenSeq {
    pub fn of<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        TokenSeq {
            tokens: tokens.into_iter().map(|t| Arc::from(t.as_ref())).collect(),
        }
    }

    /// Split a sentence on whitespace.
    pub fn from_sentence(sentence: &str) -> Self {
        Self::of(sentence.split_whitespace())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(|t| t.as_ref())
    }

    /// Tokens in `[start, end)`.
    pub fn sub(&self, start: usize, end: usize) -> TokenSeq {
        TokenSeq {
            tokens: self.tokens[start..end].iter().cloned().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.as_ref())
    }
}

impl fmt::Display for TokenSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

/// A lexical entry pairing tokens with a category.
///
/// Equality and hashing use tokens, category and the dynamic flag only.
/// Properties (including the origin) are metadata.
#[derive(Clone, Debug)]
pub struct LexicalEntry<MR> {
    tokens: TokenSeq,
    category: Category<MR>,
    dynamic: bool,
    properties: FxHashMap<String, String>,
}

impl<MR: Semantics> LexicalEntry<MR> {
    pub fn new(tokens: TokenSeq, category: Category<MR>, dynamic: bool) -> Self {
        debug_assert!(!tokens.is_empty(), "lexical entry with no tokens");
        LexicalEntry {
            tokens,
            category,
            dynamic,
            properties: FxHashMap::default(),
        }
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.properties
            .insert(ORIGIN_PROPERTY.to_string(), origin.to_string());
        self
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Parse `tokens :- category`.
    pub fn read(
        line: &str,
        services: &CategoryServices<MR>,
        origin: Option<&str>,
    ) -> LexiconResult<Self> {
        Self::read_filtered(line, |text| text.to_string(), services, origin)
    }

    /// Parse `tokens :- category`, passing the token text through `filter`
    /// before splitting.
    pub fn read_filtered<F>(
        line: &str,
        filter: F,
        services: &CategoryServices<MR>,
        origin: Option<&str>,
    ) -> LexiconResult<Self>
    where
        F: Fn(&str) -> String,
    {
        let split = match line.find(":-") {
            Some(split) if split > 0 => split,
            _ => {
                return Err(LexiconError::UnrecognizedFormat {
                    line: line.to_string(),
                })
            }
        };
        let tokens = TokenSeq::from_sentence(&filter(&line[..split]));
        if tokens.is_empty() {
            return Err(LexiconError::UnrecognizedFormat {
                line: line.to_string(),
            });
        }
        let category = services
            .read(&line[split + 2..])
            .map_err(|source| LexiconError::Category {
                line: line.to_string(),
                source,
            })?;
        let entry = LexicalEntry::new(tokens, category, false);
        Ok(match origin {
            Some(origin) => entry.with_origin(origin),
            None => entry,
        })
    }

    pub fn tokens(&self) -> &TokenSeq {
        &self.tokens
    }

    pub fn category(&self) -> &Category<MR> {
        &self.category
    }

    /// Dynamic entries are generated during inference and never stored in
    /// a model lexicon.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn origin(&self) -> Option<&str> {
        self.property(ORIGIN_PROPERTY)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &FxHashMap<String, String> {
        &self.properties
    }

    pub fn clone_with_properties(&self, properties: FxHashMap<String, String>) -> Self {
        LexicalEntry {
            tokens: self.tokens.clone(),
            category: self.category.clone(),
            dynamic: self.dynamic,
            properties,
        }
    }
}

impl<MR: Semantics> PartialEq for LexicalEntry<MR> {
    fn eq(&self, other: &Self) -> bool {
        self.dynamic == other.dynamic
            && self.tokens == other.tokens
            && self.category == other.category
    }
}

impl<MR: Semantics> Eq for LexicalEntry<MR> {}

impl<MR: Semantics> Hash for LexicalEntry<MR> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tokens.hash(state);
        self.category.hash(state);
        self.dynamic.hash(state);
    }
}

impl<MR: Semantics> fmt::Display for LexicalEntry<MR> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :- {}", self.tokens, self.category)
    }
}

/// Auxiliary entries generated alongside an entry, kept outside the entry
/// value itself.
#[derive(Debug)]
pub struct LinkedEntries<MR> {
    links: FxHashMap<Arc<LexicalEntry<MR>>, IndexSet<Arc<LexicalEntry<MR>>>>,
}

impl<MR: Semantics> Default for LinkedEntries<MR> {
    fn default() -> Self {
        Self::new()
    }
}

impl<MR: Semantics> LinkedEntries<MR> {
    pub fn new() -> Self {
        LinkedEntries {
            links: FxHashMap::default(),
        }
    }

    pub fn link(&mut self, entry: Arc<LexicalEntry<MR>>, linked: Arc<LexicalEntry<MR>>) {
        self.links.entry(entry).or_default().insert(linked);
    }

    pub fn link_all<I>(&mut self, entry: Arc<LexicalEntry<MR>>, linked: I)
    where
        I: IntoIterator<Item = Arc<LexicalEntry<MR>>>,
    {
        self.links.entry(entry).or_default().extend(linked);
    }

    /// Entries linked to `entry`, in insertion order.
    pub fn linked(&self, entry: &LexicalEntry<MR>) -> impl Iterator<Item = &Arc<LexicalEntry<MR>>> {
        self.links.get(entry).into_iter().flatten()
    }

    pub fn remove(&mut self, entry: &LexicalEntry<MR>) -> Option<IndexSet<Arc<LexicalEntry<MR>>>> {
        self.links.remove(entry)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Read-only lexicon lookup.
pub trait ImmutableLexicon<MR: Semantics>: Send + Sync {
    fn contains(&self, entry: &LexicalEntry<MR>) -> bool;

    /// Entries for exactly this token sequence.
    fn get(&self, tokens: &TokenSeq) -> Vec<Arc<LexicalEntry<MR>>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_collection(&self) -> Vec<Arc<LexicalEntry<MR>>>;
}

/// A lexicon that can be extended.
pub trait MutableLexicon<MR: Semantics>: ImmutableLexicon<MR> {
    /// Add an entry. Returns `false` if it was already present.
    fn add(&mut self, entry: Arc<LexicalEntry<MR>>) -> bool;

    /// Add every entry, returning the ones that were new.
    fn add_all<I>(&mut self, entries: I) -> Vec<Arc<LexicalEntry<MR>>>
    where
        I: IntoIterator<Item = Arc<LexicalEntry<MR>>>,
        Self: Sized,
    {
        entries
            .into_iter()
            .filter(|entry| self.add(entry.clone()))
            .collect()
    }

    /// Keep only entries for which `keep` holds. Returns whether anything
    /// was removed.
    fn retain_all(&mut self, keep: &dyn Fn(&LexicalEntry<MR>) -> bool) -> bool;
}

/// Hash-indexed lexicon.
#[derive(Debug, Clone)]
pub struct Lexicon<MR> {
    entries: FxHashMap<TokenSeq, IndexSet<Arc<LexicalEntry<MR>>>>,
    size: usize,
}

impl<MR: Semantics> Default for Lexicon<MR> {
    fn default() -> Self {
        Self::new()
    }
}

impl<MR: Semantics> Lexicon<MR> {
    pub fn new() -> Self {
        Lexicon {
            entries: FxHashMap::default(),
            size: 0,
        }
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = LexicalEntry<MR>>,
    {
        let mut lexicon = Self::new();
        for entry in entries {
            lexicon.add(Arc::new(entry));
        }
        lexicon
    }

    /// Read entries from text, one per line. Blank lines and lines starting
    /// with `//` are skipped. Returns the entries that were new.
    pub fn add_entries_from_str(
        &mut self,
        text: &str,
        services: &CategoryServices<MR>,
        origin: Option<&str>,
    ) -> LexiconResult<Vec<Arc<LexicalEntry<MR>>>> {
        self.add_entries_filtered(text, &|s: &str| s.to_string(), services, origin)
    }

    /// Like [`Lexicon::add_entries_from_str`], filtering the token text.
    pub fn add_entries_filtered(
        &mut self,
        text: &str,
        filter: &dyn Fn(&str) -> String,
        services: &CategoryServices<MR>,
        origin: Option<&str>,
    ) -> LexiconResult<Vec<Arc<LexicalEntry<MR>>>> {
        let mut added = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let entry = LexicalEntry::read_filtered(line, filter, services, origin).map_err(
                |source| LexiconError::Entry {
                    line_number: index + 1,
                    line: line.to_string(),
                    source: Box::new(source),
                },
            )?;
            let entry = Arc::new(entry);
            if self.add(entry.clone()) {
                added.push(entry);
            }
        }
        debug!(added = added.len(), total = self.size, "read lexical entries");
        Ok(added)
    }

    /// Read entries from a lexicon file.
    pub fn add_entries_from_file(
        &mut self,
        path: impl AsRef<Path>,
        services: &CategoryServices<MR>,
        origin: Option<&str>,
    ) -> LexiconResult<Vec<Arc<LexicalEntry<MR>>>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let added = self
            .add_entries_from_str(&text, services, origin)
            .map_err(|err| match err {
                LexiconError::Entry {
                    line_number, source, ..
                } => LexiconError::File {
                    path: path.to_path_buf(),
                    line_number,
                    source,
                },
                other => other,
            })?;
        info!(
            path = %path.display(),
            added = added.len(),
            origin = origin.unwrap_or("-"),
            "loaded lexicon file"
        );
        Ok(added)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LexicalEntry<MR>>> {
        self.entries.values().flatten()
    }
}

impl<MR: Semantics> ImmutableLexicon<MR> for Lexicon<MR> {
    fn contains(&self, entry: &LexicalEntry<MR>) -> bool {
        self.entries
            .get(entry.tokens())
            .is_some_and(|set| set.contains(entry))
    }

    fn get(&self, tokens: &TokenSeq) -> Vec<Arc<LexicalEntry<MR>>> {
        self.entries
            .get(tokens)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.size
    }

    fn to_collection(&self) -> Vec<Arc<LexicalEntry<MR>>> {
        self.iter().cloned().collect()
    }
}

impl<MR: Semantics> MutableLexicon<MR> for Lexicon<MR> {
    fn add(&mut self, entry: Arc<LexicalEntry<MR>>) -> bool {
        let inserted = self
            .entries
            .entry(entry.tokens().clone())
            .or_default()
            .insert(entry);
        if inserted {
            self.size += 1;
        }
        inserted
    }

    fn retain_all(&mut self, keep: &dyn Fn(&LexicalEntry<MR>) -> bool) -> bool {
        let before = self.size;
        for set in self.entries.values_mut() {
            set.retain(|entry| keep(entry.as_ref()));
        }
        self.entries.retain(|_, set| !set.is_empty());
        self.size = self.entries.values().map(IndexSet::len).sum();
        self.size != before
    }
}

/// Ordered layering of lexicons. Lookups concatenate layers, dropping
/// duplicates.
pub struct CompositeLexicon<MR: Semantics> {
    layers: Vec<Arc<dyn ImmutableLexicon<MR>>>,
}

impl<MR: Semantics> Default for CompositeLexicon<MR> {
    fn default() -> Self {
        Self::new()
    }
}

impl<MR: Semantics> CompositeLexicon<MR> {
    pub fn new() -> Self {
        CompositeLexicon { layers: Vec::new() }
    }

    pub fn with_layer(mut self, layer: Arc<dyn ImmutableLexicon<MR>>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn push(&mut self, layer: Arc<dyn ImmutableLexicon<MR>>) {
        self.layers.push(layer);
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl<MR: Semantics> ImmutableLexicon<MR> for CompositeLexicon<MR> {
    fn contains(&self, entry: &LexicalEntry<MR>) -> bool {
        self.layers.iter().any(|layer| layer.contains(entry))
    }

    fn get(&self, tokens: &TokenSeq) -> Vec<Arc<LexicalEntry<MR>>> {
        let mut result: IndexSet<Arc<LexicalEntry<MR>>> = IndexSet::new();
        for layer in &self.layers {
            result.extend(layer.get(tokens));
        }
        result.into_iter().collect()
    }

    fn len(&self) -> usize {
        self.to_collection().len()
    }

    fn to_collection(&self) -> Vec<Arc<LexicalEntry<MR>>> {
        let mut result: IndexSet<Arc<LexicalEntry<MR>>> = IndexSet::new();
        for layer in &self.layers {
            result.extend(layer.to_collection());
        }
        result.into_iter().collect()
    }
}

/// Generates a sentence-specific lexicon.
pub trait SentenceLexiconGenerator<MR: Semantics>: Send + Sync {
    fn generate(&self, tokens: &TokenSeq) -> Lexicon<MR>;
}

/// Emits a dynamic EMPTY entry (no semantics) for every single token, so
/// the skipping rules can absorb any word.
#[derive(Debug, Clone)]
pub struct SkippingLexiconGenerator<MR> {
    empty: Category<MR>,
}

impl<MR: Semantics> SkippingLexiconGenerator<MR> {
    pub fn new(services: &CategoryServices<MR>) -> Self {
        SkippingLexiconGenerator {
            empty: services.empty_category(),
        }
    }
}

impl<MR: Semantics> SentenceLexiconGenerator<MR> for SkippingLexiconGenerator<MR> {
    fn generate(&self, tokens: &TokenSeq) -> Lexicon<MR> {
        Lexicon::from_entries(tokens.iter().map(|token| {
            LexicalEntry::new(TokenSeq::of([token]), self.empty.clone(), true)
                .with_origin(SKIPPING_ORIGIN)
        }))
    }
}
