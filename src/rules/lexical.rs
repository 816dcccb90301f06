//! The lexical rule: attach lexicon entries to the token span they cover.

use super::{RuleName, SentenceSpan};
use crate::category::{Category, Semantics};
use crate::lexicon::{ImmutableLexicon, LexicalEntry, TokenSeq};
use std::sync::Arc;

/// A lexical entry matched against a span.
#[derive(Clone, Debug)]
pub struct LexicalResult<MR> {
    entry: Arc<LexicalEntry<MR>>,
    rule_name: RuleName,
}

impl<MR: Semantics> LexicalResult<MR> {
    pub fn entry(&self) -> &Arc<LexicalEntry<MR>> {
        &self.entry
    }

    pub fn category(&self) -> &Category<MR> {
        self.entry.category()
    }

    pub fn rule_name(&self) -> &RuleName {
        &self.rule_name
    }
}

/// Looks up the exact token sequence of a span. Sub-sequences never match.
#[derive(Clone, Debug)]
pub struct LexicalRule {
    name: RuleName,
}

impl Default for LexicalRule {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalRule {
    pub fn new() -> Self {
        LexicalRule {
            name: RuleName::lexical(),
        }
    }

    pub fn name(&self) -> &RuleName {
        &self.name
    }

    /// One result per entry of `lexicon` for the tokens under `span`.
    pub fn apply<MR, L>(
        &self,
        sentence: &TokenSeq,
        span: &SentenceSpan,
        lexicon: &L,
    ) -> Vec<LexicalResult<MR>>
    where
        MR: Semantics,
        L: ImmutableLexicon<MR> + ?Sized,
    {
        let tokens = sentence.sub(span.start, span.end + 1);
        lexicon
            .get(&tokens)
            .into_iter()
            .map(|entry| LexicalResult {
                entry,
                rule_name: self.name.clone(),
            })
            .collect()
    }
}
