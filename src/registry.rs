//! Registry of simple syntax labels and attribute typing.
//!
//! The registry is built once at startup and shared (`Arc<SyntaxRegistry>`)
//! by everything that reads or rewrites syntax:
//! 1. Label interning: every registered label is stored once and handed out
//!    as a shared `Arc<str>`, so unattributed simple syntax is a singleton
//! 2. Attribute typing: an attribute may be restricted to a set of labels
//! 3. Reading: syntax strings are parsed against the registered labels

use crate::syntax::{
    Binding, SimpleSyntax, Slash, Syntax, SyntaxError, SyntaxResult, NO_ATTRIBUTE,
    VARIABLE_ATTRIBUTE,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Labels registered by [`SyntaxRegistry::new`].
pub const STANDARD_LABELS: &[&str] = &["AP", "NP", "EMPTY", "PP", "S", "C", "N", "DEG", "ADJ", "PUNCT"];

/// Label of the syntax absorbed by word skipping.
pub const EMPTY_LABEL: &str = "EMPTY";

/// Simple syntax labels and attribute typing constraints.
#[derive(Debug, Clone)]
pub struct SyntaxRegistry {
    /// Interned unattributed simple syntax, by label.
    simple: FxHashMap<Box<str>, SimpleSyntax>,
    /// Interned attribute strings.
    attributes: FxHashMap<Box<str>, Arc<str>>,
    /// attribute -> labels allowed to carry it. Absent means unconstrained.
    attribute_typing: FxHashMap<Arc<str>, FxHashSet<Arc<str>>>,
}

impl Default for SyntaxRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxRegistry {
    /// Create a registry with the standard labels.
    pub fn new() -> Self {
        let mut registry = Self::bare();
        for label in STANDARD_LABELS {
            // Labels are distinct, registration cannot fail.
            let _ = registry.register(label);
        }
        registry
    }

    /// Create a registry with no labels at all.
    pub fn bare() -> Self {
        SyntaxRegistry {
            simple: FxHashMap::default(),
            attributes: FxHashMap::default(),
            attribute_typing: FxHashMap::default(),
        }
    }

    /// Register a new simple syntax label.
    pub fn register(&mut self, label: &str) -> SyntaxResult<Syntax> {
        if self.simple.contains_key(label) {
            return Err(SyntaxError::AlreadyRegistered(label.to_string()));
        }
        let simple = SimpleSyntax::new(Arc::from(label), None);
        self.simple.insert(label.into(), simple.clone());
        Ok(Syntax::Simple(simple))
    }

    /// Restrict `attribute` to the given labels.
    pub fn restrict_attribute<I, S>(&mut self, attribute: &str, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let attribute = self.intern_attribute(attribute);
        let allowed = self.attribute_typing.entry(attribute).or_default();
        for label in labels {
            allowed.insert(Arc::from(label.as_ref()));
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.simple.contains_key(label)
    }

    /// Get the unattributed simple syntax for a label.
    pub fn get(&self, label: &str) -> Option<Syntax> {
        self.simple.get(label).cloned().map(Syntax::Simple)
    }

    /// Number of registered labels.
    pub fn len(&self) -> usize {
        self.simple.len()
    }

    pub fn is_empty(&self) -> bool {
        self.simple.is_empty()
    }

    /// The syntax absorbed by word skipping.
    pub fn empty(&self) -> Syntax {
        match self.get(EMPTY_LABEL) {
            Some(syntax) => syntax,
            None => Syntax::Simple(SimpleSyntax::new(Arc::from(EMPTY_LABEL), None)),
        }
    }

    fn intern_attribute(&mut self, attribute: &str) -> Arc<str> {
        if let Some(interned) = self.attributes.get(attribute) {
            return interned.clone();
        }
        let interned: Arc<str> = Arc::from(attribute);
        self.attributes.insert(attribute.into(), interned.clone());
        interned
    }

    fn attribute_arc(&self, attribute: &str) -> Arc<str> {
        self.attributes
            .get(attribute)
            .cloned()
            .unwrap_or_else(|| Arc::from(attribute))
    }

    /// Whether the attribute of `simple` may be placed on its label.
    pub fn is_well_typed(&self, simple: &SimpleSyntax) -> bool {
        match simple.attribute() {
            None | Some(VARIABLE_ATTRIBUTE) => true,
            Some(attribute) => self
                .attribute_typing
                .get(attribute)
                .map_or(true, |labels| labels.contains(simple.label())),
        }
    }

    /// Create `label[attribute]`, or `None` if the placement is ill-typed.
    pub fn clone_with_attribute(&self, simple: &SimpleSyntax, attribute: &str) -> Option<SimpleSyntax> {
        let cloned = simple.with_attribute(Some(self.attribute_arc(attribute)));
        self.is_well_typed(&cloned).then_some(cloned)
    }

    /// Replace every `attribute` with `replacement`, where `None` removes
    /// it. Fails if any resulting simple syntax is ill-typed.
    pub fn replace_attribute(
        &self,
        syntax: &Syntax,
        attribute: &str,
        replacement: Option<&Arc<str>>,
    ) -> Option<Syntax> {
        syntax.try_map_simple(&mut |simple| {
            if simple.attribute() == Some(attribute) {
                let replaced = simple.with_attribute(replacement.cloned());
                self.is_well_typed(&replaced).then_some(replaced)
            } else {
                Some(simple.clone())
            }
        })
    }

    /// Apply a variable binding from unification to `syntax`.
    pub fn set_variable(&self, syntax: &Syntax, assignment: Option<&Binding>) -> Option<Syntax> {
        match assignment {
            None => Some(syntax.clone()),
            Some(binding) => self.replace_attribute(syntax, VARIABLE_ATTRIBUTE, binding.attribute()),
        }
    }

    /// Read a syntax string.
    pub fn read(&self, input: &str) -> SyntaxResult<Syntax> {
        let trimmed = input.trim();
        if trimmed.contains(['/', '\\', '|']) {
            self.read_complex(trimmed)
        } else {
            self.read_simple(trimmed).map(Syntax::Simple)
        }
    }

    fn read_simple(&self, input: &str) -> SyntaxResult<SimpleSyntax> {
        let (label, attribute) = match input.find('[') {
            Some(open) => {
                let attribute = input[open + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| SyntaxError::Invalid(input.to_string()))?;
                (&input[..open], Some(attribute))
            }
            None => (input, None),
        };
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(SyntaxError::Invalid(input.to_string()));
        }
        if let Some(attribute) = attribute {
            if attribute.is_empty() || !attribute.chars().all(|c| c.is_ascii_lowercase()) {
                return Err(SyntaxError::Invalid(input.to_string()));
            }
        }
        let base = self
            .simple
            .get(label)
            .ok_or_else(|| SyntaxError::UnknownName(label.to_string()))?;
        match attribute {
            None => Ok(base.clone()),
            Some(NO_ATTRIBUTE) => Err(SyntaxError::ReservedAttribute(input.to_string())),
            Some(attribute) => self
                .clone_with_attribute(base, attribute)
                .ok_or_else(|| SyntaxError::InvalidAttributePlacement(input.to_string())),
        }
    }

    fn read_complex(&self, input: &str) -> SyntaxResult<Syntax> {
        let input = strip_outer_parens(input);
        let mut depth = 0i32;
        let mut split = None;
        for (i, c) in input.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {
                    if depth == 0 {
                        if let Some(slash) = Slash::from_char(c) {
                            split = Some((i, slash));
                        }
                    }
                }
            }
        }
        let (index, slash) = split.ok_or_else(|| SyntaxError::NoOuterSlash(input.to_string()))?;
        let left = self.read(&input[..index])?;
        let right = self.read(&input[index + 1..])?;
        Ok(Syntax::complex(left, right, slash))
    }
}

/// Remove enclosing parentheses when they wrap the whole string.
fn strip_outer_parens(input: &str) -> &str {
    let mut current = input.trim();
    while current.starts_with('(') && current.ends_with(')') {
        let mut depth = 0i32;
        let last = current.len() - 1;
        let mut wraps = true;
        for (i, c) in current.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth == 0 && i < last {
                wraps = false;
                break;
            }
        }
        if !wraps {
            break;
        }
        current = current[1..last].trim();
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_labels() {
        let registry = SyntaxRegistry::new();
        assert_eq!(registry.len(), STANDARD_LABELS.len());
        assert!(registry.contains("NP"));
        assert!(!registry.contains("VP"));
        assert_eq!(registry.empty().to_string(), "EMPTY");
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = SyntaxRegistry::new();
        assert!(registry.register("VP").is_ok());
        assert_eq!(
            registry.register("VP"),
            Err(SyntaxError::AlreadyRegistered("VP".to_string()))
        );
    }

    #[test]
    fn test_read_simple() {
        let registry = SyntaxRegistry::new();
        let np = registry.read("NP").unwrap();
        assert_eq!(np, registry.get("NP").unwrap());
        let s = registry.read(" S[dcl] ").unwrap();
        assert_eq!(s.as_simple().unwrap().attribute(), Some("dcl"));
    }

    #[test]
    fn test_read_errors() {
        let registry = SyntaxRegistry::new();
        assert_eq!(registry.read("VP"), Err(SyntaxError::UnknownName("VP".into())));
        assert_eq!(
            registry.read("NP[none]"),
            Err(SyntaxError::ReservedAttribute("NP[none]".into()))
        );
        assert!(matches!(registry.read("np"), Err(SyntaxError::Invalid(_))));
        assert!(matches!(registry.read("NP[pl"), Err(SyntaxError::Invalid(_))));
        assert!(matches!(registry.read("(S)/"), Err(SyntaxError::Invalid(_))));
    }

    #[test]
    fn test_read_complex_left_associative() {
        let registry = SyntaxRegistry::new();
        let syntax = registry.read("S\\NP/NP").unwrap();
        assert_eq!(syntax.slash(), Some(Slash::Forward));
        assert_eq!(syntax.left().unwrap(), &registry.read("S\\NP").unwrap());
        assert_eq!(syntax.right().unwrap(), &registry.read("NP").unwrap());
    }

    #[test]
    fn test_read_outer_parens() {
        let registry = SyntaxRegistry::new();
        let wrapped = registry.read("((S\\NP)/NP)").unwrap();
        assert_eq!(wrapped, registry.read("S\\NP/NP").unwrap());

        // The outer parens here do not wrap the whole string.
        let syntax = registry.read("(S\\NP)/(S\\NP)").unwrap();
        assert_eq!(syntax.slash(), Some(Slash::Forward));
        assert_eq!(syntax.right().unwrap().slash(), Some(Slash::Backward));
    }

    #[test]
    fn test_read_no_outer_slash() {
        let registry = SyntaxRegistry::new();
        assert!(matches!(
            registry.read("(S/NP"),
            Err(SyntaxError::NoOuterSlash(_))
        ));
    }

    #[test]
    fn test_attribute_typing() {
        let mut registry = SyntaxRegistry::new();
        registry.restrict_attribute("dcl", ["S"]);
        assert!(registry.read("S[dcl]").is_ok());
        assert_eq!(
            registry.read("NP[dcl]"),
            Err(SyntaxError::InvalidAttributePlacement("NP[dcl]".into()))
        );
        // Unconstrained attributes go anywhere.
        assert!(registry.read("NP[pl]").is_ok());
    }

    #[test]
    fn test_replace_attribute_respects_typing() {
        let mut registry = SyntaxRegistry::new();
        registry.restrict_attribute("dcl", ["S"]);
        let syntax = registry.read("S[x]\\NP[x]").unwrap();
        let dcl: Arc<str> = Arc::from("dcl");
        assert!(registry.replace_attribute(&syntax, "x", Some(&dcl)).is_none());
        let pl: Arc<str> = Arc::from("pl");
        let replaced = registry.replace_attribute(&syntax, "x", Some(&pl)).unwrap();
        assert_eq!(replaced.to_string(), "S[pl]\\NP[pl]");
    }

    #[test]
    fn test_set_variable() {
        let registry = SyntaxRegistry::new();
        let syntax = registry.read("S[x]").unwrap();
        let bound = registry
            .set_variable(&syntax, Some(&Binding::Attribute("dcl".into())))
            .unwrap();
        assert_eq!(bound, registry.read("S[dcl]").unwrap());
        let stripped = registry
            .set_variable(&syntax, Some(&Binding::NoAttribute))
            .unwrap();
        assert_eq!(stripped, registry.read("S").unwrap());
        assert_eq!(registry.set_variable(&syntax, None).unwrap(), syntax);
    }
}
