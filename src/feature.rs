//! Feature structures and the small algebra the rule engine needs.
//!
//! A feature structure maps feature names to values. A value is one of:
//!
//! ```text
//! Symbolic(SymbolSet)   a disjunction of admissible symbols, stored as a bitset
//! Variable(Variable)    αF / -αF, bound during matching and replaced on output
//! Complex(FeatureStruct)
//! ```
//!
//! ## Key concepts
//!
//! - **Unification** intersects symbol sets feature by feature. It fails when an intersection is empty.
//!   Features present on only one side are carried over unchanged.
//! - **Subsumption** `a.subsumes(b)` holds when every value in `a` is at least as general as the
//!   corresponding value in `b`.
//! - **Priority union** overwrites values from the right-hand structure (recursing into complex values).
//! - **Anti** complements every symbolic value within its feature's universe. Analysis uses it to invert
//!   feature-changing rules.
//!
//! ## Invariants
//!
//! - A `SymbolSet` carries its feature's universe mask, so negation never needs the `FeatureSystem`.
//! - Every operation that takes `&mut VariableBindings` is transactional: bindings are only committed when
//!   the operation succeeds.

use crate::error::FeatureError;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// Maximum number of symbols a single symbolic feature may declare.
pub const MAX_SYMBOLS: usize = 64;

// --- Symbol sets -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolSet {
    bits: u64,
    universe: u64,
}

impl SymbolSet {
    pub fn new(bits: u64, universe: u64) -> Self {
        Self { bits: bits & universe, universe }
    }

    /// The completely underspecified value for a feature.
    pub fn any(universe: u64) -> Self {
        Self { bits: universe, universe }
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn universe(&self) -> u64 {
        self.universe
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn is_any(&self) -> bool {
        self.bits == self.universe
    }

    pub fn is_single(&self) -> bool {
        self.bits.count_ones() == 1
    }

    pub fn intersect(self, other: SymbolSet) -> SymbolSet {
        SymbolSet { bits: self.bits & other.bits, universe: self.universe | other.universe }
    }

    pub fn union(self, other: SymbolSet) -> SymbolSet {
        SymbolSet { bits: self.bits | other.bits, universe: self.universe | other.universe }
    }

    pub fn negation(self) -> SymbolSet {
        SymbolSet { bits: self.universe & !self.bits, universe: self.universe }
    }

    pub fn minus(self, other: SymbolSet) -> SymbolSet {
        SymbolSet { bits: self.bits & !other.bits, universe: self.universe }
    }

    pub fn is_subset_of(self, other: SymbolSet) -> bool {
        self.bits & !other.bits == 0
    }
}

// --- Variables ---------------------------------------------------------------

/// An alpha variable over one symbolic feature. `agree == false` is the `-α` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: String,
    pub agree: bool,
    universe: u64,
}

impl Variable {
    pub fn new(name: impl Into<String>, agree: bool, universe: u64) -> Self {
        Self { name: name.into(), agree, universe }
    }

    /// Value this variable stands for under `bindings`, if bound.
    pub fn resolve(&self, bindings: &VariableBindings) -> Option<SymbolSet> {
        bindings.get(&self.name).map(|v| {
            let v = SymbolSet::new(v.bits, self.universe);
            if self.agree { v } else { v.negation() }
        })
    }

    fn bind(&self, value: SymbolSet, bindings: &mut VariableBindings) {
        let value = if self.agree { value } else { value.negation() };
        bindings.insert(self.name.clone(), value);
    }

    pub fn negated(&self) -> Variable {
        Variable { name: self.name.clone(), agree: !self.agree, universe: self.universe }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableBindings {
    values: BTreeMap<String, SymbolSet>,
}

impl VariableBindings {
    pub fn get(&self, name: &str) -> Option<SymbolSet> {
        self.values.get(name).copied()
    }

    pub fn insert(&mut self, name: String, value: SymbolSet) {
        self.values.insert(name, value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

// --- Values and structures ---------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureValue {
    Symbolic(SymbolSet),
    Variable(Variable),
    Complex(FeatureStruct),
}

fn unify_values(a: &FeatureValue, b: &FeatureValue, bindings: &mut VariableBindings) -> Option<FeatureValue> {
    use FeatureValue as V;
    let nonempty = |s: SymbolSet| (!s.is_empty()).then_some(V::Symbolic(s));
    match (a, b) {
        (V::Symbolic(x), V::Symbolic(y)) => nonempty(x.intersect(*y)),
        (V::Variable(v), V::Symbolic(s)) | (V::Symbolic(s), V::Variable(v)) => match v.resolve(bindings) {
            Some(bound) => nonempty(bound.intersect(*s)),
            None => {
                v.bind(*s, bindings);
                Some(V::Symbolic(*s))
            }
        },
        (V::Variable(v), V::Variable(w)) => match (v.resolve(bindings), w.resolve(bindings)) {
            (Some(x), Some(y)) => nonempty(x.intersect(y)),
            (Some(x), None) => {
                w.bind(x, bindings);
                Some(V::Symbolic(x))
            }
            (None, Some(y)) => {
                v.bind(y, bindings);
                Some(V::Symbolic(y))
            }
            (None, None) => Some(V::Variable(v.clone())),
        },
        (V::Complex(x), V::Complex(y)) => x.unify_in(y, bindings).map(V::Complex),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FeatureStruct {
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureStruct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, feature: impl Into<String>, value: FeatureValue) -> Self {
        self.values.insert(feature.into(), value);
        self
    }

    pub fn insert(&mut self, feature: impl Into<String>, value: FeatureValue) {
        self.values.insert(feature.into(), value);
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureValue> {
        self.values.get(feature)
    }

    pub fn remove(&mut self, feature: &str) -> Option<FeatureValue> {
        self.values.remove(feature)
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.values.contains_key(feature)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn unify(&self, other: &FeatureStruct) -> Option<FeatureStruct> {
        self.unify_with(other, &mut VariableBindings::default())
    }

    /// Unify, committing any new variable bindings only on success.
    pub fn unify_with(&self, other: &FeatureStruct, bindings: &mut VariableBindings) -> Option<FeatureStruct> {
        let mut scratch = bindings.clone();
        let unified = self.unify_in(other, &mut scratch)?;
        *bindings = scratch;
        Some(unified)
    }

    fn unify_in(&self, other: &FeatureStruct, bindings: &mut VariableBindings) -> Option<FeatureStruct> {
        let mut out = self.clone();
        for (feature, theirs) in &other.values {
            let value = match self.values.get(feature) {
                Some(mine) => unify_values(mine, theirs, bindings)?,
                None => theirs.clone(),
            };
            out.values.insert(feature.clone(), value);
        }
        Some(out)
    }

    pub fn is_unifiable(&self, other: &FeatureStruct) -> bool {
        self.unify_in(other, &mut VariableBindings::default()).is_some()
    }

    pub fn subsumes(&self, other: &FeatureStruct) -> bool {
        self.subsumes_with(other, &mut VariableBindings::default())
    }

    /// Subsumption where variables in `self` bind to the values they cover in `other`.
    pub fn subsumes_with(&self, other: &FeatureStruct, bindings: &mut VariableBindings) -> bool {
        let mut scratch = bindings.clone();
        if self.subsumes_in(other, &mut scratch) {
            *bindings = scratch;
            true
        } else {
            false
        }
    }

    fn subsumes_in(&self, other: &FeatureStruct, bindings: &mut VariableBindings) -> bool {
        use FeatureValue as V;
        for (feature, mine) in &self.values {
            let ok = match (mine, other.values.get(feature)) {
                (V::Symbolic(s), None) => s.is_any(),
                (_, None) => false,
                (V::Symbolic(s), Some(V::Symbolic(t))) => t.is_subset_of(*s),
                (V::Variable(v), Some(V::Symbolic(t))) => match v.resolve(bindings) {
                    Some(bound) => t.is_subset_of(bound),
                    None => {
                        v.bind(*t, bindings);
                        true
                    }
                },
                (V::Variable(v), Some(V::Variable(w))) => v == w,
                (V::Complex(x), Some(V::Complex(y))) => x.subsumes_in(y, bindings),
                _ => false,
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Overwrite values with those of `other`, recursing where both sides are complex.
    pub fn priority_union(&mut self, other: &FeatureStruct) {
        for (feature, theirs) in &other.values {
            match (self.values.get_mut(feature), theirs) {
                (Some(FeatureValue::Complex(mine)), FeatureValue::Complex(theirs)) => mine.priority_union(theirs),
                _ => {
                    self.values.insert(feature.clone(), theirs.clone());
                }
            }
        }
    }

    /// Widening union: symbol sets present on both sides are joined.
    pub fn add(&mut self, other: &FeatureStruct) {
        use FeatureValue as V;
        for (feature, theirs) in &other.values {
            match (self.values.get_mut(feature), theirs) {
                (Some(V::Symbolic(mine)), V::Symbolic(t)) => *mine = mine.union(*t),
                (Some(V::Complex(mine)), V::Complex(t)) => mine.add(t),
                _ => {
                    self.values.insert(feature.clone(), theirs.clone());
                }
            }
        }
    }

    /// Remove the symbols of `other` from `self`. Features left with no symbol are dropped.
    pub fn subtract(&mut self, other: &FeatureStruct) {
        use FeatureValue as V;
        for (feature, theirs) in &other.values {
            let drop = match (self.values.get_mut(feature), theirs) {
                (Some(V::Symbolic(mine)), V::Symbolic(t)) => {
                    *mine = mine.minus(*t);
                    mine.is_empty()
                }
                (Some(V::Complex(mine)), V::Complex(t)) => {
                    mine.subtract(t);
                    mine.is_empty()
                }
                (Some(V::Variable(mine)), V::Variable(t)) => mine == t,
                _ => false,
            };
            if drop {
                self.values.remove(feature);
            }
        }
    }

    /// The complement of every value. Variables flip agreement; values whose complement is empty are dropped.
    pub fn anti(&self) -> FeatureStruct {
        let mut out = FeatureStruct::new();
        for (feature, value) in &self.values {
            let anti = match value {
                FeatureValue::Symbolic(s) => {
                    let n = s.negation();
                    (!n.is_empty()).then_some(FeatureValue::Symbolic(n))
                }
                FeatureValue::Variable(v) => Some(FeatureValue::Variable(v.negated())),
                FeatureValue::Complex(fs) => {
                    let a = fs.anti();
                    (!a.is_empty()).then_some(FeatureValue::Complex(a))
                }
            };
            if let Some(anti) = anti {
                out.values.insert(feature.clone(), anti);
            }
        }
        out
    }

    /// Make every symbolic feature of `other` fully underspecified in `self`.
    pub fn widen(&mut self, other: &FeatureStruct) {
        for (feature, theirs) in &other.values {
            match theirs {
                FeatureValue::Symbolic(s) => {
                    self.values.insert(feature.clone(), FeatureValue::Symbolic(SymbolSet::any(s.universe())));
                }
                FeatureValue::Variable(v) => {
                    self.values.insert(feature.clone(), FeatureValue::Symbolic(SymbolSet::any(v.universe)));
                }
                FeatureValue::Complex(fs) => {
                    if let Some(FeatureValue::Complex(mine)) = self.values.get_mut(feature) {
                        mine.widen(fs);
                    }
                }
            }
        }
    }

    pub fn replace_variables(&mut self, bindings: &VariableBindings) {
        for value in self.values.values_mut() {
            match value {
                FeatureValue::Variable(v) => {
                    if let Some(bound) = v.resolve(bindings) {
                        *value = FeatureValue::Symbolic(bound);
                    }
                }
                FeatureValue::Complex(fs) => fs.replace_variables(bindings),
                FeatureValue::Symbolic(_) => {}
            }
        }
    }

    /// Turn every variable left unbound into its feature's fully underspecified value.
    pub fn underspecify_variables(&mut self) {
        for value in self.values.values_mut() {
            match value {
                FeatureValue::Variable(v) => {
                    let universe = v.universe;
                    *value = FeatureValue::Symbolic(SymbolSet::any(universe));
                }
                FeatureValue::Complex(fs) => fs.underspecify_variables(),
                FeatureValue::Symbolic(_) => {}
            }
        }
    }

    pub fn has_variables(&self) -> bool {
        self.first_variable().is_some()
    }

    /// Name of the first feature still holding a variable, searching depth first.
    pub fn first_variable(&self) -> Option<&str> {
        self.values.iter().find_map(|(feature, value)| match value {
            FeatureValue::Variable(_) => Some(feature.as_str()),
            FeatureValue::Complex(fs) => fs.first_variable(),
            FeatureValue::Symbolic(_) => None,
        })
    }
}

// --- Feature system ----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SymbolicFeature {
    pub name: String,
    pub symbols: Vec<String>,
}

impl SymbolicFeature {
    pub fn universe(&self) -> u64 {
        if self.symbols.len() == MAX_SYMBOLS { u64::MAX } else { (1u64 << self.symbols.len()) - 1 }
    }

    fn is_binary(&self) -> bool {
        self.symbols.len() == 2 && self.symbols[0] == "+" && self.symbols[1] == "-"
    }

    fn bit(&self, symbol: &str) -> Result<u64, FeatureError> {
        self.symbols.iter().position(|s| s == symbol).map(|i| 1u64 << i).ok_or_else(|| FeatureError::UnknownSymbol {
            feature: self.name.clone(),
            symbol: symbol.to_string(),
        })
    }
}

/// Declared features and the notation parser.
///
/// Notation is a whitespace-separated list of tokens:
///
/// ```text
/// +voice -cons        binary values
/// place=lab|cor       disjunction over a multi-valued feature
/// αvoice -βback       agreeing / disagreeing variables (any Greek letter)
/// ```
#[derive(Debug, Clone, Default)]
pub struct FeatureSystem {
    features: Vec<SymbolicFeature>,
    index: HashMap<String, usize>,
}

impl FeatureSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binary(&mut self, name: &str) -> Result<&mut Self, FeatureError> {
        self.add_symbolic(name, &["+", "-"])
    }

    pub fn add_symbolic(&mut self, name: &str, symbols: &[&str]) -> Result<&mut Self, FeatureError> {
        if self.index.contains_key(name) {
            return Err(FeatureError::DuplicateFeature(name.to_string()));
        }
        if symbols.len() > MAX_SYMBOLS {
            return Err(FeatureError::TooManySymbols(name.to_string()));
        }
        self.index.insert(name.to_string(), self.features.len());
        self.features.push(SymbolicFeature {
            name: name.to_string(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        });
        Ok(self)
    }

    pub fn feature(&self, name: &str) -> Result<&SymbolicFeature, FeatureError> {
        self.index.get(name).map(|&i| &self.features[i]).ok_or_else(|| FeatureError::UnknownFeature(name.to_string()))
    }

    pub fn value(&self, feature: &str, symbols: &[&str]) -> Result<SymbolSet, FeatureError> {
        let def = self.feature(feature)?;
        let mut bits = 0;
        for symbol in symbols {
            bits |= def.bit(symbol)?;
        }
        Ok(SymbolSet::new(bits, def.universe()))
    }

    pub fn variable(&self, feature: &str, name: &str, agree: bool) -> Result<Variable, FeatureError> {
        Ok(Variable::new(name, agree, self.feature(feature)?.universe()))
    }

    pub fn parse(&self, notation: &str) -> Result<FeatureStruct, FeatureError> {
        let token_re = regex!(r"^(?P<sign>[+-])?(?P<var>\p{Greek})?(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?:=(?P<syms>\S+))?$");
        let mut fs = FeatureStruct::new();
        for token in notation.split_whitespace() {
            let invalid = || FeatureError::InvalidToken(token.to_string());
            let caps = token_re.captures(token).ok_or_else(invalid)?;
            let name = &caps["name"];
            let sign = caps.name("sign").map(|m| m.as_str());
            let value = match (caps.name("var"), caps.name("syms"), sign) {
                (Some(var), None, _) => FeatureValue::Variable(self.variable(name, var.as_str(), sign != Some("-"))?),
                (None, Some(syms), None) => {
                    let symbols: Vec<&str> = syms.as_str().split('|').collect();
                    FeatureValue::Symbolic(self.value(name, &symbols)?)
                }
                (None, None, Some(sign)) => FeatureValue::Symbolic(self.value(name, &[sign])?),
                _ => return Err(invalid()),
            };
            fs.insert(name, value);
        }
        Ok(fs)
    }

    /// Render a structure in the notation accepted by [`FeatureSystem::parse`], wrapped in brackets.
    pub fn describe(&self, fs: &FeatureStruct) -> String {
        let mut out = String::from("[");
        for (i, (feature, value)) in fs.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            match value {
                FeatureValue::Symbolic(s) => match self.feature(feature) {
                    Ok(def) if def.is_binary() && s.is_single() => {
                        out.push_str(if s.bits() == 1 { "+" } else { "-" });
                        out.push_str(feature);
                    }
                    Ok(def) => {
                        let names: Vec<&str> = def
                            .symbols
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| s.bits() & (1 << i) != 0)
                            .map(|(_, n)| n.as_str())
                            .collect();
                        let _ = write!(out, "{feature}={}", names.join("|"));
                    }
                    Err(_) => {
                        let _ = write!(out, "{feature}=#{:b}", s.bits());
                    }
                },
                FeatureValue::Variable(v) => {
                    let _ = write!(out, "{}{}{feature}", if v.agree { "" } else { "-" }, v.name);
                }
                FeatureValue::Complex(inner) => {
                    let _ = write!(out, "{feature}={}", self.describe(inner));
                }
            }
        }
        out.push(']');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> FeatureSystem {
        let mut sys = FeatureSystem::new();
        sys.add_binary("voice").unwrap();
        sys.add_binary("cons").unwrap();
        sys.add_symbolic("place", &["lab", "cor", "dor"]).unwrap();
        sys
    }

    #[test]
    fn unification_intersects_symbols_and_fails_on_conflict() {
        let sys = system();
        let a = sys.parse("+voice place=lab|cor").unwrap();
        let b = sys.parse("place=cor|dor +cons").unwrap();
        let u = a.unify(&b).unwrap();
        assert_eq!(u, sys.parse("+voice +cons place=cor").unwrap());
        assert!(a.unify(&sys.parse("-voice").unwrap()).is_none());
    }

    #[test]
    fn variables_bind_during_unification_and_commit_only_on_success() {
        let sys = system();
        let pattern = sys.parse("αvoice +cons").unwrap();
        let mut bindings = VariableBindings::default();
        assert!(pattern.unify_with(&sys.parse("-voice -cons").unwrap(), &mut bindings).is_none());
        assert!(bindings.is_empty());

        assert!(pattern.unify_with(&sys.parse("-voice +cons").unwrap(), &mut bindings).is_some());
        let mut out = sys.parse("-αvoice").unwrap();
        out.replace_variables(&bindings);
        assert_eq!(out, sys.parse("+voice").unwrap());
        assert!(!out.has_variables());
    }

    #[test]
    fn subsumption_is_generality() {
        let sys = system();
        let general = sys.parse("+cons").unwrap();
        let specific = sys.parse("+cons -voice").unwrap();
        assert!(general.subsumes(&specific));
        assert!(!specific.subsumes(&general));
        assert!(sys.parse("place=lab|cor").unwrap().subsumes(&sys.parse("place=cor").unwrap()));
    }

    #[test]
    fn priority_union_overwrites_and_recurses() {
        let sys = system();
        let mut fs = FeatureStruct::new().with("head", FeatureValue::Complex(sys.parse("+voice +cons").unwrap()));
        let over = FeatureStruct::new().with("head", FeatureValue::Complex(sys.parse("-voice").unwrap()));
        fs.priority_union(&over);
        assert_eq!(fs.get("head"), Some(&FeatureValue::Complex(sys.parse("-voice +cons").unwrap())));
    }

    #[test]
    fn anti_minus_anti_gives_the_unapplication_delta() {
        let sys = system();
        let lhs = sys.parse("-cons").unwrap();
        let rhs = sys.parse("+voice").unwrap();
        let mut delta = rhs.anti();
        delta.subtract(&lhs.anti());
        assert_eq!(delta, sys.parse("-voice").unwrap());
        assert_eq!(sys.parse("place=lab").unwrap().anti(), sys.parse("place=cor|dor").unwrap());
    }

    #[test]
    fn add_joins_symbols_and_keeps_the_rest() {
        let sys = system();
        let mut fs = sys.parse("place=lab +cons").unwrap();
        fs.add(&sys.parse("place=cor -voice").unwrap());
        assert_eq!(fs, sys.parse("place=lab|cor +cons -voice").unwrap());

        let mut nested = FeatureStruct::new().with("head", FeatureValue::Complex(sys.parse("place=dor").unwrap()));
        nested.add(&FeatureStruct::new().with("head", FeatureValue::Complex(sys.parse("place=lab +voice").unwrap())));
        assert_eq!(nested.get("head"), Some(&FeatureValue::Complex(sys.parse("place=lab|dor +voice").unwrap())));
    }

    #[test]
    fn widen_underspecifies_features() {
        let sys = system();
        let mut fs = sys.parse("+voice +cons").unwrap();
        fs.widen(&sys.parse("-voice").unwrap());
        assert!(fs.is_unifiable(&sys.parse("-voice").unwrap()));
        assert!(fs.is_unifiable(&sys.parse("+voice").unwrap()));
    }

    #[test]
    fn notation_errors_are_reported() {
        let sys = system();
        assert_eq!(sys.parse("+nasal"), Err(FeatureError::UnknownFeature("nasal".into())));
        assert!(matches!(sys.parse("place=pal"), Err(FeatureError::UnknownSymbol { .. })));
        assert!(matches!(sys.parse("+place=lab"), Err(FeatureError::InvalidToken(_))));
    }

    #[test]
    fn describe_round_trips_through_parse() {
        let sys = system();
        let fs = sys.parse("+cons -αvoice place=cor|dor").unwrap();
        let text = sys.describe(&fs);
        assert_eq!(text, "[+cons place=cor|dor -αvoice]");
        let inner = text.trim_start_matches('[').trim_end_matches(']');
        assert_eq!(sys.parse(inner).unwrap(), fs);
    }
}
