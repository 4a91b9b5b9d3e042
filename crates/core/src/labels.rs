//! Structured label selectors.
//!
//! A [`LabelSelector`] is an ordered list of [`Requirement`]s that must all hold (AND). The
//! selector built from a plain `key -> value` map holds one `Equals` requirement per entry;
//! an empty selector matches every object.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

const NAME_MAX_LEN: usize = 63;
const PREFIX_MAX_LEN: usize = 253;

static QUALIFIED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("static regex"));
static DNS1123_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("invalid label key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("invalid label value {value:?} for key {key:?}: {reason}")]
    InvalidValue { key: String, value: String, reason: &'static str },
    #[error("operator '{operator}' on key {key:?} takes {expected} value(s), got {got}")]
    InvalidValueCount { key: String, operator: Operator, expected: &'static str, got: usize },
    #[error("malformed selector term {0:?} (expect key=value)")]
    MalformedPair(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Exists => "exists",
            Operator::DoesNotExist => "!",
        };
        f.write_str(s)
    }
}

/// A single `key <op> values` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    /// Build a validated requirement.
    ///
    /// The key must be a qualified name with an optional DNS-1123 subdomain prefix
    /// (`example.com/app`); values must be valid label values. `Equals`/`NotEquals` take exactly
    /// one value, `In`/`NotIn` at least one, `Exists`/`DoesNotExist` none.
    pub fn new<I, S>(key: &str, operator: Operator, values: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_key(key)?;
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        let (ok, expected) = match operator {
            Operator::Equals | Operator::NotEquals => (values.len() == 1, "exactly 1"),
            Operator::In | Operator::NotIn => (!values.is_empty(), "at least 1"),
            Operator::Exists | Operator::DoesNotExist => (values.is_empty(), "0"),
        };
        if !ok {
            return Err(SelectorError::InvalidValueCount { key: key.to_string(), operator, expected, got: values.len() });
        }
        for v in &values {
            validate_value(key, v)?;
        }
        Ok(Self { key: key.to_string(), operator, values })
    }

    /// Shorthand for `key == value`.
    pub fn equals(key: &str, value: &str) -> Result<Self, SelectorError> {
        Self::new(key, Operator::Equals, [value])
    }

    pub fn key(&self) -> &str { &self.key }
    pub fn operator(&self) -> Operator { self.operator }
    pub fn values(&self) -> &BTreeSet<String> { &self.values }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::In => actual.map_or(false, |v| self.values.contains(v)),
            Operator::NotEquals | Operator::NotIn => actual.map_or(true, |v| !self.values.contains(v)),
            Operator::Exists => actual.is_some(),
            Operator::DoesNotExist => actual.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = || self.values.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        match self.operator {
            Operator::Equals | Operator::NotEquals => write!(f, "{}{}{}", self.key, self.operator, joined()),
            Operator::In | Operator::NotIn => write!(f, "{} {} ({})", self.key, self.operator, joined()),
            Operator::Exists => f.write_str(&self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// AND of requirements, kept sorted by key so equal inputs always produce equal selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSelector {
    requirements: SmallVec<[Requirement; 4]>,
}

impl LabelSelector {
    /// Selector without requirements; matches everything.
    pub fn everything() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool { self.requirements.is_empty() }
    pub fn len(&self) -> usize { self.requirements.len() }
    pub fn requirements(&self) -> &[Requirement] { &self.requirements }

    pub fn push(&mut self, req: Requirement) {
        let at = self.requirements.partition_point(|r| r.key <= req.key);
        self.requirements.insert(at, req);
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl FromIterator<Requirement> for LabelSelector {
    fn from_iter<T: IntoIterator<Item = Requirement>>(iter: T) -> Self {
        let mut sel = Self::default();
        for r in iter {
            sel.push(r);
        }
        sel
    }
}

/// Kubernetes label-selector syntax, e.g. `app=web,tier in (a,b),!legacy`.
impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

/// Translate a plain equality map into a structured selector, one `Equals` requirement per
/// entry. The empty map yields the empty selector (matches everything).
pub fn to_selector(labels: &BTreeMap<String, String>) -> Result<LabelSelector, SelectorError> {
    labels.iter().map(|(k, v)| Requirement::equals(k, v)).collect()
}

/// Parse `a=b,c==d` into a label map. Only equality terms (`=` or `==`) are accepted; `!=`
/// and set-based terms are rejected as malformed. Whitespace around terms is ignored and a
/// blank input gives an empty map. Keys and values are validated later by [`to_selector`].
pub fn parse_label_map(input: &str) -> Result<BTreeMap<String, String>, SelectorError> {
    let mut out = BTreeMap::new();
    for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let malformed = || SelectorError::MalformedPair(term.to_string());
        let (k, v) = term.split_once('=').ok_or_else(malformed)?;
        let v = v.strip_prefix('=').unwrap_or(v);
        let (k, v) = (k.trim(), v.trim());
        if k.is_empty() || k.ends_with('!') || v.starts_with('=') {
            return Err(malformed());
        }
        out.insert(k.to_string(), v.to_string());
    }
    Ok(out)
}

fn validate_key(key: &str) -> Result<(), SelectorError> {
    let invalid = |reason| SelectorError::InvalidKey { key: key.to_string(), reason };
    let name = match key.split('/').collect::<Vec<_>>().as_slice() {
        [name] => *name,
        [prefix, name] => {
            if prefix.is_empty() {
                return Err(invalid("prefix part must be non-empty"));
            }
            if prefix.len() > PREFIX_MAX_LEN {
                return Err(invalid("prefix part must be no more than 253 characters"));
            }
            if !DNS1123_SUBDOMAIN.is_match(prefix) {
                return Err(invalid("prefix part must be a lowercase DNS-1123 subdomain"));
            }
            *name
        }
        _ => return Err(invalid("must have at most one '/'")),
    };
    if name.is_empty() {
        return Err(invalid("name part must be non-empty"));
    }
    if name.len() > NAME_MAX_LEN {
        return Err(invalid("name part must be no more than 63 characters"));
    }
    if !QUALIFIED_NAME.is_match(name) {
        return Err(invalid("name part must consist of alphanumerics, '-', '_' or '.', and start and end with an alphanumeric"));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    let invalid = |reason| SelectorError::InvalidValue { key: key.to_string(), value: value.to_string(), reason };
    if value.len() > NAME_MAX_LEN {
        return Err(invalid("must be no more than 63 characters"));
    }
    if !value.is_empty() && !QUALIFIED_NAME.is_match(value) {
        return Err(invalid("must consist of alphanumerics, '-', '_' or '.', and start and end with an alphanumeric"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_map_gives_empty_selector() {
        let sel = to_selector(&BTreeMap::new()).expect("ok");
        assert!(sel.is_empty());
        assert_eq!(sel, LabelSelector::everything());
        assert_eq!(sel.to_string(), "");
        assert!(sel.matches(&map(&[("anything", "goes")])));
        assert!(sel.matches(&BTreeMap::new()));
    }

    #[test]
    fn single_entry_is_one_equals_requirement() {
        let sel = to_selector(&map(&[("app", "test")])).expect("ok");
        assert_eq!(sel.len(), 1);
        let r = &sel.requirements()[0];
        assert_eq!(r.key(), "app");
        assert_eq!(r.operator(), Operator::Equals);
        assert_eq!(r.values().iter().collect::<Vec<_>>(), vec!["test"]);
        assert_eq!(sel, LabelSelector::from_iter([Requirement::equals("app", "test").unwrap()]));
    }

    #[test]
    fn translation_is_deterministic() {
        let m = map(&[("tier", "web"), ("app", "shop"), ("example.com/team", "core")]);
        let a = to_selector(&m).expect("ok");
        let b = to_selector(&m).expect("ok");
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.to_string(), "app=shop,example.com/team=core,tier=web");
    }

    #[test]
    fn requirement_order_does_not_depend_on_insertion() {
        let a: LabelSelector = [Requirement::equals("b", "2").unwrap(), Requirement::equals("a", "1").unwrap()].into_iter().collect();
        let b: LabelSelector = [Requirement::equals("a", "1").unwrap(), Requirement::equals("b", "2").unwrap()].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_keys_are_rejected() {
        for key in ["", "-app", "app-", "a/b/c", "/app", "Example.com/app", "has space"] {
            let err = to_selector(&map(&[(key, "v")])).unwrap_err();
            assert!(matches!(err, SelectorError::InvalidKey { .. }), "key {:?} gave {:?}", key, err);
        }
        let long = "k".repeat(64);
        assert!(matches!(Requirement::equals(&long, "v"), Err(SelectorError::InvalidKey { .. })));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = to_selector(&map(&[("app", "bad value")])).unwrap_err();
        assert!(matches!(err, SelectorError::InvalidValue { .. }));
        let long = "v".repeat(64);
        assert!(matches!(Requirement::equals("app", &long), Err(SelectorError::InvalidValue { .. })));
        // empty value is a legal label value
        assert!(Requirement::equals("app", "").is_ok());
    }

    #[test]
    fn value_count_is_checked_per_operator() {
        assert!(matches!(Requirement::new("a", Operator::Equals, ["x", "y"]), Err(SelectorError::InvalidValueCount { .. })));
        assert!(matches!(Requirement::new::<_, &str>("a", Operator::In, []), Err(SelectorError::InvalidValueCount { .. })));
        assert!(matches!(Requirement::new("a", Operator::Exists, ["x"]), Err(SelectorError::InvalidValueCount { .. })));
        assert!(Requirement::new::<_, &str>("a", Operator::DoesNotExist, []).is_ok());
    }

    #[test]
    fn matching_semantics() {
        let labels = map(&[("app", "web"), ("tier", "front")]);
        let req = |op, vals: &[&str]| Requirement::new("app", op, vals.iter().copied()).unwrap();
        assert!(req(Operator::Equals, &["web"]).matches(&labels));
        assert!(!req(Operator::Equals, &["db"]).matches(&labels));
        assert!(req(Operator::NotEquals, &["db"]).matches(&labels));
        assert!(req(Operator::In, &["db", "web"]).matches(&labels));
        assert!(!req(Operator::NotIn, &["db", "web"]).matches(&labels));
        assert!(req(Operator::Exists, &[]).matches(&labels));
        assert!(!req(Operator::DoesNotExist, &[]).matches(&labels));
        // absent key
        assert!(!req(Operator::Equals, &["web"]).matches(&BTreeMap::new()));
        assert!(req(Operator::NotIn, &["web"]).matches(&BTreeMap::new()));

        let sel = to_selector(&map(&[("app", "web"), ("tier", "back")])).unwrap();
        assert!(!sel.matches(&labels), "all requirements must hold");
    }

    #[test]
    fn display_uses_kubernetes_syntax() {
        let sel: LabelSelector = [
            Requirement::new("env", Operator::In, ["prod", "dev"]).unwrap(),
            Requirement::new("app", Operator::NotEquals, ["db"]).unwrap(),
            Requirement::new::<_, &str>("legacy", Operator::DoesNotExist, []).unwrap(),
            Requirement::new::<_, &str>("team", Operator::Exists, []).unwrap(),
            Requirement::new("zone", Operator::NotIn, ["a"]).unwrap(),
        ]
        .into_iter()
        .collect();
        assert_eq!(sel.to_string(), "app!=db,env in (dev,prod),!legacy,team,zone notin (a)");
    }

    #[test]
    fn parse_label_map_handles_pairs_and_blanks() {
        assert!(parse_label_map("").unwrap().is_empty());
        assert!(parse_label_map("  ").unwrap().is_empty());
        assert_eq!(parse_label_map("app=test, tier = web").unwrap(), map(&[("app", "test"), ("tier", "web")]));
        assert!(matches!(parse_label_map("app"), Err(SelectorError::MalformedPair(_))));
        assert!(matches!(parse_label_map("=x"), Err(SelectorError::MalformedPair(_))));
        assert_eq!(parse_label_map("app==test").unwrap(), map(&[("app", "test")]));
        assert!(matches!(parse_label_map("a===b"), Err(SelectorError::MalformedPair(_))));
        assert!(matches!(parse_label_map("app!=x"), Err(SelectorError::MalformedPair(_))));
        assert!(matches!(parse_label_map("app in (a,b)"), Err(SelectorError::MalformedPair(_))));
    }
}
