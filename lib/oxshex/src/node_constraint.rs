//! Evaluation of node constraints.
//!
//! Node constraints only look at the node itself: its kind, its datatype, its lexical form and
//! numeric value, and value sets.

use crate::limits::LimitTracker;
use crate::model::{NodeConstraint, NumericFacet, StringFacet, ValueSetValue};
use crate::result::ViolationReason;
use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNodeRef, Term};
use oxsdatatypes::{
    Boolean, Date, DateTime, DayTimeDuration, Decimal, Double, Duration, Float, GDay, GMonth,
    GMonthDay, GYear, GYearMonth, Integer, Time, YearMonthDuration,
};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::str::FromStr;

/// Builds the regex source of a `pattern` facet, with its flags turned into an inline group.
pub(crate) fn regex_source(pattern: &str, flags: Option<&str>) -> String {
    let flags: String = flags
        .unwrap_or_default()
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();
    if flags.is_empty() {
        pattern.to_owned()
    } else {
        format!("(?{flags}){pattern}")
    }
}

/// Compiled `pattern` facets, shared by a whole validation call.
#[derive(Debug, Default)]
pub(crate) struct RegexCache {
    regexes: FxHashMap<String, Result<Regex, String>>,
}

impl RegexCache {
    fn get(
        &mut self,
        pattern: &str,
        flags: Option<&str>,
        tracker: &LimitTracker,
    ) -> Result<&Regex, String> {
        tracker
            .check_regex_length(pattern)
            .map_err(|e| e.to_string())?;
        let compiled = match self.regexes.entry(regex_source(pattern, flags)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let regex = Regex::new(entry.key()).map_err(|e| e.to_string());
                entry.insert(regex)
            }
        };
        compiled.as_ref().map_err(Clone::clone)
    }
}

/// Checks `node` against `constraint`, returning the failures (empty if the node satisfies it).
pub(crate) fn check_node_constraint(
    node: &Term,
    constraint: &NodeConstraint,
    regexes: &mut RegexCache,
    tracker: &LimitTracker,
) -> Vec<ViolationReason> {
    let mut failures = Vec::new();

    if let Some(node_kind) = &constraint.node_kind {
        if !node_kind.matches(node) {
            failures.push(ViolationReason::value_mismatch(
                node,
                format!("is not of kind {node_kind}"),
            ));
        }
    }

    if let Some(datatype) = &constraint.datatype {
        match node {
            Term::Literal(literal) if literal.datatype() == datatype.as_ref() => {
                if !is_valid_lexical_form(literal.value(), literal.datatype()) {
                    failures.push(ViolationReason::value_mismatch(
                        node,
                        format!("is not a valid lexical form for {datatype}"),
                    ));
                }
            }
            _ => failures.push(ViolationReason::value_mismatch(
                node,
                format!("does not have datatype {datatype}"),
            )),
        }
    }

    for facet in &constraint.string_facets {
        let Some(value) = string_value(node) else {
            failures.push(ViolationReason::value_mismatch(
                node,
                "has no string value for string facets",
            ));
            break;
        };
        let length = value.chars().count();
        match facet {
            StringFacet::Length(expected) if length != *expected => {
                failures.push(ViolationReason::value_mismatch(
                    node,
                    format!("has length {length}, expected {expected}"),
                ));
            }
            StringFacet::MinLength(min) if length < *min => {
                failures.push(ViolationReason::value_mismatch(
                    node,
                    format!("has length {length}, less than {min}"),
                ));
            }
            StringFacet::MaxLength(max) if length > *max => {
                failures.push(ViolationReason::value_mismatch(
                    node,
                    format!("has length {length}, more than {max}"),
                ));
            }
            StringFacet::Pattern { pattern, flags } => {
                match regexes.get(pattern, flags.as_deref(), tracker) {
                    Ok(regex) => {
                        if !regex.is_match(value) {
                            failures.push(ViolationReason::value_mismatch(
                                node,
                                format!("does not match pattern /{pattern}/"),
                            ));
                        }
                    }
                    Err(message) => failures.push(ViolationReason::value_mismatch(
                        node,
                        format!("cannot be checked against pattern /{pattern}/: {message}"),
                    )),
                }
            }
            StringFacet::Length(_) | StringFacet::MinLength(_) | StringFacet::MaxLength(_) => {}
        }
    }

    if !constraint.numeric_facets.is_empty() {
        check_numeric_facets(node, &constraint.numeric_facets, &mut failures);
    }

    if !constraint.values.is_empty() && !constraint.values.iter().any(|v| matches_value(node, v))
    {
        failures.push(ViolationReason::value_mismatch(node, "is not in the value set"));
    }

    failures
}

fn check_numeric_facets(node: &Term, facets: &[NumericFacet], failures: &mut Vec<ViolationReason>) {
    let Some(value) = (match node {
        Term::Literal(literal) => Numeric::from_literal(literal),
        _ => None,
    }) else {
        failures.push(ViolationReason::value_mismatch(node, "is not a numeric literal"));
        return;
    };
    for facet in facets {
        let (bound, accepted, name): (_, &[Ordering], _) = match facet {
            NumericFacet::MinInclusive(bound) => {
                (bound, &[Ordering::Greater, Ordering::Equal], "MININCLUSIVE")
            }
            NumericFacet::MinExclusive(bound) => (bound, &[Ordering::Greater], "MINEXCLUSIVE"),
            NumericFacet::MaxInclusive(bound) => {
                (bound, &[Ordering::Less, Ordering::Equal], "MAXINCLUSIVE")
            }
            NumericFacet::MaxExclusive(bound) => (bound, &[Ordering::Less], "MAXEXCLUSIVE"),
            NumericFacet::TotalDigits(max) => {
                match value.digits() {
                    Some((total, _)) if total <= *max => {}
                    Some((total, _)) => failures.push(ViolationReason::value_mismatch(
                        node,
                        format!("has {total} digits, more than TOTALDIGITS {max}"),
                    )),
                    None => failures.push(ViolationReason::value_mismatch(
                        node,
                        "is not a decimal value for TOTALDIGITS",
                    )),
                }
                continue;
            }
            NumericFacet::FractionDigits(max) => {
                match value.digits() {
                    Some((_, fraction)) if fraction <= *max => {}
                    Some((_, fraction)) => failures.push(ViolationReason::value_mismatch(
                        node,
                        format!("has {fraction} fraction digits, more than FRACTIONDIGITS {max}"),
                    )),
                    None => failures.push(ViolationReason::value_mismatch(
                        node,
                        "is not a decimal value for FRACTIONDIGITS",
                    )),
                }
                continue;
            }
        };
        let ordering = Numeric::from_literal(&bound.value).and_then(|bound| value.compare(&bound));
        if !ordering.is_some_and(|o| accepted.contains(&o)) {
            failures.push(ViolationReason::value_mismatch(
                node,
                format!("does not satisfy {name} {}", bound.value.value()),
            ));
        }
    }
}

/// A numeric literal value, kept exact when possible.
#[derive(Debug, Clone, Copy)]
enum Numeric {
    Decimal(Decimal),
    Double(Double),
}

impl Numeric {
    fn from_literal(literal: &Literal) -> Option<Self> {
        let datatype = literal.datatype();
        if !is_valid_lexical_form(literal.value(), datatype) {
            return None;
        }
        if datatype == xsd::DECIMAL || is_integer_datatype(datatype) {
            Decimal::from_str(literal.value()).ok().map(Self::Decimal)
        } else if datatype == xsd::DOUBLE {
            Double::from_str(literal.value()).ok().map(Self::Double)
        } else if datatype == xsd::FLOAT {
            Float::from_str(literal.value())
                .ok()
                .map(|f| Self::Double(f.into()))
        } else {
            None
        }
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Decimal(a), Self::Decimal(b)) => Some(a.cmp(b)),
            (a, b) => a.as_double().partial_cmp(&b.as_double()),
        }
    }

    fn as_double(&self) -> Double {
        match self {
            Self::Decimal(d) => (*d).into(),
            Self::Double(d) => *d,
        }
    }

    /// Total and fraction digits of the canonical decimal form.
    fn digits(&self) -> Option<(u32, u32)> {
        let Self::Decimal(value) = self else {
            return None;
        };
        let canonical = value.to_string();
        let canonical = canonical.trim_start_matches('-');
        let (integer, fraction) = canonical.split_once('.').unwrap_or((canonical, ""));
        let integer = integer.trim_start_matches('0');
        let fraction = fraction.trim_end_matches('0');
        let fraction_digits = u32::try_from(fraction.len()).ok()?;
        let total = u32::try_from(integer.len()).ok()? + fraction_digits;
        Some((total.max(1), fraction_digits))
    }
}

fn is_integer_datatype(datatype: NamedNodeRef<'_>) -> bool {
    matches!(
        datatype,
        xsd::INTEGER
            | xsd::NON_POSITIVE_INTEGER
            | xsd::NEGATIVE_INTEGER
            | xsd::LONG
            | xsd::INT
            | xsd::SHORT
            | xsd::BYTE
            | xsd::NON_NEGATIVE_INTEGER
            | xsd::UNSIGNED_LONG
            | xsd::UNSIGNED_INT
            | xsd::UNSIGNED_SHORT
            | xsd::UNSIGNED_BYTE
            | xsd::POSITIVE_INTEGER
    )
}

/// Checks the lexical form of the XSD datatypes with a known lexical space.
///
/// Other datatypes accept any lexical form.
fn is_valid_lexical_form(value: &str, datatype: NamedNodeRef<'_>) -> bool {
    match datatype {
        xsd::BOOLEAN => Boolean::from_str(value).is_ok(),
        xsd::DECIMAL => Decimal::from_str(value).is_ok(),
        xsd::DOUBLE => Double::from_str(value).is_ok(),
        xsd::FLOAT => Float::from_str(value).is_ok(),
        xsd::DATE => Date::from_str(value).is_ok(),
        xsd::TIME => Time::from_str(value).is_ok(),
        xsd::DATE_TIME => DateTime::from_str(value).is_ok(),
        xsd::DURATION => Duration::from_str(value).is_ok(),
        xsd::DAY_TIME_DURATION => DayTimeDuration::from_str(value).is_ok(),
        xsd::YEAR_MONTH_DURATION => YearMonthDuration::from_str(value).is_ok(),
        xsd::G_YEAR => GYear::from_str(value).is_ok(),
        xsd::G_YEAR_MONTH => GYearMonth::from_str(value).is_ok(),
        xsd::G_MONTH => GMonth::from_str(value).is_ok(),
        xsd::G_MONTH_DAY => GMonthDay::from_str(value).is_ok(),
        xsd::G_DAY => GDay::from_str(value).is_ok(),
        xsd::UNSIGNED_LONG => value.strip_prefix('+').unwrap_or(value).parse::<u64>().is_ok(),
        _ if is_integer_datatype(datatype) => {
            let Ok(integer) = Integer::from_str(value) else {
                return false;
            };
            let integer = i64::from(integer);
            let (min, max) = match datatype {
                xsd::NON_POSITIVE_INTEGER => (i64::MIN, 0),
                xsd::NEGATIVE_INTEGER => (i64::MIN, -1),
                xsd::INT => (i32::MIN.into(), i32::MAX.into()),
                xsd::SHORT => (i16::MIN.into(), i16::MAX.into()),
                xsd::BYTE => (i8::MIN.into(), i8::MAX.into()),
                xsd::NON_NEGATIVE_INTEGER => (0, i64::MAX),
                xsd::UNSIGNED_INT => (0, u32::MAX.into()),
                xsd::UNSIGNED_SHORT => (0, u16::MAX.into()),
                xsd::UNSIGNED_BYTE => (0, u8::MAX.into()),
                xsd::POSITIVE_INTEGER => (1, i64::MAX),
                _ => (i64::MIN, i64::MAX),
            };
            (min..=max).contains(&integer)
        }
        _ => true,
    }
}

/// The string tested by string facets: the IRI or the lexical form.
fn string_value(node: &Term) -> Option<&str> {
    match node {
        Term::NamedNode(node) => Some(node.as_str()),
        Term::Literal(literal) => Some(literal.value()),
        _ => None,
    }
}

fn matches_value(node: &Term, value: &ValueSetValue) -> bool {
    match value {
        ValueSetValue::ObjectValue(term) => node == term,
        ValueSetValue::Language(tag) => literal_language(node)
            .is_some_and(|language| language.eq_ignore_ascii_case(tag)),
        ValueSetValue::IriStem(stem) => {
            matches!(node, Term::NamedNode(n) if n.as_str().starts_with(stem.as_str()))
        }
        ValueSetValue::IriStemRange { stem, exclusions } => {
            let Term::NamedNode(n) = node else {
                return false;
            };
            stem.as_ref()
                .is_none_or(|stem| n.as_str().starts_with(stem.as_str()))
                && !exclusions.iter().any(|e| matches_value(node, e))
        }
        ValueSetValue::LiteralStem(stem) => {
            matches!(node, Term::Literal(l) if l.value().starts_with(stem.as_str()))
        }
        ValueSetValue::LiteralStemRange { stem, exclusions } => {
            let Term::Literal(l) = node else {
                return false;
            };
            stem.as_ref()
                .is_none_or(|stem| l.value().starts_with(stem.as_str()))
                && !exclusions.iter().any(|e| matches_value(node, e))
        }
        ValueSetValue::LanguageStem(stem) => {
            literal_language(node).is_some_and(|language| language_matches_stem(language, stem))
        }
        ValueSetValue::LanguageStemRange { stem, exclusions } => {
            let Some(language) = literal_language(node) else {
                return false;
            };
            stem.as_ref()
                .is_none_or(|stem| language_matches_stem(language, stem))
                && !exclusions.iter().any(|e| matches_value(node, e))
        }
    }
}

fn literal_language(node: &Term) -> Option<&str> {
    match node {
        Term::Literal(literal) => literal.language(),
        _ => None,
    }
}

/// `en` matches `en` and `en-GB` but not `english`. The empty stem matches any tag.
fn language_matches_stem(language: &str, stem: &str) -> bool {
    if stem.is_empty() {
        return true;
    }
    let Some(prefix) = language.get(..stem.len()) else {
        return false;
    };
    prefix.eq_ignore_ascii_case(stem)
        && (language.len() == stem.len()
            || stem.ends_with('-')
            || language[stem.len()..].starts_with('-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ValidationLimits;
    use crate::model::{NodeKind, NumericLiteral};
    use oxrdf::{BlankNode, NamedNode};

    fn check(node: &Term, constraint: &NodeConstraint) -> Vec<ViolationReason> {
        check_node_constraint(
            node,
            constraint,
            &mut RegexCache::default(),
            &LimitTracker::new(ValidationLimits::default()),
        )
    }

    fn typed(value: &str, datatype: NamedNodeRef<'_>) -> Term {
        Literal::new_typed_literal(value, datatype).into()
    }

    #[test]
    fn test_node_kind() {
        let iri = Term::from(NamedNode::new("http://example.org/a").unwrap());
        let bnode = Term::from(BlankNode::default());
        assert!(check(&iri, &NodeConstraint::with_node_kind(NodeKind::Iri)).is_empty());
        assert_eq!(
            check(&bnode, &NodeConstraint::with_node_kind(NodeKind::Iri)).len(),
            1
        );
        assert!(check(&bnode, &NodeConstraint::with_node_kind(NodeKind::NonLiteral)).is_empty());
    }

    #[test]
    fn test_datatype_checks_lexical_form() {
        let constraint = NodeConstraint::with_datatype(xsd::INTEGER.into_owned());
        assert!(check(&typed("42", xsd::INTEGER), &constraint).is_empty());
        assert_eq!(check(&typed("4.2", xsd::INTEGER), &constraint).len(), 1);
        assert_eq!(check(&typed("42", xsd::DECIMAL), &constraint).len(), 1);

        let constraint = NodeConstraint::with_datatype(xsd::BYTE.into_owned());
        assert!(check(&typed("127", xsd::BYTE), &constraint).is_empty());
        assert_eq!(check(&typed("128", xsd::BYTE), &constraint).len(), 1);

        let constraint = NodeConstraint::with_datatype(xsd::DATE.into_owned());
        assert!(check(&typed("2024-02-29", xsd::DATE), &constraint).is_empty());
        assert_eq!(check(&typed("2024-13-01", xsd::DATE), &constraint).len(), 1);
    }

    #[test]
    fn test_string_facets() {
        let alice = Term::from(Literal::new_simple_literal("Alice"));
        assert!(
            check(
                &alice,
                &NodeConstraint::new()
                    .with_string_facet(StringFacet::MinLength(2))
                    .with_string_facet(StringFacet::MaxLength(5))
            )
            .is_empty()
        );
        assert_eq!(
            check(&alice, &NodeConstraint::new().with_string_facet(StringFacet::Length(4))).len(),
            1
        );
        let pattern = |pattern: &str, flags: Option<&str>| {
            NodeConstraint::new().with_string_facet(StringFacet::Pattern {
                pattern: pattern.into(),
                flags: flags.map(Into::into),
            })
        };
        assert!(check(&alice, &pattern("^A", None)).is_empty());
        assert_eq!(check(&alice, &pattern("^a", None)).len(), 1);
        assert!(check(&alice, &pattern("^a", Some("i"))).is_empty());
        assert_eq!(check(&alice, &pattern("(", None)).len(), 1);
    }

    #[test]
    fn test_string_facets_fail_on_blank_nodes() {
        let constraint = NodeConstraint::new().with_string_facet(StringFacet::MinLength(0));
        assert_eq!(check(&BlankNode::default().into(), &constraint).len(), 1);
    }

    #[test]
    fn test_numeric_facets() {
        let range = NodeConstraint::new()
            .with_numeric_facet(NumericFacet::MinInclusive(NumericLiteral::from(18)))
            .with_numeric_facet(NumericFacet::MaxExclusive(NumericLiteral::from(65)));
        assert!(check(&Literal::from(18).into(), &range).is_empty());
        assert!(check(&typed("64.5", xsd::DECIMAL), &range).is_empty());
        assert!(check(&typed("20.0e0", xsd::DOUBLE), &range).is_empty());
        assert_eq!(check(&Literal::from(65).into(), &range).len(), 1);
        assert_eq!(check(&Literal::new_simple_literal("20").into(), &range).len(), 1);
        assert_eq!(check(&typed("NaN", xsd::DOUBLE), &range).len(), 2);
    }

    #[test]
    fn test_digit_facets() {
        let digits = NodeConstraint::new()
            .with_numeric_facet(NumericFacet::TotalDigits(4))
            .with_numeric_facet(NumericFacet::FractionDigits(2));
        assert!(check(&typed("12.34", xsd::DECIMAL), &digits).is_empty());
        assert!(check(&typed("0012.3400", xsd::DECIMAL), &digits).is_empty());
        assert_eq!(check(&typed("12.345", xsd::DECIMAL), &digits).len(), 2);
        assert_eq!(check(&typed("1.5e0", xsd::DOUBLE), &digits).len(), 2);
    }

    #[test]
    fn test_value_sets() {
        let en = Term::from(Literal::new_language_tagged_literal("hi", "en-GB").unwrap());
        let fr = Term::from(Literal::new_language_tagged_literal("salut", "fr").unwrap());
        let constraint = NodeConstraint::with_values([ValueSetValue::language_stem("en")]);
        assert!(check(&en, &constraint).is_empty());
        assert_eq!(check(&fr, &constraint).len(), 1);

        let iri = Term::from(NamedNode::new("http://example.org/people/alice").unwrap());
        let constraint = NodeConstraint::with_values([ValueSetValue::IriStemRange {
            stem: Some("http://example.org/".into()),
            exclusions: vec![ValueSetValue::iri_stem("http://example.org/people/")],
        }]);
        assert_eq!(check(&iri, &constraint).len(), 1);

        let constraint = NodeConstraint::with_values([ValueSetValue::IriStemRange {
            stem: None,
            exclusions: vec![ValueSetValue::iri_stem("http://example.com/")],
        }]);
        assert!(check(&iri, &constraint).is_empty());

        let constraint = NodeConstraint::with_values([ValueSetValue::Language("EN-gb".into())]);
        assert!(check(&en, &constraint).is_empty());
    }

    #[test]
    fn test_language_stem_boundaries() {
        assert!(language_matches_stem("en", "en"));
        assert!(language_matches_stem("en-GB", "en"));
        assert!(language_matches_stem("EN-gb", "en"));
        assert!(!language_matches_stem("english", "en"));
        assert!(language_matches_stem("fr", ""));
    }

    #[test]
    fn test_regex_source_flags() {
        assert_eq!(regex_source("^a$", None), "^a$");
        assert_eq!(regex_source("^a$", Some("ix")), "(?ix)^a$");
        assert_eq!(regex_source("^a$", Some("q")), "^a$");
    }
}
