//! Serde support.
//!
//! RDF terms and triples are written in their N-Triples form and read back with their `FromStr`
//! implementations. Cardinalities are written as `{"min": 1, "max": -1}`.

use crate::model::{Cardinality, ShapeLabel};
use crate::ShexParseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// (De)serializes a value through its `Display` and `FromStr` implementations.
pub(crate) mod display {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(
        value: &T,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(D::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<T: Display, S: Serializer>(
            value: &Option<T>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_some(&value.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
        where
            T: FromStr,
            T::Err: Display,
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|value| value.parse().map_err(D::Error::custom))
                .transpose()
        }
    }

    pub mod vec {
        use super::*;

        pub fn serialize<T: Display, S: Serializer>(
            values: &[T],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(values.iter().map(ToString::to_string))
        }

        pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
        where
            T: FromStr,
            T::Err: Display,
            D: Deserializer<'de>,
        {
            Vec::<String>::deserialize(deserializer)?
                .into_iter()
                .map(|value| value.parse().map_err(D::Error::custom))
                .collect()
        }
    }
}

impl Serialize for ShapeLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        display::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for ShapeLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        display::deserialize(deserializer)
    }
}

#[derive(Serialize, Deserialize)]
pub(crate) struct CardinalityRepr {
    min: u32,
    max: i64,
}

impl TryFrom<CardinalityRepr> for Cardinality {
    type Error = ShexParseError;

    fn try_from(repr: CardinalityRepr) -> Result<Self, ShexParseError> {
        Self::from_bounds(repr.min.into(), repr.max)
    }
}

impl From<Cardinality> for CardinalityRepr {
    fn from(cardinality: Cardinality) -> Self {
        Self {
            min: cardinality.min,
            max: cardinality.max_bound(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::NamedNode;

    #[test]
    fn test_cardinality_repr() -> Result<(), serde_json::Error> {
        assert_eq!(
            serde_json::to_string(&Cardinality::zero_or_more())?,
            r#"{"min":0,"max":-1}"#
        );
        assert_eq!(
            serde_json::from_str::<Cardinality>(r#"{"min":2,"max":3}"#)?,
            Cardinality::new(2, Some(3)).unwrap()
        );
        assert!(serde_json::from_str::<Cardinality>(r#"{"min":3,"max":2}"#).is_err());
        Ok(())
    }

    #[test]
    fn test_shape_label() -> Result<(), serde_json::Error> {
        let label = ShapeLabel::from(NamedNode::new_unchecked("http://example.org/S"));
        let json = serde_json::to_string(&label)?;
        assert_eq!(json, r#""<http://example.org/S>""#);
        assert_eq!(serde_json::from_str::<ShapeLabel>(&json)?, label);
        Ok(())
    }
}
