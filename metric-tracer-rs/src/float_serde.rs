//! JSON-safe float encoding.
//!
//! `serde_json` writes NaN and infinities as `null` and cannot read them
//! back into `f64`. These helpers, used through `#[serde(with = ...)]`,
//! write NaN as `null` and infinities as `"inf"` / `"-inf"`, and read all
//! three back.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonFloat {
    Finite(f64),
    Special(Option<String>),
}

impl From<f64> for JsonFloat {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Self::Special(None)
        } else if value == f64::INFINITY {
            Self::Special(Some("inf".into()))
        } else if value == f64::NEG_INFINITY {
            Self::Special(Some("-inf".into()))
        } else {
            Self::Finite(value)
        }
    }
}

impl JsonFloat {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            Self::Finite(v) => Ok(v),
            Self::Special(None) => Ok(f64::NAN),
            Self::Special(Some(s)) => match s.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" | "NaN" => Ok(f64::NAN),
                _ => Err(E::custom(format!("unknown float sentinel: {s}"))),
            },
        }
    }
}

fn encode(values: &[f64]) -> Vec<JsonFloat> {
    values.iter().map(|&v| JsonFloat::from(v)).collect()
}

fn decode<E: serde::de::Error>(values: Vec<JsonFloat>) -> Result<Vec<f64>, E> {
    values.into_iter().map(JsonFloat::into_f64).collect()
}

pub(crate) mod json_float {
    use super::{Deserialize, Deserializer, JsonFloat, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        JsonFloat::from(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        JsonFloat::deserialize(deserializer)?.into_f64()
    }
}

pub(crate) mod json_float_seq {
    use super::{decode, encode, Deserialize, Deserializer, JsonFloat, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        encode(values).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        decode(Vec::<JsonFloat>::deserialize(deserializer)?)
    }
}

pub(crate) mod json_float_matrix {
    use super::{decode, encode, Deserialize, Deserializer, JsonFloat, Serialize, Serializer};

    pub fn serialize<S: Serializer>(rows: &[Vec<f64>], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: Vec<Vec<JsonFloat>> = rows.iter().map(|row| encode(row)).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<f64>>, D::Error> {
        Vec::<Vec<JsonFloat>>::deserialize(deserializer)?
            .into_iter()
            .map(decode)
            .collect()
    }
}
