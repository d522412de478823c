//! `tf.train.Example` parsing
//!
//! Only the message subset needed for labeled images is declared here.

use prost::Message;
use std::collections::HashMap;

use crate::error::{LaError, Result};

/// Feature key holding the raw image bytes
pub const IMAGE_FEATURE: &str = "image/encoded";
/// Feature key holding the integer class label
pub const LABEL_FEATURE: &str = "image/class/label";

#[derive(Clone, PartialEq, Message)]
pub struct Example {
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Features {
    #[prost(map = "string, message", tag = "1")]
    pub feature: HashMap<String, Feature>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

pub mod feature {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        BytesList(super::BytesList),
        #[prost(message, tag = "2")]
        FloatList(super::FloatList),
        #[prost(message, tag = "3")]
        Int64List(super::Int64List),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

/// Raw image payload and its class label
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledImage {
    pub encoded: Vec<u8>,
    pub label: i64,
}

/// Parse one serialized Example into image bytes and label.
///
/// Both features are fixed-length scalars: exactly one value each.
pub fn parse_labeled_image(record: &[u8]) -> Result<LabeledImage> {
    let example = Example::decode(record).map_err(|e| LaError::MalformedExample {
        reason: e.to_string(),
    })?;
    let mut features = example.features.map(|f| f.feature).unwrap_or_default();

    let encoded = match take_feature(&mut features, IMAGE_FEATURE)? {
        feature::Kind::BytesList(list) => single(IMAGE_FEATURE, list.value)?,
        other => return Err(wrong_kind(IMAGE_FEATURE, "bytes", &other)),
    };
    let label = match take_feature(&mut features, LABEL_FEATURE)? {
        feature::Kind::Int64List(list) => single(LABEL_FEATURE, list.value)?,
        other => return Err(wrong_kind(LABEL_FEATURE, "int64", &other)),
    };

    Ok(LabeledImage { encoded, label })
}

/// Serialize image bytes and label as an Example
pub fn encode_labeled_image(encoded: &[u8], label: i64) -> Vec<u8> {
    let mut feature = HashMap::new();
    feature.insert(
        IMAGE_FEATURE.to_string(),
        Feature {
            kind: Some(feature::Kind::BytesList(BytesList {
                value: vec![encoded.to_vec()],
            })),
        },
    );
    feature.insert(
        LABEL_FEATURE.to_string(),
        Feature {
            kind: Some(feature::Kind::Int64List(Int64List { value: vec![label] })),
        },
    );
    Example {
        features: Some(Features { feature }),
    }
    .encode_to_vec()
}

fn take_feature(features: &mut HashMap<String, Feature>, name: &str) -> Result<feature::Kind> {
    features
        .remove(name)
        .and_then(|f| f.kind)
        .ok_or_else(|| LaError::MissingFeature { name: name.into() })
}

fn single<T>(name: &str, mut values: Vec<T>) -> Result<T> {
    if values.len() != 1 {
        return Err(LaError::InvalidFeature {
            name: name.into(),
            reason: format!("expected 1 value, got {}", values.len()),
        });
    }
    values.pop().ok_or_else(|| LaError::MissingFeature { name: name.into() })
}

fn wrong_kind(name: &str, expected: &str, got: &feature::Kind) -> LaError {
    let got = match got {
        feature::Kind::BytesList(_) => "bytes",
        feature::Kind::FloatList(_) => "float",
        feature::Kind::Int64List(_) => "int64",
    };
    LaError::InvalidFeature {
        name: name.into(),
        reason: format!("expected {expected} list, got {got} list"),
    }
}
