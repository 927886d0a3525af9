use super::error::{CoreException, ErrorKind};
use nalgebra::{DMatrix, DVector, Point3};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Leading bytes of every serialized payload.
pub const MAGIC: &[u8; 4] = b"PLSR";
/// Current envelope version. Decoding any other version fails.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2 + 2;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("Failed to encode '{tag}': {source}")]
    Encode {
        tag: &'static str,
        #[source]
        source: bincode::Error,
    },
    #[error("Failed to decode '{tag}': {source}")]
    Decode {
        tag: &'static str,
        #[source]
        source: bincode::Error,
    },
    #[error("Payload does not start with the PLSR magic bytes")]
    BadMagic,
    #[error("Unsupported format version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },
    #[error("Type tag mismatch: expected '{expected}', found '{found}'")]
    TagMismatch { expected: &'static str, found: String },
    #[error("Payload truncated: needed {needed} bytes, only {available} available")]
    Truncated { needed: usize, available: usize },
}

impl SerializeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Serialization
    }
}

impl From<SerializeError> for CoreException {
    fn from(err: SerializeError) -> Self {
        let what = err.to_string();
        let ex = CoreException::new(err.kind(), what);
        match err {
            SerializeError::Encode { tag, .. } | SerializeError::Decode { tag, .. } => {
                ex.with("type", tag)
            }
            SerializeError::TagMismatch { expected, found } => {
                ex.with("expected", expected).with("found", found)
            }
            SerializeError::UnsupportedVersion { found, .. } => ex.with("version", found),
            _ => ex,
        }
    }
}

/// A core type with a stable, versioned byte encoding.
///
/// The type tag is written into the envelope so that decoding a payload as the wrong
/// type fails loudly instead of producing garbage.
pub trait Serializable: Serialize + DeserializeOwned {
    const TYPE_TAG: &'static str;
}

/// Encodes `value` inside the versioned envelope.
///
/// # Arguments
///
/// * `value` - The value to encode.
///
/// # Return
///
/// The envelope bytes: magic, version, tag length, tag, then the bincode payload.
pub fn to_bytes<T: Serializable>(value: &T) -> Result<Vec<u8>, SerializeError> {
    let payload = bincode::serialize(value).map_err(|source| SerializeError::Encode {
        tag: T::TYPE_TAG,
        source,
    })?;
    let tag = T::TYPE_TAG.as_bytes();
    let mut out = Vec::with_capacity(HEADER_LEN + tag.len() + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(tag.len() as u16).to_le_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decodes an envelope produced by [`to_bytes`] for the same type.
pub fn from_bytes<T: Serializable>(bytes: &[u8]) -> Result<T, SerializeError> {
    if bytes.len() < HEADER_LEN {
        return Err(SerializeError::Truncated {
            needed: HEADER_LEN,
            available: bytes.len(),
        });
    }
    if &bytes[..4] != MAGIC {
        return Err(SerializeError::BadMagic);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(SerializeError::UnsupportedVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }
    let tag_len = u16::from_le_bytes([bytes[6], bytes[7]]) as usize;
    let tag_end = HEADER_LEN + tag_len;
    if bytes.len() < tag_end {
        return Err(SerializeError::Truncated {
            needed: tag_end,
            available: bytes.len(),
        });
    }
    let tag = &bytes[HEADER_LEN..tag_end];
    if tag != T::TYPE_TAG.as_bytes() {
        return Err(SerializeError::TagMismatch {
            expected: T::TYPE_TAG,
            found: String::from_utf8_lossy(tag).into_owned(),
        });
    }
    bincode::deserialize(&bytes[tag_end..]).map_err(|source| SerializeError::Decode {
        tag: T::TYPE_TAG,
        source,
    })
}

macro_rules! serializable {
    ($($ty:ty => $tag:literal),* $(,)?) => {
        $(impl Serializable for $ty {
            const TYPE_TAG: &'static str = $tag;
        })*
    };
}

serializable! {
    Point3<f64> => "Point",
    bool => "Bool",
    i64 => "Int",
    f64 => "Float",
    String => "String",
    Vec<i64> => "VectorInt",
    Vec<f64> => "VectorFloat",
    Vec<String> => "VectorString",
    DVector<f64> => "DVector",
    DMatrix<f64> => "DMatrix",
}
