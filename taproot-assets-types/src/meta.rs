//! Asset metadata revealed in genesis proofs.

use crate::error::Error;
use crate::tlv::{Stream, Type, UnknownOddTypes, Writer};
use alloc::vec::Vec;
use bitcoin::hashes::{sha256::Hash as Sha256Hash, Hash};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Largest metadata blob a genesis can commit to.
pub const META_DATA_MAX_SIZE_BYTES: usize = 1024 * 1024;

/// JSON key carrying the decimal display hint.
pub const DECIMAL_DISPLAY_JSON_KEY: &str = "decimal_display";

const META_TYPE: Type = Type(0);
const META_DATA: Type = Type(2);
const META_DECIMAL_DISPLAY: Type = Type(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaType {
    Opaque,
    Json,
    /// A type this version does not interpret; treated as opaque.
    Unknown(u8),
}

impl MetaType {
    pub fn as_u8(self) -> u8 {
        match self {
            MetaType::Opaque => 0,
            MetaType::Json => 1,
            MetaType::Unknown(val) => val,
        }
    }

    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => MetaType::Opaque,
            1 => MetaType::Json,
            other => MetaType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum MetaError {
    #[error("meta data is missing")]
    MetaDataMissing,
    #[error("meta data too large: {size} bytes exceeds {max}")]
    MetaDataTooLarge { size: usize, max: usize },
    #[error("invalid JSON meta data")]
    InvalidJson,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaReveal {
    pub meta_type: MetaType,
    pub data: Vec<u8>,
    pub decimal_display: Option<u32>,
    pub unknown_odd_types: UnknownOddTypes,
}

impl MetaReveal {
    pub fn new(meta_type: MetaType, data: Vec<u8>) -> Self {
        MetaReveal {
            meta_type,
            data,
            decimal_display: None,
            unknown_odd_types: UnknownOddTypes::new(),
        }
    }

    pub fn validate(&self) -> Result<(), MetaError> {
        if self.data.is_empty() {
            return Err(MetaError::MetaDataMissing);
        }
        if self.data.len() > META_DATA_MAX_SIZE_BYTES {
            return Err(MetaError::MetaDataTooLarge {
                size: self.data.len(),
                max: META_DATA_MAX_SIZE_BYTES,
            });
        }
        if self.meta_type == MetaType::Json {
            serde_json::from_slice::<serde_json::Value>(&self.data)
                .map_err(|_| MetaError::InvalidJson)?;
        }
        Ok(())
    }

    /// Returns the decimal display hint: the explicit record if present, else
    /// the `decimal_display` key of JSON metadata.
    pub fn decimal_display(&self) -> Result<Option<u32>, MetaError> {
        self.validate()?;
        if let Some(explicit) = self.decimal_display {
            return Ok(Some(explicit));
        }
        if self.meta_type != MetaType::Json {
            return Ok(None);
        }
        let value: serde_json::Value =
            serde_json::from_slice(&self.data).map_err(|_| MetaError::InvalidJson)?;
        Ok(value
            .get(DECIMAL_DISPLAY_JSON_KEY)
            .and_then(serde_json::Value::as_u64)
            .and_then(|display| u32::try_from(display).ok()))
    }

    /// Commitment placed in the genesis: the hash of the full TLV encoding,
    /// unknown odd records included.
    pub fn meta_hash(&self) -> Sha256Hash {
        Sha256Hash::hash(&self.encode())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer
            .record(META_TYPE, alloc::vec![self.meta_type.as_u8()])
            .record(META_DATA, self.data.clone());
        if let Some(display) = self.decimal_display {
            writer.record(META_DECIMAL_DISPLAY, display.to_be_bytes().to_vec());
        }
        writer.unknown(&self.unknown_odd_types).finish()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut stream = Stream::new(bytes);
        let mut meta_type = None;
        let mut data = None;
        let mut decimal_display = None;
        let mut unknown_odd_types = UnknownOddTypes::new();

        while let Some(record) = stream.next_record()? {
            match record.tlv_type() {
                META_TYPE => meta_type = Some(MetaType::from_u8(record.u8()?)),
                META_DATA => data = Some(record.into_value()),
                META_DECIMAL_DISPLAY => decimal_display = Some(record.u32_be()?),
                _ => record.keep_if_odd(&mut unknown_odd_types)?,
            }
        }

        Ok(MetaReveal {
            meta_type: meta_type.ok_or(Error::MissingTlvField("MetaReveal.type".into()))?,
            data: data.ok_or(Error::MissingTlvField("MetaReveal.data".into()))?,
            decimal_display,
            unknown_odd_types,
        })
    }
}

/// Validates an optional reveal; no metadata is valid.
pub fn validate_meta(meta: Option<&MetaReveal>) -> Result<(), MetaError> {
    meta.map_or(Ok(()), MetaReveal::validate)
}
