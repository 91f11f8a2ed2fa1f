//! Wire codec for persisted micro-batch records: JSON, gzipped.

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tidemark_batch_types::MicroBatch;

use crate::errors::{EngineError, EngineResult};

/// Content type recorded with every micro-batch blob.
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub fn encode_micro_batch(batch: &MicroBatch) -> EngineResult<Vec<u8>> {
    let json = serde_json::to_vec(batch).map_err(codec_err)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).map_err(codec_err)?;
    encoder.finish().map_err(codec_err)
}

pub fn decode_micro_batch(raw: &[u8]) -> EngineResult<MicroBatch> {
    let mut json = Vec::new();
    GzDecoder::new(raw)
        .read_to_end(&mut json)
        .map_err(codec_err)?;
    serde_json::from_slice(&json).map_err(codec_err)
}

fn codec_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Codec(e.to_string())
}
