//! Byte-stream conversion between a legacy single-byte codepage and UTF-8.
//!
//! Source files arrive in a legacy codepage (windows-1251 unless configured
//! otherwise) and are decoded to UTF-8 for inference and filtering, then
//! encoded back so SQL*Loader reads them with a fixed `CHARACTERSET`.
//!
//! Decoding is total: every supported codepage maps all 256 byte values, so
//! any legacy input decodes. Encoding is strict: a character outside the
//! legacy repertoire, or invalid UTF-8, aborts the conversion instead of
//! substituting.
//!
//! [`detect_encoding`] is a coarse heuristic, not a charset detector. Any byte
//! in `0x80..=0xFF` within the first [`DETECTION_SAMPLE_BYTES`] bytes marks the
//! input as legacy, so UTF-8 text with non-ASCII characters near the start is
//! also classified as legacy.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use encoding_rs::{
    DecoderResult, EncoderResult, Encoding, IBM866, ISO_8859_5, KOI8_R, WINDOWS_1250,
    WINDOWS_1251, WINDOWS_1252,
};
use log::{debug, info};

use crate::error::{Result, StageError};

pub const DETECTION_SAMPLE_BYTES: usize = 1024;
pub const DEFAULT_LEGACY_ENCODING: &str = "windows-1251";

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Legacy,
    Universal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Source was already legacy-encoded; bytes were copied unchanged.
    Copied { bytes: u64 },
    Transcoded { bytes_read: u64, bytes_written: u64 },
}

/// A single-byte codepage paired with the name SQL*Loader knows it by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyCodec {
    encoding: &'static Encoding,
    oracle_charset: &'static str,
}

impl LegacyCodec {
    pub fn for_label(label: &str) -> Result<Self> {
        let trimmed = label.trim();
        let encoding = Encoding::for_label(trimmed.as_bytes())
            .filter(|encoding| encoding.is_single_byte())
            .ok_or_else(|| StageError::UnsupportedEncoding(trimmed.to_string()))?;
        Self::from_encoding(encoding)
    }

    pub fn from_encoding(encoding: &'static Encoding) -> Result<Self> {
        oracle_charset_for(encoding)
            .map(|oracle_charset| LegacyCodec {
                encoding,
                oracle_charset,
            })
            .ok_or_else(|| StageError::UnsupportedEncoding(encoding.name().to_string()))
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn oracle_charset(&self) -> &'static str {
        self.oracle_charset
    }
}

impl Default for LegacyCodec {
    fn default() -> Self {
        LegacyCodec {
            encoding: WINDOWS_1251,
            oracle_charset: "CL8MSWIN1251",
        }
    }
}

fn oracle_charset_for(encoding: &'static Encoding) -> Option<&'static str> {
    let charset = if encoding == WINDOWS_1251 {
        "CL8MSWIN1251"
    } else if encoding == WINDOWS_1252 {
        "WE8MSWIN1252"
    } else if encoding == WINDOWS_1250 {
        "EE8MSWIN1250"
    } else if encoding == ISO_8859_5 {
        "CL8ISO8859P5"
    } else if encoding == KOI8_R {
        "CL8KOI8R"
    } else if encoding == IBM866 {
        "RU8PC866"
    } else {
        return None;
    };
    Some(charset)
}

pub fn detect_encoding(sample: &[u8]) -> SourceEncoding {
    let window = &sample[..sample.len().min(DETECTION_SAMPLE_BYTES)];
    if window.iter().any(|byte| *byte >= 0x80) {
        SourceEncoding::Legacy
    } else {
        SourceEncoding::Universal
    }
}

pub fn detect_file_encoding(path: &Path) -> Result<SourceEncoding> {
    let file = File::open(path)?;
    let mut sample = Vec::with_capacity(DETECTION_SAMPLE_BYTES);
    file.take(DETECTION_SAMPLE_BYTES as u64)
        .read_to_end(&mut sample)?;
    Ok(detect_encoding(&sample))
}

pub fn convert_legacy_to_universal(
    input: &Path,
    output: &Path,
    codec: LegacyCodec,
) -> Result<ConversionOutcome> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(output)?);
    let mut decoder = codec.encoding.new_decoder_without_bom_handling();

    let mut chunk = vec![0u8; CHUNK_SIZE];
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(CHUNK_SIZE)
        .unwrap_or(CHUNK_SIZE * 3);
    let mut decoded = String::with_capacity(capacity);
    let mut bytes_read = 0u64;
    let mut bytes_written = 0u64;

    loop {
        let read = read_chunk(&mut reader, &mut chunk)?;
        let last = read == 0;
        let mut pending = &chunk[..read];
        loop {
            decoded.clear();
            let (result, consumed) =
                decoder.decode_to_string_without_replacement(pending, &mut decoded, last);
            writer.write_all(decoded.as_bytes())?;
            bytes_written += decoded.len() as u64;
            bytes_read += consumed as u64;
            pending = &pending[consumed..];
            match result {
                DecoderResult::InputEmpty => break,
                DecoderResult::OutputFull => continue,
                // Unreachable for the codepages `oracle_charset_for` accepts.
                DecoderResult::Malformed(..) => {
                    return Err(StageError::Encoding(format!(
                        "{input:?} contains bytes with no mapping in {}",
                        codec.name()
                    )));
                }
            }
        }
        if last {
            break;
        }
    }
    writer.flush()?;
    debug!(
        "Decoded {bytes_read} byte(s) of {} into {bytes_written} UTF-8 byte(s)",
        codec.name()
    );
    Ok(ConversionOutcome::Transcoded {
        bytes_read,
        bytes_written,
    })
}

pub fn convert_universal_to_legacy(
    input: &Path,
    output: &Path,
    codec: LegacyCodec,
) -> Result<ConversionOutcome> {
    if detect_file_encoding(input)? == SourceEncoding::Legacy {
        info!(
            "{:?} already looks {}-encoded; copying without transcoding",
            input,
            codec.name()
        );
        let mut reader = File::open(input)?;
        let mut writer = File::create(output)?;
        let bytes = io::copy(&mut reader, &mut writer)?;
        return Ok(ConversionOutcome::Copied { bytes });
    }
    encode_to_legacy(input, output, codec)
}

/// Encodes a UTF-8 file into the legacy codepage without sniffing it first.
///
/// Used when the caller produced `input` itself and knows it is UTF-8, where
/// [`detect_encoding`] would mistake non-ASCII UTF-8 for legacy bytes.
pub fn encode_to_legacy(
    input: &Path,
    output: &Path,
    codec: LegacyCodec,
) -> Result<ConversionOutcome> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(output)?);
    let mut encoder = LegacyEncoder::new(codec);

    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = read_chunk(&mut reader, &mut chunk)?;
        if read == 0 {
            break;
        }
        let encoded = encoder.push(&chunk[..read])?;
        writer.write_all(encoded)?;
    }
    writer.write_all(encoder.finish()?)?;
    writer.flush()?;
    Ok(ConversionOutcome::Transcoded {
        bytes_read: encoder.consumed,
        bytes_written: encoder.produced,
    })
}

fn read_chunk<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buffer) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Incremental UTF-8 → legacy encoder that carries split multi-byte
/// sequences across chunk boundaries.
struct LegacyEncoder {
    codec: LegacyCodec,
    encoder: encoding_rs::Encoder,
    carry: Vec<u8>,
    output: Vec<u8>,
    consumed: u64,
    produced: u64,
}

impl LegacyEncoder {
    fn new(codec: LegacyCodec) -> Self {
        Self {
            codec,
            encoder: codec.encoding.new_encoder(),
            carry: Vec::new(),
            output: Vec::with_capacity(CHUNK_SIZE),
            consumed: 0,
            produced: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<&[u8]> {
        self.carry.extend_from_slice(bytes);
        self.output.clear();

        let valid_up_to = match std::str::from_utf8(&self.carry) {
            Ok(_) => self.carry.len(),
            Err(err) => {
                if err.error_len().is_some() {
                    return Err(StageError::Encoding(format!(
                        "invalid UTF-8 sequence at byte offset {}",
                        self.consumed + err.valid_up_to() as u64
                    )));
                }
                err.valid_up_to()
            }
        };

        let carry = std::mem::take(&mut self.carry);
        let (valid, rest) = carry.split_at(valid_up_to);
        // from_utf8 above already validated this prefix
        let text = std::str::from_utf8(valid)
            .map_err(|err| StageError::Encoding(err.to_string()))?;
        self.encode(text, false)?;
        self.carry = rest.to_vec();
        Ok(&self.output)
    }

    fn finish(&mut self) -> Result<&[u8]> {
        if !self.carry.is_empty() {
            return Err(StageError::Encoding(format!(
                "incomplete UTF-8 sequence at end of input (byte offset {})",
                self.consumed
            )));
        }
        self.output.clear();
        self.encode("", true)?;
        Ok(&self.output)
    }

    fn encode(&mut self, text: &str, last: bool) -> Result<()> {
        let mut remaining = text;
        loop {
            self.output.reserve(remaining.len().max(16));
            let (result, read) = self
                .encoder
                .encode_from_utf8_to_vec_without_replacement(remaining, &mut self.output, last);
            let unmapped_offset = self.consumed + read as u64;
            self.consumed += read as u64;
            remaining = &remaining[read..];
            match result {
                EncoderResult::InputEmpty => break,
                EncoderResult::OutputFull => continue,
                EncoderResult::Unmappable(ch) => {
                    let offset = unmapped_offset - ch.len_utf8() as u64;
                    return Err(StageError::Encoding(format!(
                        "character '{ch}' (U+{:04X}) at byte offset {offset} cannot be represented in {}",
                        ch as u32,
                        self.codec.name()
                    )));
                }
            }
        }
        self.produced += self.output.len() as u64;
        Ok(())
    }
}
