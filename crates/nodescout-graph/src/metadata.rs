//! Embedded workflow text extraction.

use crate::error::{GraphFormatError, Result};
use crate::model::WorkflowGraph;
use crate::normalize::parse_workflow;
use flate2::read::ZlibDecoder;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Keywords probed in order.
const WORKFLOW_KEYWORDS: [&str; 2] = ["workflow", "prompt"];

/// Source of raw workflow JSON text for a file.
pub trait MetadataSource: Send + Sync {
    /// `Ok(None)` when the file carries no workflow.
    fn workflow_text(&self, path: &Path) -> Result<Option<String>>;
}

/// Reads `tEXt`, `zTXt` and `iTXt` chunks from PNG files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngMetadataSource;

impl MetadataSource for PngMetadataSource {
    fn workflow_text(&self, path: &Path) -> Result<Option<String>> {
        let bytes = std::fs::read(path)?;
        let chunks = read_text_chunks(&bytes)?;
        Ok(WORKFLOW_KEYWORDS
            .iter()
            .find_map(|key| chunks.get(*key).filter(|v| !v.trim().is_empty()).cloned()))
    }
}

/// Exported workflow documents (`.json`).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFileSource;

impl MetadataSource for JsonFileSource {
    fn workflow_text(&self, path: &Path) -> Result<Option<String>> {
        let text = std::fs::read_to_string(path)?;
        Ok((!text.trim().is_empty()).then_some(text))
    }
}

/// Picks a source by file extension; anything but `.json` is read as PNG.
pub fn source_for_path(path: &Path) -> Box<dyn MetadataSource> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        Box::new(JsonFileSource)
    } else {
        Box::new(PngMetadataSource)
    }
}

pub fn load_workflow(source: &dyn MetadataSource, path: &Path) -> Result<WorkflowGraph> {
    let text = source
        .workflow_text(path)?
        .ok_or(GraphFormatError::NoMetadata)?;
    parse_workflow(&text)
}

/// Keyword -> text for every textual chunk; the first occurrence of a keyword wins.
pub fn read_text_chunks(bytes: &[u8]) -> Result<HashMap<String, String>> {
    if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
        return Err(GraphFormatError::InvalidContainer(
            "missing PNG signature".to_string(),
        ));
    }

    let mut chunks = HashMap::new();
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        let kind = &bytes[pos + 4..pos + 8];
        let data_start = pos + 8;
        let data_end = data_start
            .checked_add(len)
            .filter(|end| end + 4 <= bytes.len())
            .ok_or_else(|| {
                GraphFormatError::InvalidContainer(format!(
                    "chunk {} overruns file",
                    String::from_utf8_lossy(kind)
                ))
            })?;
        let data = &bytes[data_start..data_end];

        let entry = match kind {
            b"tEXt" => decode_text(data),
            b"zTXt" => decode_ztxt(data)?,
            b"iTXt" => decode_itxt(data)?,
            b"IEND" => break,
            _ => None,
        };
        if let Some((keyword, text)) = entry {
            debug!("PNG text chunk '{}' ({} bytes)", keyword, text.len());
            chunks.entry(keyword).or_insert(text);
        }

        // Skip the CRC.
        pos = data_end + 4;
    }
    Ok(chunks)
}

fn split_keyword(data: &[u8]) -> Option<(String, &[u8])> {
    let nul = data.iter().position(|&b| b == 0)?;
    Some((latin1(&data[..nul]), &data[nul + 1..]))
}

fn decode_text(data: &[u8]) -> Option<(String, String)> {
    let (keyword, rest) = split_keyword(data)?;
    Some((keyword, text_bytes(rest)))
}

fn decode_ztxt(data: &[u8]) -> Result<Option<(String, String)>> {
    let Some((keyword, rest)) = split_keyword(data) else {
        return Ok(None);
    };
    // First byte is the compression method; only zlib exists.
    let Some(compressed) = rest.get(1..) else {
        return Ok(None);
    };
    let raw = inflate(compressed)?;
    Ok(Some((keyword, text_bytes(&raw))))
}

fn decode_itxt(data: &[u8]) -> Result<Option<(String, String)>> {
    let Some((keyword, rest)) = split_keyword(data) else {
        return Ok(None);
    };
    if rest.len() < 2 {
        return Ok(None);
    }
    let compressed = rest[0] == 1;
    let rest = &rest[2..];
    // Language tag, then translated keyword.
    let Some(lang_end) = rest.iter().position(|&b| b == 0) else {
        return Ok(None);
    };
    let rest = &rest[lang_end + 1..];
    let Some(translated_end) = rest.iter().position(|&b| b == 0) else {
        return Ok(None);
    };
    let body = &rest[translated_end + 1..];
    let text = if compressed {
        String::from_utf8_lossy(&inflate(body)?).into_owned()
    } else {
        String::from_utf8_lossy(body).into_owned()
    };
    Ok(Some((keyword, text)))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| GraphFormatError::InvalidContainer(format!("bad zlib stream: {}", e)))?;
    Ok(out)
}

/// UTF-8 when valid, otherwise ISO-8859-1 as the chunk format prescribes.
fn text_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => latin1(bytes),
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
