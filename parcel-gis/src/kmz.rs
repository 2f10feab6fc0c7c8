//! KMZ archive extraction
//!
//! A KMZ is a zip container wrapping one KML document (plus optional
//! images/overlays). Extraction is a pure transform from bytes to KML text.

use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::debug;

/// Zip local-file-header signature ("PK")
const ZIP_SIGNATURE: [u8; 2] = [0x50, 0x4B];

/// Archive extraction errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Not a KMZ archive: missing zip signature")]
    NotAnArchive,

    #[error("KMZ archive contains no .kml entry")]
    NoKmlEntry,

    #[error("Corrupt KMZ archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to read KML entry: {0}")]
    Io(#[from] std::io::Error),
}

/// True when the bytes start with the zip signature
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == ZIP_SIGNATURE
}

/// Extract the first `.kml` entry of a KMZ as text
pub fn extract_kml(bytes: &[u8]) -> Result<String, ArchiveError> {
    if !is_zip(bytes) {
        return Err(ArchiveError::NotAnArchive);
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(".kml") {
            continue;
        }

        debug!(entry = entry.name(), size = entry.size(), "Extracting KML entry");

        let mut raw = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut raw)?;
        return Ok(decode_kml_bytes(&raw));
    }

    Err(ArchiveError::NoKmlEntry)
}

/// Decode KML bytes honoring the XML declaration's encoding
///
/// Latin-1 family declarations map bytes straight to code points; every
/// other encoding is read as UTF-8, replacing invalid sequences.
pub fn decode_kml_bytes(raw: &[u8]) -> String {
    let raw = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(raw);

    match declared_encoding(raw).as_deref() {
        Some("iso-8859-1") | Some("latin1") | Some("latin-1") | Some("windows-1252") => {
            raw.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Encoding named in the `<?xml ... ?>` prolog, lowercased
fn declared_encoding(raw: &[u8]) -> Option<String> {
    let head = &raw[..raw.len().min(200)];
    let head = String::from_utf8_lossy(head);
    let prolog_end = head.find("?>")?;
    let prolog = &head[..prolog_end];

    let start = prolog.find("encoding=")? + "encoding=".len();
    let rest = &prolog[start..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let end = value.find(quote)?;
    Some(value[..end].trim().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extracts_first_kml_entry() {
        let bytes = build_zip(&[
            ("files/icon.png", b"\x89PNG"),
            ("doc.kml", b"<kml>first</kml>"),
            ("other.kml", b"<kml>second</kml>"),
        ]);

        assert_eq!(extract_kml(&bytes).unwrap(), "<kml>first</kml>");
    }

    #[test]
    fn test_kml_extension_match_ignores_case() {
        let bytes = build_zip(&[("DOC.KML", b"<kml/>")]);

        assert_eq!(extract_kml(&bytes).unwrap(), "<kml/>");
    }

    #[test]
    fn test_rejects_non_zip_bytes() {
        let result = extract_kml(b"<?xml version=\"1.0\"?><kml/>");

        assert!(matches!(result, Err(ArchiveError::NotAnArchive)));
    }

    #[test]
    fn test_zip_without_kml_entry() {
        let bytes = build_zip(&[("readme.txt", b"hello")]);

        assert!(matches!(extract_kml(&bytes), Err(ArchiveError::NoKmlEntry)));
    }

    #[test]
    fn test_truncated_zip_is_zip_error() {
        let result = extract_kml(b"PK\x03\x04garbage");

        assert!(matches!(result, Err(ArchiveError::Zip(_))));
    }

    #[test]
    fn test_decodes_latin1_declaration() {
        let mut raw = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><name>Ch".to_vec();
        raw.push(0xE1); // a-acute in Latin-1
        raw.extend_from_slice(b"cara</name>");

        let text = decode_kml_bytes(&raw);

        assert!(text.ends_with("<name>Ch\u{e1}cara</name>"));
    }

    #[test]
    fn test_decodes_utf8_with_bom() {
        let mut raw = vec![0xEF, 0xBB, 0xBF];
        raw.extend_from_slice("<name>Ch\u{e1}cara</name>".as_bytes());

        assert_eq!(decode_kml_bytes(&raw), "<name>Ch\u{e1}cara</name>");
    }
}
