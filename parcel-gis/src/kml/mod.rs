//! KML placemark extraction
//!
//! Sync code depends only on [`PlacemarkParser`] and the [`Placemark`]
//! records it yields. The shipped implementation pattern-matches over text
//! because exports from desktop GIS tools are often not well-formed XML.

mod parser;

pub use parser::RegexPlacemarkParser;

use serde::Serialize;

/// Name given to placemarks without a `<name>`
pub const UNNAMED_PLACEMARK: &str = "Unnamed";

/// Geometry element a placemark's coordinates were taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeometryKind {
    Polygon,
    LineString,
    Point,
}

impl GeometryKind {
    /// KML element name
    pub fn element(&self) -> &'static str {
        match self {
            GeometryKind::Polygon => "Polygon",
            GeometryKind::LineString => "LineString",
            GeometryKind::Point => "Point",
        }
    }
}

/// One placemark from a KML document
///
/// Ephemeral: lives for a single sync run and is never persisted itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placemark {
    pub name: String,
    /// Stable external id (element attribute or ExtendedData `id`)
    pub external_id: Option<String>,
    /// Raw `<coordinates>` text
    pub coordinates: String,
    pub kind: GeometryKind,
}

/// Source of placemarks from KML text
pub trait PlacemarkParser: Send + Sync {
    /// Extract placemarks in document order, skipping ones without geometry
    fn parse(&self, kml: &str) -> Vec<Placemark>;
}

/// Parse with the default pattern-based parser
pub fn parse_placemarks(kml: &str) -> Vec<Placemark> {
    RegexPlacemarkParser.parse(kml)
}

/// Replace the five predefined XML entities and numeric references
pub(crate) fn unescape_xml(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
