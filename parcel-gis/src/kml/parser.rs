//! Pattern-based KML placemark parser

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{unescape_xml, GeometryKind, Placemark, PlacemarkParser, UNNAMED_PLACEMARK};

// Element names may carry a namespace prefix (`kml:Placemark`). A
// self-closing `<Placemark/>` has no body and is not matched.
static PLACEMARK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w-]+:)?Placemark\b((?:[^>]*[^>/])?)>(.*?)</(?:[\w-]+:)?Placemark\s*>")
        .expect("valid placemark pattern")
});

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w-]+:)?name\b[^>]*>(.*?)</(?:[\w-]+:)?name\s*>")
        .expect("valid name pattern")
});

static ID_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\s)id\s*=\s*["']([^"']*)["']"#).expect("valid id attribute pattern")
});

static SIMPLE_DATA_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<(?:[\w-]+:)?SimpleData\s+name\s*=\s*["']id["'][^>]*>(.*?)</(?:[\w-]+:)?SimpleData\s*>"#,
    )
    .expect("valid SimpleData pattern")
});

static DATA_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<(?:[\w-]+:)?Data\s+name\s*=\s*["']id["'][^>]*>.*?<(?:[\w-]+:)?value\b[^>]*>(.*?)</(?:[\w-]+:)?value\s*>"#,
    )
    .expect("valid Data pattern")
});

static POLYGON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w-]+:)?Polygon\b[^>]*>(.*?)</(?:[\w-]+:)?Polygon\s*>")
        .expect("valid Polygon pattern")
});

static OUTER_BOUNDARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)<(?:[\w-]+:)?outerBoundaryIs\b[^>]*>.*?<(?:[\w-]+:)?coordinates\b[^>]*>(.*?)</(?:[\w-]+:)?coordinates\s*>",
    )
    .expect("valid outerBoundaryIs pattern")
});

static LINESTRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w-]+:)?LineString\b[^>]*>(.*?)</(?:[\w-]+:)?LineString\s*>")
        .expect("valid LineString pattern")
});

static POINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w-]+:)?Point\b[^>]*>(.*?)</(?:[\w-]+:)?Point\s*>")
        .expect("valid Point pattern")
});

static COORDINATES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w-]+:)?coordinates\b[^>]*>(.*?)</(?:[\w-]+:)?coordinates\s*>")
        .expect("valid coordinates pattern")
});

/// Text-pattern placemark parser
///
/// Tolerates unbalanced markup outside placemarks, unknown namespaces and
/// vendor extensions. Geometry is taken from the first Polygon (outer ring),
/// else LineString, else Point found in the placemark.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexPlacemarkParser;

impl PlacemarkParser for RegexPlacemarkParser {
    fn parse(&self, kml: &str) -> Vec<Placemark> {
        let mut placemarks = Vec::new();

        for caps in PLACEMARK_RE.captures_iter(kml) {
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            let body = caps.get(2).map_or("", |m| m.as_str());

            let name = first_capture(&NAME_RE, body)
                .map(element_text)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNNAMED_PLACEMARK.to_string());

            let Some((kind, coordinates)) = find_geometry(body) else {
                debug!(placemark = %name, "Skipping placemark without coordinates");
                continue;
            };

            placemarks.push(Placemark {
                name,
                external_id: find_external_id(attrs, body),
                coordinates: coordinates.trim().to_string(),
                kind,
            });
        }

        debug!(count = placemarks.len(), "Parsed KML placemarks");
        placemarks
    }
}

fn first_capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Element text with CDATA unwrapped or entities decoded
fn element_text(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|inner| inner.strip_suffix("]]>"))
    {
        Some(inner) => inner.trim().to_string(),
        None => unescape_xml(trimmed),
    }
}

fn find_external_id(attrs: &str, body: &str) -> Option<String> {
    first_capture(&ID_ATTR_RE, attrs)
        .or_else(|| first_capture(&SIMPLE_DATA_ID_RE, body))
        .or_else(|| first_capture(&DATA_ID_RE, body))
        .map(element_text)
        .filter(|id| !id.is_empty())
}

fn find_geometry(body: &str) -> Option<(GeometryKind, &str)> {
    if let Some(polygon) = first_capture(&POLYGON_RE, body) {
        let ring = first_capture(&OUTER_BOUNDARY_RE, polygon)
            .or_else(|| first_capture(&COORDINATES_RE, polygon));
        if let Some(ring) = ring {
            return Some((GeometryKind::Polygon, ring));
        }
    }

    if let Some(coords) = first_capture(&LINESTRING_RE, body)
        .and_then(|line| first_capture(&COORDINATES_RE, line))
    {
        return Some((GeometryKind::LineString, coords));
    }

    first_capture(&POINT_RE, body)
        .and_then(|point| first_capture(&COORDINATES_RE, point))
        .map(|coords| (GeometryKind::Point, coords))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(kml: &str) -> Vec<Placemark> {
        RegexPlacemarkParser.parse(kml)
    }

    #[test]
    fn test_parses_polygon_placemark() {
        let kml = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
  <Placemark id="lot-a">
    <name>Lot A</name>
    <Polygon><outerBoundaryIs><LinearRing>
      <coordinates>
        10,20,0 11,20,0 11,21,0 10,20,0
      </coordinates>
    </LinearRing></outerBoundaryIs></Polygon>
  </Placemark>
</Document></kml>"#;

        let placemarks = parse(kml);

        assert_eq!(placemarks.len(), 1);
        assert_eq!(placemarks[0].name, "Lot A");
        assert_eq!(placemarks[0].external_id.as_deref(), Some("lot-a"));
        assert_eq!(placemarks[0].kind, GeometryKind::Polygon);
        assert_eq!(placemarks[0].coordinates, "10,20,0 11,20,0 11,21,0 10,20,0");
    }

    #[test]
    fn test_outer_boundary_preferred_over_inner() {
        let kml = r#"<Placemark><name>Holed</name><Polygon>
            <innerBoundaryIs><LinearRing><coordinates>5,5 6,5 6,6 5,5</coordinates></LinearRing></innerBoundaryIs>
            <outerBoundaryIs><LinearRing><coordinates>0,0 9,0 9,9 0,0</coordinates></LinearRing></outerBoundaryIs>
        </Polygon></Placemark>"#;

        assert_eq!(parse(kml)[0].coordinates, "0,0 9,0 9,9 0,0");
    }

    #[test]
    fn test_geometry_priority_polygon_then_line_then_point() {
        let kml = r#"<Placemark><name>Multi</name><MultiGeometry>
            <Point><coordinates>1,1</coordinates></Point>
            <LineString><coordinates>1,1 2,2</coordinates></LineString>
            <Polygon><outerBoundaryIs><LinearRing><coordinates>0,0 1,0 1,1 0,0</coordinates></LinearRing></outerBoundaryIs></Polygon>
        </MultiGeometry></Placemark>
        <Placemark><name>Road</name>
            <Point><coordinates>1,1</coordinates></Point>
            <LineString><coordinates>1,1 2,2</coordinates></LineString>
        </Placemark>"#;

        let placemarks = parse(kml);

        assert_eq!(placemarks[0].kind, GeometryKind::Polygon);
        assert_eq!(placemarks[1].kind, GeometryKind::LineString);
        assert_eq!(placemarks[1].coordinates, "1,1 2,2");
    }

    #[test]
    fn test_id_from_extended_data() {
        let kml = r##"
        <Placemark><name>Simple</name>
          <ExtendedData><SchemaData schemaUrl="#s"><SimpleData name="id">abc-1</SimpleData></SchemaData></ExtendedData>
          <Point><coordinates>1,2</coordinates></Point></Placemark>
        <Placemark><name>Data</name>
          <ExtendedData><Data name="id"><value>abc-2</value></Data></ExtendedData>
          <Point><coordinates>1,2</coordinates></Point></Placemark>"##;

        let placemarks = parse(kml);

        assert_eq!(placemarks[0].external_id.as_deref(), Some("abc-1"));
        assert_eq!(placemarks[1].external_id.as_deref(), Some("abc-2"));
    }

    #[test]
    fn test_attribute_id_wins_over_extended_data() {
        let kml = r#"<Placemark id="attr"><ExtendedData><Data name="id"><value>data</value></Data></ExtendedData>
            <Point><coordinates>1,2</coordinates></Point></Placemark>"#;

        assert_eq!(parse(kml)[0].external_id.as_deref(), Some("attr"));
    }

    #[test]
    fn test_missing_name_defaults() {
        let kml = "<Placemark><Point><coordinates>1,2</coordinates></Point></Placemark>";

        let placemarks = parse(kml);

        assert_eq!(placemarks[0].name, UNNAMED_PLACEMARK);
        assert_eq!(placemarks[0].external_id, None);
    }

    #[test]
    fn test_name_entities_and_cdata() {
        let kml = r#"<Placemark><name>Smith &amp; Sons</name><Point><coordinates>1,2</coordinates></Point></Placemark>
            <Placemark><name><![CDATA[ <b>Bold</b> ]]></name><Point><coordinates>1,2</coordinates></Point></Placemark>"#;

        let placemarks = parse(kml);

        assert_eq!(placemarks[0].name, "Smith & Sons");
        assert_eq!(placemarks[1].name, "<b>Bold</b>");
    }

    #[test]
    fn test_skips_placemark_without_coordinates() {
        let kml = r#"<Placemark><name>Folder note</name><description>x</description></Placemark>
            <Placemark><name>Kept</name><Point><coordinates>1,2</coordinates></Point></Placemark>"#;

        let placemarks = parse(kml);

        assert_eq!(placemarks.len(), 1);
        assert_eq!(placemarks[0].name, "Kept");
    }

    #[test]
    fn test_blank_coordinates_are_passed_through() {
        // An empty <coordinates> element is malformed geometry, reported downstream
        let kml = "<Placemark><name>Blank</name><Point><coordinates>  </coordinates></Point></Placemark>";

        let placemarks = parse(kml);

        assert_eq!(placemarks.len(), 1);
        assert_eq!(placemarks[0].coordinates, "");
    }

    #[test]
    fn test_namespace_prefixes_and_broken_surroundings() {
        let kml = r#"<kml:kml><kml:Document><unclosed>
            <kml:Placemark><kml:name>Prefixed</kml:name>
            <kml:Point><kml:coordinates>3,4</kml:coordinates></kml:Point></kml:Placemark>"#;

        let placemarks = parse(kml);

        assert_eq!(placemarks.len(), 1);
        assert_eq!(placemarks[0].name, "Prefixed");
        assert_eq!(placemarks[0].coordinates, "3,4");
    }

    #[test]
    fn test_self_closing_placemark_does_not_swallow_next() {
        let kml = r#"<Placemark id="x"/>
            <Placemark id="real"><name>Next</name><Point><coordinates>1,2</coordinates></Point></Placemark>"#;

        let placemarks = parse(kml);

        assert_eq!(placemarks.len(), 1);
        assert_eq!(placemarks[0].name, "Next");
        assert_eq!(placemarks[0].external_id.as_deref(), Some("real"));
    }

    #[test]
    fn test_only_bare_id_attribute_is_used() {
        let kml = r#"<Placemark data-id="d" xml:id="x"><name>Prefixed attrs</name><Point><coordinates>1,2</coordinates></Point></Placemark>
            <Placemark data-id="d"
              id="bare"><name>Both</name><Point><coordinates>1,2</coordinates></Point></Placemark>"#;

        let placemarks = parse(kml);

        assert_eq!(placemarks[0].external_id, None);
        assert_eq!(placemarks[1].external_id.as_deref(), Some("bare"));
    }

    #[test]
    fn test_style_id_attribute_not_taken_as_placemark_id() {
        let kml = r#"<Placemark><name>Styled</name><Style id="s1"><LineStyle/></Style>
            <Point><coordinates>1,2</coordinates></Point></Placemark>"#;

        assert_eq!(parse(kml)[0].external_id, None);
    }
}
