//! Live KML feed of stored parcels
//!
//! Rendering is a pure function of the parcels passed in. Callers query the
//! store on every request; nothing here is cached.

use parcel_common::{Parcel, ParcelStatus};

use crate::geometry::{render_geojson, RenderedGeometry};
use crate::kml::GeometryKind;

/// Content type for KML responses
pub const KML_CONTENT_TYPE: &str = "application/vnd.google-earth.kml+xml";

/// Default network-link refresh interval in seconds
pub const DEFAULT_REFRESH_SECS: u32 = 60;

const FEED_TITLE: &str = "Parcels";

/// Stage colors as `rrggbb`
const STATUS_COLORS: [(ParcelStatus, &str); 7] = [
    (ParcelStatus::Prospecting, "3b82f6"),
    (ParcelStatus::FirstContact, "8b5cf6"),
    (ParcelStatus::Negotiation, "f59e0b"),
    (ParcelStatus::DueDiligence, "f97316"),
    (ParcelStatus::Contract, "10b981"),
    (ParcelStatus::Acquired, "047857"),
    (ParcelStatus::Discarded, "ef4444"),
];

/// Used for status values outside the known stages
const NEUTRAL_COLOR: &str = "6b7280";

const LINE_ALPHA: u8 = 0xff;
const FILL_ALPHA: u8 = 0x66;

/// Escape the five XML special characters
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// `rrggbb` color for a stored status string
pub fn status_color(status: &str) -> &'static str {
    status
        .parse::<ParcelStatus>()
        .ok()
        .and_then(|s| STATUS_COLORS.iter().find(|(known, _)| *known == s))
        .map(|(_, rgb)| *rgb)
        .unwrap_or(NEUTRAL_COLOR)
}

/// KML colors are `aabbggrr`
fn kml_color(alpha: u8, rgb: &str) -> String {
    format!("{:02x}{}{}{}", alpha, &rgb[4..6], &rgb[2..4], &rgb[0..2])
}

/// Render the feed document for `parcels`
///
/// Parcels whose geometry cannot be rendered are left out. `base_url` is
/// the application root used for deep links.
pub fn render_feed(parcels: &[Parcel], base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let placemarks: Vec<String> = parcels
        .iter()
        .filter_map(|parcel| {
            let rendered = parcel.geometry.as_ref().and_then(render_geojson)?;
            Some(render_placemark(parcel, &rendered, base_url))
        })
        .collect();

    let mut kml = String::new();
    kml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    kml.push_str("<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n");
    kml.push_str("<Document>\n");
    kml.push_str(&format!("  <name>{}</name>\n", FEED_TITLE));
    kml.push_str(&format!(
        "  <description>{}</description>\n",
        escape_xml(&format!("{} parcels, live from {}", placemarks.len(), base_url))
    ));
    for placemark in &placemarks {
        kml.push_str(placemark);
    }
    kml.push_str("</Document>\n");
    kml.push_str("</kml>\n");
    kml
}

fn render_placemark(parcel: &Parcel, geometry: &RenderedGeometry, base_url: &str) -> String {
    let id = parcel.id.to_string();
    let rgb = status_color(&parcel.status);
    let line = kml_color(LINE_ALPHA, rgb);
    let fill = kml_color(FILL_ALPHA, rgb);

    let mut out = String::new();
    out.push_str(&format!("  <Placemark id=\"{}\">\n", escape_xml(&id)));
    out.push_str(&format!("    <name>{}</name>\n", escape_xml(&parcel.name)));
    out.push_str(&format!(
        "    <description>{}</description>\n",
        escape_xml(&describe(parcel, base_url))
    ));
    out.push_str("    <Style>\n");
    out.push_str(&format!(
        "      <LineStyle><color>{}</color><width>2</width></LineStyle>\n",
        line
    ));
    out.push_str(&format!("      <PolyStyle><color>{}</color></PolyStyle>\n", fill));
    out.push_str(&format!("      <IconStyle><color>{}</color></IconStyle>\n", line));
    out.push_str("    </Style>\n");
    out.push_str("    <ExtendedData>\n");
    out.push_str(&format!(
        "      <Data name=\"id\"><value>{}</value></Data>\n",
        escape_xml(&id)
    ));
    out.push_str(&format!(
        "      <Data name=\"status\"><value>{}</value></Data>\n",
        escape_xml(&parcel.status)
    ));
    out.push_str("    </ExtendedData>\n");
    out.push_str(&geometry_element(geometry));
    out.push_str("  </Placemark>\n");
    out
}

fn geometry_element(geometry: &RenderedGeometry) -> String {
    let coordinates = format!(
        "<coordinates>{}</coordinates>",
        escape_xml(&geometry.coordinates)
    );
    let inner = match geometry.kind {
        GeometryKind::Polygon => format!(
            "<outerBoundaryIs><LinearRing>{}</LinearRing></outerBoundaryIs>",
            coordinates
        ),
        GeometryKind::LineString | GeometryKind::Point => coordinates,
    };
    let element = geometry.kind.element();
    format!("    <{}>{}</{}>\n", element, inner, element)
}

/// HTML balloon text; escaped again as XML by the caller
fn describe(parcel: &Parcel, base_url: &str) -> String {
    let status = parcel
        .parsed_status()
        .map(|s| s.label().to_string())
        .unwrap_or_else(|| parcel.status.clone());

    let mut rows = vec![format!("<b>Status:</b> {}", escape_xml(&status))];
    if let Some(area) = parcel.area_hectares {
        rows.push(format!("<b>Area:</b> {:.2} ha", area));
    }
    if let Some(price) = parcel.price {
        rows.push(format!("<b>Price:</b> {:.2}", price));
    }
    if let Some(owner) = &parcel.owner_name {
        rows.push(format!("<b>Owner:</b> {}", escape_xml(owner)));
    }
    rows.push(format!(
        "<b>Priority:</b> {}",
        if parcel.is_priority { "Yes" } else { "No" }
    ));
    rows.push(format!(
        "<a href=\"{}/parcels/{}\">Open in app</a>",
        escape_xml(base_url),
        parcel.id
    ));

    rows.join("<br/>")
}

/// Render a document that subscribes a GIS viewer to `feed_url`
pub fn render_network_link(feed_url: &str, refresh_secs: u32) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <kml xmlns=\"http://www.opengis.net/kml/2.2\">\n\
         <NetworkLink>\n\
         \x20 <name>{title} (live)</name>\n\
         \x20 <open>1</open>\n\
         \x20 <Link>\n\
         \x20   <href>{href}</href>\n\
         \x20   <refreshMode>onInterval</refreshMode>\n\
         \x20   <refreshInterval>{refresh}</refreshInterval>\n\
         \x20 </Link>\n\
         </NetworkLink>\n\
         </kml>\n",
        title = FEED_TITLE,
        href = escape_xml(feed_url),
        refresh = refresh_secs.max(1),
    )
}
