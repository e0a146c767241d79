use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::HarvestError;

/// Prefix of every downloaded asset file name (`XC<id>.<ext>`).
pub const ASSET_PREFIX: &str = "XC";

/// Host used to resolve path-relative asset references.
pub const CATALOG_ORIGIN: &str = "https://xeno-canto.org";

const CREDENTIAL_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: &str) -> Result<Self, HarvestError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == CREDENTIAL_PLACEHOLDER {
            return Err(HarvestError::MissingCredential);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.lat_min, self.lat_max, self.lon_min, self.lon_max
        )
    }
}

impl FromStr for BoundingBox {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| HarvestError::InvalidBoundingBox(value.to_string()))?;
        let [lat_min, lat_max, lon_min, lon_max] = parts[..] else {
            return Err(HarvestError::InvalidBoundingBox(value.to_string()));
        };
        let lat_ok = (-90.0..=90.0).contains(&lat_min)
            && (-90.0..=90.0).contains(&lat_max)
            && lat_min <= lat_max;
        let lon_ok = (-180.0..=180.0).contains(&lon_min)
            && (-180.0..=180.0).contains(&lon_max)
            && lon_min <= lon_max;
        if !lat_ok || !lon_ok {
            return Err(HarvestError::InvalidBoundingBox(value.to_string()));
        }
        Ok(Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        })
    }
}

/// Location filter sent to the catalog: a country name plus a lat/lon box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub country: String,
    pub bbox: BoundingBox,
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cnt:{} box:{}", self.country, self.bbox)
    }
}

/// One catalog entry. Fields the pipeline does not interpret are kept in
/// `extra` and written back unchanged with the metadata snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "file", default, deserialize_with = "string_or_number")]
    pub asset_url: String,
    #[serde(rename = "gen", default, deserialize_with = "text_or_null")]
    pub genus: String,
    #[serde(rename = "sp", default, deserialize_with = "text_or_null")]
    pub species: String,
    #[serde(rename = "en", default, deserialize_with = "text_or_null")]
    pub common_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn category(&self) -> Category {
        Category::from_parts(&self.genus, &self.species, &self.common_name)
    }

    pub fn asset_format(&self) -> AssetFormat {
        AssetFormat::detect(self.file_name_hint(), &self.asset_url)
    }

    /// Original upload name as reported by the catalog (`file-name`).
    pub fn file_name_hint(&self) -> Option<&str> {
        self.extra.get("file-name").and_then(Value::as_str)
    }

    pub fn species_label(&self) -> Option<String> {
        if self.genus.trim().is_empty() || self.species.trim().is_empty() {
            return None;
        }
        Some(format!(
            "{} {} ({})",
            self.genus.trim(),
            self.species.trim(),
            self.common_name.trim()
        ))
    }
}

/// Identifiers become file names, so only plain tokens are accepted.
pub fn is_usable_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
}

pub fn asset_file_name(id: &str, format: AssetFormat) -> String {
    format!("{ASSET_PREFIX}{id}.{}", format.extension())
}

fn text_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFormat {
    Mp3,
    Wav,
    Flac,
    Ogg,
}

impl AssetFormat {
    /// Lookup order used when locating an already-downloaded asset.
    pub const PRIORITY: [AssetFormat; 4] = [
        AssetFormat::Mp3,
        AssetFormat::Wav,
        AssetFormat::Flac,
        AssetFormat::Ogg,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            AssetFormat::Mp3 => "mp3",
            AssetFormat::Wav => "wav",
            AssetFormat::Flac => "flac",
            AssetFormat::Ogg => "ogg",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    /// Picks the local extension for an asset. The catalog serves most files
    /// from `/<id>/download`, so the upload name is consulted before the URL.
    pub fn detect(file_name: Option<&str>, asset_url: &str) -> Self {
        if let Some(format) = file_name.and_then(extension_of) {
            return format;
        }
        let path = Url::parse(asset_url)
            .or_else(|_| Url::parse(CATALOG_ORIGIN).and_then(|base| base.join(asset_url)))
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| asset_url.to_string());
        if let Some(format) = path.rsplit('/').next().and_then(extension_of) {
            return format;
        }
        if asset_url.to_ascii_lowercase().contains("wav") {
            return AssetFormat::Wav;
        }
        AssetFormat::Mp3
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn extension_of(name: &str) -> Option<AssetFormat> {
    let (_, ext) = name.rsplit_once('.')?;
    AssetFormat::from_extension(ext.trim())
}

/// Turns a scheme-relative (`//host/path`) or host-relative (`/path`) asset
/// reference into an absolute HTTPS URL.
pub fn normalize_asset_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }
    if raw.starts_with('/') {
        return Some(format!("{CATALOG_ORIGIN}{raw}"));
    }
    Some(format!("{CATALOG_ORIGIN}/{raw}"))
}

/// Directory-safe grouping key: `"Genus species_Common name"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn from_parts(genus: &str, species: &str, common_name: &str) -> Self {
        let genus = non_blank(genus, "Unknown");
        let species = non_blank(species, "unknown");
        let common_name = non_blank(common_name, "Unknown");
        Self::sanitize(&format!("{genus} {species}_{common_name}"))
    }

    pub fn sanitize(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(|ch| ch.is_alphanumeric() || matches!(ch, ' ' | '_' | '-'))
            .collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Self("Unknown".to_string());
        }
        Self(cleaned.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn non_blank<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() { fallback } else { value }
}
