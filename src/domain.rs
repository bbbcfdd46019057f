use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(u32);

impl CatalogId {
    pub fn new(value: u32) -> Result<Self, TleError> {
        if value == 0 {
            return Err(TleError::InvalidCatalogId(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CatalogId {
    type Err = TleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(TleError::InvalidCatalogId(value.to_string()));
        }
        let number = trimmed
            .parse::<u32>()
            .map_err(|_| TleError::InvalidCatalogId(value.to_string()))?;
        Self::new(number).map_err(|_| TleError::InvalidCatalogId(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = TleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if normalized.is_empty() {
            return Err(TleError::InvalidOwnerId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackedObject {
    pub catalog_id: CatalogId,
    pub owner_id: OwnerId,
}

impl TrackedObject {
    pub fn new(catalog_id: CatalogId, owner_id: OwnerId) -> Self {
        Self {
            catalog_id,
            owner_id,
        }
    }
}

impl fmt::Display for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.catalog_id, self.owner_id)
    }
}

impl FromStr for TrackedObject {
    type Err = TleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (catalog, owner) = value
            .trim()
            .split_once('@')
            .ok_or_else(|| TleError::InvalidSpecifier(value.to_string()))?;
        Ok(Self::new(catalog.parse()?, owner.parse()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawElementSet {
    pub name: String,
    pub line1: String,
    pub line2: String,
}

impl RawElementSet {
    pub fn new(name: impl Into<String>, line1: impl Into<String>, line2: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line1: line1.into(),
            line2: line2.into(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, TleError> {
        ElementSets::new(text)
            .next()
            .unwrap_or_else(|| Err(TleError::InvalidElementSet("no element lines".to_string())))
    }

    pub fn catalog_id(&self) -> Result<CatalogId, TleError> {
        let field = self
            .line1
            .get(2..7)
            .ok_or_else(|| TleError::InvalidElementSet(self.line1.clone()))?;
        field.parse()
    }
}

pub struct ElementSets<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> ElementSets<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        self.lines
            .by_ref()
            .map(str::trim_end)
            .find(|line| !line.is_empty())
    }
}

impl<'a> Iterator for ElementSets<'a> {
    type Item = Result<RawElementSet, TleError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut name: Option<&'a str> = None;
        while let Some(line) = self.next_line() {
            if is_element_line(line, b'1') {
                let Some(second) = self.next_line() else {
                    return Some(Err(TleError::InvalidElementSet(
                        "line 1 without line 2".to_string(),
                    )));
                };
                if !is_element_line(second, b'2') {
                    return Some(Err(TleError::InvalidElementSet(format!(
                        "expected line 2, found {second:?}"
                    ))));
                }
                let name = name.map(clean_name).unwrap_or_default();
                return Some(Ok(RawElementSet::new(name, line, second)));
            }
            if is_element_line(line, b'2') {
                return Some(Err(TleError::InvalidElementSet(format!(
                    "line 2 without line 1: {line:?}"
                ))));
            }
            if let Some(previous) = name.replace(line) {
                return Some(Err(TleError::InvalidElementSet(format!(
                    "unexpected text {previous:?}"
                ))));
            }
        }
        name.map(|dangling| {
            Err(TleError::InvalidElementSet(format!(
                "name {dangling:?} without element lines"
            )))
        })
    }
}

fn is_element_line(line: &str, number: u8) -> bool {
    let bytes = line.as_bytes();
    bytes.first() == Some(&number) && bytes.get(1) == Some(&b' ')
}

fn clean_name(line: &str) -> String {
    line.strip_prefix("0 ").unwrap_or(line).trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrbitRegime {
    Leo,
    Meo,
    Geo,
    Heo,
}

impl OrbitRegime {
    pub const LEO_CEILING_KM: f64 = 2000.0;
    pub const GEO_ALTITUDE_KM: f64 = 35786.0;
    pub const GEO_BAND_KM: f64 = 2000.0;

    pub fn classify(altitude_km: f64) -> Self {
        if altitude_km < Self::LEO_CEILING_KM {
            OrbitRegime::Leo
        } else if (altitude_km - Self::GEO_ALTITUDE_KM).abs() <= Self::GEO_BAND_KM {
            OrbitRegime::Geo
        } else if altitude_km < Self::GEO_ALTITUDE_KM {
            OrbitRegime::Meo
        } else {
            OrbitRegime::Heo
        }
    }
}

impl fmt::Display for OrbitRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrbitRegime::Leo => write!(f, "LEO"),
            OrbitRegime::Meo => write!(f, "MEO"),
            OrbitRegime::Geo => write!(f, "GEO"),
            OrbitRegime::Heo => write!(f, "HEO"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const LINE1: &str = "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const LINE2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    #[test]
    fn parse_catalog_id_valid() {
        let id: CatalogId = " 25544 ".parse().unwrap();
        assert_eq!(id.get(), 25544);
    }

    #[test]
    fn parse_catalog_id_invalid() {
        assert_matches!("ISS".parse::<CatalogId>(), Err(TleError::InvalidCatalogId(_)));
        assert_matches!("0".parse::<CatalogId>(), Err(TleError::InvalidCatalogId(_)));
        assert_matches!("-5".parse::<CatalogId>(), Err(TleError::InvalidCatalogId(_)));
    }

    #[test]
    fn parse_tracked_object_shorthand() {
        let object: TrackedObject = "25544@acme".parse().unwrap();
        assert_eq!(object.catalog_id.get(), 25544);
        assert_eq!(object.owner_id.as_str(), "acme");
        assert_eq!(object.to_string(), "25544@acme");
    }

    #[test]
    fn parse_three_line_block() {
        let text = format!("0 ISS (ZARYA)\r\n{LINE1}   \r\n{LINE2}\r\n");
        let set = RawElementSet::parse(&text).unwrap();
        assert_eq!(set.name, "ISS (ZARYA)");
        assert_eq!(set.line1, LINE1);
        assert_eq!(set.line2, LINE2);
        assert_eq!(set.catalog_id().unwrap().get(), 25544);
    }

    #[test]
    fn parse_two_line_block_has_empty_name() {
        let set = RawElementSet::parse(&format!("{LINE1}\n{LINE2}")).unwrap();
        assert!(set.name.is_empty());
    }

    #[test]
    fn parse_rejects_swapped_lines() {
        let err = RawElementSet::parse(&format!("{LINE2}\n{LINE1}")).unwrap_err();
        assert_matches!(err, TleError::InvalidElementSet(_));
    }

    #[test]
    fn classify_regimes() {
        assert_eq!(OrbitRegime::classify(416.7), OrbitRegime::Leo);
        assert_eq!(OrbitRegime::classify(20182.5), OrbitRegime::Meo);
        assert_eq!(OrbitRegime::classify(35786.8), OrbitRegime::Geo);
        assert_eq!(OrbitRegime::classify(33786.0), OrbitRegime::Geo);
        assert_eq!(OrbitRegime::classify(40000.0), OrbitRegime::Heo);
    }
}
