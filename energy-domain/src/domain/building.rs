use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildingType {
    #[default]
    Academic,
    Labs,
    Residential,
    Athletics,
    Utility,
}

impl BuildingType {
    /// Parse a tag-table value; accepts a few common spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "academic" => Some(Self::Academic),
            "lab" | "labs" | "laboratory" => Some(Self::Labs),
            "residential" | "residence" | "housing" => Some(Self::Residential),
            "athletic" | "athletics" => Some(Self::Athletics),
            "utility" | "utilities" | "plant" => Some(Self::Utility),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    /// Normalized building code when known, otherwise the display name.
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub area: f64,
    pub building_type: BuildingType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_values() {
        assert_eq!(BuildingType::parse(" Labs "), Some(BuildingType::Labs));
        assert_eq!(BuildingType::parse("HOUSING"), Some(BuildingType::Residential));
        assert_eq!(BuildingType::parse("plant"), Some(BuildingType::Utility));
        assert_eq!(BuildingType::parse("warehouse"), None);
    }
}
