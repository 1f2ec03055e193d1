//! Building registry: one entry per building, keyed by first-seen name, with
//! area back-fill from metadata and type classification.
//!
//! Types come from the explicit tag table when a building is listed there.
//! The name patterns below are only the fallback for unlisted buildings. They
//! are a coarse heuristic over free text and will misfile some buildings.

use std::collections::{BTreeMap, HashMap, HashSet};

use energy_domain::domain::{Building, BuildingType, RawRecord};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::sources::reference_tables::BuildingMetadata;

/// Ordered name patterns; the first match decides the type.
static NAME_PATTERNS: Lazy<Vec<(BuildingType, Regex)>> = Lazy::new(|| {
    [
        (
            BuildingType::Utility,
            r"(?i)\b(utilit(y|ies)|plant|substation|chiller|steam|boiler|power\s*house|energy\s+(center|plant)|cogen\w*|pump\s*house|thermal\s+energy)\b",
        ),
        (
            BuildingType::Labs,
            r"(?i)\b(labs?|laborator(y|ies)|research|medical|medicine|hospital|clinic(al)?|biomedical|pharmacy|veterinary)\b",
        ),
        (
            BuildingType::Residential,
            r"(?i)\b(residences?|residential|dorms?|dormitor(y|ies)|housing|apartments?)\b",
        ),
        (
            BuildingType::Athletics,
            r"(?i)\b(stadium|arena|athletics?|field\s*house|natatorium|gym(nasium)?|coliseum|recreation|ice\s+rink)\b",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("building name pattern must compile")))
    .collect()
});

/// Classify a building by its name alone.
pub fn classify_name(name: &str) -> BuildingType {
    NAME_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(name))
        .map(|(kind, _)| *kind)
        .unwrap_or_default()
}

/// Whether a name looks like a utility plant or substation.
pub fn is_utility_plant_name(name: &str) -> bool {
    classify_name(name) == BuildingType::Utility
}

/// Explicit building-type assignments keyed by normalized code or lowercase name.
#[derive(Debug, Clone, Default)]
pub struct BuildingTags {
    by_code: HashMap<String, BuildingType>,
    by_name: HashMap<String, BuildingType>,
}

impl BuildingTags {
    pub fn insert(&mut self, code: Option<&str>, name: Option<&str>, building_type: BuildingType) {
        if let Some(code) = code {
            self.by_code.insert(code.to_string(), building_type);
        }
        if let Some(name) = name {
            self.by_name.insert(name.to_lowercase(), building_type);
        }
    }

    pub fn resolve(&self, code: Option<&str>, name: &str) -> Option<BuildingType> {
        code.and_then(|c| self.by_code.get(c))
            .or_else(|| self.by_name.get(&name.to_lowercase()))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty() && self.by_name.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildingRegistry {
    entries: BTreeMap<String, Building>,
    by_code: HashMap<String, String>,
    /// Keys registered from a code alone, pending a reading that names them.
    placeholders: HashSet<String>,
    /// Retired placeholder key -> the named key it was merged into.
    aliases: HashMap<String, String>,
}

impl BuildingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the building behind an electricity reading and return its key.
    ///
    /// The first reading for a name fixes that entry's code and area. Readings
    /// with only a code resolve through codes seen earlier, or register under
    /// the code itself until a named reading with that code arrives; the
    /// placeholder is then merged into the named entry and its key recorded
    /// as an alias. Readings with neither yield `None`.
    pub fn observe(&mut self, record: &RawRecord) -> Option<String> {
        let code = record.building_code.as_deref();
        let key = match (record.building_name.as_deref(), code) {
            (Some(name), _) => name.to_string(),
            (None, Some(code)) => self
                .by_code
                .get(code)
                .cloned()
                .unwrap_or_else(|| code.to_string()),
            (None, None) => return None,
        };

        if let (Some(_), Some(code)) = (record.building_name.as_deref(), code) {
            self.adopt_placeholder(code, &key);
        }

        if !self.entries.contains_key(&key) {
            if record.building_name.is_none() {
                self.placeholders.insert(key.clone());
            }
            self.entries.insert(
                key.clone(),
                Building {
                    id: code.unwrap_or(&key).to_string(),
                    name: key.clone(),
                    code: code.map(str::to_string),
                    area: record.area,
                    building_type: classify_name(&key),
                },
            );
        }
        if let Some(code) = code {
            self.by_code.entry(code.to_string()).or_insert_with(|| key.clone());
        }
        Some(key)
    }

    /// Fold the code-only entry for `code`, if any, into the entry for `name`.
    fn adopt_placeholder(&mut self, code: &str, name: &str) {
        let Some(placeholder) = self.by_code.get(code).cloned() else {
            return;
        };
        if placeholder == name || !self.placeholders.remove(&placeholder) {
            return;
        }
        let Some(mut building) = self.entries.remove(&placeholder) else {
            return;
        };
        match self.entries.get_mut(name) {
            Some(existing) => {
                if existing.area <= 0.0 {
                    existing.area = building.area;
                }
                if existing.code.is_none() {
                    existing.id = building.id;
                    existing.code = building.code;
                }
            }
            None => {
                building.name = name.to_string();
                building.building_type = classify_name(name);
                self.entries.insert(name.to_string(), building);
            }
        }
        self.by_code.insert(code.to_string(), name.to_string());
        self.aliases.insert(placeholder.clone(), name.to_string());
        tracing::debug!(code, %placeholder, name, "merged code-only building into named entry");
    }

    /// Current key for a key handed out by [`observe`](Self::observe).
    pub fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        self.aliases.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Whether any key handed out earlier has since been merged away.
    pub fn has_aliases(&self) -> bool {
        !self.aliases.is_empty()
    }

    /// Fill in area for entries that have none, matching metadata by code and
    /// then by case-insensitive name. Returns how many entries were filled.
    pub fn apply_metadata(&mut self, rows: &[BuildingMetadata]) -> usize {
        let mut by_name: HashMap<String, &BuildingMetadata> = HashMap::new();
        let mut by_code: HashMap<&str, &BuildingMetadata> = HashMap::new();
        for row in rows {
            if let Some(code) = row.code.as_deref() {
                by_code.entry(code).or_insert(row);
            }
            if let Some(name) = row.name.as_deref() {
                by_name.entry(name.to_lowercase()).or_insert(row);
            }
        }

        let mut filled = 0;
        for building in self.entries.values_mut() {
            if building.area > 0.0 {
                continue;
            }
            let matched = building
                .code
                .as_deref()
                .and_then(|c| by_code.get(c))
                .or_else(|| by_name.get(&building.name.to_lowercase()));
            if let Some(row) = matched.filter(|row| row.area > 0.0) {
                building.area = row.area;
                filled += 1;
            }
        }
        filled
    }

    /// Resolve every entry's type: tag table first, name patterns otherwise.
    pub fn classify(&mut self, tags: &BuildingTags) {
        for building in self.entries.values_mut() {
            building.building_type = tags
                .resolve(building.code.as_deref(), &building.name)
                .unwrap_or_else(|| classify_name(&building.name));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Building> {
        self.entries.get(key)
    }

    /// Entries in name order.
    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
