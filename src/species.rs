//! Species/ability/move/item database (§4.2), loaded once at server start from a directory of
//! PBS-style text files.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::CableClubError;

/// A species' allowed form numbers, or "any form at all" when the source file carried no
/// `forms` key (§4.2, §9 "universal form set").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forms {
    Finite(HashSet<i64>),
    Universal,
}

impl Forms {
    pub fn contains(&self, form: i64) -> bool {
        match self {
            Forms::Finite(set) => set.contains(&form),
            Forms::Universal => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Species {
    pub genders: HashSet<i64>,
    pub abilities: HashSet<String>,
    pub moves: HashSet<String>,
    pub forms: Forms,
}

/// Everything the party validator needs to know about the game's data tables. Immutable once
/// built; reloading (if ever needed) means building a fresh one and swapping it in whole.
#[derive(Debug, Clone, Default)]
pub struct SpeciesDatabase {
    pub abilities: HashSet<String>,
    pub moves: HashSet<String>,
    pub items: HashSet<String>,
    pub species: HashMap<String, Species>,
}

/// Strip a UTF-8 BOM if present, matching Python's `utf-8-sig` decoding (§4.2).
fn strip_bom(contents: &str) -> &str {
    contents.strip_prefix('\u{feff}').unwrap_or(contents)
}

/// Parse a section-headers-only file (`abilities.txt`, `moves.txt`, `items.txt`): only the
/// `[INTERNAL_NAME]` header names matter, everything else is ignored.
fn parse_section_names(contents: &str) -> HashSet<String> {
    let contents = strip_bom(contents);
    let mut names = HashSet::new();
    for line in contents.lines() {
        let line = line.trim();
        if let Some(stripped) = line.strip_prefix('[') {
            if let Some(name) = stripped.strip_suffix(']') {
                names.insert(name.trim().to_string());
            }
        }
    }
    names
}

fn read_required(dir: &Path, filename: &str) -> Result<String, CableClubError> {
    let path = dir.join(filename);
    fs::read_to_string(&path).map_err(|err| {
        CableClubError::SpeciesFileError(format!("reading {}: {err}", path.display()))
    })
}

fn split_nonempty(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect()
}

fn genders_for_ratio(ratio: Option<&str>) -> HashSet<i64> {
    match ratio {
        Some("AlwaysMale") => [0].into_iter().collect(),
        Some("AlwaysFemale") => [1].into_iter().collect(),
        Some("Genderless") => [2].into_iter().collect(),
        _ => [0, 1].into_iter().collect(),
    }
}

/// Parse `server_pokemon.txt`: `[INTERNAL_NAME]` sections with `key = value` pairs.
fn parse_species_file(contents: &str) -> HashMap<String, Species> {
    let contents = strip_bom(contents);
    let mut species = HashMap::new();
    let mut current_name: Option<String> = None;
    let mut current_keys: HashMap<String, String> = HashMap::new();

    let flush = |name: &Option<String>,
                 keys: &HashMap<String, String>,
                 species: &mut HashMap<String, Species>| {
        if let Some(name) = name {
            let genders = genders_for_ratio(keys.get("gender_ratio").map(|s| s.as_str()));
            let abilities = keys
                .get("abilities")
                .map(|v| split_nonempty(v))
                .unwrap_or_default();
            let moves = keys
                .get("moves")
                .map(|v| split_nonempty(v))
                .unwrap_or_default();
            let forms = match keys.get("forms") {
                Some(value) => {
                    let set: HashSet<i64> = value
                        .split(',')
                        .map(|v| v.trim())
                        .filter(|v| !v.is_empty())
                        .filter_map(|v| v.parse().ok())
                        .collect();
                    Forms::Finite(set)
                }
                None => Forms::Universal,
            };
            species.insert(
                name.clone(),
                Species {
                    genders,
                    abilities,
                    moves,
                    forms,
                },
            );
        }
    };

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(stripped) = line.strip_prefix('[') {
            if let Some(name) = stripped.strip_suffix(']') {
                flush(&current_name, &current_keys, &mut species);
                current_name = Some(name.trim().to_string());
                current_keys = HashMap::new();
                continue;
            }
        }
        if let Some((key, value)) = line.split_once('=') {
            current_keys.insert(key.trim().to_lowercase(), value.trim().to_string());
        } else {
            debug!("ignoring unparsable species line: {line:?}");
        }
    }
    flush(&current_name, &current_keys, &mut species);
    species
}

impl SpeciesDatabase {
    /// Load the four required data files from `pbs_dir`. Any missing required file aborts
    /// startup (§7 "Resource" errors are fatal for required species files).
    pub fn load(pbs_dir: &Path) -> Result<Self, CableClubError> {
        let abilities = parse_section_names(&read_required(pbs_dir, "abilities.txt")?);
        let moves = parse_section_names(&read_required(pbs_dir, "moves.txt")?);
        let items = parse_section_names(&read_required(pbs_dir, "items.txt")?);
        let species = parse_species_file(&read_required(pbs_dir, "server_pokemon.txt")?);
        if species.is_empty() {
            warn!("species database at {} is empty", pbs_dir.display());
        }
        Ok(SpeciesDatabase {
            abilities,
            moves,
            items,
            species,
        })
    }

    pub fn is_known_ability(&self, name: &str) -> bool {
        self.abilities.contains(name)
    }

    pub fn is_known_item(&self, name: &str) -> bool {
        self.items.contains(name)
    }

    pub fn species(&self, name: &str) -> Option<&Species> {
        self.species.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_section_names_ignoring_bom_and_body() {
        let contents = "\u{feff}[STATIC]\nsomething = else\n[LEVITATE]\n";
        let names = parse_section_names(contents);
        assert!(names.contains("STATIC"));
        assert!(names.contains("LEVITATE"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn missing_forms_key_means_universal() {
        let contents = "[PIKACHU]\nabilities = STATIC,LIGHTNINGROD\nmoves = THUNDERSHOCK\n";
        let species = parse_species_file(contents);
        let pikachu = species.get("PIKACHU").unwrap();
        assert_eq!(pikachu.forms, Forms::Universal);
        assert!(pikachu.forms.contains(999));
    }

    #[test]
    fn explicit_forms_key_is_finite() {
        let contents = "[BURMY]\nforms = 0,1,2\n";
        let species = parse_species_file(contents);
        let burmy = species.get("BURMY").unwrap();
        assert!(burmy.forms.contains(1));
        assert!(!burmy.forms.contains(3));
    }

    #[test]
    fn gender_ratio_maps_to_single_or_both_genders() {
        let contents = "[NIDORINA]\ngender_ratio = AlwaysFemale\n[TAUROS]\ngender_ratio = AlwaysMale\n[MAGNEMITE]\ngender_ratio = Genderless\n[EEVEE]\n";
        let species = parse_species_file(contents);
        assert_eq!(
            species.get("NIDORINA").unwrap().genders,
            [1].into_iter().collect()
        );
        assert_eq!(
            species.get("TAUROS").unwrap().genders,
            [0].into_iter().collect()
        );
        assert_eq!(
            species.get("MAGNEMITE").unwrap().genders,
            [2].into_iter().collect()
        );
        assert_eq!(
            species.get("EEVEE").unwrap().genders,
            [0, 1].into_iter().collect()
        );
    }
}
