//! The recursive party validator (§4.3).
//!
//! Validation never short-circuits: every field in a PokemonRecord's positional layout is
//! consumed regardless of how many semantic checks along the way have already failed, so the
//! parser's cursor stays aligned with the wire layout. The only thing that *does* abort early
//! is a structural parse failure (a field that cannot even be decoded as its expected type) —
//! at that point the record is unrecoverable and validation reports the one error and stops.

use crate::codec::{CodecError, RecordParser};
use crate::config::ConfigFile;
use crate::species::{Forms, Species, SpeciesDatabase};

/// Recursion cap for fused Pokemon records, defending against a maliciously deep fusion chain
/// (§9 "recursive validator"). The game only ever fuses one level deep in practice.
const MAX_FUSION_DEPTH: u32 = 8;

struct Validator<'a> {
    db: &'a SpeciesDatabase,
    config: &'a ConfigFile,
    errors: Vec<String>,
}

impl<'a> Validator<'a> {
    fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn check_known_item_or_empty(&mut self, field: &str, value: &str) {
        if !value.is_empty() && !self.db.is_known_item(value) {
            self.fail(format!("{field}: unknown item {value:?}"));
        }
    }

    fn check_known_ability_or_empty(&mut self, value: &str) {
        if !value.is_empty() && !self.db.is_known_ability(value) {
            self.fail(format!("ability: unknown ability {value:?}"));
        }
    }

    fn validate_move_name(&mut self, field: &str, name: &str, species: &Species, sketch_ok: bool) {
        if name.is_empty() {
            return;
        }
        if !self.db.moves.contains(name) {
            self.fail(format!("{field}: unknown move {name:?}"));
            return;
        }
        if !sketch_ok && !species.moves.contains(name) {
            self.fail(format!("{field}: move {name:?} not learnable by this species"));
        }
    }

    /// Validate one PokemonRecord, recursing into a fused record if present.
    fn validate_pokemon(&mut self, record: &mut RecordParser, depth: u32) -> Result<(), CodecError> {
        if depth > MAX_FUSION_DEPTH {
            self.fail("fusion chain too deep");
            // Still must keep reading to stay in sync is not possible past this point without
            // a schema; treat as a hard stop, matching the outer try/except semantics.
            return Err(CodecError("fusion chain too deep".to_string()));
        }

        let species_name = record.str()?;
        let species = self.db.species(&species_name).cloned();
        if species.is_none() {
            self.fail(format!("unknown species {species_name:?}"));
        }

        let level = record.int()?;
        if !(1..=self.config.validation.maximum_level).contains(&level) {
            self.fail(format!("level {level} out of range"));
        }

        let _personal_id = record.int()?;

        let owner_id = record.int()?;
        if owner_id < 0 || owner_id > u32::MAX as i64 {
            self.fail(format!("owner id {owner_id} does not fit in 32 bits"));
        }

        let owner_name = record.str()?;
        if owner_name.chars().count() > self.config.validation.player_max_name_size {
            self.fail(format!("owner name {owner_name:?} too long"));
        }

        let owner_gender = record.int()?;
        if owner_gender != 0 && owner_gender != 1 {
            self.fail(format!("owner gender {owner_gender} invalid"));
        }

        let _exp = record.int()?;

        let form = record.int()?;
        if let Some(species) = &species {
            if !species.forms.contains(form) {
                self.fail(format!("form {form} not valid for {species_name}"));
            }
        }

        let item = record.str()?;
        self.check_known_item_or_empty("item", &item);

        let sketch_ok = species
            .as_ref()
            .map(|sp| {
                self.config
                    .validation
                    .sketch_move_ids
                    .iter()
                    .any(|sketch| sp.moves.contains(sketch))
            })
            .unwrap_or(false);

        // Fall back to an empty species when the lookup failed, so field-cursor discipline
        // (§4.3, §8 property 7) is preserved even for an unknown species.
        let empty_species = Species {
            genders: Default::default(),
            abilities: Default::default(),
            moves: Default::default(),
            forms: Forms::Universal,
        };
        let species_ref = species.as_ref().unwrap_or(&empty_species);

        let current_move_count = record.int()?;
        for i in 0..current_move_count {
            let move_name = record.str()?;
            self.validate_move_name("current move", &move_name, species_ref, sketch_ok);
            let pp_ups = record.int()?;
            if !(0..=3).contains(&pp_ups) {
                self.fail(format!("move {i} pp-ups {pp_ups} out of range"));
            }
            if self.config.features.pla_installed {
                let _mastery = record.bool_or_none()?;
            }
        }

        let first_move_count = record.int()?;
        for _ in 0..first_move_count {
            let move_name = record.str()?;
            self.validate_move_name("first move", &move_name, species_ref, sketch_ok);
        }

        if self.config.features.pla_installed {
            let mastered_move_count = record.int()?;
            for _ in 0..mastered_move_count {
                let move_name = record.str()?;
                self.validate_move_name("mastered move", &move_name, species_ref, sketch_ok);
            }
        }

        let gender = record.int()?;
        if let Some(species) = &species {
            if !species.genders.contains(&gender) {
                self.fail(format!("gender {gender} not valid for {species_name}"));
            }
        }

        let _shiny = record.bool_or_none()?;

        let ability = record.str()?;
        self.check_known_ability_or_empty(&ability);

        let _ability_index = record.int_or_none()?;
        let _nature_id = record.str()?;
        let _nature_stats_id = record.str()?;

        let mut ev_sum: i64 = 0;
        for _ in 0..6 {
            let iv = record.int()?;
            if !(0..=self.config.validation.iv_stat_limit).contains(&iv) {
                self.fail(format!("iv {iv} out of range"));
            }
            let _iv_maxed = record.bool_or_none()?;
            let ev = record.int()?;
            if !(0..=self.config.validation.ev_stat_limit).contains(&ev) {
                self.fail(format!("ev {ev} out of range"));
            }
            ev_sum += ev;
        }
        if !(0..=self.config.validation.ev_limit).contains(&ev_sum) {
            self.fail(format!("total evs {ev_sum} out of range"));
        }

        let happiness = record.int()?;
        if !(0..=255).contains(&happiness) {
            self.fail(format!("happiness {happiness} out of range"));
        }

        let nickname = record.str()?;
        if nickname.chars().count() > self.config.validation.pokemon_max_name_size {
            self.fail(format!("nickname {nickname:?} too long"));
        }

        let poke_ball = record.str()?;
        self.check_known_item_or_empty("poke_ball", &poke_ball);

        let _steps_to_hatch = record.int()?;
        let _pokerus = record.int()?;
        let _obtain_mode = record.int()?;
        let _obtain_map = record.int()?;
        let _obtain_text = record.str()?;
        let _obtain_level = record.int()?;
        let _hatched_map = record.int()?;

        for _ in 0..6 {
            let _contest_stat = record.int()?;
        }

        let ribbon_count = record.int()?;
        for _ in 0..ribbon_count {
            let _ribbon = record.str()?;
        }

        if self.config.features.essentials_deluxe_installed || self.config.features.mui_mementos_installed {
            let _scale = record.int()?;
        }
        if self.config.features.mui_mementos_installed {
            let _memento = record.str()?;
        }
        if self.config.features.zud_dynamax_installed {
            let _dmax_level = record.int()?;
            let _gmax_factor = record.bool()?;
            let _dmax_able = record.bool()?;
        }
        if self.config.features.tera_installed {
            let _tera_type = record.str()?;
        }
        if self.config.features.focus_installed {
            let _focus_type = record.str()?;
        }

        let has_mail = record.bool()?;
        if has_mail {
            let _mail_item = record.str()?;
            let _mail_message = record.str()?;
            let _mail_sender = record.str()?;
            for _ in 0..3 {
                let slot_species = record.int_or_none()?;
                if let Some(value) = slot_species {
                    if value != 0 {
                        let _icon_gender = record.int()?;
                        let _icon_shiny = record.bool()?;
                        let _icon_form = record.int()?;
                        let _icon_shadow = record.bool()?;
                        let _icon_egg = record.bool()?;
                    }
                }
            }
        }

        let is_fused = record.bool()?;
        if is_fused {
            self.validate_pokemon(record, depth + 1)?;
        }

        Ok(())
    }
}

/// Validate a whole party record against the species database and configured limits/feature
/// flags. Returns the accumulated error list; an empty list means the party is valid.
pub fn validate_party(line: &str, db: &SpeciesDatabase, config: &ConfigFile) -> Vec<String> {
    let mut record = RecordParser::new(line);
    let mut validator = Validator {
        db,
        config,
        errors: Vec::new(),
    };

    let result: Result<(), CodecError> = (|| {
        let count = record.int()?;
        for _ in 0..count {
            validator.validate_pokemon(&mut record, 0)?;
        }
        Ok(())
    })();

    if let Err(err) = result {
        validator.fail(err.to_string());
        return validator.errors;
    }

    let rest = record.raw_all();
    if !rest.is_empty() {
        validator.fail(format!("{} fields remaining after party", rest.len()));
    }

    validator.errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn test_db() -> SpeciesDatabase {
        let mut species = HashMap::new();
        species.insert(
            "PIKACHU".to_string(),
            Species {
                genders: [0, 1].into_iter().collect(),
                abilities: ["STATIC".to_string()].into_iter().collect(),
                moves: ["THUNDERSHOCK".to_string(), "GROWL".to_string()]
                    .into_iter()
                    .collect(),
                forms: Forms::Finite([0].into_iter().collect()),
            },
        );
        SpeciesDatabase {
            abilities: ["STATIC".to_string()].into_iter().collect(),
            moves: ["THUNDERSHOCK".to_string(), "GROWL".to_string(), "SKETCH".to_string()]
                .into_iter()
                .collect(),
            items: HashSet::new(),
            species,
        }
    }

    fn minimal_pokemon_fields() -> Vec<String> {
        // species, level, personal_id, owner_id, owner_name, owner_gender, exp, form, item
        let mut fields: Vec<String> = vec![
            "PIKACHU", "50", "1", "1", "Ash", "0", "0", "0", "",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        fields.push("0".into()); // current move count
        fields.push("0".into()); // first move count
        fields.push("0".into()); // gender
        fields.push("".into()); // shiny
        fields.push("".into()); // ability
        fields.push("".into()); // ability index
        fields.push("".into()); // nature id
        fields.push("".into()); // nature stats id
        for _ in 0..6 {
            fields.push("0".into()); // iv
            fields.push("".into()); // iv maxed
            fields.push("0".into()); // ev
        }
        fields.push("0".into()); // happiness
        fields.push("".into()); // nickname
        fields.push("".into()); // poke ball
        fields.push("0".into()); // steps to hatch
        fields.push("0".into()); // pokerus
        fields.push("0".into()); // obtain mode
        fields.push("0".into()); // obtain map
        fields.push("".into()); // obtain text
        fields.push("0".into()); // obtain level
        fields.push("0".into()); // hatched map
        for _ in 0..6 {
            fields.push("0".into()); // contest stats
        }
        fields.push("0".into()); // ribbon count
        fields.push("false".into()); // mail
        fields.push("false".into()); // fused
        fields
    }

    #[test]
    fn minimal_valid_party_has_no_errors() {
        let db = test_db();
        let config = ConfigFile::default();
        let mut fields = vec!["1".to_string()];
        fields.extend(minimal_pokemon_fields());
        let line = fields.join(",");
        let errors = validate_party(&line, &db, &config);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn level_out_of_range_is_flagged_but_cursor_stays_aligned() {
        let db = test_db();
        let config = ConfigFile::default();
        let mut fields = vec!["1".to_string()];
        let mut pokemon = minimal_pokemon_fields();
        pokemon[1] = "101".to_string();
        fields.extend(pokemon);
        let line = fields.join(",");
        let errors = validate_party(&line, &db, &config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("level"));
    }

    #[test]
    fn unknown_species_still_consumes_whole_record() {
        let db = test_db();
        let config = ConfigFile::default();
        let mut fields = vec!["1".to_string()];
        let mut pokemon = minimal_pokemon_fields();
        pokemon[0] = "MISSINGNO".to_string();
        fields.extend(pokemon);
        let line = fields.join(",");
        let errors = validate_party(&line, &db, &config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown species"));
    }

    #[test]
    fn trailing_fields_after_party_are_an_error() {
        let db = test_db();
        let config = ConfigFile::default();
        let mut fields = vec!["1".to_string()];
        fields.extend(minimal_pokemon_fields());
        fields.push("surplus".to_string());
        let line = fields.join(",");
        let errors = validate_party(&line, &db, &config);
        assert!(errors.iter().any(|e| e.contains("remaining")));
    }

    #[test]
    fn sketch_move_relaxes_move_set_check() {
        let mut db = test_db();
        db.species.get_mut("PIKACHU").unwrap().moves.insert("SKETCH".to_string());
        let config = ConfigFile::default();
        let mut fields = vec!["1".to_string()];
        let mut pokemon = minimal_pokemon_fields();
        // current move count = 1, move name "GROWL" is already learnable; use an
        // out-of-set-but-known move to exercise the sketch relaxation.
        pokemon[9] = "1".to_string();
        pokemon.insert(10, "THUNDERSHOCK".to_string());
        pokemon.insert(11, "0".to_string());
        fields.extend(pokemon);
        let line = fields.join(",");
        let errors = validate_party(&line, &db, &config);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }
}
