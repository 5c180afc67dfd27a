//! Config validation: identifiers, referential integrity, cast names.

use crate::cast::Cast;
use crate::config::{EntityConfig, ForeignKeyConfig};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

const IDENTIFIER: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn check_identifier(re: &Regex, name: &str) -> Result<(), ConfigError> {
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(name.to_string()))
    }
}

fn foreign_key_columns(fk: &ForeignKeyConfig) -> Vec<&str> {
    match fk {
        ForeignKeyConfig::Single(c) => vec![c.as_str()],
        ForeignKeyConfig::Mapped(m) => m.keys().chain(m.values()).map(String::as_str).collect(),
    }
}

pub fn validate(entities: &[EntityConfig]) -> Result<(), ConfigError> {
    let re = Regex::new(IDENTIFIER).map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut names = HashSet::new();
    for e in entities {
        check_identifier(&re, &e.name)?;
        if !names.insert(e.name.as_str()) {
            return Err(ConfigError::DuplicateEntity(e.name.clone()));
        }
    }

    for e in entities {
        if let Some(table) = &e.table {
            // Schema-qualified names are checked part by part.
            for part in table.split('.') {
                check_identifier(&re, part)?;
            }
        }
        let pk = e.primary_key.columns();
        if pk.is_empty() {
            return Err(ConfigError::InvalidPrimaryKey {
                entity: e.name.clone(),
                column: String::new(),
            });
        }
        for column in &pk {
            if !re.is_match(column) {
                return Err(ConfigError::InvalidPrimaryKey {
                    entity: e.name.clone(),
                    column: column.clone(),
                });
            }
        }
        if let Some(fk) = &e.foreign_key {
            for column in foreign_key_columns(fk) {
                check_identifier(&re, column)?;
            }
        }
        if e.fillable.is_some() && e.guarded.is_some() {
            return Err(ConfigError::Validation(format!(
                "entity {}: fillable and guarded are mutually exclusive",
                e.name
            )));
        }
        for column in e.fillable.iter().chain(e.guarded.iter()).flatten() {
            check_identifier(&re, column)?;
        }
        for (column, cast) in &e.casts {
            check_identifier(&re, column)?;
            cast.parse::<Cast>()
                .map_err(|err| ConfigError::Validation(format!("entity {} column {}: {}", e.name, column, err)))?;
        }

        let mut relation_names = HashSet::new();
        for r in &e.relations {
            check_identifier(&re, &r.name)?;
            if !relation_names.insert(r.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "entity {}: duplicate relation {}",
                    e.name, r.name
                )));
            }
            if !names.contains(r.entity.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "relation target",
                    id: r.entity.clone(),
                });
            }
            if let Some(fk) = &r.foreign_key {
                for column in foreign_key_columns(fk) {
                    check_identifier(&re, column)?;
                }
            }
            match &r.junction {
                Some(_) if !r.kind.is_shared() => {
                    return Err(ConfigError::Validation(format!(
                        "entity {} relation {}: a junction needs a share relation",
                        e.name, r.name
                    )));
                }
                Some(j) => {
                    for part in j.table.split('.') {
                        check_identifier(&re, part)?;
                    }
                    for fk in j.owner.iter().chain(j.related.iter()) {
                        for column in foreign_key_columns(fk) {
                            check_identifier(&re, column)?;
                        }
                    }
                }
                None => {}
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(json: serde_json::Value) -> Vec<EntityConfig> {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn accepts_a_consistent_model() {
        let model = entities(serde_json::json!([
            {"name": "user", "casts": {"age": "?int"}, "guarded": ["id"],
             "relations": [{"name": "posts", "kind": "has_many", "entity": "post"}]},
            {"name": "post", "relations": [
                {"name": "author", "kind": "belongs_to", "entity": "user", "foreign_key": "user_id"},
                {"name": "tags", "kind": "share_many", "entity": "tag",
                 "junction": {"table": "post_tags"}}
            ]},
            {"name": "tag", "primary_key": "id"}
        ]));
        validate(&model).unwrap();
    }

    #[test]
    fn rejects_unknown_relation_target() {
        let model = entities(serde_json::json!([
            {"name": "post", "relations": [{"name": "author", "kind": "belongs_to", "entity": "user"}]}
        ]));
        assert!(matches!(
            validate(&model),
            Err(ConfigError::MissingReference { id, .. }) if id == "user"
        ));
    }

    #[test]
    fn rejects_bad_identifiers_and_casts() {
        let model = entities(serde_json::json!([{"name": "user; drop"}]));
        assert!(matches!(validate(&model), Err(ConfigError::InvalidIdentifier(_))));

        let model = entities(serde_json::json!([{"name": "user", "casts": {"age": "decimal"}}]));
        assert!(matches!(validate(&model), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_junction_on_direct_relation() {
        let model = entities(serde_json::json!([
            {"name": "user"},
            {"name": "post", "relations": [
                {"name": "author", "kind": "belongs_to", "entity": "user", "junction": {"table": "x"}}
            ]}
        ]));
        assert!(matches!(validate(&model), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_duplicates_and_conflicting_filters() {
        let model = entities(serde_json::json!([{"name": "user"}, {"name": "user"}]));
        assert!(matches!(validate(&model), Err(ConfigError::DuplicateEntity(n)) if n == "user"));

        let model = entities(serde_json::json!([{"name": "user", "fillable": ["a"], "guarded": ["b"]}]));
        assert!(matches!(validate(&model), Err(ConfigError::Validation(_))));
    }
}
