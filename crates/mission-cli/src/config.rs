//! Configuration loading: the typed settings record ingested from YAML or
//! JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mission_model::{PlanError, Result, SemanticMapping, VariableMapping};

/// The configuration file, fully typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub world_db: Option<DbDescriptor>,
    pub output: OutputConfig,
    pub location_types: Vec<String>,
    /// Domain sorts treated as agent-bearing; `robot`/`robotteam` when
    /// empty.
    pub agent_types: Vec<String>,
    pub type_mapping: Vec<TypeMappingEntry>,
    pub var_mapping: Vec<VarMappingEntry>,
    pub semantic_mapping: Vec<SemanticMapping>,
    /// When set, a goal model with tasks but no valid mission is an error
    /// instead of an empty result.
    pub strict: bool,
    pub max_candidates_per_operator_node: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbDescriptor {
    #[serde(rename = "type", default = "default_db_type")]
    pub db_type: String,
    #[serde(default = "default_file_type")]
    pub file_type: String,
    pub path: PathBuf,
    #[serde(default)]
    pub unique_id: Option<String>,
}

fn default_db_type() -> String {
    "file".to_string()
}

fn default_file_type() -> String {
    "json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_type: String,
    pub file_path: PathBuf,
    pub file_type: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_type: "file".to_string(),
            file_path: PathBuf::from("."),
            file_type: "json".to_string(),
        }
    }
}

/// Domain type -> goal-model type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeMappingEntry {
    pub domain_type: String,
    pub gm_type: String,
}

/// Per-task variable mappings, as declared in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarMappingEntry {
    pub task_id: String,
    pub map: Vec<VarMapPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarMapPair {
    pub gm_var: String,
    pub domain_var: String,
}

impl Settings {
    /// Load and validate a configuration file; the format follows the file
    /// extension (`.yaml`/`.yml` or `.json`).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PlanError::MalformedConfig {
            key: path.display().to_string(),
            detail: format!("cannot read configuration: {e}"),
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let settings: Settings = match extension.as_str() {
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|e| PlanError::MalformedConfig {
                    key: path.display().to_string(),
                    detail: format!("invalid YAML configuration: {e}"),
                })?
            }
            "json" => serde_json::from_str(&content).map_err(|e| PlanError::MalformedConfig {
                key: path.display().to_string(),
                detail: format!("invalid JSON configuration: {e}"),
            })?,
            other => {
                return Err(PlanError::MalformedConfig {
                    key: path.display().to_string(),
                    detail: format!("unsupported configuration file type [{other}]"),
                })
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(db) = &self.world_db {
            if db.db_type != "file" {
                return Err(PlanError::MalformedConfig {
                    key: "world_db.type".into(),
                    detail: format!("unsupported database type [{}]", db.db_type),
                });
            }
            if !db.file_type.eq_ignore_ascii_case("json") {
                return Err(PlanError::MalformedConfig {
                    key: "world_db.file_type".into(),
                    detail: format!("unsupported database file type [{}]", db.file_type),
                });
            }
        }
        if self.output.output_type != "file" {
            return Err(PlanError::MalformedConfig {
                key: "output.output_type".into(),
                detail: format!("unsupported output type [{}]", self.output.output_type),
            });
        }
        if !self.output.file_type.eq_ignore_ascii_case("json") {
            return Err(PlanError::MalformedConfig {
                key: "output.file_type".into(),
                detail: format!("unsupported output file type [{}]", self.output.file_type),
            });
        }
        Ok(())
    }

    /// The flattened per-variable mapping table consumed by the decomposer.
    pub fn variable_mappings(&self) -> Vec<VariableMapping> {
        self.var_mapping
            .iter()
            .flat_map(|entry| {
                entry.map.iter().map(|pair| VariableMapping {
                    task_id: entry.task_id.clone(),
                    gm_var: pair.gm_var.clone(),
                    domain_var: pair.domain_var.clone(),
                })
            })
            .collect()
    }

    /// Root sorts whose derived sorts count as agents.
    pub fn agent_sorts(&self) -> Vec<String> {
        if self.agent_types.is_empty() {
            vec![
                mission_model::ROBOT_SORT.to_string(),
                mission_model::ROBOT_TEAM_SORT.to_string(),
            ]
        } else {
            self.agent_types.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_database_file_type_is_rejected() {
        let settings = Settings {
            world_db: Some(DbDescriptor {
                db_type: "file".into(),
                file_type: "xml".into(),
                path: PathBuf::from("db.xml"),
                unique_id: None,
            }),
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, PlanError::MalformedConfig { .. }));
    }

    #[test]
    fn variable_mappings_flatten_per_task_entries() {
        let settings = Settings {
            var_mapping: vec![VarMappingEntry {
                task_id: "AT1".into(),
                map: vec![
                    VarMapPair {
                        gm_var: "current_robot".into(),
                        domain_var: "?r".into(),
                    },
                    VarMapPair {
                        gm_var: "target".into(),
                        domain_var: "?l".into(),
                    },
                ],
            }],
            ..Settings::default()
        };
        let flat = settings.variable_mappings();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].task_id, "AT1");
        assert_eq!(flat[1].domain_var, "?l");
    }
}
