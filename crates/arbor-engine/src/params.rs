//! Run parameters: the TOML-backed configuration source.
//!
//! ```toml
//! [run]
//! particle_mass = 0.00086
//! on_tree_error = "continue"
//!
//! [cosmology]
//! omega_m = 0.25
//! omega_lambda = 0.75
//! hubble_h = 0.73
//!
//! [snapshots]
//! redshifts = [6.0, 3.0, 1.0, 0.5, 0.0]
//!
//! [memory]
//! galaxy_state = 268435456
//!
//! [modules]
//! enabled = ["infall", "cooling", "star_formation"]
//!
//! [modules.cooling]
//! efficiency = 0.4
//! ```

use indexmap::IndexMap;
use serde::Deserialize;
use std::error::Error;
use std::fmt;

use arbor_arena::{AllocCategory, RegionBudget};
use arbor_core::{Cosmology, ParameterSource};

/// What to do when one tree fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log the failure, close the tree's region, continue with the
    /// next tree.
    #[default]
    Continue,
    /// Stop the run after the first failing tree.
    Abort,
}

fn default_particle_mass() -> f64 {
    0.01
}

/// The `[run]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    /// Simulation particle mass in 10^10 Msun/h.
    #[serde(default = "default_particle_mass")]
    pub particle_mass: f64,
    /// Per-tree failure policy.
    #[serde(default)]
    pub on_tree_error: ErrorPolicy,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            particle_mass: default_particle_mass(),
            on_tree_error: ErrorPolicy::default(),
        }
    }
}

/// The `[cosmology]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CosmologySection {
    /// Matter density parameter.
    pub omega_m: f64,
    /// Dark-energy density parameter.
    pub omega_lambda: f64,
    /// Dimensionless Hubble parameter.
    pub hubble_h: f64,
}

/// The `[snapshots]` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotsSection {
    /// Snapshot redshifts, strictly decreasing.
    pub redshifts: Vec<f64>,
}

/// The `[memory]` section: optional per-category region caps in bytes.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemorySection {
    /// Cap for raw tree records and traversal scaffolding.
    pub tree_structural: Option<u64>,
    /// Cap for working halo records.
    pub halo_working: Option<u64>,
    /// Cap for galaxy records.
    pub galaxy_state: Option<u64>,
    /// Cap for output staging.
    pub io_staging: Option<u64>,
    /// Cap for scratch buffers.
    pub scratch: Option<u64>,
}

impl MemorySection {
    /// The region budget these caps describe.
    pub fn budget(&self) -> RegionBudget {
        let mut budget = RegionBudget::unlimited();
        for (cap, category) in [
            (self.tree_structural, AllocCategory::TreeStructural),
            (self.halo_working, AllocCategory::HaloWorking),
            (self.galaxy_state, AllocCategory::GalaxyState),
            (self.io_staging, AllocCategory::IoStaging),
            (self.scratch, AllocCategory::Scratch),
        ] {
            if let Some(bytes) = cap {
                budget = budget.with_cap(category, bytes);
            }
        }
        budget
    }
}

/// The `[modules]` section: the ordered activation list plus one
/// parameter table per module.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ModulesSection {
    /// Active modules in execution order.
    #[serde(default)]
    pub enabled: Vec<String>,
    /// `[modules.<name>]` parameter tables.
    #[serde(flatten)]
    pub settings: IndexMap<String, IndexMap<String, toml::Value>>,
}

/// Parsed run parameters; implements [`ParameterSource`] for the
/// module pipeline.
#[derive(Clone, Debug)]
pub struct RunParameters {
    /// The `[run]` section.
    pub run: RunSection,
    /// The `[cosmology]` section.
    pub cosmology: CosmologySection,
    /// The `[snapshots]` section.
    pub snapshots: SnapshotsSection,
    /// The `[memory]` section.
    pub memory: MemorySection,
    /// The `[modules]` activation list.
    enabled: Vec<String>,
    /// Stringified module parameters for [`ParameterSource`] lookups.
    flat: IndexMap<String, IndexMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParameters {
    #[serde(default)]
    run: RunSection,
    cosmology: CosmologySection,
    snapshots: SnapshotsSection,
    #[serde(default)]
    memory: MemorySection,
    #[serde(default)]
    modules: ModulesSection,
}

impl RunParameters {
    /// Parse run parameters from a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ParamsError> {
        let raw: RawParameters = toml::from_str(text).map_err(ParamsError::Parse)?;
        let mut flat = IndexMap::new();
        for (module, table) in &raw.modules.settings {
            let mut entries = IndexMap::new();
            for (key, value) in table {
                let rendered = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Integer(v) => v.to_string(),
                    toml::Value::Float(v) => v.to_string(),
                    toml::Value::Boolean(v) => v.to_string(),
                    _ => {
                        return Err(ParamsError::UnsupportedValue {
                            module: module.clone(),
                            key: key.clone(),
                        })
                    }
                };
                entries.insert(key.clone(), rendered);
            }
            flat.insert(module.clone(), entries);
        }
        Ok(Self {
            run: raw.run,
            cosmology: raw.cosmology,
            snapshots: raw.snapshots,
            memory: raw.memory,
            enabled: raw.modules.enabled,
            flat,
        })
    }

    /// The cosmology these parameters describe.
    pub fn cosmology(&self) -> Cosmology {
        Cosmology {
            omega_m: self.cosmology.omega_m,
            omega_lambda: self.cosmology.omega_lambda,
            hubble_h: self.cosmology.hubble_h,
        }
    }
}

impl ParameterSource for RunParameters {
    fn active_modules(&self) -> &[String] {
        &self.enabled
    }

    fn parameter(&self, module: &str, key: &str) -> Option<&str> {
        self.flat.get(module)?.get(key).map(String::as_str)
    }
}

/// Errors loading run parameters.
#[derive(Debug)]
pub enum ParamsError {
    /// The TOML document failed to parse.
    Parse(toml::de::Error),
    /// A module parameter is not a scalar (arrays and nested tables
    /// are not parameter values).
    UnsupportedValue {
        /// The module namespace.
        module: String,
        /// The offending key.
        key: String,
    },
}

impl fmt::Display for ParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "parameter file: {e}"),
            Self::UnsupportedValue { module, key } => {
                write!(f, "parameter {module}.{key} must be a scalar value")
            }
        }
    }
}

impl Error for ParamsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::UnsupportedValue { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        [run]
        particle_mass = 0.0005
        on_tree_error = "abort"

        [cosmology]
        omega_m = 0.25
        omega_lambda = 0.75
        hubble_h = 0.73

        [snapshots]
        redshifts = [3.0, 1.0, 0.0]

        [memory]
        galaxy_state = 1048576

        [modules]
        enabled = ["infall", "cooling"]

        [modules.cooling]
        efficiency = 0.4
        verbose = true

        [modules.infall]
        baryon_fraction = 0.16
    "#;

    #[test]
    fn full_document_parses() {
        let params = RunParameters::from_toml_str(EXAMPLE).unwrap();
        assert_eq!(params.run.particle_mass, 0.0005);
        assert_eq!(params.run.on_tree_error, ErrorPolicy::Abort);
        assert_eq!(params.snapshots.redshifts, vec![3.0, 1.0, 0.0]);
        assert_eq!(params.active_modules(), ["infall", "cooling"]);
    }

    #[test]
    fn module_parameters_answer_through_parameter_source() {
        let params = RunParameters::from_toml_str(EXAMPLE).unwrap();
        assert!(params.is_active("cooling"));
        assert!(!params.is_active("star_formation"));
        assert_eq!(
            params.parameter_f64("cooling", "efficiency", 0.5).unwrap(),
            0.4
        );
        assert!(params.parameter_bool("cooling", "verbose", false).unwrap());
        assert_eq!(
            params
                .parameter_f64("infall", "baryon_fraction", 0.17)
                .unwrap(),
            0.16
        );
        // Absent keys fall back to the caller's default.
        assert_eq!(params.parameter_f64("cooling", "absent", 9.0).unwrap(), 9.0);
    }

    #[test]
    fn memory_caps_become_a_region_budget() {
        let params = RunParameters::from_toml_str(EXAMPLE).unwrap();
        let budget = params.memory.budget();
        assert_eq!(budget.cap(AllocCategory::GalaxyState), Some(1_048_576));
        assert_eq!(budget.cap(AllocCategory::HaloWorking), None);
    }

    #[test]
    fn minimal_document_uses_defaults() {
        let params = RunParameters::from_toml_str(
            r#"
            [cosmology]
            omega_m = 1.0
            omega_lambda = 0.0
            hubble_h = 1.0

            [snapshots]
            redshifts = [1.0, 0.0]
            "#,
        )
        .unwrap();
        assert_eq!(params.run.on_tree_error, ErrorPolicy::Continue);
        assert!(params.active_modules().is_empty());
    }

    #[test]
    fn array_valued_module_parameter_is_rejected() {
        let err = RunParameters::from_toml_str(
            r#"
            [cosmology]
            omega_m = 1.0
            omega_lambda = 0.0
            hubble_h = 1.0

            [snapshots]
            redshifts = [1.0, 0.0]

            [modules.cooling]
            table = [1, 2]
            "#,
        )
        .unwrap_err();
        match err {
            ParamsError::UnsupportedValue { module, key } => {
                assert_eq!(module, "cooling");
                assert_eq!(key, "table");
            }
            other => panic!("expected UnsupportedValue, got {other:?}"),
        }
    }

    #[test]
    fn unknown_top_level_section_is_rejected() {
        let err = RunParameters::from_toml_str(
            r#"
            [cosmology]
            omega_m = 1.0
            omega_lambda = 0.0
            hubble_h = 1.0

            [snapshots]
            redshifts = [1.0, 0.0]

            [plotting]
            style = "dark"
            "#,
        );
        assert!(matches!(err, Err(ParamsError::Parse(_))));
    }
}
