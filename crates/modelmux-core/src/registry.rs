//! Model Registry (L2, §4.2): an in-memory catalog loaded from a
//! declarative manifest, read-mostly with atomic reload.

use crate::error::ConfigurationError;
use crate::types::{CapabilityFlag, Maturity, ModelCapability, Provider};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Top-level shape of a registry manifest (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub models: Vec<ModelCapability>,
}

impl Manifest {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let manifest: Manifest =
            serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::Manifest {
                reason: format!("invalid YAML: {e}"),
            })?;
        validate(&manifest)?;
        Ok(manifest)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigurationError> {
        serde_yaml::to_string(self).map_err(|e| ConfigurationError::Manifest {
            reason: format!("failed to serialize manifest: {e}"),
        })
    }
}

fn validate(manifest: &Manifest) -> Result<(), ConfigurationError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for model in &manifest.models {
        if !seen.insert(model.id.as_str()) {
            return Err(ConfigurationError::Manifest {
                reason: format!("duplicate model id '{}'", model.id),
            });
        }
        if model.context_window == 0 {
            return Err(ConfigurationError::Manifest {
                reason: format!("model '{}' has non-positive context_window", model.id),
            });
        }
        if model.input_cost_per_1k < 0.0 || model.output_cost_per_1k < 0.0 {
            return Err(ConfigurationError::Manifest {
                reason: format!("model '{}' has a negative cost field", model.id),
            });
        }
    }
    Ok(())
}

/// Optional restriction applied by `ModelRegistry::list` (§4.2).
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub provider: Option<Provider>,
    pub capability: Option<CapabilityFlag>,
    pub maturity: Option<Maturity>,
    pub available_only: bool,
}

impl ListFilter {
    pub fn available() -> Self {
        Self {
            available_only: true,
            ..Default::default()
        }
    }

    fn matches(&self, model: &ModelCapability) -> bool {
        if let Some(provider) = self.provider {
            if model.provider != provider {
                return false;
            }
        }
        if let Some(flag) = self.capability {
            if !model.has(flag) {
                return false;
            }
        }
        if let Some(maturity) = self.maturity {
            if model.maturity != maturity {
                return false;
            }
        }
        if self.available_only && !model.available {
            return false;
        }
        true
    }
}

/// Read-mostly catalog. `reload` performs an atomic snapshot swap: in-flight
/// lookups continue to see the snapshot they started with, never a torn
/// state (§4.2 invariant, §5 shared-resource policy).
pub struct ModelRegistry {
    snapshot: RwLock<Arc<Vec<ModelCapability>>>,
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelCapability>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(models)),
        }
    }

    pub fn from_manifest(manifest: Manifest) -> Self {
        Self::new(manifest.models)
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Current snapshot. Cheap: an `Arc` clone, not a copy of the catalog.
    pub fn snapshot(&self) -> Arc<Vec<ModelCapability>> {
        self.snapshot.read().expect("registry lock poisoned").clone()
    }

    pub fn get(&self, id: &str) -> Option<ModelCapability> {
        self.snapshot().iter().find(|m| m.id == id).cloned()
    }

    pub fn list(&self, filter: &ListFilter) -> Vec<ModelCapability> {
        self.snapshot()
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Atomically replace the catalog. Either fully succeeds (manifest is
    /// valid) or leaves the previous snapshot untouched.
    pub fn reload(&self, manifest: Manifest) -> Result<(), ConfigurationError> {
        validate(&manifest)?;
        let mut guard = self.snapshot.write().expect("registry lock poisoned");
        *guard = Arc::new(manifest.models);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelScores;

    fn model(id: &str, available: bool) -> ModelCapability {
        ModelCapability {
            id: id.to_string(),
            provider: Provider::Openai,
            api_name: id.to_string(),
            context_window: 8192,
            input_cost_per_1k: 0.001,
            output_cost_per_1k: 0.002,
            scores: ModelScores::default(),
            capabilities: vec![],
            maturity: Maturity::Stable,
            available,
        }
    }

    #[test]
    fn duplicate_ids_rejected() {
        let yaml = r#"
version: "1"
models:
  - id: m1
    provider: openai
    api_name: m1
    context_window: 8192
    input_cost_per_1k: 0.001
    output_cost_per_1k: 0.002
    scores: { reasoning: 50, coding: 50, speed: 50, accuracy: 50 }
    maturity: stable
  - id: m1
    provider: openai
    api_name: m1-dup
    context_window: 8192
    input_cost_per_1k: 0.001
    output_cost_per_1k: 0.002
    scores: { reasoning: 50, coding: 50, speed: 50, accuracy: 50 }
    maturity: stable
"#;
        assert!(Manifest::from_yaml(yaml).is_err());
    }

    #[test]
    fn list_available_only_filters_unavailable_models() {
        let registry = ModelRegistry::new(vec![model("a", true), model("b", false)]);
        let available = registry.list(&ListFilter::available());
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "a");
    }

    #[test]
    fn reload_swaps_atomically_and_old_snapshot_stays_valid() {
        let registry = ModelRegistry::new(vec![model("a", true)]);
        let old_snapshot = registry.snapshot();
        registry
            .reload(Manifest {
                version: "2".into(),
                models: vec![model("b", true)],
            })
            .unwrap();
        assert_eq!(old_snapshot.len(), 1);
        assert_eq!(old_snapshot[0].id, "a");
        assert!(registry.get("b").is_some());
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn invalid_reload_leaves_previous_snapshot_intact() {
        let registry = ModelRegistry::new(vec![model("a", true)]);
        let bad = Manifest {
            version: "2".into(),
            models: vec![model("dup", true), model("dup", true)],
        };
        assert!(registry.reload(bad).is_err());
        assert!(registry.get("a").is_some());
    }

    #[test]
    fn empty_registry_reports_empty() {
        assert!(ModelRegistry::empty().is_empty());
    }
}
