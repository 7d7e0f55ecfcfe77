//! Application bootstrap wiring tasks and the datastore together.

use crate::config::AortaConfig;
use crate::core::datastore::LocalDatastore;
use crate::core::traits::{InferTask, TrainTask};
use crate::core::SegResult;
use crate::tasks::AortaSegmentation;
use crate::utils::{parse_spatial_size, strtobool};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Label application for aortic CT segmentation.
///
/// Owns the static configuration and the directory layout, and builds the
/// task registry on demand. Construction is side-effect free; the model is
/// only touched when a task is preloaded or first serves a request.
///
/// Recognized `conf` keys:
/// - `preload`: load the model at registration time (`strtobool` values).
/// - `spatial_size`: override the inference window, e.g. `96,96,96`.
/// - `use_pretrained_model`: accepted for compatibility, currently unused
///   because the bundled model is the only one wired up.
pub struct AortaApp {
    app_dir: PathBuf,
    studies: PathBuf,
    conf: HashMap<String, String>,
    model_dir: PathBuf,
    name: String,
    description: String,
    version: String,
    config: Arc<AortaConfig>,
}

impl std::fmt::Debug for AortaApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AortaApp")
            .field("app_dir", &self.app_dir)
            .field("studies", &self.studies)
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

impl AortaApp {
    pub fn new(
        app_dir: impl Into<PathBuf>,
        studies: impl Into<PathBuf>,
        conf: HashMap<String, String>,
    ) -> SegResult<Self> {
        let app_dir = app_dir.into();
        let config = Arc::new(AortaConfig::default());
        config.validate()?;
        let model_dir = app_dir.join("models");
        Ok(Self {
            app_dir,
            studies: studies.into(),
            conf,
            model_dir,
            name: "Aortic Segmentation - Generic".to_string(),
            description: "Segmentation of aortic structures from CT images".to_string(),
            version: "1.0.0".to_string(),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn config(&self) -> &Arc<AortaConfig> {
        &self.config
    }

    /// Builds the inference task registry.
    ///
    /// Registers `aorta_segmentation` against `<app_dir>/models/model.onnx`.
    /// Honors `spatial_size` and `preload` from the configuration map; a
    /// preload failure is reported instead of deferring to the first request.
    pub fn init_infers(&self) -> SegResult<BTreeMap<String, Arc<dyn InferTask>>> {
        let model_path = self.model_dir.join("model.onnx");
        let mut task = AortaSegmentation::new(&model_path, self.config.clone());

        if let Some(value) = self.conf.get("spatial_size") {
            task = task.with_roi_size(parse_spatial_size(value)?);
        }
        if self.conf.get("preload").map(|v| strtobool(v)).unwrap_or(false) {
            task = task.preload()?;
        }

        info!(
            model = %model_path.display(),
            valid = task.is_valid(),
            "registered inference task aorta_segmentation"
        );
        let mut infers: BTreeMap<String, Arc<dyn InferTask>> = BTreeMap::new();
        infers.insert("aorta_segmentation".to_string(), Arc::new(task));
        Ok(infers)
    }

    /// No training workflow is wired up; the registry stays empty.
    pub fn init_trainers(&self) -> BTreeMap<String, Arc<dyn TrainTask>> {
        BTreeMap::new()
    }

    pub fn init_datastore(&self) -> LocalDatastore {
        LocalDatastore::new(&self.studies)
    }
}
