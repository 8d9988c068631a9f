//! Application state for the StylesSync server
//!
//! Models are loaded once at startup and never mutated afterwards. A model
//! that fails to load stays `None` and its endpoint reports 503.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use stylesync_ai::backend::{default_device, DefaultBackend};
use stylesync_ai::inference::SkinTonePredictor;
use stylesync_ai::sizing::TrainedSizeModel;

pub type Predictor = SkinTonePredictor<DefaultBackend>;

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Best skin-tone checkpoint written by `stylesync train`
    pub skin_tone_checkpoint: PathBuf,
    /// Size model written by `stylesync train-size`
    pub size_model: PathBuf,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            skin_tone_checkpoint: PathBuf::from("models/best_skin_tone_model.json"),
            size_model: PathBuf::from("models/size_model.json"),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Loaded skin-tone predictor; handlers clone it out of the lock
    skin_tone: Option<Mutex<Predictor>>,
    /// Loaded size model
    size: Option<TrainedSizeModel>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(skin_tone: Option<Predictor>, size: Option<TrainedSizeModel>) -> Self {
        Self {
            skin_tone: skin_tone.map(Mutex::new),
            size,
            started_at: Instant::now(),
        }
    }

    /// Load both models, logging (not failing) on error
    pub fn load(config: &ServerConfig) -> Self {
        let skin_tone = match Predictor::from_checkpoint(&config.skin_tone_checkpoint, default_device()) {
            Ok(predictor) => {
                info!(
                    "Skin-tone model loaded from {:?} ({} classes)",
                    config.skin_tone_checkpoint,
                    predictor.class_names().len()
                );
                Some(predictor)
            }
            Err(e) => {
                error!(
                    "Skin-tone model unavailable, failed to load {:?}: {}",
                    config.skin_tone_checkpoint, e
                );
                None
            }
        };

        let size = match TrainedSizeModel::load(&config.size_model) {
            Ok(model) => {
                info!(
                    "Size model loaded from {:?} ({} encoded columns)",
                    config.size_model,
                    model.schema.width()
                );
                Some(model)
            }
            Err(e) => {
                error!("Size model unavailable, failed to load {:?}: {}", config.size_model, e);
                None
            }
        };

        if skin_tone.is_none() && size.is_none() {
            warn!("No models loaded; only /health will succeed");
        }
        Self::new(skin_tone, size)
    }

    /// A private copy of the skin-tone predictor for one request
    pub fn skin_tone_predictor(&self) -> Option<Predictor> {
        let lock = self.skin_tone.as_ref()?;
        let guard = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(guard.clone())
    }

    pub fn size_model(&self) -> Option<&TrainedSizeModel> {
        self.size.as_ref()
    }

    pub fn skin_tone_loaded(&self) -> bool {
        self.skin_tone.is_some()
    }

    pub fn size_loaded(&self) -> bool {
        self.size.is_some()
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
