//! Best-model checkpoint.
//!
//! A checkpoint is one JSON document: run metadata, the validation metrics of
//! the saved epoch, and the model parameters plus optimizer state encoded as
//! base64 burn records. Writes go to a sibling temp file that is synced and
//! renamed over the target, so a reader never sees a partial file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use burn::prelude::*;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Record, Recorder};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::cnn::{SkinToneClassifier, SkinToneClassifierConfig};
use crate::utils::error::{Result, StyleSyncError};
use crate::utils::metrics::Metrics;

/// Current on-disk layout
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Checkpoint containing model and training state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    /// Epoch (0-indexed) the parameters come from
    pub epoch: usize,
    pub best_weighted_f1: f64,
    /// Class weights derived from the training partition
    pub class_weights: Vec<f64>,
    pub class_names: Vec<String>,
    pub image_size: usize,
    pub architecture: SkinToneClassifierConfig,
    pub validation_metrics: Metrics,
    /// Base64 of the model record
    pub model_state: String,
    /// Base64 of the optimizer record
    pub optimizer_state: Option<String>,
    /// RFC 3339 save time
    pub saved_at: String,
}

/// Serialize a burn record to base64
pub fn encode_record<B: Backend, R: Record<B>>(record: R) -> Result<String> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let bytes = Recorder::<B>::record(&recorder, record, ())?;
    Ok(BASE64.encode(bytes))
}

/// Rebuild a burn record from base64
pub fn decode_record<B: Backend, R: Record<B>>(encoded: &str, device: &B::Device) -> Result<R> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| StyleSyncError::Checkpoint(format!("invalid base64 record: {e}")))?;
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    Ok(Recorder::<B>::load(&recorder, bytes, device)?)
}

impl Checkpoint {
    /// Snapshot `model` with its run metadata
    #[allow(clippy::too_many_arguments)]
    pub fn capture<B: Backend>(
        model: &SkinToneClassifier<B>,
        architecture: &SkinToneClassifierConfig,
        optimizer_state: Option<String>,
        epoch: usize,
        best_weighted_f1: f64,
        class_weights: &[f64],
        class_names: &[String],
        validation_metrics: &Metrics,
    ) -> Result<Self> {
        let model_state = encode_record::<B, _>(model.clone().into_record())?;

        Ok(Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            epoch,
            best_weighted_f1,
            class_weights: class_weights.to_vec(),
            class_names: class_names.to_vec(),
            image_size: architecture.input_size,
            architecture: architecture.clone(),
            validation_metrics: validation_metrics.clone(),
            model_state,
            optimizer_state,
            saved_at: Utc::now().to_rfc3339(),
        })
    }

    /// Atomically write the checkpoint to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(self)?;
        let tmp = temp_path(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        info!(
            "Checkpoint saved to {:?} (epoch {}, weighted F1 {:.4})",
            path,
            self.epoch + 1,
            self.best_weighted_f1
        );
        Ok(())
    }

    /// Read a checkpoint file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StyleSyncError::PathNotFound(path.to_path_buf()));
        }

        let json = fs::read(path)?;
        let checkpoint: Checkpoint = serde_json::from_slice(&json)
            .map_err(|e| StyleSyncError::Checkpoint(format!("unreadable checkpoint {path:?}: {e}")))?;

        if checkpoint.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(StyleSyncError::Checkpoint(format!(
                "unsupported checkpoint format {} (expected {})",
                checkpoint.format_version, CHECKPOINT_FORMAT_VERSION
            )));
        }
        if checkpoint.class_names.len() != checkpoint.architecture.num_classes {
            return Err(StyleSyncError::Checkpoint(format!(
                "{} class names for a {}-class model",
                checkpoint.class_names.len(),
                checkpoint.architecture.num_classes
            )));
        }

        debug!("Checkpoint loaded from {:?}", path);
        Ok(checkpoint)
    }

    /// Rebuild the model; the optimizer state is not touched
    pub fn load_model<B: Backend>(&self, device: &B::Device) -> Result<SkinToneClassifier<B>> {
        let record = decode_record::<B, _>(&self.model_state, device)?;
        Ok(self.architecture.init::<B>(device).load_record(record))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
