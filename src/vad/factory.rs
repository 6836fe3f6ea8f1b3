use anyhow::Result;
use tracing::info;

use crate::config::VadConfig;

use super::classifier::{
    BandedClassifier, EnergyClassifier, SmoothedEnergyClassifier, SpeechClassifier,
};

/// Factory for speech classifier strategies
pub struct ClassifierFactory;

impl ClassifierFactory {
    /// Create a classifier based on configuration. One instance per session;
    /// classifiers are stateful and must not be shared.
    pub fn create(config: &VadConfig) -> Result<Box<dyn SpeechClassifier>> {
        info!("Initializing speech classifier: {}", config.classifier);

        match config.classifier.as_str() {
            "energy" => {
                let threshold = config.energy.as_ref().map(|c| c.threshold).unwrap_or(0.01);
                Ok(Box::new(EnergyClassifier::new(threshold)))
            }
            "smoothed_energy" => {
                let c = config.smoothed_energy.clone().unwrap_or_default();
                Ok(Box::new(SmoothedEnergyClassifier::new(
                    c.prob_threshold,
                    c.db_threshold,
                    c.smoothing_window,
                )))
            }
            "banded" => {
                let aggressiveness = config
                    .banded
                    .as_ref()
                    .map(|c| c.aggressiveness)
                    .unwrap_or(2);
                if aggressiveness > 3 {
                    return Err(anyhow::anyhow!(
                        "banded classifier aggressiveness must be 0-3, got {}",
                        aggressiveness
                    ));
                }
                Ok(Box::new(BandedClassifier::new(aggressiveness)))
            }
            other => Err(anyhow::anyhow!("Unsupported speech classifier: {}", other)),
        }
    }
}
