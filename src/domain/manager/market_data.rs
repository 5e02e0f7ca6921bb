//! Market-data manager: field transformations applied before rule evaluation.

use std::collections::{BTreeMap, VecDeque};

use crate::domain::manager::MarketDataManager;
use crate::domain::market::MarketSnapshot;

/// A derived field written into the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTransform {
    /// Rolling mean of `field` over the trailing `window` snapshots, emitted
    /// as `output` once the window has filled.
    RollingMean {
        field: String,
        window: usize,
        output: String,
    },
    /// `field * factor`, emitted as `output` every date.
    Scale {
        field: String,
        factor: f64,
        output: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataConfig {
    pub transforms: Vec<FieldTransform>,
}

/// Applies the configured transforms, keeping per-field rolling buffers
/// across dates within one run.
pub struct TransformManager {
    config: MarketDataConfig,
    buffers: BTreeMap<String, VecDeque<f64>>,
}

impl TransformManager {
    pub fn new(config: MarketDataConfig) -> Self {
        TransformManager {
            config,
            buffers: BTreeMap::new(),
        }
    }
}

impl MarketDataManager for TransformManager {
    fn shape(&mut self, snapshot: &mut MarketSnapshot) {
        for transform in &self.config.transforms {
            match transform {
                FieldTransform::RollingMean {
                    field,
                    window,
                    output,
                } => {
                    let Some(value) = snapshot.value(field) else {
                        continue;
                    };
                    let buffer = self.buffers.entry(output.clone()).or_default();
                    buffer.push_back(value);
                    if buffer.len() > *window {
                        buffer.pop_front();
                    }
                    if buffer.len() == *window {
                        let mean = buffer.iter().sum::<f64>() / *window as f64;
                        snapshot.set_value(output, mean);
                    }
                }
                FieldTransform::Scale {
                    field,
                    factor,
                    output,
                } => {
                    if let Some(value) = snapshot.value(field) {
                        snapshot.set_value(output, value * factor);
                    }
                }
            }
        }
    }
}
