//! Connection manager configuration.

use crate::purify::PurType;
use qrep_types::{NodeAddr, SimTime};
use thiserror::Error;

/// Configuration-time errors. These terminate the simulation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown purification type: {0}")]
    UnknownPurificationType(String),
}

/// Node-local connection manager parameters.
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    pub address: NodeAddr,
    pub total_number_of_qnics: i32,
    /// Use the simultaneous entanglement-swapping plan.
    pub simultaneous_es_enabled: bool,
    /// Insert purification into synthesized plans (deprecated plan only).
    pub entanglement_swapping_with_purification: bool,
    pub num_remote_purification: i32,
    /// Fidelity threshold for accepting resources.
    pub threshold_fidelity: f64,
    pub purification_type_cm: String,
    /// Pacing of request-relay retries on a busy interface.
    pub request_retry_interval: SimTime,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            address: NodeAddr(0),
            total_number_of_qnics: 1,
            simultaneous_es_enabled: false,
            entanglement_swapping_with_purification: false,
            num_remote_purification: 1,
            threshold_fidelity: 0.0,
            purification_type_cm: "SINGLE_SELECTION_X_PURIFICATION".to_string(),
            request_retry_interval: SimTime::from_millis(10),
        }
    }
}

impl ConnectionManagerConfig {
    /// Parse and validate the configured purification type.
    pub fn purification_type(&self) -> Result<PurType, ConfigError> {
        match PurType::parse(&self.purification_type_cm) {
            PurType::Invalid => Err(ConfigError::UnknownPurificationType(
                self.purification_type_cm.clone(),
            )),
            parsed => Ok(parsed),
        }
    }
}
