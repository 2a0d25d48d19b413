//! Purification protocol identifiers.

use std::fmt;
use std::str::FromStr;

/// Purification protocol selected by configuration.
///
/// The string set is fixed; anything unrecognized maps to `Invalid`, which
/// is a configuration error when encountered at node initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PurType {
    Invalid,
    SingleSelectionX,
    SingleSelectionY,
    SingleSelectionZ,
    SingleSelectionXz,
    SingleSelectionZx,
    DoubleSelectionX,
    DoubleSelectionZ,
    DoubleSelectionXz,
    DoubleSelectionZx,
    DoubleSelectionXWithSingleSelectionZ,
    DoubleSelectionZWithSingleSelectionX,
}

impl PurType {
    pub fn parse(value: &str) -> Self {
        match value {
            "SINGLE_SELECTION_X_PURIFICATION" => PurType::SingleSelectionX,
            "SINGLE_SELECTION_Y_PURIFICATION" => PurType::SingleSelectionY,
            "SINGLE_SELECTION_Z_PURIFICATION" => PurType::SingleSelectionZ,
            "SINGLE_SELECTION_XZ_PURIFICATION" => PurType::SingleSelectionXz,
            "SINGLE_SELECTION_ZX_PURIFICATION" => PurType::SingleSelectionZx,
            "DOUBLE_SELECTION_X_PURIFICATION" => PurType::DoubleSelectionX,
            "DOUBLE_SELECTION_Z_PURIFICATION" => PurType::DoubleSelectionZ,
            "DOUBLE_SELECTION_XZ_PURIFICATION" => PurType::DoubleSelectionXz,
            "DOUBLE_SELECTION_ZX_PURIFICATION" => PurType::DoubleSelectionZx,
            "DOUBLE_SELECTION_X_PURIFICATION_SINGLE_SELECTION_Z_PURIFICATION" => {
                PurType::DoubleSelectionXWithSingleSelectionZ
            }
            "DOUBLE_SELECTION_Z_PURIFICATION_SINGLE_SELECTION_X_PURIFICATION" => {
                PurType::DoubleSelectionZWithSingleSelectionX
            }
            _ => PurType::Invalid,
        }
    }
}

impl FromStr for PurType {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(value))
    }
}

impl fmt::Display for PurType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PurType::Invalid => "INVALID",
            PurType::SingleSelectionX => "SINGLE_SELECTION_X_PURIFICATION",
            PurType::SingleSelectionY => "SINGLE_SELECTION_Y_PURIFICATION",
            PurType::SingleSelectionZ => "SINGLE_SELECTION_Z_PURIFICATION",
            PurType::SingleSelectionXz => "SINGLE_SELECTION_XZ_PURIFICATION",
            PurType::SingleSelectionZx => "SINGLE_SELECTION_ZX_PURIFICATION",
            PurType::DoubleSelectionX => "DOUBLE_SELECTION_X_PURIFICATION",
            PurType::DoubleSelectionZ => "DOUBLE_SELECTION_Z_PURIFICATION",
            PurType::DoubleSelectionXz => "DOUBLE_SELECTION_XZ_PURIFICATION",
            PurType::DoubleSelectionZx => "DOUBLE_SELECTION_ZX_PURIFICATION",
            PurType::DoubleSelectionXWithSingleSelectionZ => {
                "DOUBLE_SELECTION_X_PURIFICATION_SINGLE_SELECTION_Z_PURIFICATION"
            }
            PurType::DoubleSelectionZWithSingleSelectionX => {
                "DOUBLE_SELECTION_Z_PURIFICATION_SINGLE_SELECTION_X_PURIFICATION"
            }
        };
        f.write_str(s)
    }
}
