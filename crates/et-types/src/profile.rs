//! Hardware presets and search stages.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Total tokens per optimizer step, shared by every profile.
pub const TOTAL_BATCH_SIZE: u32 = 49_152;

/// Named hardware preset that fixes the per-device batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    H100,
    Rtx5090,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Profile::H100, Profile::Rtx5090];

    pub fn device_batch_size(&self) -> u32 {
        match self {
            Self::H100 => 24,
            Self::Rtx5090 => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H100 => "h100",
            Self::Rtx5090 => "rtx5090",
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::H100
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown profile '{s}' (expected one of: h100, rtx5090)"))
    }
}

/// Search phase a trial belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Coarse random search.
    Stage1,
    /// Local perturbation around the stage-1 survivors.
    Stage2,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stage1 => "stage1",
            Self::Stage2 => "stage2",
        }
    }

    /// Trial identifier for the `index`-th (1-based) trial of this stage.
    pub fn trial_id(&self, index: usize) -> String {
        format!("autotune_{}_{index}", self.as_str())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_map_to_distinct_batch_sizes() {
        assert_eq!(Profile::H100.device_batch_size(), 24);
        assert_eq!(Profile::Rtx5090.device_batch_size(), 12);
        assert_eq!(TOTAL_BATCH_SIZE % Profile::H100.device_batch_size(), 0);
        assert_eq!(TOTAL_BATCH_SIZE % Profile::Rtx5090.device_batch_size(), 0);
    }

    #[test]
    fn profile_parses_case_insensitively() {
        assert_eq!("h100".parse::<Profile>().unwrap(), Profile::H100);
        assert_eq!("RTX5090".parse::<Profile>().unwrap(), Profile::Rtx5090);
        assert!("a100".parse::<Profile>().is_err());
    }

    #[test]
    fn profile_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Profile::Rtx5090).unwrap(), "\"rtx5090\"");
    }

    #[test]
    fn stage_labels_and_ids() {
        assert_eq!(Stage::Stage1.to_string(), "stage1");
        assert_eq!(serde_json::to_string(&Stage::Stage2).unwrap(), "\"stage2\"");
        assert_eq!(Stage::Stage1.trial_id(3), "autotune_stage1_3");
    }
}
