use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FanMode {
    Manual,
    Override,
    Off,
}

impl FanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::Override => "Override",
            Self::Off => "Off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanCommand {
    SetOverride,
    SetManual,
    SetOff,
}

impl FanCommand {
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split('?').next().unwrap_or(path);
        match path {
            "/override" => Some(Self::SetOverride),
            "/manual" => Some(Self::SetManual),
            "/off" => Some(Self::SetOff),
            _ => None,
        }
    }

    pub fn target_mode(self) -> FanMode {
        match self {
            Self::SetOverride => FanMode::Override,
            Self::SetManual => FanMode::Manual,
            Self::SetOff => FanMode::Off,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub mode: &'static str,
    pub percent: u8,
    pub duty: u16,
}

#[derive(Debug, Error)]
#[error("pwm write failed: {0}")]
pub struct DriveError(pub String);
