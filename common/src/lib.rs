pub mod config;
pub mod duty;
pub mod fan;
pub mod render;
pub mod types;

pub use config::{FanConfig, NetworkConfig, RuntimeConfig};
pub use duty::{percent_to_duty, sample_to_percent};
pub use fan::FanEngine;
pub use render::render_page;
pub use types::{ControllerStatus, DriveError, FanCommand, FanMode};
