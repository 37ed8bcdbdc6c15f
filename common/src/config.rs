use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanConfig {
    pub override_percent: u8,
    pub sample_interval_ms: u64,
    pub pwm_freq_hz: u32,
    pub restart_delay_ms: u64,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            override_percent: 100,
            sample_interval_ms: 1_000,
            pwm_freq_hz: 1_000,
            restart_delay_ms: 1_000,
        }
    }
}

impl FanConfig {
    pub fn sanitize(&mut self) {
        if self.override_percent > 100 {
            self.override_percent = 100;
        }
        if self.sample_interval_ms == 0 {
            self.sample_interval_ms = 1_000;
        }
        if self.pwm_freq_hz == 0 {
            self.pwm_freq_hz = 1_000;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub fan: FanConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}
