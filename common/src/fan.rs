use crate::{
    config::FanConfig,
    duty::{percent_to_duty, sample_to_percent},
    types::{ControllerStatus, FanCommand, FanMode},
};

#[derive(Debug, Clone)]
pub struct FanEngine {
    config: FanConfig,
    mode: FanMode,
    current_percent: u8,
}

impl FanEngine {
    pub fn new(config: FanConfig) -> Self {
        Self {
            config,
            mode: FanMode::Manual,
            current_percent: 0,
        }
    }

    pub fn mode(&self) -> FanMode {
        self.mode
    }

    pub fn current_percent(&self) -> u8 {
        self.current_percent
    }

    pub fn apply_command(&mut self, command: FanCommand, raw_sample: u16) -> u16 {
        match command {
            FanCommand::SetOverride => self.set_override(),
            FanCommand::SetManual => self.set_manual(raw_sample),
            FanCommand::SetOff => self.set_off(),
        }
    }

    pub fn set_override(&mut self) -> u16 {
        self.mode = FanMode::Override;
        self.current_percent = self.config.override_percent;
        percent_to_duty(self.current_percent)
    }

    pub fn set_manual(&mut self, raw_sample: u16) -> u16 {
        self.mode = FanMode::Manual;
        self.current_percent = sample_to_percent(raw_sample);
        percent_to_duty(self.current_percent)
    }

    pub fn set_off(&mut self) -> u16 {
        self.mode = FanMode::Off;
        self.current_percent = 0;
        0
    }

    pub fn tick(&mut self, raw_sample: u16) -> Option<u16> {
        if self.mode != FanMode::Manual {
            return None;
        }
        self.current_percent = sample_to_percent(raw_sample);
        Some(percent_to_duty(self.current_percent))
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            mode: self.mode.as_str(),
            percent: self.current_percent,
            duty: percent_to_duty(self.current_percent),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use super::*;

    fn engine() -> FanEngine {
        FanEngine::new(FanConfig::default())
    }

    #[test]
    fn starts_in_manual_at_zero() {
        let engine = engine();
        assert_eq!(engine.mode(), FanMode::Manual);
        assert_eq!(engine.current_percent(), 0);
    }

    #[test]
    fn off_command_zeroes_output() {
        let mut engine = engine();
        let duty = engine.apply_command(FanCommand::SetOff, 40_000);
        assert_eq!(engine.mode(), FanMode::Off);
        assert_eq!(engine.current_percent(), 0);
        assert_eq!(duty, 0);
    }

    #[test]
    fn override_from_off_drives_full_scale() {
        let mut engine = engine();
        engine.set_off();
        let duty = engine.apply_command(FanCommand::SetOverride, 0);
        assert_eq!(engine.mode(), FanMode::Override);
        assert_eq!(engine.current_percent(), 100);
        assert_eq!(duty, u16::MAX);
    }

    #[test]
    fn manual_command_samples_immediately() {
        let mut engine = engine();
        engine.set_override();
        let duty = engine.apply_command(FanCommand::SetManual, 32767);
        assert_eq!(engine.mode(), FanMode::Manual);
        assert_eq!(engine.current_percent(), 50);
        assert_eq!(duty, 32768);
    }

    #[test]
    fn tick_in_manual_follows_sensor() {
        let mut engine = engine();
        let duty = engine.tick(32767);
        assert_eq!(duty, Some(32768));
        assert_eq!(engine.current_percent(), 50);
    }

    #[test]
    fn tick_outside_manual_is_ignored() {
        let mut engine = engine();
        engine.set_override();
        assert_eq!(engine.tick(123), None);
        assert_eq!(engine.mode(), FanMode::Override);
        assert_eq!(engine.current_percent(), 100);

        engine.set_off();
        assert_eq!(engine.tick(u16::MAX), None);
        assert_eq!(engine.current_percent(), 0);
    }

    #[test]
    fn every_command_reaches_its_target_from_every_mode() {
        let commands = [
            FanCommand::SetOverride,
            FanCommand::SetManual,
            FanCommand::SetOff,
        ];
        for start in commands {
            for command in commands {
                let mut engine = engine();
                engine.apply_command(start, 1_000);
                engine.apply_command(command, 2_000);
                assert_eq!(engine.mode(), command.target_mode());
                let expected = match command {
                    FanCommand::SetOverride => 100,
                    FanCommand::SetManual => sample_to_percent(2_000),
                    FanCommand::SetOff => 0,
                };
                assert_eq!(engine.current_percent(), expected);
            }
        }
    }

    #[test]
    fn repeated_commands_are_idempotent() {
        let commands = [
            FanCommand::SetOverride,
            FanCommand::SetManual,
            FanCommand::SetOff,
        ];
        for command in commands {
            let mut engine = engine();
            engine.apply_command(command, 20_000);
            let first = (engine.mode(), engine.current_percent());
            engine.apply_command(command, 20_000);
            assert_eq!((engine.mode(), engine.current_percent()), first);
        }
    }

    #[test]
    fn unrecognized_request_leaves_state_and_page_unchanged() {
        let mut engine = engine();
        engine.set_manual(20_000);
        let before = (engine.mode(), engine.current_percent());
        let page_before = crate::render::render_page(engine.mode(), engine.current_percent());

        let command = FanCommand::from_path("/favicon.ico");
        assert_eq!(command, None);
        if let Some(command) = command {
            engine.apply_command(command, 60_000);
        }

        assert_eq!((engine.mode(), engine.current_percent()), before);
        assert_eq!(
            crate::render::render_page(engine.mode(), engine.current_percent()),
            page_before
        );
    }

    #[test]
    fn status_reflects_mode_and_percent() {
        let mut engine = engine();
        engine.set_override();
        let status = engine.status();
        assert_eq!(status.mode, "Override");
        assert_eq!(status.percent, 100);
        assert_eq!(status.duty, u16::MAX);
    }

    #[test]
    fn ticks_never_tear_command_transitions() {
        let shared = Arc::new(Mutex::new(engine()));
        let override_percent = FanConfig::default().override_percent;

        let sampler = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for raw in (0..4_000_u16).map(|n| n.wrapping_mul(17)) {
                    let mut engine = shared.lock().unwrap();
                    let _ = engine.tick(raw);
                }
            })
        };

        let commands = [
            FanCommand::SetOverride,
            FanCommand::SetOff,
            FanCommand::SetManual,
        ];
        for step in 0..1_500 {
            let command = commands[step % commands.len()];
            let mut engine = shared.lock().unwrap();
            let _ = engine.apply_command(command, 31_000);
            match engine.mode() {
                FanMode::Override => assert_eq!(engine.current_percent(), override_percent),
                FanMode::Off => assert_eq!(engine.current_percent(), 0),
                FanMode::Manual => assert!(engine.current_percent() <= 100),
            }
        }

        sampler.join().unwrap();

        let engine = shared.lock().unwrap();
        match engine.mode() {
            FanMode::Override => assert_eq!(engine.current_percent(), override_percent),
            FanMode::Off => assert_eq!(engine.current_percent(), 0),
            FanMode::Manual => assert!(engine.current_percent() <= 100),
        }
    }
}
