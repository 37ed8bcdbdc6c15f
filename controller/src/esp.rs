use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        adc::{
            attenuation::DB_11,
            oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
            ADC1,
        },
        gpio::{Gpio17, Gpio4},
        ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution, CHANNEL0, TIMER0},
        modem::Modem,
        prelude::Peripherals,
        units::Hertz,
    },
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    timer::EspTaskTimerService,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use serde::Serialize;

use fancontrol_common::{render_page, FanCommand, FanEngine, NetworkConfig, RuntimeConfig};

const NVS_NAMESPACE: &str = "fancontrol";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const HTTP_STACK_SIZE: usize = 8 * 1024;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

struct FanState {
    engine: FanEngine,
    hardware: FanHardware,
}

struct FanHardware {
    pwm: LedcDriver<'static>,
    pot: AdcChannelDriver<'static, Gpio4, AdcDriver<'static, ADC1>>,
}

impl FanHardware {
    fn new(
        ledc_timer: TIMER0,
        ledc_channel: CHANNEL0,
        pwm_pin: Gpio17,
        adc: ADC1,
        pot_pin: Gpio4,
        pwm_freq_hz: u32,
    ) -> anyhow::Result<Self> {
        let timer_config = TimerConfig::default()
            .frequency(Hertz(pwm_freq_hz))
            .resolution(Resolution::Bits13);
        let timer =
            LedcTimerDriver::new(ledc_timer, &timer_config).context("ledc timer init failed")?;
        let pwm =
            LedcDriver::new(ledc_channel, timer, pwm_pin).context("ledc channel init failed")?;

        let adc = AdcDriver::new(adc).context("adc init failed")?;
        let adc_config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let pot = AdcChannelDriver::new(adc, pot_pin, &adc_config)
            .context("adc channel init failed")?;

        Ok(Self { pwm, pot })
    }

    // widen the 12-bit conversion into the engine's 16-bit sample domain
    fn read_pot_raw(&mut self) -> anyhow::Result<u16> {
        let raw = self.pot.read().context("pot read failed")?;
        Ok(raw.saturating_mul(16))
    }

    fn drive_duty(&mut self, duty: u16) -> anyhow::Result<()> {
        let scaled = u32::from(duty) * self.pwm.get_max_duty() / u32::from(u16::MAX);
        self.pwm
            .set_duty(scaled)
            .with_context(|| format!("pwm write of duty {duty} failed"))?;
        Ok(())
    }
}

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 1024];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    if let Err(err) = run_controller() {
        let delay_ms = RuntimeConfig::default().fan.restart_delay_ms;
        warn!("controller fault: {err:#}; restarting device in {delay_ms}ms");
        thread::sleep(Duration::from_millis(delay_ms));
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    Ok(())
}

fn run_controller() -> anyhow::Result<()> {
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    runtime.fan.sanitize();
    ensure_wifi_defaults(&mut runtime);

    info!(
        "NVS config loaded: ssid=`{}`, override={}%, sample_interval={}ms",
        runtime.network.wifi_ssid, runtime.fan.override_percent, runtime.fan.sample_interval_ms,
    );

    let Peripherals {
        modem,
        ledc,
        adc1,
        pins,
        ..
    } = Peripherals::take()?;

    let wifi = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;
    info!("wifi connected");

    let mut hardware = FanHardware::new(
        ledc.timer0,
        ledc.channel0,
        pins.gpio17,
        adc1,
        pins.gpio4,
        runtime.fan.pwm_freq_hz,
    )?;
    hardware.drive_duty(0).context("failed to park motor at startup")?;

    let shared = Arc::new(Mutex::new(FanState {
        engine: FanEngine::new(runtime.fan.clone()),
        hardware,
    }));

    let timer_service = EspTaskTimerService::new()?;
    let sampler = {
        let shared = shared.clone();
        timer_service.timer(move || sample_tick(&shared))?
    };
    sampler.every(Duration::from_millis(runtime.fan.sample_interval_ms))?;

    let server = create_http_server(shared)?;
    info!("fan controller listening on port 80");

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;
    let _sampler = sampler;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn sample_tick(shared: &Arc<Mutex<FanState>>) {
    let mut state = shared.lock().unwrap();
    let FanState { engine, hardware } = &mut *state;

    let raw = match hardware.read_pot_raw() {
        Ok(raw) => raw,
        Err(err) => {
            warn!("pot read failed on tick: {err:#}");
            return;
        }
    };

    if let Some(duty) = engine.tick(raw) {
        info!("Manual Mode: {}%", engine.current_percent());
        if let Err(err) = hardware.drive_duty(duty) {
            warn!("pwm write failed on tick: {err:#}");
        }
    }
}

fn apply_and_render(shared: &Arc<Mutex<FanState>>, command: Option<FanCommand>) -> String {
    let mut state = shared.lock().unwrap();
    let FanState { engine, hardware } = &mut *state;

    if let Some(command) = command {
        let raw = hardware.read_pot_raw().unwrap_or_else(|err| {
            warn!("pot read failed during transition: {err:#}");
            0
        });
        let duty = engine.apply_command(command, raw);
        info!(
            "{} Mode: {}%",
            engine.mode().as_str(),
            engine.current_percent()
        );
        if let Err(err) = hardware.drive_duty(duty) {
            warn!(
                "pwm write failed after {} transition: {err:#}",
                engine.mode().as_str()
            );
        }
    }

    render_page(engine.mode(), engine.current_percent())
}

fn create_http_server(shared: Arc<Mutex<FanState>>) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: HTTP_STACK_SIZE,
        uri_match_wildcard: true,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    {
        let shared = shared.clone();
        server.fn_handler::<anyhow::Error, _>("/api/status", Method::Get, move |req| {
            let status = shared.lock().unwrap().engine.status();
            write_json(req, &status)
        })?;
    }

    {
        let shared = shared.clone();
        server.fn_handler::<anyhow::Error, _>("/*", Method::Get, move |req| {
            let command = FanCommand::from_path(req.uri());
            let page = apply_and_render(&shared, command);
            write_html(req, &page)
        })?;
    }

    Ok(server)
}

fn write_html(
    req: esp_idf_svc::http::server::Request<&mut esp_idf_svc::http::server::EspHttpConnection<'_>>,
    page: &str,
) -> anyhow::Result<()> {
    req.into_response(200, Some("OK"), &[("Content-Type", "text/html; charset=utf-8")])?
        .write_all(page.as_bytes())?;
    Ok(())
}

fn write_json<T: Serialize>(
    req: esp_idf_svc::http::server::Request<&mut esp_idf_svc::http::server::EspHttpConnection<'_>>,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(
        200,
        Some("OK"),
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    if network.wifi_ssid.trim().is_empty() {
        bail!("wifi credentials not provisioned; set WIFI_SSID/WIFI_PASS or write them to NVS");
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect() {
            Ok(()) => match wifi.wait_netif_up() {
                Ok(()) => {
                    info!("wifi connected and netif up on attempt {attempt}");
                    last_err = None;
                    break;
                }
                Err(err) => {
                    warn!("wifi netif up failed on attempt {attempt}: {err:#}");
                    last_err = Some(err);
                }
            },
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    match last_err {
        None => Ok(esp_wifi),
        Some(err) => Err(anyhow!(
            "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed: {err}"
        )),
    }
}
