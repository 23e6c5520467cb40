use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::annotate::{ConfidenceGate, DEFAULT_THRESHOLD_PERCENT};
use crate::catalog::{ClassCatalog, DetectionProfile};
use crate::detect::BackendKind;
use crate::ingest::CameraConfig;

const DEFAULT_DB_PATH: &str = "watchpost.db";
const DEFAULT_OUTPUT_DIR: &str = "watchpost_out";
const DEFAULT_FIRE_MODEL: &str = "best.onnx";
const DEFAULT_ANIMAL_MODEL: &str = "main.onnx";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_ALERT_SOUND: &str = "alert.wav";
const DEFAULT_MQTT_BROKER: &str = "127.0.0.1:1883";
const DEFAULT_MQTT_TOPIC: &str = "watchpost/alerts";
const DEFAULT_MQTT_CLIENT_ID: &str = "watchpost";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WatchpostConfigFile {
    db_path: Option<PathBuf>,
    profile: Option<DetectionProfile>,
    threshold: Option<u8>,
    output_dir: Option<PathBuf>,
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    catalog: Option<CatalogConfigFile>,
    notify: Option<NotifyConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    backend: Option<BackendKind>,
    fire_model: Option<PathBuf>,
    animal_model: Option<PathBuf>,
    script: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogConfigFile {
    labels: Vec<String>,
    watched: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct NotifyConfigFile {
    email: Option<EmailConfigFile>,
    sound: Option<SoundConfigFile>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EmailConfigFile {
    user: Option<String>,
    password: Option<String>,
    recipient: Option<String>,
    smtp_server: Option<String>,
    smtp_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SoundConfigFile {
    path: Option<PathBuf>,
    player: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MqttConfigFile {
    broker: Option<String>,
    topic: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WatchpostConfig {
    pub db_path: PathBuf,
    pub profile: DetectionProfile,
    /// Confidence threshold in percent.
    pub threshold: u8,
    pub output_dir: PathBuf,
    pub model: ModelSettings,
    pub camera: CameraConfig,
    /// Replaces the profile's built-in catalog when set.
    pub catalog: Option<CatalogSettings>,
    pub notify: NotifySettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub backend: BackendKind,
    pub fire_model: PathBuf,
    pub animal_model: PathBuf,
    /// Detection script for the scripted backend.
    pub script: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            fire_model: PathBuf::from(DEFAULT_FIRE_MODEL),
            animal_model: PathBuf::from(DEFAULT_ANIMAL_MODEL),
            script: None,
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
        }
    }
}

impl ModelSettings {
    /// Model file for a detection profile.
    pub fn model_path(&self, profile: DetectionProfile) -> &Path {
        match profile {
            DetectionProfile::Fire => &self.fire_model,
            DetectionProfile::Animal => &self.animal_model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    pub labels: Vec<String>,
    /// Defaults to every label.
    pub watched: Option<Vec<String>>,
}

/// Enabled alert transports. A transport left as `None` is not installed.
#[derive(Debug, Clone, Default)]
pub struct NotifySettings {
    pub email: Option<EmailSettings>,
    pub sound: Option<SoundSettings>,
    pub mqtt: Option<MqttSettings>,
}

#[derive(Clone)]
pub struct EmailSettings {
    pub user: String,
    pub password: Zeroizing<String>,
    pub recipient: String,
    pub smtp_server: String,
    pub smtp_port: u16,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: Zeroizing::new(String::new()),
            recipient: String::new(),
            smtp_server: DEFAULT_SMTP_SERVER.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
        }
    }
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("recipient", &self.recipient)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSettings {
    pub path: PathBuf,
    /// Player command, e.g. `aplay -q`. The bell rings when unset.
    pub player: Option<String>,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_ALERT_SOUND),
            player: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub broker: String,
    pub topic: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: DEFAULT_MQTT_BROKER.to_string(),
            topic: DEFAULT_MQTT_TOPIC.to_string(),
            client_id: DEFAULT_MQTT_CLIENT_ID.to_string(),
            username: None,
            password: None,
        }
    }
}

impl fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttSettings")
            .field("broker", &self.broker)
            .field("topic", &self.topic)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for WatchpostConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            profile: DetectionProfile::default(),
            threshold: DEFAULT_THRESHOLD_PERCENT,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            model: ModelSettings::default(),
            camera: CameraConfig::default(),
            catalog: None,
            notify: NotifySettings::default(),
        }
    }
}

impl WatchpostConfig {
    /// Load configuration: optional file named by `WATCHPOST_CONFIG`, then
    /// defaults, then `WATCHPOST_*` environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WATCHPOST_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The confidence gate for the configured threshold.
    pub fn gate(&self) -> Result<ConfidenceGate> {
        ConfidenceGate::from_percent(self.threshold)
    }

    /// The catalog sessions run with: the custom catalog when configured,
    /// otherwise the profile's built-in catalog.
    pub fn catalog(&self) -> Result<ClassCatalog> {
        match &self.catalog {
            Some(custom) => {
                let watched = custom.watched.clone().unwrap_or_else(|| custom.labels.clone());
                ClassCatalog::new(custom.labels.clone(), watched)
            }
            None => Ok(self.profile.catalog()),
        }
    }

    fn from_file(file: WatchpostConfigFile) -> Self {
        let defaults = Self::default();
        let model_file = file.model.unwrap_or_default();
        let model = ModelSettings {
            backend: model_file.backend.unwrap_or(defaults.model.backend),
            fire_model: model_file.fire_model.unwrap_or(defaults.model.fire_model),
            animal_model: model_file
                .animal_model
                .unwrap_or(defaults.model.animal_model),
            script: model_file.script,
            input_width: model_file.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: model_file.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
        };
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            device: camera_file.device.unwrap_or(defaults.camera.device),
            target_fps: camera_file.target_fps.unwrap_or(defaults.camera.target_fps),
            width: camera_file.width.unwrap_or(defaults.camera.width),
            height: camera_file.height.unwrap_or(defaults.camera.height),
        };
        let catalog = file.catalog.map(|catalog| CatalogSettings {
            labels: catalog.labels,
            watched: catalog.watched,
        });
        let notify_file = file.notify.unwrap_or_default();
        let notify = NotifySettings {
            email: notify_file.email.and_then(email_from_file),
            sound: notify_file.sound.map(|sound| SoundSettings {
                path: sound.path.unwrap_or_else(|| PathBuf::from(DEFAULT_ALERT_SOUND)),
                player: sound.player,
            }),
            mqtt: notify_file.mqtt.map(|mqtt| {
                let defaults = MqttSettings::default();
                MqttSettings {
                    broker: mqtt.broker.unwrap_or(defaults.broker),
                    topic: mqtt.topic.unwrap_or(defaults.topic),
                    client_id: mqtt.client_id.unwrap_or(defaults.client_id),
                    username: mqtt.username,
                    password: mqtt.password.map(Zeroizing::new),
                }
            }),
        };
        Self {
            db_path: file.db_path.unwrap_or(defaults.db_path),
            profile: file.profile.unwrap_or(defaults.profile),
            threshold: file.threshold.unwrap_or(defaults.threshold),
            output_dir: file.output_dir.unwrap_or(defaults.output_dir),
            model,
            camera,
            catalog,
            notify,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value("WATCHPOST_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(profile) = env_value("WATCHPOST_PROFILE") {
            self.profile = profile
                .parse()
                .map_err(|e| anyhow!("WATCHPOST_PROFILE: {}", e))?;
        }
        if let Some(threshold) = env_value("WATCHPOST_THRESHOLD") {
            self.threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("WATCHPOST_THRESHOLD must be an integer percentage (0-100)")
            })?;
        }
        if let Some(backend) = env_value("WATCHPOST_MODEL_BACKEND") {
            self.model.backend = backend
                .parse()
                .map_err(|e| anyhow!("WATCHPOST_MODEL_BACKEND: {}", e))?;
        }
        if let Some(path) = env_value("WATCHPOST_MODEL_SCRIPT") {
            self.model.script = Some(PathBuf::from(path));
        }
        if let Some(path) = env_value("WATCHPOST_FIRE_MODEL") {
            self.model.fire_model = PathBuf::from(path);
        }
        if let Some(path) = env_value("WATCHPOST_ANIMAL_MODEL") {
            self.model.animal_model = PathBuf::from(path);
        }
        if let Some(device) = env_value("WATCHPOST_CAMERA_DEVICE") {
            self.camera.device = device;
        }
        if let Some(dir) = env_value("WATCHPOST_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        self.apply_email_env()?;
        if let Some(path) = env_value("WATCHPOST_ALERT_SOUND") {
            self.notify.sound.get_or_insert_with(SoundSettings::default).path = PathBuf::from(path);
        }
        if let Some(player) = env_value("WATCHPOST_SOUND_PLAYER") {
            self.notify.sound.get_or_insert_with(SoundSettings::default).player = Some(player);
        }
        if let Some(broker) = env_value("WATCHPOST_MQTT_BROKER") {
            self.notify.mqtt.get_or_insert_with(MqttSettings::default).broker = broker;
        }
        if let Some(topic) = env_value("WATCHPOST_MQTT_TOPIC") {
            self.notify.mqtt.get_or_insert_with(MqttSettings::default).topic = topic;
        }
        Ok(())
    }

    fn apply_email_env(&mut self) -> Result<()> {
        let user = env_value("WATCHPOST_EMAIL_USER");
        let password = env_value("WATCHPOST_EMAIL_PASS");
        let recipient = env_value("WATCHPOST_ALERT_EMAIL");
        let server = env_value("WATCHPOST_SMTP_SERVER");
        let port = match env_value("WATCHPOST_SMTP_PORT") {
            Some(port) => Some(
                port.trim()
                    .parse::<u16>()
                    .map_err(|_| anyhow!("WATCHPOST_SMTP_PORT must be a port number"))?,
            ),
            None => None,
        };
        if user.is_none() && password.is_none() && recipient.is_none() {
            if let Some(email) = self.notify.email.as_mut() {
                if let Some(server) = server {
                    email.smtp_server = server;
                }
                if let Some(port) = port {
                    email.smtp_port = port;
                }
            }
            return Ok(());
        }
        let email = self.notify.email.get_or_insert_with(EmailSettings::default);
        if let Some(user) = user {
            email.user = user;
        }
        if let Some(password) = password {
            email.password = Zeroizing::new(password);
        }
        if let Some(recipient) = recipient {
            email.recipient = recipient;
        }
        if let Some(server) = server {
            email.smtp_server = server;
        }
        if let Some(port) = port {
            email.smtp_port = port;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.threshold > 100 {
            return Err(anyhow!(
                "threshold must be within 0-100 percent (got {})",
                self.threshold
            ));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if let Some(email) = &self.notify.email {
            if email.user.trim().is_empty()
                || email.password.trim().is_empty()
                || email.recipient.trim().is_empty()
            {
                return Err(anyhow!(
                    "email alerts need WATCHPOST_EMAIL_USER, WATCHPOST_EMAIL_PASS, and WATCHPOST_ALERT_EMAIL"
                ));
            }
        }
        if let Some(mqtt) = &self.notify.mqtt {
            crate::notify::mqtt::parse_mqtt_endpoint(&mqtt.broker)
                .with_context(|| format!("invalid MQTT broker '{}'", mqtt.broker))?;
        }
        self.catalog().context("invalid catalog")?;
        Ok(())
    }
}

fn email_from_file(file: EmailConfigFile) -> Option<EmailSettings> {
    if file.user.is_none() && file.password.is_none() && file.recipient.is_none() {
        return None;
    }
    let defaults = EmailSettings::default();
    Some(EmailSettings {
        user: file.user.unwrap_or_default(),
        password: Zeroizing::new(file.password.unwrap_or_default()),
        recipient: file.recipient.unwrap_or_default(),
        smtp_server: file.smtp_server.unwrap_or(defaults.smtp_server),
        smtp_port: file.smtp_port.unwrap_or(defaults.smtp_port),
    })
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<WatchpostConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
