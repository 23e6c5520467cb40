use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::catalog::{ClassCatalog, DetectionProfile};
use crate::config::ModelSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::{ScriptedBackend, StubBackend};

/// Which detector implementation a session runs with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Stub,
    Scripted,
    Tract,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(BackendKind::Stub),
            "scripted" => Ok(BackendKind::Scripted),
            "tract" | "onnx" => Ok(BackendKind::Tract),
            other => Err(anyhow!(
                "unknown model backend '{}' (expected stub, scripted, or tract)",
                other
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Stub => "stub",
            BackendKind::Scripted => "scripted",
            BackendKind::Tract => "tract",
        };
        f.write_str(name)
    }
}

/// Build the detector backend for a session.
///
/// The profile selects which model file is loaded; the catalog size is handed
/// to model backends so class indices can be checked against it.
pub fn build_backend(
    settings: &ModelSettings,
    profile: DetectionProfile,
    catalog: &ClassCatalog,
) -> Result<Box<dyn DetectorBackend>> {
    let backend: Box<dyn DetectorBackend> = match settings.backend {
        BackendKind::Stub => Box::new(StubBackend::new()),
        BackendKind::Scripted => {
            let path = settings
                .script
                .as_ref()
                .ok_or_else(|| anyhow!("scripted backend requires model.script to be set"))?;
            Box::new(ScriptedBackend::from_path(path)?.cycling())
        }
        BackendKind::Tract => build_tract(settings, profile, catalog)?,
    };
    log::info!(
        "detector backend '{}' ready for {} profile ({} classes)",
        backend.name(),
        profile,
        catalog.len()
    );
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn build_tract(
    settings: &ModelSettings,
    profile: DetectionProfile,
    catalog: &ClassCatalog,
) -> Result<Box<dyn DetectorBackend>> {
    let path = settings.model_path(profile);
    let mut backend = crate::detect::backends::TractBackend::new(
        path,
        settings.input_width,
        settings.input_height,
        catalog.len(),
    )?;
    backend.warm_up()?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(
    _settings: &ModelSettings,
    _profile: DetectionProfile,
    _catalog: &ClassCatalog,
) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "tract model backend requires the backend-tract feature"
    ))
}
