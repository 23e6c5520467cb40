use anyhow::Result;

use crate::alert::AlertPolicy;
use crate::frame::Frame;
use crate::ingest::{open_source, FrameSource, Origin, SourceKind};

/// Owns an opened source and closes it exactly once: on an explicit `close`,
/// or when dropped.
struct SourceGuard {
    source: Option<Box<dyn FrameSource>>,
}

impl SourceGuard {
    fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// One run over one origin: the opened source plus per-session alert state.
pub struct StreamSession {
    source: SourceGuard,
    kind: SourceKind,
    active: bool,
    pub(crate) policy: AlertPolicy,
}

impl StreamSession {
    /// Open `origin`. Fails with `PipelineError::SourceUnavailable`; no source
    /// is held in that case, so nothing needs closing.
    pub fn start(origin: &Origin) -> Result<Self> {
        let source = open_source(origin)?;
        log::info!("session started on {}", origin);
        Ok(Self::from_source(source))
    }

    /// Wrap an already-open source.
    pub fn from_source(source: Box<dyn FrameSource>) -> Self {
        let kind = source.kind();
        Self {
            source: SourceGuard {
                source: Some(source),
            },
            kind,
            active: true,
            policy: AlertPolicy::new(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub fn last_alert_label(&self) -> Option<&str> {
        self.policy.last_alert_label()
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.source.source.as_mut() {
            Some(source) => source.next_frame(),
            None => Ok(None),
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.source
            .source
            .as_ref()
            .map(|source| source.is_healthy())
            .unwrap_or(false)
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.source
            .source
            .as_ref()
            .map(|source| source.frames_captured())
            .unwrap_or(0)
    }

    /// Mark the session finished and release the source.
    pub fn end(&mut self) {
        self.active = false;
        self.source.close();
    }
}
