//! In-process scripted tracking subsystem
//!
//! Stands in for device tracking hardware: the demo binary replays an
//! [`EventScript`] through it, and tests push anchor updates by hand. It keeps
//! its own live-anchor set, so the reported anchor count is independent of
//! the tracker's overlay store just like a real provider's.

use crate::error::{Error, Result};
use crate::overlay::{Pose, ReferenceSize};
use crate::subsystem::{
    AnchorEvent, AnchorUpdate, ImageAnchor, PatternLoader, ReferencePattern, SessionHandle,
    TrackingSubsystem,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use magnet_common::events::ProviderState;
use magnet_common::{time, uuid_utils};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug)]
struct ScriptedInner {
    session: Option<SessionHandle>,
    sender: Option<mpsc::UnboundedSender<AnchorUpdate>>,
    receiver: Option<mpsc::UnboundedReceiver<AnchorUpdate>>,
    live_anchors: HashSet<Uuid>,
    provider_state: ProviderState,
    last_patterns: Vec<String>,
    start_calls: usize,
    stop_calls: usize,
}

/// Scripted [`TrackingSubsystem`] fed through [`ScriptedSubsystem::push`]
#[derive(Debug)]
pub struct ScriptedSubsystem {
    supported: bool,
    start_failure: Option<String>,
    start_delay: Duration,
    inner: Mutex<ScriptedInner>,
}

impl ScriptedSubsystem {
    /// Supported device whose sessions start immediately
    pub fn new() -> Self {
        Self {
            supported: true,
            start_failure: None,
            start_delay: Duration::ZERO,
            inner: Mutex::new(ScriptedInner {
                session: None,
                sender: None,
                receiver: None,
                live_anchors: HashSet::new(),
                provider_state: ProviderState::Initialized,
                last_patterns: Vec::new(),
                start_calls: 0,
                stop_calls: 0,
            }),
        }
    }

    /// Device without image tracking support
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Every `start_session` fails with `message`
    pub fn with_start_failure(mut self, message: impl Into<String>) -> Self {
        self.start_failure = Some(message.into());
        self
    }

    /// `start_session` waits `delay` before answering
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Subsystem configured from a script's device settings
    pub fn from_script(script: &EventScript) -> Self {
        let mut subsystem = if script.supported {
            Self::new()
        } else {
            Self::unsupported()
        };
        subsystem.start_failure = script.start_failure.clone();
        subsystem.start_delay = time::millis_to_duration(script.start_delay_ms);
        subsystem
    }

    fn lock(&self) -> MutexGuard<'_, ScriptedInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver an anchor update to the running session's stream
    pub fn push(&self, update: AnchorUpdate) -> Result<()> {
        let mut inner = self.lock();
        let Some(sender) = inner.sender.clone() else {
            return Err(Error::Subsystem("no active session".to_string()));
        };

        match &update.event {
            AnchorEvent::Added(_) | AnchorEvent::Updated(_) => {
                inner.live_anchors.insert(update.anchor_id);
            }
            AnchorEvent::Removed => {
                inner.live_anchors.remove(&update.anchor_id);
            }
            AnchorEvent::Unknown(_) => {}
        }

        sender
            .send(update)
            .map_err(|_| Error::Subsystem("anchor stream closed".to_string()))
    }

    /// End the anchor stream without stopping the session
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.sender = None;
    }

    pub fn start_calls(&self) -> usize {
        self.lock().start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.lock().stop_calls
    }

    pub fn has_session(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Pattern names passed to the last `start_session`
    pub fn last_patterns(&self) -> Vec<String> {
        self.lock().last_patterns.clone()
    }
}

impl Default for ScriptedSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingSubsystem for ScriptedSubsystem {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn start_session(&self, patterns: Vec<ReferencePattern>) -> Result<SessionHandle> {
        {
            let mut inner = self.lock();
            inner.start_calls += 1;
            inner.last_patterns = patterns.iter().map(|p| p.name.clone()).collect();
        }

        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }

        if !self.supported {
            return Err(Error::Unsupported);
        }
        if let Some(message) = &self.start_failure {
            return Err(Error::SessionStart(message.clone()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let session = SessionHandle::new();
        let mut inner = self.lock();
        inner.session = Some(session.clone());
        inner.sender = Some(sender);
        inner.receiver = Some(receiver);
        inner.live_anchors.clear();
        inner.provider_state = ProviderState::Running;

        info!(
            session = %uuid_utils::short(&session.id),
            patterns = inner.last_patterns.len(),
            "Scripted session started"
        );
        Ok(session)
    }

    async fn anchor_updates(&self, session: &SessionHandle) -> BoxStream<'static, AnchorUpdate> {
        let mut inner = self.lock();
        if inner.session.as_ref() != Some(session) {
            return stream::empty().boxed();
        }
        match inner.receiver.take() {
            Some(receiver) => UnboundedReceiverStream::new(receiver).boxed(),
            None => stream::empty().boxed(),
        }
    }

    async fn provider_state(&self, _session: &SessionHandle) -> ProviderState {
        self.lock().provider_state
    }

    async fn reported_anchor_count(&self, _session: &SessionHandle) -> usize {
        self.lock().live_anchors.len()
    }

    async fn stop_session(&self, session: &SessionHandle) {
        let mut inner = self.lock();
        inner.stop_calls += 1;
        if inner.session.as_ref() == Some(session) {
            inner.session = None;
            inner.sender = None;
            inner.receiver = None;
            inner.live_anchors.clear();
            inner.provider_state = ProviderState::Stopped;
            debug!(session = %uuid_utils::short(&session.id), "Scripted session stopped");
        }
    }
}

/// Pattern loader returning a fixed, replaceable pattern list
#[derive(Debug, Default)]
pub struct StaticPatternLoader {
    patterns: Mutex<Vec<ReferencePattern>>,
    calls: AtomicUsize,
}

impl StaticPatternLoader {
    pub fn new(patterns: Vec<ReferencePattern>) -> Self {
        Self {
            patterns: Mutex::new(patterns),
            calls: AtomicUsize::new(0),
        }
    }

    /// Loader for the given names with a default magnet size
    pub fn with_names<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| ReferencePattern::new(name, DEFAULT_MAGNET_SIZE))
                .collect(),
        )
    }

    /// Replace the patterns served by later loads
    pub fn set_patterns(&self, patterns: Vec<ReferencePattern>) {
        *self.patterns.lock().unwrap_or_else(|p| p.into_inner()) = patterns;
    }

    /// Number of loads performed
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl PatternLoader for StaticPatternLoader {
    fn load_reference_patterns(&self, group_name: &str) -> Vec<ReferencePattern> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let patterns = self
            .patterns
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        debug!(group = group_name, count = patterns.len(), "Reference patterns loaded");
        patterns
    }
}

/// Typical fridge magnet footprint (8cm x 5cm)
pub const DEFAULT_MAGNET_SIZE: ReferenceSize = ReferenceSize {
    width: 0.08,
    height: 0.05,
};

// ========================================
// Event scripts
// ========================================

/// Kind of a scripted anchor update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptEventKind {
    Added,
    Updated,
    Removed,
    Unknown,
}

/// One step of an event script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Pause before this step
    #[serde(default)]
    pub delay_ms: u64,
    pub event: ScriptEventKind,
    /// Anchor label or UUID; equal labels address the same anchor
    pub anchor: String,
    /// Reference pattern name (absent: nameless pattern)
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default = "default_tracked")]
    pub tracked: bool,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default = "default_size")]
    pub size: [f64; 2],
}

fn default_tracked() -> bool {
    true
}

fn default_scale() -> f32 {
    1.0
}

fn default_size() -> [f64; 2] {
    [DEFAULT_MAGNET_SIZE.width, DEFAULT_MAGNET_SIZE.height]
}

/// Scripted demo: device capabilities, resource patterns and anchor steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventScript {
    pub supported: bool,
    pub start_failure: Option<String>,
    pub start_delay_ms: u64,
    /// Names of the patterns in the reference resource group
    pub patterns: Vec<String>,
    pub steps: Vec<ScriptStep>,
}

impl Default for EventScript {
    fn default() -> Self {
        Self {
            supported: true,
            start_failure: None,
            start_delay_ms: 0,
            patterns: Vec::new(),
            steps: Vec::new(),
        }
    }
}

impl EventScript {
    /// Load a script from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let script: EventScript = toml::from_str(&content)
            .map_err(|e| Error::Script(format!("Failed to parse {}: {}", path.display(), e)))?;
        script.validate()?;
        Ok(script)
    }

    /// Built-in demo: two magnets found, one lost, one removed
    pub fn demo() -> Self {
        let step = |delay_ms, event, anchor: &str, reference: Option<&str>, tracked| ScriptStep {
            delay_ms,
            event,
            anchor: anchor.to_string(),
            reference: reference.map(str::to_string),
            tracked,
            scale: 1.0,
            position: [0.0, 1.2, -0.6],
            size: default_size(),
        };

        Self {
            patterns: vec![
                "espresso".to_string(),
                "matcha".to_string(),
                "market".to_string(),
            ],
            steps: vec![
                step(200, ScriptEventKind::Added, "a", Some("espresso"), true),
                step(200, ScriptEventKind::Added, "b", Some("matcha"), true),
                step(200, ScriptEventKind::Updated, "a", Some("espresso"), false),
                step(200, ScriptEventKind::Unknown, "b", None, true),
                step(200, ScriptEventKind::Removed, "a", None, false),
                step(200, ScriptEventKind::Added, "c", Some("zzz"), true),
            ],
            ..Self::default()
        }
    }

    /// Reject steps that cannot be replayed
    pub fn validate(&self) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.anchor.trim().is_empty() {
                return Err(Error::Script(format!("step {}: anchor label is empty", index + 1)));
            }
            if !step.scale.is_finite() || step.scale <= 0.0 {
                return Err(Error::Script(format!(
                    "step {}: scale must be positive, got {}",
                    index + 1,
                    step.scale
                )));
            }
        }
        Ok(())
    }

    /// Reference patterns the resource loader should serve
    pub fn reference_patterns(&self) -> Vec<ReferencePattern> {
        self.patterns
            .iter()
            .map(|name| ReferencePattern::new(name.clone(), DEFAULT_MAGNET_SIZE))
            .collect()
    }

    /// Resolve anchor labels and build the timed update sequence
    ///
    /// Labels that parse as UUIDs are used verbatim; other labels get a fresh
    /// id the first time they appear.
    pub fn updates(&self) -> Vec<(Duration, AnchorUpdate)> {
        let mut ids: HashMap<String, Uuid> = HashMap::new();

        self.steps
            .iter()
            .map(|step| {
                let anchor_id = *ids.entry(step.anchor.clone()).or_insert_with(|| {
                    uuid_utils::parse(&step.anchor).unwrap_or_else(|_| uuid_utils::generate())
                });
                let event = match step.event {
                    ScriptEventKind::Added => AnchorEvent::Added(step.anchor_payload()),
                    ScriptEventKind::Updated => AnchorEvent::Updated(step.anchor_payload()),
                    ScriptEventKind::Removed => AnchorEvent::Removed,
                    ScriptEventKind::Unknown => AnchorEvent::Unknown("scripted".to_string()),
                };
                (
                    time::millis_to_duration(step.delay_ms),
                    AnchorUpdate { anchor_id, event },
                )
            })
            .collect()
    }
}

impl ScriptStep {
    fn anchor_payload(&self) -> ImageAnchor {
        let [x, y, z] = self.position;
        ImageAnchor {
            pose: Pose::from_translation(x, y, z),
            is_tracked: self.tracked,
            estimated_scale_factor: self.scale,
            reference_name: self.reference.clone(),
            reference_size: ReferenceSize::new(self.size[0], self.size[1]),
        }
    }
}
