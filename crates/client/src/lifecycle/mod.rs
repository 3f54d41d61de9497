//! Interceptor lifecycle controller.
//!
//! The hosting runtime drives `Installing -> Installed -> Activating ->
//! Active`; this controller observes those events, tracks every live
//! version and tells the host what changed. A version that finishes
//! installing while another is active waits, and the host sees
//! `UpdateAvailable` until it calls [`LifecycleController::activate_waiting`].

mod registration;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use offgrid_core::Error;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use registration::{InProcessRegistration, Registration};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Installing,
    Installed,
    Activating,
    Active,
    UpdateAvailable,
    Redundant,
}

impl LifecycleState {
    fn rank(self) -> u8 {
        match self {
            LifecycleState::Installing => 0,
            LifecycleState::Installed | LifecycleState::UpdateAvailable => 1,
            LifecycleState::Activating => 2,
            LifecycleState::Active => 3,
            LifecycleState::Redundant => 4,
        }
    }
}

/// Events reported by the hosting runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistrationEvent {
    Installing { version: String },
    Installed { version: String },
    Activating { version: String },
    Activated { version: String },
    Error {
        #[serde(default)]
        version: Option<String>,
        message: String,
    },
}

/// Events surfaced to the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    #[serde(rename = "SW_ACTIVATED")]
    Activated { version: String },
    #[serde(rename = "SW_RESOURCE_ERROR")]
    ResourceError { error: String },
    #[serde(rename = "UPDATE_AVAILABLE")]
    UpdateAvailable { version: String },
    #[serde(rename = "OFFLINE_READY")]
    OfflineReady,
    #[serde(rename = "REGISTRATION_ERROR")]
    RegistrationFailed { message: String },
}

type UpdateListener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone)]
struct Instance {
    version: String,
    state: LifecycleState,
}

#[derive(Debug, Default)]
struct Instances {
    known: Vec<Instance>,
    announced: HashSet<String>,
    ever_active: bool,
}

impl Instances {
    fn active(&self) -> Option<&Instance> {
        self.known.iter().find(|i| i.state == LifecycleState::Active)
    }

    fn waiting(&self) -> Option<&Instance> {
        let active = self.active().map(|i| i.version.as_str());
        self.known
            .iter()
            .find(|i| i.state == LifecycleState::Installed && Some(i.version.as_str()) != active)
    }
}

pub struct LifecycleController {
    registration: Arc<dyn Registration>,
    instances: Mutex<Instances>,
    listeners: Mutex<Vec<UpdateListener>>,
    events: broadcast::Sender<HostEvent>,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController").field("instances", &self.lock().known).finish_non_exhaustive()
    }
}

impl LifecycleController {
    pub fn new(registration: Arc<dyn Registration>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { registration, instances: Mutex::new(Instances::default()), listeners: Mutex::new(Vec::new()), events }
    }

    fn lock(&self) -> MutexGuard<'_, Instances> {
        self.instances.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Call `listener` once for every version that becomes available as an update.
    pub fn on_update_available(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).push(Arc::new(listener));
    }

    /// State of the interceptor as the host sees it.
    ///
    /// `UpdateAvailable` while a version waits behind an active one,
    /// otherwise the most advanced live version's state, and `Redundant`
    /// when nothing is live.
    pub fn current_state(&self) -> LifecycleState {
        let instances = self.lock();
        if instances.active().is_some() {
            return match instances.waiting() {
                Some(_) => LifecycleState::UpdateAvailable,
                None => LifecycleState::Active,
            };
        }
        instances
            .known
            .iter()
            .filter(|i| i.state != LifecycleState::Redundant)
            .max_by_key(|i| i.state.rank())
            .map(|i| i.state)
            .unwrap_or(LifecycleState::Redundant)
    }

    pub fn instance_state(&self, version: &str) -> Option<LifecycleState> {
        self.lock().known.iter().find(|i| i.version == version).map(|i| i.state)
    }

    pub fn active_version(&self) -> Option<String> {
        self.lock().active().map(|i| i.version.clone())
    }

    pub fn waiting_version(&self) -> Option<String> {
        self.lock().waiting().map(|i| i.version.clone())
    }

    /// Apply a runtime event. Transitions only move forward; stale events are ignored.
    pub fn handle_event(&self, event: RegistrationEvent) {
        let (version, next) = match event {
            RegistrationEvent::Installing { version } => (version, LifecycleState::Installing),
            RegistrationEvent::Installed { version } => (version, LifecycleState::Installed),
            RegistrationEvent::Activating { version } => (version, LifecycleState::Activating),
            RegistrationEvent::Activated { version } => (version, LifecycleState::Active),
            RegistrationEvent::Error { version, message } => {
                self.fail(version.as_deref(), message);
                return;
            }
        };

        let mut emitted = Vec::new();
        let mut update = None;
        {
            let mut instances = self.lock();
            let (position, created) = match instances.known.iter().position(|i| i.version == version) {
                Some(p) => (p, false),
                None => {
                    instances.known.push(Instance { version: version.clone(), state: next });
                    (instances.known.len() - 1, true)
                }
            };

            let current = instances.known[position].state;
            if !created && next.rank() <= current.rank() {
                tracing::debug!(version = %version, ?current, ?next, "ignoring stale lifecycle event");
                return;
            }
            instances.known[position].state = next;
            tracing::info!(version = %version, state = ?next, "interceptor lifecycle transition");

            match next {
                LifecycleState::Installed => {
                    let behind_active = instances.active().is_some_and(|a| a.version != version);
                    if behind_active && instances.announced.insert(version.clone()) {
                        emitted.push(HostEvent::UpdateAvailable { version: version.clone() });
                        update = Some(version.clone());
                    }
                }
                LifecycleState::Active => {
                    for other in instances.known.iter_mut().filter(|i| i.version != version) {
                        if other.state == LifecycleState::Active {
                            other.state = LifecycleState::Redundant;
                            tracing::info!(version = %other.version, "previous interceptor retired");
                        }
                    }
                    emitted.push(HostEvent::Activated { version: version.clone() });
                    if !instances.ever_active {
                        instances.ever_active = true;
                        emitted.push(HostEvent::OfflineReady);
                    }
                    // A version that finished installing before anything was active waits from now on.
                    if let Some(waiting) = instances.waiting().map(|i| i.version.clone())
                        && instances.announced.insert(waiting.clone())
                    {
                        emitted.push(HostEvent::UpdateAvailable { version: waiting.clone() });
                        update = Some(waiting);
                    }
                }
                _ => {}
            }
        }

        if let Some(version) = update {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner()).clone();
            for listener in listeners {
                listener(&version);
            }
        }
        for event in emitted {
            self.publish(event);
        }
    }

    fn fail(&self, version: Option<&str>, message: String) {
        if let Some(version) = version {
            let mut instances = self.lock();
            if let Some(instance) =
                instances.known.iter_mut().find(|i| i.version == version && i.state != LifecycleState::Active)
            {
                instance.state = LifecycleState::Redundant;
            }
        }
        tracing::error!(version, message = %message, "interceptor registration failed");
        self.publish(HostEvent::RegistrationFailed { message });
    }

    /// Register the interceptor script. Failures are published, never retried.
    pub async fn register(&self, script_url: &str) -> Result<String, Error> {
        match self.registration.register(script_url).await {
            Ok(version) => {
                self.handle_event(RegistrationEvent::Installing { version: version.clone() });
                Ok(version)
            }
            Err(e) => {
                self.fail(None, e.to_string());
                Err(e)
            }
        }
    }

    /// Promote the waiting version. Returns the version activated, if any.
    pub async fn activate_waiting(&self) -> Result<Option<String>, Error> {
        let Some(version) = self.waiting_version() else {
            tracing::debug!("no waiting interceptor to activate");
            return Ok(None);
        };

        if let Err(e) = self.registration.skip_waiting(&version).await {
            self.fail(Some(&version), e.to_string());
            return Err(e);
        }
        self.handle_event(RegistrationEvent::Activating { version: version.clone() });
        self.handle_event(RegistrationEvent::Activated { version: version.clone() });
        Ok(Some(version))
    }

    /// Drop the registration and retire every known version.
    pub async fn unregister(&self) -> Result<bool, Error> {
        let removed = self.registration.unregister().await?;
        let retired = {
            let mut instances = self.lock();
            let mut n = 0;
            for instance in instances.known.iter_mut().filter(|i| i.state != LifecycleState::Redundant) {
                instance.state = LifecycleState::Redundant;
                n += 1;
            }
            n
        };
        tracing::info!(removed, retired, "interceptor unregistered");
        Ok(removed)
    }

    /// Publish a resource error seen by the interceptor.
    pub fn report_resource_error(&self, error: impl Into<String>) {
        self.publish(HostEvent::ResourceError { error: error.into() });
    }

    fn publish(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("host event dropped: no subscribers");
        }
    }
}
