//! Hosting runtime's worker registration facility.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use offgrid_core::Error;

#[async_trait]
pub trait Registration: Send + Sync {
    /// Register the interceptor script. Returns the version the runtime assigned.
    async fn register(&self, script_url: &str) -> Result<String, Error>;

    /// Let a waiting version take over without waiting for old clients to close.
    async fn skip_waiting(&self, version: &str) -> Result<(), Error>;

    /// Discard the registration. Returns false when nothing was registered.
    async fn unregister(&self) -> Result<bool, Error>;
}

/// Registration facility for an interceptor living in this process.
///
/// Versions are numbered `v1`, `v2`, ... in registration order. Script URLs
/// must point at a `.js` resource.
#[derive(Debug, Default)]
pub struct InProcessRegistration {
    next_version: AtomicU32,
    registered: Mutex<Option<String>>,
    skipped: Mutex<Vec<String>>,
    unregisters: AtomicUsize,
}

impl InProcessRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_url(&self) -> Option<String> {
        self.registered.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn skipped(&self) -> Vec<String> {
        self.skipped.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn unregister_count(&self) -> usize {
        self.unregisters.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registration for InProcessRegistration {
    async fn register(&self, script_url: &str) -> Result<String, Error> {
        let path = script_url.split(['?', '#']).next().unwrap_or_default();
        if script_url.trim().is_empty() || !path.ends_with(".js") {
            return Err(Error::RegistrationError(format!("not a script URL: {script_url:?}")));
        }
        *self.registered.lock().unwrap_or_else(|e| e.into_inner()) = Some(script_url.to_string());
        let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("v{version}"))
    }

    async fn skip_waiting(&self, version: &str) -> Result<(), Error> {
        if self.script_url().is_none() {
            return Err(Error::RegistrationError(format!("cannot activate {version}: nothing registered")));
        }
        self.skipped.lock().unwrap_or_else(|e| e.into_inner()).push(version.to_string());
        Ok(())
    }

    async fn unregister(&self) -> Result<bool, Error> {
        self.unregisters.fetch_add(1, Ordering::SeqCst);
        Ok(self.registered.lock().unwrap_or_else(|e| e.into_inner()).take().is_some())
    }
}
