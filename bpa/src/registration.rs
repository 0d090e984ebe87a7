use super::*;

/// A local endpoint that bundles can be delivered to.
pub trait Registration: Send + Sync {
    fn endpoint(&self) -> &bpv6::EidPattern;

    fn deliver(&self, bundle: &bpv6::Bundle);
}

#[derive(Default)]
pub struct Registrations {
    registrations: spin::Mutex<Vec<Arc<dyn Registration>>>,
}

impl Registrations {
    pub fn add(&self, registration: Arc<dyn Registration>) {
        info!("Registered endpoint {}", registration.endpoint());
        self.registrations.lock().push(registration);
    }

    /// Every registration whose endpoint matches `eid`.
    pub fn find(&self, eid: &bpv6::Eid) -> Vec<Arc<dyn Registration>> {
        self.registrations
            .lock()
            .iter()
            .filter(|r| r.endpoint().matches(eid))
            .cloned()
            .collect()
    }
}

/// A registration that logs what it receives.
pub struct LoggingRegistration {
    endpoint: bpv6::EidPattern,
}

impl LoggingRegistration {
    pub fn new(endpoint: bpv6::EidPattern) -> Self {
        Self { endpoint }
    }
}

impl Registration for LoggingRegistration {
    fn endpoint(&self) -> &bpv6::EidPattern {
        &self.endpoint
    }

    fn deliver(&self, bundle: &bpv6::Bundle) {
        info!(
            "Delivered bundle {} to {}: {} bytes",
            bundle.id(),
            self.endpoint,
            bundle.payload.len()
        );
    }
}
