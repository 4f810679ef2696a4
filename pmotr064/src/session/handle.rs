use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::soap::SoapConnector;

/// Shared, atomically replaceable connector.
///
/// The root session is the only writer (secure-port negotiation). Readers
/// take a snapshot per call, so an in-flight call keeps the connector it
/// started with.
#[derive(Clone)]
pub struct ConnectorHandle {
    current: Arc<ArcSwap<SoapConnector>>,
}

impl ConnectorHandle {
    pub fn new(connector: SoapConnector) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(connector)),
        }
    }

    pub fn load(&self) -> Arc<SoapConnector> {
        self.current.load_full()
    }

    pub(crate) fn replace(&self, connector: SoapConnector) {
        self.current.store(Arc::new(connector));
    }
}

impl std::fmt::Debug for ConnectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorHandle")
            .field("endpoint", &self.load().endpoint_base_url())
            .finish()
    }
}
