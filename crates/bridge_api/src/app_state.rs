use std::sync::Arc;

use bridge_engine::config::{BackendKind, BridgeConfig};
use bridge_engine::{BackendError, Translator};
use tracing::info;

use crate::ocpi::OcpiClient;

/// State shared by every request: the translator and, through it, the
/// configuration loaded at startup.
#[derive(Clone)]
pub struct AppState {
    translator: Arc<Translator>,
}

impl AppState {
    pub fn new(translator: Translator) -> Self {
        Self {
            translator: Arc::new(translator),
        }
    }

    /// Pick the collaborators named by `config.backend`.
    pub fn from_config(config: BridgeConfig) -> Result<Self, BackendError> {
        let translator = match config.backend {
            BackendKind::Mock => {
                info!("using in-memory OCPI collaborators");
                Translator::mock(config)?
            }
            BackendKind::Ocpi => {
                info!(base_url = %config.ocpi.base_url, "using remote OCPI collaborators");
                let client = Arc::new(OcpiClient::new(config.ocpi.clone()));
                Translator::new(config, client.clone(), client.clone(), client)
            }
        };
        Ok(Self::new(translator))
    }

    pub fn translator(&self) -> Arc<Translator> {
        Arc::clone(&self.translator)
    }
}
