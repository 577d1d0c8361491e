//! Runtime: wires the store, governor, drivers and transport together.
//!
//! The project registry and provider catalogue are initialised once here and
//! passed explicitly into drivers and agents.

use std::sync::Arc;
use std::time::Duration;

use eyre::{eyre, Context, Result};
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::governor::Governor;
use crate::llm::{create_provider, LlmProvider};
use crate::pipeline::{AnalyzerDriver, AttachmentRegistry, SupervisorDriver};
use crate::store::ProjectStore;
use crate::transport::{run_listener, TransportCore};

/// The assembled process.
pub struct Runtime {
    config: Config,
    store: ProjectStore,
    governor: Governor,
    attachments: AttachmentRegistry,
    cancel: CancelToken,
}

impl Runtime {
    /// Open the store and assemble the runtime.
    pub async fn start(config: Config) -> Result<Self> {
        let store = ProjectStore::open(&config.storage.root)
            .await
            .context("Failed to open project store")?;

        let governor = Governor::new(config.limits.parallel_workers);

        Ok(Self {
            config,
            store,
            governor,
            attachments: AttachmentRegistry::new(),
            cancel: CancelToken::new(),
        })
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The provider the background pipeline uses: the catalogue entry named
    /// "default", or the only entry, or the alphabetically first.
    fn pipeline_provider(&self) -> Result<Arc<dyn LlmProvider>> {
        let provider_config = self
            .config
            .provider("default")
            .or_else(|| {
                let mut names: Vec<&String> = self.config.providers.keys().collect();
                names.sort();
                names.first().and_then(|name| self.config.provider(name))
            })
            .ok_or_else(|| eyre!("No providers configured"))?;

        create_provider(provider_config).map_err(|e| eyre!("Provider setup failed: {}", e))
    }

    /// Run drivers, transport and session GC until a shutdown signal.
    pub async fn run(self) -> Result<()> {
        let provider = self.pipeline_provider()?;

        let analyzer = AnalyzerDriver::new(
            self.store.clone(),
            provider.clone(),
            self.config.limits.clone(),
            Duration::from_secs(self.config.pipeline.analyzer_interval_secs),
            self.cancel.clone(),
        );

        let supervisor = SupervisorDriver::new(
            self.store.clone(),
            provider,
            self.governor.clone(),
            self.config.limits.clone(),
            self.attachments.clone(),
            Duration::from_secs(self.config.pipeline.execution_tick_secs),
            self.cancel.clone(),
        );

        let core = TransportCore::new(
            self.config.clone(),
            self.store.clone(),
            self.attachments.clone(),
            self.cancel.clone(),
        );
        let sessions = core.sessions.clone();
        let socket_path = self.config.session.socket_path.clone();

        let analyzer_handle = tokio::spawn(analyzer.run());
        let supervisor_handle = tokio::spawn(supervisor.run());
        let listener_handle = tokio::spawn(run_listener(core, socket_path, self.cancel.clone()));

        let gc_cancel = self.cancel.clone();
        let gc_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {
                        sessions.gc_sweep().await;
                    }
                    _ = gc_cancel.cancelled() => return,
                }
            }
        });

        info!("Runtime started; waiting for shutdown signal");
        tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
        info!("Shutdown signal received");
        self.cancel.cancel();

        // Shutdown is bounded: drivers observe the signal between projects.
        let shutdown = async {
            let _ = analyzer_handle.await;
            let _ = supervisor_handle.await;
            let _ = listener_handle.await;
            let _ = gc_handle.await;
        };
        if tokio::time::timeout(Duration::from_secs(10), shutdown).await.is_err() {
            warn!("Shutdown timed out; some tasks were aborted");
        }

        Ok(())
    }
}
