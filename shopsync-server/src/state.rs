use std::{fmt, sync::Arc};

use shopsync_core::{
    credentials::{CredentialStore, PostgresCredentialStore, SyncFlagStore},
    dispatch::{HttpJobInvoker, JobDispatcher, JobInvoker, standing_jobs},
    platform::{PlatformApi, PlatformClient},
    refresh::RefreshOrchestrator,
    run::ScheduledRun,
};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<PostgresCredentialStore>,
    pub platform: Arc<PlatformClient>,
    pub invoker: Arc<HttpJobInvoker>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble one run from the shared handles. Construction per invocation
    /// is deliberate: every collaborator is passed in explicitly, nothing is
    /// process-global.
    pub fn scheduled_run(&self) -> ScheduledRun {
        let orchestrator = RefreshOrchestrator::new(
            self.store.clone() as Arc<dyn CredentialStore>,
            self.platform.clone() as Arc<dyn PlatformApi>,
            self.config.partner_defaults(),
            self.config.refresh_policy(),
        );
        let dispatcher = JobDispatcher::new(
            self.invoker.clone() as Arc<dyn JobInvoker>,
            standing_jobs(),
            self.config.sync_batch_size,
        );

        ScheduledRun::new(
            orchestrator,
            dispatcher,
            self.store.clone() as Arc<dyn SyncFlagStore>,
            self.config.refresh_policy().pacing,
        )
    }
}
