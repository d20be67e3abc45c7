use std::sync::Arc;

use crate::config::Config;
use crate::jobs::JobStore;
use crate::llm_client::GenerationClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Job registry. The only state shared between concurrent jobs.
    pub jobs: JobStore,
    pub generator: GenerationClient,
    /// Prompt template loaded once at startup.
    pub prompt_template: Arc<str>,
}

#[cfg(test)]
impl AppState {
    /// State over a scratch directory with the given provider chain.
    pub async fn for_tests(
        root: &std::path::Path,
        providers: Vec<Arc<dyn crate::llm_client::Provider>>,
    ) -> Self {
        let config = Config::for_tests(root);
        let jobs = JobStore::new(
            config.upload_dir.clone(),
            config.generated_dir.clone(),
            config.max_active_jobs,
        );
        jobs.init().await.expect("test job directories");

        AppState {
            generator: GenerationClient::new(providers, config.provider_timeout),
            jobs,
            config,
            prompt_template: Arc::from(crate::portfolio::prompts::PORTFOLIO_PROMPT_TEMPLATE),
        }
    }
}
