use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

use super::classifier::{Classification, Classifier};
use crate::error::ClassifyError;

/// Bounded set of blocking workers sharing one classifier.
///
/// Each classification takes a permit and runs on tokio's blocking pool, so at most `workers`
/// run at once. Dropping the future returned by [`InferencePool::classify`] abandons the
/// result; the blocking call itself runs to completion in the background.
#[derive(Clone)]
pub struct InferencePool {
    classifier: Arc<dyn Classifier>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl InferencePool {
    pub fn new(classifier: Arc<dyn Classifier>, workers: usize) -> Self {
        let workers = workers.max(1);
        info!("⚙️ Inference pool: {} workers", workers);
        Self {
            classifier,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn classify(&self, text: String) -> Result<Classification, ClassifyError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ClassifyError::PoolClosed)?;
        let classifier = Arc::clone(&self.classifier);

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            classifier.classify(&text)
        });
        task.await.map_err(|e| ClassifyError::Worker(e.to_string()))?
    }

    /// Refuses new work. Classifications already running finish on their own.
    pub fn shutdown(&self) {
        self.permits.close();
    }
}
