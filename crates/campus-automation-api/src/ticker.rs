//! Fixed-interval timer driving scheduled rules

use automation_engine::AutomationEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Call `process_scheduled_rules` every `period`
pub fn spawn(engine: Arc<AutomationEngine>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            interval.tick().await;
            let executed = engine.process_scheduled_rules().await;
            if executed.is_empty() {
                tracing::debug!("Schedule tick: no rules due");
            } else {
                tracing::info!("Schedule tick ran {} rules: {:?}", executed.len(), executed);
            }
        }
    })
}
