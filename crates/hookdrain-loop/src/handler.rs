//! Invocation entry point: lifecycle event in, completion signal out.

use tracing::{error, info};

use hookdrain_core::{Completion, DrainError, LifecycleEvent};

use crate::drain::DrainLoop;

/// Handle one termination-pause event end to end.
///
/// Either resolution yields a normal `Completion`; the decision itself is
/// only observable through the lifecycle controller and the logs. A
/// malformed event fails before any external call, and a failed resolve
/// call is surfaced as an error since nothing further can be done.
pub async fn handle_event(drain: &DrainLoop, raw: &str) -> Result<Completion, DrainError> {
    info!(event = %raw, "received lifecycle event");

    let event = LifecycleEvent::from_json(raw).inspect_err(|e| {
        error!(error = %e, "rejecting lifecycle event");
    })?;

    let report = drain.run(event.request).await?;
    Ok(Completion::for_resolution(report.resolution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{RecordingController, ScriptedMetrics};
    use hookdrain_core::DrainSettings;
    use std::sync::Arc;
    use std::time::Duration;

    const EVENT: &str = r#"{
        "detail": {
            "EC2InstanceId": "i-0abc",
            "AutoScalingGroupName": "workers",
            "LifecycleHookName": "drain-hook"
        }
    }"#;

    fn test_loop(
        metrics: &Arc<ScriptedMetrics>,
        controller: &Arc<RecordingController>,
    ) -> DrainLoop {
        let settings = DrainSettings {
            delay: Duration::ZERO,
            ..DrainSettings::default()
        };
        DrainLoop::new(metrics.clone(), controller.clone(), settings)
    }

    #[tokio::test]
    async fn idle_instance_completes_with_terminate_message() {
        let metrics = Arc::new(ScriptedMetrics::new(vec![Ok(Some(0.0))]));
        let controller = Arc::new(RecordingController::new());

        let completion = handle_event(&test_loop(&metrics, &controller), EVENT)
            .await
            .unwrap();

        assert_eq!(completion.status_code, 200);
        assert_eq!(completion.body, "Instance can be terminated");
    }

    #[tokio::test]
    async fn abandon_still_completes_normally() {
        let metrics = Arc::new(ScriptedMetrics::new(vec![Err("boom".to_string())]));
        let controller = Arc::new(RecordingController::new());

        let completion = handle_event(&test_loop(&metrics, &controller), EVENT)
            .await
            .unwrap();

        assert_eq!(completion.status_code, 200);
        assert_eq!(completion.body, "Function completed successfully");
    }

    #[tokio::test]
    async fn malformed_event_makes_no_calls() {
        let metrics = Arc::new(ScriptedMetrics::repeating(Ok(Some(0.0))));
        let controller = Arc::new(RecordingController::new());

        let raw = r#"{"detail":{"AutoScalingGroupName":"workers","LifecycleHookName":"drain-hook"}}"#;
        let err = handle_event(&test_loop(&metrics, &controller), raw)
            .await
            .unwrap_err();

        assert!(matches!(err, DrainError::MalformedRequest(_)));
        assert_eq!(metrics.query_count(), 0);
        assert!(controller.calls().is_empty());
    }

    #[tokio::test]
    async fn resolve_failure_surfaces_to_invoker() {
        let metrics = Arc::new(ScriptedMetrics::new(vec![Ok(Some(0.0))]));
        let controller = Arc::new(RecordingController::new().failing_resolves());

        let err = handle_event(&test_loop(&metrics, &controller), EVENT)
            .await
            .unwrap_err();

        assert!(matches!(err, DrainError::Resolve { .. }));
        assert_eq!(controller.resolve_calls().len(), 1);
    }
}
