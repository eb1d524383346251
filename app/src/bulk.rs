use std::path::Path;

use strata_engine::{ResourceUrn, StateMutator};
use tracing::{info, warn};

/// Outcome of deleting several resources from state, one at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteReport {
    pub succeeded: Vec<ResourceUrn>,
    pub failed: Vec<(ResourceUrn, String)>,
}

impl BulkDeleteReport {
    pub fn summary(&self) -> String {
        format!(
            "deleted {} of {} resources from state",
            self.succeeded.len(),
            self.succeeded.len() + self.failed.len()
        )
    }

    pub fn details(&self) -> String {
        let mut lines = vec![self.summary()];
        lines.extend(
            self.failed
                .iter()
                .map(|(urn, error)| format!("{}: {error}", urn.name().unwrap_or(urn.as_str()))),
        );
        lines.join("\n")
    }
}

/// Every resource is attempted even after a failure.
pub async fn bulk_state_delete(
    mutator: &dyn StateMutator,
    workdir: &Path,
    stack: &str,
    urns: &[ResourceUrn],
) -> BulkDeleteReport {
    let mut report = BulkDeleteReport::default();
    for urn in urns {
        let result = mutator.state_delete(workdir, stack, urn).await;
        if result.success {
            info!(%urn, "deleted from state");
            report.succeeded.push(urn.clone());
        } else {
            let error = result
                .error
                .unwrap_or_else(|| "state delete failed".to_string());
            warn!(%urn, %error, "state delete failed");
            report.failed.push((urn.clone(), error));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use crate::fakes::FakeMutator;

    use super::*;

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let mutator = FakeMutator::failing(["urn:pulumi:dev::shop::aws:sqs/queue:Queue::jobs"]);
        let urns: Vec<ResourceUrn> = [
            "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::assets",
            "urn:pulumi:dev::shop::aws:sqs/queue:Queue::jobs",
            "urn:pulumi:dev::shop::aws:sns/topic:Topic::events",
        ]
        .into_iter()
        .map(ResourceUrn::from)
        .collect();

        let report = bulk_state_delete(&mutator, Path::new("/work"), "dev", &urns).await;

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(mutator.calls().len(), 3);
        assert_eq!(
            report.details(),
            "deleted 2 of 3 resources from state\njobs: resource is protected"
        );
    }
}
