//! Lookup-then-trigger flow for one relationship.
//!
//! The trigger is only issued once the lookup has succeeded, and the
//! resulting cluster job is not polled: the run reports the immediate
//! response and ends.

use tracing::info;

use crate::client::{ReplicationClient, TriggerOutcome, TriggerStatus};
use crate::context::{RelationshipId, SyncMode};
use crate::error::SyncResult;

pub(crate) async fn run_sync(
    client: &ReplicationClient,
    id: &RelationshipId,
    mode: SyncMode,
) -> SyncResult<TriggerOutcome> {
    let relationship = client.fetch_relationship(id).await?;
    info!(
        current_state = relationship.state().unwrap_or("unknown"),
        "Snapmirror id: {id} existed in the target cluster, move on to trigger sync."
    );

    let outcome = client.trigger_sync(id, mode).await?;
    info!("Snapmirror id: {id} sync triggered.");
    if outcome.status() == TriggerStatus::Accepted {
        match outcome.job_uuid() {
            Some(job) => info!(%job, "state change accepted as a cluster job"),
            None => info!("state change accepted for asynchronous processing"),
        }
    }
    info!("{}", relationship.to_pretty_json());

    Ok(outcome)
}
