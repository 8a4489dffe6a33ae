use std::sync::Arc;

use async_trait::async_trait;
use league_cache::CacheAside;
use league_queue::{Dispatcher, JobError, JobHandler, JobRecord, QueueResult};
use tracing::{debug, info};

use crate::deps::SyncContext;
use crate::error::SyncError;
use crate::job::{JobType, Operation, SyncPayload};
use crate::model::Entity;
use crate::pipeline::sync_entities;
use crate::store::EntityStore;

/// Delete path: remove rows, then invalidate their cache entries. The
/// invalidation is awaited and its failure fails the job - the whole flow
/// is idempotent, so a retry re-deletes and re-invalidates safely.
async fn delete_entities<T: Entity>(
    payload: &SyncPayload,
    store: &dyn EntityStore<T>,
    cache: &CacheAside<T>,
) -> Result<(), JobError> {
    if payload.ids.is_empty() {
        return Err(JobError::validation("delete requires entity ids"));
    }
    let ids: Vec<String> = payload.ids.iter().map(|id| id.to_string()).collect();
    let removed = store
        .delete_by_ids(&ids)
        .await
        .map_err(SyncError::from)?;
    for id in &ids {
        cache.invalidate(id).await.map_err(|err| {
            JobError::processing(format!("cache invalidation failed for {id}: {err}"))
        })?;
    }
    info!(requested = ids.len(), removed, "entities deleted");
    Ok(())
}

pub struct EventsHandler;

#[async_trait]
impl JobHandler<JobType, SyncContext> for EventsHandler {
    async fn run(&self, job: &JobRecord<JobType>, ctx: &SyncContext) -> Result<(), JobError> {
        let payload = SyncPayload::from_job(job)?;
        if payload.op == Operation::Delete {
            return delete_entities(&payload, ctx.deps.events.as_ref(), &ctx.caches.events).await;
        }
        let raw = ctx
            .deps
            .upstream
            .fetch_bootstrap()
            .await
            .map_err(SyncError::from)?;
        sync_entities(raw.events, "events", ctx.deps.events.as_ref(), &ctx.caches.events).await?;
        Ok(())
    }
}

pub struct TeamsHandler;

#[async_trait]
impl JobHandler<JobType, SyncContext> for TeamsHandler {
    async fn run(&self, job: &JobRecord<JobType>, ctx: &SyncContext) -> Result<(), JobError> {
        let payload = SyncPayload::from_job(job)?;
        if payload.op == Operation::Delete {
            return delete_entities(&payload, ctx.deps.teams.as_ref(), &ctx.caches.teams).await;
        }
        let raw = ctx
            .deps
            .upstream
            .fetch_bootstrap()
            .await
            .map_err(SyncError::from)?;
        sync_entities(raw.teams, "teams", ctx.deps.teams.as_ref(), &ctx.caches.teams).await?;
        Ok(())
    }
}

pub struct PlayersHandler;

#[async_trait]
impl JobHandler<JobType, SyncContext> for PlayersHandler {
    async fn run(&self, job: &JobRecord<JobType>, ctx: &SyncContext) -> Result<(), JobError> {
        let payload = SyncPayload::from_job(job)?;
        if payload.op == Operation::Delete {
            return delete_entities(&payload, ctx.deps.players.as_ref(), &ctx.caches.players)
                .await;
        }
        let raw = ctx
            .deps
            .upstream
            .fetch_bootstrap()
            .await
            .map_err(SyncError::from)?;
        sync_entities(
            raw.elements,
            "players",
            ctx.deps.players.as_ref(),
            &ctx.caches.players,
        )
        .await?;
        Ok(())
    }
}

pub struct PhasesHandler;

#[async_trait]
impl JobHandler<JobType, SyncContext> for PhasesHandler {
    async fn run(&self, job: &JobRecord<JobType>, ctx: &SyncContext) -> Result<(), JobError> {
        let payload = SyncPayload::from_job(job)?;
        if payload.op == Operation::Delete {
            return delete_entities(&payload, ctx.deps.phases.as_ref(), &ctx.caches.phases).await;
        }
        let raw = ctx
            .deps
            .upstream
            .fetch_bootstrap()
            .await
            .map_err(SyncError::from)?;
        sync_entities(raw.phases, "phases", ctx.deps.phases.as_ref(), &ctx.caches.phases).await?;
        Ok(())
    }
}

/// One fetch, four sections. Runs them in sequence so a transform failure
/// in a later section still leaves the earlier ones synced.
pub struct BootstrapHandler;

#[async_trait]
impl JobHandler<JobType, SyncContext> for BootstrapHandler {
    async fn run(&self, job: &JobRecord<JobType>, ctx: &SyncContext) -> Result<(), JobError> {
        let payload = SyncPayload::from_job(job)?;
        if payload.op == Operation::Delete {
            return Err(JobError::validation("bootstrap does not support delete"));
        }
        let raw = ctx
            .deps
            .upstream
            .fetch_bootstrap()
            .await
            .map_err(SyncError::from)?;

        let events =
            sync_entities(raw.events, "events", ctx.deps.events.as_ref(), &ctx.caches.events)
                .await?;
        let teams =
            sync_entities(raw.teams, "teams", ctx.deps.teams.as_ref(), &ctx.caches.teams).await?;
        let players = sync_entities(
            raw.elements,
            "players",
            ctx.deps.players.as_ref(),
            &ctx.caches.players,
        )
        .await?;
        let phases =
            sync_entities(raw.phases, "phases", ctx.deps.phases.as_ref(), &ctx.caches.phases)
                .await?;

        info!(events, teams, players, phases, "bootstrap sync complete");
        Ok(())
    }
}

pub struct LiveStatsHandler;

#[async_trait]
impl JobHandler<JobType, SyncContext> for LiveStatsHandler {
    async fn run(&self, job: &JobRecord<JobType>, ctx: &SyncContext) -> Result<(), JobError> {
        let payload = SyncPayload::from_job(job)?;
        if payload.op == Operation::Delete {
            // Live rows use composite event:player ids that the numeric
            // payload ids cannot address; rows turn over on the next sync
            return Err(JobError::validation("live_stats does not support delete"));
        }
        let event_id = payload
            .target
            .ok_or_else(|| JobError::validation("live_stats requires a target event"))?;
        let raw = ctx
            .deps
            .upstream
            .fetch_fixtures(event_id)
            .await
            .map_err(SyncError::from)?;
        debug!(event_id, rows = raw.len(), "fetched live stats");
        sync_entities(
            raw,
            "live_stats",
            ctx.deps.live_stats.as_ref(),
            &ctx.caches.live_stats,
        )
        .await?;
        Ok(())
    }
}

/// Exhaustive handler registration over the job-type enum. Adding a
/// variant without wiring it here fails the registration tests, not a
/// production dispatch.
pub fn build_dispatcher() -> QueueResult<Dispatcher<JobType, SyncContext>> {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(JobType::Bootstrap, Arc::new(BootstrapHandler))?;
    dispatcher.register(JobType::Events, Arc::new(EventsHandler))?;
    dispatcher.register(JobType::Teams, Arc::new(TeamsHandler))?;
    dispatcher.register(JobType::Players, Arc::new(PlayersHandler))?;
    dispatcher.register(JobType::Phases, Arc::new(PhasesHandler))?;
    dispatcher.register(JobType::LiveStats, Arc::new(LiveStatsHandler))?;
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_job_type_has_a_handler() {
        let dispatcher = build_dispatcher().unwrap();
        for job_type in JobType::ALL {
            assert!(
                dispatcher.is_registered(&job_type),
                "no handler for {job_type}"
            );
        }
    }
}
