//! SQLite-backed persistence for collected telemetry.
//!
//! [`Repository`] owns all database access and implements the collector's
//! [`RunStore`] port and the coordinator's [`RateLimitStore`] port. A run is
//! saved with its jobs and steps in one transaction: existing child rows
//! are deleted and re-inserted, so a re-fetched run fully replaces the old
//! snapshot.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use thiserror::Error;

use crate::collect::{RunStore, SaveOutcome, StoreError};
use crate::entity::{job, rate_limit_state, step, workflow_run};
use crate::model::{Job, RunStatus, Step, WorkflowRun, WorkflowScope};
use crate::ratelimit::{BoxError, RateLimitRecord, RateLimitStore};

/// The single row id of the rate limit state table.
const RATE_LIMIT_ROW_ID: i32 = 1;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Database-backed store for runs, jobs, steps, and rate limit state.
pub struct Repository {
    db: DatabaseConnection,
}

impl Repository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Status of every stored run for `scope` created at or after `since`.
    pub async fn run_statuses(
        &self,
        scope: &WorkflowScope,
        since: DateTime<Utc>,
    ) -> Result<HashMap<i64, RunStatus>, RepositoryError> {
        let rows = workflow_run::Entity::find()
            .filter(workflow_run::Column::Owner.eq(&scope.owner))
            .filter(workflow_run::Column::Repo.eq(&scope.repo))
            .filter(workflow_run::Column::Workflow.eq(&scope.workflow))
            .filter(workflow_run::Column::CreatedAt.gte(since))
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.id, RunStatus::from(row.status)))
            .collect())
    }

    /// Save one run with its jobs and steps, replacing any previous
    /// snapshot of the same run, in a single transaction.
    pub async fn save_run(
        &self,
        scope: &WorkflowScope,
        run: &WorkflowRun,
    ) -> Result<SaveOutcome, RepositoryError> {
        let txn = self.db.begin().await?;

        let existing = workflow_run::Entity::find_by_id(run.id).one(&txn).await?;

        // Replace child rows wholesale; a re-fetch is authoritative.
        let job_ids: Vec<i64> = job::Entity::find()
            .filter(job::Column::WorkflowRunId.eq(run.id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|row| row.id)
            .collect();
        if !job_ids.is_empty() {
            step::Entity::delete_many()
                .filter(step::Column::JobId.is_in(job_ids))
                .exec(&txn)
                .await?;
            job::Entity::delete_many()
                .filter(job::Column::WorkflowRunId.eq(run.id))
                .exec(&txn)
                .await?;
        }

        let model = workflow_run::ActiveModel {
            id: Set(run.id),
            owner: Set(scope.owner.clone()),
            repo: Set(scope.repo.clone()),
            workflow: Set(scope.workflow.clone()),
            name: Set(run.name.clone()),
            status: Set(run.status.as_str().to_string()),
            conclusion: Set(run.conclusion.clone()),
            created_at: Set(run.created_at),
            updated_at: Set(run.updated_at),
            event: Set(run.event.clone()),
            head_branch: Set(run.head_branch.clone()),
            run_number: Set(run.run_number),
            head_sha: Set(run.head_sha.clone()),
            pull_request_number: Set(run.pull_request_number),
            duration_ms: Set(run.duration_ms),
            synced_at: Set(Utc::now()),
        };
        if existing.is_some() {
            model.update(&txn).await?;
        } else {
            model.insert(&txn).await?;
        }

        if !run.jobs.is_empty() {
            let job_models: Vec<job::ActiveModel> =
                run.jobs.iter().map(job_active_model).collect();
            job::Entity::insert_many(job_models).exec(&txn).await?;

            let step_models: Vec<step::ActiveModel> = run
                .jobs
                .iter()
                .flat_map(|j| j.steps.iter().map(|s| step_active_model(j.id, s)))
                .collect();
            if !step_models.is_empty() {
                step::Entity::insert_many(step_models).exec(&txn).await?;
            }
        }

        txn.commit().await?;

        Ok(if existing.is_some() {
            SaveOutcome::Updated
        } else {
            SaveOutcome::Inserted
        })
    }

    /// Load one run with its jobs and steps.
    pub async fn load_run(&self, run_id: i64) -> Result<Option<WorkflowRun>, RepositoryError> {
        let Some(run_row) = workflow_run::Entity::find_by_id(run_id).one(&self.db).await? else {
            return Ok(None);
        };

        let job_rows = job::Entity::find()
            .filter(job::Column::WorkflowRunId.eq(run_id))
            .order_by_asc(job::Column::Id)
            .all(&self.db)
            .await?;

        let mut jobs = Vec::with_capacity(job_rows.len());
        for job_row in job_rows {
            let step_rows = step::Entity::find()
                .filter(step::Column::JobId.eq(job_row.id))
                .order_by_asc(step::Column::Number)
                .all(&self.db)
                .await?;

            jobs.push(Job {
                id: job_row.id,
                workflow_run_id: job_row.workflow_run_id,
                run_attempt: job_row.run_attempt,
                name: job_row.name,
                status: job_row.status,
                conclusion: job_row.conclusion,
                started_at: job_row.started_at,
                completed_at: job_row.completed_at,
                duration_ms: job_row.duration_ms,
                matrix_config: job_row
                    .matrix_config
                    .and_then(|v| serde_json::from_value(v).ok()),
                steps: step_rows
                    .into_iter()
                    .map(|s| Step {
                        name: s.name,
                        status: s.status,
                        conclusion: s.conclusion,
                        number: s.number,
                        started_at: s.started_at,
                        completed_at: s.completed_at,
                        duration_ms: s.duration_ms,
                    })
                    .collect(),
            });
        }

        Ok(Some(WorkflowRun {
            id: run_row.id,
            name: run_row.name,
            status: RunStatus::from(run_row.status),
            conclusion: run_row.conclusion,
            created_at: run_row.created_at,
            updated_at: run_row.updated_at,
            event: run_row.event,
            head_branch: run_row.head_branch,
            run_number: run_row.run_number,
            head_sha: run_row.head_sha,
            pull_request_number: run_row.pull_request_number,
            duration_ms: run_row.duration_ms,
            jobs,
        }))
    }

    /// Delete all collected runs, jobs, and steps.
    ///
    /// Rate limit state is kept; the quota clock keeps ticking regardless
    /// of what is stored.
    pub async fn clear_all(&self) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;
        step::Entity::delete_many().exec(&txn).await?;
        job::Entity::delete_many().exec(&txn).await?;
        workflow_run::Entity::delete_many().exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Load the persisted rate limit bucket, if one was ever saved.
    pub async fn load_rate_limit(&self) -> Result<Option<RateLimitRecord>, RepositoryError> {
        let row = rate_limit_state::Entity::find_by_id(RATE_LIMIT_ROW_ID)
            .one(&self.db)
            .await?;
        Ok(row.map(|m| RateLimitRecord {
            hour_start: m.hour_start,
            request_count: m.request_count,
            api_remaining: m.api_remaining,
            api_reset_at: m.api_reset_at,
            updated_at: m.updated_at,
        }))
    }

    pub async fn save_rate_limit(&self, record: &RateLimitRecord) -> Result<(), RepositoryError> {
        let existing = rate_limit_state::Entity::find_by_id(RATE_LIMIT_ROW_ID)
            .one(&self.db)
            .await?;

        let model = rate_limit_state::ActiveModel {
            id: Set(RATE_LIMIT_ROW_ID),
            hour_start: Set(record.hour_start),
            request_count: Set(record.request_count),
            api_remaining: Set(record.api_remaining),
            api_reset_at: Set(record.api_reset_at),
            updated_at: Set(record.updated_at),
        };
        if existing.is_some() {
            model.update(&self.db).await?;
        } else {
            model.insert(&self.db).await?;
        }
        Ok(())
    }
}

fn job_active_model(job: &Job) -> job::ActiveModel {
    job::ActiveModel {
        id: Set(job.id),
        workflow_run_id: Set(job.workflow_run_id),
        run_attempt: Set(job.run_attempt),
        name: Set(job.name.clone()),
        status: Set(job.status.clone()),
        conclusion: Set(job.conclusion.clone()),
        started_at: Set(job.started_at),
        completed_at: Set(job.completed_at),
        duration_ms: Set(job.duration_ms),
        matrix_config: Set(job
            .matrix_config
            .as_ref()
            .map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null))),
    }
}

fn step_active_model(job_id: i64, step: &Step) -> step::ActiveModel {
    step::ActiveModel {
        id: NotSet,
        job_id: Set(job_id),
        name: Set(step.name.clone()),
        status: Set(step.status.clone()),
        conclusion: Set(step.conclusion.clone()),
        number: Set(step.number),
        started_at: Set(step.started_at),
        completed_at: Set(step.completed_at),
        duration_ms: Set(step.duration_ms),
    }
}

#[async_trait]
impl RunStore for Repository {
    async fn run_statuses(
        &self,
        scope: &WorkflowScope,
        since: DateTime<Utc>,
    ) -> Result<HashMap<i64, RunStatus>, StoreError> {
        Ok(Repository::run_statuses(self, scope, since).await?)
    }

    async fn save_run(
        &self,
        scope: &WorkflowScope,
        run: &WorkflowRun,
    ) -> Result<SaveOutcome, StoreError> {
        Ok(Repository::save_run(self, scope, run).await?)
    }
}

#[async_trait]
impl RateLimitStore for Repository {
    async fn load(&self) -> Result<Option<RateLimitRecord>, BoxError> {
        Ok(self.load_rate_limit().await?)
    }

    async fn save(&self, record: &RateLimitRecord) -> Result<(), BoxError> {
        Ok(self.save_rate_limit(record).await?)
    }
}
