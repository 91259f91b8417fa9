//! Initial migration to create the cadence database schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_workflow_runs(manager).await?;
        self.create_jobs(manager).await?;
        self.create_steps(manager).await?;
        self.create_rate_limit_state(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RateLimitState::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Steps::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkflowRuns::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_workflow_runs(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkflowRuns::Table)
                    .if_not_exists()
                    // Identity (API-assigned run id)
                    .col(
                        ColumnDef::new(WorkflowRuns::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    // Scope
                    .col(ColumnDef::new(WorkflowRuns::Owner).string().not_null())
                    .col(ColumnDef::new(WorkflowRuns::Repo).string().not_null())
                    .col(ColumnDef::new(WorkflowRuns::Workflow).string().not_null())
                    // Run metadata
                    .col(ColumnDef::new(WorkflowRuns::Name).string().null())
                    .col(ColumnDef::new(WorkflowRuns::Status).string().not_null())
                    .col(ColumnDef::new(WorkflowRuns::Conclusion).string().null())
                    .col(
                        ColumnDef::new(WorkflowRuns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkflowRuns::Event).string().null())
                    .col(ColumnDef::new(WorkflowRuns::HeadBranch).string().null())
                    .col(
                        ColumnDef::new(WorkflowRuns::RunNumber)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkflowRuns::HeadSha).string().null())
                    .col(
                        ColumnDef::new(WorkflowRuns::PullRequestNumber)
                            .big_integer()
                            .null(),
                    )
                    // Derived
                    .col(
                        ColumnDef::new(WorkflowRuns::DurationMs)
                            .big_integer()
                            .null(),
                    )
                    // Tracking
                    .col(
                        ColumnDef::new(WorkflowRuns::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Reconciliation queries filter by scope and creation time
        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_runs_scope_created")
                    .table(WorkflowRuns::Table)
                    .col(WorkflowRuns::Owner)
                    .col(WorkflowRuns::Repo)
                    .col(WorkflowRuns::Workflow)
                    .col(WorkflowRuns::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index on status
        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_runs_status")
                    .table(WorkflowRuns::Table)
                    .col(WorkflowRuns::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_jobs(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Jobs::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Jobs::WorkflowRunId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Jobs::RunAttempt).big_integer().null())
                    .col(ColumnDef::new(Jobs::Name).string().not_null())
                    .col(ColumnDef::new(Jobs::Status).string().null())
                    .col(ColumnDef::new(Jobs::Conclusion).string().null())
                    .col(
                        ColumnDef::new(Jobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Jobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Jobs::DurationMs).big_integer().null())
                    .col(ColumnDef::new(Jobs::MatrixConfig).json().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_jobs_workflow_run")
                            .from(Jobs::Table, Jobs::WorkflowRunId)
                            .to(WorkflowRuns::Table, WorkflowRuns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_workflow_run_id")
                    .table(Jobs::Table)
                    .col(Jobs::WorkflowRunId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_steps(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Steps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Steps::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Steps::JobId).big_integer().not_null())
                    .col(ColumnDef::new(Steps::Name).string().not_null())
                    .col(ColumnDef::new(Steps::Status).string().null())
                    .col(ColumnDef::new(Steps::Conclusion).string().null())
                    .col(ColumnDef::new(Steps::Number).big_integer().not_null())
                    .col(
                        ColumnDef::new(Steps::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Steps::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Steps::DurationMs).big_integer().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_steps_job")
                            .from(Steps::Table, Steps::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_steps_job_id")
                    .table(Steps::Table)
                    .col(Steps::JobId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_rate_limit_state(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RateLimitState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RateLimitState::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RateLimitState::HourStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RateLimitState::RequestCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RateLimitState::ApiRemaining)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RateLimitState::ApiResetAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RateLimitState::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum WorkflowRuns {
    Table,
    Id,
    Owner,
    Repo,
    Workflow,
    Name,
    Status,
    Conclusion,
    CreatedAt,
    UpdatedAt,
    Event,
    HeadBranch,
    RunNumber,
    HeadSha,
    PullRequestNumber,
    DurationMs,
    SyncedAt,
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    WorkflowRunId,
    RunAttempt,
    Name,
    Status,
    Conclusion,
    StartedAt,
    CompletedAt,
    DurationMs,
    MatrixConfig,
}

#[derive(DeriveIden)]
enum Steps {
    Table,
    Id,
    JobId,
    Name,
    Status,
    Conclusion,
    Number,
    StartedAt,
    CompletedAt,
    DurationMs,
}

#[derive(DeriveIden)]
enum RateLimitState {
    Table,
    Id,
    HourStart,
    RequestCount,
    ApiRemaining,
    ApiResetAt,
    UpdatedAt,
}
