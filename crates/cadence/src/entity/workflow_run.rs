//! Workflow run entity.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "workflow_runs")]
pub struct Model {
    /// Run id as assigned by the API.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub owner: String,
    pub repo: String,
    pub workflow: String,
    pub name: Option<String>,
    pub status: String,
    pub conclusion: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub event: Option<String>,
    pub head_branch: Option<String>,
    pub run_number: i64,
    pub head_sha: Option<String>,
    pub pull_request_number: Option<i64>,
    /// Earliest job start to latest job completion.
    pub duration_ms: Option<i64>,
    /// When this row was last written by a collection.
    pub synced_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job::Entity")]
    Job,
}

impl Related<super::job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
