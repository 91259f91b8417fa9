//! Persisted rate limit coordinator state.
//!
//! A single-row table: quota accounting survives process restarts within
//! the same clock hour.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "rate_limit_state")]
pub struct Model {
    /// Always 1; the table holds one row.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub hour_start: DateTimeUtc,
    pub request_count: i64,
    pub api_remaining: Option<i64>,
    pub api_reset_at: Option<DateTimeUtc>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
