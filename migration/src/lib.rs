pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m020260301_000001_subject_tables;
mod m020260301_000002_tracking_events;
mod m020260302_000001_stats_rollups;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m020260301_000001_subject_tables::Migration),
            Box::new(m020260301_000002_tracking_events::Migration),
            Box::new(m020260302_000001_stats_rollups::Migration),
        ]
    }
}
