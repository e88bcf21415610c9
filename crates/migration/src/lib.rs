pub use sea_orm_migration::prelude::*;

mod m20260301_120000_bills;
mod m20260301_120100_rules;
mod m20260301_120200_assets;
mod m20260301_120300_settings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_120000_bills::Migration),
            Box::new(m20260301_120100_rules::Migration),
            Box::new(m20260301_120200_assets::Migration),
            Box::new(m20260301_120300_settings::Migration),
        ]
    }
}
