use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
pub enum Rules {
    Table,
    Id,
    Name,
    Priority,
    AppScope,
    EventScope,
    Enabled,
    AutoRecord,
    Matcher,
    Extractor,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Rules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Rules::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Rules::Name).string().not_null())
                    .col(ColumnDef::new(Rules::Priority).integer().not_null())
                    .col(ColumnDef::new(Rules::AppScope).string().not_null())
                    .col(ColumnDef::new(Rules::EventScope).string().not_null())
                    .col(ColumnDef::new(Rules::Enabled).boolean().not_null())
                    .col(ColumnDef::new(Rules::AutoRecord).boolean().not_null())
                    .col(ColumnDef::new(Rules::Matcher).text().not_null())
                    .col(ColumnDef::new(Rules::Extractor).text().not_null())
                    .col(ColumnDef::new(Rules::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Rules::Table).to_owned())
            .await?;
        Ok(())
    }
}
