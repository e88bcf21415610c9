use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
pub enum Bills {
    Table,
    Id,
    GroupId,
    Kind,
    MoneyCents,
    Currency,
    OccurredAt,
    AccountFrom,
    AccountTo,
    Category,
    Remark,
    Tag,
    SourceApp,
    RuleName,
    Matched,
    RuleVersion,
    State,
    ExtendData,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bills::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Bills::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Bills::GroupId)
                            .big_integer()
                            .not_null()
                            .default(-1),
                    )
                    .col(ColumnDef::new(Bills::Kind).string().not_null())
                    .col(ColumnDef::new(Bills::MoneyCents).big_integer().not_null())
                    .col(ColumnDef::new(Bills::Currency).string().not_null())
                    .col(ColumnDef::new(Bills::OccurredAt).timestamp().not_null())
                    .col(ColumnDef::new(Bills::AccountFrom).string().not_null())
                    .col(ColumnDef::new(Bills::AccountTo).string().not_null())
                    .col(ColumnDef::new(Bills::Category).string().not_null())
                    .col(ColumnDef::new(Bills::Remark).string().not_null())
                    .col(ColumnDef::new(Bills::Tag).string().not_null())
                    .col(ColumnDef::new(Bills::SourceApp).string().not_null())
                    .col(ColumnDef::new(Bills::RuleName).string().not_null())
                    .col(ColumnDef::new(Bills::Matched).boolean().not_null())
                    .col(ColumnDef::new(Bills::RuleVersion).big_integer().not_null())
                    .col(ColumnDef::new(Bills::State).string().not_null())
                    .col(ColumnDef::new(Bills::ExtendData).text().not_null())
                    .col(ColumnDef::new(Bills::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Group-merge window query.
        manager
            .create_index(
                Index::create()
                    .name("idx-bills-money_cents-occurred_at")
                    .table(Bills::Table)
                    .col(Bills::MoneyCents)
                    .col(Bills::OccurredAt)
                    .to_owned(),
            )
            .await?;

        // Dispatcher and pending-edit queries.
        manager
            .create_index(
                Index::create()
                    .name("idx-bills-state-group_id")
                    .table(Bills::Table)
                    .col(Bills::State)
                    .col(Bills::GroupId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Bills::Table).to_owned())
            .await?;
        Ok(())
    }
}
