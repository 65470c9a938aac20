use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

/// Server-assigned timestamp column; rows are ordered by these.
pub(crate) fn created_at<T: IntoIden>(name: T) -> ColumnDef {
    timestamp_with_time_zone(name)
        .default(Expr::current_timestamp())
        .take()
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create Stores Table
        let table = Table::create()
            .table(Stores::Table)
            .if_not_exists()
            .col(pk_uuid(Stores::Id))
            .col(string(Stores::Name))
            .col(double(Stores::Lat))
            .col(double(Stores::Lng))
            .col(json(Stores::Rates))
            .col(created_at(Stores::CreatedAt))
            .col(created_at(Stores::UpdatedAt))
            .to_owned();
        manager.create_table(table).await?;

        // Create Tables Table
        let table = Table::create()
            .table(Tables::Table)
            .if_not_exists()
            .col(pk_uuid(Tables::Id))
            .col(uuid(Tables::StoreId))
            .col(string(Tables::Rate))
            .col(integer(Tables::MaxSeats))
            .col(integer(Tables::CurrentPlayers).default(0))
            .col(string(Tables::Status).default("open"))
            .col(created_at(Tables::CreatedAt))
            .col(created_at(Tables::UpdatedAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_tables_store")
                    .from(Tables::Table, Tables::StoreId)
                    .to(Stores::Table, Stores::Id),
            )
            .check(
                Expr::col(Tables::MaxSeats)
                    .gte(2)
                    .and(Expr::col(Tables::MaxSeats).lte(10)),
            )
            .check(
                Expr::col(Tables::CurrentPlayers)
                    .gte(0)
                    .and(Expr::col(Tables::CurrentPlayers).lte(Expr::col(Tables::MaxSeats))),
            )
            .check(Expr::col(Tables::Status).is_in(["open", "closed"]))
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tables_store_rate")
                    .table(Tables::Table)
                    .col(Tables::StoreId)
                    .col(Tables::Rate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tables::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Stores::Table).to_owned())
            .await?;

        Ok(())
    }
}
