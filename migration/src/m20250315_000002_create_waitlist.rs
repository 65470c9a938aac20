use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;
use crate::m20250301_000001_create_store_tables::created_at;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = Table::create()
            .table(Waitlist::Table)
            .if_not_exists()
            .col(pk_uuid(Waitlist::Id))
            .col(uuid(Waitlist::StoreId))
            .col(string(Waitlist::UserId))
            .col(string(Waitlist::UserName))
            .col(string_null(Waitlist::RatePreference))
            .col(string(Waitlist::Status).default("waiting"))
            .col(timestamp_with_time_zone_null(Waitlist::CalledAt))
            .col(integer_null(Waitlist::ArrivalEstimationMinutes))
            .col(created_at(Waitlist::CreatedAt))
            .col(created_at(Waitlist::UpdatedAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_waitlist_store")
                    .from(Waitlist::Table, Waitlist::StoreId)
                    .to(Stores::Table, Stores::Id),
            )
            .check(Expr::col(Waitlist::Status).is_in([
                "waiting",
                "called",
                "arrived",
                "seated",
                "cancelled",
            ]))
            .to_owned();
        manager.create_table(table).await?;

        // Queue position lookups filter on store + rate + status and compare created_at
        manager
            .create_index(
                Index::create()
                    .name("idx_waitlist_queue")
                    .table(Waitlist::Table)
                    .col(Waitlist::StoreId)
                    .col(Waitlist::RatePreference)
                    .col(Waitlist::Status)
                    .col(Waitlist::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_waitlist_player")
                    .table(Waitlist::Table)
                    .col(Waitlist::StoreId)
                    .col(Waitlist::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Waitlist::Table).to_owned())
            .await?;

        Ok(())
    }
}
