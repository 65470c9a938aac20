use sea_orm_migration::prelude::*;

// Define table names
#[derive(DeriveIden)]
pub enum Stores {
    Table,
    Id,
    Name,
    Lat,
    Lng,
    Rates,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Tables {
    Table,
    Id,
    StoreId,
    Rate,
    MaxSeats,
    CurrentPlayers,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Waitlist {
    Table,
    Id,
    StoreId,
    UserId,
    UserName,
    RatePreference,
    Status,
    CalledAt,
    ArrivalEstimationMinutes,
    CreatedAt,
    UpdatedAt,
}
