use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "stores")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    /// JSON array of buy-in labels.
    pub rates: Json,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::table::Entity")]
    Tables,
    #[sea_orm(has_many = "super::waitlist::Entity")]
    Waitlist,
}

impl Related<super::table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tables.def()
    }
}

impl Related<super::waitlist::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Waitlist.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
