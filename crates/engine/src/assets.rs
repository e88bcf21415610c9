//! Cached catalog of the external ledger's asset accounts.
//!
//! The ledger side replaces this list wholesale; the engine only reads it
//! for UI listings and rule authoring. Dispatch-time account resolution
//! goes through the `LedgerClient` port, never through this cache.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub sort: i32,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub currency: String,
    pub sort: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Asset {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            kind: model.kind,
            currency: model.currency,
            sort: model.sort,
        }
    }
}
