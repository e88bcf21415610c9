use sea_orm::{ActiveValue, QueryOrder, TransactionTrait, prelude::*};

use crate::{
    ResultEngine,
    assets::{self, Asset},
};

use super::{Engine, with_tx};

impl Engine {
    pub async fn assets(&self) -> ResultEngine<Vec<Asset>> {
        let models = assets::Entity::find()
            .order_by_asc(assets::Column::Sort)
            .order_by_asc(assets::Column::Id)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(Asset::from).collect())
    }

    /// Wholesale replacement of the cached asset catalog; incoming ids are
    /// ignored.
    pub async fn replace_assets(&self, catalog: Vec<Asset>) -> ResultEngine<usize> {
        let _write = self.write_lock.lock().await;
        with_tx!(self, |tx| {
            assets::Entity::delete_many().exec(&tx).await?;
            for asset in &catalog {
                assets::ActiveModel {
                    id: ActiveValue::NotSet,
                    name: ActiveValue::Set(asset.name.clone()),
                    kind: ActiveValue::Set(asset.kind.clone()),
                    currency: ActiveValue::Set(asset.currency.clone()),
                    sort: ActiveValue::Set(asset.sort),
                }
                .insert(&tx)
                .await?;
            }
            Ok(catalog.len())
        })
    }
}
