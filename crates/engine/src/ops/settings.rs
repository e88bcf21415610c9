use sea_orm::{ActiveValue, ConnectionTrait, QueryFilter, prelude::*};

use crate::{
    ResultEngine,
    settings::{self, SyncFeatures, keys, parse_bool},
};

use super::Engine;

/// Upsert a settings row on any connection (pool or transaction).
pub(crate) async fn put_setting<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    value: &str,
) -> Result<(), DbErr> {
    match settings::Entity::find_by_id(key).one(conn).await? {
        Some(model) => {
            let mut active: settings::ActiveModel = model.into();
            active.value = ActiveValue::Set(value.to_string());
            active.update(conn).await?;
        }
        None => {
            settings::ActiveModel {
                key: ActiveValue::Set(key.to_string()),
                value: ActiveValue::Set(value.to_string()),
            }
            .insert(conn)
            .await?;
        }
    }
    Ok(())
}

impl Engine {
    pub async fn setting(&self, key: &str) -> ResultEngine<Option<String>> {
        Ok(settings::Entity::find_by_id(key)
            .one(&self.database)
            .await?
            .map(|model| model.value))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> ResultEngine<()> {
        let _write = self.write_lock.lock().await;
        put_setting(&self.database, key, value).await?;
        Ok(())
    }

    /// Loads the feature toggles in one query; missing keys read as off.
    pub async fn sync_features(&self) -> ResultEngine<SyncFeatures> {
        let rows = settings::Entity::find()
            .filter(settings::Column::Key.is_in([
                keys::FEATURE_ASSET_MANAGEMENT,
                keys::FEATURE_MULTI_CURRENCY,
                keys::FEATURE_REIMBURSEMENT,
                keys::FEATURE_LENDING,
                keys::FEATURE_MULTI_BOOKS,
                keys::FEATURE_FEE,
            ]))
            .all(&self.database)
            .await?;

        let mut features = SyncFeatures::default();
        for row in rows {
            let on = parse_bool(Some(row.value.as_str()));
            match row.key.as_str() {
                keys::FEATURE_ASSET_MANAGEMENT => features.asset_management = on,
                keys::FEATURE_MULTI_CURRENCY => features.multi_currency = on,
                keys::FEATURE_REIMBURSEMENT => features.reimbursement = on,
                keys::FEATURE_LENDING => features.lending = on,
                keys::FEATURE_MULTI_BOOKS => features.multi_books = on,
                keys::FEATURE_FEE => features.fee = on,
                _ => {}
            }
        }
        Ok(features)
    }
}
