//! Shop open/closed state, persisted as a JSON setting.

use super::ShopStatus;
use crate::store::{Store, StoreResult, SHOP_STATUS_KEY};

/// Read the shop status. A missing or unreadable value reads as open.
pub fn shop_status(store: &dyn Store) -> StoreResult<ShopStatus> {
    let Some(raw) = store.get_setting(SHOP_STATUS_KEY)? else {
        return Ok(ShopStatus::default());
    };
    match serde_json::from_str(&raw) {
        Ok(status) => Ok(status),
        Err(e) => {
            tracing::warn!("Unreadable shop status setting, treating as open: {e}");
            Ok(ShopStatus::default())
        }
    }
}

/// Open or close the shop.
pub fn set_shop_status(store: &dyn Store, is_open: bool) -> StoreResult<ShopStatus> {
    let status = ShopStatus { is_open };
    store.put_setting(SHOP_STATUS_KEY, &serde_json::to_string(&status)?)?;
    tracing::info!(is_open, "Shop status updated");
    Ok(status)
}

/// Seed the default (open) status on first run. Returns `true` when written.
pub fn init_shop_status(store: &dyn Store) -> StoreResult<bool> {
    let value = serde_json::to_string(&ShopStatus::default())?;
    store.insert_setting_if_absent(SHOP_STATUS_KEY, &value)
}
