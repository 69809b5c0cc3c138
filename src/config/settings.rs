//! Versioned tunables shared by every instance through the `settings` key.
//!
//! Stored documents are never spread over defaults ad hoc: `migrate` lifts
//! whatever version is stored to the current schema, and `merge` applies an
//! admin patch one known field at a time.

use crate::error::ValidationError;
use crate::storage::{Store, keys};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const SETTINGS_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
  pub version: u32,
  pub large_tx_threshold: u64,
  pub launch_extension_secs: u64,
  pub ceiling_secs: u64,
  pub launch_default_secs: u64,
  pub reward_default_secs: u64,
  pub poll_interval_secs: u64,
  pub holder_interval_secs: u64,
  pub rpc_timeout_secs: u64,
  pub signature_batch: usize,
  pub initial_backfill: usize,
  pub ledger_capacity: usize,
  pub notification_capacity: usize,
  pub leaderboard_capacity: usize,
  pub snapshot_capacity: usize,
  pub top_holders: usize,
  pub token_decimals: u8,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      version: SETTINGS_VERSION,
      large_tx_threshold: 1_000_000,
      launch_extension_secs: 30,
      ceiling_secs: 600,
      launch_default_secs: 600,
      reward_default_secs: 3600,
      poll_interval_secs: 5,
      holder_interval_secs: 10,
      rpc_timeout_secs: 5,
      signature_batch: 25,
      initial_backfill: 10,
      ledger_capacity: 100,
      notification_capacity: 50,
      leaderboard_capacity: 5,
      snapshot_capacity: 20,
      top_holders: 20,
      token_decimals: 6,
    }
  }
}

/// Version 1 field names mapped onto their version 2 counterparts.
/// `maxCountdownMinutes` is handled separately because its unit changed.
const V1_RENAMES: &[(&str, &str)] = &[
  ("threshold", "largeTxThreshold"),
  ("countdownExtension", "launchExtensionSecs"),
  ("countdownDuration", "launchDefaultSecs"),
  ("rewardDuration", "rewardDefaultSecs"),
  ("pollInterval", "pollIntervalSecs"),
  ("holderInterval", "holderIntervalSecs"),
  ("maxTransactions", "ledgerCapacity"),
  ("maxNotifications", "notificationCapacity"),
];

impl Settings {
  /// Upgrades a stored document of any known version and merges it over the
  /// defaults. Unknown fields are dropped.
  pub fn migrate(raw: Value) -> Result<Self, ValidationError> {
    let Value::Object(mut doc) = raw else {
      return Err(ValidationError::Malformed("settings must be an object".into()));
    };

    let raw_version = doc.get("version").and_then(Value::as_u64).unwrap_or(1);
    let version = u32::try_from(raw_version).map_err(|_| ValidationError::Version(raw_version))?;

    match version {
      1 => {
        debug!("Migrating settings document from v1");
        doc = migrate_v1(doc)?;
      }
      SETTINGS_VERSION => {}
      other => return Err(ValidationError::Version(other.into())),
    }
    doc.remove("version");

    let mut settings = Settings::default();
    settings.merge(Value::Object(doc))?;
    Ok(settings)
  }

  /// Applies a partial patch field-by-field and re-validates. On error
  /// `self` is left untouched.
  pub fn merge(&mut self, patch: Value) -> Result<(), ValidationError> {
    let Value::Object(patch) = patch else {
      return Err(ValidationError::Malformed("settings patch must be an object".into()));
    };

    let mut current = match serde_json::to_value(&*self) {
      Ok(Value::Object(map)) => map,
      _ => return Err(ValidationError::Malformed("settings did not serialize to an object".into())),
    };

    for (key, value) in patch {
      if key == "version" {
        continue;
      }
      match current.get_mut(&key) {
        Some(slot) => *slot = value,
        None => warn!("Ignoring unknown settings field {}", key),
      }
    }

    let merged: Settings = serde_json::from_value(Value::Object(current))
      .map_err(|e| ValidationError::Malformed(e.to_string()))?;
    merged.validate()?;
    *self = merged;
    Ok(())
  }

  /// Reads the shared document, upgrading it if needed. Anything missing,
  /// malformed or invalid yields the defaults.
  pub async fn load(store: &Store) -> Settings {
    let Some(raw) = store.get::<Value>(keys::SETTINGS).await else {
      debug!("No stored settings, using defaults");
      return Settings::default();
    };

    let stored_version = raw.get("version").and_then(Value::as_u64);
    match Settings::migrate(raw) {
      Ok(settings) => {
        if stored_version != Some(SETTINGS_VERSION as u64) {
          store.set(keys::SETTINGS, &settings).await;
        }
        settings
      }
      Err(e) => {
        warn!("⚠️ Stored settings rejected ({}), using defaults", e);
        Settings::default()
      }
    }
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    check_range("largeTxThreshold", self.large_tx_threshold, 1, u64::MAX)?;
    check_range("launchExtensionSecs", self.launch_extension_secs, 1, 3600)?;
    check_range("ceilingSecs", self.ceiling_secs, 1, 86_400)?;
    check_range("launchDefaultSecs", self.launch_default_secs, 1, 86_400)?;
    check_range("rewardDefaultSecs", self.reward_default_secs, 1, 7 * 86_400)?;
    check_range("pollIntervalSecs", self.poll_interval_secs, 1, 60)?;
    check_range("holderIntervalSecs", self.holder_interval_secs, 1, 600)?;
    check_range("rpcTimeoutSecs", self.rpc_timeout_secs, 1, 60)?;
    check_range("signatureBatch", self.signature_batch as u64, 1, 1000)?;
    check_range("initialBackfill", self.initial_backfill as u64, 0, 1000)?;
    check_range("ledgerCapacity", self.ledger_capacity as u64, 1, 10_000)?;
    check_range("notificationCapacity", self.notification_capacity as u64, 1, 10_000)?;
    check_range("leaderboardCapacity", self.leaderboard_capacity as u64, 1, 1000)?;
    check_range("snapshotCapacity", self.snapshot_capacity as u64, 1, 1000)?;
    check_range("topHolders", self.top_holders as u64, 1, 1000)?;
    check_range("tokenDecimals", self.token_decimals as u64, 0, 18)?;

    if self.launch_default_secs > self.ceiling_secs {
      return Err(ValidationError::Inconsistent(format!(
        "launchDefaultSecs ({}) exceeds ceilingSecs ({})",
        self.launch_default_secs, self.ceiling_secs
      )));
    }
    Ok(())
  }
}

fn migrate_v1(mut doc: Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
  for (old, new) in V1_RENAMES {
    if let Some(value) = doc.remove(*old) {
      doc.insert(new.to_string(), value);
    }
  }
  if let Some(minutes) = doc.remove("maxCountdownMinutes").and_then(|v| v.as_u64()) {
    let secs = minutes.checked_mul(60).ok_or(ValidationError::Range {
      field: "maxCountdownMinutes",
      value: minutes,
      min: 1,
      max: u64::MAX / 60,
    })?;
    doc.insert("ceilingSecs".to_string(), Value::from(secs));
  }
  Ok(doc)
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
  if value < min || value > max {
    return Err(ValidationError::Range { field, value, min, max });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_defaults_validate() {
    assert!(Settings::default().validate().is_ok());
  }

  #[test]
  fn test_migrate_v1_document() {
    let settings = Settings::migrate(json!({
      "threshold": 500000,
      "countdownExtension": 45,
      "maxCountdownMinutes": 15,
      "someLegacyFlag": true
    }))
    .unwrap();

    assert_eq!(settings.version, SETTINGS_VERSION);
    assert_eq!(settings.large_tx_threshold, 500_000);
    assert_eq!(settings.launch_extension_secs, 45);
    assert_eq!(settings.ceiling_secs, 900);
    assert_eq!(settings.ledger_capacity, 100);
  }

  #[test]
  fn test_migrate_current_version_is_merge_over_defaults() {
    let settings = Settings::migrate(json!({
      "version": 2,
      "pollIntervalSecs": 8
    }))
    .unwrap();
    assert_eq!(settings.poll_interval_secs, 8);
    assert_eq!(settings.holder_interval_secs, 10);
  }

  #[test]
  fn test_migrate_rejects_future_version() {
    assert_eq!(
      Settings::migrate(json!({ "version": 9 })),
      Err(ValidationError::Version(9))
    );
  }

  #[test]
  fn test_migrate_rejects_oversized_version_and_minutes() {
    assert_eq!(
      Settings::migrate(json!({ "version": 4_294_967_297u64 })),
      Err(ValidationError::Version(4_294_967_297))
    );
    assert!(matches!(
      Settings::migrate(json!({ "maxCountdownMinutes": u64::MAX })),
      Err(ValidationError::Range { field: "maxCountdownMinutes", .. })
    ));
  }

  #[test]
  fn test_merge_rejects_inconsistent_patch_and_keeps_old_value() {
    let mut settings = Settings::default();
    let result = settings.merge(json!({ "launchDefaultSecs": 601 }));
    assert!(matches!(result, Err(ValidationError::Inconsistent(_))));
    assert_eq!(settings.launch_default_secs, 600);
  }

  #[test]
  fn test_merge_rejects_out_of_range() {
    let mut settings = Settings::default();
    let result = settings.merge(json!({ "pollIntervalSecs": 0 }));
    assert!(matches!(result, Err(ValidationError::Range { field: "pollIntervalSecs", .. })));
  }

  #[test]
  fn test_merge_rejects_wrong_type() {
    let mut settings = Settings::default();
    assert!(matches!(
      settings.merge(json!({ "ceilingSecs": "ten minutes" })),
      Err(ValidationError::Malformed(_))
    ));
  }

  #[tokio::test]
  async fn test_load_upgrades_and_rewrites_v1_document() {
    use crate::storage::LocalStore;
    use std::sync::Arc;

    let store = Store::new("shared", Arc::new(LocalStore::in_memory()));
    store.set(keys::SETTINGS, &json!({ "maxCountdownMinutes": 20 })).await;

    let settings = Settings::load(&store).await;
    assert_eq!(settings.ceiling_secs, 1200);

    let rewritten: Value = store.get(keys::SETTINGS).await.unwrap();
    assert_eq!(rewritten["version"], json!(SETTINGS_VERSION));
  }

  #[tokio::test]
  async fn test_load_falls_back_on_invalid_document() {
    use crate::storage::LocalStore;
    use std::sync::Arc;

    let store = Store::new("shared", Arc::new(LocalStore::in_memory()));
    store.set(keys::SETTINGS, &json!({ "version": 2, "pollIntervalSecs": 0 })).await;
    assert_eq!(Settings::load(&store).await, Settings::default());
  }
}
