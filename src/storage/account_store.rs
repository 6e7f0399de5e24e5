use crate::domain::types::Account;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use serde::{de::DeserializeOwned, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, LogPriorityLevels)]
enum StoreLogPriority {
    #[log_level(capacity = 200, name = "STORE_ERROR")]
    Error,
}

impl GetLogFilter for StoreLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

/// Logical cache key of the single active account per client instance.
pub const ACCOUNT_KEY: &str = "account.active";

/// External key-value cache the active account is mirrored into.
pub trait AccountCache {
    fn load(&self, key: &str) -> Option<Vec<u8>>;
    fn save(&self, key: &str, value: Vec<u8>);
    fn remove(&self, key: &str);
}

#[derive(Default)]
pub struct InMemoryAccountCache {
    entries: RefCell<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryAccountCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountCache for InMemoryAccountCache {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.borrow().get(key).cloned()
    }

    fn save(&self, key: &str, value: Vec<u8>) {
        self.entries.borrow_mut().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// Single-owner cell holding the active account.
///
/// Reads and writes are synchronous and last-write-wins; a write replaces the
/// whole record. Borrows never outlive a call, so nothing is held across an
/// await point.
#[derive(Default)]
pub struct AccountStore {
    current: RefCell<Option<Account>>,
    cache: Option<Box<dyn AccountCache>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Box<dyn AccountCache>) -> Self {
        Self {
            current: RefCell::new(None),
            cache: Some(cache),
        }
    }

    /// Rehydrate from the cache. Undecodable entries read as absent.
    pub fn restore(cache: Box<dyn AccountCache>) -> Self {
        let account = read_json::<Account>(cache.load(ACCOUNT_KEY).as_deref());
        Self {
            current: RefCell::new(account),
            cache: Some(cache),
        }
    }

    pub fn get(&self) -> Option<Account> {
        self.current.borrow().clone()
    }

    pub fn set(&self, account: Account) {
        if let Some(cache) = &self.cache {
            mirror_json(&**cache, ACCOUNT_KEY, &account);
        }
        *self.current.borrow_mut() = Some(account);
    }

    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.remove(ACCOUNT_KEY);
        }
        self.current.borrow_mut().take();
    }
}

/// Save `value` under `key`. When encoding fails the entry is dropped so a
/// later `restore` cannot resurrect an older record.
fn mirror_json<T: Serialize + ?Sized>(cache: &dyn AccountCache, key: &str, value: &T) {
    match encode_json(value) {
        Ok(raw) => cache.save(key, raw),
        Err(error) => {
            log!(
                StoreLogPriority::Error,
                "cache_write_skipped key={key} error={error}"
            );
            cache.remove(key);
        }
    }
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, String> {
    serde_json::to_vec(value).map_err(|error| {
        format!(
            "failed to encode {}: {error}",
            std::any::type_name::<T>()
        )
    })
}

fn read_json<T: DeserializeOwned>(value: Option<&[u8]>) -> Option<T> {
    value.and_then(|raw| serde_json::from_slice(raw).ok())
}
