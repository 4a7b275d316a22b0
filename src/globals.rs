//! Process-wide named singletons: a write-once `put`/`get`/`has` map,
//! implemented with an `once_cell`/`parking_lot` idiom for process
//! statics instead of a bare `static mut`.

use crate::error::Error;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type AnyValue = Arc<dyn Any + Send + Sync>;

static GLOBALS: Lazy<RwLock<HashMap<String, AnyValue>>> = Lazy::new(<_>::default);

/// Write a value under `key`. A key may be written at most once; a
/// second write is a hard error, not an overwrite.
pub fn put<T: Any + Send + Sync>(key: &str, value: T) -> Result<(), Error> {
    let mut map = GLOBALS.write();
    if map.contains_key(key) {
        return Err(Error::AlreadySet(key.to_owned()));
    }
    map.insert(key.to_owned(), Arc::new(value));
    Ok(())
}

pub fn has(key: &str) -> bool {
    GLOBALS.read().contains_key(key)
}

/// Read a value previously stored under `key`, downcast to `T`.
pub fn get<T: Any + Send + Sync + Clone>(key: &str) -> Option<T> {
    GLOBALS
        .read()
        .get(key)
        .and_then(|v| v.downcast_ref::<T>())
        .cloned()
}

/// Retrieve the raw `Arc` without requiring `Clone` on `T`, for reference
/// types shared across components (the bus, the registry, the macro
/// publisher).
pub fn get_arc<T: Any + Send + Sync>(key: &str) -> Option<Arc<T>> {
    GLOBALS.read().get(key).and_then(|v| {
        let v = v.clone();
        v.downcast::<T>().ok()
    })
}

/// Used only by tests: resets the map between independent test cases that
/// each want to exercise write-once semantics from a clean slate.
#[cfg(test)]
pub(crate) fn clear_for_test() {
    GLOBALS.write().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_once_then_reject_second_write() {
        clear_for_test();
        assert!(put("answer", 42i32).is_ok());
        assert!(has("answer"));
        assert_eq!(get::<i32>("answer"), Some(42));
        let err = put("answer", 7i32).unwrap_err();
        assert!(matches!(err, Error::AlreadySet(_)));
    }

    #[test]
    fn missing_key_is_none() {
        clear_for_test();
        assert!(!has("nope"));
        assert_eq!(get::<i32>("nope"), None);
    }
}
