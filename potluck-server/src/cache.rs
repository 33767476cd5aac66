use quick_cache::sync::Cache;
use quick_cache::Weighter;
use std::sync::Arc;

pub type MediaCache = Arc<Cache<MediaKey, MediaBytes, ValueWeighter>>;

pub fn new_cache() -> MediaCache {
    Arc::new(Cache::with_weighter(1000, 50 << 20, ValueWeighter))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaKey(pub String);

pub type MediaBytes = Arc<Vec<u8>>;

#[derive(Clone)]
pub struct ValueWeighter;

impl Weighter<MediaKey, MediaBytes> for ValueWeighter {
    fn weight(&self, _key: &MediaKey, val: &MediaBytes) -> u64 {
        // Zero-weight entries would never be evicted
        (val.len() as u64).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_can_be_evicted_by_key() {
        let cache = new_cache();
        let key = MediaKey("media/recipe/1/main.png".into());
        cache.insert(key.clone(), Arc::new(vec![1, 2, 3]));
        assert_eq!(cache.get(&key).unwrap().len(), 3);
        cache.remove(&key);
        assert!(cache.get(&key).is_none());
    }
}
