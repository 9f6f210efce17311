mod cancel;

pub use cancel::CancelToken;

/// Add `amount` to the entry for `key`, failing on overflow
pub fn checked_map_add<K: std::hash::Hash + Eq>(
    map: &mut std::collections::HashMap<K, u64>,
    key: K,
    amount: u64,
) -> Option<()> {
    let entry = map.entry(key).or_insert(0);
    *entry = entry.checked_add(amount)?;
    Some(())
}

/// Subtract `amount` from the entry for `key`, dropping it at zero.
/// Fails when the entry is missing or too small.
pub fn checked_map_sub<K: std::hash::Hash + Eq>(
    map: &mut std::collections::HashMap<K, u64>,
    key: &K,
    amount: u64,
) -> Option<()>
where
    K: Clone,
{
    let entry = map.get_mut(key)?;
    *entry = entry.checked_sub(amount)?;
    if *entry == 0 {
        map.remove(key);
    }
    Some(())
}
