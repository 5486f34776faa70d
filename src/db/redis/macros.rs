/// A macro to simplify caching logic using Redis.
///
/// Checks whether a value is present in the cache. If found, it returns
/// the cached value. If not, it executes the provided block to compute
/// the value, schedules a background cache write, and returns the
/// computed value.
///
/// # Arguments
/// * `$cache`: The cache instance, providing `get_from_cache` and
///   `set_in_background`.
/// * `$key`: The key to cache the value under.
/// * `$ttl`: The time-to-live for the cached value in seconds.
/// * `$block`: The block of code to execute on a cache miss.
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        // Attempt to get the value from cache
        if let Some(cached) = $cache.get_from_cache(&$key).await? {
            Ok(cached)
        } else {
            // If not in cache, execute the block to compute the value
            let value = $block.await?;
            // Store the computed value in cache
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
