// Lua scripts run atomically on the node
// KEYS[1] is the storage key, ARGV[1] the expected token

/// Delete the key only while it still holds the caller's token
pub(crate) const COMPARE_AND_DELETE: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// Reset the ttl (ARGV[2], milliseconds) only while the key holds the caller's token
pub(crate) const COMPARE_AND_PEXPIRE: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('pexpire', KEYS[1], ARGV[2])
else
    return 0
end
"#;
