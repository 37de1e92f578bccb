//! Storage key constants.

pub struct StorageKeys;

impl StorageKeys {
    pub const ACCESS_TOKEN: &'static str = "supabase_access_token";

    pub const REFRESH_TOKEN: &'static str = "supabase_refresh_token";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "supabase_session_meta";
}
