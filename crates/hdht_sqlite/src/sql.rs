//! SQL text for the dht database, one file per statement.

pub mod sql_dht {
    pub const UPSERT_ENTRY: &str = include_str!("sql/dht/upsert_entry.sql");
    pub const GET_ENTRY: &str = include_str!("sql/dht/get_entry.sql");
    pub const SET_STATUS: &str = include_str!("sql/dht/set_status.sql");
    pub const SET_REPLACED_BY: &str = include_str!("sql/dht/set_replaced_by.sql");
    pub const ITERATE_ENTRIES: &str = include_str!("sql/dht/iterate_entries.sql");

    pub const LINK_EXISTS: &str = include_str!("sql/dht/link_exists.sql");
    pub const GET_LINKS: &str = include_str!("sql/dht/get_links.sql");
    pub const ALL_LINK_EVENTS: &str = include_str!("sql/dht/all_link_events.sql");

    pub const CURRENT_IDX: &str = include_str!("sql/dht/current_idx.sql");
    pub const INSERT_CHANGE: &str = include_str!("sql/dht/insert_change.sql");
    pub const GET_CHANGE: &str = include_str!("sql/dht/get_change.sql");
    pub const CHANGES_SINCE: &str = include_str!("sql/dht/changes_since.sql");

    pub const INSERT_FINGERPRINT: &str = include_str!("sql/dht/insert_fingerprint.sql");
    pub const GET_FINGERPRINT: &str = include_str!("sql/dht/get_fingerprint.sql");

    pub mod gossiper {
        pub const GET: &str = include_str!("sql/dht/get_gossiper.sql");
        pub const UPDATE: &str = include_str!("sql/dht/update_gossiper.sql");
        pub const DELETE: &str = include_str!("sql/dht/delete_gossiper.sql");
        pub const ALL: &str = include_str!("sql/dht/all_gossipers.sql");
    }

    pub mod peer_list {
        pub const INSERT: &str = include_str!("sql/dht/insert_peer_list.sql");
        pub const GET: &str = include_str!("sql/dht/get_peer_list.sql");
        pub const CONTAINS: &str = include_str!("sql/dht/peer_in_list.sql");
    }
}
