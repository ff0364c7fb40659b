// Diesel table definitions. Kept in sync with repository/migrations.rs by hand.

diesel::table! {
    documents (id) {
        id -> Text,
        url -> Text,
        netloc -> Text,
        status -> Nullable<Integer>,
        seen_time -> Text,
        parent -> Nullable<Text>,
        html -> Nullable<Text>,
        title -> Nullable<Text>,
        body -> Nullable<Text>,
        emails -> Text,
        pgp_keys -> Text,
        links -> Text,
        images -> Text,
        addresses -> Text,
        capture_id -> Nullable<Text>,
        is_onion -> Bool,
        in_scope -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    jobs (id) {
        id -> Integer,
        queue -> Text,
        kind -> Text,
        payload -> Text,
        status -> Text,
        enqueued_at -> BigInt,
        expires_at -> BigInt,
        started_at -> Nullable<BigInt>,
        finished_at -> Nullable<BigInt>,
        result_ttl_ms -> BigInt,
        result -> Nullable<Text>,
        error -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(documents, jobs);
