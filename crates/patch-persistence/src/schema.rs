//! Esquema Diesel. Debe coincidir columna a columna con `migrations/`.

diesel::table! {
    lob_applications (lob_app_id) {
        lob_app_id -> BigInt,
        application_name -> Text,
        lob -> Text,
        auto_resolve -> Bool,
        environment -> Text,
        git_remote_url -> Text,
        lookup_branch_pattern -> Text,
        filter_pii -> Bool,
        notification_dls -> Text,
        app_info_actuator_url -> Nullable<Text>,
        jira_projects_url -> Nullable<Text>,
        app_dynamics_url -> Nullable<Text>,
        created_ts -> Timestamptz,
        updated_ts -> Timestamptz,
    }
}

diesel::table! {
    error_events (event_id) {
        event_id -> BigInt,
        lob_app_id -> BigInt,
        event_state -> Text,
        correlation_id -> Text,
        span_id -> Nullable<Text>,
        stacktrace -> Text,
        origin_method -> Text,
        origin_class -> Nullable<Text>,
        origin_line -> Nullable<Integer>,
        occurrence_count -> Integer,
        error_ts -> Timestamptz,
        resolution -> Nullable<Text>,
        confidence -> Nullable<Double>,
        pull_request_url -> Nullable<Text>,
        resolution_acceptance_state -> Nullable<Text>,
        user_feedback -> Nullable<Text>,
        source_branch -> Nullable<Text>,
        jira_ids -> Nullable<Text>,
        created_ts -> Timestamptz,
        updated_ts -> Timestamptz,
    }
}

diesel::joinable!(error_events -> lob_applications (lob_app_id));

diesel::allow_tables_to_appear_in_same_query!(
    error_events,
    lob_applications,
);
