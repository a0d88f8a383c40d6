#![allow(unused_import_braces, unreachable_pub)]

diesel::table! {
    job_sites (id) {
        id -> Uuid,
        name -> Text,
        address -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use swms_core::JobStatusMapping;

    swms_jobs (id) {
        id -> Uuid,
        job_site_id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        start_date -> Date,
        end_date -> Nullable<Date>,
        status -> JobStatusMapping,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    contractors (id) {
        id -> Uuid,
        name -> Text,
        abn -> Nullable<Text>,
        contact_email -> Nullable<Text>,
        contact_phone -> Nullable<Text>,
        active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use swms_core::SubmissionStatusMapping;

    swms_submissions (id) {
        id -> Uuid,
        swms_job_id -> Uuid,
        contractor_id -> Uuid,
        worker_id -> Nullable<Uuid>,
        status -> SubmissionStatusMapping,
        created_at -> Timestamptz,
        reviewed_at -> Nullable<Timestamptz>,
        reviewed_by -> Nullable<Text>,
        notes -> Nullable<Text>,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use swms_core::CampaignStatusMapping;

    swms_email_campaigns (id) {
        id -> Uuid,
        swms_job_id -> Nullable<Uuid>,
        job_site_id -> Nullable<Uuid>,
        campaign_type -> Text,
        status -> CampaignStatusMapping,
        message -> Nullable<Text>,
        scheduled_date -> Timestamptz,
        created_by -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use swms_core::DeliveryStatusMapping;

    swms_email_sends (id) {
        id -> Uuid,
        campaign_id -> Uuid,
        contractor_id -> Uuid,
        email_address -> Text,
        portal_token -> Text,
        token_expires_at -> Timestamptz,
        delivery_status -> DeliveryStatusMapping,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use swms_core::AuditResultMapping;

    notification_audits (id) {
        id -> Uuid,
        kind -> Text,
        payload -> Jsonb,
        result -> AuditResultMapping,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    swms_audit_log (id) {
        id -> Uuid,
        table_name -> Text,
        record_id -> Uuid,
        action -> Text,
        changed_by -> Text,
        job_site_id -> Nullable<Uuid>,
        details -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sessions (id) {
        id -> Integer,
        token -> Uuid,
        user_email -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(swms_jobs -> job_sites (job_site_id));
diesel::joinable!(swms_submissions -> swms_jobs (swms_job_id));
diesel::joinable!(swms_submissions -> contractors (contractor_id));
diesel::joinable!(swms_email_campaigns -> swms_jobs (swms_job_id));
diesel::joinable!(swms_email_sends -> swms_email_campaigns (campaign_id));
diesel::joinable!(swms_email_sends -> contractors (contractor_id));

diesel::allow_tables_to_appear_in_same_query!(
    job_sites,
    swms_jobs,
    contractors,
    swms_submissions,
    swms_email_campaigns,
    swms_email_sends,
);
