//! Database access for chgk-import
//!
//! The schema lives in `chgk_common::db::init`; this module holds the
//! queries the import service runs against it.

pub mod jobs;

pub use jobs::{
    claim_next_job, insert_job, list_jobs_for_owner, load_job, recover_interrupted_jobs,
    update_job,
};
