//! Admin back-office handlers.
//!
//! - `GET /api/v1/admin/dashboard`            headline counters
//! - `GET /api/v1/admin/users`                filtered user listing
//! - `GET|PATCH|DELETE /api/v1/admin/users/:id`
//! - `GET|DELETE /api/v1/admin/logs`          log viewer and purge
//! - `GET|POST /api/v1/admin/promotions`      list and queue promotions
//! - `GET /api/v1/admin/promotions/:id`       promotion with recipients
//! - `GET|POST /api/v1/admin/refresh-runs`    run history and manual refresh

mod dashboard;
mod logs;
mod promotions;
mod refresh_runs;
mod users;

pub(super) use dashboard::dashboard;
pub(super) use logs::{list_logs, purge_logs};
pub(super) use promotions::{create_promotion, get_promotion, list_promotions};
pub(super) use refresh_runs::{list_refresh_runs, trigger_refresh};
pub(super) use users::{delete_user, get_user, list_users, update_user};
