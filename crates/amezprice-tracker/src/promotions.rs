//! Delivery of admin-authored promotions.

use amezprice_db::{AudienceMember, LogLevel, PromotionCounters, PromotionRow};
use amezprice_notify::templates::{self, Recipient};
use amezprice_notify::Delivery;
use serde_json::json;

use crate::alerts::{push_to_subscriptions, subscriptions_by_user};
use crate::{record_activity, TrackerContext, TrackerError};

const CHANNEL_EMAIL: &str = "email";
const CHANNEL_PUSH: &str = "push";

#[derive(Debug, Default)]
struct Tally {
    emails_sent: u32,
    pushes_sent: u32,
    failures: u32,
}

impl Tally {
    fn counters(&self) -> PromotionCounters {
        let clamp = |n: u32| i32::try_from(n).unwrap_or(i32::MAX);
        PromotionCounters {
            emails_sent: clamp(self.emails_sent),
            pushes_sent: clamp(self.pushes_sent),
            failures: clamp(self.failures),
        }
    }
}

async fn record_recipient(
    ctx: &TrackerContext,
    promotion_id: i64,
    user_id: i64,
    channel: &str,
    status: &str,
    error: Option<&str>,
) -> Result<(), TrackerError> {
    amezprice_db::record_promotion_recipient(
        &ctx.pool,
        promotion_id,
        user_id,
        channel,
        status,
        error,
    )
    .await?;
    Ok(())
}

async fn fail_promotion_best_effort(ctx: &TrackerContext, promotion_id: i64, message: &str) {
    if let Err(e) = amezprice_db::fail_promotion(&ctx.pool, promotion_id, message).await {
        tracing::error!(promotion_id, error = %e, "failed to mark promotion as failed");
    }
    record_activity(
        &ctx.pool,
        LogLevel::Error,
        "promotion",
        &format!("promotion {promotion_id} failed"),
        None,
        json!({ "promotion_id": promotion_id, "error": message }),
    )
    .await;
}

/// Sends a queued promotion to its audience (queued → sending →
/// completed/failed). Every attempted delivery gets a
/// `promotion_recipients` row.
///
/// # Errors
///
/// Returns [`TrackerError::Db`] if the promotion cannot be loaded or its
/// state cannot be advanced. The promotion is marked failed when possible.
pub async fn dispatch_promotion(
    ctx: &TrackerContext,
    promotion_id: i64,
) -> Result<PromotionCounters, TrackerError> {
    let promotion = amezprice_db::get_promotion(&ctx.pool, promotion_id).await?;
    let audience = amezprice_db::list_promotion_audience(
        &ctx.pool,
        promotion.audience()?,
        &promotion.selected_user_ids,
    )
    .await?;

    let total = i32::try_from(audience.len()).unwrap_or(i32::MAX);
    amezprice_db::start_promotion(&ctx.pool, promotion_id, total).await?;
    tracing::info!(promotion_id, recipients = audience.len(), "promotion started");

    let tally = match deliver(ctx, &promotion, &audience).await {
        Ok(tally) => tally,
        Err(e) => {
            fail_promotion_best_effort(ctx, promotion_id, &e.to_string()).await;
            return Err(e);
        }
    };

    let counters = tally.counters();
    if let Err(e) = amezprice_db::complete_promotion(&ctx.pool, promotion_id, counters).await {
        fail_promotion_best_effort(ctx, promotion_id, &e.to_string()).await;
        return Err(e.into());
    }

    tracing::info!(
        promotion_id,
        emails_sent = tally.emails_sent,
        pushes_sent = tally.pushes_sent,
        failures = tally.failures,
        "promotion completed"
    );
    record_activity(
        &ctx.pool,
        if tally.failures > 0 {
            LogLevel::Warning
        } else {
            LogLevel::Info
        },
        "promotion",
        &format!("promotion {promotion_id} sent"),
        promotion.created_by,
        json!({
            "promotion_id": promotion_id,
            "recipients": total,
            "emails_sent": counters.emails_sent,
            "pushes_sent": counters.pushes_sent,
            "failures": counters.failures,
        }),
    )
    .await;

    Ok(counters)
}

async fn deliver(
    ctx: &TrackerContext,
    promotion: &PromotionRow,
    audience: &[AudienceMember],
) -> Result<Tally, TrackerError> {
    let channel = promotion.channel()?;
    let mut tally = Tally::default();

    let mut subscriptions = if channel.sends_push() {
        let user_ids: Vec<i64> = audience.iter().map(|m| m.user_id).collect();
        subscriptions_by_user(
            amezprice_db::list_push_subscriptions_for_users(&ctx.pool, &user_ids).await?,
        )
    } else {
        Default::default()
    };

    let link = promotion
        .link_url
        .as_deref()
        .unwrap_or(ctx.settings.public_url.as_str());
    let payload = templates::promotion_push(&promotion.subject, &promotion.body, link);

    for member in audience {
        if channel.sends_email() {
            let email = templates::promotion_email(
                Recipient {
                    email: &member.email,
                    first_name: &member.first_name,
                },
                &promotion.subject,
                &promotion.body,
                promotion.link_url.as_deref(),
                &ctx.settings.public_url,
            );
            match ctx.notifier.email.send(&email).await {
                Ok(Delivery::Sent) => {
                    tally.emails_sent += 1;
                    record_recipient(ctx, promotion.id, member.user_id, CHANNEL_EMAIL, "sent", None)
                        .await?;
                }
                Ok(Delivery::Skipped) => {
                    record_recipient(
                        ctx,
                        promotion.id,
                        member.user_id,
                        CHANNEL_EMAIL,
                        "skipped",
                        Some("email delivery disabled"),
                    )
                    .await?;
                }
                Err(e) => {
                    tally.failures += 1;
                    tracing::warn!(
                        promotion_id = promotion.id,
                        user_id = member.user_id,
                        error = %e,
                        "promotion email failed"
                    );
                    let message = e.to_string();
                    record_recipient(
                        ctx,
                        promotion.id,
                        member.user_id,
                        CHANNEL_EMAIL,
                        "failed",
                        Some(&message),
                    )
                    .await?;
                }
            }
        }

        if channel.sends_push() {
            let Some(subs) = subscriptions.remove(&member.user_id) else {
                record_recipient(
                    ctx,
                    promotion.id,
                    member.user_id,
                    CHANNEL_PUSH,
                    "skipped",
                    Some("no push subscription"),
                )
                .await?;
                continue;
            };

            let fanout = push_to_subscriptions(ctx, &subs, &payload).await;
            tally.pushes_sent += fanout.sent;
            tally.failures += fanout.failed;
            let (status, error) = if fanout.sent > 0 {
                ("sent", None)
            } else if fanout.failed > 0 {
                ("failed", Some("push delivery failed"))
            } else {
                ("skipped", Some("no live push subscription"))
            };
            record_recipient(ctx, promotion.id, member.user_id, CHANNEL_PUSH, status, error)
                .await?;
        }
    }

    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_converts_to_counters() {
        let tally = Tally {
            emails_sent: 4,
            pushes_sent: 2,
            failures: 1,
        };
        assert_eq!(
            tally.counters(),
            PromotionCounters {
                emails_sent: 4,
                pushes_sent: 2,
                failures: 1,
            }
        );
    }
}
