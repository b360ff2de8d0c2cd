//! Fan-out of price events to the users tracking a product.

use std::collections::HashMap;

use amezprice_core::{should_alert, PriceEvent};
use amezprice_db::{LogLevel, ProductRow, ProductTrackerRow, PushSubscriptionRow};
use amezprice_notify::templates::{self, ProductSummary, Recipient};
use amezprice_notify::{Delivery, EmailMessage, NotifyError, PushPayload, PushTarget};
use serde_json::json;

use crate::{record_activity, TrackerContext, TrackerError};

/// Delivery counts for one event or promotion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertSummary {
    pub recipients: u32,
    pub emails_sent: u32,
    pub pushes_sent: u32,
    pub failures: u32,
    pub subscriptions_removed: u32,
}

impl AlertSummary {
    #[must_use]
    pub fn delivered(&self) -> u32 {
        self.emails_sent + self.pushes_sent
    }
}

/// Outcome of pushing to every subscription a user has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PushFanout {
    pub sent: u32,
    pub failed: u32,
    pub removed: u32,
}

/// Groups subscriptions by user id.
pub(crate) fn subscriptions_by_user(
    rows: Vec<PushSubscriptionRow>,
) -> HashMap<i64, Vec<PushSubscriptionRow>> {
    let mut grouped: HashMap<i64, Vec<PushSubscriptionRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.user_id).or_default().push(row);
    }
    grouped
}

/// Sends `payload` to each subscription. Subscriptions the push service
/// reports gone are deleted.
pub(crate) async fn push_to_subscriptions(
    ctx: &TrackerContext,
    subscriptions: &[PushSubscriptionRow],
    payload: &PushPayload,
) -> PushFanout {
    let mut outcome = PushFanout::default();

    for sub in subscriptions {
        let target = PushTarget {
            endpoint: sub.endpoint.clone(),
            p256dh: sub.p256dh.clone(),
            auth: sub.auth_secret.clone(),
        };
        match ctx.notifier.push.send(&target, payload).await {
            Ok(Delivery::Sent) => {
                outcome.sent += 1;
                if let Err(e) = amezprice_db::touch_push_subscription(&ctx.pool, sub.id).await {
                    tracing::warn!(
                        subscription_id = sub.id,
                        error = %e,
                        "failed to touch push subscription"
                    );
                }
            }
            Ok(Delivery::Skipped) => {}
            Err(NotifyError::SubscriptionGone { status }) => {
                tracing::info!(
                    subscription_id = sub.id,
                    user_id = sub.user_id,
                    status,
                    "removing expired push subscription"
                );
                match amezprice_db::delete_push_subscription(&ctx.pool, sub.id).await {
                    Ok(_) => outcome.removed += 1,
                    Err(e) => tracing::warn!(
                        subscription_id = sub.id,
                        error = %e,
                        "failed to delete push subscription"
                    ),
                }
            }
            Err(e) => {
                outcome.failed += 1;
                tracing::warn!(subscription_id = sub.id, error = %e, "push delivery failed");
            }
        }
    }
    outcome
}

fn email_for(
    tracker: &ProductTrackerRow,
    product: ProductSummary<'_>,
    event: &PriceEvent,
) -> EmailMessage {
    let to = Recipient {
        email: &tracker.email,
        first_name: &tracker.first_name,
    };
    match *event {
        PriceEvent::PriceDrop { old, new } => templates::price_drop_email(to, product, old, new),
        PriceEvent::BackInStock { price } => templates::back_in_stock_email(to, product, price),
    }
}

fn push_for(product: ProductSummary<'_>, event: &PriceEvent) -> PushPayload {
    match *event {
        PriceEvent::PriceDrop { old, new } => templates::price_drop_push(product, old, new),
        PriceEvent::BackInStock { price } => templates::back_in_stock_push(product, price),
    }
}

/// Notifies everyone tracking `product` whose alert settings match `event`.
///
/// Delivery failures are counted, not returned.
///
/// # Errors
///
/// Returns [`TrackerError::Db`] if trackers or subscriptions cannot be
/// loaded.
pub async fn dispatch_price_event(
    ctx: &TrackerContext,
    product: &ProductRow,
    event: &PriceEvent,
) -> Result<AlertSummary, TrackerError> {
    let marketplace = product.marketplace()?;
    let summary_product = ProductSummary {
        name: &product.name,
        marketplace,
        url: &product.affiliate_url,
        image_url: product.image_url.as_deref(),
    };

    let trackers: Vec<ProductTrackerRow> =
        amezprice_db::list_product_trackers(&ctx.pool, product.id)
            .await?
            .into_iter()
            .filter(|t| should_alert(&t.preference(), event))
            .collect();

    let mut summary = AlertSummary::default();
    if trackers.is_empty() {
        return Ok(summary);
    }

    let push_user_ids: Vec<i64> = trackers
        .iter()
        .filter(|t| t.push_alert)
        .map(|t| t.user_id)
        .collect();
    let mut subscriptions = subscriptions_by_user(
        amezprice_db::list_push_subscriptions_for_users(&ctx.pool, &push_user_ids).await?,
    );
    let payload = push_for(summary_product, event);

    for tracker in &trackers {
        summary.recipients += 1;
        let mut delivered = false;

        if tracker.email_alert {
            match ctx
                .notifier
                .email
                .send(&email_for(tracker, summary_product, event))
                .await
            {
                Ok(Delivery::Sent) => {
                    summary.emails_sent += 1;
                    delivered = true;
                }
                Ok(Delivery::Skipped) => {}
                Err(e) => {
                    summary.failures += 1;
                    tracing::warn!(
                        user_id = tracker.user_id,
                        product_id = product.id,
                        error = %e,
                        "alert email failed"
                    );
                }
            }
        }

        if tracker.push_alert {
            if let Some(subs) = subscriptions.remove(&tracker.user_id) {
                let fanout = push_to_subscriptions(ctx, &subs, &payload).await;
                summary.pushes_sent += fanout.sent;
                summary.failures += fanout.failed;
                summary.subscriptions_removed += fanout.removed;
                delivered |= fanout.sent > 0;
            }
        }

        if delivered {
            amezprice_db::mark_tracking_alerted(&ctx.pool, tracker.user_id, product.id).await?;
        }
    }

    tracing::info!(
        product_id = product.id,
        event = event.as_str(),
        recipients = summary.recipients,
        emails_sent = summary.emails_sent,
        pushes_sent = summary.pushes_sent,
        failures = summary.failures,
        "price alert dispatched"
    );
    record_activity(
        &ctx.pool,
        if summary.failures > 0 {
            LogLevel::Warning
        } else {
            LogLevel::Info
        },
        "alert",
        &format!("{} alert for product {}", event.as_str(), product.id),
        None,
        json!({
            "product_id": product.id,
            "event": event,
            "recipients": summary.recipients,
            "emails_sent": summary.emails_sent,
            "pushes_sent": summary.pushes_sent,
            "failures": summary.failures,
            "subscriptions_removed": summary.subscriptions_removed,
        }),
    )
    .await;

    Ok(summary)
}
