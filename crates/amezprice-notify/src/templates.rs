//! Notification copy for price alerts and promotions.

use amezprice_core::{discount_percent, Marketplace};
use rust_decimal::Decimal;

use crate::email::EmailMessage;
use crate::push::PushPayload;

/// The product fields alert copy needs.
#[derive(Debug, Clone, Copy)]
pub struct ProductSummary<'a> {
    pub name: &'a str,
    pub marketplace: Marketplace,
    /// Link the user should follow (affiliate URL when available).
    pub url: &'a str,
    pub image_url: Option<&'a str>,
}

/// Who an email is addressed to.
#[derive(Debug, Clone, Copy)]
pub struct Recipient<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `₹1,299.00` style rendering with Indian digit grouping.
#[must_use]
pub fn format_inr(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let grouped = if whole.len() <= 3 {
        whole.to_owned()
    } else {
        let (head, tail) = whole.split_at(whole.len() - 3);
        let mut groups: Vec<&str> = Vec::new();
        let mut rest = head;
        while rest.len() > 2 {
            let (left, right) = rest.split_at(rest.len() - 2);
            groups.push(right);
            rest = left;
        }
        groups.push(rest);
        groups.reverse();
        format!("{},{tail}", groups.join(","))
    };

    format!("{}₹{grouped}.{fraction}", if negative { "-" } else { "" })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_owned()
    } else {
        let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn greeting(first_name: &str) -> String {
    if first_name.trim().is_empty() {
        "Hi".to_owned()
    } else {
        format!("Hi {}", first_name.trim())
    }
}

fn html_layout(heading: &str, paragraphs: &[String], cta_label: &str, cta_url: &str) -> String {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<p>{p}</p>\n"))
        .collect();
    format!(
        "<!DOCTYPE html>\n<html><body style=\"font-family:sans-serif\">\n\
         <h2>{}</h2>\n{body}<p><a href=\"{}\">{}</a></p>\n\
         <p style=\"color:#888;font-size:12px\">You are receiving this because of your \
         AmezPrice alert settings.</p>\n</body></html>\n",
        escape_html(heading),
        escape_html(cta_url),
        escape_html(cta_label),
    )
}

#[must_use]
pub fn price_drop_email(
    to: Recipient<'_>,
    product: ProductSummary<'_>,
    old: Decimal,
    new: Decimal,
) -> EmailMessage {
    let saved = discount_percent(old, new)
        .map(|pct| format!(" ({pct}% off)"))
        .unwrap_or_default();
    let subject = format!("Price drop: {}", truncate(product.name, 60));
    let line = format!(
        "{} on {} dropped from {} to {}{saved}.",
        product.name,
        product.marketplace.display_name(),
        format_inr(old),
        format_inr(new),
    );

    EmailMessage {
        to: to.email.to_owned(),
        to_name: Some(to.first_name.to_owned()).filter(|n| !n.is_empty()),
        html_body: html_layout(
            &subject,
            &[
                format!("{},", escape_html(&greeting(to.first_name))),
                escape_html(&line),
            ],
            "View deal",
            product.url,
        ),
        text_body: format!(
            "{},\n\n{line}\n\nView deal: {}\n",
            greeting(to.first_name),
            product.url
        ),
        subject,
    }
}

#[must_use]
pub fn back_in_stock_email(
    to: Recipient<'_>,
    product: ProductSummary<'_>,
    price: Option<Decimal>,
) -> EmailMessage {
    let subject = format!("Back in stock: {}", truncate(product.name, 60));
    let price_part = price
        .map(|p| format!(" at {}", format_inr(p)))
        .unwrap_or_default();
    let line = format!(
        "{} is available again on {}{price_part}.",
        product.name,
        product.marketplace.display_name(),
    );

    EmailMessage {
        to: to.email.to_owned(),
        to_name: Some(to.first_name.to_owned()).filter(|n| !n.is_empty()),
        html_body: html_layout(
            &subject,
            &[
                format!("{},", escape_html(&greeting(to.first_name))),
                escape_html(&line),
            ],
            "Buy now",
            product.url,
        ),
        text_body: format!(
            "{},\n\n{line}\n\nBuy now: {}\n",
            greeting(to.first_name),
            product.url
        ),
        subject,
    }
}

/// Promotional email. `body` is plain text; blank lines separate paragraphs.
#[must_use]
pub fn promotion_email(
    to: Recipient<'_>,
    subject: &str,
    body: &str,
    link_url: Option<&str>,
    fallback_url: &str,
) -> EmailMessage {
    let url = link_url.unwrap_or(fallback_url);
    let mut paragraphs = vec![format!("{},", escape_html(&greeting(to.first_name)))];
    paragraphs.extend(
        body.split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| escape_html(p).replace('\n', "<br>")),
    );

    EmailMessage {
        to: to.email.to_owned(),
        to_name: Some(to.first_name.to_owned()).filter(|n| !n.is_empty()),
        subject: subject.to_owned(),
        html_body: html_layout(subject, &paragraphs, "Open AmezPrice", url),
        text_body: format!("{},\n\n{}\n\n{url}\n", greeting(to.first_name), body.trim()),
    }
}

#[must_use]
pub fn price_drop_push(product: ProductSummary<'_>, old: Decimal, new: Decimal) -> PushPayload {
    let saved = discount_percent(old, new)
        .map(|pct| format!(" ({pct}% off)"))
        .unwrap_or_default();
    PushPayload {
        title: "Price drop".to_owned(),
        body: format!(
            "{}: {} → {}{saved}",
            truncate(product.name, 80),
            format_inr(old),
            format_inr(new)
        ),
        url: product.url.to_owned(),
        icon: product.image_url.map(str::to_owned),
    }
}

#[must_use]
pub fn back_in_stock_push(product: ProductSummary<'_>, price: Option<Decimal>) -> PushPayload {
    let body = match price {
        Some(p) => format!("{} is back at {}", truncate(product.name, 80), format_inr(p)),
        None => format!("{} is back in stock", truncate(product.name, 80)),
    };
    PushPayload {
        title: "Back in stock".to_owned(),
        body,
        url: product.url.to_owned(),
        icon: product.image_url.map(str::to_owned),
    }
}

#[must_use]
pub fn promotion_push(subject: &str, body: &str, url: &str) -> PushPayload {
    PushPayload {
        title: truncate(subject, 80),
        body: truncate(body.trim(), 240),
        url: url.to_owned(),
        icon: None,
    }
}
