//! Date separators for the message thread.

use chrono::{Local, NaiveDate, TimeZone};
use std::fmt::Display;

use crate::state::ChatMessage;

pub const TODAY_LABEL: &str = "Today";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineItem<'a> {
    DateSeparator { date: NaiveDate, label: String },
    Message(&'a ChatMessage),
}

/// Interleaves a separator before every message whose calendar date (in
/// `tz`) differs from the previous message's.
pub fn with_date_separators<'a, Tz: TimeZone>(
    messages: &'a [ChatMessage],
    tz: &Tz,
    today: NaiveDate,
) -> Vec<TimelineItem<'a>> {
    let mut items = Vec::with_capacity(messages.len() + 1);
    let mut last_date: Option<NaiveDate> = None;

    for message in messages {
        let date = message.sent_at.with_timezone(tz).date_naive();
        if last_date != Some(date) {
            last_date = Some(date);
            items.push(TimelineItem::DateSeparator {
                date,
                label: date_label(date, today),
            });
        }
        items.push(TimelineItem::Message(message));
    }

    items
}

/// [`with_date_separators`] in the local time zone.
pub fn local_timeline(messages: &[ChatMessage]) -> Vec<TimelineItem<'_>> {
    with_date_separators(messages, &Local, Local::now().date_naive())
}

pub fn date_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        TODAY_LABEL.to_string()
    } else {
        date.format("%Y/%m/%d").to_string()
    }
}

/// `HH:MM` of a message in `tz`.
pub fn time_label<Tz>(message: &ChatMessage, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    message.sent_at.with_timezone(tz).format("%H:%M").to_string()
}
