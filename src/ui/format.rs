use chrono::{DateTime, Utc};

use crate::common::{Chatroom, Message};

/// Short relative age, e.g. "just now", "5m ago", "3h ago"; older than a
/// week falls back to the calendar date.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at);
    let seconds = elapsed.num_seconds();
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3_600 {
        format!("{}m ago", elapsed.num_minutes())
    } else if seconds < 86_400 {
        format!("{}h ago", elapsed.num_hours())
    } else if elapsed.num_days() < 7 {
        format!("{}d ago", elapsed.num_days())
    } else {
        at.format("%Y-%m-%d").to_string()
    }
}

pub fn message_line(message: &Message, unread: bool, now: DateTime<Utc>) -> String {
    let sender = message
        .sender_name
        .clone()
        .unwrap_or_else(|| format!("user {}", message.sender_id));
    format!(
        "{} [{}] {}: {}",
        if unread { "*" } else { " " },
        relative_time(message.created_at, now),
        sender,
        message.content
    )
}

pub fn chatroom_line(chatroom: &Chatroom) -> String {
    let order = chatroom
        .order_id
        .map(|id| format!(" (order #{id})"))
        .unwrap_or_default();
    let badge = match chatroom.unread_count {
        0 => String::new(),
        n => format!(" [{n} unread]"),
    };
    format!("#{} {}{}{}", chatroom.chatroom_id, chatroom.other_user_name, order, badge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now - Duration::seconds(10), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(relative_time(now - Duration::days(30), now), "2024-05-11");
    }

    #[test]
    fn test_chatroom_line_shows_order_and_badge() {
        let room = Chatroom {
            chatroom_id: 4,
            other_user_name: "VinFast dealer".to_string(),
            order_id: Some(12),
            unread_count: 2,
            last_message: None,
            last_message_at: None,
        };
        assert_eq!(chatroom_line(&room), "#4 VinFast dealer (order #12) [2 unread]");
    }
}
