use chrono::{DateTime, Utc};

use crate::modules::message::{
    model::StatusChange,
    schema::{MessageEntity, MessageStatus},
};

impl MessageEntity {
    /// Sent/Delivered -> Delivered. A message already read stays read.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> StatusChange {
        if self.status != MessageStatus::Read {
            self.delivered_at = Some(now);
            self.status = MessageStatus::Delivered;
        }
        self.status_change()
    }

    /// Read implies delivered: an undelivered message is delivered first.
    pub fn mark_read(&mut self, now: DateTime<Utc>) -> StatusChange {
        if self.delivered_at.is_none() {
            self.mark_delivered(now);
        }
        self.read_at = Some(now);
        self.status = MessageStatus::Read;
        self.status_change()
    }

    pub fn status_change(&self) -> StatusChange {
        StatusChange { status: self.status, delivered_at: self.delivered_at, read_at: self.read_at }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::modules::message::schema::MessageType;

    fn sent_message() -> MessageEntity {
        MessageEntity {
            id: 5,
            sender_id: 1,
            recipient_id: Some(2),
            content: "hello".into(),
            media_url: None,
            message_type: MessageType::Direct,
            status: MessageStatus::Sent,
            sent_at: Utc::now(),
            delivered_at: None,
            read_at: None,
            sender: None,
            recipients: vec![],
        }
    }

    #[test]
    fn delivered_stamps_time() {
        let mut msg = sent_message();
        let now = Utc::now();
        let change = msg.mark_delivered(now);
        assert_eq!(change.status, MessageStatus::Delivered);
        assert_eq!(msg.delivered_at, Some(now));
        assert!(msg.read_at.is_none());
    }

    #[test]
    fn read_from_sent_implies_delivered() {
        let mut msg = sent_message();
        let now = Utc::now();
        msg.mark_read(now);
        assert_eq!(msg.status, MessageStatus::Read);
        assert_eq!(msg.delivered_at, Some(now));
        assert_eq!(msg.read_at, Some(now));
    }

    #[test]
    fn read_keeps_earlier_delivery_time() {
        let mut msg = sent_message();
        let delivered = Utc::now();
        let read = delivered + Duration::seconds(3);
        msg.mark_delivered(delivered);
        msg.mark_read(read);
        assert_eq!(msg.delivered_at, Some(delivered));
        assert!(msg.delivered_at <= msg.read_at);
    }

    #[test]
    fn read_twice_stays_read() {
        let mut msg = sent_message();
        let first = Utc::now();
        msg.mark_read(first);
        let change = msg.mark_read(first + Duration::seconds(1));
        assert_eq!(change.status, MessageStatus::Read);
        assert!(change.delivered_at <= change.read_at);
    }

    #[test]
    fn delivered_never_regresses_read() {
        let mut msg = sent_message();
        let read = Utc::now();
        msg.mark_read(read);
        let change = msg.mark_delivered(read + Duration::seconds(10));
        assert_eq!(change.status, MessageStatus::Read);
        assert_eq!(change.delivered_at, Some(read));
    }
}
