//! Key layout for message records.

use shared_types::{DomainContext, MessageId};

pub const MESSAGE_SECTION: &str = "msg";
pub const ATTEMPT_SECTION: &str = "att";
pub const PAYLOAD_SECTION: &str = "payload";

pub fn message_key(ctx: &DomainContext, id: &MessageId) -> Vec<u8> {
    with_suffix(ctx.key_prefix(MESSAGE_SECTION), id.as_str())
}

pub fn payload_key(ctx: &DomainContext, id: &MessageId) -> Vec<u8> {
    with_suffix(ctx.key_prefix(PAYLOAD_SECTION), id.as_str())
}

/// Prefix of all attempts of one message. The trailing `/` keeps `m1` from
/// matching `m10`.
pub fn attempt_prefix(ctx: &DomainContext, id: &MessageId) -> Vec<u8> {
    with_suffix(ctx.key_prefix(ATTEMPT_SECTION), &format!("{}/", id.as_str()))
}

/// Zero-padded so lexicographic order is sequence order.
pub fn attempt_key(ctx: &DomainContext, id: &MessageId, sequence: u32) -> Vec<u8> {
    let mut key = attempt_prefix(ctx, id);
    key.extend_from_slice(format!("{:010}", sequence).as_bytes());
    key
}

fn with_suffix(mut prefix: Vec<u8>, suffix: &str) -> Vec<u8> {
    prefix.extend_from_slice(suffix.as_bytes());
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_keys_sort_by_sequence() {
        let ctx = DomainContext::default_domain();
        let id = MessageId::new("m1").unwrap();
        assert!(attempt_key(&ctx, &id, 2) < attempt_key(&ctx, &id, 10));
        assert!(attempt_key(&ctx, &id, 1).starts_with(&attempt_prefix(&ctx, &id)));

        let other = MessageId::new("m10").unwrap();
        assert!(!attempt_key(&ctx, &other, 1).starts_with(&attempt_prefix(&ctx, &id)));
    }

    #[test]
    fn test_message_key_layout() {
        let ctx = DomainContext::default_domain();
        let id = MessageId::new("abc@x").unwrap();
        assert_eq!(message_key(&ctx, &id), b"default/msg/abc@x".to_vec());
    }
}
