//! Key layout: `<domain>/nrr/<message id>/<index>`.

use shared_types::{DomainContext, MessageId};

pub const ENVELOPE_SECTION: &str = "nrr";

/// Trailing `/` keeps `m1` from matching `m10`.
pub fn envelope_prefix(ctx: &DomainContext, id: &MessageId) -> Vec<u8> {
    let mut key = ctx.key_prefix(ENVELOPE_SECTION);
    key.extend_from_slice(id.as_str().as_bytes());
    key.push(b'/');
    key
}

/// Zero-padded so envelopes scan in recording order.
pub fn envelope_key(ctx: &DomainContext, id: &MessageId, index: usize) -> Vec<u8> {
    let mut key = envelope_prefix(ctx, id);
    key.extend_from_slice(format!("{:08}", index).as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_key_layout() {
        let ctx = DomainContext::default_domain();
        let id = MessageId::new("m1@blue").unwrap();
        assert_eq!(envelope_key(&ctx, &id, 3), b"default/nrr/m1@blue/00000003".to_vec());

        let other = MessageId::new("m1@blue2").unwrap();
        assert!(!envelope_key(&ctx, &other, 0).starts_with(&envelope_prefix(&ctx, &id)));
    }
}
