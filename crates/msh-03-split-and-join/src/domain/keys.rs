//! Key layout for group and fragment records.
//!
//! ```text
//! <domain>/grp/<group-id>                 → MessageGroup
//! <domain>/frag/<group-id>/<n:010>        → MessageFragmentEntity
//! <domain>/fragidx/<fragment-message-id>  → (GroupId, n)
//! ```

use shared_types::{DomainContext, GroupId, MessageId};

pub const GROUP_SECTION: &str = "grp";
const FRAGMENT_SECTION: &str = "frag";
const FRAGMENT_INDEX_SECTION: &str = "fragidx";

pub fn group_key(ctx: &DomainContext, group_id: &GroupId) -> Vec<u8> {
    let mut key = ctx.key_prefix(GROUP_SECTION);
    key.extend_from_slice(group_id.as_str().as_bytes());
    key
}

pub fn fragment_prefix(ctx: &DomainContext, group_id: &GroupId) -> Vec<u8> {
    let mut key = ctx.key_prefix(FRAGMENT_SECTION);
    key.extend_from_slice(format!("{}/", group_id.as_str()).as_bytes());
    key
}

pub fn fragment_key(ctx: &DomainContext, group_id: &GroupId, fragment_number: u32) -> Vec<u8> {
    let mut key = fragment_prefix(ctx, group_id);
    key.extend_from_slice(format!("{:010}", fragment_number).as_bytes());
    key
}

pub fn fragment_index_key(ctx: &DomainContext, message_id: &MessageId) -> Vec<u8> {
    let mut key = ctx.key_prefix(FRAGMENT_INDEX_SECTION);
    key.extend_from_slice(message_id.as_str().as_bytes());
    key
}
