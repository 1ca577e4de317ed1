//! # Inbound Ports (Driving Ports)

use crate::domain::entities::{FragmentRegistration, MessageFragmentEntity, MessageGroup, SplitOutcome};
use crate::domain::errors::SplitAndJoinError;
use crate::domain::mime::SourceMessage;
use msh_02_leg_configuration::LegConfiguration;
use shared_types::{DomainContext, GroupId, MessageId, Timestamp};
use std::path::{Path, PathBuf};

/// Primary API of the Fragment Manager.
///
/// Operations on one group are serialised; different groups proceed
/// independently.
pub trait SplitAndJoinApi: Send + Sync {
    /// A fresh `<uuid>.source` path under `temp_dir`. Never an existing file.
    fn generate_source_file_name(&self, temp_dir: &Path) -> PathBuf;

    /// Cut a source message file into fragment files, compressing it first
    /// when the leg asks for it.
    ///
    /// # Errors
    /// - `FragmentCreation`: the leg does not allow split-and-join, or the
    ///   source file cannot be read
    fn split_source_message(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        source_file: &Path,
        leg: &LegConfiguration,
        fragments_dir: &Path,
    ) -> Result<SplitOutcome, SplitAndJoinError>;

    /// # Errors
    /// - `InvalidGroup`: zero fragments declared
    /// - `GroupExists`
    fn create_message_group(
        &self,
        ctx: &DomainContext,
        group: MessageGroup,
    ) -> Result<MessageGroup, SplitAndJoinError>;

    /// Group announced by an inbound fragment: created on first sight,
    /// checked for agreement afterwards.
    fn ensure_inbound_group(
        &self,
        ctx: &DomainContext,
        group: MessageGroup,
    ) -> Result<MessageGroup, SplitAndJoinError>;

    fn get_message_group(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<MessageGroup, SplitAndJoinError>;

    fn list_groups(&self, ctx: &DomainContext) -> Result<Vec<MessageGroup>, SplitAndJoinError>;

    /// One fragment record per file, numbered by position. All files are
    /// read and digested before anything is written; the records are then
    /// written in one batch.
    ///
    /// # Errors
    /// - `FragmentCreation`: a file is unreadable or the count does not match
    /// - `DuplicateFragment`: the group already has fragments
    fn create_message_fragments(
        &self,
        ctx: &DomainContext,
        source_message_id: &MessageId,
        group: &MessageGroup,
        fragment_files: &[PathBuf],
    ) -> Result<Vec<MessageFragmentEntity>, SplitAndJoinError>;

    /// Write a received fragment payload to a new file in the fragments
    /// directory.
    fn write_fragment_file(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        fragment_number: u32,
        bytes: &[u8],
    ) -> Result<PathBuf, SplitAndJoinError>;

    /// Record one received fragment.
    ///
    /// # Errors
    /// - `DuplicateFragment`, `InvalidGroup` (number out of range, group closed)
    /// - `FragmentCreation`: the file is unreadable
    fn register_inbound_fragment(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        fragment_number: u32,
        message_id: MessageId,
        file: &Path,
    ) -> Result<FragmentRegistration, SplitAndJoinError>;

    /// Fragments of a group ordered by number.
    fn get_fragments(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<Vec<MessageFragmentEntity>, SplitAndJoinError>;

    /// Undo a registration whose fragment message could not be stored.
    /// Only removes the record when it still belongs to `message_id`.
    fn withdraw_inbound_fragment(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        fragment_number: u32,
        message_id: &MessageId,
    ) -> Result<(), SplitAndJoinError>;

    /// Receiving groups holding every declared fragment but not rejoined yet.
    fn complete_receiving_groups(
        &self,
        ctx: &DomainContext,
    ) -> Result<Vec<MessageGroup>, SplitAndJoinError>;

    fn fragment_for_message(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Option<MessageFragmentEntity>, SplitAndJoinError>;

    /// Payload of a fragment message, verified against its digest.
    fn read_fragment_payload(
        &self,
        ctx: &DomainContext,
        message_id: &MessageId,
    ) -> Result<Vec<u8>, SplitAndJoinError>;

    /// Concatenate a complete group into one file.
    ///
    /// Idempotent: once rejoined, later calls return the recorded file
    /// without rewriting it.
    ///
    /// # Errors
    /// - `IncompleteFragmentSet`: nothing is written
    /// - `ChecksumMismatch`: a fragment file changed since it was recorded
    fn rejoin_message_fragments(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<PathBuf, SplitAndJoinError>;

    /// Parse a rejoined file back into envelope and attachments.
    ///
    /// # Errors
    /// - `MalformedSourceMessage`
    fn rejoin_source_message(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
        file: &Path,
    ) -> Result<SourceMessage, SplitAndJoinError>;

    /// Count a delivered fragment; the group becomes `Sent` with the last one.
    fn on_fragment_sent(
        &self,
        ctx: &DomainContext,
        fragment_message_id: &MessageId,
    ) -> Result<MessageGroup, SplitAndJoinError>;

    /// A fragment failed for good; the whole group fails.
    fn on_fragment_failed(
        &self,
        ctx: &DomainContext,
        fragment_message_id: &MessageId,
    ) -> Result<MessageGroup, SplitAndJoinError>;

    fn fail_group(
        &self,
        ctx: &DomainContext,
        group_id: &GroupId,
    ) -> Result<MessageGroup, SplitAndJoinError>;

    /// Receiving groups whose join interval elapsed before every fragment
    /// arrived. Complete groups are left for the rejoin.
    fn expire_stale_groups(
        &self,
        ctx: &DomainContext,
        now: Timestamp,
    ) -> Result<Vec<GroupId>, SplitAndJoinError>;

    /// Drop a group, its fragment records and its files.
    fn purge_group(&self, ctx: &DomainContext, group_id: &GroupId) -> Result<(), SplitAndJoinError>;
}
