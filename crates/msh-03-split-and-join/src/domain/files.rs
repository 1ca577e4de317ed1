//! Fragment file helpers: digests, cutting, compression.

use crate::domain::errors::SplitAndJoinError;
use shared_types::GroupId;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const READ_BUFFER: usize = 64 * 1024;

/// Length and CRC32 of a file, streamed.
pub fn digest_file(path: &Path) -> Result<(u64, u32), std::io::Error> {
    let mut file = fs::File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; READ_BUFFER];
    let mut length = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        length += n as u64;
    }
    Ok((length, hasher.finalize()))
}

pub fn fragment_file_name(group_id: &GroupId, fragment_number: u32) -> String {
    format!("{}_{}.fragment", sanitize(group_id.as_str()), fragment_number)
}

/// Unique per call, so a redelivered fragment never overwrites the file
/// already registered for its number.
pub fn received_fragment_file_name(group_id: &GroupId, fragment_number: u32) -> String {
    format!(
        "{}_{}.{}.fragment",
        sanitize(group_id.as_str()),
        fragment_number,
        uuid::Uuid::new_v4().simple()
    )
}

/// Group ids may carry characters that are not safe in file names.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Cut `bytes` into `fragment_size` chunks under `dir`.
///
/// An empty input still yields one (empty) fragment.
pub fn cut(
    bytes: &[u8],
    fragment_size: u64,
    dir: &Path,
    group_id: &GroupId,
) -> Result<Vec<PathBuf>, SplitAndJoinError> {
    if fragment_size == 0 {
        return Err(SplitAndJoinError::FragmentCreation {
            reason: "fragment size must be positive".to_string(),
        });
    }
    fs::create_dir_all(dir).map_err(|e| SplitAndJoinError::io("create fragments dir", e))?;

    let size = usize::try_from(fragment_size).unwrap_or(usize::MAX);
    let chunks: Vec<&[u8]> = if bytes.is_empty() {
        vec![bytes]
    } else {
        bytes.chunks(size).collect()
    };

    let mut files = Vec::with_capacity(chunks.len());
    for (n, chunk) in chunks.into_iter().enumerate() {
        let path = dir.join(fragment_file_name(group_id, n as u32));
        write_atomically(&path, chunk)?;
        files.push(path);
    }
    Ok(files)
}

/// Write through a `.part` sibling and rename into place.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), SplitAndJoinError> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let mut file = fs::File::create(&part).map_err(|e| SplitAndJoinError::io("create", e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| SplitAndJoinError::io("write", e))?;
    fs::rename(&part, path).map_err(|e| SplitAndJoinError::io("rename", e))?;
    Ok(())
}

#[cfg(feature = "compression")]
pub fn compress(bytes: &[u8], level: i32) -> Result<Vec<u8>, SplitAndJoinError> {
    zstd::encode_all(bytes, level).map_err(|e| SplitAndJoinError::io("compress", e))
}

#[cfg(feature = "compression")]
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, SplitAndJoinError> {
    zstd::decode_all(bytes).map_err(|e| SplitAndJoinError::MalformedSourceMessage {
        reason: format!("compressed source message: {}", e),
    })
}

#[cfg(not(feature = "compression"))]
pub fn decompress(_bytes: &[u8]) -> Result<Vec<u8>, SplitAndJoinError> {
    Err(SplitAndJoinError::MalformedSourceMessage {
        reason: "compressed source message but compression support is disabled".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_keeps_order_and_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let group = GroupId::new("g:1").unwrap();
        let bytes: Vec<u8> = (0..25u8).collect();

        let files = cut(&bytes, 10, dir.path(), &group).unwrap();

        assert_eq!(files.len(), 3);
        assert!(files[0].ends_with("g_1_0.fragment"));
        assert_eq!(fs::read(&files[2]).unwrap(), (20..25u8).collect::<Vec<_>>());
        let joined: Vec<u8> = files.iter().flat_map(|f| fs::read(f).unwrap()).collect();
        assert_eq!(joined, bytes);
    }

    #[test]
    fn test_empty_input_gives_one_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let files = cut(&[], 10, dir.path(), &GroupId::new("g").unwrap()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(digest_file(&files[0]).unwrap().0, 0);
    }

    #[test]
    fn test_zero_fragment_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = cut(b"abc", 0, dir.path(), &GroupId::new("g").unwrap());
        assert!(matches!(result, Err(SplitAndJoinError::FragmentCreation { .. })));
    }

    #[test]
    fn test_digest_matches_in_memory_crc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let bytes = vec![7u8; READ_BUFFER * 2 + 3];
        fs::write(&path, &bytes).unwrap();

        let (len, crc) = digest_file(&path).unwrap();
        assert_eq!(len, bytes.len() as u64);
        assert_eq!(crc, crc32fast::hash(&bytes));
    }
}
