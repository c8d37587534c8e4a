//! Crash-atomic persistence of the slot bank.
//!
//! The whole bank is committed as one image, so a multi-slot update such as
//! `erase_all` is a single atomic replace.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "EaW1"
//! 4       1     format version (1)
//! 5       32    BLAKE3("ea-weaver:image" || body)
//! 37      ..    bincode(StoreImage)
//! ```

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use blake3::Hasher;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use weaver_spec::{KEY_BYTES, SLOT_COUNT, VALUE_BYTES};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::timer::TimerState;

const MAGIC: &[u8; 4] = b"EaW1";
const FORMAT_VERSION: u8 = 1;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 1 + DIGEST_LEN;
const DIGEST_DOMAIN: &[u8] = b"ea-weaver:image";

/// Journal error surface.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Underlying I/O failure.
    #[error("journal io: {0}")]
    Io(#[from] io::Error),
    /// Image could not be serialized.
    #[error("encode image: {0}")]
    Encode(String),
    /// Image body could not be deserialized.
    #[error("decode image: {0}")]
    Decode(String),
    /// Shorter than the fixed header.
    #[error("image truncated: {0} bytes")]
    Truncated(usize),
    /// Not a Weaver image.
    #[error("bad image magic")]
    BadMagic,
    /// Written by an unknown format revision.
    #[error("unsupported image version {0}")]
    UnsupportedVersion(u8),
    /// Body does not hash to the recorded digest.
    #[error("image digest mismatch")]
    DigestMismatch,
    /// Image holds a different number of slots than the store.
    #[error("image has {found} slots, expected {expected}")]
    SlotCount {
        /// Slots the store is built with.
        expected: usize,
        /// Slots found in the image.
        found: usize,
    },
}

/// Persisted state of one slot.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SlotRecord {
    /// Stored key.
    pub key: [u8; KEY_BYTES],
    /// Stored value.
    pub value: [u8; VALUE_BYTES],
    /// Whether a key has been written since the last erase.
    pub occupied: bool,
    /// Consecutive failed reads.
    pub failure_count: u32,
    /// Backoff timer, if running.
    #[zeroize(skip)]
    pub timer: Option<TimerState>,
}

impl fmt::Debug for SlotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRecord")
            .field("occupied", &self.occupied)
            .field("failure_count", &self.failure_count)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

/// Snapshot of every slot, in slot-id order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreImage {
    /// Slot records, exactly [`SLOT_COUNT`] of them.
    pub slots: Vec<SlotRecord>,
}

/// Durable home of the store image.
///
/// `commit` must be atomic: after a crash, `load` returns either the image
/// from before the call or the one passed to it.
pub trait Journal: Send + Sync {
    /// Latest committed image, or `None` for a fresh journal.
    fn load(&self) -> Result<Option<StoreImage>, JournalError>;
    /// Durably replace the committed image.
    fn commit(&self, image: &StoreImage) -> Result<(), JournalError>;
}

/// Serialize an image with header and digest.
pub(crate) fn encode_image(image: &StoreImage) -> Result<Zeroizing<Vec<u8>>, JournalError> {
    let body = Zeroizing::new(
        bincode::serialize(image).map_err(|e| JournalError::Encode(e.to_string()))?,
    );
    let mut out = Zeroizing::new(Vec::with_capacity(HEADER_LEN + body.len()));
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&image_digest(&body));
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parse and verify an encoded image.
pub(crate) fn decode_image(bytes: &[u8]) -> Result<StoreImage, JournalError> {
    if bytes.len() < HEADER_LEN {
        return Err(JournalError::Truncated(bytes.len()));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(JournalError::BadMagic);
    }
    let version = bytes[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(JournalError::UnsupportedVersion(version));
    }
    let digest = &bytes[MAGIC.len() + 1..HEADER_LEN];
    let body = &bytes[HEADER_LEN..];
    if image_digest(body).as_slice() != digest {
        return Err(JournalError::DigestMismatch);
    }
    let image: StoreImage =
        bincode::deserialize(body).map_err(|e| JournalError::Decode(e.to_string()))?;
    if image.slots.len() != SLOT_COUNT {
        return Err(JournalError::SlotCount {
            expected: SLOT_COUNT,
            found: image.slots.len(),
        });
    }
    Ok(image)
}

fn image_digest(body: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Hasher::new();
    hasher.update(DIGEST_DOMAIN);
    hasher.update(body);
    *hasher.finalize().as_bytes()
}

/// Journal kept in process memory. Nothing survives the process, but the
/// image still goes through encode/decode.
#[derive(Default)]
pub struct MemoryJournal {
    bytes: Mutex<Option<Zeroizing<Vec<u8>>>>,
}

impl MemoryJournal {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Journal for MemoryJournal {
    fn load(&self) -> Result<Option<StoreImage>, JournalError> {
        self.bytes
            .lock()
            .as_ref()
            .map(|bytes| decode_image(bytes))
            .transpose()
    }

    fn commit(&self, image: &StoreImage) -> Result<(), JournalError> {
        let encoded = encode_image(image)?;
        *self.bytes.lock() = Some(encoded);
        Ok(())
    }
}

/// Journal backed by a single file, replaced atomically on every commit.
#[derive(Debug, Clone)]
pub struct FileJournal {
    path: PathBuf,
}

impl FileJournal {
    /// Journal at `path`. The file is created on first commit.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the committed image.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>.tmp`, always distinct from the committed path.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl Journal for FileJournal {
    fn load(&self) -> Result<Option<StoreImage>, JournalError> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let bytes = Zeroizing::new(bytes);
                decode_image(&bytes).map(Some)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&self, image: &StoreImage) -> Result<(), JournalError> {
        let encoded = encode_image(image)?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let staging = self.staging_path();
        {
            let mut file = open_private(&staging)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        sync_dir(parent)?;
        debug!(path = %self.path.display(), bytes = encoded.len(), "journal committed");
        Ok(())
    }
}

fn open_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
