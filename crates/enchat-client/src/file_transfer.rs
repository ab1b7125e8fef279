//! Chunked file transfer: splitting on the sending side, verified assembly and
//! safe saving on the receiving side.
//!
//! Chunks are encrypted under the room key, independently of the envelope's
//! session layer, so a transfer survives a session key rotation midway.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use uuid::Uuid;

use enchat_shared::crypto;
use enchat_shared::protocol::{FileBundle, FileChunk, FileMetadata};
use enchat_shared::RoomKey;

use crate::error::TransferError;
use crate::state::FileRecord;

#[derive(Debug, Clone, Copy)]
pub struct TransferLimits {
    pub max_file_size: u64,
    pub chunk_size: usize,
}

/// Read, hash and encrypt a file into a bundle ready for the outbound queue.
/// The size limit is checked before anything is read.
pub async fn prepare_transfer(
    path: &Path,
    room_key: &RoomKey,
    limits: TransferLimits,
) -> Result<FileBundle, TransferError> {
    let meta = match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta,
        _ => return Err(TransferError::NotFound(path.to_path_buf())),
    };
    let size = meta.len();
    if size > limits.max_file_size {
        return Err(TransferError::TooLarge {
            size,
            max: limits.max_file_size,
        });
    }

    let file_id = new_file_id();
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();

    let mut file = fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut chunks = Vec::new();
    let mut block = vec![0u8; limits.chunk_size.max(1)];

    loop {
        let filled = read_block(&mut file, &mut block).await?;
        if filled == 0 {
            break;
        }
        let plaintext = &block[..filled];
        hasher.update(plaintext);
        chunks.push(FileChunk {
            file_id: file_id.clone(),
            chunk_num: chunks.len() as u32,
            data: crypto::encrypt_token(room_key.as_bytes(), plaintext)?,
        });
        if filled < block.len() {
            break;
        }
    }

    debug!(file_id = %file_id, size, chunks = chunks.len(), "Prepared file");

    let metadata = FileMetadata {
        file_id,
        filename,
        size,
        total_chunks: chunks.len() as u32,
        hash: hasher.finalize().to_hex().to_string(),
    };
    Ok(FileBundle { metadata, chunks })
}

/// Fill `block` as far as the file allows. Returns the byte count.
async fn read_block(file: &mut fs::File, block: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < block.len() {
        let n = file.read(&mut block[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn new_file_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Decrypt and concatenate a completed transfer, then verify it against the
/// announced hash and size. Never returns unverified bytes.
pub fn assemble(record: &FileRecord, room_key: &RoomKey) -> Result<Vec<u8>, TransferError> {
    let metadata = record
        .metadata
        .as_ref()
        .ok_or_else(|| TransferError::MissingMetadata(record.file_id.clone()))?;
    if !record.is_assemblable() {
        return Err(TransferError::Incomplete {
            received: record.chunks_received(),
            total: metadata.total_chunks as usize,
        });
    }

    let integrity = |reason: String| TransferError::Integrity {
        file_id: record.file_id.clone(),
        reason,
    };

    let mut data = Vec::new();
    for (chunk_num, token) in &record.chunks {
        let plaintext = crypto::decrypt_token(room_key.as_bytes(), token)
            .map_err(|_| integrity(format!("chunk {chunk_num} failed to decrypt")))?;
        data.extend_from_slice(&plaintext);
    }

    if data.len() as u64 != metadata.size {
        return Err(integrity(format!(
            "size mismatch ({} bytes, expected {})",
            data.len(),
            metadata.size
        )));
    }
    let hash = blake3::hash(&data).to_hex().to_string();
    if !hash.eq_ignore_ascii_case(&metadata.hash) {
        return Err(integrity("hash mismatch".to_string()));
    }

    Ok(data)
}

/// Reduce an untrusted filename to a safe basename.
pub fn sanitize_filename(filename: &str, fallback_id: &str) -> String {
    let fallback = || format!("file_{fallback_id}");

    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base.starts_with('.') {
        return fallback();
    }

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = truncate_keeping_extension(&cleaned, 255);
    if cleaned.is_empty() {
        fallback()
    } else {
        cleaned
    }
}

fn truncate_keeping_extension(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let mut budget = max.saturating_sub(ext.len());
    while !stem.is_char_boundary(budget.min(stem.len())) {
        budget -= 1;
    }
    format!("{}{}", &stem[..budget.min(stem.len())], ext)
}

/// `("report", ".pdf")`; the dot stays with the extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

/// Write `data` into `dir` under a sanitized, non-clobbering name.
pub async fn save_download(
    dir: &Path,
    filename: &str,
    file_id: &str,
    data: &[u8],
) -> Result<PathBuf, TransferError> {
    fs::create_dir_all(dir).await?;
    let safe_name = sanitize_filename(filename, file_id);
    let (stem, ext) = split_extension(&safe_name);

    let mut counter = 0u32;
    loop {
        let candidate = if counter == 0 {
            dir.join(&safe_name)
        } else {
            dir.join(format!("{stem}_{counter}{ext}"))
        };

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(mut file) => {
                file.write_all(data).await?;
                file.flush().await?;
                info!(path = %candidate.display(), size = data.len(), "Saved download");
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e.into()),
        }
    }
}
