//! `/files`, `/download` and `/share`.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use enchat_net::OutboundOp;
use enchat_shared::SystemMessage;

use crate::error::TransferError;
use crate::file_transfer::{assemble, prepare_transfer, save_download};
use crate::session::ChatSession;
use crate::state::RoomState;

pub fn list(session: &ChatSession) {
    let text = session.store.read(file_listing);
    session.notice(text);
}

fn file_listing(state: &RoomState) -> String {
    if state.files.is_empty() {
        return "No files shared in this room".to_string();
    }

    let mut text = String::from("=== Files ===");
    for record in state.files.values() {
        let status = match (&record.metadata, record.complete, &record.saved_to) {
            (_, _, Some(path)) => format!("saved to {}", path.display()),
            (Some(meta), true, None) => format!("{} bytes, ready", meta.size),
            (Some(meta), false, None) => {
                format!("{}/{} chunks", record.chunks_received(), meta.total_chunks)
            }
            (None, _, None) => format!("{} chunks, waiting for details", record.chunks_received()),
        };
        text.push_str(&format!(
            "\n  [{}] {} from {} ({status})",
            record.file_id,
            record.display_name(),
            record.sender
        ));
    }
    text
}

pub async fn download(session: &ChatSession, file_id: &str) {
    match fetch_and_save(session, file_id).await {
        Ok(path) => {
            session.notice(format!("Saved to {}", path.display()));
            session.store.write(|s| {
                if let Some(record) = s.files.get_mut(file_id) {
                    record.release(path.clone());
                }
            });
            session.send(OutboundOp::System(SystemMessage::FileDownload(
                file_id.to_string(),
            )));
        }
        Err(e) => {
            warn!(file_id, error = %e, "Download failed");
            session.notice(e.to_string());
        }
    }
}

async fn fetch_and_save(session: &ChatSession, file_id: &str) -> Result<PathBuf, TransferError> {
    // Copy the record out so no lock is held across the write.
    let record = session
        .store
        .read(|s| s.files.get(file_id).cloned())
        .ok_or_else(|| TransferError::UnknownFile(file_id.to_string()))?;
    if let Some(path) = record.saved_to {
        return Err(TransferError::AlreadySaved(path));
    }
    let data = assemble(&record, session.room_key())?;
    let filename = record.display_name().to_string();
    save_download(&session.config.downloads_dir, &filename, file_id, &data).await
}

pub async fn share(session: &ChatSession, path: &Path) {
    let bundle = match prepare_transfer(path, session.room_key(), session.transfer_limits()).await {
        Ok(bundle) => bundle,
        Err(e) => {
            session.notice(e.to_string());
            return;
        }
    };

    let file_id = bundle.metadata.file_id.clone();
    let filename = bundle.metadata.filename.clone();
    let chunks = bundle.metadata.total_chunks;
    info!(file_id = %file_id, filename = %filename, chunks, "Sharing file");
    if session.send(OutboundOp::FileTransfer(bundle)) {
        session.notice(format!("Sharing {filename} [{file_id}] in {chunks} chunk(s)"));
    }
}
