//! Reliable file transfer over unreliable datagrams
//!
//! Outbound files are split into fixed-size chunks, each sent as its own
//! datagram and tracked until the receiver acknowledges it. A background
//! sweep resends chunks that have gone unacknowledged past the timeout,
//! giving up after a bounded number of retries. Inbound chunks accumulate
//! in a [`ChunkStore`] and the reassembled file is written to disk once
//! every piece has arrived.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use magpie_core::{
    chunk_payloads, new_message_id, unix_now, ChunkStore, Message, Result, Scope, Transport,
    CHUNK_PACING, CHUNK_SIZE, MAX_RETRIES, RESEND_TIMEOUT, RETRY_INTERVAL, TOKEN_TTL,
};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::display;

/// An outbound chunk awaiting acknowledgement
struct PendingChunk {
    file_id: String,
    index: u32,
    total: u32,
    size: u32,
    payload: String,
    to_user: String,
    dest: SocketAddr,
    acknowledged: bool,
    retry_count: u32,
    last_sent: Instant,
}

/// Drives both directions of file transfer for one peer
pub struct FileTransferEngine<T: Transport> {
    ctx: Arc<Context<T>>,
    /// Outbound chunks keyed by message id
    pending: Arc<Mutex<HashMap<String, PendingChunk>>>,
    inbound: Arc<ChunkStore>,
    /// File ids the human declined; chunks for these are dropped unstored
    declined: Arc<Mutex<HashSet<String>>>,
    /// Accepted offers, file id to offered filename
    offers: Arc<Mutex<HashMap<String, String>>>,
    downloads_dir: PathBuf,
}

impl<T: Transport> Clone for FileTransferEngine<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            pending: Arc::clone(&self.pending),
            inbound: Arc::clone(&self.inbound),
            declined: Arc::clone(&self.declined),
            offers: Arc::clone(&self.offers),
            downloads_dir: self.downloads_dir.clone(),
        }
    }
}

impl<T: Transport> FileTransferEngine<T> {
    pub fn new(ctx: Arc<Context<T>>, downloads_dir: PathBuf) -> Self {
        Self {
            ctx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            inbound: Arc::new(ChunkStore::new()),
            declined: Arc::new(Mutex::new(HashSet::new())),
            offers: Arc::new(Mutex::new(HashMap::new())),
            downloads_dir,
        }
    }

    /// Offer a file to a peer and stream its chunks, pacing sends so a
    /// burst does not overrun the receiver. Returns the transfer's file id.
    pub async fn send_file(
        &self,
        to_user: &str,
        dest: SocketAddr,
        path: &Path,
        description: &str,
    ) -> Result<String> {
        let data = std::fs::read(path)?;
        let file_id = new_message_id();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_id.clone());

        let mut offer = Message::of_type("FILE_OFFER");
        offer
            .set("MESSAGE_ID", new_message_id())
            .set("FROM", self.ctx.user_id.clone())
            .set("TO", to_user)
            .set("FILENAME", filename)
            .set("FILESIZE", data.len().to_string())
            .set("FILETYPE", mime_for(path))
            .set("FILEID", file_id.clone())
            .set("DESCRIPTION", description)
            .set("TIMESTAMP", unix_now().to_string())
            .set("TOKEN", self.issue_token());
        self.ctx.send_message(&offer, dest).await?;

        let payloads = chunk_payloads(&data, CHUNK_SIZE);
        let total = payloads.len() as u32;
        info!(file_id, total, to_user, "starting file transfer");

        for (i, payload) in payloads.into_iter().enumerate() {
            let index = i as u32;
            let raw_size = (data.len() - i * CHUNK_SIZE).min(CHUNK_SIZE) as u32;
            let message_id = new_message_id();

            let mut chunk = self.build_chunk(&file_id, index, total, raw_size, &payload, to_user);
            chunk.set("MESSAGE_ID", message_id.clone());
            {
                let mut pending = self.pending.lock().unwrap();
                pending.insert(
                    message_id,
                    PendingChunk {
                        file_id: file_id.clone(),
                        index,
                        total,
                        size: raw_size,
                        payload,
                        to_user: to_user.to_string(),
                        dest,
                        acknowledged: false,
                        retry_count: 0,
                        last_sent: Instant::now(),
                    },
                );
            }
            self.ctx.send_message(&chunk, dest).await?;
            tokio::time::sleep(CHUNK_PACING).await;
        }
        Ok(file_id)
    }

    fn build_chunk(
        &self,
        file_id: &str,
        index: u32,
        total: u32,
        size: u32,
        payload: &str,
        to_user: &str,
    ) -> Message {
        let mut msg = Message::of_type("FILE_CHUNK");
        msg.set("FROM", self.ctx.user_id.clone())
            .set("TO", to_user)
            .set("FILEID", file_id)
            .set("CHUNK_INDEX", index.to_string())
            .set("TOTAL_CHUNKS", total.to_string())
            .set("CHUNK_SIZE", size.to_string())
            .set("TOKEN", self.issue_token())
            .set("DATA", payload);
        msg
    }

    fn issue_token(&self) -> String {
        self.ctx
            .tokens
            .issue(&self.ctx.full_id(), TOKEN_TTL, Scope::File)
    }

    /// Show an inbound offer and ask the human whether to accept it. The
    /// answer is collected on a spawned task so the receive loop keeps
    /// draining datagrams while the prompt waits.
    pub fn handle_offer(&self, msg: &Message) {
        let (Some(from), Some(file_id)) = (msg.get("FROM"), msg.get("FILEID")) else {
            debug!("file offer missing FROM or FILEID, dropping");
            return;
        };
        let filename = msg.get("FILENAME").unwrap_or(file_id).to_string();
        display::file_offer(
            from,
            &filename,
            msg.get("FILESIZE").unwrap_or("?"),
            msg.get("DESCRIPTION").unwrap_or(""),
        );

        let prompts = self.ctx.prompts.clone();
        let declined = Arc::clone(&self.declined);
        let offers = Arc::clone(&self.offers);
        let file_id = file_id.to_string();
        tokio::spawn(async move {
            let answer = prompts
                .ask(format!("Accept '{filename}'? (y/n): "))
                .await
                .unwrap_or_default();
            if answer.trim().eq_ignore_ascii_case("y") {
                offers
                    .lock()
                    .unwrap()
                    .insert(file_id, filename);
            } else {
                info!(file_id, "file offer declined");
                declined
                    .lock()
                    .unwrap()
                    .insert(file_id);
            }
        });
    }

    /// Store an inbound chunk, acknowledge it, and finalize the transfer
    /// once every chunk has arrived. Chunks for declined offers are not
    /// stored but are still acknowledged so the sender stops resending.
    pub async fn handle_chunk(&self, msg: &Message, sender: SocketAddr) {
        let (Some(file_id), Some(index), Some(total)) = (
            msg.get("FILEID"),
            msg.get_u32("CHUNK_INDEX"),
            msg.get_u32("TOTAL_CHUNKS"),
        ) else {
            debug!("file chunk missing FILEID, CHUNK_INDEX or TOTAL_CHUNKS");
            return;
        };
        let payload = msg.get("DATA").unwrap_or("");

        let is_declined = self
            .declined
            .lock()
            .unwrap()
            .contains(file_id);
        if is_declined {
            debug!(file_id, index, "chunk for declined offer, not storing");
        } else {
            self.inbound.add_chunk(file_id, index, total, payload);
        }

        if let Some(message_id) = msg.get("MESSAGE_ID") {
            let mut ack = Message::of_type("ACK");
            ack.set("MESSAGE_ID", message_id).set("STATUS", "RECEIVED");
            if let Err(e) = self.ctx.send_message(&ack, sender).await {
                warn!("failed to send ack: {e}");
            }
        }

        if !is_declined && self.inbound.is_complete(file_id) {
            self.finalize_inbound(file_id, msg, sender).await;
        }
    }

    async fn finalize_inbound(&self, file_id: &str, msg: &Message, sender: SocketAddr) {
        let data = match self.inbound.reassemble(file_id) {
            Ok(data) => data,
            Err(e) => {
                warn!(file_id, "failed to reassemble file: {e}");
                return;
            }
        };
        let filename = self
            .offers
            .lock()
            .unwrap()
            .remove(file_id)
            .unwrap_or_else(|| format!("{file_id}.recv"));
        let dest_path = self.downloads_dir.join(&filename);
        if let Err(e) = std::fs::create_dir_all(&self.downloads_dir) {
            warn!("failed to create downloads dir: {e}");
        }
        match std::fs::write(&dest_path, &data) {
            Ok(()) => display::file_saved(&filename, &dest_path),
            Err(e) => warn!(file_id, "failed to write received file: {e}"),
        }

        let mut received = Message::of_type("FILE_RECEIVED");
        received
            .set("FROM", self.ctx.user_id.clone())
            .set("TO", msg.get("FROM").unwrap_or(""))
            .set("FILEID", file_id)
            .set("STATUS", "COMPLETE")
            .set("TIMESTAMP", unix_now().to_string());
        if let Err(e) = self.ctx.send_message(&received, sender).await {
            warn!("failed to send completion notice: {e}");
        }
        self.inbound.remove(file_id);
    }

    /// The receiver confirmed one chunk; stop resending it
    pub fn handle_ack(&self, msg: &Message) {
        let Some(message_id) = msg.get("MESSAGE_ID") else {
            return;
        };
        let status = msg.get("STATUS").unwrap_or("");
        if !status.eq_ignore_ascii_case("RECEIVED") {
            debug!(message_id, status, "ack with unexpected status, ignoring");
            return;
        }
        let mut pending = self.pending.lock().unwrap();
        if let Some(entry) = pending.get_mut(message_id) {
            entry.acknowledged = true;
            debug!(
                message_id,
                file_id = entry.file_id,
                index = entry.index,
                "chunk acknowledged"
            );
        }
    }

    /// The receiver confirmed the whole file
    pub fn handle_received(&self, msg: &Message) {
        let (Some(from), Some(file_id)) = (msg.get("FROM"), msg.get("FILEID")) else {
            return;
        };
        display::file_delivered(from, file_id);
    }

    /// Resend loop tick: prune acknowledged chunks, resend stale ones,
    /// abandon chunks that have exhausted their retries. Each resend keeps
    /// the original message id so the receiver's acknowledgement still
    /// matches, but carries a freshly issued token.
    async fn retry_sweep(&self) {
        let mut resends: Vec<(Message, SocketAddr)> = Vec::new();
        {
            let mut pending = self.pending.lock().unwrap();
            pending.retain(|_, entry| !entry.acknowledged);
            for (message_id, entry) in pending.iter_mut() {
                if entry.last_sent.elapsed() < RESEND_TIMEOUT {
                    continue;
                }
                if entry.retry_count >= MAX_RETRIES {
                    warn!(
                        message_id,
                        file_id = entry.file_id,
                        index = entry.index,
                        "chunk unacknowledged after {MAX_RETRIES} retries, giving up"
                    );
                    entry.acknowledged = true;
                    continue;
                }
                entry.retry_count += 1;
                entry.last_sent = Instant::now();
                debug!(
                    message_id,
                    file_id = entry.file_id,
                    index = entry.index,
                    attempt = entry.retry_count,
                    "resending chunk"
                );
                let mut chunk = self.build_chunk(
                    &entry.file_id,
                    entry.index,
                    entry.total,
                    entry.size,
                    &entry.payload,
                    &entry.to_user,
                );
                chunk.set("MESSAGE_ID", message_id.clone());
                resends.push((chunk, entry.dest));
            }
            pending.retain(|_, entry| !entry.acknowledged);
        }
        for (chunk, dest) in resends {
            if let Err(e) = self.ctx.send_message(&chunk, dest).await {
                warn!("failed to resend chunk: {e}");
            }
        }
    }

    /// Run the resend monitor forever
    pub async fn run_retry_monitor(&self) {
        loop {
            self.retry_sweep().await;
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    /// Outbound chunks still waiting on an acknowledgement
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap()
            .values()
            .filter(|entry| !entry.acknowledged)
            .count()
    }

    /// Drop partial inbound state for a transfer that will never finish
    pub fn abandon_inbound(&self, file_id: &str) {
        self.inbound.remove(file_id);
        self.offers
            .lock()
            .unwrap()
            .remove(file_id);
    }
}

/// Best-effort media type from the file extension
fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}
