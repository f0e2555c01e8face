//! Clipboard and primary-selection retrieval.
//!
//! Each selection slot holds at most one live offer; a selection event
//! replaces it, destroying the previous one. Reading goes through a pipe:
//! the compositor streams the offer's `text/plain` data into the write end,
//! and the read end is driven by loop readiness, one 1024-byte chunk per
//! wakeup, until end of stream hands the accumulated text to the caller's
//! callback exactly once. A read error discards everything and the callback
//! never fires.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;

use calloop::generic::Generic;
use calloop::{Interest, Mode, PostAction};
use rustix::pipe::{pipe_with, PipeFlags};
use wayland_client::{
    event_created_child,
    protocol::{
        wl_data_device::{self, WlDataDevice},
        wl_data_offer::WlDataOffer,
    },
    Connection, Dispatch, QueueHandle,
};
use wayland_protocols::wp::primary_selection::zv1::client::{
    zwp_primary_selection_device_v1::{self, ZwpPrimarySelectionDeviceV1},
    zwp_primary_selection_offer_v1::ZwpPrimarySelectionOfferV1,
};

use crate::display::WaylandDisplay;

const TEXT_MIME: &str = "text/plain";
const CHUNK_SIZE: usize = 1024;

/// Which selection slot an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardKind {
    /// The regular copy/paste clipboard.
    Clipboard,
    /// The middle-click primary selection.
    Primary,
}

#[derive(Debug)]
pub(crate) enum ChunkStatus {
    More,
    Eof(String),
}

/// Accumulates pipe chunks until end of stream.
#[derive(Debug, Default)]
pub(crate) struct ChunkReader {
    buf: Vec<u8>,
}

impl ChunkReader {
    pub(crate) fn feed(&mut self, source: &mut impl Read) -> io::Result<ChunkStatus> {
        let mut chunk = [0u8; CHUNK_SIZE];
        match source.read(&mut chunk)? {
            0 => {
                let text = String::from_utf8_lossy(&std::mem::take(&mut self.buf)).into_owned();
                Ok(ChunkStatus::Eof(text))
            }
            n => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(ChunkStatus::More)
            }
        }
    }
}

impl WaylandDisplay {
    /// Requests the current selection as text.
    ///
    /// With no live offer this silently does nothing; otherwise `callback`
    /// runs once from the event loop when the full text has arrived. It is
    /// never called on a transfer error.
    pub fn get_clipboard(
        &mut self,
        kind: ClipboardKind,
        callback: impl FnOnce(&mut WaylandDisplay, String) + 'static,
    ) {
        let (read, write) = match pipe_with(PipeFlags::CLOEXEC) {
            Ok(ends) => ends,
            Err(err) => {
                tracing::warn!("failed to open clipboard pipe: {err}");
                return;
            }
        };

        match kind {
            ClipboardKind::Clipboard => {
                let Some(offer) = &self.clipboard_offer else {
                    return;
                };
                offer.receive(TEXT_MIME.to_owned(), write.as_fd());
            }
            ClipboardKind::Primary => {
                let Some(offer) = &self.primary_offer else {
                    return;
                };
                offer.receive(TEXT_MIME.to_owned(), write.as_fd());
            }
        }
        // Closing our write end is what lets the read side see EOF once the
        // source client is done.
        drop(write);
        let _ = self.conn.flush();

        let source = Generic::new(File::from(read), Interest::READ, Mode::Level);
        let mut reader = ChunkReader::default();
        let mut callback = Some(callback);
        let inserted = self
            .loop_handle
            .insert_source(source, move |_, file, display| {
                let mut pipe: &File = file;
                match reader.feed(&mut pipe) {
                    Ok(ChunkStatus::More) => Ok(PostAction::Continue),
                    Ok(ChunkStatus::Eof(text)) => {
                        if let Some(callback) = callback.take() {
                            callback(display, text);
                        }
                        Ok(PostAction::Remove)
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        Ok(PostAction::Continue)
                    }
                    Err(err) => {
                        tracing::warn!("clipboard transfer failed: {err}");
                        Ok(PostAction::Remove)
                    }
                }
            });
        if let Err(err) = inserted {
            tracing::warn!("failed to watch clipboard pipe: {err}");
        }
    }
}

impl Dispatch<WlDataDevice, u32> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        _proxy: &WlDataDevice,
        event: wl_data_device::Event,
        _seat_name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<WaylandDisplay>,
    ) {
        if let wl_data_device::Event::Selection { id } = event {
            // At most one live offer; the replaced one is destroyed first.
            if let Some(previous) = state.clipboard_offer.take() {
                previous.destroy();
            }
            state.clipboard_offer = id;
        }
    }

    event_created_child!(WaylandDisplay, WlDataDevice, [
        wl_data_device::EVT_DATA_OFFER_OPCODE => (WlDataOffer, ()),
    ]);
}

impl Dispatch<ZwpPrimarySelectionDeviceV1, u32> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        _proxy: &ZwpPrimarySelectionDeviceV1,
        event: zwp_primary_selection_device_v1::Event,
        _seat_name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<WaylandDisplay>,
    ) {
        if let zwp_primary_selection_device_v1::Event::Selection { id } = event {
            if let Some(previous) = state.primary_offer.take() {
                previous.destroy();
            }
            state.primary_offer = id;
        }
    }

    event_created_child!(WaylandDisplay, ZwpPrimarySelectionDeviceV1, [
        zwp_primary_selection_device_v1::EVT_DATA_OFFER_OPCODE => (ZwpPrimarySelectionOfferV1, ()),
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[test]
    fn chunks_accumulate_until_eof() {
        let (mut tx, mut rx) = UnixStream::pair().unwrap();
        let mut reader = ChunkReader::default();

        tx.write_all(b"hel").unwrap();
        assert!(matches!(reader.feed(&mut rx).unwrap(), ChunkStatus::More));

        tx.write_all(b"lo").unwrap();
        drop(tx);
        assert!(matches!(reader.feed(&mut rx).unwrap(), ChunkStatus::More));

        match reader.feed(&mut rx).unwrap() {
            ChunkStatus::Eof(text) => assert_eq!(text, "hello"),
            other => panic!("expected eof, got {other:?}"),
        }
    }

    #[test]
    fn empty_stream_delivers_empty_text() {
        let (tx, mut rx) = UnixStream::pair().unwrap();
        drop(tx);
        let mut reader = ChunkReader::default();
        match reader.feed(&mut rx).unwrap() {
            ChunkStatus::Eof(text) => assert!(text.is_empty()),
            other => panic!("expected eof, got {other:?}"),
        }
    }

    #[test]
    fn payloads_larger_than_one_chunk_survive() {
        let (mut tx, mut rx) = UnixStream::pair().unwrap();
        let payload = vec![b'x'; CHUNK_SIZE + 100];
        tx.write_all(&payload).unwrap();
        drop(tx);

        let mut reader = ChunkReader::default();
        let text = loop {
            match reader.feed(&mut rx).unwrap() {
                ChunkStatus::More => continue,
                ChunkStatus::Eof(text) => break text,
            }
        };
        assert_eq!(text.len(), payload.len());
    }
}
