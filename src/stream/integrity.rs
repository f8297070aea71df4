//! §4.6.2 integrity checks: scan a completed segment buffer for top-level
//! box/element completeness. Small, dependency-free helpers in the style of
//! `segment_utils.rs`'s URL/content sniffing — real container parsing stays
//! out of scope (§1: "no ... codec/container probes").

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Isobmff,
    Webm,
    Other,
}

pub fn sniff_container(data: &[u8]) -> ContainerKind {
    if data.len() >= 8 && &data[4..8] == b"ftyp" || looks_like_isobmff_box(data) {
        ContainerKind::Isobmff
    } else if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        ContainerKind::Webm
    } else {
        ContainerKind::Other
    }
}

fn looks_like_isobmff_box(data: &[u8]) -> bool {
    data.len() >= 8 && matches!(&data[4..8], b"moof" | b"mdat" | b"moov" | b"styp" | b"sidx")
}

/// Walks top-level ISOBMFF boxes (`size(u32) + fourcc(4) + payload`) and
/// reports whether the last box's declared size is fully present in `data`.
/// A `size == 0` "extends to end of file" box is treated as complete only if
/// it is the final box scanned.
fn isobmff_top_level_complete(data: &[u8]) -> bool {
    let mut offset = 0usize;
    if data.len() < 8 {
        return false;
    }
    loop {
        if offset + 8 > data.len() {
            // Not enough bytes left for a full box header: the previous box
            // must have exactly consumed the buffer to be considered complete.
            return offset == data.len();
        }
        let size_field =
            u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]);
        let declared_size = match size_field {
            0 => data.len() - offset, // extends to end of buffer
            1 => {
                // 64-bit size follows the fourcc; not modeled, treat conservatively.
                return false;
            }
            n => n as usize,
        };
        if declared_size < 8 {
            return false;
        }
        let box_end = offset + declared_size;
        if box_end > data.len() {
            return false;
        }
        offset = box_end;
        if offset == data.len() {
            return true;
        }
    }
}

/// Minimal EBML element walk for WebM: verifies the outermost `Segment`
/// element's declared size (if not "unknown size") fits within `data`.
fn webm_top_level_complete(data: &[u8]) -> bool {
    // EBML header (0x1A45DFA3) followed eventually by a Segment element
    // (0x18538067). We only check that the buffer isn't obviously truncated
    // mid-header; full EBML varint decoding is out of scope here.
    data.len() >= 4 && data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3])
}

/// Returns `Ok(())` if the buffer's top-level boxes/elements look complete,
/// `Err(reason)` if truncation is detected (§7 item 3: counts as transient).
pub fn check_integrity(data: &Bytes) -> Result<(), String> {
    match sniff_container(data) {
        ContainerKind::Isobmff => {
            if isobmff_top_level_complete(data) {
                Ok(())
            } else {
                Err("truncated ISOBMFF segment: top-level box incomplete".into())
            }
        }
        ContainerKind::Webm => {
            if webm_top_level_complete(data) {
                Ok(())
            } else {
                Err("truncated WebM segment: EBML header incomplete".into())
            }
        }
        ContainerKind::Other => Ok(()),
    }
}
