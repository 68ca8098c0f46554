//! Composite telemetry frame format
//!
//! One binary message carries everything the robot sampled at one instant:
//! a color image, a depth map and a status document.
//!
//! ## Wire Layout
//!
//! ```text
//! ┌─────────┬──────────┬──────────┬──────────┬─────────┬─────────┬──────────┐
//! │ Tag (1) │ L0 (4 LE)│ L1 (4 LE)│ L2 (4 LE)│ L0 JPEG │ L1 PNG  │ L2 JSON  │
//! └─────────┴──────────┴──────────┴──────────┴─────────┴─────────┴──────────┘
//! ```
//!
//! Only tag `1` is defined. Bytes after `13 + L0 + L1 + L2` are ignored. Payloads
//! are returned as [`Bytes`] views into the received message without copying.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{ChannelError, Result};

/// Size of the tag byte plus the three length fields.
pub const HEADER_LEN: usize = 13;

/// Tag for image + depth + status frames.
pub const COMPOSITE_TAG: u8 = 1;

/// The three payloads of a composite frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeFrame {
    /// JPEG color image
    pub image: Bytes,
    /// PNG depth raster
    pub depth: Bytes,
    /// UTF-8 JSON status document
    pub status: Bytes,
}

/// Split a composite frame into its payloads.
///
/// Fails with [`ChannelError::UnrecognizedFrame`] for any tag other than `1`, and
/// with [`ChannelError::MalformedFrame`] when the header is truncated or the
/// declared payload lengths overrun the message.
pub fn decode(raw: &Bytes) -> Result<CompositeFrame> {
    let Some(&tag) = raw.first() else {
        return Err(ChannelError::MalformedFrame { declared: HEADER_LEN as u64, actual: 0 });
    };
    if tag != COMPOSITE_TAG {
        return Err(ChannelError::UnrecognizedFrame { tag });
    }
    if raw.len() < HEADER_LEN {
        return Err(ChannelError::MalformedFrame {
            declared: HEADER_LEN as u64,
            actual: raw.len(),
        });
    }

    let image_len = read_u32_le(raw, 1) as usize;
    let depth_len = read_u32_le(raw, 5) as usize;
    let status_len = read_u32_le(raw, 9) as usize;

    // u64 so three u32 lengths can never overflow, even on 32-bit targets
    let declared = HEADER_LEN as u64 + image_len as u64 + depth_len as u64 + status_len as u64;
    if declared > raw.len() as u64 {
        return Err(ChannelError::MalformedFrame { declared, actual: raw.len() });
    }

    let image_end = HEADER_LEN + image_len;
    let depth_end = image_end + depth_len;
    let status_end = depth_end + status_len;

    trace!(
        "Composite frame: image={}B depth={}B status={}B trailing={}B",
        image_len,
        depth_len,
        status_len,
        raw.len() - status_end
    );

    Ok(CompositeFrame {
        image: raw.slice(HEADER_LEN..image_end),
        depth: raw.slice(image_end..depth_end),
        status: raw.slice(depth_end..status_end),
    })
}

/// Build a tag-1 frame from its three payloads.
///
/// This is the robot side of the format; the console only ever decodes.
pub fn encode(image: &[u8], depth: &[u8], status: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(HEADER_LEN + image.len() + depth.len() + status.len());
    dst.put_u8(COMPOSITE_TAG);
    for payload in [image, depth, status] {
        let len = u32::try_from(payload.len()).map_err(|_| ChannelError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        dst.put_u32_le(len);
    }
    dst.put_slice(image);
    dst.put_slice(depth);
    dst.put_slice(status);
    Ok(dst.freeze())
}

fn read_u32_le(raw: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_reference_frame() {
        let raw = Bytes::from_static(&[
            1, 4, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, // header
            0xFF, 0xD8, 0xFF, 0xD9, // image
            0x89, 0x50, // depth
            b'{', b'}', b'\n', // status
        ]);
        let frame = decode(&raw).unwrap();
        assert_eq!(frame.image.as_ref(), &[0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(frame.depth.as_ref(), &[0x89, 0x50]);
        assert_eq!(frame.status.as_ref(), b"{}\n");
    }

    #[test]
    fn empty_payloads_are_allowed() {
        let raw = encode(&[], &[], &[]).unwrap();
        assert_eq!(raw.len(), HEADER_LEN);
        let frame = decode(&raw).unwrap();
        assert!(frame.image.is_empty() && frame.depth.is_empty() && frame.status.is_empty());
    }

    #[test]
    fn empty_message_is_malformed() {
        let err = decode(&Bytes::new()).unwrap_err();
        assert!(matches!(err, ChannelError::MalformedFrame { actual: 0, .. }));
    }

    #[test]
    fn truncated_header_is_malformed() {
        let err = decode(&Bytes::from_static(&[1, 4, 0, 0])).unwrap_err();
        assert!(matches!(err, ChannelError::MalformedFrame { declared: 13, actual: 4 }));
    }

    #[test]
    fn maximum_lengths_do_not_overflow() {
        let mut raw = vec![1u8];
        for _ in 0..3 {
            raw.extend_from_slice(&u32::MAX.to_le_bytes());
        }
        let err = decode(&Bytes::from(raw)).unwrap_err();
        match err {
            ChannelError::MalformedFrame { declared, actual } => {
                assert_eq!(declared, 13 + 3 * u32::MAX as u64);
                assert_eq!(actual, 13);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn payloads_share_the_message_buffer() {
        let raw = encode(b"jpeg", b"png", b"{}").unwrap();
        let frame = decode(&raw).unwrap();
        let base = raw.as_ptr() as usize;
        assert_eq!(frame.image.as_ptr() as usize, base + HEADER_LEN);
        assert_eq!(frame.status.as_ptr() as usize, base + HEADER_LEN + 7);
    }

    proptest! {
        #[test]
        fn prop_payloads_survive_trailing_bytes(
            image in prop::collection::vec(any::<u8>(), 0..256),
            depth in prop::collection::vec(any::<u8>(), 0..256),
            status in prop::collection::vec(any::<u8>(), 0..256),
            trailing in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut raw = encode(&image, &depth, &status).unwrap().to_vec();
            raw.extend_from_slice(&trailing);

            let frame = decode(&Bytes::from(raw)).unwrap();
            prop_assert_eq!(frame.image.as_ref(), image.as_slice());
            prop_assert_eq!(frame.depth.as_ref(), depth.as_slice());
            prop_assert_eq!(frame.status.as_ref(), status.as_slice());
        }

        #[test]
        fn prop_unknown_tags_are_unrecognized(
            tag in any::<u8>().prop_filter("composite tag", |t| *t != COMPOSITE_TAG),
            body in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut raw = vec![tag];
            raw.extend_from_slice(&body);
            let result = decode(&Bytes::from(raw));
            prop_assert!(
                matches!(result, Err(ChannelError::UnrecognizedFrame { tag: t }) if t == tag),
                "expected unrecognized frame"
            );
        }

        #[test]
        fn prop_overrunning_lengths_are_malformed(
            lengths in prop::array::uniform3(0u32..4096),
            shortfall in 1usize..64,
        ) {
            let total: usize = lengths.iter().map(|l| *l as usize).sum();
            let body_len = total.saturating_sub(shortfall);
            prop_assume!(body_len < total);

            let mut raw = vec![COMPOSITE_TAG];
            for len in lengths {
                raw.extend_from_slice(&len.to_le_bytes());
            }
            raw.resize(HEADER_LEN + body_len, 0xAA);

            let result = decode(&Bytes::from(raw));
            prop_assert!(
                matches!(result, Err(ChannelError::MalformedFrame { .. })),
                "expected malformed frame"
            );
        }
    }
}
